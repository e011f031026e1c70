//! Route scoring and resource allocation.
//!
//! ```text
//! score = base_weight(priority)
//!       * (1 + weather_severity)
//!       / traffic_delay_factor
//!       * resource_sufficiency
//! ```
//!
//! `resource_sufficiency` is 1.0 when the depot covers the segment's needs
//! and falls linearly with the shortfall, floored at 0.1 so that a starved
//! critical route is ranked low instead of dropped. Ranking is fully
//! deterministic: score descending, then duration ascending, then priority
//! (critical first), then id.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inventory::ResourceKind;

/// Lowest value the sufficiency factor can take.
pub const SUFFICIENCY_FLOOR: f64 = 0.1;

/// Route priority. Orders critical first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            other => Err(Error::Validation(format!("unknown priority: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub lat: f64,
    pub lon: f64,
}

impl Waypoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Base weight per priority level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_critical")]
    pub critical: f64,
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_normal")]
    pub normal: f64,
}

fn default_critical() -> f64 {
    3.0
}

fn default_high() -> f64 {
    2.0
}

fn default_normal() -> f64 {
    1.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            critical: default_critical(),
            high: default_high(),
            normal: default_normal(),
        }
    }
}

impl ScoringWeights {
    pub fn base_weight(&self, priority: Priority) -> f64 {
        match priority {
            Priority::Critical => self.critical,
            Priority::High => self.high,
            Priority::Normal => self.normal,
        }
    }
}

/// A candidate road segment with everything needed to score it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub waypoints: Vec<Waypoint>,
    pub priority: Priority,
    pub estimated_duration_minutes: f64,
    /// Nearest depot.
    pub depot: String,
    /// 0 (clear) to 1 (severe).
    pub weather_severity: f64,
    /// 1 means free-flowing traffic.
    pub traffic_delay_factor: f64,
    /// Resources needed to treat the segment.
    pub required: BTreeMap<ResourceKind, f64>,
    /// Stock on hand at the depot.
    pub available: BTreeMap<ResourceKind, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub waypoints: Vec<Waypoint>,
    pub priority: Priority,
    pub estimated_duration_minutes: f64,
    pub depot: String,
    pub assigned_resources: BTreeMap<ResourceKind, f64>,
    pub score: f64,
    pub resource_sufficiency: f64,
}

/// A route that could not be fully supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shortfall {
    pub route_id: String,
    pub priority: Priority,
    pub depot: String,
    pub resource_kind: ResourceKind,
    pub required: f64,
    pub assigned: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Ranked best first.
    pub routes: Vec<Route>,
    pub shortfalls: Vec<Shortfall>,
    /// Stock taken from each depot, as opening stock minus what is left.
    #[serde(skip)]
    consumed: BTreeMap<(String, ResourceKind), f64>,
}

impl RoutePlan {
    /// Amount drawn per depot and resource kind by [`RouteScorer::plan`].
    ///
    /// Never exceeds the stock the plan was computed from. Empty for a plan
    /// decoded from a payload.
    pub fn consumption(&self) -> &BTreeMap<(String, ResourceKind), f64> {
        &self.consumed
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RouteScorer {
    weights: ScoringWeights,
}

impl RouteScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Fraction of the segment's needs the depot can cover, in [0.1, 1].
    ///
    /// With several resource kinds the scarcest one decides.
    pub fn resource_sufficiency(&self, segment: &Segment) -> f64 {
        segment
            .required
            .iter()
            .filter(|(_, &needed)| needed > 0.0)
            .map(|(kind, &needed)| {
                let on_hand = segment.available.get(kind).copied().unwrap_or(0.0).max(0.0);
                (on_hand / needed).min(1.0)
            })
            .fold(1.0_f64, f64::min)
            .max(SUFFICIENCY_FLOOR)
    }

    pub fn score(&self, segment: &Segment) -> f64 {
        let base = self.weights.base_weight(segment.priority);
        let weather = 1.0 + segment.weather_severity.clamp(0.0, 1.0);
        let traffic = segment.traffic_delay_factor.max(1.0);
        base * weather / traffic * self.resource_sufficiency(segment)
    }

    /// Score, rank and supply a set of segments.
    ///
    /// Resources are handed out greedily in rank order from each depot's
    /// stock, so higher ranked routes are supplied first.
    pub fn plan(&self, segments: &[Segment]) -> RoutePlan {
        let mut routes: Vec<Route> = segments
            .iter()
            .map(|s| Route {
                id: s.id.clone(),
                waypoints: s.waypoints.clone(),
                priority: s.priority,
                estimated_duration_minutes: s.estimated_duration_minutes,
                depot: s.depot.clone(),
                assigned_resources: BTreeMap::new(),
                score: self.score(s),
                resource_sufficiency: self.resource_sufficiency(s),
            })
            .collect();
        routes.sort_by(compare_routes);

        let mut opening: BTreeMap<(String, ResourceKind), f64> = BTreeMap::new();
        for segment in segments {
            for (kind, &amount) in &segment.available {
                opening
                    .entry((segment.depot.clone(), *kind))
                    .or_insert(amount.max(0.0));
            }
        }
        let mut remaining = opening.clone();

        let by_id: BTreeMap<&str, &Segment> =
            segments.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut shortfalls = Vec::new();

        for route in &mut routes {
            let Some(segment) = by_id.get(route.id.as_str()) else {
                continue;
            };
            for (kind, &needed) in &segment.required {
                let stock = remaining
                    .entry((route.depot.clone(), *kind))
                    .or_insert(0.0);
                let assigned = needed.min(*stock).max(0.0);
                *stock -= assigned;
                route.assigned_resources.insert(*kind, assigned);
                if assigned < needed {
                    shortfalls.push(Shortfall {
                        route_id: route.id.clone(),
                        priority: route.priority,
                        depot: route.depot.clone(),
                        resource_kind: *kind,
                        required: needed,
                        assigned,
                    });
                }
            }
        }

        let consumed = remaining
            .into_iter()
            .filter_map(|(key, left)| {
                let start = opening.get(&key).copied().unwrap_or(0.0);
                let drawn = start - left;
                (drawn > 0.0).then_some((key, drawn))
            })
            .collect();

        RoutePlan {
            routes,
            shortfalls,
            consumed,
        }
    }
}

fn compare_routes(a: &Route, b: &Route) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            a.estimated_duration_minutes
                .total_cmp(&b.estimated_duration_minutes)
        })
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.id.cmp(&b.id))
}
