//! Built-in role workers of the snow-removal pipeline.
//!
//! Payload keys each role produces (and what it reads from upstream):
//!
//! | worker | reads | produces |
//! |---|---|---|
//! | `planner` | region catalog | `region`, `zones`, `objective`, `delegation` |
//! | `weather_monitor` | `planning.zones` | `zones.<name>.{snowfall_cm, temperature_c, road_condition, snow_risk, road_surface_temp_c, severity}`, `alerts` |
//! | `traffic_analyst` | `weather.zones` | `zones.<name>.{incidents, delay_factor}` |
//! | `stock_manager` | ledger | `levels`, `alerts` |
//! | `route_optimizer` | `planning`, `weather`, `traffic`, ledger | `routes`, `shortfalls` |
//! | `notifier` | `planning`, `resources`, `routing` | `region`, `notifications`, `route_count` |
//!
//! The route optimizer is the only role that mutates the ledger: it deducts
//! what it assigned to the dispatched routes.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::core::Payload;
use crate::inventory::{AlertSeverity, InventoryLedger, ResourceKind};
use crate::region::{
    assess_weather, traffic_delay_factor, weather_alerts, Incident, RegionCatalog, RegionProfile,
};
use crate::routing::{Priority, Route, RoutePlan, RouteScorer, ScoringWeights, Segment, Shortfall, Waypoint};

use super::worker::{Worker, WorkerInput};

fn into_payload(value: Value) -> anyhow::Result<Payload> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(anyhow!("worker produced a non-object payload: {}", other)),
    }
}

/// Decode `key` of an upstream task's payload.
fn read<T: DeserializeOwned>(input: &WorkerInput<'_>, task_id: &str, key: &str) -> anyhow::Result<T> {
    let value = input
        .upstream_payload(task_id)?
        .get(key)
        .ok_or_else(|| anyhow!("'{}' payload has no '{}'", task_id, key))?;
    serde_json::from_value(value.clone())
        .with_context(|| format!("decoding '{}.{}'", task_id, key))
}

fn profile<'a>(catalog: &'a RegionCatalog, input: &WorkerInput<'_>) -> anyhow::Result<&'a RegionProfile> {
    catalog
        .get(input.region.as_str())
        .map_err(|e| anyhow!("{}", e))
}

/// A zone as the planner publishes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedZone {
    pub name: String,
    pub priority: Priority,
    pub depot: String,
    pub waypoints: Vec<Waypoint>,
    pub duration_minutes: f64,
    pub salt_required: f64,
    pub fuel_required: f64,
}

#[derive(Debug, Deserialize)]
struct ZoneWeather {
    severity: f64,
}

#[derive(Debug, Deserialize)]
struct ZoneTraffic {
    delay_factor: f64,
}

pub struct Planner {
    catalog: Arc<RegionCatalog>,
}

impl Planner {
    pub fn new(catalog: Arc<RegionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Worker for Planner {
    fn name(&self) -> &str {
        "planner"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let profile = profile(&self.catalog, &input)?;
        let zones: Vec<PlannedZone> = profile
            .zones
            .iter()
            .map(|z| PlannedZone {
                name: z.name.clone(),
                priority: z.priority,
                depot: z.depot.clone(),
                waypoints: z.waypoints.clone(),
                duration_minutes: z.duration_minutes,
                salt_required: z.salt_required,
                fuel_required: z.fuel_required,
            })
            .collect();
        let critical = zones
            .iter()
            .filter(|z| z.priority == Priority::Critical)
            .count();
        debug!(region = %input.region, zones = zones.len(), critical, "Planned operation");

        into_payload(json!({
            "region": profile.name,
            "zones": zones,
            "objective": format!(
                "Clear {} zones in {} ({} critical) with the stock on hand",
                zones.len(),
                profile.name,
                critical
            ),
            "delegation": input.allow_delegation,
        }))
    }
}

pub struct WeatherMonitor {
    catalog: Arc<RegionCatalog>,
}

impl WeatherMonitor {
    pub fn new(catalog: Arc<RegionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Worker for WeatherMonitor {
    fn name(&self) -> &str {
        "weather_monitor"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let planned: Vec<PlannedZone> = read(&input, "planning", "zones")?;
        let profile = profile(&self.catalog, &input)?;

        let mut zones = serde_json::Map::new();
        let mut alerts = Vec::new();
        for planned_zone in &planned {
            let zone = profile
                .zone(&planned_zone.name)
                .ok_or_else(|| anyhow!("no observations for zone '{}'", planned_zone.name))?;
            let assessment = assess_weather(&zone.conditions);
            zones.insert(
                zone.name.clone(),
                json!({
                    "snowfall_cm": zone.conditions.snowfall_cm,
                    "temperature_c": zone.conditions.temperature_c,
                    "road_condition": assessment.road_condition,
                    "snow_risk": assessment.snow_risk,
                    "road_surface_temp_c": assessment.road_surface_temp_c,
                    "severity": assessment.severity,
                }),
            );
            alerts.extend(weather_alerts(&zone.name, &zone.conditions));
        }

        into_payload(json!({ "zones": zones, "alerts": alerts }))
    }
}

pub struct TrafficAnalyst {
    catalog: Arc<RegionCatalog>,
}

impl TrafficAnalyst {
    pub fn new(catalog: Arc<RegionCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Worker for TrafficAnalyst {
    fn name(&self) -> &str {
        "traffic_analyst"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let weather: BTreeMap<String, ZoneWeather> = read(&input, "weather", "zones")?;
        let profile = profile(&self.catalog, &input)?;

        let mut zones = serde_json::Map::new();
        for (name, observed) in &weather {
            let incidents: &[Incident] = profile
                .zone(name)
                .map(|z| z.incidents.as_slice())
                .unwrap_or_default();
            zones.insert(
                name.clone(),
                json!({
                    "incidents": incidents,
                    "delay_factor": traffic_delay_factor(incidents, observed.severity),
                }),
            );
        }

        into_payload(json!({ "zones": zones }))
    }
}

pub struct StockManager;

#[async_trait]
impl Worker for StockManager {
    fn name(&self) -> &str {
        "stock_manager"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let levels: Vec<Value> = input
            .ledger
            .items()
            .map(|i| {
                json!({
                    "kind": i.resource_kind,
                    "location": i.location,
                    "quantity": i.quantity,
                    "unit": i.unit,
                })
            })
            .collect();
        let alerts: Vec<Value> = input
            .ledger
            .check_alerts()
            .into_iter()
            .map(|a| {
                json!({
                    "kind": a.item.resource_kind,
                    "location": a.item.location,
                    "quantity": a.item.quantity,
                    "severity": a.severity,
                })
            })
            .collect();

        into_payload(json!({ "levels": levels, "alerts": alerts }))
    }
}

pub struct RouteOptimizer {
    scorer: RouteScorer,
}

impl RouteOptimizer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self {
            scorer: RouteScorer::new(weights),
        }
    }
}

/// Stock on hand at `depot`, zero for kinds the ledger does not track there.
fn depot_stock(ledger: &InventoryLedger, depot: &str) -> BTreeMap<ResourceKind, f64> {
    ResourceKind::ALL
        .iter()
        .map(|&kind| (kind, ledger.quantity(kind, depot).unwrap_or(0.0)))
        .collect()
}

#[async_trait]
impl Worker for RouteOptimizer {
    fn name(&self) -> &str {
        "route_optimizer"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let planned: Vec<PlannedZone> = read(&input, "planning", "zones")?;
        let weather: BTreeMap<String, ZoneWeather> = read(&input, "weather", "zones")?;
        let traffic: BTreeMap<String, ZoneTraffic> = read(&input, "traffic", "zones")?;

        let segments: Vec<Segment> = planned
            .into_iter()
            .map(|z| Segment {
                weather_severity: weather.get(&z.name).map(|w| w.severity).unwrap_or(0.0),
                traffic_delay_factor: traffic
                    .get(&z.name)
                    .map(|t| t.delay_factor)
                    .unwrap_or(1.0),
                required: BTreeMap::from([
                    (ResourceKind::Salt, z.salt_required),
                    (ResourceKind::Fuel, z.fuel_required),
                ]),
                available: depot_stock(input.ledger, &z.depot),
                id: z.name,
                waypoints: z.waypoints,
                priority: z.priority,
                estimated_duration_minutes: z.duration_minutes,
                depot: z.depot,
            })
            .collect();

        let plan = self.scorer.plan(&segments);
        for ((depot, kind), &amount) in plan.consumption() {
            input.ledger.deduct(*kind, depot, amount)?;
        }
        info!(
            routes = plan.routes.len(),
            shortfalls = plan.shortfalls.len(),
            "Routes dispatched"
        );

        into_payload(serde_json::to_value(&plan)?)
    }
}

#[derive(Debug, Deserialize)]
struct StockAlert {
    kind: ResourceKind,
    location: String,
    quantity: f64,
    severity: AlertSeverity,
}

pub struct Notifier;

#[async_trait]
impl Worker for Notifier {
    fn name(&self) -> &str {
        "notifier"
    }

    async fn invoke(&self, input: WorkerInput<'_>) -> anyhow::Result<Payload> {
        let region: String = read(&input, "planning", "region")?;
        let stock_alerts: Vec<StockAlert> = read(&input, "resources", "alerts")?;
        let routes: Vec<Route> = read(&input, "routing", "routes")?;
        let shortfalls: Vec<Shortfall> = read(&input, "routing", "shortfalls")?;

        let mut notifications = Vec::new();
        let first = routes
            .first()
            .map(|r| format!("; first crew to {}", r.id))
            .unwrap_or_default();
        notifications.push(json!({
            "audience": "operations",
            "level": "info",
            "message": format!("{} routes dispatched in {}{}", routes.len(), region, first),
        }));

        let critical: Vec<&str> = routes
            .iter()
            .filter(|r| r.priority == Priority::Critical)
            .map(|r| r.id.as_str())
            .collect();
        if !critical.is_empty() {
            notifications.push(json!({
                "audience": "public",
                "level": "info",
                "message": format!("Snow clearing under way in {}", critical.join(", ")),
            }));
        }

        for s in &shortfalls {
            notifications.push(json!({
                "audience": "depots",
                "level": "warning",
                "message": format!(
                    "{} at {} short of {}: {:.1} of {:.1} assigned",
                    s.route_id, s.depot, s.resource_kind, s.assigned, s.required
                ),
            }));
        }

        for a in &stock_alerts {
            let level = match a.severity {
                AlertSeverity::Critical => "danger",
                AlertSeverity::Low => "warning",
            };
            notifications.push(json!({
                "audience": "procurement",
                "level": level,
                "message": format!(
                    "Reorder {} at {} ({:.1} left, {})",
                    a.kind, a.location, a.quantity, a.severity
                ),
            }));
        }

        into_payload(json!({
            "region": region,
            "notifications": notifications,
            "route_count": routes.len(),
        }))
    }
}

/// Decode the route plan a `route_optimizer` payload carries.
pub fn route_plan(payload: &Payload) -> anyhow::Result<RoutePlan> {
    serde_json::from_value(Value::Object(payload.clone())).context("decoding route plan")
}
