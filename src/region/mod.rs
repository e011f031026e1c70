//! Region catalog: the zones, depots and observed conditions of each
//! operational region.
//!
//! The built-in catalog covers Toronto, Montreal, Quebec and New-York. A
//! TOML catalog (`[[region]]` tables) can replace it.

pub mod conditions;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::inventory::{InventoryItem, ResourceKind};
use crate::routing::{Priority, Waypoint};

pub use conditions::{
    assess_weather, traffic_delay_factor, weather_alerts, AlertLevel, Conditions, Incident,
    IncidentCategory, RoadCondition, SnowRisk, WeatherAlert, WeatherAssessment,
};

/// Stock seeded for every depot when no inventory file exists yet.
pub const SEED_SALT_TONNES: f64 = 400.0;
pub const SEED_SALT_THRESHOLD: f64 = 100.0;
pub const SEED_FUEL_LITRES: f64 = 20_000.0;
pub const SEED_FUEL_THRESHOLD: f64 = 5_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub name: String,
    pub priority: Priority,
    pub depot: String,
    pub waypoints: Vec<Waypoint>,
    pub duration_minutes: f64,
    pub salt_required: f64,
    pub fuel_required: f64,
    pub conditions: Conditions,
    #[serde(default)]
    pub incidents: Vec<Incident>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionProfile {
    pub name: String,
    pub zones: Vec<Zone>,
}

impl RegionProfile {
    pub fn zone(&self, name: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.name == name)
    }

    /// Depot names in first-use order.
    pub fn depots(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.zones
            .iter()
            .map(|z| z.depot.as_str())
            .filter(|d| seen.insert(*d))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionCatalog {
    #[serde(default, rename = "region")]
    pub regions: Vec<RegionProfile>,
}

impl RegionCatalog {
    /// Load a catalog from TOML.
    pub fn load(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Loading region catalog");
        let catalog: Self = toml::from_str(&std::fs::read_to_string(path)?)?;
        if catalog.regions.is_empty() {
            return Err(Error::Configuration(format!(
                "Region catalog {} declares no regions",
                path.display()
            )));
        }
        Ok(catalog)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, name: &str) -> Result<&RegionProfile> {
        self.regions
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "region '{}' (available: {})",
                    name,
                    self.names().join(", ")
                ))
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }

    /// Seed stock for every depot in the catalog.
    pub fn seed_inventory(&self) -> Vec<InventoryItem> {
        let mut depots = BTreeSet::new();
        for region in &self.regions {
            for depot in region.depots() {
                depots.insert(depot.to_string());
            }
        }
        depots
            .iter()
            .flat_map(|depot| {
                [
                    InventoryItem::new(
                        ResourceKind::Salt,
                        depot,
                        SEED_SALT_TONNES,
                        SEED_SALT_THRESHOLD,
                    ),
                    InventoryItem::new(
                        ResourceKind::Fuel,
                        depot,
                        SEED_FUEL_LITRES,
                        SEED_FUEL_THRESHOLD,
                    ),
                ]
            })
            .collect()
    }

    pub fn builtin() -> Self {
        Self {
            regions: vec![toronto(), montreal(), quebec(), new_york()],
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn zone(
    name: &str,
    priority: Priority,
    depot: &str,
    waypoints: &[(f64, f64)],
    duration_minutes: f64,
    salt_required: f64,
    fuel_required: f64,
    conditions: Conditions,
    incidents: Vec<Incident>,
) -> Zone {
    Zone {
        name: name.to_string(),
        priority,
        depot: depot.to_string(),
        waypoints: waypoints
            .iter()
            .map(|&(lat, lon)| Waypoint::new(lat, lon))
            .collect(),
        duration_minutes,
        salt_required,
        fuel_required,
        conditions,
        incidents,
    }
}

fn weather(snowfall_cm: f64, temperature_c: f64, humidity_pct: f64, night: bool) -> Conditions {
    Conditions {
        snowfall_cm,
        temperature_c,
        humidity_pct,
        cloud_cover_pct: 80.0,
        night,
    }
}

fn incident(category: IncidentCategory, description: &str) -> Incident {
    Incident {
        category,
        description: description.to_string(),
    }
}

fn toronto() -> RegionProfile {
    RegionProfile {
        name: "Toronto".to_string(),
        zones: vec![
            zone(
                "Downtown Toronto",
                Priority::Critical,
                "Commissioners Yard",
                &[(43.6532, -79.3832), (43.6481, -79.3790)],
                75.0,
                38.0,
                620.0,
                weather(12.0, -4.0, 85.0, true),
                vec![incident(IncidentCategory::Accident, "Collision on Gardiner Expressway")],
            ),
            zone(
                "North York",
                Priority::High,
                "Bermondsey Yard",
                &[(43.7046, -79.3590), (43.7615, -79.4111)],
                90.0,
                32.0,
                700.0,
                weather(15.0, -6.0, 80.0, true),
                vec![],
            ),
            zone(
                "West Toronto",
                Priority::Normal,
                "Commissioners Yard",
                &[(43.6481, -79.4143), (43.6555, -79.4502)],
                60.0,
                24.0,
                480.0,
                weather(10.0, -3.0, 75.0, true),
                vec![incident(IncidentCategory::RoadWorks, "Lane restriction on Dundas St W")],
            ),
            zone(
                "East Toronto",
                Priority::High,
                "Bermondsey Yard",
                &[(43.6389, -79.3515), (43.6791, -79.2947)],
                70.0,
                28.0,
                540.0,
                weather(14.0, -5.0, 82.0, true),
                vec![],
            ),
        ],
    }
}

fn montreal() -> RegionProfile {
    RegionProfile {
        name: "Montreal".to_string(),
        zones: vec![
            zone(
                "Downtown Montreal",
                Priority::Critical,
                "Depot Saint-Michel",
                &[(45.5017, -73.5673), (45.4972, -73.5790)],
                80.0,
                42.0,
                650.0,
                weather(22.0, -12.0, 88.0, true),
                vec![incident(IncidentCategory::Jam, "Congestion on Autoroute Ville-Marie")],
            ),
            zone(
                "Plateau Mont-Royal",
                Priority::High,
                "Depot Saint-Michel",
                &[(45.5088, -73.5878), (45.5225, -73.5800)],
                65.0,
                30.0,
                520.0,
                weather(20.0, -11.0, 85.0, true),
                vec![],
            ),
            zone(
                "Westmount",
                Priority::Normal,
                "Depot Cote-des-Neiges",
                &[(45.4697, -73.6132), (45.4836, -73.5970)],
                55.0,
                22.0,
                430.0,
                weather(18.0, -10.0, 84.0, true),
                vec![],
            ),
            zone(
                "Outremont",
                Priority::Normal,
                "Depot Cote-des-Neiges",
                &[(45.5461, -73.6369), (45.5200, -73.6080)],
                50.0,
                20.0,
                410.0,
                weather(19.0, -10.0, 86.0, true),
                vec![incident(IncidentCategory::RoadClosed, "Chemin de la Cote-Sainte-Catherine closed")],
            ),
        ],
    }
}

fn quebec() -> RegionProfile {
    RegionProfile {
        name: "Quebec".to_string(),
        zones: vec![
            zone(
                "Old Quebec",
                Priority::Critical,
                "Centre de Services Charest",
                &[(46.8139, -71.2080), (46.8123, -71.2145)],
                70.0,
                35.0,
                560.0,
                weather(25.0, -18.0, 90.0, false),
                vec![],
            ),
            zone(
                "Saint-Roch",
                Priority::High,
                "Centre de Services Charest",
                &[(46.8483, -71.2329), (46.8170, -71.2270)],
                60.0,
                30.0,
                500.0,
                weather(24.0, -17.0, 88.0, false),
                vec![incident(IncidentCategory::Accident, "Collision on Boulevard Charest")],
            ),
            zone(
                "Sainte-Foy",
                Priority::High,
                "Centre de Services Sainte-Foy",
                &[(46.7737, -71.2757), (46.7790, -71.3010)],
                85.0,
                36.0,
                640.0,
                weather(27.0, -21.0, 87.0, false),
                vec![],
            ),
            zone(
                "Beauport",
                Priority::Normal,
                "Centre de Services Sainte-Foy",
                &[(46.8063, -71.1534), (46.8590, -71.1920)],
                75.0,
                26.0,
                520.0,
                weather(23.0, -19.0, 86.0, false),
                vec![incident(IncidentCategory::RoadWorks, "Roadworks on Autoroute Dufferin-Montmorency")],
            ),
        ],
    }
}

fn new_york() -> RegionProfile {
    RegionProfile {
        name: "New-York".to_string(),
        zones: vec![
            zone(
                "Manhattan",
                Priority::Critical,
                "Manhattan Garage",
                &[(40.7831, -73.9712), (40.7580, -73.9855)],
                95.0,
                40.0,
                720.0,
                weather(16.0, -3.0, 83.0, false),
                vec![
                    incident(IncidentCategory::Jam, "Heavy traffic on FDR Drive"),
                    incident(IncidentCategory::Accident, "Collision at Columbus Circle"),
                ],
            ),
            zone(
                "Brooklyn",
                Priority::High,
                "Brooklyn Garage",
                &[(40.6782, -73.9442), (40.6928, -73.9903)],
                85.0,
                34.0,
                650.0,
                weather(14.0, -2.0, 80.0, false),
                vec![],
            ),
            zone(
                "Queens",
                Priority::Normal,
                "Brooklyn Garage",
                &[(40.7282, -73.7949), (40.7498, -73.8800)],
                80.0,
                30.0,
                600.0,
                weather(13.0, -2.0, 78.0, false),
                vec![],
            ),
            zone(
                "Bronx",
                Priority::High,
                "Manhattan Garage",
                &[(40.8448, -73.8648), (40.8176, -73.9209)],
                75.0,
                29.0,
                560.0,
                weather(15.0, -4.0, 82.0, false),
                vec![incident(IncidentCategory::RoadWorks, "Lane closure on Cross Bronx Expressway")],
            ),
        ],
    }
}
