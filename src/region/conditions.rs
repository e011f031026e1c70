//! Weather and traffic assessment for a zone.
//!
//! Observations come from the region catalog; these functions turn them
//! into the severity and delay numbers the route scorer consumes.

use serde::{Deserialize, Serialize};

/// Observed weather for a zone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Snowfall over the last hours, in cm.
    pub snowfall_cm: f64,
    pub temperature_c: f64,
    #[serde(default)]
    pub humidity_pct: f64,
    #[serde(default)]
    pub cloud_cover_pct: f64,
    #[serde(default)]
    pub night: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnowRisk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadCondition {
    Clear,
    PotentialIce,
    Snowy,
    Icy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherAlert {
    pub level: AlertLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherAssessment {
    pub snow_risk: SnowRisk,
    pub road_condition: RoadCondition,
    pub road_surface_temp_c: f64,
    /// 0 (clear) to 1 (severe).
    pub severity: f64,
}

/// Accumulation at which the snow share of severity saturates.
const SATURATING_SNOWFALL_CM: f64 = 30.0;

pub fn assess_weather(c: &Conditions) -> WeatherAssessment {
    let has_snow = c.snowfall_cm > 0.0;

    let snow_risk = if c.temperature_c <= 0.0 && c.humidity_pct > 80.0 {
        SnowRisk::High
    } else if c.temperature_c <= 2.0 {
        SnowRisk::Medium
    } else {
        SnowRisk::Low
    };

    let road_condition = match (has_snow, c.temperature_c) {
        (true, t) if t <= -5.0 => RoadCondition::Icy,
        (true, _) => RoadCondition::Snowy,
        (false, t) if t <= 0.0 => RoadCondition::PotentialIce,
        (false, _) => RoadCondition::Clear,
    };

    let surface = match road_condition {
        RoadCondition::Icy => 0.4,
        RoadCondition::Snowy => 0.25,
        RoadCondition::PotentialIce => 0.2,
        RoadCondition::Clear => 0.0,
    };
    let accumulation = (c.snowfall_cm / SATURATING_SNOWFALL_CM).clamp(0.0, 1.0) * 0.6;

    WeatherAssessment {
        snow_risk,
        road_condition,
        road_surface_temp_c: road_surface_temp(c.temperature_c, c.cloud_cover_pct, c.night),
        severity: (accumulation + surface).clamp(0.0, 1.0),
    }
}

/// Rough pavement temperature: colder than air on clear nights, warmer on
/// clear days, clouds damping both.
pub fn road_surface_temp(air_temp_c: f64, cloud_cover_pct: f64, night: bool) -> f64 {
    let cover = (cloud_cover_pct / 100.0).clamp(0.0, 1.0);
    if night {
        air_temp_c - 3.0 * (1.0 - cover)
    } else {
        air_temp_c + 12.0 * (1.0 - cover)
    }
}

pub fn weather_alerts(zone: &str, c: &Conditions) -> Vec<WeatherAlert> {
    let mut alerts = Vec::new();
    if c.snowfall_cm > 20.0 {
        alerts.push(WeatherAlert {
            level: AlertLevel::Danger,
            message: format!("{}: heavy snow accumulation {:.1}cm", zone, c.snowfall_cm),
        });
    }
    if c.temperature_c < -20.0 {
        alerts.push(WeatherAlert {
            level: AlertLevel::Warning,
            message: format!("{}: extreme cold {:.1}°C", zone, c.temperature_c),
        });
    }
    alerts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentCategory {
    Accident,
    RoadClosed,
    RoadWorks,
    Jam,
}

impl IncidentCategory {
    /// Added to the delay factor per incident.
    pub fn delay_weight(&self) -> f64 {
        match self {
            IncidentCategory::Accident => 0.3,
            IncidentCategory::RoadClosed => 1.0,
            IncidentCategory::RoadWorks => 0.2,
            IncidentCategory::Jam => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub category: IncidentCategory,
    pub description: String,
}

/// Slowdown relative to free flow; always at least 1.
pub fn traffic_delay_factor(incidents: &[Incident], weather_severity: f64) -> f64 {
    let incident_delay: f64 = incidents.iter().map(|i| i.category.delay_weight()).sum();
    1.0 + incident_delay + 0.25 * weather_severity.clamp(0.0, 1.0)
}
