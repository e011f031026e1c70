//! Structured run summary for external renderers.
//!
//! The report reads task payloads by their keys rather than by task id, so
//! it works for any pipeline whose workers follow the built-in contracts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::ContextSnapshot;
use crate::core::{Region, RunId, TaskStatus};
use crate::inventory::{InventoryAlert, InventoryLedger, ResourceKind};
use crate::region::WeatherAlert;
use crate::routing::{Route, Shortfall};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub produced_at: DateTime<Utc>,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Option<RunId>,
    pub region: Region,
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<TaskSummary>,
    pub routes: Vec<Route>,
    pub shortfalls: Vec<Shortfall>,
    pub total_duration_minutes: f64,
    pub resources_assigned: BTreeMap<ResourceKind, f64>,
    pub weather_alerts: Vec<WeatherAlert>,
    pub inventory_alerts: Vec<InventoryAlert>,
    pub notifications: Vec<Value>,
}

fn decode<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    serde_json::from_value(value?.clone()).ok()
}

impl RunReport {
    pub fn build(
        run_id: Option<RunId>,
        region: &Region,
        snapshot: &ContextSnapshot,
        ledger: &InventoryLedger,
    ) -> Self {
        let tasks = snapshot
            .entries
            .iter()
            .map(|r| TaskSummary {
                task_id: r.task_id.clone(),
                produced_at: r.produced_at,
                status: r.status.clone(),
            })
            .collect();

        let mut routes: Vec<Route> = Vec::new();
        let mut shortfalls: Vec<Shortfall> = Vec::new();
        let mut weather_alerts: Vec<WeatherAlert> = Vec::new();
        let mut notifications: Vec<Value> = Vec::new();
        for entry in snapshot.entries.iter().filter(|r| r.is_ok()) {
            let payload = &entry.payload;
            if let Some(found) = decode(payload.get("routes")) {
                routes = found;
                shortfalls = decode(payload.get("shortfalls")).unwrap_or_default();
            }
            if let Some(found) = decode::<Vec<WeatherAlert>>(payload.get("alerts")) {
                weather_alerts.extend(found);
            }
            if let Some(found) = decode(payload.get("notifications")) {
                notifications = found;
            }
        }

        let mut resources_assigned = BTreeMap::new();
        for route in &routes {
            for (kind, amount) in &route.assigned_resources {
                *resources_assigned.entry(*kind).or_insert(0.0) += amount;
            }
        }

        Self {
            run_id,
            region: region.clone(),
            generated_at: Utc::now(),
            tasks,
            total_duration_minutes: routes.iter().map(|r| r.estimated_duration_minutes).sum(),
            routes,
            shortfalls,
            resources_assigned,
            weather_alerts,
            inventory_alerts: ledger.check_alerts(),
            notifications,
        }
    }

    pub fn failed_tasks(&self) -> Vec<&TaskSummary> {
        self.tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Failed { .. }))
            .collect()
    }
}
