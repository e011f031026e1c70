//! Inventory ledger: the single source of truth for consumable stock.
//!
//! Quantities never go negative. A deduction larger than the stock on hand
//! fails with `InsufficientStock` and leaves the ledger untouched. When the
//! ledger is backed by a file, every successful mutation is flushed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Kind of consumable resource tracked per depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Salt,
    Fuel,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Salt, ResourceKind::Fuel];

    /// Unit quantities of this kind are recorded in.
    pub fn default_unit(&self) -> &'static str {
        match self {
            ResourceKind::Salt => "t",
            ResourceKind::Fuel => "L",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Salt => write!(f, "salt"),
            ResourceKind::Fuel => write!(f, "fuel"),
        }
    }
}

impl std::str::FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "salt" => Ok(ResourceKind::Salt),
            "fuel" => Ok(ResourceKind::Fuel),
            other => Err(Error::Validation(format!("unknown resource kind: {}", other))),
        }
    }
}

/// Stock of one resource kind at one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub resource_kind: ResourceKind,
    pub location: String,
    pub quantity: f64,
    pub unit: String,
    pub last_updated: DateTime<Utc>,
    pub reorder_threshold: f64,
}

impl InventoryItem {
    pub fn new(kind: ResourceKind, location: &str, quantity: f64, reorder_threshold: f64) -> Self {
        Self {
            resource_kind: kind,
            location: location.to_string(),
            quantity,
            unit: kind.default_unit().to_string(),
            last_updated: Utc::now(),
            reorder_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryAlert {
    pub item: InventoryItem,
    pub severity: AlertSeverity,
}

/// Alerting policy.
///
/// An item is `low` at or below its reorder threshold and `critical` at or
/// below `threshold * critical_ratio`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertPolicy {
    #[serde(default = "default_critical_ratio")]
    pub critical_ratio: f64,
}

fn default_critical_ratio() -> f64 {
    0.5
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            critical_ratio: default_critical_ratio(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    items: Vec<InventoryItem>,
}

#[derive(Debug, Default)]
pub struct InventoryLedger {
    items: BTreeMap<(ResourceKind, String), InventoryItem>,
    path: Option<PathBuf>,
    policy: AlertPolicy,
}

impl InventoryLedger {
    /// An in-memory ledger with no backing file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a file-backed ledger. A missing file yields an empty ledger that
    /// will be created on the first flush.
    pub fn open(path: &Path) -> Result<Self> {
        let mut ledger = Self {
            path: Some(path.to_path_buf()),
            ..Self::default()
        };
        if path.exists() {
            let file: LedgerFile = serde_json::from_str(&fs::read_to_string(path)?)?;
            for item in file.items {
                validate_item(&item)?;
                ledger
                    .items
                    .insert((item.resource_kind, item.location.clone()), item);
            }
            info!(path = %path.display(), items = ledger.items.len(), "Inventory loaded");
        } else {
            debug!(path = %path.display(), "Inventory file not found, starting empty");
        }
        Ok(ledger)
    }

    /// Open a file-backed ledger, seeding and writing `seed` when the file
    /// does not exist yet.
    pub fn open_or_seed(
        path: &Path,
        seed: impl IntoIterator<Item = InventoryItem>,
    ) -> Result<Self> {
        let existed = path.exists();
        let mut ledger = Self::open(path)?;
        if !existed {
            for item in seed {
                validate_item(&item)?;
                ledger
                    .items
                    .insert((item.resource_kind, item.location.clone()), item);
            }
            ledger.flush()?;
            info!(path = %path.display(), items = ledger.items.len(), "Inventory seeded");
        }
        Ok(ledger)
    }

    pub fn with_policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Items ordered by kind, then location.
    pub fn items(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.values()
    }

    pub fn item(&self, kind: ResourceKind, location: &str) -> Option<&InventoryItem> {
        self.items.get(&(kind, location.to_string()))
    }

    /// Add or replace an item.
    pub fn upsert(&mut self, item: InventoryItem) -> Result<()> {
        validate_item(&item)?;
        self.store(item)
    }

    /// Current stock of `kind` at `location`.
    pub fn quantity(&self, kind: ResourceKind, location: &str) -> Result<f64> {
        self.item(kind, location)
            .map(|i| i.quantity)
            .ok_or_else(|| Error::NotFound(format!("{} inventory at {}", kind, location)))
    }

    /// Stock of `kind` summed over every location.
    pub fn total(&self, kind: ResourceKind) -> f64 {
        self.items
            .values()
            .filter(|i| i.resource_kind == kind)
            .map(|i| i.quantity)
            .sum()
    }

    /// Remove `amount` from stock.
    ///
    /// # Errors
    /// - `InsufficientStock` if `amount` exceeds the quantity on hand; the
    ///   item is left unchanged
    /// - `NotFound` for an unknown item, `Validation` for a negative amount
    pub fn deduct(&mut self, kind: ResourceKind, location: &str, amount: f64) -> Result<f64> {
        validate_amount(amount)?;
        let mut item = self
            .item(kind, location)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} inventory at {}", kind, location)))?;

        if amount > item.quantity {
            return Err(Error::InsufficientStock {
                kind,
                location: location.to_string(),
                requested: amount,
                available: item.quantity,
            });
        }

        item.quantity -= amount;
        item.last_updated = Utc::now();
        let remaining = item.quantity;
        self.store(item)?;
        debug!(%kind, location, amount, remaining, "Inventory deducted");
        Ok(remaining)
    }

    /// Add `amount` to stock.
    pub fn replenish(&mut self, kind: ResourceKind, location: &str, amount: f64) -> Result<f64> {
        validate_amount(amount)?;
        let mut item = self
            .item(kind, location)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{} inventory at {}", kind, location)))?;

        item.quantity += amount;
        item.last_updated = Utc::now();
        let remaining = item.quantity;
        self.store(item)?;
        debug!(%kind, location, amount, remaining, "Inventory replenished");
        Ok(remaining)
    }

    /// Replace an item and flush. The previous state is put back when the
    /// flush fails, so memory and file never disagree.
    fn store(&mut self, item: InventoryItem) -> Result<()> {
        let key = (item.resource_kind, item.location.clone());
        let previous = self.items.insert(key.clone(), item);
        if let Err(e) = self.flush() {
            match previous {
                Some(old) => {
                    self.items.insert(key, old);
                }
                None => {
                    self.items.remove(&key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Items at or below their reorder threshold. Read-only.
    pub fn check_alerts(&self) -> Vec<InventoryAlert> {
        self.items
            .values()
            .filter_map(|item| {
                let severity = if item.quantity <= item.reorder_threshold * self.policy.critical_ratio
                {
                    AlertSeverity::Critical
                } else if item.quantity <= item.reorder_threshold {
                    AlertSeverity::Low
                } else {
                    return None;
                };
                Some(InventoryAlert {
                    item: item.clone(),
                    severity,
                })
            })
            .collect()
    }

    /// Write the ledger to its backing file, if any.
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = LedgerFile {
            items: self.items.values().cloned().collect(),
        };
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&temp_path, path)?;
        debug!(path = %path.display(), items = file.items.len(), "Inventory flushed");
        Ok(())
    }
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(Error::Validation(format!(
            "inventory amount must be a non-negative number, got {}",
            amount
        )));
    }
    Ok(())
}

fn validate_item(item: &InventoryItem) -> Result<()> {
    if !item.quantity.is_finite() || item.quantity < 0.0 {
        return Err(Error::Validation(format!(
            "{} at {} has invalid quantity {}",
            item.resource_kind, item.location, item.quantity
        )));
    }
    Ok(())
}
