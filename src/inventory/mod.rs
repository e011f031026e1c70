//! Consumable resource tracking (salt, fuel) per depot.

mod ledger;

pub use ledger::{
    AlertPolicy, AlertSeverity, InventoryAlert, InventoryItem, InventoryLedger, ResourceKind,
};
