pub mod config;
pub mod context;
pub mod core;
pub mod error;
pub mod inventory;
pub mod log;
pub mod orchestration;
pub mod region;
pub mod report;
pub mod routing;

pub use error::{Error, Result};
