use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::inventory::AlertPolicy;
use crate::routing::ScoringWeights;
use crate::{Error, Result};

pub const DEFAULT_REGION: &str = "New-York";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Region used when a command does not name one.
    pub region: Option<String>,
    pub data_dir: Option<String>,
    pub inventory_path: Option<String>,
    pub checkpoint_dir: Option<String>,
    /// TOML task graph replacing the built-in pipeline.
    pub pipeline_path: Option<String>,
    /// TOML region catalog replacing the built-in regions.
    pub regions_path: Option<String>,
    #[serde(default)]
    pub alerts: AlertPolicy,
    #[serde(default)]
    pub scoring: ScoringWeights,
}

impl Config {
    pub fn snowplan_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".snowplan"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::snowplan_dir()?.join("snowplan.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::snowplan_dir()?.join("snowplan.log"))
    }

    pub fn effective_region(&self) -> &str {
        self.region.as_deref().unwrap_or(DEFAULT_REGION)
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Self::snowplan_dir(),
        }
    }

    pub fn inventory_path(&self) -> Result<PathBuf> {
        match &self.inventory_path {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(self.data_dir()?.join("inventory.json")),
        }
    }

    pub fn checkpoint_dir(&self) -> Result<PathBuf> {
        match &self.checkpoint_dir {
            Some(dir) => Ok(expand_tilde(dir)),
            None => Ok(self.data_dir()?.join("checkpoints")),
        }
    }

    pub fn pipeline_path(&self) -> Option<PathBuf> {
        self.pipeline_path.as_deref().map(expand_tilde)
    }

    pub fn regions_path(&self) -> Option<PathBuf> {
        self.regions_path.as_deref().map(expand_tilde)
    }

    /// Load from the default location.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "Config::load");
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        if !(config.alerts.critical_ratio > 0.0 && config.alerts.critical_ratio <= 1.0) {
            return Err(Error::Configuration(format!(
                "alerts.critical_ratio must be in (0, 1], got {}",
                config.alerts.critical_ratio
            )));
        }
        debug!(
            region = config.effective_region(),
            pipeline = ?config.pipeline_path,
            regions = ?config.regions_path,
            "Config loaded"
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!(dir = %parent.display(), "Creating config directory");
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        let data_dir = self.data_dir()?;
        let checkpoint_dir = self.checkpoint_dir()?;
        debug!(
            data = %data_dir.display(),
            checkpoints = %checkpoint_dir.display(),
            "Config::ensure_dirs"
        );
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }
        if !checkpoint_dir.exists() {
            fs::create_dir_all(&checkpoint_dir)?;
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
