//! Sweep configuration, loaded from TOML.
//!
//! Every field has a default, so a config file only names what it changes.
//!
//! ```toml
//! grid_path = "txla_grid.json"
//! streamline = true
//! integrator = ["tracpy-run"]
//!
//! [seeding]
//! kind = "gaussian"
//! n = 30
//! dlon = 0.1
//! dlat = 0.1
//! seed = 7
//!
//! [window]
//! window_hours = 48
//! step_hours = 4
//! placement = "before"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::event::EventCatalog;
use crate::request::{Direction, IntegratorParams};
use crate::seed::SeedStrategy;

/// Where offsets sit relative to the found date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowPlacement {
    /// `0, -step, ..` : start dates leading up to the find.
    #[default]
    Before,
    /// `0, step, ..`
    After,
    /// Symmetric around the found date.
    Around,
}

/// The offsets swept for every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeWindow {
    pub window_hours: u32,
    pub step_hours: u32,
    pub placement: WindowPlacement,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            window_hours: 48,
            step_hours: 4,
            placement: WindowPlacement::Before,
        }
    }
}

impl TimeWindow {
    /// Offsets in hours, nearest to the found date first.
    ///
    /// `Before` and `After` give `max(1, window / step)` offsets; `Around`
    /// mirrors them on both sides of zero.
    pub fn offsets(&self) -> Vec<i64> {
        let step = i64::from(self.step_hours.max(1));
        let count = (i64::from(self.window_hours) / step).max(1);
        match self.placement {
            WindowPlacement::Before => (0..count).map(|k| -k * step).collect(),
            WindowPlacement::After => (0..count).map(|k| k * step).collect(),
            WindowPlacement::Around => {
                let mut offsets = vec![0];
                for k in 1..count {
                    offsets.push(-k * step);
                    offsets.push(k * step);
                }
                offsets
            }
        }
    }
}

/// Everything a sweep needs besides the grid and event data themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// JSON grid file (`lon_rho`, `lat_rho`, `mask_rho`).
    pub grid_path: PathBuf,
    /// Artifacts go to `<output_root>/tracks/`.
    pub output_root: PathBuf,
    /// Built-in catalog version, ignored when `catalog_file` is set.
    pub catalog: String,
    pub catalog_file: Option<PathBuf>,
    /// Event indices to sweep; empty means all.
    pub events: Vec<usize>,
    pub direction: Direction,
    pub streamline: bool,
    pub max_concurrent: usize,
    /// Per-request integrator timeout; 0 disables it.
    pub timeout_secs: u64,
    /// External integrator program and arguments.
    pub integrator: Vec<String>,
    pub seeding: SeedStrategy,
    pub window: TimeWindow,
    pub params: IntegratorParams,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            grid_path: PathBuf::from("grid.json"),
            output_root: PathBuf::from("."),
            catalog: "packages-2013".to_string(),
            catalog_file: None,
            events: Vec::new(),
            direction: Direction::default(),
            streamline: false,
            max_concurrent: 4,
            timeout_secs: 0,
            integrator: Vec::new(),
            seeding: SeedStrategy::default(),
            window: TimeWindow::default(),
            params: IntegratorParams::default(),
        }
    }
}

impl SweepConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: SweepConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.window.step_hours == 0 {
            return invalid("window.step_hours must be positive");
        }
        if self.max_concurrent == 0 {
            return invalid("max_concurrent must be positive");
        }
        match self.seeding {
            SeedStrategy::Mesh { n, dlon, dlat } | SeedStrategy::Gaussian { n, dlon, dlat, .. } => {
                if n == 0 {
                    return invalid("seeding.n must be positive");
                }
                if !(dlon >= 0.0 && dlat >= 0.0 && dlon.is_finite() && dlat.is_finite()) {
                    return invalid("seeding spreads must be finite and non-negative");
                }
            }
            SeedStrategy::SinglePoint { .. } => {}
        }
        let builtin = crate::event::BUILTIN_VERSIONS.contains(&self.catalog.as_str());
        if self.catalog_file.is_none() && !builtin {
            return Err(ConfigError::UnknownCatalog(self.catalog.clone()));
        }
        Ok(())
    }

    /// The configured catalog, restricted to `events` when non-empty.
    pub fn load_events(&self) -> Result<EventCatalog, ConfigError> {
        let catalog = match &self.catalog_file {
            Some(path) => EventCatalog::from_json_file(path)?,
            None => EventCatalog::builtin(&self.catalog)?,
        };
        if self.events.is_empty() {
            return Ok(catalog);
        }

        let mut selected = Vec::with_capacity(self.events.len());
        for &index in &self.events {
            let event = catalog.get(index).ok_or_else(|| {
                ConfigError::Invalid(format!("no event {index} in {}", catalog.version))
            })?;
            selected.push(event.clone());
        }
        EventCatalog::new(catalog.version, selected)
    }
}
