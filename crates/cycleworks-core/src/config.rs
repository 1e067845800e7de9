//! Setup parameters for a factory: its stations and global knobs.
//!
//! A [`FactoryConfig`] is validated once, when the controller is built from
//! it. There is no runtime reconfiguration; stations can only be disabled and
//! re-enabled after construction.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::cycle::{CycleError, StationRecipe};
use crate::fixed::{Fixed64, Position, Ticks};
use crate::sim::SimulationStrategy;

/// Processing time used when a station does not specify one.
pub const DEFAULT_PROCESSING_DURATION: Ticks = 10;

/// Arrival radius used when a station does not specify one.
pub const DEFAULT_ARRIVAL_THRESHOLD: f64 = 0.1;

/// Unit travel speed (distance per tick) used when the factory does not
/// specify one.
pub const DEFAULT_UNIT_SPEED: f64 = 5.0;

/// Default ring buffer capacity per event kind.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while loading or validating a factory configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("factory has no stations")]
    NoStations,

    #[error("station '{label}' has a zero processing duration")]
    ZeroDuration { label: String },

    #[error("station '{label}' has a non-positive arrival threshold")]
    NonPositiveThreshold { label: String },

    #[error("unit speed must be positive")]
    NonPositiveSpeed,

    #[error("delta strategy needs a non-zero fixed timestep")]
    ZeroTimestep,

    #[error("duplicate station label '{label}'")]
    DuplicateLabel { label: String },

    #[error(transparent)]
    Domain(#[from] CycleError),

    #[error("{format} parse error: {detail}")]
    Parse { format: &'static str, detail: String },

    #[error("unsupported config format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Station config
// ---------------------------------------------------------------------------

/// Fixed per-station parameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StationConfig {
    pub label: String,
    pub recipe: StationRecipe,
    pub processing_duration: Ticks,
    pub arrival_threshold: Fixed64,
    pub position: Position,
    /// Stations configured as disabled start `Disabled` and spawn no unit.
    pub enabled: bool,
}

impl StationConfig {
    pub fn new(label: impl Into<String>, recipe: StationRecipe) -> Self {
        Self {
            label: label.into(),
            recipe,
            processing_duration: DEFAULT_PROCESSING_DURATION,
            arrival_threshold: Fixed64::from_num(DEFAULT_ARRIVAL_THRESHOLD),
            position: Position::ORIGIN,
            enabled: true,
        }
    }

    pub fn with_duration(mut self, ticks: Ticks) -> Self {
        self.processing_duration = ticks;
        self
    }

    pub fn with_threshold(mut self, threshold: Fixed64) -> Self {
        self.arrival_threshold = threshold;
        self
    }

    pub fn at(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Factory config
// ---------------------------------------------------------------------------

/// Everything needed to build a controller.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FactoryConfig {
    pub stations: Vec<StationConfig>,
    pub unit_speed: Fixed64,
    pub strategy: SimulationStrategy,
    /// Re-route parked units whenever a station is enabled. Off by default:
    /// parked units otherwise wait for an explicit `reroute_parked()`.
    pub reroute_on_enable: bool,
    pub event_capacity: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            stations: Vec::new(),
            unit_speed: Fixed64::from_num(DEFAULT_UNIT_SPEED),
            strategy: SimulationStrategy::Tick,
            reroute_on_enable: false,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl FactoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(mut self, station: StationConfig) -> Self {
        self.stations.push(station);
        self
    }

    pub fn with_unit_speed(mut self, speed: Fixed64) -> Self {
        self.unit_speed = speed;
        self
    }

    pub fn with_strategy(mut self, strategy: SimulationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_reroute_on_enable(mut self, enabled: bool) -> Self {
        self.reroute_on_enable = enabled;
        self
    }

    /// Check every constraint, reporting the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stations.is_empty() {
            return Err(ConfigError::NoStations);
        }
        if self.unit_speed <= Fixed64::ZERO {
            return Err(ConfigError::NonPositiveSpeed);
        }
        if let SimulationStrategy::Delta { fixed_timestep: 0 } = self.strategy {
            return Err(ConfigError::ZeroTimestep);
        }

        let mut labels = HashSet::with_capacity(self.stations.len());
        for station in &self.stations {
            if station.processing_duration == 0 {
                return Err(ConfigError::ZeroDuration {
                    label: station.label.clone(),
                });
            }
            if station.arrival_threshold <= Fixed64::ZERO {
                return Err(ConfigError::NonPositiveThreshold {
                    label: station.label.clone(),
                });
            }
            if !labels.insert(station.label.as_str()) {
                return Err(ConfigError::DuplicateLabel {
                    label: station.label.clone(),
                });
            }
        }
        Ok(())
    }
}
