//! Data-driven factory loading from RON or JSON.
//!
//! Feature-gated behind `data-loader`. Files name recipes as strings
//! (`"AB"`, `"bc"`, ...) and give positions as float triples; both are
//! converted into a typed [`FactoryConfig`] and validated before returning.

use std::path::Path;

use crate::config::{
    ConfigError, DEFAULT_ARRIVAL_THRESHOLD, DEFAULT_EVENT_CAPACITY, DEFAULT_PROCESSING_DURATION,
    DEFAULT_UNIT_SPEED, FactoryConfig, StationConfig,
};
use crate::cycle::StationRecipe;
use crate::fixed::{Fixed64, Position, Ticks, f64_to_fixed64};
use crate::sim::SimulationStrategy;

// ---------------------------------------------------------------------------
// File data structures
// ---------------------------------------------------------------------------

/// Top-level factory file.
#[derive(Debug, serde::Deserialize)]
pub struct FactoryData {
    pub stations: Vec<StationData>,
    #[serde(default = "default_unit_speed")]
    pub unit_speed: f64,
    /// When set, the controller runs in delta mode with this step size.
    #[serde(default)]
    pub fixed_timestep: Option<Ticks>,
    #[serde(default)]
    pub reroute_on_enable: bool,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// One station entry.
#[derive(Debug, serde::Deserialize)]
pub struct StationData {
    pub label: String,
    pub recipe: String, // "AB", "BC" or "CA"
    #[serde(default = "default_duration")]
    pub processing_duration: Ticks,
    #[serde(default = "default_threshold")]
    pub arrival_threshold: f64,
    #[serde(default)]
    pub position: (f64, f64, f64),
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_unit_speed() -> f64 {
    DEFAULT_UNIT_SPEED
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_duration() -> Ticks {
    DEFAULT_PROCESSING_DURATION
}

fn default_threshold() -> f64 {
    DEFAULT_ARRIVAL_THRESHOLD
}

fn default_enabled() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Loading functions
// ---------------------------------------------------------------------------

/// Load a factory from a RON string.
pub fn load_factory_ron(source: &str) -> Result<FactoryConfig, ConfigError> {
    let data: FactoryData = ron::from_str(source).map_err(|e| ConfigError::Parse {
        format: "RON",
        detail: e.to_string(),
    })?;
    build_config(data)
}

/// Load a factory from a JSON string.
pub fn load_factory_json(source: &str) -> Result<FactoryConfig, ConfigError> {
    let data: FactoryData = serde_json::from_str(source).map_err(|e| ConfigError::Parse {
        format: "JSON",
        detail: e.to_string(),
    })?;
    build_config(data)
}

/// Load a factory file, picking the format from its extension.
pub fn load_factory_file(path: &Path) -> Result<FactoryConfig, ConfigError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let source = std::fs::read_to_string(path)?;
    match ext.as_deref() {
        Some("ron") => load_factory_ron(&source),
        Some("json") => load_factory_json(&source),
        _ => Err(ConfigError::UnsupportedFormat {
            file: path.to_path_buf(),
        }),
    }
}

fn build_config(data: FactoryData) -> Result<FactoryConfig, ConfigError> {
    let mut stations = Vec::with_capacity(data.stations.len());
    for entry in data.stations {
        let recipe: StationRecipe = entry.recipe.parse()?;
        let (x, y, z) = entry.position;
        stations.push(StationConfig {
            label: entry.label,
            recipe,
            processing_duration: entry.processing_duration,
            arrival_threshold: f64_to_fixed64(entry.arrival_threshold),
            position: Position::from_f64(x, y, z),
            enabled: entry.enabled,
        });
    }

    let strategy = match data.fixed_timestep {
        Some(fixed_timestep) => SimulationStrategy::Delta { fixed_timestep },
        None => SimulationStrategy::Tick,
    };

    let config = FactoryConfig {
        stations,
        unit_speed: Fixed64::from_num(data.unit_speed),
        strategy,
        reroute_on_enable: data.reroute_on_enable,
        event_capacity: data.event_capacity,
    };
    config.validate()?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
