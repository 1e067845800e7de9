//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{FactoryConfig, StationConfig};
use crate::controller::Controller;
use crate::cycle::StationRecipe;
use crate::event::{Event, EventKind};
use crate::fixed::{Fixed64, Position, Ticks};
use crate::id::StationId;
use crate::movement::Teleport;
use crate::sim::AdvanceResult;
use crate::validation::check_invariants;

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Config builders
// ===========================================================================

/// A station at `(x, y, 0)`.
pub fn station_at(label: &str, recipe: StationRecipe, x: f64, y: f64) -> StationConfig {
    StationConfig::new(label, recipe).at(Position::from_f64(x, y, 0.0))
}

/// One station per recipe, spread on a triangle.
pub fn ring_config(duration: Ticks) -> FactoryConfig {
    FactoryConfig::new()
        .with_station(station_at("ab", StationRecipe::AB, 0.0, 0.0).with_duration(duration))
        .with_station(station_at("bc", StationRecipe::BC, 10.0, 0.0).with_duration(duration))
        .with_station(station_at("ca", StationRecipe::CA, 5.0, 8.0).with_duration(duration))
}

/// `copies` stations per recipe on a grid, with staggered durations.
pub fn wide_ring_config(copies: usize) -> FactoryConfig {
    let mut config = FactoryConfig::new().with_unit_speed(fixed(2.0));
    for i in 0..copies {
        for (j, recipe) in StationRecipe::ALL.into_iter().enumerate() {
            let duration = 3 + ((i + j) % 4) as Ticks;
            config = config.with_station(
                station_at(
                    &format!("{recipe}-{i}").to_ascii_lowercase(),
                    recipe,
                    (j * 12) as f64,
                    (i * 12) as f64,
                )
                .with_duration(duration),
            );
        }
    }
    config
}

// ===========================================================================
// Controller builders
// ===========================================================================

pub fn build(config: &FactoryConfig) -> Controller {
    Controller::from_config(config).unwrap()
}

/// A controller whose units reach their destination on the next step.
pub fn build_teleporting(config: &FactoryConfig) -> Controller {
    Controller::from_config_with(config, Box::new(Teleport)).unwrap()
}

pub fn station_id(controller: &Controller, label: &str) -> StationId {
    controller
        .station_by_label(label)
        .unwrap_or_else(|| panic!("no station labelled {label}"))
}

// ===========================================================================
// Running
// ===========================================================================

/// Step `n` times, summing the per-step results.
pub fn run_ticks(controller: &mut Controller, n: u64) -> AdvanceResult {
    let mut total = AdvanceResult::default();
    for _ in 0..n {
        let r = controller.step();
        total.steps_run += r.steps_run;
        total.arrivals += r.arrivals;
        total.completions += r.completions;
        total.routing_misses += r.routing_misses;
    }
    total
}

/// Panic with the full violation list if any invariant is broken.
pub fn assert_invariants(controller: &Controller) {
    let violations = check_invariants(controller);
    assert!(
        violations.is_empty(),
        "invariant violations at tick {}: {violations:#?}",
        controller.tick()
    );
}

/// Record every event of `kind` delivered from now on.
pub fn record_events(controller: &mut Controller, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&log);
    controller.on_event(kind, Box::new(move |e| sink.borrow_mut().push(e.clone())));
    log
}
