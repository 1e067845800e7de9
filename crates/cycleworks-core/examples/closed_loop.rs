//! Closed-loop example: a small data-driven factory.
//!
//! Loads `data/closed_loop.ron`, runs the loop for a while, knocks the press
//! offline, brings the spare kiln up, and prints station snapshots along the
//! way. Set `RUST_LOG=cycleworks_core=debug` to watch every routing decision.
//!
//! Run with: `cargo run -p cycleworks-core --example closed_loop --features data-loader`

use std::cell::Cell;
use std::process::ExitCode;
use std::rc::Rc;

use cycleworks_core::controller::Controller;
use cycleworks_core::data_loader::load_factory_ron;
use cycleworks_core::event::EventKind;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const FACTORY: &str = include_str!("../data/closed_loop.ron");

fn print_stations(controller: &Controller) {
    println!("--- tick {} ---", controller.tick());
    for s in controller.snapshot_all_stations() {
        println!(
            "{:<11} {:<2} {:<12} active={:<5} queued={} inbound={} eta={}",
            s.label,
            s.recipe.to_string(),
            format!("{:?}", s.state),
            s.active.is_some(),
            s.pending.len(),
            s.in_transit.len(),
            s.time_until_available,
        );
    }
    println!("parked units: {}", controller.parked_units().len());
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();

    let config = match load_factory_ron(FACTORY) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(%err, "failed to load factory");
            return ExitCode::FAILURE;
        }
    };
    let mut controller = match Controller::from_config(&config) {
        Ok(controller) => controller,
        Err(err) => {
            tracing::error!(%err, "invalid factory");
            return ExitCode::FAILURE;
        }
    };

    let completions = Rc::new(Cell::new(0u64));
    let c = Rc::clone(&completions);
    controller.on_event(
        EventKind::ProcessingFinished,
        Box::new(move |_| c.set(c.get() + 1)),
    );

    for _ in 0..40 {
        controller.step();
    }
    print_stations(&controller);

    let (Some(press), Some(spare)) = (
        controller.station_by_label("press"),
        controller.station_by_label("spare-kiln"),
    ) else {
        tracing::error!("factory file is missing expected stations");
        return ExitCode::FAILURE;
    };

    if let Err(err) = controller.disable_station(press) {
        tracing::error!(%err, "disable failed");
        return ExitCode::FAILURE;
    }
    for _ in 0..30 {
        controller.step();
    }
    print_stations(&controller);

    // Enabling sweeps parked units because the file sets reroute_on_enable.
    for station in [press, spare] {
        if let Err(err) = controller.enable_station(station) {
            tracing::error!(%err, "enable failed");
            return ExitCode::FAILURE;
        }
    }
    for _ in 0..60 {
        controller.step();
    }
    print_stations(&controller);

    println!(
        "{} units, {} completions, state hash {:#018x}",
        controller.unit_count(),
        completions.get(),
        controller.state_hash()
    );
    ExitCode::SUCCESS
}
