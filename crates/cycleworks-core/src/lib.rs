//! Cycleworks Core -- a cyclic production pipeline.
//!
//! Mobile production units carry one of three resource types (`A -> B -> C
//! -> A`) between fixed stations. Each station converts its input type to the
//! next type in the cycle over a fixed duration, then hands the unit back to
//! the controller, which sends it to the least-loaded station that accepts
//! the unit's next wanted type.
//!
//! # Tick Pipeline
//!
//! Each call to [`controller::Controller::step`] advances the simulation by
//! one tick through the following phases:
//!
//! 1. **Movement** -- The [`movement::Locomotion`] collaborator moves units;
//!    arrivals are reported exactly once.
//! 2. **Process** -- Stations advance their timers in insertion order;
//!    finished units are re-typed and re-routed.
//! 3. **Post-tick** -- Deliver buffered events to passive listeners.
//! 4. **Bookkeeping** -- Increment tick counter and compute the state hash.
//!
//! # Key Types
//!
//! - [`controller::Controller`] -- Owns stations and units and drives the
//!   pipeline.
//! - [`station::Station`] -- FIFO queue, in-transit set, one active unit.
//! - [`unit::ProductionUnit`] -- Lifecycle state machine for a mobile unit.
//! - [`routing::select_station`] -- The pure least-loaded selection policy.
//! - [`cycle::ResourceType`] / [`cycle::StationRecipe`] -- The type cycle.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.
//! - [`event::EventBus`] -- Typed observer events with buffered delivery.
//! - [`config::FactoryConfig`] -- Validated setup parameters.

pub mod config;
pub mod controller;
pub mod cycle;
#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod event;
pub mod fixed;
pub mod id;
pub mod movement;
pub mod query;
pub mod routing;
pub mod sim;
pub mod station;
pub mod unit;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
