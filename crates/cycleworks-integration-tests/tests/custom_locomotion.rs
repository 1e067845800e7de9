//! Cross-crate tests for the movement seam.
//!
//! Implements a `Locomotion` outside the core crate and drives a full factory
//! with it, checking that the controller only ever moves units that are on
//! their way somewhere.

use std::cell::RefCell;
use std::rc::Rc;

use cycleworks_core::config::{FactoryConfig, StationConfig};
use cycleworks_core::controller::Controller;
use cycleworks_core::cycle::StationRecipe;
use cycleworks_core::fixed::{Fixed64, Position, Ticks};
use cycleworks_core::id::UnitId;
use cycleworks_core::movement::Locomotion;
use cycleworks_core::test_utils::*;
use cycleworks_core::unit::UnitState;
use cycleworks_core::validation::check_invariants;

/// Walks along x first, then y, like a cart on a street grid.
#[derive(Debug, Default)]
struct GridWalk {
    moved: Rc<RefCell<Vec<UnitId>>>,
}

fn approach(from: Fixed64, to: Fixed64, budget: Fixed64) -> (Fixed64, Fixed64) {
    let gap = to - from;
    let step = gap.abs().min(budget);
    let next = if gap < Fixed64::ZERO { from - step } else { from + step };
    (next, budget - step)
}

impl Locomotion for GridWalk {
    fn name(&self) -> &str {
        "grid-walk"
    }

    fn advance(
        &mut self,
        unit: UnitId,
        from: Position,
        to: Position,
        speed: Fixed64,
        dt: Ticks,
    ) -> Position {
        self.moved.borrow_mut().push(unit);
        let budget = speed * Fixed64::from_num(dt);
        let (x, budget) = approach(from.x, to.x, budget);
        let (y, _) = approach(from.y, to.y, budget);
        Position::new(x, y, to.z)
    }
}

fn grid_walk() -> (Box<GridWalk>, Rc<RefCell<Vec<UnitId>>>) {
    let walk = GridWalk::default();
    let log = Rc::clone(&walk.moved);
    (Box::new(walk), log)
}

#[test]
fn grid_walk_drives_a_full_loop() {
    let (walk, moved) = grid_walk();
    let mut controller = Controller::from_config_with(&ring_config(3), walk).unwrap();

    let totals = run_ticks(&mut controller, 200);
    assert!(totals.completions > 0);
    assert_eq!(totals.routing_misses, 0);
    assert!(!moved.borrow().is_empty());
    assert!(check_invariants(&controller).is_empty());
}

#[test]
fn travel_time_follows_manhattan_distance() {
    // b-unit from ab walks 6 along x and 8 along y at 2 per tick: 7 ticks.
    let config = FactoryConfig::new()
        .with_unit_speed(fixed(2.0))
        .with_station(station_at("ab", StationRecipe::AB, 0.0, 0.0))
        .with_station(station_at("ca", StationRecipe::CA, 6.0, 8.0));
    let (walk, _) = grid_walk();
    let mut controller = Controller::from_config_with(&config, walk).unwrap();
    let ca = station_id(&controller, "ca");
    let unit = controller.snapshot_station(ca).unwrap().in_transit[0];

    run_ticks(&mut controller, 6);
    assert_eq!(controller.unit(unit).unwrap().state(), UnitState::Moving);
    assert_eq!(
        controller.unit(unit).unwrap().position(),
        Position::from_f64(6.0, 6.0, 0.0)
    );

    let r = controller.step();
    assert_eq!(r.arrivals, 1);
    assert_eq!(controller.snapshot_station(ca).unwrap().active, Some(unit));
}

#[test]
fn parked_units_are_never_moved() {
    let config =
        FactoryConfig::new().with_station(StationConfig::new("ab", StationRecipe::AB));
    let (walk, moved) = grid_walk();
    let mut controller = Controller::from_config_with(&config, walk).unwrap();

    run_ticks(&mut controller, 50);
    assert!(moved.borrow().is_empty());
    assert_eq!(controller.parked_units().len(), 1);
}

#[test]
fn only_moving_units_are_advanced() {
    let (walk, moved) = grid_walk();
    let mut controller = Controller::from_config_with(&ring_config(4), walk).unwrap();

    for _ in 0..80 {
        let moving: Vec<UnitId> = controller
            .units()
            .filter(|(_, u)| u.state() == UnitState::Moving)
            .map(|(id, _)| id)
            .collect();
        moved.borrow_mut().clear();
        controller.step();
        for unit in moved.borrow().iter() {
            assert!(moving.contains(unit), "{unit:?} moved without a destination");
        }
    }
}
