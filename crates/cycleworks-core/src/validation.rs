//! Structural invariant checks and determinism validation.
//!
//! [`check_invariants`] walks a controller and reports every violation it
//! finds rather than stopping at the first, so a failing property test shows
//! the whole picture.

use std::collections::HashMap;

use crate::config::{ConfigError, FactoryConfig};
use crate::controller::Controller;
use crate::id::{StationId, UnitId};
use crate::station::{Station, StationState};
use crate::unit::{ProductionUnit, UnitState};

// ---------------------------------------------------------------------------
// Violation types
// ---------------------------------------------------------------------------

/// Where a station is holding a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Custody {
    InTransit(StationId),
    Pending(StationId),
    Active(StationId),
}

/// A broken structural invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    /// The unit's lifecycle state disagrees with where stations hold it.
    /// Every unit must be in exactly the custody slot its state implies, or
    /// in none when parked.
    CustodyMismatch {
        unit: UnitId,
        state: UnitState,
        destination: Option<StationId>,
        custody: Vec<Custody>,
    },
    /// A station has an active unit without transforming, or the reverse.
    ActiveStateMismatch {
        station: StationId,
        state: StationState,
        active: Option<UnitId>,
    },
    /// A disabled station still holds units.
    DisabledHoldsUnits { station: StationId },
    /// A station references a unit that does not exist.
    UnknownUnit { station: StationId, unit: UnitId },
}

// ---------------------------------------------------------------------------
// Invariant check
// ---------------------------------------------------------------------------

/// Check every structural invariant of `controller`.
pub fn check_invariants(controller: &Controller) -> Vec<InvariantViolation> {
    check_parts(controller.stations(), controller.units())
}

/// Check invariants over explicit station and unit collections.
pub fn check_parts<'a>(
    stations: impl IntoIterator<Item = (StationId, &'a Station)>,
    units: impl IntoIterator<Item = (UnitId, &'a ProductionUnit)>,
) -> Vec<InvariantViolation> {
    let units: HashMap<UnitId, &ProductionUnit> = units.into_iter().collect();
    let mut custody: HashMap<UnitId, Vec<Custody>> = HashMap::new();
    let mut violations = Vec::new();

    for (id, station) in stations {
        let held: Vec<(UnitId, Custody)> = station
            .in_transit()
            .iter()
            .map(|&u| (u, Custody::InTransit(id)))
            .chain(station.pending().map(|u| (u, Custody::Pending(id))))
            .chain(station.active_unit().map(|u| (u, Custody::Active(id))))
            .collect();

        if station.state() == StationState::Disabled && !held.is_empty() {
            violations.push(InvariantViolation::DisabledHoldsUnits { station: id });
        }

        let transforming = station.state() == StationState::Transforming;
        if transforming != station.active_unit().is_some() {
            violations.push(InvariantViolation::ActiveStateMismatch {
                station: id,
                state: station.state(),
                active: station.active_unit(),
            });
        }

        for (unit, slot) in held {
            if !units.contains_key(&unit) {
                violations.push(InvariantViolation::UnknownUnit { station: id, unit });
                continue;
            }
            custody.entry(unit).or_default().push(slot);
        }
    }

    // Sort for a stable report order.
    let mut ids: Vec<UnitId> = units.keys().copied().collect();
    ids.sort();

    for id in ids {
        let unit = units[&id];
        let slots = custody.remove(&id).unwrap_or_default();
        let consistent = match (unit.state(), unit.destination(), slots.as_slice()) {
            (UnitState::Unassigned, None, []) => true,
            (UnitState::Moving, Some(dest), [Custody::InTransit(s)]) => dest == *s,
            (UnitState::Waiting, Some(dest), [Custody::Pending(s)]) => dest == *s,
            (UnitState::Transforming, Some(dest), [Custody::Active(s)]) => dest == *s,
            _ => false,
        };
        if !consistent {
            violations.push(InvariantViolation::CustodyMismatch {
                unit: id,
                state: unit.state(),
                destination: unit.destination(),
                custody: slots,
            });
        }
    }

    violations
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    /// Whether the two runs produced identical results.
    pub is_deterministic: bool,
    /// Tick at which divergence was first detected (if any).
    pub divergence_tick: Option<u64>,
    /// Hash log: (tick, hash_run1, hash_run2) for each tick.
    pub hash_log: Vec<(u64, u64, u64)>,
}

/// Build two controllers from the same config and step them side by side.
pub fn validate_determinism(
    config: &FactoryConfig,
    ticks: u64,
) -> Result<DeterminismResult, ConfigError> {
    let mut a = Controller::from_config(config)?;
    let mut b = Controller::from_config(config)?;

    let mut hash_log = Vec::new();
    let mut divergence_tick = None;

    for _ in 0..ticks {
        a.step();
        b.step();

        let hash_a = a.state_hash();
        let hash_b = b.state_hash();
        let tick = a.tick();
        hash_log.push((tick, hash_a, hash_b));

        if hash_a != hash_b && divergence_tick.is_none() {
            divergence_tick = Some(tick);
        }
    }

    Ok(DeterminismResult {
        is_deterministic: divergence_tick.is_none(),
        divergence_tick,
        hash_log,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::cycle::{ResourceType, StationRecipe};
    use crate::fixed::{Fixed64, Position};
    use slotmap::SlotMap;

    fn ring() -> FactoryConfig {
        FactoryConfig::new()
            .with_station(StationConfig::new("ab", StationRecipe::AB).with_duration(3))
            .with_station(
                StationConfig::new("bc", StationRecipe::BC)
                    .with_duration(4)
                    .at(Position::from_f64(6.0, 0.0, 0.0)),
            )
            .with_station(
                StationConfig::new("ca", StationRecipe::CA)
                    .with_duration(5)
                    .at(Position::from_f64(0.0, 8.0, 0.0)),
            )
    }

    fn station() -> Station {
        Station::new(
            "ab",
            StationRecipe::AB,
            5,
            Fixed64::from_num(0.1),
            Position::ORIGIN,
        )
    }

    fn unit() -> ProductionUnit {
        ProductionUnit::new(ResourceType::A, Position::ORIGIN, Fixed64::ONE)
    }

    #[test]
    fn running_ring_stays_consistent() {
        let mut c = Controller::from_config(&ring()).unwrap();
        assert!(check_invariants(&c).is_empty());
        for _ in 0..60 {
            c.step();
            assert_eq!(check_invariants(&c), vec![]);
        }
    }

    #[test]
    fn consistent_after_disable_and_enable() {
        let mut c = Controller::from_config(&ring()).unwrap();
        for _ in 0..5 {
            c.step();
        }
        let bc = c.station_by_label("bc").unwrap();
        c.disable_station(bc).unwrap();
        assert_eq!(check_invariants(&c), vec![]);
        for _ in 0..5 {
            c.step();
        }
        c.enable_station(bc).unwrap();
        c.reroute_parked();
        assert_eq!(check_invariants(&c), vec![]);
    }

    #[test]
    fn moving_unit_missing_from_in_transit_is_reported() {
        let mut stations = SlotMap::<StationId, Station>::with_key();
        let mut units = SlotMap::<UnitId, ProductionUnit>::with_key();
        let s = stations.insert(station());
        let u = units.insert(unit());
        units[u].assign_destination(s);

        let violations = check_parts(stations.iter(), units.iter());
        assert_eq!(
            violations,
            vec![InvariantViolation::CustodyMismatch {
                unit: u,
                state: UnitState::Moving,
                destination: Some(s),
                custody: vec![],
            }]
        );
    }

    #[test]
    fn double_custody_is_reported() {
        let mut stations = SlotMap::<StationId, Station>::with_key();
        let mut units = SlotMap::<UnitId, ProductionUnit>::with_key();
        let s1 = stations.insert(station());
        let s2 = stations.insert(station());
        let u = units.insert(unit());
        units[u].assign_destination(s1);
        stations[s1].add_to_in_transit(u);
        stations[s2].add_to_in_transit(u);

        let violations = check_parts(stations.iter(), units.iter());
        assert!(matches!(
            &violations[..],
            [InvariantViolation::CustodyMismatch { custody, .. }] if custody.len() == 2
        ));
    }

    #[test]
    fn disabled_station_holding_units_is_reported() {
        let mut stations = SlotMap::<StationId, Station>::with_key();
        let units = SlotMap::<UnitId, ProductionUnit>::with_key();
        let s = stations.insert(station());
        stations[s].disable();
        let ghost = {
            let mut other = SlotMap::<UnitId, ()>::with_key();
            other.insert(())
        };
        stations[s].add_to_in_transit(ghost);

        let violations = check_parts(stations.iter(), units.iter());
        assert!(violations.contains(&InvariantViolation::DisabledHoldsUnits { station: s }));
        assert!(violations.contains(&InvariantViolation::UnknownUnit { station: s, unit: ghost }));
    }

    #[test]
    fn determinism_holds_for_ring() {
        let result = validate_determinism(&ring(), 50).unwrap();
        assert!(result.is_deterministic);
        assert_eq!(result.divergence_tick, None);
        assert_eq!(result.hash_log.len(), 50);
    }
}
