//! The mobile production unit and its lifecycle state machine.
//!
//! ```text
//! Unassigned --assign--> Moving --arrival--> Waiting --start--> Transforming
//!     ^                    ^                                        |
//!     |                    +------------- re-typed, assign ---------+
//!     +-- destination disabled / no route
//! ```
//!
//! A unit never decides anything on its own. The controller drives every
//! transition; the unit only guards its own invariant that `Moving` always
//! carries a destination.

use crate::cycle::ResourceType;
use crate::fixed::{Fixed64, Position};
use crate::id::StationId;

/// Lifecycle state of a production unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum UnitState {
    /// No destination. Freshly spawned, or parked after a routing miss.
    #[default]
    Unassigned,
    /// Travelling towards its destination station.
    Moving,
    /// Queued at a station, not yet being processed.
    Waiting,
    /// The active unit of a station.
    Transforming,
}

/// Outcome of [`ProductionUnit::assign_destination`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// The unit was not moving.
    Fresh,
    /// The unit was already moving; the new destination replaced `previous`.
    Reassigned { previous: StationId },
}

/// A mobile unit carrying one resource type around the cycle.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProductionUnit {
    resource_type: ResourceType,
    state: UnitState,
    destination: Option<StationId>,
    position: Position,
    /// Distance covered per tick by the movement collaborator.
    speed: Fixed64,
}

impl ProductionUnit {
    pub fn new(resource_type: ResourceType, position: Position, speed: Fixed64) -> Self {
        Self {
            resource_type,
            state: UnitState::Unassigned,
            destination: None,
            position,
            speed,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    pub fn is_in_state(&self, state: UnitState) -> bool {
        self.state == state
    }

    pub fn destination(&self) -> Option<StationId> {
        self.destination
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn speed(&self) -> Fixed64 {
        self.speed
    }

    /// Point the unit at `station` and put it in `Moving`.
    ///
    /// Allowed from any state. Reassigning a unit that is already moving is
    /// accepted (last assignment wins) and reported as
    /// [`Assignment::Reassigned`] so the caller can release the old station's
    /// in-transit entry.
    pub fn assign_destination(&mut self, station: StationId) -> Assignment {
        let outcome = match (self.state, self.destination) {
            (UnitState::Moving, Some(previous)) => Assignment::Reassigned { previous },
            _ => Assignment::Fresh,
        };
        self.destination = Some(station);
        self.state = UnitState::Moving;
        outcome
    }

    /// Called by the movement collaborator once the unit is within its
    /// destination's arrival threshold. Returns the destination when the unit
    /// was moving; any other state is ignored.
    pub fn report_arrival(&mut self) -> Option<StationId> {
        if self.state != UnitState::Moving {
            return None;
        }
        self.state = UnitState::Waiting;
        self.destination
    }

    /// Direct state setter for the `Waiting -> Transforming` step and for
    /// parking. `Unassigned` drops the destination. `Moving` is only
    /// reachable through [`assign_destination`](Self::assign_destination);
    /// requesting it here is ignored.
    pub fn set_lifecycle_state(&mut self, state: UnitState) {
        match state {
            UnitState::Moving => {
                if self.destination.is_none() {
                    tracing::warn!("ignoring Moving without a destination");
                    return;
                }
                self.state = state;
            }
            UnitState::Unassigned => {
                self.state = state;
                self.destination = None;
            }
            UnitState::Waiting | UnitState::Transforming => {
                self.state = state;
            }
        }
    }

    /// Change the carried type. No state transition.
    pub fn set_type(&mut self, resource_type: ResourceType) {
        self.resource_type = resource_type;
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}
