//! Read-only query API for inspecting controller state.
//!
//! Snapshot types are owned copies with no references into controller
//! storage, so a presentation layer can hold them across ticks.

use crate::cycle::{ResourceType, StationRecipe};
use crate::fixed::{Position, Ticks};
use crate::id::{StationId, UnitId};
use crate::station::StationState;
use crate::unit::UnitState;

// ---------------------------------------------------------------------------
// Unit snapshot
// ---------------------------------------------------------------------------

/// A read-only view of a single production unit.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct UnitSnapshot {
    pub id: UnitId,
    pub resource_type: ResourceType,
    pub state: UnitState,
    /// `None` while parked.
    pub destination: Option<StationId>,
    pub position: Position,
}

impl UnitSnapshot {
    /// `Unassigned` with no destination.
    pub fn is_parked(&self) -> bool {
        self.state == UnitState::Unassigned && self.destination.is_none()
    }
}

// ---------------------------------------------------------------------------
// Station snapshot
// ---------------------------------------------------------------------------

/// A read-only view of a single station.
///
/// Carries the same load figure the router uses, so a UI can show why a unit
/// went where it did.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StationSnapshot {
    pub id: StationId,
    pub label: String,
    pub recipe: StationRecipe,
    pub state: StationState,
    pub active: Option<UnitId>,
    /// Queue contents, head first.
    pub pending: Vec<UnitId>,
    pub in_transit: Vec<UnitId>,
    pub elapsed: Ticks,
    pub processing_duration: Ticks,
    pub time_until_available: Ticks,
    pub position: Position,
}

impl StationSnapshot {
    /// Units currently in this station's custody.
    pub fn held_count(&self) -> usize {
        self.pending.len() + self.in_transit.len() + usize::from(self.active.is_some())
    }
}
