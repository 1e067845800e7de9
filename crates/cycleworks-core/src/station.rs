//! Fixed processing stations and their queueing state machine.
//!
//! A station converts one unit at a time from its recipe's input type to its
//! output type over a fixed number of ticks. Units it is responsible for live
//! in exactly one of three places: the in-transit set (heading here), the
//! pending FIFO queue (arrived, waiting), or the active slot (processing).
//!
//! Stations never talk to units or to other stations. Every operation returns
//! [`StationSignal`]s describing what happened, and the controller turns
//! those into unit transitions and routing decisions.

use std::collections::VecDeque;

use crate::cycle::{ResourceType, StationRecipe};
use crate::fixed::{Fixed64, Position, Ticks};
use crate::id::UnitId;

// ---------------------------------------------------------------------------
// State & signals
// ---------------------------------------------------------------------------

/// Operational state of a station.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StationState {
    #[default]
    Available,
    Transforming,
    Disabled,
}

/// Something a station operation caused, for the controller to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationSignal {
    /// A unit left the queue and became the active unit.
    Started(UnitId),
    /// The active unit finished processing and left the station.
    Finished(UnitId),
    /// The station was disabled. Carries every unit it was holding:
    /// active first, then queue order, then in-transit order.
    Disabled(Vec<UnitId>),
    /// The station was re-enabled.
    Enabled,
}

// ---------------------------------------------------------------------------
// Station
// ---------------------------------------------------------------------------

/// A fixed processing node.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Station {
    label: String,
    recipe: StationRecipe,
    state: StationState,
    pending: VecDeque<UnitId>,
    /// Ordered so that disable hands units back deterministically.
    in_transit: Vec<UnitId>,
    active: Option<UnitId>,
    elapsed: Ticks,
    processing_duration: Ticks,
    arrival_threshold: Fixed64,
    position: Position,
}

impl Station {
    pub fn new(
        label: impl Into<String>,
        recipe: StationRecipe,
        processing_duration: Ticks,
        arrival_threshold: Fixed64,
        position: Position,
    ) -> Self {
        Self {
            label: label.into(),
            recipe,
            state: StationState::Available,
            pending: VecDeque::new(),
            in_transit: Vec::new(),
            active: None,
            elapsed: 0,
            processing_duration,
            arrival_threshold,
            position,
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn recipe(&self) -> StationRecipe {
        self.recipe
    }

    pub fn input_type(&self) -> ResourceType {
        self.recipe.input_type()
    }

    pub fn output_type(&self) -> ResourceType {
        self.recipe.output_type()
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.state != StationState::Disabled
    }

    pub fn active_unit(&self) -> Option<UnitId> {
        self.active
    }

    pub fn pending(&self) -> impl ExactSizeIterator<Item = UnitId> + '_ {
        self.pending.iter().copied()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_transit(&self) -> &[UnitId] {
        &self.in_transit
    }

    pub fn elapsed(&self) -> Ticks {
        self.elapsed
    }

    pub fn processing_duration(&self) -> Ticks {
        self.processing_duration
    }

    pub fn arrival_threshold(&self) -> Fixed64 {
        self.arrival_threshold
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether `unit` is anywhere in this station's custody.
    pub fn holds(&self, unit: UnitId) -> bool {
        self.active == Some(unit) || self.pending.contains(&unit) || self.in_transit.contains(&unit)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Append a unit to the pending queue. An available station starts it
    /// immediately. Any resource type is accepted.
    pub fn enqueue(&mut self, unit: UnitId) -> Option<StationSignal> {
        self.pending.push_back(unit);
        if self.state == StationState::Available {
            self.begin_next_unit()
        } else {
            None
        }
    }

    /// Make the head of the queue the active unit. No-op on an empty queue or
    /// a disabled station.
    pub fn begin_next_unit(&mut self) -> Option<StationSignal> {
        if self.state == StationState::Disabled || self.active.is_some() {
            return None;
        }
        let unit = self.pending.pop_front()?;
        self.active = Some(unit);
        self.elapsed = 0;
        self.state = StationState::Transforming;
        Some(StationSignal::Started(unit))
    }

    /// Release the active unit, then start the next queued unit or go idle.
    pub fn finish_unit(&mut self) -> Vec<StationSignal> {
        let mut signals = Vec::with_capacity(2);
        let Some(unit) = self.active.take() else {
            return signals;
        };
        signals.push(StationSignal::Finished(unit));
        self.elapsed = 0;
        self.state = StationState::Available;
        if let Some(started) = self.begin_next_unit() {
            signals.push(started);
        }
        signals
    }

    /// Advance the processing timer by `dt` ticks.
    ///
    /// Finishes at most one unit per call. A unit started by that finish
    /// begins counting on the next call.
    pub fn tick(&mut self, dt: Ticks) -> Vec<StationSignal> {
        if self.state != StationState::Transforming {
            return Vec::new();
        }
        self.elapsed = self.elapsed.saturating_add(dt);
        if self.elapsed >= self.processing_duration {
            self.finish_unit()
        } else {
            Vec::new()
        }
    }

    // -----------------------------------------------------------------------
    // In-transit tracking
    // -----------------------------------------------------------------------

    pub fn add_to_in_transit(&mut self, unit: UnitId) {
        if !self.in_transit.contains(&unit) {
            self.in_transit.push(unit);
        }
    }

    /// Returns whether the unit was present.
    pub fn remove_from_in_transit(&mut self, unit: UnitId) -> bool {
        match self.in_transit.iter().position(|u| *u == unit) {
            Some(idx) => {
                self.in_transit.remove(idx);
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Load estimate
    // -----------------------------------------------------------------------

    /// Ticks until this station could start a newly arriving unit, assuming
    /// every queued and in-transit unit takes exactly the nominal duration.
    /// Travel time is ignored; this is a routing heuristic, not an ETA.
    pub fn time_until_available(&self) -> Ticks {
        let remaining = match self.state {
            StationState::Transforming => self.processing_duration.saturating_sub(self.elapsed),
            StationState::Available | StationState::Disabled => 0,
        };
        let waiting = (self.pending.len() + self.in_transit.len()) as Ticks;
        remaining.saturating_add(waiting.saturating_mul(self.processing_duration))
    }

    // -----------------------------------------------------------------------
    // Enable / disable
    // -----------------------------------------------------------------------

    /// Disable the station and hand back everything it holds in one snapshot.
    /// Already disabled: no-op.
    pub fn disable(&mut self) -> Option<StationSignal> {
        if self.state == StationState::Disabled {
            return None;
        }
        let mut released =
            Vec::with_capacity(self.pending.len() + self.in_transit.len() + 1);
        released.extend(self.active.take());
        released.extend(self.pending.drain(..));
        released.append(&mut self.in_transit);
        self.elapsed = 0;
        self.state = StationState::Disabled;
        Some(StationSignal::Disabled(released))
    }

    /// Re-enable a disabled station. Not disabled: no-op.
    pub fn enable(&mut self) -> Option<StationSignal> {
        if self.state != StationState::Disabled {
            return None;
        }
        self.state = StationState::Available;
        Some(StationSignal::Enabled)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
