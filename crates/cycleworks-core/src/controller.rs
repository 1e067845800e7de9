//! The controller: owns every station and unit and runs the routing loop.
//!
//! # Architecture
//!
//! The `Controller` owns:
//! - The stations, in a [`SlotMap`] plus an insertion-order list that fixes
//!   enumeration order for routing ties
//! - The production units, in a [`SlotMap`]
//! - A [`Locomotion`] collaborator that moves units between stations
//! - A [`SimState`] (tick counter, accumulator) and [`SimulationStrategy`]
//! - An [`EventBus`] for passive observers
//!
//! Internal reactions never go through the event bus. Station operations
//! return [`StationSignal`]s, which become typed messages on an inbox that a
//! single dispatch loop drains. Handlers collect what they need before they
//! mutate anything.
//!
//! # Pipeline
//!
//! Each `step()` runs:
//! 1. **Movement** -- advance moving units; report each arrival exactly once
//! 2. **Process** -- tick stations in insertion order; re-route finished units
//! 3. **Post-tick** -- deliver buffered events to listeners
//! 4. **Bookkeeping** -- update tick counter, compute state hash

use std::collections::VecDeque;

use slotmap::SlotMap;

use crate::config::{ConfigError, DEFAULT_EVENT_CAPACITY, DEFAULT_UNIT_SPEED, FactoryConfig};
use crate::event::{Event, EventBus, EventFilter, EventKind, Listener, ListenerPriority};
use crate::fixed::{Fixed64, Ticks};
use crate::id::{StationId, UnitId};
use crate::movement::{LinearMotion, Locomotion, within_threshold};
use crate::query::{StationSnapshot, UnitSnapshot};
use crate::routing::{Candidate, select_station, wanted_type};
use crate::sim::{AdvanceResult, SimState, SimulationStrategy, StateHash};
use crate::station::{Station, StationSignal, StationState};
use crate::unit::{Assignment, ProductionUnit, UnitState};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the public command API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ControllerError {
    #[error("unknown station {0:?}")]
    UnknownStation(StationId),

    #[error("unknown unit {0:?}")]
    UnknownUnit(UnitId),

    #[error("unit {0:?} is queued or processing at a station")]
    UnitHeld(UnitId),
}

// ---------------------------------------------------------------------------
// Internal messages
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Message {
    Arrived { unit: UnitId, station: StationId },
    Started { station: StationId, unit: UnitId },
    Finished { station: StationId, unit: UnitId },
    Disabled { station: StationId, released: Vec<UnitId> },
    Enabled { station: StationId },
}

impl Message {
    fn from_signal(station: StationId, signal: StationSignal) -> Self {
        match signal {
            StationSignal::Started(unit) => Message::Started { station, unit },
            StationSignal::Finished(unit) => Message::Finished { station, unit },
            StationSignal::Disabled(released) => Message::Disabled { station, released },
            StationSignal::Enabled => Message::Enabled { station },
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Owns the factory and drives it one tick at a time.
#[derive(Debug)]
pub struct Controller {
    stations: SlotMap<StationId, Station>,

    /// Station insertion order. Routing ties resolve to the earliest entry.
    order: Vec<StationId>,

    units: SlotMap<UnitId, ProductionUnit>,

    locomotion: Box<dyn Locomotion>,

    /// Simulation strategy (tick or delta).
    strategy: SimulationStrategy,

    /// Simulation state (tick counter, accumulator).
    pub sim_state: SimState,

    paused: bool,

    /// Speed given to newly spawned units.
    unit_speed: Fixed64,

    reroute_on_enable: bool,

    /// Set once `setup()` has spawned the initial units.
    initialized: bool,

    inbox: VecDeque<Message>,

    event_bus: EventBus,

    last_state_hash: u64,
}

impl Controller {
    /// Create an empty controller with the given strategy and linear motion.
    pub fn new(strategy: SimulationStrategy) -> Self {
        Self {
            stations: SlotMap::with_key(),
            order: Vec::new(),
            units: SlotMap::with_key(),
            locomotion: Box::new(LinearMotion),
            strategy,
            sim_state: SimState::new(),
            paused: false,
            unit_speed: Fixed64::from_num(DEFAULT_UNIT_SPEED),
            reroute_on_enable: false,
            initialized: false,
            inbox: VecDeque::new(),
            event_bus: EventBus::new(DEFAULT_EVENT_CAPACITY),
            last_state_hash: 0,
        }
    }

    /// Validate `config`, build its stations in order, and run [`setup`](Self::setup).
    pub fn from_config(config: &FactoryConfig) -> Result<Self, ConfigError> {
        Self::from_config_with(config, Box::new(LinearMotion))
    }

    /// Like [`from_config`](Self::from_config) with a custom movement collaborator.
    pub fn from_config_with(
        config: &FactoryConfig,
        locomotion: Box<dyn Locomotion>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut controller = Self::new(config.strategy.clone());
        controller.locomotion = locomotion;
        controller.unit_speed = config.unit_speed;
        controller.reroute_on_enable = config.reroute_on_enable;
        controller.event_bus = EventBus::new(config.event_capacity);

        for sc in &config.stations {
            let mut station = Station::new(
                sc.label.clone(),
                sc.recipe,
                sc.processing_duration,
                sc.arrival_threshold,
                sc.position,
            );
            if !sc.enabled {
                // Nothing held yet, so the release snapshot is empty.
                let _ = station.disable();
            }
            controller.add_station(station);
        }

        controller.setup();
        Ok(controller)
    }

    /// Register a station. Enumeration order is insertion order.
    pub fn add_station(&mut self, station: Station) -> StationId {
        tracing::debug!(
            station = station.label(),
            recipe = %station.recipe(),
            "station added"
        );
        let id = self.stations.insert(station);
        self.order.push(id);
        id
    }

    pub fn set_locomotion(&mut self, locomotion: Box<dyn Locomotion>) {
        self.locomotion = locomotion;
    }

    /// Speed for units spawned from now on. Units already in the factory
    /// keep theirs.
    pub fn set_unit_speed(&mut self, speed: Fixed64) -> Result<(), ConfigError> {
        if speed <= Fixed64::ZERO {
            return Err(ConfigError::NonPositiveSpeed);
        }
        self.unit_speed = speed;
        Ok(())
    }

    pub fn set_reroute_on_enable(&mut self, enabled: bool) {
        self.reroute_on_enable = enabled;
    }

    /// Spawn one unit at every enabled station and route each in turn.
    /// Runs once; later calls are ignored.
    pub fn setup(&mut self) {
        if self.initialized {
            tracing::warn!("setup already ran; ignoring");
            return;
        }
        self.initialized = true;

        let enabled: Vec<StationId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.stations.get(*id).is_some_and(Station::is_enabled))
            .collect();

        let mut scratch = AdvanceResult::default();
        for station in enabled {
            self.spawn_unit(station, &mut scratch);
        }
        tracing::info!(
            stations = self.order.len(),
            units = self.units.len(),
            parked = scratch.routing_misses,
            locomotion = self.locomotion.name(),
            "factory set up"
        );
    }

    /// Spawn a unit carrying `station`'s output type at its position, then
    /// route it.
    pub fn spawn_at(&mut self, station: StationId) -> Result<UnitId, ControllerError> {
        if !self.stations.contains_key(station) {
            return Err(ControllerError::UnknownStation(station));
        }
        let mut scratch = AdvanceResult::default();
        self.spawn_unit(station, &mut scratch)
            .ok_or(ControllerError::UnknownStation(station))
    }

    fn spawn_unit(&mut self, station: StationId, result: &mut AdvanceResult) -> Option<UnitId> {
        let (resource_type, position) = {
            let s = self.stations.get(station)?;
            (s.output_type(), s.position())
        };
        let unit = self
            .units
            .insert(ProductionUnit::new(resource_type, position, self.unit_speed));
        self.event_bus.emit(Event::UnitSpawned {
            unit,
            station,
            resource_type,
            tick: self.sim_state.tick,
        });
        self.route_unit(unit, result);
        Some(unit)
    }

    // -----------------------------------------------------------------------
    // Pause / resume
    // -----------------------------------------------------------------------

    /// Pause the simulation. While paused, `advance()` and `step()` are no-ops.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Advance the simulation according to the configured strategy.
    ///
    /// - **Tick mode**: `dt` is ignored; exactly one step runs.
    /// - **Delta mode**: `dt` is accumulated; as many fixed steps run as fit.
    pub fn advance(&mut self, dt: Ticks) -> AdvanceResult {
        if self.paused {
            return AdvanceResult::default();
        }
        let mut result = AdvanceResult::default();

        match self.strategy {
            SimulationStrategy::Tick => {
                self.step_internal(&mut result);
            }
            SimulationStrategy::Delta { fixed_timestep } => {
                self.sim_state.accumulator += dt;
                let step_size = fixed_timestep.max(1);
                while self.sim_state.accumulator >= step_size {
                    self.sim_state.accumulator -= step_size;
                    self.step_internal(&mut result);
                }
            }
        }

        result
    }

    /// Run a single simulation step (convenience for tick mode).
    pub fn step(&mut self) -> AdvanceResult {
        self.advance(0)
    }

    // -----------------------------------------------------------------------
    // Internal: single step
    // -----------------------------------------------------------------------

    fn step_internal(&mut self, result: &mut AdvanceResult) {
        // One simulation step is one tick of travel and processing.
        const DT: Ticks = 1;

        self.phase_movement(DT, result);
        self.phase_process(DT, result);
        self.phase_post_tick();
        self.phase_bookkeeping();

        result.steps_run += 1;
    }

    // -----------------------------------------------------------------------
    // Phase 1: Movement
    // -----------------------------------------------------------------------

    fn phase_movement(&mut self, dt: Ticks, result: &mut AdvanceResult) {
        let moving: Vec<(UnitId, StationId)> = self
            .units
            .iter()
            .filter(|(_, u)| u.is_in_state(UnitState::Moving))
            .filter_map(|(id, u)| u.destination().map(|dest| (id, dest)))
            .collect();

        for (unit_id, station_id) in moving {
            let Some(station) = self.stations.get(station_id) else {
                continue;
            };
            let target = station.position();
            let threshold = station.arrival_threshold();

            let Some(unit) = self.units.get_mut(unit_id) else {
                continue;
            };
            let next = self
                .locomotion
                .advance(unit_id, unit.position(), target, unit.speed(), dt);
            unit.set_position(next);

            if within_threshold(next, target, threshold) && unit.report_arrival().is_some() {
                self.inbox.push_back(Message::Arrived {
                    unit: unit_id,
                    station: station_id,
                });
            }
        }

        self.dispatch(result);
    }

    // -----------------------------------------------------------------------
    // Phase 2: Process
    // -----------------------------------------------------------------------

    fn phase_process(&mut self, dt: Ticks, result: &mut AdvanceResult) {
        for idx in 0..self.order.len() {
            let id = self.order[idx];
            let Some(station) = self.stations.get_mut(id) else {
                continue;
            };
            for signal in station.tick(dt) {
                self.inbox.push_back(Message::from_signal(id, signal));
            }
            // Drain per station so later stations see up-to-date loads.
            self.dispatch(result);
        }
    }

    // -----------------------------------------------------------------------
    // Phase 3: Post-tick
    // -----------------------------------------------------------------------

    fn phase_post_tick(&mut self) {
        self.event_bus.deliver();
    }

    // -----------------------------------------------------------------------
    // Phase 4: Bookkeeping
    // -----------------------------------------------------------------------

    fn phase_bookkeeping(&mut self) {
        self.sim_state.tick += 1;
        self.last_state_hash = self.compute_state_hash();
    }

    /// Compute a deterministic hash of the current simulation state.
    fn compute_state_hash(&self) -> u64 {
        let mut hasher = StateHash::new();
        hasher.write_u64(self.sim_state.tick);

        for &id in &self.order {
            let Some(station) = self.stations.get(id) else {
                continue;
            };
            hasher.write_u32(station.state() as u32);
            hasher.write_u64(station.elapsed());
            hasher.write_u64(station.pending_len() as u64);
            hasher.write_u64(station.in_transit().len() as u64);
        }

        // SlotMap iteration follows slot order, which is deterministic.
        for (_, unit) in &self.units {
            hasher.write_u32(unit.resource_type() as u32);
            hasher.write_u32(unit.state() as u32);
            let pos = unit.position();
            hasher.write_fixed64(pos.x);
            hasher.write_fixed64(pos.y);
            hasher.write_fixed64(pos.z);
        }

        hasher.finish()
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    fn dispatch(&mut self, result: &mut AdvanceResult) {
        while let Some(message) = self.inbox.pop_front() {
            match message {
                Message::Arrived { unit, station } => self.on_arrival(unit, station, result),
                Message::Started { station, unit } => self.on_started(station, unit),
                Message::Finished { station, unit } => self.on_finished(station, unit, result),
                Message::Disabled { station, released } => {
                    self.on_disabled(station, released, result)
                }
                Message::Enabled { station } => self.on_enabled(station, result),
            }
        }
    }

    fn on_arrival(&mut self, unit: UnitId, station: StationId, result: &mut AdvanceResult) {
        let tick = self.sim_state.tick;
        let Some(st) = self.stations.get_mut(station) else {
            return;
        };
        st.remove_from_in_transit(unit);

        if !st.is_enabled() {
            // Disable releases in-transit units, so this only happens if a
            // host moved a unit by hand.
            tracing::warn!(?unit, station = st.label(), "arrived at disabled station");
            if let Some(u) = self.units.get_mut(unit) {
                u.set_lifecycle_state(UnitState::Unassigned);
            }
            self.route_unit(unit, result);
            return;
        }

        if let Some(u) = self.units.get_mut(unit) {
            u.set_lifecycle_state(UnitState::Waiting);
        }
        result.arrivals += 1;
        tracing::debug!(?unit, station = st.label(), tick, "unit arrived");

        if let Some(signal) = st.enqueue(unit) {
            self.inbox.push_back(Message::from_signal(station, signal));
        }
        self.event_bus.emit(Event::UnitArrived { unit, station, tick });
    }

    fn on_started(&mut self, station: StationId, unit: UnitId) {
        if let Some(u) = self.units.get_mut(unit) {
            u.set_lifecycle_state(UnitState::Transforming);
        }
        self.event_bus.emit(Event::ProcessingStarted {
            station,
            unit,
            tick: self.sim_state.tick,
        });
    }

    fn on_finished(&mut self, station: StationId, unit: UnitId, result: &mut AdvanceResult) {
        let Some(produced) = self.stations.get(station).map(Station::output_type) else {
            return;
        };
        if let Some(u) = self.units.get_mut(unit) {
            u.set_type(produced);
        }
        result.completions += 1;
        self.event_bus.emit(Event::ProcessingFinished {
            station,
            unit,
            produced,
            tick: self.sim_state.tick,
        });
        self.route_unit(unit, result);
    }

    fn on_disabled(&mut self, station: StationId, released: Vec<UnitId>, result: &mut AdvanceResult) {
        tracing::info!(
            station = self.stations.get(station).map_or("?", Station::label),
            released = released.len(),
            "station disabled"
        );
        self.event_bus.emit(Event::StationDisabled {
            station,
            released: released.clone(),
            tick: self.sim_state.tick,
        });

        for &unit in &released {
            if let Some(u) = self.units.get_mut(unit) {
                u.set_lifecycle_state(UnitState::Unassigned);
            }
        }
        for unit in released {
            self.route_unit(unit, result);
        }
    }

    fn on_enabled(&mut self, station: StationId, result: &mut AdvanceResult) {
        tracing::info!(
            station = self.stations.get(station).map_or("?", Station::label),
            "station enabled"
        );
        self.event_bus.emit(Event::StationEnabled {
            station,
            tick: self.sim_state.tick,
        });
        if self.reroute_on_enable {
            self.sweep_parked(result);
        }
    }

    // -----------------------------------------------------------------------
    // Routing
    // -----------------------------------------------------------------------

    /// Enabled stations in enumeration order, with their current load.
    /// `heading` is the station the routed unit is already travelling to; its
    /// load leaves out that unit's own in-transit entry.
    fn candidates(&self, heading: Option<StationId>) -> Vec<Candidate> {
        self.order
            .iter()
            .filter_map(|&id| {
                let station = self.stations.get(id)?;
                let mut load = station.time_until_available();
                if heading == Some(id) {
                    load = load.saturating_sub(station.processing_duration());
                }
                station.is_enabled().then(|| Candidate {
                    station: id,
                    input_type: station.input_type(),
                    load,
                })
            })
            .collect()
    }

    /// Run the selection policy for `unit` and apply the outcome. Returns the
    /// chosen station, or `None` when the unit was parked.
    fn route_unit(&mut self, unit: UnitId, result: &mut AdvanceResult) -> Option<StationId> {
        let u = self.units.get(unit)?;
        let current = u.resource_type();
        let heading = u.destination().filter(|_| u.state() == UnitState::Moving);
        let candidates = self.candidates(heading);

        match select_station(current, &candidates) {
            Ok(station) => {
                self.assign(unit, station);
                Some(station)
            }
            Err(err) => {
                tracing::warn!(?unit, resource_type = %current, %err, "parking unit");
                if let Some(u) = self.units.get_mut(unit) {
                    if let (UnitState::Moving, Some(previous)) = (u.state(), u.destination())
                        && let Some(prev) = self.stations.get_mut(previous)
                    {
                        prev.remove_from_in_transit(unit);
                    }
                    u.set_lifecycle_state(UnitState::Unassigned);
                }
                self.event_bus.emit(Event::NoRoute {
                    unit,
                    wanted: wanted_type(current),
                    tick: self.sim_state.tick,
                });
                result.routing_misses += 1;
                None
            }
        }
    }

    fn assign(&mut self, unit: UnitId, station: StationId) {
        let tick = self.sim_state.tick;
        let Some(u) = self.units.get_mut(unit) else {
            return;
        };
        if u.state() == UnitState::Moving && u.destination() == Some(station) {
            tracing::debug!(?unit, ?station, "unit keeps its destination");
            return;
        }

        if let Assignment::Reassigned { previous } = u.assign_destination(station) {
            if let Some(prev) = self.stations.get_mut(previous) {
                prev.remove_from_in_transit(unit);
            }
            tracing::warn!(?unit, ?previous, next = ?station, "unit reassigned while moving");
            self.event_bus.emit(Event::ReassignedWhileMoving {
                unit,
                previous,
                next: station,
                tick,
            });
        }

        if let Some(st) = self.stations.get_mut(station) {
            st.add_to_in_transit(unit);
            tracing::debug!(?unit, station = st.label(), tick, "unit routed");
        }
        self.event_bus.emit(Event::UnitRouted { unit, station, tick });
    }

    fn sweep_parked(&mut self, result: &mut AdvanceResult) -> usize {
        let parked = self.parked_units();
        let mut routed = 0;
        for unit in parked {
            if self.route_unit(unit, result).is_some() {
                routed += 1;
            }
        }
        routed
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    /// Disable a station and re-route everything it held. Disabling an
    /// already disabled station does nothing.
    pub fn disable_station(&mut self, station: StationId) -> Result<(), ControllerError> {
        let st = self
            .stations
            .get_mut(station)
            .ok_or(ControllerError::UnknownStation(station))?;
        match st.disable() {
            Some(signal) => {
                self.inbox.push_back(Message::from_signal(station, signal));
                self.dispatch(&mut AdvanceResult::default());
            }
            None => tracing::debug!(station = st.label(), "already disabled"),
        }
        Ok(())
    }

    /// Re-enable a station. Enabling a station that is not disabled does
    /// nothing.
    pub fn enable_station(&mut self, station: StationId) -> Result<(), ControllerError> {
        let st = self
            .stations
            .get_mut(station)
            .ok_or(ControllerError::UnknownStation(station))?;
        match st.enable() {
            Some(signal) => {
                self.inbox.push_back(Message::from_signal(station, signal));
                self.dispatch(&mut AdvanceResult::default());
            }
            None => tracing::debug!(station = st.label(), "already enabled"),
        }
        Ok(())
    }

    /// Try to route every parked unit. Returns how many found a station.
    pub fn reroute_parked(&mut self) -> usize {
        self.sweep_parked(&mut AdvanceResult::default())
    }

    /// Re-run selection for a parked or moving unit. A moving unit that picks
    /// a different station is released from its previous one.
    pub fn reroute_unit(&mut self, unit: UnitId) -> Result<Option<StationId>, ControllerError> {
        let state = self
            .units
            .get(unit)
            .ok_or(ControllerError::UnknownUnit(unit))?
            .state();
        match state {
            UnitState::Unassigned | UnitState::Moving => {
                Ok(self.route_unit(unit, &mut AdvanceResult::default()))
            }
            UnitState::Waiting | UnitState::Transforming => Err(ControllerError::UnitHeld(unit)),
        }
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Register a passive listener for an event kind.
    pub fn on_event(&mut self, kind: EventKind, listener: Listener) {
        self.event_bus.on(kind, listener);
    }

    /// Register a passive listener with a priority and an optional filter.
    pub fn on_event_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        self.event_bus.on_filtered(kind, priority, filter, listener);
    }

    pub fn suppress_event(&mut self, kind: EventKind) {
        self.event_bus.suppress(kind);
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    // -----------------------------------------------------------------------
    // Query API (read-only)
    // -----------------------------------------------------------------------

    pub fn tick(&self) -> Ticks {
        self.sim_state.tick
    }

    pub fn strategy(&self) -> &SimulationStrategy {
        &self.strategy
    }

    /// Hash computed at the end of the last step. Zero before the first step.
    pub fn state_hash(&self) -> u64 {
        self.last_state_hash
    }

    pub fn station(&self, id: StationId) -> Option<&Station> {
        self.stations.get(id)
    }

    pub fn unit(&self, id: UnitId) -> Option<&ProductionUnit> {
        self.units.get(id)
    }

    /// Station ids in enumeration order.
    pub fn station_ids(&self) -> &[StationId] {
        &self.order
    }

    /// Stations in enumeration order.
    pub fn stations(&self) -> impl Iterator<Item = (StationId, &Station)> + '_ {
        self.order
            .iter()
            .filter_map(|&id| self.stations.get(id).map(|s| (id, s)))
    }

    pub fn units(&self) -> impl Iterator<Item = (UnitId, &ProductionUnit)> + '_ {
        self.units.iter()
    }

    pub fn station_by_label(&self, label: &str) -> Option<StationId> {
        self.stations()
            .find(|(_, s)| s.label() == label)
            .map(|(id, _)| id)
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Units that are `Unassigned` with no destination.
    pub fn parked_units(&self) -> Vec<UnitId> {
        self.units
            .iter()
            .filter(|(_, u)| u.is_in_state(UnitState::Unassigned) && u.destination().is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn snapshot_unit(&self, id: UnitId) -> Option<UnitSnapshot> {
        let unit = self.units.get(id)?;
        Some(UnitSnapshot {
            id,
            resource_type: unit.resource_type(),
            state: unit.state(),
            destination: unit.destination(),
            position: unit.position(),
        })
    }

    pub fn snapshot_all_units(&self) -> Vec<UnitSnapshot> {
        self.units
            .keys()
            .filter_map(|id| self.snapshot_unit(id))
            .collect()
    }

    pub fn snapshot_station(&self, id: StationId) -> Option<StationSnapshot> {
        let station = self.stations.get(id)?;
        Some(StationSnapshot {
            id,
            label: station.label().to_string(),
            recipe: station.recipe(),
            state: station.state(),
            active: station.active_unit(),
            pending: station.pending().collect(),
            in_transit: station.in_transit().to_vec(),
            elapsed: station.elapsed(),
            processing_duration: station.processing_duration(),
            time_until_available: station.time_until_available(),
            position: station.position(),
        })
    }

    /// Snapshots of every station in enumeration order.
    pub fn snapshot_all_stations(&self) -> Vec<StationSnapshot> {
        self.order
            .iter()
            .filter_map(|&id| self.snapshot_station(id))
            .collect()
    }

    /// Number of stations in each state: (available, transforming, disabled).
    pub fn station_state_counts(&self) -> (usize, usize, usize) {
        self.stations
            .values()
            .fold((0, 0, 0), |(a, t, d), s| match s.state() {
                StationState::Available => (a + 1, t, d),
                StationState::Transforming => (a, t + 1, d),
                StationState::Disabled => (a, t, d + 1),
            })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StationConfig;
    use crate::cycle::{ResourceType, StationRecipe};
    use crate::fixed::Position;
    use crate::movement::Teleport;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn station_cfg(label: &str, recipe: StationRecipe, x: f64, y: f64) -> StationConfig {
        StationConfig::new(label, recipe).at(Position::from_f64(x, y, 0.0))
    }

    fn teleporting(config: &FactoryConfig) -> Controller {
        Controller::from_config_with(config, Box::new(Teleport)).unwrap()
    }

    fn record(controller: &mut Controller, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        controller.on_event(kind, Box::new(move |e| sink.borrow_mut().push(e.clone())));
        log
    }

    fn id(controller: &Controller, label: &str) -> StationId {
        controller.station_by_label(label).unwrap()
    }

    /// The only unit spawned at `label`.
    fn spawned_at(controller: &Controller, label: &str) -> UnitId {
        let pos = controller.station(id(controller, label)).unwrap().position();
        let matches: Vec<UnitId> = controller
            .units()
            .filter(|(_, u)| u.position() == pos)
            .map(|(id, _)| id)
            .collect();
        assert_eq!(matches.len(), 1);
        matches[0]
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    #[test]
    fn lone_station_parks_its_unit() {
        let config = FactoryConfig::new()
            .with_station(StationConfig::new("ab", StationRecipe::AB).with_duration(10));
        let mut c = Controller::from_config(&config).unwrap();
        let no_route = record(&mut c, EventKind::NoRoute);

        assert_eq!(c.unit_count(), 1);
        let parked = c.parked_units();
        assert_eq!(parked.len(), 1);
        let unit = c.unit(parked[0]).unwrap();
        assert_eq!(unit.resource_type(), ResourceType::B);
        assert_eq!(unit.destination(), None);

        for _ in 0..20 {
            c.step();
        }
        assert_eq!(c.parked_units(), parked);
        assert_eq!(
            c.station(id(&c, "ab")).unwrap().state(),
            StationState::Available
        );

        // The setup-time routing miss is delivered at the first post-tick.
        let events = no_route.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::NoRoute { wanted: ResourceType::C, tick: 0, .. }
        ));
    }

    #[test]
    fn disabled_stations_spawn_nothing() {
        let config = FactoryConfig::new()
            .with_station(StationConfig::new("ab", StationRecipe::AB))
            .with_station(StationConfig::new("ca", StationRecipe::CA).disabled());
        let c = Controller::from_config(&config).unwrap();
        assert_eq!(c.unit_count(), 1);
        assert_eq!(
            c.station(id(&c, "ca")).unwrap().state(),
            StationState::Disabled
        );
    }

    #[test]
    fn setup_runs_once() {
        let config = FactoryConfig::new().with_station(StationConfig::new("ab", StationRecipe::AB));
        let mut c = Controller::from_config(&config).unwrap();
        c.setup();
        assert_eq!(c.unit_count(), 1);
    }

    #[test]
    fn invalid_config_rejected() {
        assert!(matches!(
            Controller::from_config(&FactoryConfig::new()),
            Err(ConfigError::NoStations)
        ));
    }

    // -----------------------------------------------------------------------
    // Closed loop
    // -----------------------------------------------------------------------

    fn ring(duration: Ticks) -> FactoryConfig {
        FactoryConfig::new()
            .with_station(station_cfg("ab", StationRecipe::AB, 0.0, 0.0).with_duration(duration))
            .with_station(station_cfg("bc", StationRecipe::BC, 10.0, 0.0).with_duration(duration))
            .with_station(station_cfg("ca", StationRecipe::CA, 0.0, 10.0).with_duration(duration))
    }

    #[test]
    fn unit_follows_successor_rule_around_the_ring() {
        let mut c = teleporting(&ring(2));
        let arrivals = record(&mut c, EventKind::UnitArrived);
        let u = spawned_at(&c, "ab");
        assert_eq!(c.unit(u).unwrap().resource_type(), ResourceType::B);

        for _ in 0..7 {
            c.step();
        }

        let labels: Vec<String> = arrivals
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::UnitArrived { unit, station, .. } if *unit == u => {
                    Some(c.station(*station).unwrap().label().to_string())
                }
                _ => None,
            })
            .collect();
        assert_eq!(labels, ["ca", "bc", "ab", "ca"]);
        assert!(c.parked_units().is_empty());
    }

    #[test]
    fn finished_unit_carries_output_type() {
        let mut c = teleporting(&ring(2));
        let u = spawned_at(&c, "ab");
        c.step(); // arrive at ca, start
        assert_eq!(c.unit(u).unwrap().state(), UnitState::Transforming);
        c.step(); // finish: B becomes A, heads to bc
        let unit = c.unit(u).unwrap();
        assert_eq!(unit.resource_type(), ResourceType::A);
        assert_eq!(unit.state(), UnitState::Moving);
        assert_eq!(unit.destination(), Some(id(&c, "bc")));
    }

    #[test]
    fn linear_motion_arrives_after_travel() {
        let config = FactoryConfig::new()
            .with_unit_speed(Fixed64::from_num(5))
            .with_station(station_cfg("ab", StationRecipe::AB, 0.0, 0.0))
            .with_station(station_cfg("ca", StationRecipe::CA, 10.0, 0.0).with_duration(3));
        let mut c = Controller::from_config(&config).unwrap();
        let u = spawned_at(&c, "ab");

        let r = c.step();
        assert_eq!(r.arrivals, 0);
        let unit = c.unit(u).unwrap();
        assert_eq!(unit.state(), UnitState::Moving);
        assert_eq!(unit.position(), Position::from_f64(5.0, 0.0, 0.0));

        let r = c.step();
        assert_eq!(r.arrivals, 1);
        assert_eq!(c.unit(u).unwrap().state(), UnitState::Transforming);

        // Started on the arrival step, so two more ticks finish it. Type A
        // wants B and there is no BC station.
        c.step();
        let r = c.step();
        assert_eq!(r.completions, 1);
        assert_eq!(r.routing_misses, 1);
        assert!(c.parked_units().contains(&u));
        assert_eq!(c.unit(u).unwrap().resource_type(), ResourceType::A);
    }

    // -----------------------------------------------------------------------
    // Disable / enable
    // -----------------------------------------------------------------------

    /// A `C` unit heading from `bc` to the first of two `AB` stations.
    fn two_targets() -> (Controller, UnitId) {
        let config = FactoryConfig::new()
            .with_unit_speed(Fixed64::from_num(1))
            .with_station(station_cfg("bc", StationRecipe::BC, 0.0, 0.0))
            .with_station(station_cfg("ab-1", StationRecipe::AB, 100.0, 0.0))
            .with_station(station_cfg("ab-2", StationRecipe::AB, 0.0, 100.0));
        let c = Controller::from_config(&config).unwrap();
        let u = spawned_at(&c, "bc");
        (c, u)
    }

    #[test]
    fn tie_goes_to_first_station() {
        let (c, u) = two_targets();
        assert_eq!(c.unit(u).unwrap().destination(), Some(id(&c, "ab-1")));
    }

    #[test]
    fn disable_mid_route_reroutes_to_alternate() {
        let (mut c, u) = two_targets();
        c.step();
        let ab1 = id(&c, "ab-1");
        let ab2 = id(&c, "ab-2");

        c.disable_station(ab1).unwrap();
        let unit = c.unit(u).unwrap();
        assert_eq!(unit.state(), UnitState::Moving);
        assert_eq!(unit.destination(), Some(ab2));
        assert!(c.station(ab2).unwrap().in_transit().contains(&u));
        assert!(c.station(ab1).unwrap().in_transit().is_empty());
    }

    #[test]
    fn disable_without_alternate_parks() {
        let (mut c, u) = two_targets();
        c.step();
        c.disable_station(id(&c, "ab-1")).unwrap();
        c.disable_station(id(&c, "ab-2")).unwrap();

        let unit = c.unit(u).unwrap();
        assert_eq!(unit.state(), UnitState::Unassigned);
        assert_eq!(unit.destination(), None);
        assert!(c.parked_units().contains(&u));
    }

    #[test]
    fn disable_releases_active_queued_and_in_transit() {
        let config = FactoryConfig::new()
            .with_station(station_cfg("bc", StationRecipe::BC, 0.0, 0.0))
            .with_station(station_cfg("ab-1", StationRecipe::AB, 5.0, 0.0))
            .with_station(station_cfg("ab-2", StationRecipe::AB, 0.0, 5.0));
        let mut c = teleporting(&config);
        let bc = id(&c, "bc");
        let ab1 = id(&c, "ab-1");
        let ab2 = id(&c, "ab-2");

        // Four C units alternate between the two AB stations by load.
        for _ in 0..3 {
            c.spawn_at(bc).unwrap();
        }
        assert_eq!(c.station(ab1).unwrap().in_transit().len(), 2);
        assert_eq!(c.station(ab2).unwrap().in_transit().len(), 2);

        c.step();
        let s1 = c.snapshot_station(ab1).unwrap();
        assert!(s1.active.is_some());
        assert_eq!(s1.pending.len(), 1);
        let held: Vec<UnitId> = s1.active.into_iter().chain(s1.pending).collect();

        // One more in transit to ab-1.
        let extra = c.spawn_at(bc).unwrap();
        assert_eq!(c.unit(extra).unwrap().destination(), Some(ab1));

        c.disable_station(ab1).unwrap();
        assert_eq!(c.snapshot_station(ab1).unwrap().held_count(), 0);
        for unit in held.iter().copied().chain([extra]) {
            let u = c.unit(unit).unwrap();
            assert_eq!(u.state(), UnitState::Moving);
            assert_eq!(u.destination(), Some(ab2));
            assert!(c.station(ab2).unwrap().in_transit().contains(&unit));
        }
    }

    #[test]
    fn disable_emits_release_snapshot() {
        let (mut c, u) = two_targets();
        let disabled = record(&mut c, EventKind::StationDisabled);
        let ab1 = id(&c, "ab-1");
        c.disable_station(ab1).unwrap();
        c.disable_station(ab1).unwrap(); // no-op
        c.step();

        let events = disabled.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            Event::StationDisabled { station: ab1, released: vec![u], tick: 0 }
        );
    }

    #[test]
    fn enable_does_not_reroute_by_default() {
        let config = FactoryConfig::new()
            .with_station(StationConfig::new("ab", StationRecipe::AB))
            .with_station(StationConfig::new("ca", StationRecipe::CA).disabled());
        let mut c = Controller::from_config(&config).unwrap();
        let ca = id(&c, "ca");
        assert_eq!(c.parked_units().len(), 1);

        c.enable_station(ca).unwrap();
        assert_eq!(c.parked_units().len(), 1);
        assert_eq!(c.reroute_parked(), 1);
        assert!(c.parked_units().is_empty());
    }

    #[test]
    fn enable_sweeps_parked_when_configured() {
        let config = FactoryConfig::new()
            .with_reroute_on_enable(true)
            .with_station(StationConfig::new("ab", StationRecipe::AB))
            .with_station(StationConfig::new("ca", StationRecipe::CA).disabled());
        let mut c = Controller::from_config(&config).unwrap();
        let ca = id(&c, "ca");
        let parked = c.parked_units();

        c.enable_station(ca).unwrap();
        assert!(c.parked_units().is_empty());
        assert_eq!(c.unit(parked[0]).unwrap().destination(), Some(ca));
    }

    #[test]
    fn unknown_ids_are_errors() {
        let (mut c, _) = two_targets();
        let bogus = StationId::default();
        assert_eq!(
            c.disable_station(bogus),
            Err(ControllerError::UnknownStation(bogus))
        );
        assert_eq!(
            c.enable_station(bogus),
            Err(ControllerError::UnknownStation(bogus))
        );
        assert_eq!(
            c.reroute_unit(UnitId::default()),
            Err(ControllerError::UnknownUnit(UnitId::default()))
        );
    }

    // -----------------------------------------------------------------------
    // Reassignment
    // -----------------------------------------------------------------------

    #[test]
    fn reassignment_releases_previous_in_transit() {
        let (mut c, u) = two_targets();
        let reassigned = record(&mut c, EventKind::ReassignedWhileMoving);
        let bc = id(&c, "bc");
        let ab1 = id(&c, "ab-1");
        let ab2 = id(&c, "ab-2");

        // With ab-2 down, a second unit can only pile onto ab-1.
        c.disable_station(ab2).unwrap();
        let other = c.spawn_at(bc).unwrap();
        assert_eq!(c.unit(other).unwrap().destination(), Some(ab1));
        c.enable_station(ab2).unwrap();

        assert_eq!(c.reroute_unit(u), Ok(Some(ab2)));
        assert_eq!(c.station(ab1).unwrap().in_transit(), &[other]);
        assert_eq!(c.station(ab2).unwrap().in_transit(), &[u]);

        c.step();
        let events = reassigned.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            Event::ReassignedWhileMoving { previous, next, .. } if previous == ab1 && next == ab2
        ));
    }

    #[test]
    fn repeated_reroute_keeps_destination() {
        let (mut c, u) = two_targets();
        let ab1 = id(&c, "ab-1");
        let before = c.station(ab1).unwrap().time_until_available();

        for _ in 0..4 {
            assert_eq!(c.reroute_unit(u), Ok(Some(ab1)));
        }
        assert_eq!(c.station(ab1).unwrap().in_transit(), &[u]);
        assert_eq!(c.station(ab1).unwrap().time_until_available(), before);
        assert!(c.station(id(&c, "ab-2")).unwrap().in_transit().is_empty());
    }

    #[test]
    fn rerouting_to_same_station_is_silent() {
        let (mut c, u) = two_targets();
        // Flush the setup events first.
        c.step();
        let reassigned = record(&mut c, EventKind::ReassignedWhileMoving);
        let routed = record(&mut c, EventKind::UnitRouted);

        assert_eq!(c.reroute_unit(u), Ok(Some(id(&c, "ab-1"))));
        c.step();
        assert!(reassigned.borrow().is_empty());
        assert!(routed.borrow().is_empty());
        assert!(crate::validation::check_invariants(&c).is_empty());
    }

    #[test]
    fn reroute_refuses_held_units() {
        let mut c = teleporting(&ring(5));
        let u = spawned_at(&c, "ab");
        c.step();
        assert_eq!(c.reroute_unit(u), Err(ControllerError::UnitHeld(u)));
    }

    // -----------------------------------------------------------------------
    // Setters and movement
    // -----------------------------------------------------------------------

    #[test]
    fn unit_speed_must_be_positive() {
        let mut c = Controller::new(SimulationStrategy::Tick);
        assert!(matches!(
            c.set_unit_speed(Fixed64::ZERO),
            Err(ConfigError::NonPositiveSpeed)
        ));
        assert!(matches!(
            c.set_unit_speed(Fixed64::from_num(-2)),
            Err(ConfigError::NonPositiveSpeed)
        ));
        assert!(c.set_unit_speed(Fixed64::from_num(3)).is_ok());
    }

    #[test]
    fn unit_speed_applies_to_new_spawns() {
        let mut c = Controller::new(SimulationStrategy::Tick);
        let ab = c.add_station(Station::new(
            "ab",
            StationRecipe::AB,
            10,
            Fixed64::from_num(0.1),
            Position::ORIGIN,
        ));
        c.add_station(Station::new(
            "ca",
            StationRecipe::CA,
            10,
            Fixed64::from_num(0.1),
            Position::from_f64(100.0, 0.0, 0.0),
        ));
        c.set_unit_speed(Fixed64::from_num(3)).unwrap();
        c.setup();
        let first = spawned_at(&c, "ab");
        c.set_unit_speed(Fixed64::from_num(7)).unwrap();
        let second = c.spawn_at(ab).unwrap();

        c.step();
        assert_eq!(c.unit(first).unwrap().position(), Position::from_f64(3.0, 0.0, 0.0));
        assert_eq!(c.unit(second).unwrap().position(), Position::from_f64(7.0, 0.0, 0.0));
    }

    #[test]
    fn swapped_locomotion_takes_over() {
        let config = FactoryConfig::new()
            .with_station(station_cfg("ab", StationRecipe::AB, 0.0, 0.0))
            .with_station(station_cfg("ca", StationRecipe::CA, 100.0, 0.0));
        let mut c = Controller::from_config(&config).unwrap();
        let u = spawned_at(&c, "ab");

        c.set_locomotion(Box::new(Teleport));
        assert_eq!(c.step().arrivals, 1);
        assert_ne!(c.unit(u).unwrap().state(), UnitState::Moving);
    }

    #[test]
    fn reroute_on_enable_can_be_toggled() {
        let config = FactoryConfig::new()
            .with_station(StationConfig::new("ab", StationRecipe::AB))
            .with_station(StationConfig::new("ca", StationRecipe::CA).disabled());
        let mut c = Controller::from_config(&config).unwrap();
        let ca = id(&c, "ca");

        c.set_reroute_on_enable(true);
        c.enable_station(ca).unwrap();
        assert!(c.parked_units().is_empty());
    }

    #[test]
    fn far_stations_move_at_unit_speed() {
        let config = FactoryConfig::new()
            .with_unit_speed(Fixed64::from_num(5))
            .with_station(station_cfg("ab", StationRecipe::AB, 0.0, 0.0))
            .with_station(station_cfg("ca", StationRecipe::CA, 60_000.0, 0.0));
        let mut c = Controller::from_config(&config).unwrap();
        let u = spawned_at(&c, "ab");

        c.step();
        assert_eq!(c.unit(u).unwrap().position(), Position::from_f64(5.0, 0.0, 0.0));
        c.step();
        assert_eq!(c.unit(u).unwrap().position(), Position::from_f64(10.0, 0.0, 0.0));
    }

    // -----------------------------------------------------------------------
    // Strategy, pause, hash
    // -----------------------------------------------------------------------

    #[test]
    fn delta_mode_accumulates() {
        let config = ring(2).with_strategy(SimulationStrategy::Delta { fixed_timestep: 3 });
        let mut c = Controller::from_config(&config).unwrap();

        assert_eq!(c.advance(2).steps_run, 0);
        assert_eq!(c.sim_state.accumulator, 2);
        assert_eq!(c.advance(4).steps_run, 2);
        assert_eq!(c.sim_state.accumulator, 0);
        assert_eq!(c.tick(), 2);
    }

    #[test]
    fn paused_controller_does_nothing() {
        let mut c = teleporting(&ring(2));
        c.pause();
        assert!(c.is_paused());
        assert_eq!(c.step(), AdvanceResult::default());
        assert_eq!(c.tick(), 0);
        c.resume();
        assert_eq!(c.step().steps_run, 1);
    }

    #[test]
    fn identical_runs_hash_identically() {
        let mut a = Controller::from_config(&ring(3)).unwrap();
        let mut b = Controller::from_config(&ring(3)).unwrap();
        for _ in 0..40 {
            a.step();
            b.step();
            assert_eq!(a.state_hash(), b.state_hash());
        }
        assert_ne!(a.state_hash(), 0);
    }

    #[test]
    fn suppressed_kinds_are_not_delivered() {
        let mut c = teleporting(&ring(2));
        let routed = record(&mut c, EventKind::UnitRouted);
        c.suppress_event(EventKind::UnitRouted);
        for _ in 0..4 {
            c.step();
        }
        assert!(routed.borrow().is_empty());
    }

    #[test]
    fn station_counts_by_state() {
        let mut c = teleporting(&ring(2));
        assert_eq!(c.station_state_counts(), (3, 0, 0));
        c.step();
        assert_eq!(c.station_state_counts(), (0, 3, 0));
        c.disable_station(id(&c, "ab")).unwrap();
        assert_eq!(c.station_state_counts().2, 1);
    }
}
