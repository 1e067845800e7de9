//! Typed observer events with pre-allocated ring buffers.
//!
//! The controller records an [`Event`] for every transition it performs and
//! delivers them in batch during the post-tick phase. Each event kind has its
//! own [`EventBuffer`] ring buffer with a configurable capacity.
//!
//! Observers are passive: they read events and never mutate the simulation.
//! The controller's own reactions do not go through this bus; they are
//! dispatched synchronously inside the tick.
//!
//! # Suppression
//!
//! Event kinds can be suppressed via [`EventBus::suppress`], which prevents
//! any allocation or recording for that kind. Suppressed events have zero cost.

use crate::cycle::ResourceType;
use crate::fixed::Ticks;
use crate::id::{StationId, UnitId};

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// A simulation event. All events carry the tick at which they occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // -- Units --
    UnitSpawned {
        unit: UnitId,
        station: StationId,
        resource_type: ResourceType,
        tick: Ticks,
    },
    UnitRouted {
        unit: UnitId,
        station: StationId,
        tick: Ticks,
    },
    UnitArrived {
        unit: UnitId,
        station: StationId,
        tick: Ticks,
    },

    // -- Processing --
    ProcessingStarted {
        station: StationId,
        unit: UnitId,
        tick: Ticks,
    },
    ProcessingFinished {
        station: StationId,
        unit: UnitId,
        produced: ResourceType,
        tick: Ticks,
    },

    // -- Stations --
    StationDisabled {
        station: StationId,
        released: Vec<UnitId>,
        tick: Ticks,
    },
    StationEnabled {
        station: StationId,
        tick: Ticks,
    },

    // -- Diagnostics --
    /// No enabled station accepts the wanted type; the unit is parked.
    NoRoute {
        unit: UnitId,
        wanted: ResourceType,
        tick: Ticks,
    },
    /// A unit already en route was given a new destination.
    ReassignedWhileMoving {
        unit: UnitId,
        previous: StationId,
        next: StationId,
        tick: Ticks,
    },
}

/// Discriminant tag for event types, used for suppression and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    UnitSpawned,
    UnitRouted,
    UnitArrived,
    ProcessingStarted,
    ProcessingFinished,
    StationDisabled,
    StationEnabled,
    NoRoute,
    ReassignedWhileMoving,
}

/// Total number of event kinds.
const EVENT_KIND_COUNT: usize = 9;

impl Event {
    /// Get the discriminant kind for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Event::UnitSpawned { .. } => EventKind::UnitSpawned,
            Event::UnitRouted { .. } => EventKind::UnitRouted,
            Event::UnitArrived { .. } => EventKind::UnitArrived,
            Event::ProcessingStarted { .. } => EventKind::ProcessingStarted,
            Event::ProcessingFinished { .. } => EventKind::ProcessingFinished,
            Event::StationDisabled { .. } => EventKind::StationDisabled,
            Event::StationEnabled { .. } => EventKind::StationEnabled,
            Event::NoRoute { .. } => EventKind::NoRoute,
            Event::ReassignedWhileMoving { .. } => EventKind::ReassignedWhileMoving,
        }
    }

    /// The tick at which the event occurred.
    pub fn tick(&self) -> Ticks {
        match self {
            Event::UnitSpawned { tick, .. }
            | Event::UnitRouted { tick, .. }
            | Event::UnitArrived { tick, .. }
            | Event::ProcessingStarted { tick, .. }
            | Event::ProcessingFinished { tick, .. }
            | Event::StationDisabled { tick, .. }
            | Event::StationEnabled { tick, .. }
            | Event::NoRoute { tick, .. }
            | Event::ReassignedWhileMoving { tick, .. } => *tick,
        }
    }
}

impl EventKind {
    /// Convert to usize index for array lookups.
    fn index(self) -> usize {
        self as usize
    }
}

// ---------------------------------------------------------------------------
// EventBuffer — pre-allocated ring buffer
// ---------------------------------------------------------------------------

/// A pre-allocated ring buffer for events. Fixed capacity; when full, the
/// oldest events are dropped.
#[derive(Debug)]
pub struct EventBuffer {
    events: Vec<Option<Event>>,
    /// Write position (wraps around).
    head: usize,
    len: usize,
    /// Total events ever written (including dropped).
    total_written: u64,
}

impl EventBuffer {
    /// Create a new ring buffer with the given capacity.
    /// A capacity of 0 is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: (0..capacity).map(|_| None).collect(),
            head: 0,
            len: 0,
            total_written: 0,
        }
    }

    /// Push an event into the ring buffer. If full, the oldest event is dropped.
    pub fn push(&mut self, event: Event) {
        self.events[self.head] = Some(event);
        self.head = (self.head + 1) % self.capacity();
        if self.len < self.capacity() {
            self.len += 1;
        }
        self.total_written += 1;
    }

    pub fn capacity(&self) -> usize {
        self.events.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_written(&self) -> u64 {
        self.total_written
    }

    /// Number of events that were dropped because the buffer was full.
    pub fn dropped_count(&self) -> u64 {
        self.total_written.saturating_sub(self.capacity() as u64)
    }

    /// Iterate over events in order from oldest to newest.
    pub fn iter(&self) -> EventBufferIter<'_> {
        let start = if self.len < self.capacity() {
            0
        } else {
            // head points to the next write position, which is the oldest entry
            self.head
        };
        EventBufferIter {
            buffer: self,
            index: start,
            remaining: self.len,
        }
    }

    pub fn clear(&mut self) {
        for slot in &mut self.events {
            *slot = None;
        }
        self.head = 0;
        self.len = 0;
    }
}

/// Iterator over events in an [`EventBuffer`], from oldest to newest.
pub struct EventBufferIter<'a> {
    buffer: &'a EventBuffer,
    index: usize,
    remaining: usize,
}

impl<'a> Iterator for EventBufferIter<'a> {
    type Item = &'a Event;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let event = self.buffer.events[self.index].as_ref();
        self.index = (self.index + 1) % self.buffer.capacity();
        self.remaining -= 1;
        event
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for EventBufferIter<'_> {}

// ---------------------------------------------------------------------------
// Listeners
// ---------------------------------------------------------------------------

/// A passive listener receives events read-only.
pub type Listener = Box<dyn FnMut(&Event)>;

/// Optional predicate that filters events for a listener.
pub type EventFilter = Box<dyn Fn(&Event) -> bool>;

/// Priority level for listeners. Lower priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ListenerPriority {
    Pre = 0,
    Normal = 1,
    Post = 2,
}

struct ListenerEntry {
    listener: Listener,
    priority: ListenerPriority,
    filter: Option<EventFilter>,
    insertion_order: u64,
}

impl std::fmt::Debug for ListenerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerEntry")
            .field("priority", &self.priority)
            .field("filtered", &self.filter.is_some())
            .field("insertion_order", &self.insertion_order)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Holds one ring buffer per event kind, listener lists, and suppression flags.
pub struct EventBus {
    buffers: [Option<EventBuffer>; EVENT_KIND_COUNT],
    suppressed: [bool; EVENT_KIND_COUNT],
    listeners: [Vec<ListenerEntry>; EVENT_KIND_COUNT],
    default_capacity: usize,
    /// Monotonically increasing counter for stable sort ordering.
    next_insertion_order: u64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("buffers", &self.buffers)
            .field("suppressed", &self.suppressed)
            .field("default_capacity", &self.default_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Create a new event bus with the given default buffer capacity per kind.
    pub fn new(default_capacity: usize) -> Self {
        Self {
            buffers: Default::default(),
            suppressed: [false; EVENT_KIND_COUNT],
            listeners: Default::default(),
            default_capacity,
            next_insertion_order: 0,
        }
    }

    /// Suppress an event kind. Suppressed events are never allocated or buffered.
    pub fn suppress(&mut self, kind: EventKind) {
        self.suppressed[kind.index()] = true;
        self.buffers[kind.index()] = None;
    }

    pub fn is_suppressed(&self, kind: EventKind) -> bool {
        self.suppressed[kind.index()]
    }

    /// Record an event. No-ops if the kind is suppressed.
    pub fn emit(&mut self, event: Event) {
        let idx = event.kind().index();
        if self.suppressed[idx] {
            return;
        }
        let capacity = self.default_capacity;
        self.buffers[idx]
            .get_or_insert_with(|| EventBuffer::new(capacity))
            .push(event);
    }

    /// Register a listener for an event kind with Normal priority and no filter.
    pub fn on(&mut self, kind: EventKind, listener: Listener) {
        self.on_filtered(kind, ListenerPriority::Normal, None, listener);
    }

    /// Register a listener with explicit priority and optional filter.
    pub fn on_filtered(
        &mut self,
        kind: EventKind,
        priority: ListenerPriority,
        filter: Option<EventFilter>,
        listener: Listener,
    ) {
        let order = self.next_insertion_order;
        self.next_insertion_order += 1;
        self.listeners[kind.index()].push(ListenerEntry {
            listener,
            priority,
            filter,
            insertion_order: order,
        });
    }

    /// Deliver all buffered events to listeners, then clear the buffers.
    ///
    /// Per kind, listeners run in `(priority, insertion_order)` order and each
    /// sees the buffered events oldest-to-newest.
    pub fn deliver(&mut self) {
        for idx in 0..EVENT_KIND_COUNT {
            let Some(buffer) = self.buffers[idx].as_mut() else {
                continue;
            };
            if buffer.is_empty() {
                continue;
            }

            // Copy out so listeners can't observe a half-cleared buffer.
            let events: Vec<Event> = buffer.iter().cloned().collect();
            buffer.clear();

            let listeners = &mut self.listeners[idx];
            listeners.sort_by_key(|entry| (entry.priority, entry.insertion_order));
            for entry in listeners.iter_mut() {
                for event in &events {
                    if let Some(filter) = &entry.filter
                        && !filter(event)
                    {
                        continue;
                    }
                    (entry.listener)(event);
                }
            }
        }
    }

    /// Get the event buffer for a specific event kind (read-only).
    pub fn buffer(&self, kind: EventKind) -> Option<&EventBuffer> {
        self.buffers[kind.index()].as_ref()
    }

    /// Count of events currently buffered for a kind.
    pub fn buffered_count(&self, kind: EventKind) -> usize {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.len())
            .unwrap_or(0)
    }

    /// Total events ever emitted for a kind (including dropped).
    pub fn total_emitted(&self, kind: EventKind) -> u64 {
        self.buffers[kind.index()]
            .as_ref()
            .map(|b| b.total_written())
            .unwrap_or(0)
    }

    /// Clear all buffers. Does not remove listeners or suppression settings.
    pub fn clear_all(&mut self) {
        for buffer in self.buffers.iter_mut().flatten() {
            buffer.clear();
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn station_id() -> StationId {
        let mut sm = SlotMap::<StationId, ()>::with_key();
        sm.insert(())
    }

    fn unit_id() -> UnitId {
        let mut sm = SlotMap::<UnitId, ()>::with_key();
        sm.insert(())
    }

    fn arrived(tick: Ticks) -> Event {
        Event::UnitArrived {
            unit: unit_id(),
            station: station_id(),
            tick,
        }
    }

    #[test]
    fn event_buffer_push_and_iterate() {
        let mut buf = EventBuffer::new(8);
        buf.push(arrived(1));
        buf.push(arrived(2));

        assert_eq!(buf.len(), 2);
        assert_eq!(buf.dropped_count(), 0);
        let ticks: Vec<Ticks> = buf.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![1, 2]);
    }

    #[test]
    fn event_buffer_ring_wraps_and_drops_oldest() {
        let mut buf = EventBuffer::new(3);
        for t in 0..5 {
            buf.push(arrived(t));
        }
        assert_eq!(buf.len(), 3);
        assert_eq!(buf.total_written(), 5);
        assert_eq!(buf.dropped_count(), 2);
        let ticks: Vec<Ticks> = buf.iter().map(Event::tick).collect();
        assert_eq!(ticks, vec![2, 3, 4]);
    }

    #[test]
    fn event_buffer_zero_capacity_clamped() {
        let buf = EventBuffer::new(0);
        assert_eq!(buf.capacity(), 1);
    }

    #[test]
    fn suppressed_events_zero_allocation() {
        let mut bus = EventBus::new(16);
        bus.suppress(EventKind::UnitArrived);
        bus.emit(arrived(0));
        assert!(bus.buffer(EventKind::UnitArrived).is_none());
        assert_eq!(bus.total_emitted(EventKind::UnitArrived), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let mut bus = EventBus::new(16);
        let log = Rc::new(RefCell::new(Vec::new()));

        for name in ["first", "second"] {
            let log = Rc::clone(&log);
            bus.on(
                EventKind::UnitArrived,
                Box::new(move |_| log.borrow_mut().push(name)),
            );
        }

        bus.emit(arrived(0));
        bus.deliver();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn priority_orders_before_insertion() {
        let mut bus = EventBus::new(16);
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        bus.on_filtered(
            EventKind::NoRoute,
            ListenerPriority::Post,
            None,
            Box::new(move |_| l.borrow_mut().push("post")),
        );
        let l = Rc::clone(&log);
        bus.on_filtered(
            EventKind::NoRoute,
            ListenerPriority::Pre,
            None,
            Box::new(move |_| l.borrow_mut().push("pre")),
        );

        bus.emit(Event::NoRoute {
            unit: unit_id(),
            wanted: ResourceType::A,
            tick: 0,
        });
        bus.deliver();
        assert_eq!(*log.borrow(), vec!["pre", "post"]);
    }

    #[test]
    fn filter_blocks_non_matching() {
        let mut bus = EventBus::new(16);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        bus.on_filtered(
            EventKind::UnitArrived,
            ListenerPriority::Normal,
            Some(Box::new(|e| e.tick() % 2 == 0)),
            Box::new(move |e| s.borrow_mut().push(e.tick())),
        );
        for t in 0..4 {
            bus.emit(arrived(t));
        }
        bus.deliver();
        assert_eq!(*seen.borrow(), vec![0, 2]);
    }

    #[test]
    fn delivery_clears_buffers() {
        let mut bus = EventBus::new(16);
        bus.emit(arrived(0));
        assert_eq!(bus.buffered_count(EventKind::UnitArrived), 1);
        bus.deliver();
        assert_eq!(bus.buffered_count(EventKind::UnitArrived), 0);
        assert_eq!(bus.total_emitted(EventKind::UnitArrived), 1);
    }

    #[test]
    fn event_kind_discriminant() {
        let e = Event::StationDisabled {
            station: station_id(),
            released: vec![unit_id()],
            tick: 7,
        };
        assert_eq!(e.kind(), EventKind::StationDisabled);
        assert_eq!(e.tick(), 7);
    }

    #[test]
    fn clear_all_keeps_listeners() {
        let mut bus = EventBus::new(16);
        let count = Rc::new(RefCell::new(0));
        let c = Rc::clone(&count);
        bus.on(EventKind::UnitArrived, Box::new(move |_| *c.borrow_mut() += 1));

        bus.emit(arrived(0));
        bus.clear_all();
        bus.deliver();
        assert_eq!(*count.borrow(), 0);

        bus.emit(arrived(1));
        bus.deliver();
        assert_eq!(*count.borrow(), 1);
    }
}
