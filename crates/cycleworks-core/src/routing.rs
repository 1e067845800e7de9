//! The routing policy: which station a unit should travel to next.
//!
//! Selection is a pure function over an explicit snapshot of enabled
//! stations. The controller builds the snapshot; nothing here reads global
//! state, so the policy can be tested and reasoned about in isolation.

use crate::cycle::ResourceType;
use crate::fixed::Ticks;
use crate::id::StationId;

/// One enabled station as seen by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub station: StationId,
    pub input_type: ResourceType,
    /// The station's `time_until_available()` at snapshot time.
    pub load: Ticks,
}

/// Routing failures. Handled locally by the controller; never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("no enabled station accepts resource type {wanted}")]
    NoRouteAvailable { wanted: ResourceType },
}

/// The input type a unit of `current` type is routed towards.
pub fn wanted_type(current: ResourceType) -> ResourceType {
    current.successor()
}

/// Pick the least-loaded candidate accepting `wanted_type(current)`.
///
/// Ties go to the earliest candidate in the slice.
pub fn select_station(
    current: ResourceType,
    candidates: &[Candidate],
) -> Result<StationId, RoutingError> {
    let wanted = wanted_type(current);
    candidates
        .iter()
        .filter(|c| c.input_type == wanted)
        .min_by_key(|c| c.load)
        .map(|c| c.station)
        .ok_or(RoutingError::NoRouteAvailable { wanted })
}
