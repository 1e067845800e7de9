//! The movement collaborator seam.
//!
//! Physical locomotion lives outside the scheduling core. The controller only
//! needs "where is the unit after this tick", which a [`Locomotion`]
//! implementation answers. Arrival detection stays in the controller so that
//! every locomotion model gets the same exactly-once arrival semantics.

use crate::fixed::{Fixed64, Position, Ticks};
use crate::id::UnitId;

/// Moves units through the world one tick at a time.
pub trait Locomotion: std::fmt::Debug {
    /// Human-readable name, for logs.
    fn name(&self) -> &str;

    /// The unit's position after `dt` ticks of travel from `from` towards
    /// `to` at `speed` distance per tick.
    fn advance(
        &mut self,
        unit: UnitId,
        from: Position,
        to: Position,
        speed: Fixed64,
        dt: Ticks,
    ) -> Position;
}

/// Straight-line move-towards motion that never overshoots the target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearMotion;

impl Locomotion for LinearMotion {
    fn name(&self) -> &str {
        "linear"
    }

    fn advance(
        &mut self,
        _unit: UnitId,
        from: Position,
        to: Position,
        speed: Fixed64,
        dt: Ticks,
    ) -> Position {
        let step = speed.saturating_mul(Fixed64::saturating_from_num(dt));
        from.move_towards(to, step)
    }
}

/// Jumps straight to the target. Units arrive on the first movement phase
/// after assignment, which isolates routing behaviour from travel time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Teleport;

impl Locomotion for Teleport {
    fn name(&self) -> &str {
        "teleport"
    }

    fn advance(
        &mut self,
        _unit: UnitId,
        _from: Position,
        to: Position,
        _speed: Fixed64,
        _dt: Ticks,
    ) -> Position {
        to
    }
}

/// Whether `position` is strictly within `threshold` of `target`.
pub fn within_threshold(position: Position, target: Position, threshold: Fixed64) -> bool {
    position.distance(target) < threshold
}
