use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Deterministic square root. Non-positive inputs yield zero.
///
/// Works on the raw bits: `sqrt(bits << 32)` is exactly the Q32.32 encoding of
/// `sqrt(value)`, so the result is bit-identical on every platform.
#[inline]
pub fn sqrt_fixed64(v: Fixed64) -> Fixed64 {
    if v <= Fixed64::ZERO {
        return Fixed64::ZERO;
    }
    let widened = (v.to_bits() as u128) << 32;
    Fixed64::from_bits(widened.isqrt() as i64)
}

// ---------------------------------------------------------------------------
// Position
// ---------------------------------------------------------------------------

/// A point in world space. Only the movement collaborator and arrival
/// detection read it; routing never does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: Fixed64,
    pub y: Fixed64,
    pub z: Fixed64,
}

impl Position {
    pub const ORIGIN: Position = Position {
        x: Fixed64::ZERO,
        y: Fixed64::ZERO,
        z: Fixed64::ZERO,
    };

    pub fn new(x: Fixed64, y: Fixed64, z: Fixed64) -> Self {
        Self { x, y, z }
    }

    /// Build a position from floats. Initialization only.
    pub fn from_f64(x: f64, y: f64, z: f64) -> Self {
        Self::new(f64_to_fixed64(x), f64_to_fixed64(y), f64_to_fixed64(z))
    }

    /// Sum of squared axis deltas on the raw bits, a Q64.64 value. `None`
    /// only when the points are further apart than `Fixed64` can express.
    fn raw_distance_squared(self, other: Position) -> Option<u128> {
        let axis = |a: Fixed64, b: Fixed64| {
            let d = (i128::from(b.to_bits()) - i128::from(a.to_bits())).unsigned_abs();
            d.checked_mul(d)
        };
        axis(self.x, other.x)?
            .checked_add(axis(self.y, other.y)?)?
            .checked_add(axis(self.z, other.z)?)
    }

    /// Squared distance, saturating at `Fixed64::MAX`.
    pub fn distance_squared(self, other: Position) -> Fixed64 {
        self.raw_distance_squared(other)
            .and_then(|s| i64::try_from(s >> 32).ok())
            .map_or(Fixed64::MAX, Fixed64::from_bits)
    }

    /// Exact to the last bit for any pair of representable points, saturating
    /// at `Fixed64::MAX`.
    pub fn distance(self, other: Position) -> Fixed64 {
        // sqrt(sum(raw^2)) is already the Q32.32 encoding of the distance.
        self.raw_distance_squared(other)
            .and_then(|s| i64::try_from(s.isqrt()).ok())
            .map_or(Fixed64::MAX, Fixed64::from_bits)
    }

    /// Move towards `target` by at most `max_step`, never overshooting.
    pub fn move_towards(self, target: Position, max_step: Fixed64) -> Position {
        if max_step <= Fixed64::ZERO {
            return self;
        }
        let dist = self.distance(target);
        if dist <= max_step {
            return target;
        }
        let step = i128::from(max_step.to_bits());
        let dist = i128::from(dist.to_bits());
        // Widened so far-apart points neither overflow nor lose the scale.
        let axis = |from: Fixed64, to: Fixed64| {
            let from = i128::from(from.to_bits());
            let delta = i128::from(to.to_bits()) - from;
            // step < dist, so the result lies between `from` and `to`.
            Fixed64::from_bits((from + delta * step / dist) as i64)
        };
        Position {
            x: axis(self.x, target.x),
            y: axis(self.y, target.y),
            z: axis(self.z, target.z),
        }
    }
}
