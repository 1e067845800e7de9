//! The resource-type cycle and the station recipes that cover it.
//!
//! Three resource types form a directed cycle `A -> B -> C -> A`. Each of the
//! three recipes consumes one type and produces its successor, so the recipe
//! set covers the cycle exactly once. All lookups are total `match`es over
//! closed enums; the only way to reach an out-of-domain value is through the
//! raw conversions at the bottom of this module, which report
//! [`CycleError::InvalidArgument`].

use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A material kind carried by a production unit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum ResourceType {
    A,
    B,
    C,
}

/// A station recipe: one input type, one output type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum StationRecipe {
    AB,
    BC,
    CA,
}

/// Number of resource types in the cycle.
pub const CYCLE_LENGTH: usize = 3;

impl ResourceType {
    /// All types in enumeration order.
    pub const ALL: [ResourceType; CYCLE_LENGTH] = [ResourceType::A, ResourceType::B, ResourceType::C];

    /// The next type in the cycle.
    pub fn successor(self) -> ResourceType {
        match self {
            ResourceType::A => ResourceType::B,
            ResourceType::B => ResourceType::C,
            ResourceType::C => ResourceType::A,
        }
    }

    /// The previous type in the cycle.
    pub fn predecessor(self) -> ResourceType {
        match self {
            ResourceType::A => ResourceType::C,
            ResourceType::B => ResourceType::A,
            ResourceType::C => ResourceType::B,
        }
    }

    fn index(self) -> u8 {
        self as u8
    }
}

impl StationRecipe {
    /// All recipes in enumeration order.
    pub const ALL: [StationRecipe; CYCLE_LENGTH] =
        [StationRecipe::AB, StationRecipe::BC, StationRecipe::CA];

    /// The type this recipe consumes.
    pub fn input_type(self) -> ResourceType {
        match self {
            StationRecipe::AB => ResourceType::A,
            StationRecipe::BC => ResourceType::B,
            StationRecipe::CA => ResourceType::C,
        }
    }

    /// The type this recipe produces.
    pub fn output_type(self) -> ResourceType {
        match self {
            StationRecipe::AB => ResourceType::B,
            StationRecipe::BC => ResourceType::C,
            StationRecipe::CA => ResourceType::A,
        }
    }

    /// The unique recipe consuming `input`.
    pub fn consuming(input: ResourceType) -> StationRecipe {
        match input {
            ResourceType::A => StationRecipe::AB,
            ResourceType::B => StationRecipe::BC,
            ResourceType::C => StationRecipe::CA,
        }
    }

    fn index(self) -> u8 {
        self as u8
    }
}

/// Free-function form of [`StationRecipe::input_type`].
pub fn input_type(recipe: StationRecipe) -> ResourceType {
    recipe.input_type()
}

/// Free-function form of [`StationRecipe::output_type`].
pub fn output_type(recipe: StationRecipe) -> ResourceType {
    recipe.output_type()
}

/// Free-function form of [`ResourceType::successor`].
pub fn successor(t: ResourceType) -> ResourceType {
    t.successor()
}

/// Free-function form of [`ResourceType::predecessor`].
pub fn predecessor(t: ResourceType) -> ResourceType {
    t.predecessor()
}

// ---------------------------------------------------------------------------
// Raw conversions
// ---------------------------------------------------------------------------

/// Errors from converting raw data into cycle values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("invalid argument: {kind} value '{value}' is outside the enumerated domain")]
    InvalidArgument { kind: &'static str, value: String },
}

impl CycleError {
    fn invalid(kind: &'static str, value: impl fmt::Display) -> Self {
        CycleError::InvalidArgument {
            kind,
            value: value.to_string(),
        }
    }
}

impl TryFrom<u8> for ResourceType {
    type Error = CycleError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        ResourceType::ALL
            .into_iter()
            .find(|t| t.index() == raw)
            .ok_or_else(|| CycleError::invalid("resource type", raw))
    }
}

impl TryFrom<u8> for StationRecipe {
    type Error = CycleError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        StationRecipe::ALL
            .into_iter()
            .find(|r| r.index() == raw)
            .ok_or_else(|| CycleError::invalid("station recipe", raw))
    }
}

impl FromStr for ResourceType {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(ResourceType::A),
            "B" | "b" => Ok(ResourceType::B),
            "C" | "c" => Ok(ResourceType::C),
            other => Err(CycleError::invalid("resource type", other)),
        }
    }
}

impl FromStr for StationRecipe {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AB" => Ok(StationRecipe::AB),
            "BC" => Ok(StationRecipe::BC),
            "CA" => Ok(StationRecipe::CA),
            _ => Err(CycleError::invalid("station recipe", s)),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::A => "A",
            ResourceType::B => "B",
            ResourceType::C => "C",
        };
        f.write_str(name)
    }
}

impl fmt::Display for StationRecipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.input_type(), self.output_type())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
