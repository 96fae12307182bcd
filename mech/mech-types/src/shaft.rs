//! One-degree-of-freedom shaft state.
//!
//! A shaft is the 1-DOF analogue of a rigid body: a single rotational
//! coordinate (angle) and its time derivative (angular speed). Gearboxes,
//! differentials, and driveline models are built by constraining shafts
//! together rather than full 6-DOF bodies.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique identifier (handle) for a shaft held in a mechanism world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaftId(pub u64);

impl ShaftId {
    /// Create a new shaft ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl From<u64> for ShaftId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ShaftId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Shaft({})", self.0)
    }
}

/// Kinematic state of a 1-DOF rotational shaft.
///
/// # Example
///
/// ```
/// use mech_types::ShaftState;
///
/// let shaft = ShaftState::new(1.2, -0.5);
/// assert_eq!(shaft.pos, 1.2);
/// assert_eq!(shaft.pos_dt, -0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ShaftState {
    /// Rotation angle (rad). Unbounded: accumulates over full turns.
    pub pos: f64,
    /// Angular speed (rad/s).
    pub pos_dt: f64,
}

impl ShaftState {
    /// Create a shaft state from angle and angular speed.
    #[must_use]
    pub const fn new(pos: f64, pos_dt: f64) -> Self {
        Self { pos, pos_dt }
    }

    /// Create a shaft at rest at angle zero.
    #[must_use]
    pub const fn at_rest() -> Self {
        Self {
            pos: 0.0,
            pos_dt: 0.0,
        }
    }

    /// Create a shaft spinning at the given speed, angle zero.
    #[must_use]
    pub const fn spinning(speed: f64) -> Self {
        Self {
            pos: 0.0,
            pos_dt: speed,
        }
    }

    /// Check if the state contains `NaN` or `Inf` values.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.pos_dt.is_finite()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_shaft_id() {
        let id = ShaftId::new(3);
        assert_eq!(id.raw(), 3);
        assert_eq!(id.to_string(), "Shaft(3)");
    }

    #[test]
    fn test_shaft_state() {
        let s = ShaftState::spinning(2.0);
        assert_eq!(s.pos, 0.0);
        assert_eq!(s.pos_dt, 2.0);
        assert!(s.is_finite());

        let bad = ShaftState::new(f64::NAN, 0.0);
        assert!(!bad.is_finite());
    }
}
