//! Core types for multibody mechanism simulation.
//!
//! This crate provides the foundational types shared by the constraint
//! layer and any external integrator:
//!
//! - [`RigidBodyState`] - Position, orientation, velocity of 6-DOF bodies
//! - [`ShaftState`] - Angle and angular speed of 1-DOF rotational shafts
//! - [`MassProperties`] - Mass, center of mass, inertia tensor
//! - [`MechError`] - Error taxonomy for initialization and handle resolution
//!
//! # Design Philosophy
//!
//! These types are **pure data**. They have no constraint formulation, no
//! integration, no solver knowledge. They're the common language between:
//!
//! - The constraint/assembly layer (mech-constraint)
//! - External time integrators driving the step loop
//! - External sparse solvers consuming the assembled problem
//! - Logging and replay (serialized state trajectories)
//!
//! # Coordinate System
//!
//! - X: right
//! - Y: forward
//! - Z: up
//! - Right-handed; all velocities are expressed in the world frame.
//!
//! # Example
//!
//! ```
//! use mech_types::{RigidBodyState, Pose, Twist, ShaftState};
//! use nalgebra::Point3;
//!
//! let body = RigidBodyState::at_rest(Pose::from_position(Point3::new(0.0, 0.0, 1.0)));
//! assert_eq!(body.pose.position.z, 1.0);
//!
//! let shaft = ShaftState::new(0.0, 2.5); // at angle 0, spinning at 2.5 rad/s
//! assert_eq!(shaft.pos_dt, 2.5);
//! ```

#![doc(html_root_url = "https://docs.rs/mech-types/0.1.0")]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn, // Many methods can't be const due to nalgebra
    clippy::missing_errors_doc,   // Error docs added where non-obvious
)]

mod body;
mod error;
mod shaft;

pub use body::{BodyId, MassProperties, Pose, RigidBodyState, Twist};
pub use error::MechError;
pub use shaft::{ShaftId, ShaftState};

// Re-export math types for convenience
pub use nalgebra::{Isometry3, Point3, UnitQuaternion, Vector3};

/// Result type for mechanism operations.
pub type Result<T> = std::result::Result<T, MechError>;
