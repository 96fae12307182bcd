//! Bilateral constraint formulation and solver bridging for multibody
//! mechanisms.
//!
//! This crate turns mechanical connections between generalized coordinate
//! holders (6-DOF rigid bodies, 1-DOF shafts) into scalar constraint rows,
//! assembles them into one sparse velocity-level problem, and translates
//! solved Lagrange multipliers back into physical reactions. The solve
//! itself is an external concern; a direct reference solve is included for
//! tests and small systems.
//!
//! # Architecture
//!
//! - [`MechanismWorld`] holds the bodies and shafts and fixes the global
//!   velocity column layout (6 per body, then 1 per shaft)
//! - [`ConstraintRow`] is one scalar equation: sparse Jacobian row,
//!   violation, stabilization rhs, multiplier
//! - [`Connection`] is the uniform per-step protocol every joint and
//!   coupling implements; the `int_*` marshalling hooks have default
//!   implementations over the rows
//! - [`SystemDescriptor`] assigns multiplier slots and assembles the
//!   rows into an [`AssembledSystem`] (`J v + b = 0`)
//! - [`assemble_step`] drives the strict pre-solve ordering;
//!   [`scatter_reactions`] hands multipliers back after the solve
//!
//! Two concrete connections ship with the crate: the three-shaft
//! [`PlanetaryCoupling`] (`r1*w1 + r2*w2 + r3*w3 = 0`) and the
//! four-row [`RevoluteTranslationalJoint`].
//!
//! # Example
//!
//! ```
//! use mech_constraint::{
//!     assemble_step, scatter_reactions, Connection, PlanetaryCoupling, MechanismWorld,
//!     StepOptions,
//! };
//! use mech_types::ShaftState;
//!
//! let mut world = MechanismWorld::new();
//! let carrier = world.add_shaft(ShaftState::spinning(1.0), 1.0);
//! let ring = world.add_shaft(ShaftState::spinning(1.0), 1.0);
//! let sun = world.add_shaft(ShaftState::spinning(2.0), 1.0);
//!
//! let mut gear = PlanetaryCoupling::initialize(&world, carrier, ring, sun)
//!     .unwrap()
//!     .with_ratios(-2.0, 1.0, 1.0)
//!     .unwrap();
//!
//! let mut connections: Vec<&mut dyn Connection> = vec![&mut gear];
//! let (_, system) =
//!     assemble_step(0.0, &world, &mut connections, &StepOptions::default()).unwrap();
//!
//! let inv_mass = world.inverse_mass_matrix();
//! let v = world.velocity_vector();
//! let multipliers = system.solve_reference(&inv_mass, &v, 0.0);
//! scatter_reactions(&mut connections, &multipliers, 1.0);
//!
//! // The solved impulse pulls the shaft speeds onto r1*w1 + r2*w2 + r3*w3 = 0
//! let corrected = &v + system.velocity_response(&inv_mass, &multipliers);
//! assert!((-2.0 * corrected[0] + corrected[1] + corrected[2]).abs() < 1e-9);
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]
#![warn(missing_docs)]

mod assembly;
mod connection;
mod descriptor;
mod planetary;
mod revolute_translational;
mod row;
mod sparse;
mod world;

pub use assembly::{assemble_step, scatter_reactions, StepOptions};
pub use connection::{Connection, Wrench};
pub use descriptor::{AssembledSystem, SystemDescriptor};
pub use planetary::PlanetaryCoupling;
pub use revolute_translational::RevoluteTranslationalJoint;
pub use row::{clamp_correction, ConstraintRow, JacobianEntry};
pub use sparse::{
    EffectiveMass, InvMassBlock, InverseMassMatrix, JacobianBuilder, SparseJacobian,
};
pub use world::{Holder, MechanismWorld};
