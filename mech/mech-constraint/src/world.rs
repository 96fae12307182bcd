//! Holder arena and global velocity-coordinate layout.
//!
//! Connections never own the bodies and shafts they tie together; they hold
//! [`BodyId`]/[`ShaftId`] handles into a [`MechanismWorld`] arena, and handle
//! resolution fails explicitly if a referenced holder does not exist. Two
//! holders can be constrained together exactly when they resolve in the same
//! world.
//!
//! The world also fixes the column layout of the global velocity vector:
//! six columns per body (3 linear + 3 angular, world frame) followed by one
//! column per shaft. Constraint Jacobian entries are addressed against this
//! layout.
//!
//! Connections read holder state only. Mutation goes through the explicit
//! setters, which are meant for the external integrator after the solve.

use hashbrown::HashMap;
use mech_types::{
    BodyId, MassProperties, MechError, Result, RigidBodyState, ShaftId, ShaftState,
};
use nalgebra::DVector;

use crate::sparse::{InvMassBlock, InverseMassMatrix};

#[derive(Debug, Clone)]
struct BodySlot {
    state: RigidBodyState,
    mass: MassProperties,
}

#[derive(Debug, Clone)]
struct ShaftSlot {
    state: ShaftState,
    inertia: f64,
}

/// Arena of generalized coordinate holders (bodies and shafts).
#[derive(Debug, Clone, Default)]
pub struct MechanismWorld {
    bodies: Vec<BodySlot>,
    shafts: Vec<ShaftSlot>,
    names: HashMap<String, Holder>,
}

/// A named holder handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    /// A 6-DOF rigid body.
    Body(BodyId),
    /// A 1-DOF shaft.
    Shaft(ShaftId),
}

impl MechanismWorld {
    /// Create an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rigid body; returns its handle.
    pub fn add_body(&mut self, state: RigidBodyState, mass: MassProperties) -> BodyId {
        self.bodies.push(BodySlot { state, mass });
        BodyId::new(self.bodies.len() as u64 - 1)
    }

    /// Add a rigid body under a name.
    pub fn add_named_body(
        &mut self,
        name: impl Into<String>,
        state: RigidBodyState,
        mass: MassProperties,
    ) -> BodyId {
        let id = self.add_body(state, mass);
        self.names.insert(name.into(), Holder::Body(id));
        id
    }

    /// Add a shaft with the given rotational inertia; returns its handle.
    pub fn add_shaft(&mut self, state: ShaftState, inertia: f64) -> ShaftId {
        self.shafts.push(ShaftSlot { state, inertia });
        ShaftId::new(self.shafts.len() as u64 - 1)
    }

    /// Add a shaft under a name.
    pub fn add_named_shaft(
        &mut self,
        name: impl Into<String>,
        state: ShaftState,
        inertia: f64,
    ) -> ShaftId {
        let id = self.add_shaft(state, inertia);
        self.names.insert(name.into(), Holder::Shaft(id));
        id
    }

    /// Look up a holder by name.
    #[must_use]
    pub fn holder_by_name(&self, name: &str) -> Option<Holder> {
        self.names.get(name).copied()
    }

    /// Number of bodies.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of shafts.
    #[must_use]
    pub fn num_shafts(&self) -> usize {
        self.shafts.len()
    }

    fn body_slot(&self, id: BodyId) -> Result<&BodySlot> {
        self.bodies
            .get(id.raw() as usize)
            .ok_or(MechError::InvalidBodyId(id.raw()))
    }

    fn shaft_slot(&self, id: ShaftId) -> Result<&ShaftSlot> {
        self.shafts
            .get(id.raw() as usize)
            .ok_or(MechError::InvalidShaftId(id.raw()))
    }

    /// Resolve a body's kinematic state.
    pub fn body(&self, id: BodyId) -> Result<&RigidBodyState> {
        Ok(&self.body_slot(id)?.state)
    }

    /// Resolve a body's mass properties.
    pub fn body_mass(&self, id: BodyId) -> Result<&MassProperties> {
        Ok(&self.body_slot(id)?.mass)
    }

    /// Resolve a shaft's kinematic state.
    pub fn shaft(&self, id: ShaftId) -> Result<&ShaftState> {
        Ok(&self.shaft_slot(id)?.state)
    }

    /// Resolve a shaft's rotational inertia.
    pub fn shaft_inertia(&self, id: ShaftId) -> Result<f64> {
        Ok(self.shaft_slot(id)?.inertia)
    }

    /// Overwrite a body's kinematic state (integrator hook).
    pub fn set_body_state(&mut self, id: BodyId, state: RigidBodyState) -> Result<()> {
        let slot = self
            .bodies
            .get_mut(id.raw() as usize)
            .ok_or(MechError::InvalidBodyId(id.raw()))?;
        slot.state = state;
        Ok(())
    }

    /// Overwrite a shaft's kinematic state (integrator hook).
    pub fn set_shaft_state(&mut self, id: ShaftId, state: ShaftState) -> Result<()> {
        let slot = self
            .shafts
            .get_mut(id.raw() as usize)
            .ok_or(MechError::InvalidShaftId(id.raw()))?;
        slot.state = state;
        Ok(())
    }

    /// Total number of velocity coordinates (6 per body + 1 per shaft).
    #[must_use]
    pub fn velocity_dofs(&self) -> usize {
        6 * self.bodies.len() + self.shafts.len()
    }

    /// First velocity column of a body's 6-DOF block.
    pub fn body_velocity_offset(&self, id: BodyId) -> Result<usize> {
        self.body_slot(id)?;
        Ok(6 * id.raw() as usize)
    }

    /// Velocity column of a shaft's single coordinate.
    pub fn shaft_velocity_offset(&self, id: ShaftId) -> Result<usize> {
        self.shaft_slot(id)?;
        Ok(6 * self.bodies.len() + id.raw() as usize)
    }

    /// Gather all holder velocities into a flat vector matching the layout.
    #[must_use]
    pub fn velocity_vector(&self) -> DVector<f64> {
        let mut v = DVector::zeros(self.velocity_dofs());
        for (i, slot) in self.bodies.iter().enumerate() {
            let off = 6 * i;
            for k in 0..3 {
                v[off + k] = slot.state.twist.linear[k];
                v[off + 3 + k] = slot.state.twist.angular[k];
            }
        }
        let shaft_base = 6 * self.bodies.len();
        for (i, slot) in self.shafts.iter().enumerate() {
            v[shaft_base + i] = slot.state.pos_dt;
        }
        v
    }

    /// Scatter a flat velocity vector back into the holders (integrator hook).
    pub fn apply_velocity_vector(&mut self, v: &DVector<f64>) -> Result<()> {
        if v.len() != self.velocity_dofs() {
            return Err(MechError::invalid_config(format!(
                "velocity vector length {} does not match layout {}",
                v.len(),
                self.velocity_dofs()
            )));
        }
        for (i, slot) in self.bodies.iter_mut().enumerate() {
            let off = 6 * i;
            for k in 0..3 {
                slot.state.twist.linear[k] = v[off + k];
                slot.state.twist.angular[k] = v[off + 3 + k];
            }
        }
        let shaft_base = 6 * self.bodies.len();
        for (i, slot) in self.shafts.iter_mut().enumerate() {
            slot.state.pos_dt = v[shaft_base + i];
        }
        Ok(())
    }

    /// Build the block-diagonal inverse-mass matrix over the velocity layout.
    ///
    /// Body angular blocks are rotated into the world frame to match the
    /// world-frame angular velocity coordinates.
    #[must_use]
    pub fn inverse_mass_matrix(&self) -> InverseMassMatrix {
        let mut blocks = Vec::with_capacity(self.bodies.len() + self.shafts.len());
        for slot in &self.bodies {
            let rot = slot.state.pose.rotation.to_rotation_matrix();
            let inv_inertia_world =
                rot.matrix() * slot.mass.inverse_inertia() * rot.matrix().transpose();
            blocks.push(InvMassBlock::Body {
                inv_mass: slot.mass.inverse_mass(),
                inv_inertia: inv_inertia_world,
            });
        }
        for slot in &self.shafts {
            let inv = if slot.inertia > 0.0 && slot.inertia.is_finite() {
                1.0 / slot.inertia
            } else {
                0.0
            };
            blocks.push(InvMassBlock::Shaft { inv_inertia: inv });
        }
        InverseMassMatrix::from_blocks(blocks)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use mech_types::{Pose, Twist};
    use nalgebra::{Point3, Vector3};

    #[test]
    fn test_handle_resolution_fails_explicitly() {
        let world = MechanismWorld::new();
        assert_eq!(
            world.shaft(ShaftId::new(0)),
            Err(MechError::InvalidShaftId(0))
        );
        assert_eq!(world.body(BodyId::new(3)), Err(MechError::InvalidBodyId(3)));
    }

    #[test]
    fn test_velocity_layout() {
        let mut world = MechanismWorld::new();
        let b = world.add_body(RigidBodyState::default(), MassProperties::point_mass(1.0));
        let s0 = world.add_shaft(ShaftState::at_rest(), 1.0);
        let s1 = world.add_shaft(ShaftState::at_rest(), 1.0);

        assert_eq!(world.velocity_dofs(), 8);
        assert_eq!(world.body_velocity_offset(b).unwrap(), 0);
        assert_eq!(world.shaft_velocity_offset(s0).unwrap(), 6);
        assert_eq!(world.shaft_velocity_offset(s1).unwrap(), 7);
    }

    #[test]
    fn test_velocity_vector_round_trip() {
        let mut world = MechanismWorld::new();
        let b = world.add_body(
            RigidBodyState::new(
                Pose::from_position(Point3::origin()),
                Twist::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(0.1, 0.2, 0.3)),
            ),
            MassProperties::point_mass(1.0),
        );
        let s = world.add_shaft(ShaftState::spinning(5.0), 2.0);

        let v = world.velocity_vector();
        assert_relative_eq!(v[1], 2.0, epsilon = 1e-12);
        assert_relative_eq!(v[4], 0.2, epsilon = 1e-12);
        assert_relative_eq!(v[6], 5.0, epsilon = 1e-12);

        let mut v2 = v.clone();
        v2[6] = -1.0;
        world.apply_velocity_vector(&v2).unwrap();
        assert_eq!(world.shaft(s).unwrap().pos_dt, -1.0);
        assert_eq!(world.body(b).unwrap().twist.linear.x, 1.0);
    }

    #[test]
    fn test_apply_velocity_vector_length_mismatch() {
        let mut world = MechanismWorld::new();
        world.add_shaft(ShaftState::at_rest(), 1.0);
        let err = world.apply_velocity_vector(&DVector::zeros(3));
        assert!(err.is_err());
    }

    #[test]
    fn test_named_holders() {
        let mut world = MechanismWorld::new();
        let s = world.add_named_shaft("carrier", ShaftState::at_rest(), 0.5);
        assert_eq!(world.holder_by_name("carrier"), Some(Holder::Shaft(s)));
        assert_eq!(world.holder_by_name("ring"), None);
    }

    #[test]
    fn test_inverse_mass_blocks() {
        let mut world = MechanismWorld::new();
        world.add_body(RigidBodyState::default(), MassProperties::fixed());
        world.add_shaft(ShaftState::at_rest(), 4.0);

        let m = world.inverse_mass_matrix();
        assert_eq!(m.ncols(), 7);
        // Static body: zero inverse mass
        assert_eq!(m.element(0, 0), 0.0);
        // Shaft: 1 / 4
        assert_relative_eq!(m.element(6, 6), 0.25, epsilon = 1e-12);
    }
}
