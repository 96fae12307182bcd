//! Three-shaft planetary coupling.
//!
//! Enforces the kinematic relation `r1*w1 + r2*w2 + r3*w3 = 0` between
//! three 1-DOF shafts, the Willis equation of an epicyclic gear train with
//! shaft 1 as carrier, shaft 2 as ring (input) and shaft 3 as sun (output).
//! One bilateral row; the multiplier maps to the internal torque the train
//! exchanges between the shafts.

use mech_types::{MechError, Result, ShaftId};
use tracing::trace;

use crate::connection::Connection;
use crate::row::ConstraintRow;
use crate::world::MechanismWorld;

/// Constraint coupling the speeds of three shafts by fixed ratios.
#[derive(Debug, Clone)]
pub struct PlanetaryCoupling {
    shaft1: ShaftId,
    shaft2: ShaftId,
    shaft3: ShaftId,
    r1: f64,
    r2: f64,
    r3: f64,
    /// Position snapshots taken at initialization (or the last phase
    /// reset); drift is measured against these, never re-integrated.
    phase1: f64,
    phase2: f64,
    phase3: f64,
    /// Stabilize the position-level relation, not just the velocity one.
    avoid_phase_drift: bool,
    active: bool,
    torque_react: f64,
    rows: Vec<ConstraintRow>,
    offset: usize,
}

impl PlanetaryCoupling {
    /// Create a coupling over three shafts with the default ratios
    /// `(1, 1, 1)`, snapshotting their current positions as the zero-drift
    /// reference.
    ///
    /// # Errors
    ///
    /// Fails if any shaft handle does not resolve in `world`, or if two
    /// handles name the same shaft.
    pub fn initialize(
        world: &MechanismWorld,
        shaft1: ShaftId,
        shaft2: ShaftId,
        shaft3: ShaftId,
    ) -> Result<Self> {
        if shaft1 == shaft2 || shaft1 == shaft3 || shaft2 == shaft3 {
            return Err(MechError::invalid_config(
                "planetary coupling requires three distinct shafts",
            ));
        }
        let s1 = world.shaft(shaft1)?;
        let s2 = world.shaft(shaft2)?;
        let s3 = world.shaft(shaft3)?;

        Ok(Self {
            shaft1,
            shaft2,
            shaft3,
            r1: 1.0,
            r2: 1.0,
            r3: 1.0,
            phase1: s1.pos,
            phase2: s2.pos,
            phase3: s3.pos,
            avoid_phase_drift: true,
            active: true,
            torque_react: 0.0,
            rows: vec![ConstraintRow::new()],
            offset: 0,
        })
    }

    /// Set the three ratios directly.
    ///
    /// # Errors
    ///
    /// Fails if all three ratios are zero (the relation would be vacuous).
    pub fn set_transmission_ratios(&mut self, r1: f64, r2: f64, r3: f64) -> Result<()> {
        if r1 == 0.0 && r2 == 0.0 && r3 == 0.0 {
            return Err(MechError::invalid_config(
                "planetary ratios must not all be zero",
            ));
        }
        self.r1 = r1;
        self.r2 = r2;
        self.r3 = r3;
        Ok(())
    }

    /// Builder form of [`set_transmission_ratios`](Self::set_transmission_ratios).
    pub fn with_ratios(mut self, r1: f64, r2: f64, r3: f64) -> Result<Self> {
        self.set_transmission_ratios(r1, r2, r3)?;
        Ok(self)
    }

    /// Set the ratios from the ordinary transmission ratio `t0 = -w3/w2`
    /// measured with the carrier (shaft 1) locked: `r1 = 1 - t0`,
    /// `r2 = t0`, `r3 = -1`.
    ///
    /// # Errors
    ///
    /// Fails with [`MechError::SingularTransmission`] when `t0 == 1`, which
    /// would decouple the carrier entirely.
    pub fn set_ratio_ordinary(&mut self, t0: f64) -> Result<()> {
        if t0 == 1.0 {
            return Err(MechError::SingularTransmission { t0 });
        }
        self.r1 = 1.0 - t0;
        self.r2 = t0;
        self.r3 = -1.0;
        Ok(())
    }

    /// Builder form of [`set_ratio_ordinary`](Self::set_ratio_ordinary).
    pub fn with_ordinary_ratio(mut self, t0: f64) -> Result<Self> {
        self.set_ratio_ordinary(t0)?;
        Ok(self)
    }

    /// The ordinary transmission ratio implied by the current ratios,
    /// `-r2 / r3`.
    #[must_use]
    pub fn ordinary_ratio(&self) -> f64 {
        -self.r2 / self.r3
    }

    /// The three ratios `(r1, r2, r3)`.
    #[must_use]
    pub const fn ratios(&self) -> (f64, f64, f64) {
        (self.r1, self.r2, self.r3)
    }

    /// Whether position-level drift correction is enabled.
    #[must_use]
    pub const fn avoid_phase_drift(&self) -> bool {
        self.avoid_phase_drift
    }

    /// Enable or disable position-level drift correction.
    pub fn set_avoid_phase_drift(&mut self, avoid: bool) {
        self.avoid_phase_drift = avoid;
    }

    /// Re-snapshot the current shaft positions as the zero-drift reference.
    ///
    /// # Errors
    ///
    /// Fails if any shaft handle no longer resolves.
    pub fn reset_phases(&mut self, world: &MechanismWorld) -> Result<()> {
        self.phase1 = world.shaft(self.shaft1)?.pos;
        self.phase2 = world.shaft(self.shaft2)?.pos;
        self.phase3 = world.shaft(self.shaft3)?.pos;
        Ok(())
    }

    /// Enable or disable the coupling.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Handle of shaft 1 (carrier).
    #[must_use]
    pub const fn shaft1(&self) -> ShaftId {
        self.shaft1
    }

    /// Handle of shaft 2.
    #[must_use]
    pub const fn shaft2(&self) -> ShaftId {
        self.shaft2
    }

    /// Handle of shaft 3.
    #[must_use]
    pub const fn shaft3(&self) -> ShaftId {
        self.shaft3
    }

    /// Current speed of shaft 1.
    ///
    /// # Errors
    ///
    /// Fails if the shaft handle does not resolve.
    pub fn speed1(&self, world: &MechanismWorld) -> Result<f64> {
        Ok(world.shaft(self.shaft1)?.pos_dt)
    }

    /// Current speed of shaft 2.
    ///
    /// # Errors
    ///
    /// Fails if the shaft handle does not resolve.
    pub fn speed2(&self, world: &MechanismWorld) -> Result<f64> {
        Ok(world.shaft(self.shaft2)?.pos_dt)
    }

    /// Current speed of shaft 3.
    ///
    /// # Errors
    ///
    /// Fails if the shaft handle does not resolve.
    pub fn speed3(&self, world: &MechanismWorld) -> Result<f64> {
        Ok(world.shaft(self.shaft3)?.pos_dt)
    }

    /// The velocity-level violation `r1*w1 + r2*w2 + r3*w3` at current
    /// shaft speeds.
    ///
    /// # Errors
    ///
    /// Fails if any shaft handle does not resolve.
    pub fn velocity_violation(&self, world: &MechanismWorld) -> Result<f64> {
        let w1 = world.shaft(self.shaft1)?.pos_dt;
        let w2 = world.shaft(self.shaft2)?.pos_dt;
        let w3 = world.shaft(self.shaft3)?.pos_dt;
        Ok(self.r1 * w1 + self.r2 * w2 + self.r3 * w3)
    }

    /// Internal train torque from the last reaction fetch.
    #[must_use]
    pub const fn torque_react(&self) -> f64 {
        self.torque_react
    }

    /// Reaction torque on shaft 1: `r1 * torque_react`.
    #[must_use]
    pub fn reaction1(&self) -> f64 {
        self.r1 * self.torque_react
    }

    /// Reaction torque on shaft 2: `r2 * torque_react`.
    #[must_use]
    pub fn reaction2(&self) -> f64 {
        self.r2 * self.torque_react
    }

    /// Reaction torque on shaft 3: `r3 * torque_react`.
    #[must_use]
    pub fn reaction3(&self) -> f64 {
        self.r3 * self.torque_react
    }
}

impl Connection for PlanetaryCoupling {
    fn is_active(&self) -> bool {
        self.active
    }

    fn row_offset(&self) -> usize {
        self.offset
    }

    fn set_row_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    fn rows(&self) -> &[ConstraintRow] {
        &self.rows
    }

    fn rows_mut(&mut self) -> &mut [ConstraintRow] {
        &mut self.rows
    }

    fn update(&mut self, _time: f64, world: &MechanismWorld) -> Result<()> {
        let violation = if self.avoid_phase_drift {
            let p1 = world.shaft(self.shaft1)?.pos - self.phase1;
            let p2 = world.shaft(self.shaft2)?.pos - self.phase2;
            let p3 = world.shaft(self.shaft3)?.pos - self.phase3;
            self.r1 * p1 + self.r2 * p2 + self.r3 * p3
        } else {
            // Still touch the handles so stale couplings fail loudly.
            world.shaft(self.shaft1)?;
            world.shaft(self.shaft2)?;
            world.shaft(self.shaft3)?;
            0.0
        };
        trace!(violation, "planetary update");
        self.rows[0].set_violation(violation);
        Ok(())
    }

    fn load_constraint_jacobians(&mut self, world: &MechanismWorld) -> Result<()> {
        let c1 = world.shaft_velocity_offset(self.shaft1)?;
        let c2 = world.shaft_velocity_offset(self.shaft2)?;
        let c3 = world.shaft_velocity_offset(self.shaft3)?;
        let row = &mut self.rows[0];
        row.clear_jacobian();
        row.push_jacobian(c1, self.r1);
        row.push_jacobian(c2, self.r2);
        row.push_jacobian(c3, self.r3);
        Ok(())
    }

    fn constraints_fetch_react(&mut self, factor: f64) {
        self.torque_react = self.rows[0].multiplier() * factor;
    }

    fn int_state_scatter_reactions(&mut self, off_l: usize, multipliers: &nalgebra::DVector<f64>) {
        if !self.active {
            return;
        }
        self.rows[0].set_multiplier(multipliers[off_l]);
        self.torque_react = multipliers[off_l];
    }
}
