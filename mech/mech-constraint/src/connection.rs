//! The connection protocol: the uniform contract between a mechanical
//! connection (joint, coupling) and the global assembly/solve machinery.
//!
//! A connection owns one or more [`ConstraintRow`]s, computes their numeric
//! content each step from current holder kinematics, and translates solved
//! multipliers back into physical reactions. The global descriptor and the
//! integrator only ever see this trait; connection-specific kinematics stay
//! behind it.
//!
//! # Canonical step ordering
//!
//! 1. [`update`](Connection::update) - refresh derived geometry and
//!    violations from current holder state (read-only on holders)
//! 2. [`inject_constraints`](Connection::inject_constraints) - reserve
//!    multiplier slots with the descriptor
//! 3. [`load_constraint_jacobians`](Connection::load_constraint_jacobians) -
//!    fill each row's partial derivatives at the frame cached in step 1
//! 4. [`constraints_bi_reset`](Connection::constraints_bi_reset) +
//!    [`constraints_bi_load_c`](Connection::constraints_bi_load_c) -
//!    load the (clamped) drift-correction term
//! 5. external solve
//! 6. [`int_state_scatter_reactions`](Connection::int_state_scatter_reactions)
//!    + [`constraints_fetch_react`](Connection::constraints_fetch_react) -
//!    recover physical reaction forces/torques from the multipliers
//!
//! Jacobians must be evaluated at the frames produced by the *same* update
//! call; nothing here survives across steps.
//!
//! The marshalling hooks (`int_*`) have default implementations in terms of
//! the rows, so a new connection type only implements kinematics: update,
//! Jacobian loading, and reaction recovery.

use mech_types::Result;
use nalgebra::{DVector, Vector3};

use crate::descriptor::SystemDescriptor;
use crate::row::{clamp_correction, ConstraintRow};
use crate::world::MechanismWorld;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A force + torque pair, as recovered from solved multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Wrench {
    /// Force component.
    pub force: Vector3<f64>,
    /// Torque component.
    pub torque: Vector3<f64>,
}

impl Wrench {
    /// Create a wrench from force and torque.
    #[must_use]
    pub const fn new(force: Vector3<f64>, torque: Vector3<f64>) -> Self {
        Self { force, torque }
    }

    /// Zero wrench.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            force: Vector3::zeros(),
            torque: Vector3::zeros(),
        }
    }
}

/// The per-step hook set every mechanical connection implements.
///
/// Implementors must be `Send + Sync`: independent connections may be
/// updated in parallel by the driver before the assembly barrier.
pub trait Connection: Send + Sync {
    /// Number of scalar bilateral constraints this connection introduces.
    fn num_bilateral(&self) -> usize {
        self.rows().len()
    }

    /// Whether this connection currently participates in assembly.
    ///
    /// An inactive connection contributes zero rows but is not destroyed.
    fn is_active(&self) -> bool;

    /// Row slot base assigned at the last injection.
    fn row_offset(&self) -> usize;

    /// Store the row slot base (called by the default injection).
    fn set_row_offset(&mut self, offset: usize);

    /// The constraint rows owned by this connection.
    fn rows(&self) -> &[ConstraintRow];

    /// Mutable access to the constraint rows.
    fn rows_mut(&mut self) -> &mut [ConstraintRow];

    /// Recompute all derived geometry and violations from current holder
    /// state. Pure function of current state; no side effects on holders.
    fn update(&mut self, time: f64, world: &MechanismWorld) -> Result<()>;

    /// Register this connection's rows with the global assembly; each row
    /// reserves a slot for its multiplier.
    fn inject_constraints(&mut self, descriptor: &mut SystemDescriptor) {
        if !self.is_active() {
            return;
        }
        let offset = descriptor.register_rows(self.num_bilateral());
        self.set_row_offset(offset);
    }

    /// Fill each row's Jacobian with the partial derivatives of its
    /// violation, evaluated at the frames cached by the last update.
    fn load_constraint_jacobians(&mut self, world: &MechanismWorld) -> Result<()>;

    /// Reset all stabilization right-hand sides.
    fn constraints_bi_reset(&mut self) {
        for row in self.rows_mut() {
            row.reset_rhs();
        }
    }

    /// Load the Baumgarte drift-correction term into each row: the
    /// violation scaled by `factor`, clamped in magnitude to
    /// `recovery_clamp` when `do_clamp` is set.
    fn constraints_bi_load_c(&mut self, factor: f64, recovery_clamp: f64, do_clamp: bool) {
        for row in self.rows_mut() {
            row.load_stabilization(factor, recovery_clamp, do_clamp);
        }
    }

    /// Add `c * Jᵀ * L` into the global residual vector `R`, reading
    /// multiplier estimates from `L` starting at `off_l`.
    fn int_load_residual_cq_l(
        &self,
        off_l: usize,
        residual: &mut DVector<f64>,
        multipliers: &DVector<f64>,
        c: f64,
    ) {
        if !self.is_active() {
            return;
        }
        for (i, row) in self.rows().iter().enumerate() {
            row.scatter_transposed(residual, c * multipliers[off_l + i]);
        }
    }

    /// Write `c` times the (optionally clamped) violation into the
    /// constraint-residual vector `qc` at `off`.
    fn int_load_constraint_c(
        &self,
        off: usize,
        qc: &mut DVector<f64>,
        c: f64,
        do_clamp: bool,
        recovery_clamp: f64,
    ) {
        if !self.is_active() {
            return;
        }
        for (i, row) in self.rows().iter().enumerate() {
            if row.is_active() {
                qc[off + i] += clamp_correction(c * row.violation(), recovery_clamp, do_clamp);
            }
        }
    }

    /// Copy multiplier and rhs state from the integrator's flat vectors
    /// into the rows (no computation).
    fn int_to_descriptor(&mut self, off_l: usize, multipliers: &DVector<f64>, qc: &DVector<f64>) {
        if !self.is_active() {
            return;
        }
        for (i, row) in self.rows_mut().iter_mut().enumerate() {
            row.set_multiplier(multipliers[off_l + i]);
            row.set_rhs(qc[off_l + i]);
        }
    }

    /// Copy solved multipliers from the rows back into the integrator's
    /// flat vector (no computation).
    fn int_from_descriptor(&self, off_l: usize, multipliers: &mut DVector<f64>) {
        if !self.is_active() {
            return;
        }
        for (i, row) in self.rows().iter().enumerate() {
            multipliers[off_l + i] = row.multiplier();
        }
    }

    /// Write the cached reaction state into the integrator's multiplier
    /// vector.
    fn int_state_gather_reactions(&self, off_l: usize, multipliers: &mut DVector<f64>) {
        self.int_from_descriptor(off_l, multipliers);
    }

    /// Read reaction state back from the integrator's multiplier vector.
    fn int_state_scatter_reactions(&mut self, off_l: usize, multipliers: &DVector<f64>) {
        if !self.is_active() {
            return;
        }
        for (i, row) in self.rows_mut().iter_mut().enumerate() {
            row.set_multiplier(multipliers[off_l + i]);
        }
    }

    /// Scale the solved multipliers by `factor` and cache them as this
    /// connection's physical reaction state, ready for reaction queries.
    fn constraints_fetch_react(&mut self, factor: f64);
}
