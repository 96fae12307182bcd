//! Scalar bilateral constraint rows.
//!
//! A [`ConstraintRow`] is one scalar equation `g(x) = 0` tying two or three
//! generalized coordinate holders together. It owns:
//!
//! - a sparse Jacobian row (partial derivatives of the violation with
//!   respect to each participating holder's velocity coordinates),
//! - the cached constraint violation from the last kinematic update,
//! - a stabilization right-hand side (the Baumgarte term),
//! - the Lagrange multiplier written back by the solver.
//!
//! Rows are owned exclusively by their connection and never shared; their
//! numeric content is refreshed every step and is meaningless across steps.

use nalgebra::DVector;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One entry of a sparse Jacobian row: a column in the global velocity
/// coordinate vector and its coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JacobianEntry {
    /// Column index in the global velocity vector.
    pub col: usize,
    /// Partial derivative of the violation with respect to that coordinate.
    pub value: f64,
}

/// Clamp a stabilization term in magnitude.
///
/// Large violations would otherwise inject excessive corrective velocity
/// and destabilize the integration; the clamp trades exactness for
/// stability.
#[must_use]
pub fn clamp_correction(value: f64, recovery_clamp: f64, do_clamp: bool) -> f64 {
    if do_clamp {
        value.clamp(-recovery_clamp, recovery_clamp)
    } else {
        value
    }
}

/// A single scalar bilateral constraint equation.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConstraintRow {
    /// Sparse Jacobian row over the global velocity coordinates.
    jacobian: Vec<JacobianEntry>,

    /// Cached violation `g(x)` from the last kinematic update.
    violation: f64,

    /// Stabilization right-hand side (scaled, optionally clamped violation).
    rhs: f64,

    /// Lagrange multiplier from the last solve (0 if never solved).
    multiplier: f64,

    /// Inactive rows contribute nothing to the assembled problem.
    active: bool,
}

impl Default for ConstraintRow {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintRow {
    /// Create an empty, active row.
    #[must_use]
    pub fn new() -> Self {
        Self {
            jacobian: Vec::new(),
            violation: 0.0,
            rhs: 0.0,
            multiplier: 0.0,
            active: true,
        }
    }

    /// Get the Jacobian entries.
    #[must_use]
    pub fn jacobian(&self) -> &[JacobianEntry] {
        &self.jacobian
    }

    /// Remove all Jacobian entries (start of a reload).
    pub fn clear_jacobian(&mut self) {
        self.jacobian.clear();
    }

    /// Append one Jacobian entry. Near-zero coefficients are skipped.
    pub fn push_jacobian(&mut self, col: usize, value: f64) {
        if value.abs() > 1e-15 {
            self.jacobian.push(JacobianEntry { col, value });
        }
    }

    /// Get the cached violation.
    #[must_use]
    pub fn violation(&self) -> f64 {
        self.violation
    }

    /// Cache the violation computed by the connection's update.
    pub fn set_violation(&mut self, violation: f64) {
        self.violation = violation;
    }

    /// Reset the stabilization right-hand side to zero.
    pub fn reset_rhs(&mut self) {
        self.rhs = 0.0;
    }

    /// Accumulate the Baumgarte stabilization term.
    ///
    /// Adds `factor * violation`, clamped in magnitude to `recovery_clamp`
    /// when `do_clamp` is set.
    pub fn load_stabilization(&mut self, factor: f64, recovery_clamp: f64, do_clamp: bool) {
        if !self.active {
            return;
        }
        self.rhs += clamp_correction(factor * self.violation, recovery_clamp, do_clamp);
    }

    /// Get the stabilization right-hand side.
    #[must_use]
    pub fn rhs(&self) -> f64 {
        self.rhs
    }

    /// Overwrite the right-hand side (integrator marshalling).
    pub fn set_rhs(&mut self, rhs: f64) {
        self.rhs = rhs;
    }

    /// Get the Lagrange multiplier (0 until a solve has written one).
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Write the solved multiplier back into the row.
    pub fn set_multiplier(&mut self, multiplier: f64) {
        self.multiplier = multiplier;
    }

    /// Check whether the row participates in assembly.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Enable or disable the row.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Add `scale * Jᵀ` into a flat residual vector.
    ///
    /// This is how the row's reaction enters the equations of motion:
    /// the caller passes `scale = c * λ`.
    pub fn scatter_transposed(&self, residual: &mut DVector<f64>, scale: f64) {
        if !self.active {
            return;
        }
        for entry in &self.jacobian {
            residual[entry.col] += entry.value * scale;
        }
    }

    /// Compute `J · v` against a flat velocity vector.
    #[must_use]
    pub fn dot_velocity(&self, velocities: &DVector<f64>) -> f64 {
        if !self.active {
            return 0.0;
        }
        self.jacobian
            .iter()
            .map(|e| e.value * velocities[e.col])
            .sum()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stabilization_clamp_boundary() {
        let mut row = ConstraintRow::new();

        // Large violation clamps to the recovery limit
        row.set_violation(10.0);
        row.reset_rhs();
        row.load_stabilization(1.0, 0.1, true);
        assert_relative_eq!(row.rhs(), 0.1, epsilon = 1e-12);

        // Small violation passes through unclamped
        row.set_violation(0.05);
        row.reset_rhs();
        row.load_stabilization(1.0, 0.1, true);
        assert_relative_eq!(row.rhs(), 0.05, epsilon = 1e-12);

        // Clamp disabled: full value even when large
        row.set_violation(10.0);
        row.reset_rhs();
        row.load_stabilization(1.0, 0.1, false);
        assert_relative_eq!(row.rhs(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clamp_is_symmetric() {
        assert_relative_eq!(clamp_correction(-10.0, 0.1, true), -0.1, epsilon = 1e-12);
        assert_relative_eq!(clamp_correction(-0.05, 0.1, true), -0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_scatter_transposed() {
        let mut row = ConstraintRow::new();
        row.push_jacobian(0, 2.0);
        row.push_jacobian(3, -1.0);

        let mut residual = DVector::zeros(5);
        row.scatter_transposed(&mut residual, 3.0);

        assert_relative_eq!(residual[0], 6.0, epsilon = 1e-12);
        assert_relative_eq!(residual[3], -3.0, epsilon = 1e-12);
        assert_relative_eq!(residual[1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_dot_velocity() {
        let mut row = ConstraintRow::new();
        row.push_jacobian(1, -2.0);
        row.push_jacobian(2, 1.0);

        let v = DVector::from_vec(vec![0.0, 1.0, 1.0]);
        assert_relative_eq!(row.dot_velocity(&v), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_inactive_row_contributes_nothing() {
        let mut row = ConstraintRow::new();
        row.push_jacobian(0, 1.0);
        row.set_violation(5.0);
        row.set_active(false);

        let mut residual = DVector::zeros(1);
        row.scatter_transposed(&mut residual, 1.0);
        assert_eq!(residual[0], 0.0);

        row.reset_rhs();
        row.load_stabilization(1.0, 0.1, true);
        assert_eq!(row.rhs(), 0.0);
    }

    #[test]
    fn test_near_zero_jacobian_entries_skipped() {
        let mut row = ConstraintRow::new();
        row.push_jacobian(0, 1e-20);
        row.push_jacobian(1, 1.0);
        assert_eq!(row.jacobian().len(), 1);
    }

    #[test]
    fn test_unset_multiplier_reads_zero() {
        let row = ConstraintRow::new();
        assert_eq!(row.multiplier(), 0.0);
    }

    #[test]
    fn test_default_row_is_active() {
        let mut row = ConstraintRow::default();
        assert!(row.is_active());

        // and participates in assembly like a fresh row
        row.push_jacobian(0, 1.0);
        let mut residual = DVector::zeros(1);
        row.scatter_transposed(&mut residual, 2.0);
        assert_eq!(residual[0], 2.0);
    }
}
