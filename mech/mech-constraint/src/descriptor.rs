//! The solver boundary: row-slot bookkeeping and global assembly.
//!
//! A [`SystemDescriptor`] assigns contiguous multiplier slots to injected
//! connections and collects their rows into one sparse Jacobian plus a
//! stabilization right-hand side. External solvers consume the
//! [`AssembledSystem`] and hand multipliers back in slot order; the built-in
//! [`AssembledSystem::solve_reference`] is a direct dense solve for tests
//! and small systems.

use mech_types::{MechError, Result};
use nalgebra::DVector;
use tracing::debug;

use crate::connection::Connection;
use crate::sparse::{EffectiveMass, InverseMassMatrix, JacobianBuilder, SparseJacobian};

/// Slot bookkeeping for one assembly pass.
///
/// Created fresh each step with the world's current column count; row
/// offsets are only meaningful until the next injection pass.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    num_rows: usize,
    num_cols: usize,
}

impl SystemDescriptor {
    /// Create a descriptor over `num_cols` velocity coordinates.
    #[must_use]
    pub const fn new(num_cols: usize) -> Self {
        Self {
            num_rows: 0,
            num_cols,
        }
    }

    /// Reserve `count` contiguous row slots; returns their base offset.
    pub fn register_rows(&mut self, count: usize) -> usize {
        let base = self.num_rows;
        self.num_rows += count;
        base
    }

    /// Total constraint rows registered so far.
    #[must_use]
    pub const fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of velocity coordinates.
    #[must_use]
    pub const fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Collect all active rows into one sparse Jacobian and rhs vector.
    ///
    /// Each connection's rows land at the offset assigned during injection;
    /// connections must have been injected into *this* descriptor, and their
    /// Jacobians loaded, before assembly.
    pub fn assemble(&self, connections: &[&dyn Connection]) -> Result<AssembledSystem> {
        let mut builder = JacobianBuilder::new(self.num_rows, self.num_cols);
        let mut rhs = DVector::zeros(self.num_rows);

        for conn in connections {
            if !conn.is_active() {
                continue;
            }
            let base = conn.row_offset();
            if base + conn.num_bilateral() > self.num_rows {
                return Err(MechError::invalid_config(format!(
                    "connection rows {}..{} exceed registered slot count {}",
                    base,
                    base + conn.num_bilateral(),
                    self.num_rows
                )));
            }
            for (i, row) in conn.rows().iter().enumerate() {
                if !row.is_active() {
                    continue;
                }
                for entry in row.jacobian() {
                    builder.add(base + i, entry.col, entry.value);
                }
                rhs[base + i] = row.rhs();
            }
        }

        let jacobian = builder.build();
        debug!(
            rows = self.num_rows,
            cols = self.num_cols,
            nnz = jacobian.nnz(),
            "assembled constraint system"
        );

        Ok(AssembledSystem { jacobian, rhs })
    }
}

/// The assembled constraint problem: `J v + b = 0` at the velocity level.
#[derive(Debug, Clone)]
pub struct AssembledSystem {
    /// Global constraint Jacobian.
    pub jacobian: SparseJacobian,
    /// Stabilization right-hand side `b` (one entry per row slot).
    pub rhs: DVector<f64>,
}

impl AssembledSystem {
    /// Residual `J v + b` at the given velocities.
    #[must_use]
    pub fn residual(&self, velocities: &DVector<f64>) -> DVector<f64> {
        self.jacobian.mul_vec(velocities) + &self.rhs
    }

    /// Direct reference solve for the impulse multipliers.
    ///
    /// Builds the Schur complement `A = J M⁻¹ Jᵀ + reg I` and solves
    /// `A λ = -(J v + b)`. Applying `dv = M⁻¹ Jᵀ λ` then drives the
    /// velocity-level residual to zero (up to regularization).
    #[must_use]
    pub fn solve_reference(
        &self,
        inv_mass: &InverseMassMatrix,
        velocities: &DVector<f64>,
        regularization: f64,
    ) -> DVector<f64> {
        let eff = EffectiveMass::from_jacobian(&self.jacobian, inv_mass, regularization);
        eff.solve(&(-self.residual(velocities)))
    }

    /// Velocity change produced by a multiplier vector: `M⁻¹ Jᵀ λ`.
    #[must_use]
    pub fn velocity_response(
        &self,
        inv_mass: &InverseMassMatrix,
        multipliers: &DVector<f64>,
    ) -> DVector<f64> {
        inv_mass.mul_vec(&self.jacobian.mul_transpose_vec(multipliers))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::row::ConstraintRow;
    use crate::sparse::InvMassBlock;
    use crate::world::MechanismWorld;
    use approx::assert_relative_eq;

    struct Rows {
        rows: Vec<ConstraintRow>,
        offset: usize,
    }

    impl Connection for Rows {
        fn is_active(&self) -> bool {
            true
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
        fn update(&mut self, _time: f64, _world: &MechanismWorld) -> mech_types::Result<()> {
            Ok(())
        }
        fn load_constraint_jacobians(&mut self, _world: &MechanismWorld) -> mech_types::Result<()> {
            Ok(())
        }
        fn constraints_fetch_react(&mut self, _factor: f64) {}
    }

    fn row(entries: &[(usize, f64)], rhs: f64) -> ConstraintRow {
        let mut r = ConstraintRow::new();
        for &(col, val) in entries {
            r.push_jacobian(col, val);
        }
        r.set_rhs(rhs);
        r
    }

    #[test]
    fn test_slot_assignment_is_contiguous() {
        let mut descriptor = SystemDescriptor::new(10);
        assert_eq!(descriptor.register_rows(3), 0);
        assert_eq!(descriptor.register_rows(1), 3);
        assert_eq!(descriptor.register_rows(4), 4);
        assert_eq!(descriptor.num_rows(), 8);
    }

    #[test]
    fn test_assemble_places_rows_at_offsets() {
        let mut a = Rows {
            rows: vec![row(&[(0, 1.0)], 0.5)],
            offset: 0,
        };
        let mut b = Rows {
            rows: vec![row(&[(1, 2.0)], -0.5)],
            offset: 0,
        };

        let mut descriptor = SystemDescriptor::new(2);
        a.inject_constraints(&mut descriptor);
        b.inject_constraints(&mut descriptor);

        let system = descriptor.assemble(&[&a, &b]).unwrap();
        let dense = system.jacobian.to_dense();
        assert_eq!(dense[(0, 0)], 1.0);
        assert_eq!(dense[(1, 1)], 2.0);
        assert_eq!(system.rhs[0], 0.5);
        assert_eq!(system.rhs[1], -0.5);
    }

    #[test]
    fn test_inactive_rows_leave_empty_slots() {
        let mut inner = row(&[(0, 1.0)], 1.0);
        inner.set_active(false);
        let mut a = Rows {
            rows: vec![inner, row(&[(1, 1.0)], 2.0)],
            offset: 0,
        };

        let mut descriptor = SystemDescriptor::new(2);
        a.inject_constraints(&mut descriptor);

        let system = descriptor.assemble(&[&a]).unwrap();
        assert_eq!(system.jacobian.nnz(), 1);
        assert_eq!(system.rhs[0], 0.0);
        assert_eq!(system.rhs[1], 2.0);
    }

    #[test]
    fn test_reference_solve_zeroes_residual() {
        // One shaft relation row over three unit-inertia shafts with
        // inconsistent speeds.
        let mut a = Rows {
            rows: vec![row(&[(0, -2.0), (1, 1.0), (2, 1.0)], 0.0)],
            offset: 0,
        };
        let mut descriptor = SystemDescriptor::new(3);
        a.inject_constraints(&mut descriptor);
        let system = descriptor.assemble(&[&a]).unwrap();

        let inv_mass = InverseMassMatrix::from_blocks(vec![
            InvMassBlock::Shaft { inv_inertia: 1.0 },
            InvMassBlock::Shaft { inv_inertia: 1.0 },
            InvMassBlock::Shaft { inv_inertia: 1.0 },
        ]);
        let v = DVector::from_vec(vec![1.0, 1.0, 1.0]);
        assert_relative_eq!(system.residual(&v)[0], 0.0, epsilon = 1e-12);

        let v = DVector::from_vec(vec![0.0, 1.0, 1.0]);
        let lambda = system.solve_reference(&inv_mass, &v, 0.0);
        let corrected = &v + system.velocity_response(&inv_mass, &lambda);
        assert_relative_eq!(system.residual(&corrected)[0], 0.0, epsilon = 1e-10);
    }
}
