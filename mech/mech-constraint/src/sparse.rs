//! Sparse assembly structures for the constraint problem.
//!
//! Constraint Jacobians here are very sparse: each row touches at most two
//! 6-DOF bodies (12 non-zeros) or three 1-DOF shafts (3 non-zeros) out of
//! a potentially large system. The assembled Jacobian is stored in CSR for
//! row-wise iteration and `J * v` products.
//!
//! Unlike a pure rigid-body engine, the velocity coordinate vector mixes
//! block sizes: 6 columns per body followed by 1 column per shaft. The
//! inverse-mass matrix is therefore block diagonal with variable-dimension
//! blocks, and the effective-mass construction maps columns to blocks
//! through an explicit column map instead of assuming `col / 6`.

use nalgebra::{DMatrix, DVector, Matrix3};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Sparse constraint Jacobian in CSR format.
#[derive(Debug, Clone)]
pub struct SparseJacobian {
    /// The sparse matrix in CSR format.
    matrix: CsrMatrix<f64>,
    /// Number of constraint rows.
    num_rows: usize,
    /// Number of velocity coordinates.
    num_cols: usize,
}

impl SparseJacobian {
    /// Build a sparse Jacobian from triplets.
    #[must_use]
    pub fn from_triplets(
        num_rows: usize,
        num_cols: usize,
        triplets: &[(usize, usize, f64)],
    ) -> Self {
        let mut coo = CooMatrix::new(num_rows, num_cols);

        for &(row, col, val) in triplets {
            if val.abs() > 1e-15 {
                coo.push(row, col, val);
            }
        }

        Self {
            matrix: CsrMatrix::from(&coo),
            num_rows,
            num_cols,
        }
    }

    /// Get the number of rows.
    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.num_rows
    }

    /// Get the number of columns.
    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.num_cols
    }

    /// Get the number of non-zero entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    /// Compute `J * v`.
    #[must_use]
    pub fn mul_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.num_rows);

        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            let mut sum = 0.0;
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                sum += val * v[col_idx];
            }
            result[row_idx] = sum;
        }

        result
    }

    /// Compute `Jᵀ * v`.
    #[must_use]
    pub fn mul_transpose_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut result = DVector::zeros(self.num_cols);

        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            let v_row = v[row_idx];
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                result[col_idx] += val * v_row;
            }
        }

        result
    }

    /// Convert to a dense matrix (testing or small systems).
    #[must_use]
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.num_rows, self.num_cols);

        for (row_idx, row) in self.matrix.row_iter().enumerate() {
            for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
                dense[(row_idx, col_idx)] = val;
            }
        }

        dense
    }

    /// Get the underlying CSR matrix.
    #[must_use]
    pub const fn csr(&self) -> &CsrMatrix<f64> {
        &self.matrix
    }
}

/// Builder for sparse Jacobians using triplet accumulation.
#[derive(Debug, Clone)]
pub struct JacobianBuilder {
    triplets: Vec<(usize, usize, f64)>,
    num_rows: usize,
    num_cols: usize,
}

impl JacobianBuilder {
    /// Create a new builder with the given dimensions.
    #[must_use]
    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        // A constraint row touches at most two 6-DOF blocks
        let capacity = num_rows * 12;
        Self {
            triplets: Vec::with_capacity(capacity),
            num_rows,
            num_cols,
        }
    }

    /// Add a single entry.
    pub fn add(&mut self, row: usize, col: usize, value: f64) {
        debug_assert!(row < self.num_rows);
        debug_assert!(col < self.num_cols);
        if value.abs() > 1e-15 {
            self.triplets.push((row, col, value));
        }
    }

    /// Build the sparse Jacobian.
    #[must_use]
    pub fn build(self) -> SparseJacobian {
        SparseJacobian::from_triplets(self.num_rows, self.num_cols, &self.triplets)
    }
}

/// One block of the block-diagonal inverse-mass matrix.
///
/// Bodies contribute a 6x6 block (scalar inverse mass on the linear part,
/// world-frame inverse inertia on the angular part); shafts contribute a
/// single scalar inverse rotational inertia.
#[derive(Debug, Clone, Copy)]
pub enum InvMassBlock {
    /// 6-DOF rigid body block.
    Body {
        /// Inverse mass (0 for static bodies).
        inv_mass: f64,
        /// Inverse inertia tensor in world frame.
        inv_inertia: Matrix3<f64>,
    },
    /// 1-DOF shaft block.
    Shaft {
        /// Inverse rotational inertia (0 for fixed shafts).
        inv_inertia: f64,
    },
}

impl InvMassBlock {
    /// Dimension of this block (6 for bodies, 1 for shafts).
    #[must_use]
    pub const fn dim(&self) -> usize {
        match self {
            Self::Body { .. } => 6,
            Self::Shaft { .. } => 1,
        }
    }

    /// Get element (row, col) of the block.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        match self {
            Self::Body {
                inv_mass,
                inv_inertia,
            } => match (row, col) {
                (r, c) if r < 3 && c < 3 => {
                    if r == c {
                        *inv_mass
                    } else {
                        0.0
                    }
                }
                (r, c) if r >= 3 && c >= 3 => inv_inertia[(r - 3, c - 3)],
                _ => 0.0,
            },
            Self::Shaft { inv_inertia } => {
                debug_assert!(row == 0 && col == 0);
                *inv_inertia
            }
        }
    }
}

/// Block-diagonal inverse-mass matrix over the global velocity layout.
#[derive(Debug, Clone)]
pub struct InverseMassMatrix {
    blocks: Vec<InvMassBlock>,
    /// For each column: (block index, local index within block).
    col_map: Vec<(usize, usize)>,
}

impl InverseMassMatrix {
    /// Build from ordered blocks (must match the velocity column layout).
    #[must_use]
    pub fn from_blocks(blocks: Vec<InvMassBlock>) -> Self {
        let mut col_map = Vec::new();
        for (block_idx, block) in blocks.iter().enumerate() {
            for local in 0..block.dim() {
                col_map.push((block_idx, local));
            }
        }
        Self { blocks, col_map }
    }

    /// Total number of velocity coordinates.
    #[must_use]
    pub fn ncols(&self) -> usize {
        self.col_map.len()
    }

    /// Get element (i, j); zero unless both coordinates share a block.
    #[must_use]
    pub fn element(&self, i: usize, j: usize) -> f64 {
        let (bi, li) = self.col_map[i];
        let (bj, lj) = self.col_map[j];
        if bi != bj {
            return 0.0;
        }
        self.blocks[bi].get(li, lj)
    }

    /// Compute `M⁻¹ * v`.
    #[must_use]
    pub fn mul_vec(&self, v: &DVector<f64>) -> DVector<f64> {
        let n = self.ncols();
        let mut result = DVector::zeros(n);
        let mut col = 0;
        for block in &self.blocks {
            let dim = block.dim();
            for r in 0..dim {
                let mut sum = 0.0;
                for c in 0..dim {
                    sum += block.get(r, c) * v[col + c];
                }
                result[col + r] = sum;
            }
            col += dim;
        }
        result
    }
}

/// Effective-mass matrix `A = J * M⁻¹ * Jᵀ` with diagonal regularization.
///
/// This is the Schur complement handed to a direct solve; built only for
/// the reference bridging path and for tests. Production solvers consume
/// the Jacobian and rhs directly through the descriptor boundary.
#[derive(Debug, Clone)]
pub struct EffectiveMass {
    matrix: DMatrix<f64>,
    size: usize,
}

impl EffectiveMass {
    /// Build `A = J * M⁻¹ * Jᵀ + regularization * I`.
    ///
    /// Exploits the block-diagonal structure of `M⁻¹`: only column pairs
    /// within the same holder block interact.
    #[must_use]
    pub fn from_jacobian(
        jacobian: &SparseJacobian,
        inv_mass: &InverseMassMatrix,
        regularization: f64,
    ) -> Self {
        let size = jacobian.nrows();
        let mut matrix = DMatrix::zeros(size, size);

        for (row_i, row) in jacobian.csr().row_iter().enumerate() {
            for (row_j, row2) in jacobian.csr().row_iter().enumerate().skip(row_i) {
                let mut dot = 0.0;

                for (&col_i, &val_i) in row.col_indices().iter().zip(row.values().iter()) {
                    for (&col_j, &val_j) in row2.col_indices().iter().zip(row2.values().iter()) {
                        let m = inv_mass.element(col_i, col_j);
                        if m != 0.0 {
                            dot += val_i * m * val_j;
                        }
                    }
                }

                matrix[(row_i, row_j)] = dot;
                matrix[(row_j, row_i)] = dot;
            }
        }

        for i in 0..size {
            matrix[(i, i)] += regularization;
        }

        Self { matrix, size }
    }

    /// Solve `A * x = b` by Cholesky, falling back to LU if A is not SPD.
    #[must_use]
    pub fn solve(&self, rhs: &DVector<f64>) -> DVector<f64> {
        self.matrix.clone().cholesky().map_or_else(
            || {
                self.matrix
                    .clone()
                    .lu()
                    .solve(rhs)
                    .unwrap_or_else(|| DVector::zeros(rhs.len()))
            },
            |chol| chol.solve(rhs),
        )
    }

    /// Get the matrix size.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Access the dense matrix (diagnostics).
    #[must_use]
    pub const fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }
}
