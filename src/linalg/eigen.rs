//   Copyright 2025 normcut developers
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.

//! Eigendecomposition of real symmetric matrices

use float_ord::FloatOrd;
use itertools::Itertools;
use log::{debug, trace};
use nalgebra::DMatrix;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum EigenError {
    #[error("Matrix must be square, got {rows} x {cols}")]
    NotSquare { rows: usize, cols: usize },
    #[error("Eigendecomposition did not converge within {iterations} iterations")]
    NoConvergence { iterations: usize },
}

/// Stopping criteria of the symmetric QR iteration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EigenConfig {
    /// Maximal number of implicit QR steps, zero means unbounded
    pub max_iterations: usize,
    /// An off-diagonal entry is treated as zero once it falls below
    /// ``tolerance`` times the magnitude of its neighbouring diagonal entries
    pub tolerance: f64,
}

impl Default for EigenConfig {
    fn default() -> Self {
        EigenConfig {
            max_iterations: 10_000,
            tolerance: f64::EPSILON,
        }
    }
}

/// Eigenvalues in ascending order with the corresponding eigenvectors stored as columns.
#[derive(Clone, Debug, PartialEq)]
pub struct SymmetricEigen {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<f64>,
    /// Number of rows left out of the decomposition because of non-finite entries
    pub excluded: usize,
}

impl SymmetricEigen {
    #[inline]
    pub fn len(&self) -> usize {
        self.eigenvalues.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.eigenvalues.is_empty()
    }

    /// Returns the eigenvector belonging to the ``idx``-th smallest eigenvalue.
    pub fn eigenvector(&self, idx: usize) -> ArrayView1<f64> {
        self.eigenvectors.column(idx)
    }
}

/// Returns for every row whether it takes part in the decomposition, that is
/// whether its diagonal and all its couplings to other rows with finite
/// diagonal are finite.
fn active_rows<S: Data<Elem = f64>>(matrix: &ArrayBase<S, Ix2>) -> Vec<bool> {
    let finite_diag = matrix.diag().iter().map(|x| x.is_finite()).collect_vec();
    matrix
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| {
            finite_diag[i]
                && row
                    .iter()
                    .zip(finite_diag.iter())
                    .all(|(x, &keep)| !keep || x.is_finite())
        })
        .collect_vec()
}

/// Computes all eigenpairs of the symmetric matrix ``matrix``.
///
/// The decomposition itself is delegated to [`nalgebra::SymmetricEigen`],
/// which reads the lower triangle only; callers must pass symmetric input.
///
/// Rows with a non-finite diagonal entry (and rows coupled to the remaining
/// block by non-finite entries) are cut out before the decomposition.
/// Their eigenvalue is reported as NaN (sorted last) and their eigenvector
/// is the corresponding unit vector, so that isolated non-finite rows do not
/// contaminate the eigenpairs of the remaining finite block.
pub fn symmetric_eigen<S: Data<Elem = f64>>(
    matrix: &ArrayBase<S, Ix2>,
    config: &EigenConfig,
) -> Result<SymmetricEigen, EigenError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(EigenError::NotSquare { rows, cols });
    }
    let n = rows;

    let active = active_rows(matrix);
    let active_idx = (0..n).filter(|&i| active[i]).collect_vec();
    let excluded = n - active_idx.len();
    if excluded > 0 {
        debug!(
            "Excluding {} non-finite rows from the eigendecomposition",
            excluded
        );
    }

    let mut pairs: Vec<(f64, Array1<f64>)> = Vec::with_capacity(n);
    if !active_idx.is_empty() {
        let m = active_idx.len();
        let block = DMatrix::from_fn(m, m, |i, j| matrix[[active_idx[i], active_idx[j]]]);
        let eigen =
            nalgebra::SymmetricEigen::try_new(block, config.tolerance, config.max_iterations)
                .ok_or(EigenError::NoConvergence {
                    iterations: config.max_iterations,
                })?;
        trace!("Eigenvalues of the finite block: {}", eigen.eigenvalues);

        for (k, &value) in eigen.eigenvalues.iter().enumerate() {
            let mut vector = Array1::<f64>::zeros(n);
            for (&row, &x) in active_idx.iter().zip(eigen.eigenvectors.column(k).iter()) {
                vector[row] = x;
            }
            pairs.push((value, vector));
        }
    }
    for row in (0..n).filter(|&i| !active[i]) {
        let mut unit = Array1::<f64>::zeros(n);
        unit[row] = 1.0;
        pairs.push((f64::NAN, unit));
    }
    pairs.sort_by_key(|(value, _)| FloatOrd(*value));

    let mut eigenvalues = Array1::<f64>::zeros(n);
    let mut eigenvectors = Array2::<f64>::zeros((n, n));
    for (col, (value, vector)) in pairs.into_iter().enumerate() {
        eigenvalues[col] = value;
        eigenvectors.column_mut(col).assign(&vector);
    }

    Ok(SymmetricEigen {
        eigenvalues,
        eigenvectors,
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2, Array};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn random_symmetric(n: usize) -> Array2<f64> {
        let m = Array::random((n, n), Uniform::new(-1.0, 1.0));
        &m + &m.t()
    }

    #[test]
    pub fn test_diagonal() {
        let m = Array2::from_diag(&arr1(&[3.0, 1.0, 4.0, 2.0]));
        let eig = symmetric_eigen(&m, &EigenConfig::default()).unwrap();

        assert_relative_eq!(eig.eigenvalues, arr1(&[1.0, 2.0, 3.0, 4.0]), epsilon = 1e-14);
        assert_relative_eq!(eig.eigenvector(0)[1].abs(), 1.0, epsilon = 1e-14);
        assert_eq!(eig.excluded, 0);
    }

    #[test]
    pub fn test_two_by_two() {
        let m = arr2(&[[2.0, 1.0], [1.0, 2.0]]);
        let eig = symmetric_eigen(&m, &EigenConfig::default()).unwrap();

        assert_relative_eq!(eig.eigenvalues, arr1(&[1.0, 3.0]), epsilon = 1e-12);
        let x = eig.eigenvector(0);
        assert_relative_eq!(x[0].abs(), 0.5f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(x[0], -x[1], epsilon = 1e-12);
    }

    #[test]
    pub fn test_reconstruction() {
        let m = random_symmetric(12);
        let eig = symmetric_eigen(&m, &EigenConfig::default()).unwrap();

        let v = &eig.eigenvectors;
        let reconstructed = v.dot(&Array2::from_diag(&eig.eigenvalues)).dot(&v.t());
        assert_relative_eq!(reconstructed, m, epsilon = 1e-10);
        assert_relative_eq!(v.t().dot(v), Array2::eye(12), epsilon = 1e-10);

        for (a, b) in eig.eigenvalues.iter().tuple_windows() {
            assert!(a <= b);
        }
    }

    #[test]
    pub fn test_non_finite_rows() {
        let nan = f64::NAN;
        let m = arr2(&[
            [2.0, nan, 1.0],
            [nan, nan, nan],
            [1.0, nan, 2.0],
        ]);
        let eig = symmetric_eigen(&m, &EigenConfig::default()).unwrap();

        assert_relative_eq!(eig.eigenvalues[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(eig.eigenvalues[1], 3.0, epsilon = 1e-12);
        assert!(eig.eigenvalues[2].is_nan());
        assert!(eig.eigenvectors.iter().all(|x| x.is_finite()));
        assert_eq!(eig.eigenvector(2), arr1(&[0.0, 1.0, 0.0]));
        assert_eq!(eig.eigenvector(0)[1], 0.0);
        assert_eq!(eig.excluded, 1);
    }

    #[test]
    pub fn test_all_rows_excluded() {
        let m = Array2::from_elem((2, 2), f64::INFINITY);
        let eig = symmetric_eigen(&m, &EigenConfig::default()).unwrap();

        assert!(eig.eigenvalues.iter().all(|x| x.is_nan()));
        assert_eq!(eig.eigenvectors, Array2::<f64>::eye(2));
    }

    #[test]
    pub fn test_no_convergence() {
        let m = random_symmetric(16);
        let config = EigenConfig {
            max_iterations: 1,
            tolerance: f64::EPSILON,
        };

        assert_eq!(
            symmetric_eigen(&m, &config),
            Err(EigenError::NoConvergence { iterations: 1 })
        );
    }

    #[test]
    pub fn test_not_square() {
        assert_eq!(
            symmetric_eigen(&Array2::<f64>::zeros((2, 3)), &EigenConfig::default()),
            Err(EigenError::NotSquare { rows: 2, cols: 3 })
        );
    }
}
