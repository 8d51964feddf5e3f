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

//! Spectral relaxation of the normalized cut.
//!
//! For every affinity matrix of a batch the solver forms the symmetrically
//! normalized Laplacian ``D^(-1/2) (D - A) D^(-1/2)``, computes its
//! eigendecomposition, and returns the eigenvector of the second smallest
//! eigenvalue (the Fiedler vector) reshaped to the image grid.
//!
//! The sign of the returned vectors is not normalized.

use std::fmt;

use log::debug;
use ndarray::{Array1, Array3, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::monitor::{NoOpVis, SolveVisitor};
use super::objective;
use super::SolveError;
use crate::affinity::Affinity;
use crate::declarative::ImplicitDifferentiator;
use crate::linalg::eigen::{symmetric_eigen, EigenConfig, SymmetricEigen};
use crate::linalg::laplacian::{degree, normalized_laplacian, DegreeGuard, LaplacianError};
use crate::linalg::vis::write_partition;

/// Configuration of the normalized cuts node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCuts {
    /// Treatment of pixels without any affinity
    pub guard: DegreeGuard,
    /// Stopping criteria of the eigensolver
    pub eigen: EigenConfig,
    /// Tikhonov damping added to the Hessian during backpropagation
    pub gamma: f64,
}

impl Default for NormalizedCuts {
    fn default() -> Self {
        NormalizedCuts {
            guard: DegreeGuard::default(),
            eigen: EigenConfig::default(),
            gamma: 0.0,
        }
    }
}

/// Solution of a batch: one partition vector per image.
#[derive(Clone, Debug, PartialEq)]
pub struct Partition {
    /// Partition vectors of shape (batch, side, side)
    pub vectors: Array3<f64>,
    /// Second smallest eigenvalue of each normalized Laplacian
    pub eigenvalues: Array1<f64>,
}

impl Partition {
    #[inline]
    pub fn batch_size(&self) -> usize {
        self.vectors.len_of(Axis(0))
    }

    #[inline]
    pub fn side(&self) -> usize {
        self.vectors.len_of(Axis(1))
    }

    pub fn get(&self, idx: usize) -> ArrayView2<f64> {
        self.vectors.index_axis(Axis(0), idx)
    }

    /// Returns the partition vector of element ``idx`` in row-major order.
    pub fn flat(&self, idx: usize) -> Array1<f64> {
        Array1::from_iter(self.get(idx).iter().copied())
    }

    pub fn into_inner(self) -> Array3<f64> {
        self.vectors
    }

    /// Rescales every partition vector ``z`` to ``D^(-1/2) z``.
    ///
    /// The solver returns unit eigenvectors of the normalized Laplacian,
    /// which are not stationary points of ``y^T L y / y^T D y``. The rescaled
    /// vectors are, and the implicit backward pass is exact only there.
    /// Zero degrees yield non-finite entries.
    pub fn stationary_points(&self, affinity: &Affinity) -> Result<Array3<f64>, SolveError> {
        let dense = affinity.to_dense();
        let flat = objective::flatten_partition(&dense, &self.vectors)?;
        let side = self.side();

        let mut points = Array3::<f64>::zeros(self.vectors.raw_dim());
        for ((mut out, a), z) in points
            .outer_iter_mut()
            .zip(dense.outer_iter())
            .zip(flat.outer_iter())
        {
            let scaled = &z / &degree(&a).mapv(f64::sqrt);
            for (k, &x) in scaled.iter().enumerate() {
                out[[k / side, k % side]] = x;
            }
        }
        Ok(points)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, vector) in self.vectors.outer_iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "sample {} (eigenvalue {:.6})", idx, self.eigenvalues[idx])?;
            write_partition(f, &vector)?;
        }
        Ok(())
    }
}

/// Returns the side of the square grid holding ``n`` pixels.
pub(crate) fn grid_side(n: usize) -> Result<usize, SolveError> {
    if n < 2 {
        return Err(SolveError::TooSmall { n });
    }
    let side = (n as f64).sqrt().floor() as usize;
    // correct rounding errors of the floating point root
    let side = (side.saturating_sub(1)..=side + 1)
        .filter(|s| s * s <= n)
        .max()
        .unwrap_or(side);
    if side * side != n {
        return Err(SolveError::NotSquare { n });
    }
    Ok(side)
}

impl NormalizedCuts {
    pub fn new(guard: DegreeGuard) -> NormalizedCuts {
        NormalizedCuts {
            guard,
            ..Default::default()
        }
    }

    pub fn with_eigen(mut self, eigen: EigenConfig) -> NormalizedCuts {
        self.eigen = eigen;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> NormalizedCuts {
        self.gamma = gamma;
        self
    }

    /// Returns a differentiator that uses the damping of this node.
    pub fn differentiator(&self) -> ImplicitDifferentiator {
        ImplicitDifferentiator {
            gamma: self.gamma,
            eigen: self.eigen,
            ..Default::default()
        }
    }

    /// Computes the relaxed normalized cut of every affinity in the batch.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use normcut::affinity::{compute_affinity, ImageBatch};
    /// use normcut::ncut::NormalizedCuts;
    /// use ndarray::Array2;
    ///
    /// // a constant image with radius 1 is a chain of pixels
    /// let image = ImageBatch::single(Array2::zeros((2, 2))).unwrap();
    /// let affinity = compute_affinity(&image, 1, false).unwrap();
    /// let partition = NormalizedCuts::default().solve(&affinity).unwrap();
    ///
    /// let y = partition.get(0);
    /// assert!(y[[0, 0]] * y[[1, 1]] < 0.0);
    /// ```
    pub fn solve(&self, affinity: &Affinity) -> Result<Partition, SolveError> {
        self.solve_with(affinity, &mut NoOpVis {})
    }

    /// Same as [`NormalizedCuts::solve`], reporting progress to ``visitor``.
    pub fn solve_with<V: SolveVisitor>(
        &self,
        affinity: &Affinity,
        visitor: &mut V,
    ) -> Result<Partition, SolveError> {
        affinity.validate()?;
        let (batch, n) = (affinity.batch_size(), affinity.n());
        let side = grid_side(n)?;
        let dense = affinity.to_dense();

        debug!(
            "Solving normalized cuts for {} samples of {} pixels ({:?})",
            batch, n, self.guard
        );
        visitor.start_solve(batch, n);

        let mut vectors = Array3::<f64>::zeros((batch, side, side));
        let mut eigenvalues = Array1::<f64>::zeros(batch);
        for (idx, a) in dense.outer_iter().enumerate() {
            visitor.start_sample(idx);
            let eigen = self.decompose(a, idx)?;

            let fiedler = eigen.eigenvector(1);
            for (dst, &src) in vectors
                .index_axis_mut(Axis(0), idx)
                .iter_mut()
                .zip(fiedler.iter())
            {
                *dst = src;
            }
            eigenvalues[idx] = eigen.eigenvalues[1];
            visitor.finish_sample(idx, &eigen);
        }

        let partition = Partition {
            vectors,
            eigenvalues,
        };
        visitor.finish_solve(&partition);
        Ok(partition)
    }

    /// Returns all eigenpairs of the normalized Laplacian of every batch element.
    pub fn eigen_decomposition(
        &self,
        affinity: &Affinity,
    ) -> Result<Vec<SymmetricEigen>, SolveError> {
        affinity.validate()?;
        affinity
            .to_dense()
            .outer_iter()
            .enumerate()
            .map(|(idx, a)| self.decompose(a, idx))
            .collect()
    }

    /// Solves a single dense affinity and returns the flattened partition vector.
    pub fn solve_sample(&self, a: ArrayView2<f64>) -> Result<Array1<f64>, SolveError> {
        grid_side(a.nrows())?;
        let eigen = self.decompose(a, 0)?;
        Ok(eigen.eigenvector(1).to_owned())
    }

    /// Evaluates the objective of ``y`` for every batch element.
    pub fn objective(&self, affinity: &Affinity, y: &Array3<f64>) -> Result<Array1<f64>, SolveError> {
        objective::objective(affinity, y)
    }

    /// Evaluates the balance constraint of ``y`` for every batch element.
    pub fn equality_constraint(
        &self,
        affinity: &Affinity,
        y: &Array3<f64>,
    ) -> Result<Array1<f64>, SolveError> {
        objective::equality_constraint(affinity, y)
    }

    fn decompose(&self, a: ArrayView2<f64>, batch: usize) -> Result<SymmetricEigen, SolveError> {
        let lap = normalized_laplacian(&a, self.guard).map_err(|err| match err {
            LaplacianError::ZeroDegree { index, degree } => SolveError::ZeroDegree {
                batch,
                index,
                degree,
            },
            LaplacianError::NotSquare { rows, cols } => SolveError::ShapeMismatch {
                expected: vec![rows, rows],
                got: vec![rows, cols],
            },
        })?;
        symmetric_eigen(&lap, &self.eigen).map_err(|source| SolveError::Eigen { batch, source })
    }
}
