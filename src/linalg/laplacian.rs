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

//! Graph Laplacians of affinity matrices

use log::warn;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum LaplacianError {
    #[error("Pixel {index} has non-positive degree {degree}")]
    ZeroDegree { index: usize, degree: f64 },
    #[error("Affinity matrix must be square, got {rows} x {cols}")]
    NotSquare { rows: usize, cols: usize },
}

/// Treatment of pixels whose degree is zero when scaling by ``d^(-1/2)``.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum DegreeGuard {
    /// Zero degrees produce an infinite scale factor. The resulting
    /// non-finite entries are propagated into the normalized Laplacian.
    #[default]
    Unguarded,
    /// Degrees are clamped from below by the given value.
    Epsilon(f64),
    /// Non-positive degrees are rejected with an error.
    Strict,
}

/// Returns the degree vector ``d_j = sum_i a_ij`` (column sums).
pub fn degree<S: Data<Elem = f64>>(affinity: &ArrayBase<S, Ix2>) -> Array1<f64> {
    affinity.sum_axis(Axis(0))
}

/// Returns the row sums ``sum_j a_ij``, which coincide with [`degree`] for
/// symmetric matrices.
pub fn row_degree<S: Data<Elem = f64>>(affinity: &ArrayBase<S, Ix2>) -> Array1<f64> {
    affinity.sum_axis(Axis(1))
}

/// Computes the unnormalized Laplacian ``L = D - A``.
pub fn laplacian<S: Data<Elem = f64>>(affinity: &ArrayBase<S, Ix2>) -> Array2<f64> {
    let mut lap = -affinity.to_owned();
    let d = degree(affinity);
    Zip::from(lap.diag_mut()).and(&d).for_each(|l, &d| *l += d);
    lap
}

/// Computes the scale factors ``d^(-1/2)`` under the given guard.
pub fn inverse_sqrt_degree(
    degree: &Array1<f64>,
    guard: DegreeGuard,
) -> Result<Array1<f64>, LaplacianError> {
    match guard {
        DegreeGuard::Unguarded => {
            let scale = degree.mapv(|d| d.powf(-0.5));
            if let Some(index) = scale.iter().position(|x| !x.is_finite()) {
                warn!(
                    "Degree {} of pixel {} yields a non-finite scale factor",
                    degree[index], index
                );
            }
            Ok(scale)
        }
        DegreeGuard::Epsilon(eps) => Ok(degree.mapv(|d| d.max(eps).powf(-0.5))),
        DegreeGuard::Strict => {
            if let Some((index, &d)) = degree.indexed_iter().find(|(_, &d)| !(d > 0.0)) {
                return Err(LaplacianError::ZeroDegree { index, degree: d });
            }
            Ok(degree.mapv(|d| d.powf(-0.5)))
        }
    }
}

/// Computes the symmetrically normalized Laplacian ``D^(-1/2) (D - A) D^(-1/2)``.
///
/// With [`DegreeGuard::Unguarded`], rows and columns of pixels with zero
/// degree consist of non-finite values.
pub fn normalized_laplacian<S: Data<Elem = f64>>(
    affinity: &ArrayBase<S, Ix2>,
    guard: DegreeGuard,
) -> Result<Array2<f64>, LaplacianError> {
    let (rows, cols) = affinity.dim();
    if rows != cols {
        return Err(LaplacianError::NotSquare { rows, cols });
    }

    let scale = inverse_sqrt_degree(&degree(affinity), guard)?;
    let mut lap = laplacian(affinity);

    for ((i, j), value) in lap.indexed_iter_mut() {
        *value = scale[i] * *value * scale[j];
    }
    Ok(lap)
}
