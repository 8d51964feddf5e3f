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

//! Rayleigh quotient objective and balance constraint of normalized cuts.
//!
//! For an affinity matrix ``A`` with degree vector ``d`` (column sums),
//! ``D = diag(d)`` and ``L = D - A``, the objective is
//! ``f(A, y) = y^T L y / y^T D y`` and the equality constraint is
//! ``h(A, y) = y^T D 1``.
//!
//! Besides the values themselves, this module provides the first and second
//! order derivatives needed to differentiate the solution of the node
//! implicitly. All single sample functions take the dense ``n x n``
//! affinity and the flattened partition vector of length ``n``.

use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis, Zip};

use super::SolveError;
use crate::affinity::Affinity;
use crate::linalg::laplacian::degree;

/// Intermediate products shared by the objective and its derivatives.
struct Rayleigh {
    d: Array1<f64>,
    /// symmetrized ``L y``
    ly: Array1<f64>,
    /// ``D y``
    dy: Array1<f64>,
    /// ``y^T D y``
    m: f64,
    /// objective value
    f: f64,
}

impl Rayleigh {
    fn new(a: ArrayView2<f64>, y: ArrayView1<f64>) -> Rayleigh {
        assert_eq!(
            a.nrows(),
            y.len(),
            "Dimensions mismatch of affinity and partition: {} x {} and {}",
            a.nrows(),
            a.ncols(),
            y.len()
        );
        let d = degree(&a);
        let dy = &d * &y;
        let ay = (a.dot(&y) + a.t().dot(&y)) * 0.5;
        let ly = &dy - &ay;
        let m = y.dot(&dy);
        let f = y.dot(&ly) / m;
        Rayleigh { d, ly, dy, m, f }
    }

    /// Gradient with respect to y: ``(2 / m) (L y - f D y)``
    fn grad_y(&self) -> Array1<f64> {
        (&self.ly - &(&self.dy * self.f)) * (2.0 / self.m)
    }
}

/// Evaluates ``y^T L y / y^T D y`` for a single sample.
pub fn sample_objective(a: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
    Rayleigh::new(a, y).f
}

/// Evaluates ``y^T D 1`` for a single sample.
pub fn sample_constraint(a: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
    assert_eq!(a.nrows(), y.len());
    degree(&a).dot(&y)
}

/// Partial derivative of the objective with respect to y.
pub fn objective_grad_y(a: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
    Rayleigh::new(a, y).grad_y()
}

/// Partial derivative of the objective with respect to every entry of the affinity.
///
/// ``df / dA_ij = ((1 - f) y_j^2 - y_i y_j) / (y^T D y)``
pub fn objective_grad_x(a: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
    let r = Rayleigh::new(a, y);
    grad_x_from(&r, y)
}

fn grad_x_from(r: &Rayleigh, y: ArrayView1<f64>) -> Array2<f64> {
    let n = y.len();
    Array2::from_shape_fn((n, n), |(i, j)| {
        ((1.0 - r.f) * y[j] * y[j] - y[i] * y[j]) / r.m
    })
}

/// Hessian of the objective with respect to y.
///
/// ``H = (2 / m) (L - f D) - (2 / m) (D y g^T + g (D y)^T)`` where ``g`` is the gradient.
pub fn objective_hess_y(a: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
    let r = Rayleigh::new(a, y);
    let g = r.grad_y();
    let n = y.len();
    let scale = 2.0 / r.m;

    let mut hess = Array2::from_shape_fn((n, n), |(i, j)| {
        let lap = if i == j { r.d[i] } else { 0.0 } - 0.5 * (a[[i, j]] + a[[j, i]]);
        let deg = if i == j { r.d[i] } else { 0.0 };
        scale * (lap - r.f * deg)
    });
    Zip::indexed(&mut hess).for_each(|(i, j), h| {
        *h -= scale * (r.dy[i] * g[j] + g[i] * r.dy[j]);
    });
    hess
}

/// Vector-Jacobian product of the mixed second derivative, that is
/// ``sum_k u_k d^2 f / (dy_k dA_ij)`` for every ``(i, j)``.
pub fn objective_cross_vjp(
    a: ArrayView2<f64>,
    y: ArrayView1<f64>,
    u: ArrayView1<f64>,
) -> Array2<f64> {
    let r = Rayleigh::new(a, y);
    let g = r.grad_y();
    let fa = grad_x_from(&r, y);
    let ug = u.dot(&g);
    let udy = u.dot(&r.dy);
    let scale = 2.0 / r.m;
    let n = y.len();

    Array2::from_shape_fn((n, n), |(i, j)| {
        -(y[j] * y[j] / r.m) * ug
            + scale
                * ((1.0 - r.f) * u[j] * y[j] - 0.5 * (u[i] * y[j] + u[j] * y[i])
                    - fa[[i, j]] * udy)
    })
}

/// Partial derivative of the constraint with respect to y, which is the degree vector.
pub fn constraint_grad_y(a: ArrayView2<f64>, _y: ArrayView1<f64>) -> Array1<f64> {
    degree(&a)
}

/// Partial derivative of the constraint with respect to the affinity: ``dh / dA_ij = y_j``.
pub fn constraint_grad_x(a: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
    let n = a.nrows();
    Array2::from_shape_fn((n, n), |(_, j)| y[j])
}

/// ``sum_k u_k d^2 h / (dy_k dA_ij) = u_j``
pub fn constraint_cross_vjp(
    a: ArrayView2<f64>,
    _y: ArrayView1<f64>,
    u: ArrayView1<f64>,
) -> Array2<f64> {
    let n = a.nrows();
    Array2::from_shape_fn((n, n), |(_, j)| u[j])
}

/// Flattens a batch of partitions of shape (batch, height, width) to (batch, n)
/// and checks it against the affinity.
pub(crate) fn flatten_partition(
    dense: &Array3<f64>,
    y: &Array3<f64>,
) -> Result<Array2<f64>, SolveError> {
    let (batch, n, _) = dense.dim();
    let (y_batch, height, width) = y.dim();
    if y_batch != batch || height * width != n {
        return Err(SolveError::ShapeMismatch {
            expected: vec![batch, n],
            got: vec![y_batch, height, width],
        });
    }
    Ok(Array2::from_shape_fn((batch, n), |(b, k)| {
        y[[b, k / width, k % width]]
    }))
}

fn evaluate_batch<F>(affinity: &Affinity, y: &Array3<f64>, eval: F) -> Result<Array1<f64>, SolveError>
where
    F: Fn(ArrayView2<f64>, ArrayView1<f64>) -> f64,
{
    affinity.validate()?;
    let dense = affinity.to_dense();
    let flat = flatten_partition(&dense, y)?;

    Ok(Array1::from_iter(
        dense
            .outer_iter()
            .zip(flat.axis_iter(Axis(0)))
            .map(|(a, y)| eval(a, y)),
    ))
}

/// Evaluates the objective ``y^T L y / y^T D y`` for every batch element.
///
/// Banded affinities are expanded first. The partition ``y`` may have any
/// (batch, height, width) shape with ``height * width`` equal to the number of pixels.
pub fn objective(affinity: &Affinity, y: &Array3<f64>) -> Result<Array1<f64>, SolveError> {
    evaluate_batch(affinity, y, sample_objective)
}

/// Evaluates the balance constraint ``y^T D 1`` for every batch element.
pub fn equality_constraint(
    affinity: &Affinity,
    y: &Array3<f64>,
) -> Result<Array1<f64>, SolveError> {
    evaluate_batch(affinity, y, sample_constraint)
}
