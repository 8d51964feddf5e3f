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

//! Backward pass of declarative nodes by the implicit function theorem.
//!
//! Let ``H`` be the Hessian of the objective with respect to ``y`` and ``B``
//! the mixed second derivative with respect to ``y`` and ``x``. For an
//! unconstrained node the Jacobian of the solution is ``Dy = -H^(-1) B``, so
//! the vector-Jacobian product with an upstream gradient ``v`` becomes
//! ``-w^T B`` with ``w = H^(-1) v``. The product ``w^T B`` is never formed as
//! a tensor but obtained from [`DeclarativeNode::objective_cross_vjp`].
//!
//! ``H`` of the normalized cuts objective is singular along ``y`` (the
//! objective is scale invariant) and in general indefinite, hence it is
//! inverted through its eigendecomposition with small eigenvalues dropped.

use log::{debug, trace};
use ndarray::{Array1, Array2, Array3, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::{DeclarativeNode, EqConstDeclarativeNode, GradientError};
use crate::linalg::eigen::{symmetric_eigen, EigenConfig, SymmetricEigen};

/// Settings of the implicit backward pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImplicitDifferentiator {
    /// Damping added to the diagonal of the Hessian
    pub gamma: f64,
    /// Eigenvalues below ``rcond * max |lambda|`` are treated as zero
    pub rcond: f64,
    /// Stopping criteria of the eigensolver
    pub eigen: EigenConfig,
}

impl Default for ImplicitDifferentiator {
    fn default() -> Self {
        ImplicitDifferentiator {
            gamma: 0.0,
            rcond: 1e-10,
            eigen: EigenConfig::default(),
        }
    }
}

/// Moore-Penrose inverse of a symmetric matrix given by its eigenpairs.
#[derive(Debug)]
struct PseudoInverse {
    eigen: SymmetricEigen,
    cutoff: f64,
}

impl PseudoInverse {
    fn new(eigen: SymmetricEigen, rcond: f64) -> PseudoInverse {
        let largest = eigen
            .eigenvalues
            .iter()
            .filter(|x| x.is_finite())
            .fold(0.0f64, |acc, x| acc.max(x.abs()));
        let cutoff = rcond * largest;
        trace!(
            "Pseudo-inverse keeps {} of {} eigenvalues",
            eigen
                .eigenvalues
                .iter()
                .filter(|x| x.abs() > cutoff)
                .count(),
            eigen.len()
        );
        PseudoInverse { eigen, cutoff }
    }

    /// Returns ``H^+ rhs``.
    fn apply(&self, rhs: ArrayView1<f64>) -> Array1<f64> {
        let mut out = Array1::<f64>::zeros(rhs.len());
        for (idx, &lambda) in self.eigen.eigenvalues.iter().enumerate() {
            if !lambda.is_finite() || lambda.abs() <= self.cutoff {
                continue;
            }
            let u = self.eigen.eigenvector(idx);
            let coeff = u.dot(&rhs) / lambda;
            out.scaled_add(coeff, &u);
        }
        out
    }
}

fn check_shapes(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    v: ArrayView1<f64>,
) -> Result<(), GradientError> {
    let n = y.len();
    if x.nrows() != n || x.ncols() != n || v.len() != n {
        return Err(GradientError::Shape {
            expected: vec![n, n, n],
            got: vec![x.nrows(), x.ncols(), v.len()],
        });
    }
    Ok(())
}

impl ImplicitDifferentiator {
    pub fn new(gamma: f64) -> ImplicitDifferentiator {
        ImplicitDifferentiator {
            gamma,
            ..Default::default()
        }
    }

    fn damped_inverse<N: DeclarativeNode + ?Sized>(
        &self,
        node: &N,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
    ) -> Result<PseudoInverse, GradientError> {
        let mut hess = node.objective_hess_y(x, y);
        hess.diag_mut().mapv_inplace(|h| h + self.gamma);
        let eigen = symmetric_eigen(&hess, &self.eigen)?;
        Ok(PseudoInverse::new(eigen, self.rcond))
    }

    /// Computes ``v^T Dy(x)`` for an unconstrained node at the solution ``y``.
    pub fn backward<N: DeclarativeNode + ?Sized>(
        &self,
        node: &N,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Result<Array2<f64>, GradientError> {
        check_shapes(x, y, v)?;
        let inv = self.damped_inverse(node, x, y)?;
        let w = inv.apply(v);
        Ok(-node.objective_cross_vjp(x, y, w.view()))
    }

    /// Computes ``v^T Dy(x)`` for a node with one equality constraint that is
    /// linear in ``y``.
    ///
    /// With ``a = dh/dy``, ``C = dh/dx`` and the Lagrange multiplier
    /// ``nu = (df/dy . a) / (a . a)`` the gradient is
    /// ``(v . q / s) (q^T B - C) - w^T B`` where ``q = H^+ a``, ``s = a . q``,
    /// ``w = H^+ v`` and ``u^T B`` is the cross term of ``f - nu h``.
    pub fn backward_constrained<N: EqConstDeclarativeNode + ?Sized>(
        &self,
        node: &N,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        v: ArrayView1<f64>,
    ) -> Result<Array2<f64>, GradientError> {
        check_shapes(x, y, v)?;

        let a = node.constraint_grad_y(x, y);
        let aa = a.dot(&a);
        if !(aa > 0.0) {
            return Err(GradientError::DegenerateConstraint { value: aa });
        }
        let nu = node.objective_grad_y(x, y).dot(&a) / aa;
        trace!("Lagrange multiplier of the balance constraint: {:e}", nu);

        let inv = self.damped_inverse(node, x, y)?;
        let w = inv.apply(v);
        let q = inv.apply(a.view());
        let s = a.dot(&q);
        if !(s.abs() > f64::EPSILON * aa) {
            return Err(GradientError::DegenerateConstraint { value: s });
        }

        let cross = |u: ArrayView1<f64>| {
            node.objective_cross_vjp(x, y, u) - node.constraint_cross_vjp(x, y, u) * nu
        };
        let c = node.constraint_grad_x(x, y);

        let mut grad = (cross(q.view()) - c) * (v.dot(&q) / s);
        grad -= &cross(w.view());
        Ok(grad)
    }

    /// Applies [`ImplicitDifferentiator::backward`] to every element of a batch.
    ///
    /// ``x`` has shape (batch, n, n), while ``y`` and ``v`` have shape
    /// (batch, height, width) with ``height * width == n``.
    pub fn backward_batch<N: DeclarativeNode + ?Sized>(
        &self,
        node: &N,
        x: &Array3<f64>,
        y: &Array3<f64>,
        v: &Array3<f64>,
    ) -> Result<Array3<f64>, GradientError> {
        self.batched(x, y, v, |x, y, v| self.backward(node, x, y, v))
    }

    /// Applies [`ImplicitDifferentiator::backward_constrained`] to every element of a batch.
    pub fn backward_constrained_batch<N: EqConstDeclarativeNode + ?Sized>(
        &self,
        node: &N,
        x: &Array3<f64>,
        y: &Array3<f64>,
        v: &Array3<f64>,
    ) -> Result<Array3<f64>, GradientError> {
        self.batched(x, y, v, |x, y, v| self.backward_constrained(node, x, y, v))
    }

    fn batched<F>(
        &self,
        x: &Array3<f64>,
        y: &Array3<f64>,
        v: &Array3<f64>,
        backward: F,
    ) -> Result<Array3<f64>, GradientError>
    where
        F: Fn(ArrayView2<f64>, ArrayView1<f64>, ArrayView1<f64>) -> Result<Array2<f64>, GradientError>,
    {
        let (batch, n, cols) = x.dim();
        if y.dim() != v.dim()
            || y.len_of(Axis(0)) != batch
            || y.len_of(Axis(1)) * y.len_of(Axis(2)) != n
            || cols != n
        {
            return Err(GradientError::Shape {
                expected: vec![batch, n, cols],
                got: y.shape().to_vec(),
            });
        }
        debug!("Implicit backward pass over {} samples of size {}", batch, n);

        let mut grad = Array3::<f64>::zeros((batch, n, n));
        for (idx, ((xb, yb), vb)) in x
            .outer_iter()
            .zip(y.outer_iter())
            .zip(v.outer_iter())
            .enumerate()
        {
            let y_flat = Array1::from_iter(yb.iter().copied());
            let v_flat = Array1::from_iter(vb.iter().copied());
            let g = backward(xb, y_flat.view(), v_flat.view())?;
            grad.index_axis_mut(Axis(0), idx).assign(&g);
        }
        Ok(grad)
    }
}
