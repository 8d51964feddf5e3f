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

//! Declarative nodes and their implicit differentiation.
//!
//! A declarative node defines its output as the solution of an optimization
//! problem ``y(x) = argmin_u f(x, u)``, optionally subject to an equality
//! constraint ``h(x, u) = 0``. Instead of differentiating through the solver,
//! gradients are obtained from the optimality conditions at the solution,
//! which only requires first and second order derivatives of ``f`` and ``h``.
//!
//! Inputs ``x`` are matrices and outputs ``y`` are vectors of a single sample.

pub mod implicit;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use thiserror::Error;

use crate::linalg::eigen::EigenError;
use crate::ncut::SolveError;

pub use implicit::ImplicitDifferentiator;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum GradientError {
    #[error(transparent)]
    Solve(#[from] SolveError),
    #[error(transparent)]
    Eigen(#[from] EigenError),
    #[error("Constraint is degenerate at the solution (a^T H^+ a = {value:e})")]
    DegenerateConstraint { value: f64 },
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    Shape {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

/// Unconstrained declarative node ``y(x) = argmin_u f(x, u)``.
pub trait DeclarativeNode {
    /// Computes the optimal ``y`` for input ``x``.
    fn solve(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, SolveError>;

    fn objective(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64;

    /// Gradient of the objective with respect to ``y``.
    fn objective_grad_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64>;

    /// Gradient of the objective with respect to every entry of ``x``.
    fn objective_grad_x(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64>;

    /// Hessian of the objective with respect to ``y``.
    fn objective_hess_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64>;

    /// Contracts the mixed second derivative with ``u``:
    /// ``sum_k u_k d^2 f / (dy_k dx_ij)``.
    fn objective_cross_vjp(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        u: ArrayView1<f64>,
    ) -> Array2<f64>;
}

/// Declarative node with a single equality constraint ``h(x, y) = 0`` that is
/// linear in ``y``.
pub trait EqConstDeclarativeNode: DeclarativeNode {
    fn equality_constraint(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64;

    fn constraint_grad_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64>;

    fn constraint_grad_x(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64>;

    fn constraint_cross_vjp(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        u: ArrayView1<f64>,
    ) -> Array2<f64>;
}
