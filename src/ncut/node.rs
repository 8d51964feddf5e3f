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

//! Normalized cuts as an equality constrained declarative node

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::objective;
use super::solver::NormalizedCuts;
use super::SolveError;
use crate::declarative::{DeclarativeNode, EqConstDeclarativeNode};

impl DeclarativeNode for NormalizedCuts {
    fn solve(&self, x: ArrayView2<f64>) -> Result<Array1<f64>, SolveError> {
        self.solve_sample(x)
    }

    fn objective(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        objective::sample_objective(x, y)
    }

    fn objective_grad_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        objective::objective_grad_y(x, y)
    }

    fn objective_grad_x(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        objective::objective_grad_x(x, y)
    }

    fn objective_hess_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        objective::objective_hess_y(x, y)
    }

    fn objective_cross_vjp(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        u: ArrayView1<f64>,
    ) -> Array2<f64> {
        objective::objective_cross_vjp(x, y, u)
    }
}

impl EqConstDeclarativeNode for NormalizedCuts {
    fn equality_constraint(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> f64 {
        objective::sample_constraint(x, y)
    }

    fn constraint_grad_y(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array1<f64> {
        objective::constraint_grad_y(x, y)
    }

    fn constraint_grad_x(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Array2<f64> {
        objective::constraint_grad_x(x, y)
    }

    fn constraint_cross_vjp(
        &self,
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        u: ArrayView1<f64>,
    ) -> Array2<f64> {
        objective::constraint_cross_vjp(x, y, u)
    }
}
