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

/// Implicit differentiation of the normalized cuts node.
///
/// The solution of the relaxed cut is an eigenvector of the normalized
/// Laplacian. After rescaling it with ``D^(-1/2)`` it is a stationary point
/// of the Rayleigh quotient on the balance constraint, which is the point at
/// which the implicit gradients are checked.
#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::{Array, Array1, Array2, Array3, Axis};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    use normcut::affinity::{compute_affinity, ImageBatch};
    use normcut::declarative::{
        DeclarativeNode, EqConstDeclarativeNode, GradientError, ImplicitDifferentiator,
    };
    use normcut::ncut::NormalizedCuts;

    const STEP: f64 = 1e-6;

    fn weighted_chain(n: usize) -> Array2<f64> {
        let weights = Array::random(n, Uniform::new(0.5, 1.5));
        Array2::from_shape_fn((n, n), |(i, j)| match i.abs_diff(j) {
            0 => 1.0,
            1 => weights[i.min(j)],
            2 => 0.2,
            _ => 0.0,
        })
    }

    /// Returns the stationary point ``D^(-1/2) z`` of the solved node.
    fn stationary_point(node: &NormalizedCuts, x: &Array2<f64>) -> Array1<f64> {
        let z = DeclarativeNode::solve(node, x.view()).unwrap();
        let d = node.constraint_grad_y(x.view(), z.view());
        &z / &d.mapv(f64::sqrt)
    }

    #[test]
    pub fn test_optimality_conditions() {
        let node = NormalizedCuts::default();
        let x = weighted_chain(9);
        let y = stationary_point(&node, &x);

        let fy = node.objective_grad_y(x.view(), y.view());
        let a = node.constraint_grad_y(x.view(), y.view());
        assert_relative_eq!(fy, Array1::zeros(9), epsilon = 1e-9);
        assert_relative_eq!(
            EqConstDeclarativeNode::equality_constraint(&node, x.view(), y.view()),
            0.0,
            epsilon = 1e-9
        );
        assert!(a.iter().all(|&d| d > 0.0));

        // the Hessian annihilates the solution direction
        let hess = node.objective_hess_y(x.view(), y.view());
        assert_relative_eq!(hess.dot(&y), Array1::zeros(9), epsilon = 1e-9);
    }

    #[test]
    pub fn test_objective_grad_x_at_solution() {
        let node = NormalizedCuts::default();
        let x = weighted_chain(9);
        let y = stationary_point(&node, &x);

        let grad = node.objective_grad_x(x.view(), y.view());
        for ((i, j), &g) in grad.indexed_iter() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[[i, j]] += STEP;
            minus[[i, j]] -= STEP;
            let fd = (DeclarativeNode::objective(&node, plus.view(), y.view())
                - DeclarativeNode::objective(&node, minus.view(), y.view()))
                / (2.0 * STEP);
            assert_relative_eq!(g, fd, epsilon = 1e-6, max_relative = 1e-5);
        }
    }

    #[test]
    pub fn test_backward_is_linear() {
        let node = NormalizedCuts::default();
        let x = weighted_chain(9);
        let y = stationary_point(&node, &x);
        let diff = node.differentiator();

        let v1 = Array::random(9, Uniform::new(-1.0, 1.0));
        let v2 = Array::random(9, Uniform::new(-1.0, 1.0));
        let sum = &v1 + &v2;

        let g1 = diff
            .backward_constrained(&node, x.view(), y.view(), v1.view())
            .unwrap();
        let g2 = diff
            .backward_constrained(&node, x.view(), y.view(), v2.view())
            .unwrap();
        let g = diff
            .backward_constrained(&node, x.view(), y.view(), sum.view())
            .unwrap();
        assert_relative_eq!(g, g1 + g2, epsilon = 1e-8, max_relative = 1e-6);

        let u = diff.backward(&node, x.view(), y.view(), v1.view()).unwrap();
        assert!(u.iter().all(|x| x.is_finite()));
    }

    #[test]
    pub fn test_backward_matches_finite_differences() {
        let node = NormalizedCuts::default();
        let x = weighted_chain(9);
        let y = stationary_point(&node, &x);
        let diff = node.differentiator();

        // the scale of the solution is not determined by the objective, so
        // only upstream gradients orthogonal to it are compared
        let v = Array::random(9, Uniform::new(-1.0, 1.0));
        let v = &v - &(&y * (v.dot(&y) / y.dot(&y)));

        let constrained = diff
            .backward_constrained(&node, x.view(), y.view(), v.view())
            .unwrap();
        let unconstrained = diff.backward(&node, x.view(), y.view(), v.view()).unwrap();

        // eigenvectors carry an arbitrary sign, which is aligned to y
        let aligned = |x: &Array2<f64>| {
            let other = stationary_point(&node, x);
            if other.dot(&y) < 0.0 {
                -other
            } else {
                other
            }
        };
        for i in 0..9 {
            for j in i..9 {
                let mut plus = x.clone();
                let mut minus = x.clone();
                plus[[i, j]] += STEP;
                minus[[i, j]] -= STEP;
                if i != j {
                    plus[[j, i]] += STEP;
                    minus[[j, i]] -= STEP;
                }
                let fd = v.dot(&(aligned(&plus) - aligned(&minus))) / (2.0 * STEP);

                for grad in [&constrained, &unconstrained] {
                    let expected = if i == j {
                        grad[[i, i]]
                    } else {
                        grad[[i, j]] + grad[[j, i]]
                    };
                    assert_relative_eq!(expected, fd, epsilon = 1e-6, max_relative = 1e-4);
                }
            }
        }
    }

    #[test]
    pub fn test_value_gradient_matches_finite_differences() {
        // the objective value at the solution is the Fiedler eigenvalue; by
        // the envelope theorem its total derivative is the partial derivative
        // of the Lagrangian with respect to x
        let node = NormalizedCuts::default();
        let x = weighted_chain(9);
        let y = stationary_point(&node, &x);

        let fx = node.objective_grad_x(x.view(), y.view());
        let cx = node.constraint_grad_x(x.view(), y.view());
        let a = node.constraint_grad_y(x.view(), y.view());
        let nu = node.objective_grad_y(x.view(), y.view()).dot(&a) / a.dot(&a);
        let grad = fx - cx * nu;

        let value = |x: &Array2<f64>| {
            let y = stationary_point(&node, x);
            DeclarativeNode::objective(&node, x.view(), y.view())
        };
        // the solver expects symmetric input, so entries are perturbed in pairs
        for i in 0..9 {
            for j in i..9 {
                let mut plus = x.clone();
                let mut minus = x.clone();
                plus[[i, j]] += STEP;
                minus[[i, j]] -= STEP;
                let expected = if i == j {
                    grad[[i, i]]
                } else {
                    plus[[j, i]] += STEP;
                    minus[[j, i]] -= STEP;
                    grad[[i, j]] + grad[[j, i]]
                };
                let fd = (value(&plus) - value(&minus)) / (2.0 * STEP);
                assert_relative_eq!(expected, fd, epsilon = 1e-5, max_relative = 1e-4);
            }
        }
    }

    #[test]
    pub fn test_batch_backward() {
        let image = ImageBatch::new(Array3::from_shape_fn((2, 3, 3), |(b, i, _)| {
            if b == 0 {
                0.0
            } else {
                i as f64
            }
        }))
        .unwrap();
        let affinity = compute_affinity(&image, 1, true).unwrap();
        let node = NormalizedCuts::default().with_gamma(1e-4);
        let partition = node.solve(&affinity).unwrap();
        let upstream = Array3::from_elem((2, 3, 3), 0.5);

        let grad = node
            .differentiator()
            .backward_batch(&node, &affinity.to_dense(), &partition.vectors, &upstream)
            .unwrap();
        assert_eq!(grad.shape(), &[2, 9, 9]);
        assert!(grad.iter().all(|x| x.is_finite()));

        let dense = affinity.to_dense();
        let single = node
            .differentiator()
            .backward(
                &node,
                dense.index_axis(Axis(0), 1),
                partition.flat(1).view(),
                Array1::from_elem(9, 0.5).view(),
            )
            .unwrap();
        assert_relative_eq!(grad.index_axis(Axis(0), 1), single, epsilon = 1e-12);
    }

    #[test]
    pub fn test_batch_shape_mismatch() {
        let node = NormalizedCuts::default();
        let x = Array3::<f64>::zeros((1, 4, 4));
        let y = Array3::<f64>::zeros((1, 3, 3));

        assert!(matches!(
            ImplicitDifferentiator::default().backward_batch(&node, &x, &y, &y),
            Err(GradientError::Shape { .. })
        ));
    }
}
