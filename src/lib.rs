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

/*!
Normalized cuts as a declarative node.

This crate implements the [normalized cuts](https://en.wikipedia.org/wiki/Segmentation-based_object_categorization#Normalized_cuts)
graph partitioning objective of Shi and Malik as a *declarative node*: a unit whose output is
defined as the solution of an optimization problem rather than by an explicit formula.
Such nodes can be embedded in gradient-trained image segmentation pipelines, because the
gradient of the solution with respect to the input follows from the optimality conditions
alone, without differentiating through the solver.

`normcut` supports the following operations:
 - construct binary pixel affinity matrices from grayscale images, either dense or in a
   compact banded encoding that only stores the super-diagonals
 - solve the spectral relaxation of the normalized cut via the symmetrically normalized Laplacian
 - evaluate the Rayleigh quotient objective and the balance constraint of a partition
 - backpropagate upstream gradients through the solution by implicit differentiation
 - store affinities in `numpy`'s `.npz` format and report solve progress on the console or as csv

# Quick Start
Affinities are computed from a batch of images. Two pixels are neighbours if their distance
in the flattened (row-major) pixel index is at most the radius, and neighbours with identical
intensity are connected.
```rust
use normcut::affinity::{compute_affinity, ImageBatch};
use normcut::ncut::NormalizedCuts;
use ndarray::arr2;

let image = ImageBatch::single(arr2(&[
    [0., 0., 0.],
    [0., 0., 0.],
    [0., 0., 0.],
])).unwrap();
// a banded encoding of shape (batch, radius, pixels)
let affinity = compute_affinity(&image, 1, true).unwrap();

let partition = NormalizedCuts::default().solve(&affinity).unwrap();
assert_eq!(partition.side(), 3);
```

# Backward Pass
[`NormalizedCuts`](crate::ncut::NormalizedCuts) implements the
[`DeclarativeNode`](crate::declarative::DeclarativeNode) and
[`EqConstDeclarativeNode`](crate::declarative::EqConstDeclarativeNode) traits on single samples.
The [`ImplicitDifferentiator`](crate::declarative::ImplicitDifferentiator) combines the analytic
derivatives of the objective and the constraint into vector-Jacobian products.
```rust
use normcut::affinity::{compute_affinity, ImageBatch};
use normcut::ncut::NormalizedCuts;
use ndarray::{Array2, Array3};

let image = ImageBatch::single(Array2::zeros((2, 2))).unwrap();
let affinity = compute_affinity(&image, 1, false).unwrap();
let node = NormalizedCuts::default().with_gamma(1e-3);

let partition = node.solve(&affinity).unwrap();
// the backward pass is evaluated at the stationary points D^(-1/2) z of
// the objective, not at the unit eigenvectors z returned by the solver
let y = partition.stationary_points(&affinity).unwrap();
let upstream = Array3::ones((1, 2, 2));
let grad = node
    .differentiator()
    .backward_constrained_batch(&node, &affinity.to_dense(), &y, &upstream)
    .unwrap();
assert_eq!(grad.shape(), &[1, 4, 4]);
```
*/

#![warn(
    missing_debug_implementations,
    //missing_docs,
    rust_2021_compatibility,
    // unreachable_pub
)]

pub mod affinity;
pub mod declarative;
pub mod linalg;
pub mod ncut;
