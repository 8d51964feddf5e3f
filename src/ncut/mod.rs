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

//! The normalized cuts node: solver, objective, and diagnostics

pub mod monitor;
pub mod node;
pub mod objective;
pub mod solver;
pub mod summary;

use thiserror::Error;

use crate::affinity::CodecError;
use crate::linalg::eigen::EigenError;

pub use solver::{NormalizedCuts, Partition};
pub use summary::ObjectiveSummary;

#[derive(Error, Clone, Debug, PartialEq)]
pub enum SolveError {
    #[error("Number of pixels {n} is not a perfect square")]
    NotSquare { n: usize },
    #[error("At least two pixels are required for a cut, got {n}")]
    TooSmall { n: usize },
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },
    #[error("Pixel {index} of batch element {batch} has non-positive degree {degree}")]
    ZeroDegree {
        batch: usize,
        index: usize,
        degree: f64,
    },
    #[error("Eigendecomposition of batch element {batch} failed: {source}")]
    Eigen {
        batch: usize,
        #[source]
        source: EigenError,
    },
    #[error(transparent)]
    Codec(#[from] CodecError),
}
