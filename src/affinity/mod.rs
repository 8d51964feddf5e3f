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

//! Pixel affinity matrices: construction, banded encoding, and persistence

pub mod banded;
pub mod config;
pub mod image;
pub mod io;
pub mod weight;

use thiserror::Error;

pub use banded::{check_symmetric, expand_banded, expand_raw, BandedAffinity};
pub use config::AffinityConfig;
pub use image::ImageBatch;
pub use weight::{compute_affinity, Affinity};

#[derive(Error, Clone, Debug, PartialEq)]
pub enum CodecError {
    #[error("Radius must be non-negative, got {radius}")]
    NegativeRadius { radius: i64 },
    #[error("Image must contain at least one pixel, got shape {shape:?}")]
    EmptyImage { shape: Vec<usize> },
    #[error("Only single channel images are supported, got {got} channels")]
    Channels { got: usize },
    #[error("Shape mismatch: expected {expected}, got {got}")]
    Shape { expected: usize, got: usize },
    #[error("Declared radius {declared} does not match the {stored} stored diagonals")]
    RadiusMismatch { declared: usize, stored: usize },
    #[error("Band of radius {radius} exceeds the matrix size {n}")]
    BandOverflow { radius: usize, n: usize },
    #[error("Padding of diagonal {offset} must be zero")]
    Padding { offset: usize },
    #[error("Entry ({u}, {v}) lies outside the band of radius {radius}")]
    OutOfBand { u: usize, v: usize, radius: usize },
    #[error("Main diagonal is fixed to one, cannot store {value} at index {index}")]
    Diagonal { index: usize, value: f64 },
}
