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

//! Construction of pixel affinity matrices from images

use std::borrow::Cow;

use log::debug;
use ndarray::{Array3, Axis};

use super::banded::BandedAffinity;
use super::image::ImageBatch;
use super::CodecError;

/// A batch of affinity matrices in either dense or banded storage.
#[derive(Clone, Debug, PartialEq)]
pub enum Affinity {
    /// Dense (batch, n, n) matrices
    Dense(Array3<f64>),
    /// Banded encoding storing only the super-diagonals
    Banded(BandedAffinity),
}

impl Affinity {
    #[inline]
    pub fn batch_size(&self) -> usize {
        match self {
            Affinity::Dense(dense) => dense.len_of(Axis(0)),
            Affinity::Banded(banded) => banded.batch_size(),
        }
    }

    /// Returns the number of pixels (rows of each matrix).
    #[inline]
    pub fn n(&self) -> usize {
        match self {
            Affinity::Dense(dense) => dense.len_of(Axis(1)),
            Affinity::Banded(banded) => banded.n(),
        }
    }

    #[inline]
    pub fn is_banded(&self) -> bool {
        matches!(self, Affinity::Banded(_))
    }

    /// Returns the dense form, expanding banded storage if necessary.
    pub fn to_dense(&self) -> Cow<'_, Array3<f64>> {
        match self {
            Affinity::Dense(dense) => Cow::Borrowed(dense),
            Affinity::Banded(banded) => Cow::Owned(banded.expand()),
        }
    }

    pub fn into_dense(self) -> Array3<f64> {
        match self {
            Affinity::Dense(dense) => dense,
            Affinity::Banded(banded) => banded.expand(),
        }
    }

    /// Checks that every matrix is square.
    pub(crate) fn validate(&self) -> Result<(), CodecError> {
        if let Affinity::Dense(dense) = self {
            let (_, rows, cols) = dense.dim();
            if rows != cols {
                return Err(CodecError::Shape {
                    expected: rows,
                    got: cols,
                });
            }
        }
        Ok(())
    }
}

impl From<BandedAffinity> for Affinity {
    fn from(banded: BandedAffinity) -> Self {
        Affinity::Banded(banded)
    }
}

impl From<Array3<f64>> for Affinity {
    fn from(dense: Array3<f64>) -> Self {
        Affinity::Dense(dense)
    }
}

/// Computes the binary affinity of every pixel pair within ``radius`` of each other.
///
/// Two pixels ``u`` and ``v`` are neighbours if their distance in the
/// flattened row-major index space satisfies ``|u - v| <= radius``. This is
/// an index distance, so neighbourhoods wrap across row boundaries.
/// Neighbours with identical intensity have affinity 1, all other pairs 0.
/// The radius is clamped to ``n_pixels / 2``.
///
/// If ``minified`` is set, a [`BandedAffinity`] of shape (batch, radius, n)
/// is returned and no dense matrix is allocated.
///
/// # Example
///
/// ``` rust
/// use normcut::affinity::{compute_affinity, ImageBatch};
/// use ndarray::arr2;
///
/// let image = ImageBatch::single(arr2(&[[0., 255.], [255., 0.]])).unwrap();
/// let w = compute_affinity(&image, 1, false).unwrap().into_dense();
///
/// assert_eq!(w[[0, 1, 2]], 1.0);
/// assert_eq!(w[[0, 0, 1]], 0.0);
/// ```
pub fn compute_affinity(
    image: &ImageBatch,
    radius: i64,
    minified: bool,
) -> Result<Affinity, CodecError> {
    if radius < 0 {
        return Err(CodecError::NegativeRadius { radius });
    }

    let n = image.n_pixels();
    let radius = (radius as u64).min((n / 2) as u64) as usize;
    debug!(
        "Computing affinity of {} images with {} pixels (radius={}, minified={})",
        image.batch_size(),
        n,
        radius,
        minified
    );

    if minified {
        Ok(Affinity::Banded(banded_affinity(image, radius)))
    } else {
        Ok(Affinity::Dense(dense_affinity(image, radius)))
    }
}

#[inline(always)]
fn similarity(a: f64, b: f64) -> f64 {
    if a == b {
        1.0
    } else {
        0.0
    }
}

fn dense_affinity(image: &ImageBatch, radius: usize) -> Array3<f64> {
    let n = image.n_pixels();
    let mut weights = Array3::<f64>::zeros((image.batch_size(), n, n));

    for (idx, mut matrix) in weights.outer_iter_mut().enumerate() {
        let pixels = image.flat(idx);
        for u in 0..n {
            let end = (u + radius + 1).min(n);
            for v in u..end {
                let value = similarity(pixels[u], pixels[v]);
                matrix[[u, v]] = value;
                matrix[[v, u]] = value;
            }
        }
    }
    weights
}

fn banded_affinity(image: &ImageBatch, radius: usize) -> BandedAffinity {
    let n = image.n_pixels();
    let mut banded = BandedAffinity::zeros(image.batch_size(), radius, n);

    for idx in 0..image.batch_size() {
        let pixels = image.flat(idx);
        let mut diags = banded.diagonals_mut(idx);
        for offset in 1..=radius {
            for u in 0..n - offset {
                diags[[offset - 1, u]] = similarity(pixels[u], pixels[u + offset]);
            }
        }
    }
    banded
}
