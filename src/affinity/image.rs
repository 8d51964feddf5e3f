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

//! Batches of raster images and their flattened pixel index space

use ndarray::{Array1, Array2, Array3, Array4, ArrayView2, Axis};
use rand::Rng;

use super::CodecError;

/// A batch of single channel raster images of identical size.
///
/// Pixels are addressed in a flattened row-major index space of size
/// ``n_pixels = height * width``. The affinity rule of this crate operates
/// on distances in this index space.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageBatch {
    data: Array3<f64>,
}

impl ImageBatch {
    /// Creates a batch from an array of shape (batch, height, width).
    ///
    /// Arrays in any memory layout are accepted; they are copied into
    /// standard (row-major) layout if necessary.
    pub fn new(data: Array3<f64>) -> Result<ImageBatch, CodecError> {
        let (batch, height, width) = data.dim();
        if batch == 0 || height == 0 || width == 0 {
            return Err(CodecError::EmptyImage {
                shape: vec![batch, height, width],
            });
        }
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(ImageBatch { data })
    }

    /// Creates a batch containing exactly one image of shape (height, width).
    pub fn single(image: Array2<f64>) -> Result<ImageBatch, CodecError> {
        ImageBatch::new(image.insert_axis(Axis(0)))
    }

    /// Creates a batch from a tensor in (batch, channel, height, width) layout.
    /// Only single channel images are supported.
    pub fn from_nchw(data: Array4<f64>) -> Result<ImageBatch, CodecError> {
        let channels = data.len_of(Axis(1));
        if channels != 1 {
            return Err(CodecError::Channels { got: channels });
        }
        ImageBatch::new(data.index_axis_move(Axis(1), 0))
    }

    /// Creates a batch from a flat buffer that stores the images consecutively.
    pub fn from_shape_vec(
        batch: usize,
        height: usize,
        width: usize,
        values: Vec<f64>,
    ) -> Result<ImageBatch, CodecError> {
        let len = values.len();
        let data = Array3::from_shape_vec((batch, height, width), values).map_err(|_| {
            CodecError::Shape {
                expected: batch * height * width,
                got: len,
            }
        })?;
        ImageBatch::new(data)
    }

    /// Generates binary images with a single bright axis aligned rectangle on a
    /// dark background. Returns the images together with their ground truth
    /// masks (1 inside the rectangle, 0 outside).
    pub fn random_rectangles<R: Rng>(
        rng: &mut R,
        batch: usize,
        side: usize,
    ) -> Result<(ImageBatch, Array3<f64>), CodecError> {
        let mut masks = Array3::<f64>::zeros((batch, side, side));
        let lower = (side / 3).max(1);

        for mut mask in masks.outer_iter_mut() {
            let w = rng.gen_range(lower..=side.max(lower));
            let h = rng.gen_range(lower..=side.max(lower));
            let cx = rng.gen_range(lower..=side.max(lower));
            let cy = rng.gen_range(lower..=side.max(lower));

            let top = cx.saturating_sub(w / 2);
            let bottom = (cx + w / 2).min(side);
            let left = cy.saturating_sub(h / 2);
            let right = (cy + h / 2).min(side);

            for row in top..bottom {
                for col in left..right {
                    mask[[row, col]] = 1.0;
                }
            }
        }

        let images = ImageBatch::new(masks.mapv(|x| x * 255.0))?;
        Ok((images, masks))
    }

    /// Returns the number of images in this batch.
    #[inline(always)]
    pub fn batch_size(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    #[inline(always)]
    pub fn height(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    #[inline(always)]
    pub fn width(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// Returns the size of the flattened pixel index space.
    #[inline(always)]
    pub fn n_pixels(&self) -> usize {
        self.height() * self.width()
    }

    /// Returns the image at position ``idx`` of this batch.
    pub fn image(&self, idx: usize) -> ArrayView2<f64> {
        self.data.index_axis(Axis(0), idx)
    }

    /// Returns the intensities of image ``idx`` in flattened row-major order.
    pub fn flat(&self, idx: usize) -> Array1<f64> {
        self.image(idx).iter().copied().collect()
    }

    pub fn data(&self) -> &Array3<f64> {
        &self.data
    }
}
