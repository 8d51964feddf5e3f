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

//! Compact storage of symmetric banded affinity matrices

use ndarray::{s, Array2, Array3, ArrayView2, ArrayViewMut2, Axis};

use super::CodecError;

/// Banded (minified) encoding of a batch of symmetric affinity matrices.
///
/// Only the ``radius`` super-diagonals above the main diagonal are stored.
/// Row ``i - 1`` of each batch element holds the ``i``-th super-diagonal,
/// which has ``n - i`` entries and is right-padded with zeros to length ``n``.
/// The main diagonal is implicitly all ones.
///
/// The encoding is lossless for every symmetric matrix with unit diagonal
/// whose non-zero entries lie within ``radius`` of the main diagonal.
#[derive(Clone, Debug, PartialEq)]
pub struct BandedAffinity {
    radius: usize,
    data: Array3<f64>,
}

impl BandedAffinity {
    /// Creates an all-zero band (that is, the identity matrix) of the given size.
    pub fn zeros(batch: usize, radius: usize, n: usize) -> BandedAffinity {
        assert!(
            radius <= n,
            "Band of radius {} does not fit into a {} x {} matrix",
            radius,
            n,
            n
        );
        BandedAffinity {
            radius,
            data: Array3::zeros((batch, radius, n)),
        }
    }

    /// Wraps a raw (batch, radius, n) tensor.
    ///
    /// The declared ``radius`` must match the second axis of ``data``.
    /// Only the first ``n - i`` slots of the ``i``-th diagonal carry values;
    /// the padding slots behind them are ignored and reset to zero, so that
    /// unmasked network outputs can be decoded directly.
    pub fn from_raw(mut data: Array3<f64>, radius: usize) -> Result<BandedAffinity, CodecError> {
        let (_, bands, n) = data.dim();
        if bands != radius {
            return Err(CodecError::RadiusMismatch {
                declared: radius,
                stored: bands,
            });
        }
        if radius > n {
            return Err(CodecError::BandOverflow { radius, n });
        }
        for mut sample in data.outer_iter_mut() {
            for (idx, mut diag) in sample.outer_iter_mut().enumerate() {
                diag.slice_mut(s![n - idx - 1..]).fill(0.0);
            }
        }
        Ok(BandedAffinity { radius, data })
    }

    /// Like [`BandedAffinity::from_raw`], but rejects tensors with non-zero padding.
    pub fn from_raw_strict(data: Array3<f64>, radius: usize) -> Result<BandedAffinity, CodecError> {
        let n = data.len_of(Axis(2));
        for sample in data.outer_iter() {
            for (idx, diag) in sample.outer_iter().enumerate() {
                let offset = idx + 1;
                if offset <= n && diag.slice(s![n - offset..]).iter().any(|&x| x != 0.0) {
                    return Err(CodecError::Padding { offset });
                }
            }
        }
        BandedAffinity::from_raw(data, radius)
    }

    /// Extracts the banded form of a batch of dense (batch, n, n) matrices.
    ///
    /// Entries outside the band and the lower triangle are ignored; callers
    /// are expected to pass symmetric matrices with unit diagonal.
    pub fn from_dense(dense: &Array3<f64>, radius: usize) -> Result<BandedAffinity, CodecError> {
        let (batch, rows, cols) = dense.dim();
        if rows != cols {
            return Err(CodecError::Shape {
                expected: rows,
                got: cols,
            });
        }
        let n = rows;
        if radius > n {
            return Err(CodecError::BandOverflow { radius, n });
        }

        let mut banded = BandedAffinity::zeros(batch, radius, n);
        for (mut out, matrix) in banded
            .data
            .outer_iter_mut()
            .zip(dense.outer_iter())
        {
            for offset in 1..=radius {
                let mut row = out.row_mut(offset - 1);
                for u in 0..n - offset {
                    row[u] = matrix[[u, u + offset]];
                }
            }
        }
        Ok(banded)
    }

    #[inline(always)]
    pub fn radius(&self) -> usize {
        self.radius
    }

    #[inline(always)]
    pub fn batch_size(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// Returns the number of rows (and columns) of the encoded matrices.
    #[inline(always)]
    pub fn n(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    pub fn raw(&self) -> &Array3<f64> {
        &self.data
    }

    pub fn into_raw(self) -> Array3<f64> {
        self.data
    }

    /// Returns the stored diagonals of batch element ``batch`` as a (radius, n) view.
    pub fn diagonals(&self, batch: usize) -> ArrayView2<f64> {
        self.data.index_axis(Axis(0), batch)
    }

    /// Row ``i - 1`` of the returned view is the ``i``-th super-diagonal;
    /// its slots from ``n - i`` onwards are padding.
    pub(crate) fn diagonals_mut(&mut self, batch: usize) -> ArrayViewMut2<f64> {
        self.data.index_axis_mut(Axis(0), batch)
    }

    /// Reads the entry ``(u, v)`` of the matrix of batch element ``batch``.
    /// Entries outside the band read as zero, the diagonal reads as one.
    pub fn get(&self, batch: usize, u: usize, v: usize) -> f64 {
        let n = self.n();
        assert!(
            u < n && v < n,
            "Index ({}, {}) outside of {} x {} matrix",
            u,
            v,
            n,
            n
        );
        let (lo, hi) = if u <= v { (u, v) } else { (v, u) };
        let offset = hi - lo;
        if offset == 0 {
            1.0
        } else if offset > self.radius {
            0.0
        } else {
            self.data[[batch, offset - 1, lo]]
        }
    }

    /// Writes the symmetric pair of entries ``(u, v)`` and ``(v, u)``.
    ///
    /// Writes outside the band are rejected, as are writes of anything other
    /// than one onto the main diagonal.
    pub fn set(&mut self, batch: usize, u: usize, v: usize, value: f64) -> Result<(), CodecError> {
        let n = self.n();
        if u >= n || v >= n {
            return Err(CodecError::OutOfBand {
                u,
                v,
                radius: self.radius,
            });
        }
        let (lo, hi) = if u <= v { (u, v) } else { (v, u) };
        let offset = hi - lo;
        if offset == 0 {
            return if value == 1.0 {
                Ok(())
            } else {
                Err(CodecError::Diagonal { index: u, value })
            };
        }
        if offset > self.radius {
            return Err(CodecError::OutOfBand {
                u,
                v,
                radius: self.radius,
            });
        }
        self.data[[batch, offset - 1, lo]] = value;
        Ok(())
    }

    /// Reconstructs the dense symmetric matrices encoded by this band.
    pub fn expand(&self) -> Array3<f64> {
        let (batch, _, n) = self.data.dim();
        let mut dense = Array3::<f64>::zeros((batch, n, n));

        for (mut matrix, diags) in dense.outer_iter_mut().zip(self.data.outer_iter()) {
            matrix.diag_mut().fill(1.0);
            place_diagonals(&mut matrix, diags);
        }
        dense
    }
}

/// Writes ``diags[i - 1][0..n - i]`` onto the ``+i`` and ``-i`` diagonals of ``matrix``.
fn place_diagonals(matrix: &mut ArrayViewMut2<f64>, diags: ArrayView2<f64>) {
    let n = matrix.nrows();
    for (idx, diag) in diags.outer_iter().enumerate() {
        let offset = idx + 1;
        for u in 0..n - offset {
            matrix[[u, u + offset]] = diag[u];
            matrix[[u + offset, u]] = diag[u];
        }
    }
}

/// Expands the banded encoding to dense (batch, n, n) matrices.
///
/// This is the exact left inverse of the minified affinity construction.
pub fn expand_banded(banded: &BandedAffinity) -> Array3<f64> {
    banded.expand()
}

/// Expands a raw (batch, r, n) tensor without a declared radius.
///
/// If ``r == n`` the tensor is assumed to be already expanded and a copy is
/// returned unchanged.
pub fn expand_raw(raw: &Array3<f64>) -> Result<Array3<f64>, CodecError> {
    let (_, r, n) = raw.dim();
    if r == n {
        return Ok(raw.to_owned());
    }
    if r > n {
        return Err(CodecError::BandOverflow { radius: r, n });
    }
    let banded = BandedAffinity::from_raw(raw.to_owned(), r)?;
    Ok(banded.expand())
}

/// Tests element-wise whether ``a`` equals its transpose within the given
/// tolerances, using the rule ``|x - y| <= atol + rtol * |y|``.
pub fn check_symmetric(a: &Array3<f64>, rtol: f64, atol: f64) -> bool {
    a.outer_iter().all(|matrix| is_symmetric(&matrix, rtol, atol))
}

pub(crate) fn is_symmetric(matrix: &ArrayView2<f64>, rtol: f64, atol: f64) -> bool {
    if matrix.nrows() != matrix.ncols() {
        return false;
    }
    matrix
        .indexed_iter()
        .all(|((i, j), &x)| {
            let y = matrix[[j, i]];
            (x - y).abs() <= atol + rtol * y.abs()
        })
}

/// Builds the dense matrix of a single sample from a (radius, n) band.
pub fn expand_single(diags: ArrayView2<f64>) -> Array2<f64> {
    let n = diags.ncols();
    let mut matrix = Array2::<f64>::eye(n);
    place_diagonals(&mut matrix.view_mut(), diags);
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr2, Array};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    #[test]
    pub fn test_expand_small() {
        let raw = Array3::from_shape_vec((1, 1, 3), vec![0.5, -2.0, 0.0]).unwrap();
        let banded = BandedAffinity::from_raw(raw, 1).unwrap();

        assert_eq!(
            banded.expand().index_axis(Axis(0), 0),
            arr2(&[[1.0, 0.5, 0.0], [0.5, 1.0, -2.0], [0.0, -2.0, 1.0]])
        );
    }

    #[test]
    pub fn test_expand_radius_zero() {
        let banded = BandedAffinity::zeros(2, 0, 5);
        let dense = banded.expand();

        for matrix in dense.outer_iter() {
            assert_eq!(matrix, Array2::<f64>::eye(5));
        }
    }

    #[test]
    pub fn test_expand_symmetric() {
        let mut raw = Array::random((3, 4, 9), Uniform::new(-1.0, 1.0));
        for mut sample in raw.outer_iter_mut() {
            for (idx, mut diag) in sample.outer_iter_mut().enumerate() {
                diag.slice_mut(s![9 - idx - 1..]).fill(0.0);
            }
        }
        let banded = BandedAffinity::from_raw(raw, 4).unwrap();

        assert!(check_symmetric(&banded.expand(), 0.0, 0.0));
    }

    #[test]
    pub fn test_from_dense_roundtrip() {
        let raw = Array3::from_shape_vec(
            (1, 2, 4),
            vec![0.1, 0.2, 0.3, 0.0, 0.4, 0.5, 0.0, 0.0],
        )
        .unwrap();
        let banded = BandedAffinity::from_raw(raw, 2).unwrap();

        let dense = banded.expand();
        assert_eq!(BandedAffinity::from_dense(&dense, 2).unwrap(), banded);
    }

    #[test]
    pub fn test_radius_mismatch() {
        let result = BandedAffinity::from_raw(Array3::zeros((1, 2, 6)), 3);

        assert!(matches!(
            result,
            Err(CodecError::RadiusMismatch {
                declared: 3,
                stored: 2
            })
        ));
    }

    #[test]
    pub fn test_padding_ignored() {
        let raw = Array3::from_shape_vec((1, 1, 3), vec![0.5, -2.0, 0.7]).unwrap();

        assert_eq!(
            expand_raw(&raw).unwrap().index_axis(Axis(0), 0),
            arr2(&[[1.0, 0.5, 0.0], [0.5, 1.0, -2.0], [0.0, -2.0, 1.0]])
        );
        let banded = BandedAffinity::from_raw(raw, 1).unwrap();
        assert_eq!(banded.raw()[[0, 0, 2]], 0.0);
    }

    #[test]
    pub fn test_random_raw_with_padding() {
        let raw = Array::random((3, 4, 9), Uniform::new(-1.0, 1.0));
        let dense = expand_raw(&raw).unwrap();

        assert!(check_symmetric(&dense, 0.0, 0.0));
        for (a, diags) in dense.outer_iter().zip(raw.outer_iter()) {
            assert!(a.diag().iter().all(|&x| x == 1.0));
            for ((u, v), &x) in a.indexed_iter() {
                let offset = u.abs_diff(v);
                if offset > 4 {
                    assert_eq!(x, 0.0);
                } else if offset > 0 {
                    assert_eq!(x, diags[[offset - 1, u.min(v)]]);
                }
            }
        }
    }

    #[test]
    pub fn test_padding_rejected_strict() {
        let mut raw = Array3::zeros((1, 1, 4));
        raw[[0, 0, 3]] = 1.0;

        assert!(matches!(
            BandedAffinity::from_raw_strict(raw.clone(), 1),
            Err(CodecError::Padding { offset: 1 })
        ));
        raw[[0, 0, 3]] = 0.0;
        assert!(BandedAffinity::from_raw_strict(raw, 1).is_ok());
    }

    #[test]
    pub fn test_get_set() {
        let mut banded = BandedAffinity::zeros(1, 2, 6);

        banded.set(0, 3, 1, 0.25).unwrap();
        assert_relative_eq!(banded.get(0, 1, 3), 0.25);
        assert_relative_eq!(banded.get(0, 3, 1), 0.25);
        assert_relative_eq!(banded.get(0, 4, 4), 1.0);
        assert_relative_eq!(banded.get(0, 0, 5), 0.0);

        assert!(matches!(
            banded.set(0, 0, 3, 1.0),
            Err(CodecError::OutOfBand { u: 0, v: 3, radius: 2 })
        ));
        assert!(matches!(
            banded.set(0, 2, 2, 0.0),
            Err(CodecError::Diagonal { index: 2, .. })
        ));
        assert!(banded.set(0, 2, 2, 1.0).is_ok());
    }

    #[test]
    pub fn test_expand_raw_square_passthrough() {
        let raw = Array::random((2, 5, 5), Uniform::new(0.0, 1.0));

        assert_eq!(expand_raw(&raw).unwrap(), raw);
    }

    #[test]
    pub fn test_expand_raw_overflow() {
        let result = expand_raw(&Array3::zeros((1, 6, 4)));

        assert!(matches!(
            result,
            Err(CodecError::BandOverflow { radius: 6, n: 4 })
        ));
    }

    #[test]
    pub fn test_expand_single() {
        let diags = arr2(&[[1.0, 1.0, 0.0]]);

        assert_eq!(
            expand_single(diags.view()),
            arr2(&[[1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]])
        );
    }
}
