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

//! Print matrices and partitions to the command line

use std::fmt::Write;

use itertools::{Itertools, Position};
use ndarray::{ArrayBase, Data, Ix2};

/// Write a string representation of ``matrix`` into f, one row per line.
/// If ``truncate`` is set, entries are printed with two decimals.
pub fn write_matrix<T: Write, S: Data<Elem = f64>>(
    f: &mut T,
    matrix: &ArrayBase<S, Ix2>,
    truncate: bool,
) -> std::fmt::Result {
    for (pos, row) in matrix.outer_iter().with_position() {
        for (col, value) in row.iter().enumerate() {
            if col > 0 {
                write!(f, " ")?;
            }
            if truncate {
                write!(f, "{:>6.2}", value)?;
            } else {
                write!(f, "{}", value)?;
            }
        }
        match pos {
            Position::First | Position::Middle => writeln!(f)?,
            Position::Last | Position::Only => {}
        }
    }
    Ok(())
}

/// Write the segmentation induced by the sign of ``partition`` into f.
///
/// Pixels with positive value are drawn as ``#``, all others as ``.``.
/// Non-finite values are drawn as ``?``.
pub fn write_partition<T: Write, S: Data<Elem = f64>>(
    f: &mut T,
    partition: &ArrayBase<S, Ix2>,
) -> std::fmt::Result {
    for (pos, row) in partition.outer_iter().with_position() {
        let line: String = row
            .iter()
            .map(|x| {
                if !x.is_finite() {
                    '?'
                } else if *x > 0.0 {
                    '#'
                } else {
                    '.'
                }
            })
            .collect();
        write!(f, "{}", line)?;
        match pos {
            Position::First | Position::Middle => writeln!(f)?,
            Position::Last | Position::Only => {}
        }
    }
    Ok(())
}

/// Returns the rendering of [`write_partition`] as a string.
pub fn partition_to_string<S: Data<Elem = f64>>(partition: &ArrayBase<S, Ix2>) -> String {
    let mut out = String::new();
    // writing into a String never fails
    let _ = write_partition(&mut out, partition);
    out
}

/// Returns the sign pattern of ``partition`` as a vector of booleans in row-major order.
pub fn sign_mask<S: Data<Elem = f64>>(partition: &ArrayBase<S, Ix2>) -> Vec<bool> {
    partition.iter().map(|x| *x > 0.0).collect_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    pub fn test_write_partition() {
        let y = arr2(&[[0.3, -0.1], [f64::NAN, 0.0]]);

        assert_eq!(partition_to_string(&y), "#.\n?.");
    }

    #[test]
    pub fn test_write_matrix() {
        let mut out = String::new();
        write_matrix(&mut out, &arr2(&[[1.0, 0.5], [0.5, 1.0]]), true).unwrap();

        assert_eq!(out, "  1.00   0.50\n  0.50   1.00");
    }

    #[test]
    pub fn test_sign_mask() {
        let y = arr2(&[[0.3, -0.1], [0.2, 0.0]]);

        assert_eq!(sign_mask(&y), vec![true, false, true, false]);
    }
}
