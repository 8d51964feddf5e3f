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

//! Storing affinity batches in numpy's npz format

use std::fs::File;
use std::path::Path;

use log::debug;
use ndarray::{arr1, Array1, Array3};
use ndarray_npy::{NpzReader, NpzWriter, ReadNpzError, WriteNpzError};
use thiserror::Error;

use super::banded::BandedAffinity;
use super::weight::Affinity;
use super::CodecError;

const DENSE_ENTRY: &str = "dense.npy";
const BANDED_ENTRY: &str = "banded.npy";
const RADIUS_ENTRY: &str = "radius.npy";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Could not access affinity archive: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not read affinity archive: {0}")]
    Read(#[from] ReadNpzError),
    #[error("Could not write affinity archive: {0}")]
    Write(#[from] WriteNpzError),
    #[error("Archive contains neither a dense nor a banded affinity")]
    MissingEntry,
    #[error("Stored affinity is malformed: {0}")]
    Codec(#[from] CodecError),
}

/// Writes ``affinity`` to an npz archive at ``path``.
///
/// Dense batches are stored under ``dense.npy``. Banded batches are stored
/// under ``banded.npy`` together with their radius in ``radius.npy``.
pub fn write_affinity<P: AsRef<Path>>(path: P, affinity: &Affinity) -> Result<(), StorageError> {
    let file = File::create(path.as_ref())?;
    let mut npz = NpzWriter::new(file);

    match affinity {
        Affinity::Dense(dense) => {
            npz.add_array(DENSE_ENTRY, dense)?;
        }
        Affinity::Banded(banded) => {
            npz.add_array(BANDED_ENTRY, banded.raw())?;
            npz.add_array(RADIUS_ENTRY, &arr1(&[banded.radius() as u64]))?;
        }
    }
    npz.finish()?;

    debug!(
        "Stored {} affinity of batch size {} at {}",
        if affinity.is_banded() { "banded" } else { "dense" },
        affinity.batch_size(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads an affinity batch previously stored with [`write_affinity`].
pub fn read_affinity<P: AsRef<Path>>(path: P) -> Result<Affinity, StorageError> {
    let file = File::open(path.as_ref())?;
    let mut npz = NpzReader::new(file)?;
    let names = npz.names()?;

    if names.iter().any(|name| name == DENSE_ENTRY) {
        let dense: Array3<f64> = npz.by_name(DENSE_ENTRY)?;
        let affinity = Affinity::Dense(dense);
        affinity.validate()?;
        return Ok(affinity);
    }

    if names.iter().any(|name| name == BANDED_ENTRY) {
        let raw: Array3<f64> = npz.by_name(BANDED_ENTRY)?;
        let radius: Array1<u64> = npz.by_name(RADIUS_ENTRY)?;
        let radius = match radius.first() {
            Some(&radius) => radius as usize,
            None => return Err(StorageError::MissingEntry),
        };
        return Ok(Affinity::Banded(BandedAffinity::from_raw(raw, radius)?));
    }

    Err(StorageError::MissingEntry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::{compute_affinity, ImageBatch};
    use ndarray::arr2;
    use tempfile::tempdir;

    fn image() -> ImageBatch {
        ImageBatch::single(arr2(&[[0., 0., 1.], [1., 1., 0.], [0., 1., 1.]])).unwrap()
    }

    #[test]
    pub fn test_dense_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dense.npz");
        let affinity = compute_affinity(&image(), 2, false).unwrap();

        write_affinity(&path, &affinity).unwrap();

        assert_eq!(read_affinity(&path).unwrap(), affinity);
    }

    #[test]
    pub fn test_banded_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("banded.npz");
        let affinity = compute_affinity(&image(), 3, true).unwrap();

        write_affinity(&path, &affinity).unwrap();
        let restored = read_affinity(&path).unwrap();

        assert!(restored.is_banded());
        assert_eq!(restored, affinity);
    }

    #[test]
    pub fn test_missing_file() {
        let dir = tempdir().unwrap();

        assert!(matches!(
            read_affinity(dir.path().join("nothing.npz")),
            Err(StorageError::Io(_))
        ));
    }
}
