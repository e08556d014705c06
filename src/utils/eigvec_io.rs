//! CSV persistence of eigenpairs.
//!
//! Every complex entry of every eigenvector becomes one row:
//!
//! ```text
//! vector,eigenvalue,index,re,im
//! 0,0.0810140527710052,0,0.1201,-0.0342
//! ```
//!
//! Rows of one vector are contiguous and ordered by `index`; vectors are
//! numbered from zero in the order they were saved.

use crate::field::{FieldGeometry, SpinorField};
use faer::c64;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Failures of the persistence layer.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("I/O error while accessing eigenvector file: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error in eigenvector file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Malformed eigenvector file: {0}")]
    Format(String),
}

#[derive(Debug, Serialize, Deserialize)]
struct EigenRecord {
    vector: usize,
    eigenvalue: f64,
    index: usize,
    re: f64,
    im: f64,
}

/// Writes `evals[i]` and `evecs[i]` for every `i` to `path`.
pub fn save_eigenpairs(
    path: &Path,
    evals: &[f64],
    evecs: &[SpinorField],
) -> Result<(), PersistenceError> {
    if evals.len() != evecs.len() {
        return Err(PersistenceError::Format(format!(
            "{} eigenvalues for {} eigenvectors",
            evals.len(),
            evecs.len()
        )));
    }
    let mut writer = csv::Writer::from_path(path)?;
    for (vector, (&eigenvalue, v)) in evals.iter().zip(evecs).enumerate() {
        for (index, z) in v.as_slice().iter().enumerate() {
            writer.serialize(EigenRecord {
                vector,
                eigenvalue,
                index,
                re: z.re,
                im: z.im,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Reads eigenpairs written by [`save_eigenpairs`]; every vector must match
/// `geometry` in length.
pub fn load_eigenpairs(
    path: &Path,
    geometry: &FieldGeometry,
) -> Result<(Vec<f64>, Vec<SpinorField>), PersistenceError> {
    let n = geometry.len();
    let mut reader = csv::Reader::from_path(path)?;
    let mut evals = Vec::new();
    let mut data: Vec<Vec<c64>> = Vec::new();

    for result in reader.deserialize() {
        let record: EigenRecord = result?;
        if record.vector == data.len() && record.index == 0 {
            evals.push(record.eigenvalue);
            data.push(Vec::with_capacity(n));
        }
        let n_vectors = data.len();
        let Some(current) = data.last_mut() else {
            return Err(PersistenceError::Format(format!(
                "first row belongs to vector {} instead of 0",
                record.vector
            )));
        };
        if record.vector + 1 != n_vectors || record.index != current.len() {
            return Err(PersistenceError::Format(format!(
                "unexpected row (vector {}, index {}) after {} entries of vector {}",
                record.vector,
                record.index,
                current.len(),
                n_vectors - 1
            )));
        }
        current.push(c64::new(record.re, record.im));
    }

    let mut evecs = Vec::with_capacity(data.len());
    for (i, values) in data.into_iter().enumerate() {
        if values.len() != n {
            return Err(PersistenceError::Format(format!(
                "vector {i} has {} entries, expected {n}",
                values.len()
            )));
        }
        let field = SpinorField::from_vec(geometry, values)
            .map_err(|e| PersistenceError::Format(e.to_string()))?;
        evecs.push(field);
    }
    Ok((evals, evecs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("kd_jacdav_{}_{name}.csv", std::process::id()))
    }

    #[test]
    fn round_trip_preserves_pairs_bitwise() {
        let g = FieldGeometry::flat(5);
        let evecs = vec![SpinorField::random(&g, 1), SpinorField::random(&g, 2)];
        let evals = vec![0.25, 1.0 / 3.0];
        let path = temp_path("round_trip");
        save_eigenpairs(&path, &evals, &evecs).unwrap();

        let (loaded_evals, loaded_evecs) = load_eigenpairs(&path, &g).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded_evals, evals);
        assert_eq!(loaded_evecs, evecs);
    }

    #[test]
    fn rejects_wrong_length() {
        let path = temp_path("wrong_length");
        save_eigenpairs(&path, &[1.0], &[SpinorField::random(&FieldGeometry::flat(3), 4)])
            .unwrap();
        let err = load_eigenpairs(&path, &FieldGeometry::flat(4)).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, PersistenceError::Format(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_eigenpairs(&temp_path("missing"), &FieldGeometry::flat(2)).unwrap_err();
        assert!(matches!(err, PersistenceError::Csv(_)));
    }
}
