//! This module defines the custom error types for the library.
//!
//! Every failure the operators and solvers can report is collected into a single
//! enum, [`ErrorKind`], wrapped by the public [`Error`] type. The kinds fall into
//! three families:
//!
//! - **Configuration errors**: an unsupported spectrum target, an incompatible
//!   solution type, a non-aggregation transfer for coarsening, mismatched field
//!   geometries. These indicate programmer or setup mistakes and are never retried.
//! - **Numerical non-convergence**: the eigensolver exhausted its restart budget
//!   while `require_convergence` was set.
//! - **Collaborator failures**: the dense eigendecomposition, the file system or
//!   the persistence layer reported an error.
//!
//! Degenerate inputs (a zero vector fed to the correction operator, a Krylov
//! breakdown) are handled locally by the components and never surface here.
//!
//! Using the [`thiserror`] crate allows us to create idiomatic error types with minimal
//! boilerplate. Note that [`faer::linalg::evd::EvdError`] does not implement the standard
//! [`std::error::Error`] trait, so we wrap it manually to provide a compatible error type.
use crate::{
    config::{SolutionType, Spectrum},
    dirac::TransferType,
    field::{Precision, SiteSubset},
    utils::eigvec_io::PersistenceError,
};
use std::path::PathBuf;
use thiserror::Error;

/// Represents all possible errors raised by the operators and the eigensolver.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

impl Error {
    /// Returns the kind of failure, for callers that need to branch on it.
    pub fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// True for errors that signal a programmer or configuration mistake.
    pub fn is_configuration(&self) -> bool {
        !matches!(
            self.0,
            ErrorKind::NotConverged { .. }
                | ErrorKind::Evd(_)
                | ErrorKind::Persistence(_)
                | ErrorKind::Io { .. }
        )
    }
}

/// The distinct kinds of errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The Jacobi-Davidson solver only targets the smallest-real-part spectrum.
    #[error("Only the smallest real spectrum (SR) can be passed to the JD solver, got {0:?}")]
    UnsupportedSpectrum(Spectrum),

    /// A preconditioned solution was requested from an operator without a
    /// preconditioned solve type.
    #[error("Preconditioned solution {0:?} requires a preconditioned solve type")]
    IncompatibleSolution(SolutionType),

    /// Coarsening was requested with a transfer operator the Dirac operator cannot use.
    #[error("Staggered KD operators only support aggregation coarsening, got {0:?}")]
    UnsupportedTransfer(TransferType),

    /// The staggered operators act on 5-d fields only.
    #[error("Staggered dslash requires 5-d fermion fields, got a {ndim}-d field")]
    NotFiveDimensional { ndim: usize },

    /// Input and output fields carry different precisions.
    #[error("Input and output spinor precisions don't match: {input:?} vs {output:?}")]
    PrecisionMismatch { input: Precision, output: Precision },

    /// Input or output field is not a full-parity field.
    #[error("Fields are not full parity, in = {input:?}, out = {output:?}")]
    SubsetMismatch { input: SiteSubset, output: SiteSubset },

    /// Field volume does not match the gauge field volume.
    #[error("Spinor volume {spinor} doesn't match gauge volume {gauge}")]
    VolumeMismatch { spinor: usize, gauge: usize },

    /// Two fields (or a field and an operator) have incompatible lengths.
    #[error("Dimension mismatch: expected {expected} entries, found {actual}.")]
    LengthMismatch { expected: usize, actual: usize },

    /// The Kähler-Dirac blocking needs even extents in every direction.
    #[error("Lattice extent {extent} in direction {mu} is not divisible by the 2^4 KD block")]
    OddExtent { mu: usize, extent: usize },

    /// The block-inverse builder could not produce an accurate inverse.
    #[error("Failed to invert Kähler-Dirac block {block}: residual {residual:e}")]
    BlockInverse { block: usize, residual: f64 },

    /// A spectral shift was requested on an operator that does not carry one.
    #[error("Operator does not support an additive spectral shift")]
    ShiftUnsupported,

    /// Indicates that an invalid input parameter was provided.
    #[error("Invalid input parameter: {0}")]
    InvalidParameter(String),

    /// Wraps an error originating from [`faer`]'s eigendecomposition module.
    #[error("A numerical error occurred during the eigendecomposition of H: {0:?}")]
    Evd(faer::linalg::evd::EvdError),

    /// The restart budget ran out before the requested eigenpairs converged.
    #[error(
        "JD failed to compute the requested {requested} vectors ({converged} converged) with a search space of size between {m_min} and {m_max} in {max_restarts} restart steps"
    )]
    NotConverged {
        requested: usize,
        converged: usize,
        m_min: usize,
        m_max: usize,
        max_restarts: usize,
    },

    /// A parameter file could not be read.
    #[error("Failed to read parameter file {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A parameter file is not a valid JSON parameter set.
    #[error("Invalid parameter file {path:?}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Loading or saving eigenvectors failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl From<PersistenceError> for Error {
    fn from(err: PersistenceError) -> Self {
        Error(ErrorKind::Persistence(err))
    }
}

impl From<faer::linalg::evd::EvdError> for Error {
    fn from(err: faer::linalg::evd::EvdError) -> Self {
        Error(ErrorKind::Evd(err))
    }
}

// Unit tests to ensure error messages are formatted correctly.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_spectrum_message() {
        let error = Error::from(ErrorKind::UnsupportedSpectrum(Spectrum::LargestReal));
        assert_eq!(
            error.to_string(),
            "Only the smallest real spectrum (SR) can be passed to the JD solver, got LargestReal"
        );
        assert!(error.is_configuration());
    }

    #[test]
    fn test_not_converged_message() {
        let error = Error::from(ErrorKind::NotConverged {
            requested: 4,
            converged: 1,
            m_min: 2,
            m_max: 4,
            max_restarts: 10,
        });
        let expected = "JD failed to compute the requested 4 vectors (1 converged) with a search space of size between 2 and 4 in 10 restart steps";
        assert_eq!(error.to_string(), expected);
        assert!(!error.is_configuration());
    }

    #[test]
    fn test_volume_mismatch_message() {
        let error = Error::from(ErrorKind::VolumeMismatch {
            spinor: 128,
            gauge: 256,
        });
        assert_eq!(
            error.to_string(),
            "Spinor volume 128 doesn't match gauge volume 256"
        );
    }

    #[test]
    fn test_evd_error_message() {
        let evd_error = faer::linalg::evd::EvdError::NoConvergence;
        let error = Error::from(evd_error);
        // The message uses the `Debug` format for the inner error.
        assert_eq!(
            error.to_string(),
            "A numerical error occurred during the eigendecomposition of H: NoConvergence"
        );
    }
}
