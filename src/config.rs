//! Parameter sets for the eigensolver and the Kähler-Dirac operator.
//!
//! Both structures derive `serde` so that a run can be fully described by a JSON
//! document and reproduced later. Missing keys fall back to [`Default`].

use crate::{
    error::{Error, ErrorKind},
    field::Precision,
    verbosity::Verbosity,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which end of the spectrum an eigensolver should target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Spectrum {
    #[default]
    #[serde(rename = "SR")]
    SmallestReal,
    #[serde(rename = "LR")]
    LargestReal,
    #[serde(rename = "SM")]
    SmallestModulus,
    #[serde(rename = "LM")]
    LargestModulus,
    #[serde(rename = "SI")]
    SmallestImaginary,
    #[serde(rename = "LI")]
    LargestImaginary,
}

/// The form of the linear system a Dirac operator is asked to prepare.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SolutionType {
    /// `M x = b` on the full lattice.
    #[default]
    Mat,
    /// `M† M x = b` on the full lattice.
    MatDagMat,
    /// Even-odd preconditioned `M̂ x = b̂`.
    MatPc,
    /// Even-odd preconditioned normal equations.
    MatPcDagMatPc,
}

impl SolutionType {
    /// True for the even-odd preconditioned solution types.
    pub fn is_preconditioned(self) -> bool {
        matches!(self, SolutionType::MatPc | SolutionType::MatPcDagMatPc)
    }
}

/// Side on which the Kähler-Dirac block inverse multiplies the staggered operator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPreconditioning {
    /// `Xinv · M`
    #[default]
    Left,
    /// `M · Xinv`
    Right,
}

/// Parameters of the Kähler-Dirac preconditioned staggered operator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdParam {
    /// Bare quark mass `m`; the operator diagonal is `2m`.
    pub mass: f64,
    /// Optional precision override for Xinv; clamped to `[Half, Single]`.
    pub xinv_precision: Option<Precision>,
    pub block_preconditioning: BlockPreconditioning,
}

impl Default for KdParam {
    fn default() -> Self {
        Self {
            mass: 0.1,
            xinv_precision: None,
            block_preconditioning: BlockPreconditioning::Left,
        }
    }
}

/// Parameters of the Jacobi-Davidson eigensolver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EigenParam {
    pub spectrum: Spectrum,
    /// Residual tolerance `‖A u − θ u‖` below which a Ritz pair is accepted.
    pub tol: f64,
    /// Number of eigenpairs to compute (`k_max`).
    pub n_conv: usize,
    /// Search space size kept after a restart.
    pub m_min: usize,
    /// Search space capacity; reaching it triggers a restart.
    pub m_max: usize,
    pub max_restarts: usize,
    /// Relative tolerance of the inner CG solve of the correction equation.
    pub corr_eq_tol: f64,
    pub corr_eq_maxiter: usize,
    /// Tolerance of the outer GCR solve on the projected operator.
    pub precon_tol: f64,
    pub precon_maxiter: usize,
    /// Fail instead of returning partial results when the restart budget runs out.
    pub require_convergence: bool,
    /// Load eigenpairs from this file and skip the solve.
    pub vec_infile: Option<PathBuf>,
    /// Save the computed eigenpairs to this file.
    pub vec_outfile: Option<PathBuf>,
    pub verbosity: Verbosity,
    /// Seed used whenever a random direction is needed.
    pub seed: u64,
}

impl Default for EigenParam {
    fn default() -> Self {
        Self {
            spectrum: Spectrum::SmallestReal,
            tol: 1e-8,
            n_conv: 4,
            m_min: 4,
            m_max: 16,
            max_restarts: 100,
            corr_eq_tol: 1e-1,
            corr_eq_maxiter: 10,
            precon_tol: 1e-2,
            precon_maxiter: 5,
            require_convergence: false,
            vec_infile: None,
            vec_outfile: None,
            verbosity: Verbosity::Summarize,
            seed: 1234,
        }
    }
}

impl EigenParam {
    /// Read a parameter set from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| ErrorKind::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let param: Self = serde_json::from_str(&text).map_err(|source| ErrorKind::Config {
            path: path.to_path_buf(),
            source,
        })?;
        param.validate()?;
        Ok(param)
    }

    /// Checks the internal consistency of the parameters.
    ///
    /// The spectrum target is checked by the solver itself, since other
    /// eigensolvers may accept targets this one does not.
    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: String| Err(Error::from(ErrorKind::InvalidParameter(msg)));
        if !(self.tol > 0.0) {
            return invalid(format!("tol must be positive, got {}", self.tol));
        }
        if self.n_conv == 0 {
            return invalid("n_conv must be at least 1".into());
        }
        if self.m_min == 0 || self.m_min >= self.m_max {
            return invalid(format!(
                "need 0 < m_min < m_max, got m_min = {} and m_max = {}",
                self.m_min, self.m_max
            ));
        }
        if self.corr_eq_maxiter == 0 || self.precon_maxiter == 0 {
            return invalid("inner solver iteration budgets must be at least 1".into());
        }
        if !(self.corr_eq_tol > 0.0) || !(self.precon_tol > 0.0) {
            return invalid("inner solver tolerances must be positive".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EigenParam::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_search_space() {
        let param = EigenParam {
            m_min: 8,
            m_max: 8,
            ..Default::default()
        };
        let err = param.validate().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidParameter(_)));
    }

    #[test]
    fn json_uses_defaults_for_missing_keys() {
        let param: EigenParam =
            serde_json::from_str(r#"{ "spectrum": "SR", "n_conv": 2, "m_max": 6 }"#).unwrap();
        assert_eq!(param.n_conv, 2);
        assert_eq!(param.m_max, 6);
        assert_eq!(param.m_min, EigenParam::default().m_min);
        assert_eq!(param.precon_tol, 1e-2);
        assert_eq!(param.precon_maxiter, 5);
    }

    #[test]
    fn json_file_errors_are_typed() {
        let dir = std::env::temp_dir();
        let missing = dir.join(format!("kd_jacdav_missing_{}.json", std::process::id()));
        let err = EigenParam::from_json_file(&missing).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
        assert!(!err.is_configuration());

        let broken = dir.join(format!("kd_jacdav_broken_{}.json", std::process::id()));
        std::fs::write(&broken, r#"{ "n_conv": "two" }"#).unwrap();
        let err = EigenParam::from_json_file(&broken).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Config { .. }));
        assert!(err.is_configuration());

        std::fs::write(&broken, r#"{ "n_conv": 3, "m_min": 2, "m_max": 5 }"#).unwrap();
        let param = EigenParam::from_json_file(&broken).unwrap();
        std::fs::remove_file(&broken).unwrap();
        assert_eq!(param.n_conv, 3);
        assert_eq!(param.m_max, 5);
    }

    #[test]
    fn kd_param_round_trips_through_json() {
        let param = KdParam {
            mass: 0.05,
            xinv_precision: Some(Precision::Half),
            block_preconditioning: BlockPreconditioning::Right,
        };
        let text = serde_json::to_string(&param).unwrap();
        assert!(text.contains("\"right\""));
        let back: KdParam = serde_json::from_str(&text).unwrap();
        assert_eq!(back, param);
    }

    #[test]
    fn preconditioned_solution_types() {
        assert!(SolutionType::MatPc.is_preconditioned());
        assert!(SolutionType::MatPcDagMatPc.is_preconditioned());
        assert!(!SolutionType::Mat.is_preconditioned());
        assert!(!SolutionType::MatDagMat.is_preconditioned());
    }
}
