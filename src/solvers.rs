//! This module provides a high-level API for computing the lowest eigenpairs of
//! a Hermitian operator, typically the normal operator `M†M` of a Kähler-Dirac
//! preconditioned staggered operator.

pub use crate::algorithms::jacobi_davidson::{EigenResult, compute_evals};

use crate::{
    algorithms::jacobi_davidson::JacobiDavidson, config::EigenParam, error::Error,
    field::SpinorField, matrix::LinearOperator,
};

/// Computes the `param.n_conv` smallest eigenpairs of `operator` with the
/// Jacobi-Davidson method.
///
/// # Arguments
/// * `operator`: A Hermitian linear operator. It must accept an additive shift
///   (see [`LinearOperator::set_shift`]), which the correction equation uses.
/// * `initial`: The starting vector. A zero vector is replaced by a random field
///   drawn from `param.seed`.
/// * `param`: Solver parameters. Only [`Spectrum::SmallestReal`](crate::config::Spectrum)
///   is supported.
///
/// # Returns
/// The eigenpairs in ascending order of eigenvalue, or an [`Error`]. Running out
/// of restarts is only an error when `param.require_convergence` is set.
///
/// # Example
///
/// ```
/// use kd_jacdav::{
///     config::EigenParam, field::SpinorField, matrix::DenseOperator, solvers::eigensolve,
/// };
/// use kd_jacdav::verbosity::Verbosity;
///
/// let a = DenseOperator::tridiagonal(12, 2.0, -1.0);
/// let param = EigenParam {
///     n_conv: 2,
///     m_min: 2,
///     m_max: 6,
///     max_restarts: 200,
///     verbosity: Verbosity::Silent,
///     ..Default::default()
/// };
/// let result = eigensolve(&a, &SpinorField::random(&a.geometry(), 7), &param).unwrap();
/// assert!(result.converged);
/// assert!(result.evals[0] < result.evals[1]);
/// ```
pub fn eigensolve(
    operator: &dyn LinearOperator,
    initial: &SpinorField,
    param: &EigenParam,
) -> Result<EigenResult, Error> {
    JacobiDavidson::new(operator, param.clone())?.solve(initial)
}
