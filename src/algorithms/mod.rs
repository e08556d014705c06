//! Iterative algorithms acting on [`LinearOperator`]s.
//!
//! ** NOTE: We recommend using the high-level entry points in [`crate::solvers`]
//! instead. The modules here expose the building blocks of the eigensolver for
//! callers that need fine-grained control.
//!
//! - [`cg`] and [`gcr`]: Krylov linear solvers used for the correction equation.
//! - [`subspace`]: the search space and the dense projected matrix `H`.
//! - [`correction`]: the projected, preconditioned correction operator.
//! - [`jacobi_davidson`]: the Jacobi-Davidson eigensolver.

pub mod cg;
pub mod correction;
pub mod gcr;
pub mod jacobi_davidson;
pub mod subspace;

use crate::{error::Error, field::SpinorField, matrix::LinearOperator, verbosity::Reporter};

/// Tolerance and iteration budget of one linear solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverParam {
    /// Relative residual target `‖b − A x‖ / ‖b‖`.
    pub tol: f64,
    pub maxiter: usize,
    /// Start from the content of `x` instead of zero.
    pub use_init_guess: bool,
}

impl SolverParam {
    pub fn new(tol: f64, maxiter: usize) -> Self {
        Self {
            tol,
            maxiter,
            use_init_guess: false,
        }
    }

    pub fn with_init_guess(mut self) -> Self {
        self.use_init_guess = true;
        self
    }
}

/// Summary of a finished linear solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverOutcome {
    pub converged: bool,
    pub iterations: usize,
    /// Final relative residual.
    pub residual: f64,
}

/// A linear solver for `A x = b`.
///
/// Non-convergence within the iteration budget is not an error: the best
/// iterate is left in `x` and the outcome reports `converged = false`.
pub trait KrylovSolver {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        x: &mut SpinorField,
        b: &SpinorField,
        param: &SolverParam,
        reporter: &Reporter,
    ) -> Result<SolverOutcome, Error>;
}

impl<S: KrylovSolver + ?Sized> KrylovSolver for &S {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        x: &mut SpinorField,
        b: &SpinorField,
        param: &SolverParam,
        reporter: &Reporter,
    ) -> Result<SolverOutcome, Error> {
        (**self).solve(op, x, b, param, reporter)
    }
}

/// Smallest magnitude accepted for a Krylov denominator before the iteration is
/// declared broken down.
#[inline]
pub(crate) fn breakdown_tolerance() -> f64 {
    f64::EPSILON * f64::EPSILON
}
