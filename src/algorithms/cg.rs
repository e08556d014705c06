//! Conjugate Gradient for Hermitian systems `A x = b`.
//!
//! Standard CG with the relative residual criterion `‖r‖² < tol² ‖b‖²`. The
//! correction equation hands it the shifted operator `A − θ I`, which may be
//! indefinite; a vanishing `⟨p, A p⟩` stops the iteration and leaves the
//! current iterate in `x` instead of raising an error.

use super::{KrylovSolver, SolverOutcome, SolverParam, breakdown_tolerance};
use crate::{error::Error, field::SpinorField, matrix::LinearOperator, verbosity::Reporter};

/// Conjugate Gradient solver.
#[derive(Clone, Copy, Debug, Default)]
pub struct Cg;

impl KrylovSolver for Cg {
    fn solve(
        &self,
        op: &dyn LinearOperator,
        x: &mut SpinorField,
        b: &SpinorField,
        param: &SolverParam,
        reporter: &Reporter,
    ) -> Result<SolverOutcome, Error> {
        x.check_compatible(b)?;
        let geometry = b.geometry();

        let b_norm2 = b.norm2();
        if b_norm2 == 0.0 {
            x.zero();
            return Ok(SolverOutcome {
                converged: true,
                iterations: 0,
                residual: 0.0,
            });
        }

        // r = b - A x
        let mut r = SpinorField::zeros(geometry);
        if param.use_init_guess {
            op.apply(&mut r, x)?;
            r.ax(-1.0);
            r.axpy(1.0, b);
        } else {
            x.zero();
            r.copy_from(b);
        }

        let mut r2 = r.norm2();
        let stop = param.tol * param.tol * b_norm2;
        let mut p = r.clone();
        let mut ap = SpinorField::zeros(geometry);
        let mut iterations = 0;

        while r2 >= stop && iterations < param.maxiter {
            op.apply(&mut ap, &p)?;
            let p_ap = p.c_dot(&ap).re;
            if p_ap.abs() < breakdown_tolerance() * b_norm2 {
                reporter.verbose(format_args!(
                    "CG: breakdown at iteration {iterations}, <p|Ap> = {p_ap:e}"
                ));
                break;
            }
            let alpha = r2 / p_ap;
            x.axpy(alpha, &p);
            r.axpy(-alpha, &ap);
            let r2_new = r.norm2();
            iterations += 1;

            reporter.debug(format_args!(
                "CG: {iterations} iterations, <r,r> = {r2_new:e}, |r|/|b| = {:e}",
                (r2_new / b_norm2).sqrt()
            ));

            let beta = r2_new / r2;
            r2 = r2_new;
            // p = r + beta p
            p.ax(beta);
            p.axpy(1.0, &r);
        }

        let residual = (r2 / b_norm2).sqrt();
        let converged = r2 < stop;
        if converged {
            reporter.verbose(format_args!(
                "CG: Convergence at {iterations} iterations, relative residual = {residual:e}"
            ));
        } else {
            reporter.verbose(format_args!(
                "CG: no convergence after {iterations} iterations, relative residual = {residual:e}"
            ));
        }
        Ok(SolverOutcome {
            converged,
            iterations,
            residual,
        })
    }
}
