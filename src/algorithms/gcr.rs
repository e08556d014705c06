//! Generalized Conjugate Residual for non-Hermitian systems `A x = b`.
//!
//! Each step takes the current residual as search direction `p_k`, orthogonalises
//! `A p_k` against the previous directions and minimises the residual along it.
//! The whole Krylov history is kept, so the iteration budget also bounds the
//! memory used. No inner preconditioner is applied.

use super::{KrylovSolver, SolverOutcome, SolverParam, breakdown_tolerance};
use crate::{error::Error, field::SpinorField, matrix::LinearOperator, verbosity::Reporter};

/// Generalized Conjugate Residual solver.
#[derive(Clone, Copy, Debug, Default)]
pub struct Gcr;

impl KrylovSolver for Gcr {
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

        let mut r = SpinorField::zeros(geometry);
        if param.use_init_guess {
            op.apply(&mut r, x)?;
            r.ax(-1.0);
            r.axpy(1.0, b);
        } else {
            x.zero();
            r.copy_from(b);
        }

        let stop = param.tol * param.tol * b_norm2;
        let mut r2 = r.norm2();
        // Search directions p_i and their images q_i = A p_i, with ⟨q_i, q_j⟩ = δ_ij.
        let mut p: Vec<SpinorField> = Vec::with_capacity(param.maxiter);
        let mut q: Vec<SpinorField> = Vec::with_capacity(param.maxiter);
        let mut iterations = 0;

        while r2 >= stop && iterations < param.maxiter {
            let mut pk = r.clone();
            let mut qk = SpinorField::zeros(geometry);
            op.apply(&mut qk, &pk)?;

            for (pi, qi) in p.iter().zip(q.iter()) {
                let beta = qi.c_dot(&qk);
                qk.caxpy(-beta, qi);
                pk.caxpy(-beta, pi);
            }
            let q_norm2 = qk.norm2();
            if q_norm2 < breakdown_tolerance() * b_norm2 {
                reporter.verbose(format_args!(
                    "GCR: breakdown at iteration {iterations}, |Ap|^2 = {q_norm2:e}"
                ));
                break;
            }
            let inv = 1.0 / q_norm2.sqrt();
            qk.ax(inv);
            pk.ax(inv);

            let alpha = qk.c_dot(&r);
            x.caxpy(alpha, &pk);
            r.caxpy(-alpha, &qk);
            r2 = r.norm2();
            iterations += 1;

            reporter.debug(format_args!(
                "GCR: {iterations} iterations, |r|/|b| = {:e}",
                (r2 / b_norm2).sqrt()
            ));

            p.push(pk);
            q.push(qk);
        }

        let residual = (r2 / b_norm2).sqrt();
        let converged = r2 < stop;
        reporter.verbose(format_args!(
            "GCR: {} after {iterations} iterations, relative residual = {residual:e}",
            if converged { "Convergence" } else { "no convergence" }
        ));
        Ok(SolverOutcome {
            converged,
            iterations,
            residual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{matrix::DenseOperator, verbosity::Verbosity};
    use faer::{Mat, c64};

    #[test]
    fn solves_non_hermitian_system() {
        let n = 12;
        let op = DenseOperator::new(Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(4.0, 0.5)
            } else if j == i + 1 {
                c64::new(1.0, -1.0)
            } else if i == j + 2 {
                c64::new(-0.5, 0.0)
            } else {
                c64::new(0.0, 0.0)
            }
        }));
        let g = op.geometry();
        let b = SpinorField::random(&g, 4);
        let mut x = SpinorField::zeros(&g);
        let reporter = Reporter::new(Verbosity::Silent);
        let out = Gcr
            .solve(&op, &mut x, &b, &SolverParam::new(1e-10, n), &reporter)
            .unwrap();
        assert!(out.converged, "{out:?}");

        let mut ax = SpinorField::zeros(&g);
        op.apply(&mut ax, &x).unwrap();
        ax.axpy(-1.0, &b);
        assert!(ax.norm() / b.norm() < 1e-9);
    }

    #[test]
    fn residual_is_monotone_in_budget() {
        let op = DenseOperator::tridiagonal(40, 2.0, -1.0);
        let g = op.geometry();
        let b = SpinorField::random(&g, 8);
        let reporter = Reporter::new(Verbosity::Silent);
        let mut last = f64::INFINITY;
        for maxiter in [1, 3, 5] {
            let mut x = SpinorField::zeros(&g);
            let out = Gcr
                .solve(&op, &mut x, &b, &SolverParam::new(1e-14, maxiter), &reporter)
                .unwrap();
            assert_eq!(out.iterations, maxiter);
            assert!(out.residual <= last);
            last = out.residual;
        }
    }
}
