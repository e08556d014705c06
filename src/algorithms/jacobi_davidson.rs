//! Jacobi-Davidson eigensolver for the smallest eigenpairs of a Hermitian operator.
//!
//! ** NOTE: We recommend using the high-level method [`crate::solvers::eigensolve`]
//! instead. This module is intended for callers that need the solver object itself,
//! e.g. to reuse one configuration on several starting vectors.
//!
//! Each iteration expands the search space `V` by one vector, projects the
//! operator onto it (`H = V† A V`) and extracts the Ritz pair at the current
//! position `loopr` in ascending order. Ritz pairs whose residual drops below the
//! tolerance are locked one after the other. When `V` reaches `m_max` vectors it
//! is shrunk to the `m_min` best unlocked Ritz vectors. The next expansion vector
//! comes from an approximate solve of the correction equation
//!
//! ```text
//! (I − Q Q†)(A − θ I)(I − Q Q†) t = −r,     Q = [locked eigenvectors, u]
//! ```
//!
//! delegated to [`ProjectedCorrection::invert_proj_mat`].

use super::{
    SolverParam,
    correction::ProjectedCorrection,
    gcr::Gcr,
    subspace::{ProjectedMatrix, SearchSpace, orthogonalize},
};
use crate::{
    config::{EigenParam, Spectrum},
    error::{Error, ErrorKind},
    field::SpinorField,
    matrix::LinearOperator,
    utils::{
        eigvec_io::{load_eigenpairs, save_eigenpairs},
        perf::PerfReport,
    },
    verbosity::Reporter,
};
use faer::{ColRef, c64};
use std::time::Instant;

/// Random directions tried when an expansion vector collapses before giving up.
const MAX_RANDOM_EXPANSIONS: u64 = 8;

/// Eigenpairs returned by the solver, in ascending order of eigenvalue.
#[derive(Clone, Debug)]
pub struct EigenResult {
    pub evals: Vec<f64>,
    pub evecs: Vec<SpinorField>,
    /// `‖A v − λ v‖` of each pair.
    pub residuals: Vec<f64>,
    /// True if all requested eigenpairs converged.
    pub converged: bool,
    pub restarts: usize,
    pub iterations: usize,
    pub perf: PerfReport,
}

/// Jacobi-Davidson eigensolver bound to one operator and parameter set.
pub struct JacobiDavidson<'a> {
    op: &'a dyn LinearOperator,
    param: EigenParam,
    reporter: Reporter,
}

impl<'a> JacobiDavidson<'a> {
    /// Fails for any spectrum other than [`Spectrum::SmallestReal`] and for
    /// inconsistent parameters.
    pub fn new(op: &'a dyn LinearOperator, param: EigenParam) -> Result<Self, Error> {
        if param.spectrum != Spectrum::SmallestReal {
            return Err(ErrorKind::UnsupportedSpectrum(param.spectrum).into());
        }
        param.validate()?;
        let reporter = Reporter::new(param.verbosity);
        Ok(Self {
            op,
            param,
            reporter,
        })
    }

    pub fn param(&self) -> &EigenParam {
        &self.param
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Computes `n_conv` eigenpairs starting from `initial`.
    ///
    /// A zero `initial` vector is replaced by a seeded random field. If the
    /// restart budget runs out, the converged subset is returned with
    /// `converged = false`, or [`ErrorKind::NotConverged`] is raised when
    /// `require_convergence` is set.
    pub fn solve(&self, initial: &SpinorField) -> Result<EigenResult, Error> {
        let start = Instant::now();
        let p = &self.param;

        if let Some(path) = &p.vec_infile {
            let (_, evecs) = load_eigenpairs(path, initial.geometry())?;
            self.reporter.summarize(format_args!(
                "Loaded {} eigenvectors from {}",
                evecs.len(),
                path.display()
            ));
            let converged = evecs.len() >= p.n_conv;
            return self.finish(evecs, converged, 0, 0, start);
        }

        let geometry = initial.geometry().clone();
        let mut t = initial.clone();
        if t.norm2() == 0.0 {
            self.reporter.warn(format_args!(
                "Initial guess is the zero vector, starting from a random field"
            ));
            t = SpinorField::random(&geometry, p.seed);
        }
        let mut next_seed = p.seed.wrapping_add(1);

        let mut space = SearchSpace::new(p.m_max);
        let mut h = ProjectedMatrix::new(p.m_max);
        let mut locked: Vec<SpinorField> = Vec::with_capacity(p.n_conv);

        let mut u = SpinorField::zeros(&geometry);
        let mut r = SpinorField::zeros(&geometry);
        let mut scratch = SpinorField::zeros(&geometry);

        let correction = ProjectedCorrection::new(
            self.op,
            SolverParam::new(p.corr_eq_tol, p.corr_eq_maxiter),
            &self.reporter,
        );
        let precon_param = SolverParam::new(p.precon_tol, p.precon_maxiter);

        let mut loopr = 0;
        let mut restart_iter = 0;
        let mut iter = 0;
        let mut converged = false;

        while restart_iter < p.max_restarts {
            // Expand the search space.
            let mut expansion = None;
            for mut candidate in [t, r.clone()] {
                if let Some(norm) = orthonormal_complement(&mut candidate, &locked, space.basis()) {
                    candidate.ax(1.0 / norm);
                    expansion = Some(candidate);
                    break;
                }
            }
            if expansion.is_none() {
                for _ in 0..MAX_RANDOM_EXPANSIONS {
                    let mut candidate = SpinorField::random(&geometry, next_seed);
                    next_seed = next_seed.wrapping_add(1);
                    if let Some(norm) =
                        orthonormal_complement(&mut candidate, &locked, space.basis())
                    {
                        candidate.ax(1.0 / norm);
                        expansion = Some(candidate);
                        break;
                    }
                }
                self.reporter.verbose(format_args!(
                    "JD: expansion vector collapsed, falling back to a random direction"
                ));
            }
            let Some(expansion) = expansion else {
                return Err(ErrorKind::InvalidParameter(format!(
                    "search space of {} vectors with {} locked cannot be expanded",
                    space.len(),
                    locked.len()
                ))
                .into());
            };
            space.push(self.op, expansion)?;
            h.grow(&space);

            // Rayleigh-Ritz on the grown space.
            let pairs = h.ritz_pairs()?;
            let mut theta = pairs[loopr].value;
            let mut r_norm =
                ritz_residual(&space, pairs[loopr].coeffs.as_ref(), theta, &mut u, &mut r);

            let mut exhausted = false;
            while r_norm < p.tol {
                locked.push(u.clone());
                self.reporter.verbose(format_args!(
                    "JD: eigenpair {} converged, theta = {theta:e}, |r| = {r_norm:e}",
                    locked.len() - 1
                ));
                if locked.len() >= p.n_conv {
                    converged = true;
                    break;
                }
                loopr += 1;
                if loopr >= space.len() {
                    exhausted = true;
                    break;
                }
                theta = pairs[loopr].value;
                r_norm =
                    ritz_residual(&space, pairs[loopr].coeffs.as_ref(), theta, &mut u, &mut r);
            }
            if converged {
                break;
            }
            if exhausted {
                // Every Ritz vector of V is locked: start over in the complement.
                space.clear();
                h.reset_diagonal(&[]);
                loopr = 0;
                restart_iter += 1;
                self.reporter.summarize(format_args!(
                    "JD: RESTART (#{restart_iter}), whole search space locked, \
                     continuing from a random direction"
                ));
                t = SpinorField::random(&geometry, next_seed);
                next_seed = next_seed.wrapping_add(1);
                r.zero();
                continue;
            }

            if space.is_full() {
                let keep = p.m_min.min(space.len() - loopr);
                let mut vectors = Vec::with_capacity(keep);
                let mut values = Vec::with_capacity(keep);
                vectors.push(u.clone());
                values.push(theta);
                for pair in &pairs[loopr + 1..loopr + keep] {
                    space.lift(pair.coeffs.as_ref(), &mut scratch);
                    vectors.push(scratch.clone());
                    values.push(pair.value);
                }
                space.replace(self.op, vectors)?;
                h.reset_diagonal(&values);
                loopr = 0;
                restart_iter += 1;
                theta = values[0];
                self.reporter.summarize(format_args!(
                    "JD: RESTART (#{restart_iter}) keeping {keep} vectors, theta = {theta:e}"
                ));
            }

            // Solve the correction equation for the next expansion vector.
            let mut q = Vec::with_capacity(locked.len() + 1);
            q.extend(locked.iter().cloned());
            q.push(u.clone());
            correction.set_projection(theta, q)?;
            let mut correction_vector = SpinorField::zeros(&geometry);
            correction.invert_proj_mat(&Gcr, &mut correction_vector, &r, &precon_param)?;
            t = correction_vector;
            iter += 1;

            self.reporter.summarize(format_args!(
                "JD: iteration {iter}, m = {}, k = {}, theta = {theta:e}, |r| = {r_norm:e}",
                space.len(),
                locked.len()
            ));
        }

        if converged {
            self.reporter.summarize(format_args!(
                "JD: {} eigenpairs converged after {restart_iter} restarts and {iter} iterations",
                locked.len()
            ));
        } else {
            let err = Error::from(ErrorKind::NotConverged {
                requested: p.n_conv,
                converged: locked.len(),
                m_min: p.m_min,
                m_max: p.m_max,
                max_restarts: p.max_restarts,
            });
            if p.require_convergence {
                return Err(err);
            }
            self.reporter.warn(format_args!("{err}"));
        }

        self.finish(locked, converged, restart_iter, iter, start)
    }

    /// Recomputes eigenvalues and residuals, sorts and optionally saves.
    fn finish(
        &self,
        evecs: Vec<SpinorField>,
        converged: bool,
        restarts: usize,
        iterations: usize,
        start: Instant,
    ) -> Result<EigenResult, Error> {
        let (evals, residuals) = compute_evals(self.op, &evecs)?;
        let mut order: Vec<usize> = (0..evecs.len()).collect();
        order.sort_by(|&a, &b| evals[a].total_cmp(&evals[b]));

        let mut slots: Vec<Option<SpinorField>> = evecs.into_iter().map(Some).collect();
        let evecs: Vec<SpinorField> = order.iter().filter_map(|&i| slots[i].take()).collect();
        let evals: Vec<f64> = order.iter().map(|&i| evals[i]).collect();
        let residuals: Vec<f64> = order.iter().map(|&i| residuals[i]).collect();

        for (i, (lambda, res)) in evals.iter().zip(&residuals).enumerate() {
            self.reporter.summarize(format_args!(
                "Eval[{i:04}] = {lambda:+.16e}, residual = {res:+.16e}"
            ));
        }

        if let Some(path) = &self.param.vec_outfile {
            save_eigenpairs(path, &evals, &evecs)?;
            self.reporter.summarize(format_args!(
                "Saved {} eigenpairs to {}",
                evecs.len(),
                path.display()
            ));
        }

        let perf = PerfReport::new(self.op.flops(), start.elapsed());
        self.reporter.verbose(format_args!("JD: {perf}"));

        Ok(EigenResult {
            evals,
            evecs,
            residuals,
            converged,
            restarts,
            iterations,
            perf,
        })
    }
}

/// Orthogonalises `t` against the locked vectors and then the search space.
/// Returns the remaining norm, or `None` if `t` collapsed.
fn orthonormal_complement(
    t: &mut SpinorField,
    locked: &[SpinorField],
    basis: &[SpinorField],
) -> Option<f64> {
    orthogonalize(t, locked)?;
    orthogonalize(t, basis)
}

/// Lifts a Ritz vector into `u` and writes `r = A u − θ u`, using the cached
/// images `V_A`. Returns `‖r‖`.
fn ritz_residual(
    space: &SearchSpace,
    coeffs: ColRef<'_, c64>,
    theta: f64,
    u: &mut SpinorField,
    r: &mut SpinorField,
) -> f64 {
    space.lift(coeffs, u);
    r.zero();
    r.caxpy_block(coeffs, space.images());
    r.axpy(-theta, u);
    r.norm()
}

/// Rayleigh quotients `λ_i = ⟨v_i, A v_i⟩ / ⟨v_i, v_i⟩` and residuals
/// `‖A v_i − λ_i v_i‖`, in the order of `vecs`.
pub fn compute_evals(
    op: &dyn LinearOperator,
    vecs: &[SpinorField],
) -> Result<(Vec<f64>, Vec<f64>), Error> {
    let mut evals = Vec::with_capacity(vecs.len());
    let mut residuals = Vec::with_capacity(vecs.len());
    for v in vecs {
        let mut av = SpinorField::zeros(v.geometry());
        op.apply(&mut av, v)?;
        let lambda = v.c_dot(&av).re / v.norm2();
        av.axpy(-lambda, v);
        evals.push(lambda);
        residuals.push(av.norm());
    }
    Ok((evals, residuals))
}
