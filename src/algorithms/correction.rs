//! The projected correction operator of the Jacobi-Davidson iteration.
//!
//! Given a projection basis `Q` (the locked eigenvectors plus the current Ritz
//! vector `u`) and the Ritz value `θ`, the operator acts as
//!
//! ```text
//! P K⁻¹ (A − θ I),     P = I − Qhat M⁻¹ Q†,   Qhat = K⁻¹ Q,   M = Q† Qhat
//! ```
//!
//! where `K⁻¹` is an approximate inverse of `A − θ I` obtained from a few
//! iterations of an inner Krylov solver. Every output satisfies `Q† out = 0`.
//! The outer GCR solve of [`ProjectedCorrection::invert_proj_mat`] runs on this
//! operator, so the correction it returns is confined to the complement of `Q`.

use super::{KrylovSolver, SolverOutcome, SolverParam, cg::Cg};
use crate::{
    error::{Error, ErrorKind},
    field::SpinorField,
    matrix::{LinearOperator, ShiftGuard},
    verbosity::{Reporter, Verbosity},
};
use faer::{Mat, Scale, c64, prelude::*};
use std::cell::{Cell, RefCell};

/// Projection data fixed between two calls of `set_projection`.
#[derive(Debug)]
struct Projection {
    theta: f64,
    q: Vec<SpinorField>,
    q_hat: Vec<SpinorField>,
    /// `M⁻¹` with `M = Q† Qhat`.
    m_inv: Mat<c64>,
}

/// `P K⁻¹ (A − θ I)` as a [`LinearOperator`].
pub struct ProjectedCorrection<'a, S: KrylovSolver = Cg> {
    op: &'a dyn LinearOperator,
    inner: S,
    inner_param: SolverParam,
    reporter: &'a Reporter,
    projection: RefCell<Projection>,
    y_hat: RefCell<Option<SpinorField>>,
    inner_solves: Cell<usize>,
}

impl<'a> ProjectedCorrection<'a, Cg> {
    /// Correction operator for `op` with a CG inner solver.
    pub fn new(
        op: &'a dyn LinearOperator,
        inner_param: SolverParam,
        reporter: &'a Reporter,
    ) -> Self {
        Self::with_solver(op, Cg, inner_param, reporter)
    }
}

impl<'a, S: KrylovSolver> ProjectedCorrection<'a, S> {
    pub fn with_solver(
        op: &'a dyn LinearOperator,
        inner: S,
        inner_param: SolverParam,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            op,
            inner,
            inner_param: inner_param.with_init_guess(),
            reporter,
            projection: RefCell::new(Projection {
                theta: 0.0,
                q: Vec::new(),
                q_hat: Vec::new(),
                m_inv: Mat::zeros(0, 0),
            }),
            y_hat: RefCell::new(None),
            inner_solves: Cell::new(0),
        }
    }

    #[inline]
    pub fn theta(&self) -> f64 {
        self.projection.borrow().theta
    }

    /// Number of vectors in the projection basis.
    #[inline]
    pub fn projection_len(&self) -> usize {
        self.projection.borrow().q.len()
    }

    /// Inner solves performed so far, including those of `set_projection`.
    #[inline]
    pub fn inner_solves(&self) -> usize {
        self.inner_solves.get()
    }

    /// Installs the shift `θ` and the projection basis `Q`.
    ///
    /// Computes `Qhat_i = K⁻¹ Q_i` (one inner solve per vector) and the inverse
    /// of the small matrix `M = Q† Qhat`.
    pub fn set_projection(&self, theta: f64, q: Vec<SpinorField>) -> Result<(), Error> {
        let k = q.len();
        let mut q_hat = Vec::with_capacity(k);
        for qi in &q {
            let mut x = SpinorField::zeros(qi.geometry());
            self.k_inverse(&mut x, qi, theta)?;
            q_hat.push(x);
        }

        let m = Mat::from_fn(k, k, |i, j| q[i].c_dot(&q_hat[j]));
        let m_inv = m.full_piv_lu().solve(&Mat::<c64>::identity(k, k));
        if !m_inv.as_ref().is_all_finite() {
            return Err(ErrorKind::InvalidParameter(format!(
                "projection matrix Q†K⁻¹Q of size {k} is singular at θ = {theta:e}"
            ))
            .into());
        }

        *self.projection.borrow_mut() = Projection {
            theta,
            q,
            q_hat,
            m_inv,
        };
        Ok(())
    }

    /// `x ≈ (A − θ I)⁻¹ b` from the inner solver, started at `x = b`.
    fn k_inverse(&self, x: &mut SpinorField, b: &SpinorField, theta: f64) -> Result<(), Error> {
        let _shift = ShiftGuard::new(self.op, -theta)?;
        let _quiet = self.reporter.push(Verbosity::Silent);
        x.copy_from(b);
        self.inner.solve(self.op, x, b, &self.inner_param, self.reporter)?;
        self.inner_solves.set(self.inner_solves.get() + 1);
        Ok(())
    }

    /// `y −= Qhat M⁻¹ Q† y`
    fn deflate(projection: &Projection, y: &mut SpinorField) {
        if projection.q.is_empty() {
            return;
        }
        let gamma = SpinorField::c_dot_block(&projection.q, y);
        let alpha = &projection.m_inv * &gamma;
        y.caxpy_block((&alpha * Scale(c64::new(-1.0, 0.0))).as_ref(), &projection.q_hat);
    }

    /// Solves the correction equation `P K⁻¹ (A − θ I) x = −P K⁻¹ b` with the
    /// `outer` solver, starting from `x = 0`.
    pub fn invert_proj_mat(
        &self,
        outer: &dyn KrylovSolver,
        x: &mut SpinorField,
        b: &SpinorField,
        outer_param: &SolverParam,
    ) -> Result<SolverOutcome, Error> {
        x.check_compatible(b)?;
        let mut r_tilde = SpinorField::zeros(b.geometry());
        {
            let projection = self.projection.borrow();
            self.k_inverse(&mut r_tilde, b, projection.theta)?;
            Self::deflate(&projection, &mut r_tilde);
        }
        r_tilde.ax(-1.0);

        x.zero();
        let param = SolverParam::new(outer_param.tol, outer_param.maxiter);
        let _quiet = self.reporter.push(Verbosity::Silent);
        outer.solve(self, x, &r_tilde, &param, self.reporter)
    }
}

impl<S: KrylovSolver> LinearOperator for ProjectedCorrection<'_, S> {
    fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        out.check_compatible(input)?;
        if input.norm2() == 0.0 {
            self.reporter.warn(format_args!(
                "Trying to apply the correction operator to a zero vector"
            ));
            out.zero();
            return Ok(());
        }

        let projection = self.projection.borrow();
        self.op.apply(out, input)?;
        out.axpy(-projection.theta, input);

        let mut scratch = self.y_hat.borrow_mut();
        if scratch.as_ref().is_some_and(|y| y.check_compatible(input).is_err()) {
            *scratch = None;
        }
        let y_hat = scratch.get_or_insert_with(|| SpinorField::zeros(input.geometry()));
        self.k_inverse(y_hat, out, projection.theta)?;
        Self::deflate(&projection, y_hat);
        out.copy_from(y_hat);
        Ok(())
    }

    fn flops(&self) -> u64 {
        self.op.flops()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algorithms::{gcr::Gcr, subspace::orthogonalize},
        field::FieldGeometry,
        matrix::DenseOperator,
    };

    /// Counts the solves it forwards to CG.
    #[derive(Default)]
    struct CountingCg {
        calls: Cell<usize>,
    }

    impl KrylovSolver for CountingCg {
        fn solve(
            &self,
            op: &dyn LinearOperator,
            x: &mut SpinorField,
            b: &SpinorField,
            param: &SolverParam,
            reporter: &Reporter,
        ) -> Result<SolverOutcome, Error> {
            self.calls.set(self.calls.get() + 1);
            Cg.solve(op, x, b, param, reporter)
        }
    }

    fn orthonormal(g: &FieldGeometry, seeds: &[u64]) -> Vec<SpinorField> {
        let mut basis: Vec<SpinorField> = Vec::new();
        for &seed in seeds {
            let mut t = SpinorField::random(g, seed);
            let norm = orthogonalize(&mut t, &basis).unwrap();
            t.ax(1.0 / norm);
            basis.push(t);
        }
        basis
    }

    #[test]
    fn zero_input_skips_inner_solve() {
        let op = DenseOperator::tridiagonal(8, 2.0, -1.0);
        let g = op.geometry();
        let reporter = Reporter::new(Verbosity::Silent);
        let corr = ProjectedCorrection::with_solver(
            &op,
            CountingCg::default(),
            SolverParam::new(1e-1, 10),
            &reporter,
        );
        corr.set_projection(0.5, orthonormal(&g, &[1])).unwrap();
        let before = corr.inner.calls.get();

        let zero = SpinorField::zeros(&g);
        let mut out = SpinorField::random(&g, 2);
        corr.apply(&mut out, &zero).unwrap();
        assert_eq!(out.norm2(), 0.0);
        assert_eq!(corr.inner.calls.get(), before);
        assert_eq!(corr.inner_solves(), before);
    }

    #[test]
    fn output_is_orthogonal_to_projection_basis() {
        let op = DenseOperator::tridiagonal(12, 2.0, -1.0);
        let g = op.geometry();
        let reporter = Reporter::new(Verbosity::Silent);
        let corr = ProjectedCorrection::new(&op, SolverParam::new(1e-1, 10), &reporter);
        let q = orthonormal(&g, &[3, 4]);
        corr.set_projection(0.3, q.clone()).unwrap();
        assert_eq!(corr.projection_len(), 2);

        let input = SpinorField::random(&g, 5);
        let mut out = SpinorField::zeros(&g);
        corr.apply(&mut out, &input).unwrap();
        assert!(out.norm() > 0.0);
        let dots = SpinorField::c_dot_block(&q, &out);
        assert!(dots.norm_max() < 1e-10 * out.norm());
        assert_eq!(op.shift(), 0.0);
    }

    #[test]
    fn correction_stays_in_complement() {
        let op = DenseOperator::tridiagonal(16, 2.0, -1.0);
        let g = op.geometry();
        let reporter = Reporter::new(Verbosity::Silent);
        let corr = ProjectedCorrection::new(&op, SolverParam::new(1e-1, 10), &reporter);
        let q = orthonormal(&g, &[7]);
        corr.set_projection(0.1, q.clone()).unwrap();

        let b = SpinorField::random(&g, 8);
        let mut x = SpinorField::random(&g, 9);
        let outcome = corr
            .invert_proj_mat(&Gcr, &mut x, &b, &SolverParam::new(1e-2, 5))
            .unwrap();
        assert!(outcome.iterations <= 5);
        assert!(x.norm() > 0.0);
        assert!(q[0].c_dot(&x).norm() < 1e-10 * x.norm());
        assert_eq!(op.shift(), 0.0);
        assert_eq!(reporter.level(), Verbosity::Silent);
    }

    #[test]
    fn reporter_level_is_restored() {
        let op = DenseOperator::tridiagonal(6, 2.0, -1.0);
        let g = op.geometry();
        let reporter = Reporter::new(Verbosity::Verbose);
        let corr = ProjectedCorrection::new(&op, SolverParam::new(1e-1, 4), &reporter);
        corr.set_projection(1.0, orthonormal(&g, &[1])).unwrap();
        let mut out = SpinorField::zeros(&g);
        corr.apply(&mut out, &SpinorField::random(&g, 2)).unwrap();
        assert_eq!(reporter.level(), Verbosity::Verbose);
    }
}
