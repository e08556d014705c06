//! Search space and projected matrix of the Jacobi-Davidson iteration.
//!
//! The search space holds an orthonormal basis `V[0..m]` together with the
//! images `V_A[i] = A V[i]`. The projected matrix `H = V† A V` lives in a
//! fixed `m_max × m_max` buffer of which only the leading `m × m` block is
//! active; growth fills one new row and column, a restart rewrites the leading
//! block as a diagonal of Ritz values.

use crate::{
    error::{Error, ErrorKind},
    field::SpinorField,
    matrix::LinearOperator,
};
use faer::{Col, ColRef, Mat, Scale, Side, c64};

/// Orthonormal search space with cached operator images.
#[derive(Debug)]
pub struct SearchSpace {
    v: Vec<SpinorField>,
    v_a: Vec<SpinorField>,
    capacity: usize,
}

impl SearchSpace {
    pub fn new(capacity: usize) -> Self {
        Self {
            v: Vec::with_capacity(capacity),
            v_a: Vec::with_capacity(capacity),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.v.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.v.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.v.len() == self.capacity
    }

    pub fn basis(&self) -> &[SpinorField] {
        &self.v
    }

    pub fn images(&self) -> &[SpinorField] {
        &self.v_a
    }

    /// Append a normalised vector `t`, computing its image `A t`.
    pub fn push(&mut self, op: &dyn LinearOperator, t: SpinorField) -> Result<(), Error> {
        if self.is_full() {
            return Err(ErrorKind::InvalidParameter(format!(
                "search space is already at its capacity of {}",
                self.capacity
            ))
            .into());
        }
        let mut at = SpinorField::zeros(t.geometry());
        op.apply(&mut at, &t)?;
        self.v.push(t);
        self.v_a.push(at);
        Ok(())
    }

    /// Lift a coefficient vector: `Σ_j coeffs_j V_j`.
    pub fn lift(&self, coeffs: ColRef<'_, c64>, out: &mut SpinorField) {
        out.zero();
        out.caxpy_block(coeffs, &self.v);
    }

    /// Replace the basis by the given vectors and recompute every image.
    pub fn replace(
        &mut self,
        op: &dyn LinearOperator,
        vectors: Vec<SpinorField>,
    ) -> Result<(), Error> {
        self.v.clear();
        self.v_a.clear();
        for t in vectors {
            self.push(op, t)?;
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.v.clear();
        self.v_a.clear();
    }
}

/// One eigenpair of the projected matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct RitzPair {
    pub value: f64,
    /// Coefficients of the Ritz vector in the search-space basis.
    pub coeffs: Col<c64>,
}

/// Fixed-capacity Hermitian projected matrix `H = V† A V`.
#[derive(Clone, Debug)]
pub struct ProjectedMatrix {
    h: Mat<c64>,
    size: usize,
}

impl ProjectedMatrix {
    pub fn new(capacity: usize) -> Self {
        Self {
            h: Mat::zeros(capacity, capacity),
            size: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> c64 {
        self.h[(i, j)]
    }

    /// Grow by one row and column from the newest search-space vector.
    ///
    /// `H[i, m−1] = ⟨V_i, V_A[m−1]⟩`, `H[m−1, i]` is its conjugate and the
    /// diagonal entry is kept real.
    pub fn grow(&mut self, space: &SearchSpace) {
        let m = space.len();
        debug_assert_eq!(m, self.size + 1);
        let newest = &space.images()[m - 1];
        for (i, vi) in space.basis().iter().enumerate().take(m - 1) {
            let hij = vi.c_dot(newest);
            self.h[(i, m - 1)] = hij;
            self.h[(m - 1, i)] = hij.conj();
        }
        let diag = space.basis()[m - 1].c_dot(newest).re;
        self.h[(m - 1, m - 1)] = c64::new(diag, 0.0);
        self.size = m;
    }

    /// Reset the active block to `diag(values)`.
    pub fn reset_diagonal(&mut self, values: &[f64]) {
        let n = self.h.nrows();
        self.h = Mat::zeros(n, n);
        for (i, &value) in values.iter().enumerate() {
            self.h[(i, i)] = c64::new(value, 0.0);
        }
        self.size = values.len();
    }

    /// Eigenpairs of the active block in ascending order of eigenvalue.
    ///
    /// Eigenvalues are taken as Rayleigh quotients of the returned
    /// eigenvectors; the sort is stable so ties keep their decomposition order.
    pub fn ritz_pairs(&self) -> Result<Vec<RitzPair>, Error> {
        let m = self.size;
        if m == 0 {
            return Ok(Vec::new());
        }
        let active = self.h.as_ref().get(..m, ..m);
        let evd = active.self_adjoint_eigen(Side::Lower)?;
        let u = evd.U();
        let hu = active * u;

        let mut pairs: Vec<RitzPair> = (0..m)
            .map(|k| RitzPair {
                value: (u.col(k).adjoint() * hu.col(k)).re,
                coeffs: u.col(k).to_owned(),
            })
            .collect();
        pairs.sort_by(|a, b| a.value.total_cmp(&b.value));
        Ok(pairs)
    }
}

/// Relative norm below which a vector is considered to lie in the span of the basis.
pub const COLLAPSE_TOLERANCE: f64 = 1e-10;

/// Two passes of classical Gram-Schmidt of `t` against `basis`.
///
/// `t` is normalised before each pass and left unnormalised after the second.
/// Returns the norm of the result, or `None` if a pass removed all but a
/// `COLLAPSE_TOLERANCE` fraction of `t`.
pub fn orthogonalize(t: &mut SpinorField, basis: &[SpinorField]) -> Option<f64> {
    let mut norm = t.norm();
    if !(norm > 0.0 && norm.is_finite()) {
        return None;
    }
    if basis.is_empty() {
        return Some(norm);
    }
    for _pass in 0..2 {
        t.ax(1.0 / norm);
        let dots = SpinorField::c_dot_block(basis, t);
        t.caxpy_block((&dots * Scale(c64::new(-1.0, 0.0))).as_ref(), basis);
        norm = t.norm();
        if !(norm > COLLAPSE_TOLERANCE && norm.is_finite()) {
            return None;
        }
    }
    Some(norm)
}
