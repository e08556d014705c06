//! This module defines the core abstraction for linear operators.
//!
//! Krylov solvers and the Jacobi-Davidson eigensolver never look inside the
//! operator they act on: their only access is the operator-field product. Any
//! object that can compute this product, be it a Dirac operator, its normal
//! form, a projected correction operator or a small dense matrix, implements the
//! [`LinearOperator`] trait and can be handed to the same algorithm.
//!
//! This "matrix-free" approach keeps the algorithms generic. It also keeps them
//! testable: a [`DenseOperator`] with a known spectrum stands in for a lattice
//! operator in unit tests, and the same code then runs unchanged on the
//! Kähler-Dirac operator.
//!
//! Operators may carry an additive spectral shift `σ`, so that they apply
//! `A + σ I`. Algorithms that need to shift an operator temporarily do so with a
//! [`ShiftGuard`], which restores the previous shift when dropped on every exit
//! path.

use crate::{
    error::{Error, ErrorKind},
    field::{FieldGeometry, SpinorField},
};
use faer::{Accum, Mat, Par, c64, linalg::matmul::matmul};
use std::cell::Cell;

/// Represents a linear operator that can be applied to a field.
///
/// # Example
///
/// ```
/// use faer::{Mat, c64};
/// use kd_jacdav::field::{FieldGeometry, SpinorField};
/// use kd_jacdav::matrix::{DenseOperator, LinearOperator};
///
/// let a = DenseOperator::new(Mat::from_fn(2, 2, |i, j| {
///     if i == j { c64::new(2.0, 0.0) } else { c64::new(0.0, 0.0) }
/// }));
/// let x = SpinorField::random(&FieldGeometry::flat(2), 1);
/// let mut y = SpinorField::zeros(&FieldGeometry::flat(2));
/// a.apply(&mut y, &x).unwrap();
/// assert!((y.norm2() - 4.0 * x.norm2()).abs() < 1e-12);
/// ```
pub trait LinearOperator {
    /// Computes `out = (A + σ I) input`.
    fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error>;

    /// The additive shift `σ` currently applied.
    fn shift(&self) -> f64 {
        0.0
    }

    /// Sets the additive shift `σ`.
    ///
    /// Operators without a shift return [`ErrorKind::ShiftUnsupported`].
    fn set_shift(&self, _shift: f64) -> Result<(), Error> {
        Err(ErrorKind::ShiftUnsupported.into())
    }

    /// Floating-point operations performed since the last call (read and reset).
    fn flops(&self) -> u64 {
        0
    }
}

impl<T: LinearOperator + ?Sized> LinearOperator for &T {
    #[inline]
    fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        (**self).apply(out, input)
    }

    #[inline]
    fn shift(&self) -> f64 {
        (**self).shift()
    }

    #[inline]
    fn set_shift(&self, shift: f64) -> Result<(), Error> {
        (**self).set_shift(shift)
    }

    #[inline]
    fn flops(&self) -> u64 {
        (**self).flops()
    }
}

/// Temporarily adds `delta` to an operator's shift; the previous shift is
/// restored on drop.
#[must_use = "the shift is reverted as soon as the guard is dropped"]
pub struct ShiftGuard<'a> {
    op: &'a dyn LinearOperator,
    previous: f64,
}

impl<'a> ShiftGuard<'a> {
    pub fn new(op: &'a dyn LinearOperator, delta: f64) -> Result<Self, Error> {
        let previous = op.shift();
        op.set_shift(previous + delta)?;
        Ok(Self { op, previous })
    }
}

impl Drop for ShiftGuard<'_> {
    fn drop(&mut self) {
        // Setting a shift on an operator that already accepted one cannot fail.
        let _ = self.op.set_shift(self.previous);
    }
}

/// A dense complex matrix acting on flat fields.
///
/// Used for small problems and as a ground-truth operator in tests.
#[derive(Clone, Debug)]
pub struct DenseOperator {
    mat: Mat<c64>,
    shift: Cell<f64>,
}

impl DenseOperator {
    pub fn new(mat: Mat<c64>) -> Self {
        Self {
            mat,
            shift: Cell::new(0.0),
        }
    }

    /// Builds a real symmetric tridiagonal operator with constant diagonal and
    /// off-diagonal, e.g. the 1D Laplacian `(2, −1)`.
    pub fn tridiagonal(n: usize, diag: f64, off: f64) -> Self {
        Self::new(Mat::from_fn(n, n, |i, j| {
            if i == j {
                c64::new(diag, 0.0)
            } else if i.abs_diff(j) == 1 {
                c64::new(off, 0.0)
            } else {
                c64::new(0.0, 0.0)
            }
        }))
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.mat.nrows()
    }

    pub fn matrix(&self) -> &Mat<c64> {
        &self.mat
    }

    /// Geometry of the fields this operator acts on.
    pub fn geometry(&self) -> FieldGeometry {
        FieldGeometry::flat(self.dim())
    }
}

impl LinearOperator for DenseOperator {
    fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        let n = self.dim();
        for len in [input.len(), out.len()] {
            if len != n {
                return Err(ErrorKind::LengthMismatch {
                    expected: n,
                    actual: len,
                }
                .into());
            }
        }
        matmul(
            out.as_mat_mut(),
            Accum::Replace,
            self.mat.as_ref(),
            input.as_mat(),
            c64::new(1.0, 0.0),
            Par::Seq,
        );
        let shift = self.shift.get();
        if shift != 0.0 {
            out.axpy(shift, input);
        }
        Ok(())
    }

    fn shift(&self) -> f64 {
        self.shift.get()
    }

    fn set_shift(&self, shift: f64) -> Result<(), Error> {
        self.shift.set(shift);
        Ok(())
    }
}

// Unit tests to verify the operator seam and its shift handling.
#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;

    impl LinearOperator for Identity {
        fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
            out.copy_from(input);
            Ok(())
        }
    }

    #[test]
    fn test_dense_operator_matches_manual_product() {
        let op = DenseOperator::tridiagonal(3, 2.0, -1.0);
        let g = op.geometry();
        let x = SpinorField::from_vec(
            &g,
            vec![c64::new(1.0, 0.0), c64::new(2.0, 0.0), c64::new(3.0, 0.0)],
        )
        .unwrap();
        let mut y = SpinorField::zeros(&g);
        op.apply(&mut y, &x).unwrap();
        let expected = [0.0, 0.0, 4.0];
        for (yi, e) in y.as_slice().iter().zip(expected) {
            assert!((yi.re - e).abs() < 1e-14 && yi.im.abs() < 1e-14);
        }
    }

    #[test]
    fn test_dense_apply_matches_matrix_product_with_shift() {
        let mat = Mat::from_fn(5, 5, |i, j| c64::new((i + 2 * j) as f64, i as f64 - j as f64));
        let op = DenseOperator::new(mat);
        let g = op.geometry();
        let x = SpinorField::random(&g, 3);
        op.set_shift(0.25).unwrap();
        let mut y = SpinorField::zeros(&g);
        op.apply(&mut y, &x).unwrap();

        let expected = op.matrix() * x.as_mat();
        y.axpy(-0.25, &x);
        assert!((y.as_mat() - &expected).norm_l2() < 1e-12);
    }

    #[test]
    fn test_shift_guard_restores_shift() {
        let op = DenseOperator::tridiagonal(4, 2.0, -1.0);
        op.set_shift(0.5).unwrap();
        {
            let _guard = ShiftGuard::new(&op, -1.5).unwrap();
            assert_eq!(op.shift(), -1.0);
        }
        assert_eq!(op.shift(), 0.5);
    }

    #[test]
    fn test_shift_is_applied() {
        let op = DenseOperator::tridiagonal(4, 2.0, 0.0);
        let g = op.geometry();
        let x = SpinorField::random(&g, 5);
        let mut y = SpinorField::zeros(&g);
        let _guard = ShiftGuard::new(&op, -2.0).unwrap();
        op.apply(&mut y, &x).unwrap();
        assert!(y.norm2() < 1e-28);
    }

    #[test]
    fn test_shift_unsupported() {
        let err = ShiftGuard::new(&Identity, 1.0).err().unwrap();
        assert!(matches!(err.kind(), ErrorKind::ShiftUnsupported));
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let op = DenseOperator::tridiagonal(2, 1.0, 0.0);
        let x = SpinorField::zeros(&FieldGeometry::flat(3));
        let mut y = SpinorField::zeros(&FieldGeometry::flat(2));
        let err = op.apply(&mut y, &x).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::LengthMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }
}
