//! Dirac operators and their matrix wrappers.
//!
//! Three operator variants share the [`Dirac`] trait:
//!
//! - [`StaggeredDirac`]: the plain staggered operator `M = 2m − D`.
//! - [`StaggeredKdDirac`]: the staggered operator block-preconditioned by the
//!   inverse of its own 2⁴ hypercube blocks (the Kähler-Dirac inverse, `Xinv`).
//! - [`CoarseDirac`]: a dense Galerkin operator produced by coarsening one of
//!   the above through a [`Transfer`].
//!
//! A solver never calls a [`Dirac`] directly. It wraps it in a [`DiracMatrix`]
//! that selects `M`, `M†`, `M†M` or `MM†` and carries an additive shift, and
//! then uses it through the [`LinearOperator`] seam.

pub mod coarse;
pub mod kahler_dirac;
pub mod kd_inverse;
pub mod staggered;

pub use coarse::{CoarseDirac, Transfer, TransferType};
pub use kahler_dirac::{StaggeredKdDirac, Xinv};
pub use kd_inverse::KdInverse;
pub use staggered::StaggeredDirac;

use crate::{config::SolutionType, error::Error, field::SpinorField, matrix::LinearOperator};
use std::cell::Cell;

/// Whether an operator or its Hermitian conjugate is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dagger {
    No,
    Yes,
}

impl Dagger {
    #[inline]
    pub fn flip(self) -> Self {
        match self {
            Dagger::No => Dagger::Yes,
            Dagger::Yes => Dagger::No,
        }
    }
}

/// The operator variant behind a `dyn Dirac`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiracKind {
    Plain,
    KahlerDirac,
    Coarse,
}

/// Interface shared by every Dirac operator variant.
pub trait Dirac {
    fn kind(&self) -> DiracKind;

    /// Bare quark mass.
    fn mass(&self) -> f64;

    /// `out = M in` or `out = M† in`.
    fn apply(&self, out: &mut SpinorField, input: &SpinorField, dagger: Dagger)
    -> Result<(), Error>;

    fn m(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        self.apply(out, input, Dagger::No)
    }

    fn mdag(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        self.apply(out, input, Dagger::Yes)
    }

    fn mdag_m(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        let mut tmp = SpinorField::zeros(input.geometry());
        self.m(&mut tmp, input)?;
        self.mdag(out, &tmp)
    }

    fn m_mdag(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        let mut tmp = SpinorField::zeros(input.geometry());
        self.mdag(&mut tmp, input)?;
        self.m(out, &tmp)
    }

    /// Transform the system `x, b` before a solve of the given solution type.
    fn prepare(
        &self,
        _x: &mut SpinorField,
        _b: &mut SpinorField,
        _solution: SolutionType,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Undo [`prepare`](Dirac::prepare) on the solution.
    fn reconstruct(
        &self,
        _x: &mut SpinorField,
        _b: &SpinorField,
        _solution: SolutionType,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// Preparation used when this operator is a multigrid smoother level.
    fn prepare_special_mg(
        &self,
        x: &mut SpinorField,
        b: &mut SpinorField,
        solution: SolutionType,
    ) -> Result<(), Error> {
        self.prepare(x, b, solution)
    }

    fn reconstruct_special_mg(
        &self,
        x: &mut SpinorField,
        b: &SpinorField,
        solution: SolutionType,
    ) -> Result<(), Error> {
        self.reconstruct(x, b, solution)
    }

    /// Build the Galerkin coarse operator `P† A P` for the given transfer.
    fn create_coarse_op(&self, transfer: &Transfer) -> Result<CoarseDirac, Error>;

    /// Floating-point operations since the last call; the counter is reset.
    fn flops(&self) -> u64;
}

/// Which product of a Dirac operator a [`DiracMatrix`] applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    M,
    Mdag,
    MdagM,
    MMdag,
}

/// A Dirac operator product exposed as a [`LinearOperator`] with an additive shift.
pub struct DiracMatrix<'d> {
    dirac: &'d dyn Dirac,
    kind: MatrixKind,
    shift: Cell<f64>,
}

impl<'d> DiracMatrix<'d> {
    pub fn new(dirac: &'d dyn Dirac, kind: MatrixKind) -> Self {
        Self {
            dirac,
            kind,
            shift: Cell::new(0.0),
        }
    }

    pub fn dirac(&self) -> &'d dyn Dirac {
        self.dirac
    }

    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    /// True for the Hermitian products `M†M` and `MM†`.
    pub fn is_hermitian(&self) -> bool {
        matches!(self.kind, MatrixKind::MdagM | MatrixKind::MMdag)
    }
}

impl LinearOperator for DiracMatrix<'_> {
    fn apply(&self, out: &mut SpinorField, input: &SpinorField) -> Result<(), Error> {
        match self.kind {
            MatrixKind::M => self.dirac.m(out, input)?,
            MatrixKind::Mdag => self.dirac.mdag(out, input)?,
            MatrixKind::MdagM => self.dirac.mdag_m(out, input)?,
            MatrixKind::MMdag => self.dirac.m_mdag(out, input)?,
        }
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

    fn flops(&self) -> u64 {
        self.dirac.flops()
    }
}
