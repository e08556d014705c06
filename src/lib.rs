//! Kähler-Dirac preconditioned staggered fermions and a Jacobi-Davidson eigensolver.
//!
//! This crate applies the staggered Dirac operator of lattice QCD, preconditioned
//! by the exact inverse of its 2⁴ hypercube blocks (the Kähler-Dirac inverse
//! `Xinv`), and extracts the lowest eigenpairs of Hermitian operators built from
//! it with the Jacobi-Davidson method.
//!
//! The algorithms are matrix-free: they see operators only through the
//! [`matrix::LinearOperator`] trait, so the same eigensolver runs on a lattice
//! operator or on a small [`matrix::DenseOperator`]. Dense linear algebra on the
//! projected problem is delegated to [`faer`].
//!
//! ## Components
//!
//! **Dirac operators** ([`dirac`]): the plain staggered operator, its
//! Kähler-Dirac block-preconditioned form with left or right ordering, and
//! dense Galerkin coarse operators. [`dirac::DiracMatrix`] exposes `M`, `M†`,
//! `M†M` or `MM†` of any of them as a linear operator with an additive shift.
//!
//! **Jacobi-Davidson** ([`solvers::eigensolve`]): expands a search space with
//! approximate solutions of the projected correction equation, solved by a
//! GCR iteration on top of a few steps of CG. Converged Ritz pairs are locked,
//! the search space is restarted between `m_min` and `m_max` vectors.
//!
//! ## Example Usage
//!
//! The following example computes the two lowest eigenvalues of `M†M` for a
//! Kähler-Dirac operator on a random `4⁴` gauge field.
//!
//! ```no_run
//! use kd_jacdav::{
//!     config::{EigenParam, KdParam},
//!     dirac::{DiracMatrix, MatrixKind, StaggeredKdDirac},
//!     field::{FieldGeometry, Precision, SpinorField},
//!     lattice::GaugeField,
//!     solvers::eigensolve,
//! };
//! use std::sync::Arc;
//!
//! let gauge = Arc::new(GaugeField::random([4, 4, 4, 4], Precision::Double, 42));
//! let kd = StaggeredKdDirac::new(gauge, &KdParam { mass: 0.05, ..Default::default() }).unwrap();
//! let mdag_m = DiracMatrix::new(&kd, MatrixKind::MdagM);
//!
//! let geometry = FieldGeometry::staggered([4, 4, 4, 4], 1, 3, Precision::Double);
//! let param = EigenParam { n_conv: 2, ..Default::default() };
//! let result = eigensolve(&mdag_m, &SpinorField::random(&geometry, 1), &param).unwrap();
//! println!("lowest eigenvalues: {:?}", result.evals);
//! ```

pub mod algorithms;
pub mod config;
pub mod dirac;
pub mod error;
pub mod field;
pub mod lattice;
pub mod matrix;
pub mod solvers;
pub mod utils;
pub mod verbosity;

pub use error::{Error, ErrorKind};
pub use solvers::{compute_evals, eigensolve};
