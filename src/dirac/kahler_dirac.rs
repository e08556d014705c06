//! Kähler-Dirac block-preconditioned staggered operator.
//!
//! The operator multiplies the staggered operator `M` by `Xinv`, the inverse of
//! its 2⁴ hypercube blocks. With left block preconditioning (the default) it
//! applies `Xinv · M`, with right block preconditioning `M · Xinv`:
//!
//! | preconditioning | `apply`     | `apply` with dagger |
//! |-----------------|-------------|---------------------|
//! | left            | `Xinv · M`  | `M† · Xinv†`        |
//! | right           | `M · Xinv`  | `Xinv† · M†`        |
//!
//! The operator either owns its `Xinv` or borrows it from another operator
//! built on the same gauge field (see [`StaggeredKdDirac::share`]).

use super::{
    CoarseDirac, Dagger, Dirac, DiracKind, KdInverse, StaggeredDirac, Transfer, coarse,
    kd_inverse::xinv_flops, staggered::check_full_spinor,
};
use crate::{
    config::{BlockPreconditioning, KdParam, SolutionType},
    error::{Error, ErrorKind},
    field::{Precision, SpinorField},
    lattice::GaugeField,
};
use std::sync::Arc;

/// Ownership of the block inverse.
#[derive(Debug)]
pub enum Xinv<'a> {
    Owned(KdInverse),
    Borrowed(&'a KdInverse),
}

impl Xinv<'_> {
    #[inline]
    pub fn get(&self) -> &KdInverse {
        match self {
            Xinv::Owned(x) => x,
            Xinv::Borrowed(x) => *x,
        }
    }
}

/// The staggered operator preconditioned by its Kähler-Dirac block inverse.
#[derive(Debug)]
pub struct StaggeredKdDirac<'a> {
    base: StaggeredDirac,
    xinv: Xinv<'a>,
    xinv_precision: Option<Precision>,
    preconditioning: BlockPreconditioning,
}

impl StaggeredKdDirac<'static> {
    /// Build the operator and its block inverse from a gauge field.
    pub fn new(gauge: Arc<GaugeField>, param: &KdParam) -> Result<Self, Error> {
        let base = StaggeredDirac::new(gauge, param.mass);
        Self::from_staggered(&base, param.xinv_precision, param.block_preconditioning)
    }

    /// Build from an existing staggered operator, sharing its gauge field.
    pub fn from_staggered(
        base: &StaggeredDirac,
        xinv_precision: Option<Precision>,
        preconditioning: BlockPreconditioning,
    ) -> Result<Self, Error> {
        let xinv = KdInverse::build(base.gauge(), base.mass(), xinv_precision)?;
        Ok(Self {
            base: base.clone(),
            xinv: Xinv::Owned(xinv),
            xinv_precision,
            preconditioning,
        })
    }
}

impl<'a> StaggeredKdDirac<'a> {
    /// A second operator on the same gauge field that borrows this one's `Xinv`.
    pub fn share(&self) -> StaggeredKdDirac<'_> {
        StaggeredKdDirac {
            base: self.base.clone(),
            xinv: Xinv::Borrowed(self.xinv.get()),
            xinv_precision: self.xinv_precision,
            preconditioning: self.preconditioning,
        }
    }

    pub fn owns_xinv(&self) -> bool {
        matches!(self.xinv, Xinv::Owned(_))
    }

    pub fn xinv(&self) -> &KdInverse {
        self.xinv.get()
    }

    pub fn preconditioning(&self) -> BlockPreconditioning {
        self.preconditioning
    }

    /// The underlying staggered operator `M`.
    pub fn staggered(&self) -> &StaggeredDirac {
        &self.base
    }

    /// Install a new gauge field and rebuild `Xinv`.
    ///
    /// An operator that borrowed its `Xinv` owns the rebuilt one afterwards.
    pub fn update_fields(&mut self, gauge: Arc<GaugeField>) -> Result<(), Error> {
        let xinv = KdInverse::build(&gauge, self.base.mass(), self.xinv_precision)?;
        self.base.update_fields(gauge);
        self.xinv = Xinv::Owned(xinv);
        Ok(())
    }

    /// Applies only the block inverse: `out = Xinv in` (or `Xinv† in`).
    pub fn kahler_dirac_inv(
        &self,
        out: &mut SpinorField,
        input: &SpinorField,
        dagger: Dagger,
    ) -> Result<(), Error> {
        self.xinv.get().apply(out, input, dagger)?;
        self.base
            .add_flops(xinv_flops(input.geometry().volume() as u64));
        Ok(())
    }

    fn check_solution_type(solution: SolutionType) -> Result<(), Error> {
        if solution.is_preconditioned() {
            return Err(ErrorKind::IncompatibleSolution(solution).into());
        }
        Ok(())
    }
}

impl Dirac for StaggeredKdDirac<'_> {
    fn kind(&self) -> DiracKind {
        DiracKind::KahlerDirac
    }

    fn mass(&self) -> f64 {
        self.base.mass()
    }

    fn apply(
        &self,
        out: &mut SpinorField,
        input: &SpinorField,
        dagger: Dagger,
    ) -> Result<(), Error> {
        check_full_spinor(out, input, self.base.gauge())?;
        let mut tmp = SpinorField::zeros(input.geometry());
        let xinv_first = matches!(
            (self.preconditioning, dagger),
            (BlockPreconditioning::Left, Dagger::Yes) | (BlockPreconditioning::Right, Dagger::No)
        );
        if xinv_first {
            self.kahler_dirac_inv(&mut tmp, input, dagger)?;
            self.base.apply_unchecked(out, &tmp, dagger);
        } else {
            self.base.apply_unchecked(&mut tmp, input, dagger);
            self.kahler_dirac_inv(out, &tmp, dagger)?;
        }
        Ok(())
    }

    fn prepare(
        &self,
        _x: &mut SpinorField,
        _b: &mut SpinorField,
        solution: SolutionType,
    ) -> Result<(), Error> {
        Self::check_solution_type(solution)
    }

    fn reconstruct(
        &self,
        _x: &mut SpinorField,
        _b: &SpinorField,
        _solution: SolutionType,
    ) -> Result<(), Error> {
        Ok(())
    }

    /// With left preconditioning the system `M x = b` becomes
    /// `Xinv M x = Xinv b`, so the right-hand side is multiplied by `Xinv`.
    fn prepare_special_mg(
        &self,
        x: &mut SpinorField,
        b: &mut SpinorField,
        solution: SolutionType,
    ) -> Result<(), Error> {
        Self::check_solution_type(solution)?;
        check_full_spinor(x, b, self.base.gauge())?;
        if self.preconditioning == BlockPreconditioning::Left {
            let mut tmp = SpinorField::zeros(b.geometry());
            self.kahler_dirac_inv(&mut tmp, b, Dagger::No)?;
            b.copy_from(&tmp);
        }
        Ok(())
    }

    /// With right preconditioning the solver returns `y` with `M Xinv y = b`,
    /// so the solution is `x = Xinv y`.
    fn reconstruct_special_mg(
        &self,
        x: &mut SpinorField,
        b: &SpinorField,
        _solution: SolutionType,
    ) -> Result<(), Error> {
        check_full_spinor(x, b, self.base.gauge())?;
        if self.preconditioning == BlockPreconditioning::Right {
            let mut tmp = SpinorField::zeros(x.geometry());
            self.kahler_dirac_inv(&mut tmp, x, Dagger::No)?;
            x.copy_from(&tmp);
        }
        Ok(())
    }

    fn create_coarse_op(&self, transfer: &Transfer) -> Result<CoarseDirac, Error> {
        coarse::galerkin(self, transfer)
    }

    fn flops(&self) -> u64 {
        self.base.flops()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dirac::staggered::{STAGGERED_FLOPS, STAGGERED_FLOPS_XPAY},
        field::FieldGeometry,
    };

    fn gauge() -> Arc<GaugeField> {
        Arc::new(GaugeField::random([2, 2, 2, 4], Precision::Double, 31))
    }

    fn geometry(g: &GaugeField) -> FieldGeometry {
        FieldGeometry::staggered(g.dims, 1, 3, Precision::Double)
    }

    fn param(mass: f64, preconditioning: BlockPreconditioning) -> KdParam {
        KdParam {
            mass,
            xinv_precision: None,
            block_preconditioning: preconditioning,
        }
    }

    #[test]
    fn dagger_is_adjoint_for_both_sides_and_masses() {
        let g = gauge();
        let geom = geometry(&g);
        for preconditioning in [BlockPreconditioning::Left, BlockPreconditioning::Right] {
            for mass in [0.0, 0.1] {
                let kd = StaggeredKdDirac::new(g.clone(), &param(mass, preconditioning)).unwrap();
                let x = SpinorField::random(&geom, 1);
                let y = SpinorField::random(&geom, 2);
                let mut mx = SpinorField::zeros(&geom);
                let mut mdy = SpinorField::zeros(&geom);
                kd.m(&mut mx, &x).unwrap();
                kd.mdag(&mut mdy, &y).unwrap();
                let lhs = y.c_dot(&mx);
                let rhs = mdy.c_dot(&x);
                assert!(
                    (lhs - rhs).norm() < 1e-10 * lhs.norm().max(1.0),
                    "{preconditioning:?}, mass {mass}"
                );
            }
        }
    }

    #[test]
    fn left_preconditioned_operator_is_xinv_times_m() {
        let g = gauge();
        let geom = geometry(&g);
        let kd = StaggeredKdDirac::new(g.clone(), &param(0.1, BlockPreconditioning::Left)).unwrap();
        let x = SpinorField::random(&geom, 3);
        let mut mx = SpinorField::zeros(&geom);
        let mut expected = SpinorField::zeros(&geom);
        let mut got = SpinorField::zeros(&geom);
        kd.staggered().m(&mut mx, &x).unwrap();
        kd.kahler_dirac_inv(&mut expected, &mx, Dagger::No).unwrap();
        kd.m(&mut got, &x).unwrap();
        got.axpy(-1.0, &expected);
        assert!(got.norm() < 1e-12);
    }

    #[test]
    fn flop_count_per_application() {
        let g = gauge();
        let geom = geometry(&g);
        let volume = geom.volume() as u64;
        for (mass, stencil) in [(0.1, STAGGERED_FLOPS_XPAY), (0.0, STAGGERED_FLOPS)] {
            let kd = StaggeredKdDirac::new(g.clone(), &param(mass, BlockPreconditioning::Left))
                .unwrap();
            let x = SpinorField::random(&geom, 3);
            let mut y = SpinorField::zeros(&geom);
            kd.m(&mut y, &x).unwrap();
            assert_eq!(kd.flops(), stencil * volume + (8 * 48 - 2) * 48 * volume / 16);
            assert_eq!(kd.flops(), 0);
        }
    }

    #[test]
    fn share_borrows_xinv() {
        let kd = StaggeredKdDirac::new(gauge(), &KdParam::default()).unwrap();
        assert!(kd.owns_xinv());
        let mut shared = kd.share();
        assert!(!shared.owns_xinv());
        assert!(std::ptr::eq(shared.xinv(), kd.xinv()));

        shared.update_fields(gauge()).unwrap();
        assert!(shared.owns_xinv());
    }

    #[test]
    fn preconditioned_solution_is_rejected() {
        let kd = StaggeredKdDirac::new(gauge(), &KdParam::default()).unwrap();
        let geom = geometry(kd.staggered().gauge());
        let mut x = SpinorField::zeros(&geom);
        let mut b = SpinorField::random(&geom, 1);
        for solution in [SolutionType::MatPc, SolutionType::MatPcDagMatPc] {
            let err = kd.prepare(&mut x, &mut b, solution).unwrap_err();
            assert!(matches!(err.kind(), ErrorKind::IncompatibleSolution(_)));
        }
        assert!(kd.prepare(&mut x, &mut b, SolutionType::Mat).is_ok());
    }

    #[test]
    fn special_mg_prepare_and_reconstruct_follow_the_preconditioning_side() {
        let g = gauge();
        let geom = geometry(&g);
        let b0 = SpinorField::random(&geom, 5);
        let x0 = SpinorField::random(&geom, 6);

        let left =
            StaggeredKdDirac::new(g.clone(), &param(0.1, BlockPreconditioning::Left)).unwrap();
        let (mut x, mut b) = (x0.clone(), b0.clone());
        left.prepare_special_mg(&mut x, &mut b, SolutionType::Mat).unwrap();
        let mut expected = SpinorField::zeros(&geom);
        left.kahler_dirac_inv(&mut expected, &b0, Dagger::No).unwrap();
        assert_eq!(b, expected);
        left.reconstruct_special_mg(&mut x, &b, SolutionType::Mat).unwrap();
        assert_eq!(x, x0);

        let right = StaggeredKdDirac::new(g, &param(0.1, BlockPreconditioning::Right)).unwrap();
        let (mut x, mut b) = (x0.clone(), b0.clone());
        right.prepare_special_mg(&mut x, &mut b, SolutionType::Mat).unwrap();
        assert_eq!(b, b0);
        right.reconstruct_special_mg(&mut x, &b, SolutionType::Mat).unwrap();
        right.kahler_dirac_inv(&mut expected, &x0, Dagger::No).unwrap();
        assert_eq!(x, expected);
    }

    #[test]
    fn coarse_op_of_kd_operator() {
        let kd = StaggeredKdDirac::new(gauge(), &KdParam::default()).unwrap();
        let geom = geometry(kd.staggered().gauge());
        let nulls: Vec<_> = (0..2).map(|k| SpinorField::random(&geom, 40 + k)).collect();
        let transfer = Transfer::aggregate(&geom, [2, 2, 2, 2], &nulls).unwrap();
        let coarse = kd.create_coarse_op(&transfer).unwrap();
        assert_eq!(coarse.matrix().nrows(), 2 * 2);
    }
}
