//! Aggregation transfer operators and the Galerkin coarse operator.
//!
//! A [`Transfer`] holds a dense prolongator `P` whose columns are the
//! block-orthonormalised near-null vectors of the fine operator, one column per
//! (aggregate, vector) pair. The coarse operator is `Y = P† A P`.

use super::{Dagger, Dirac, DiracKind};
use crate::{
    error::{Error, ErrorKind},
    field::{FieldGeometry, SpinorField},
};
use faer::{Accum, Col, Mat, Par, Scale, c64, linalg::matmul::matmul};
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// Numerical floor below which a null vector is considered to vanish on an aggregate.
const COLLAPSE_TOLERANCE: f64 = 1e-12;

/// How a transfer operator was constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    /// Block aggregation of near-null vectors.
    Aggregate,
    /// Kähler-Dirac blocking of the staggered field onto the coarse lattice.
    CoarseKd,
    /// Kähler-Dirac blocking with the block inverse folded in.
    OptimizedKd,
}

/// Prolongation/restriction between a fine field and a flat coarse vector.
#[derive(Clone, Debug)]
pub struct Transfer {
    kind: TransferType,
    fine_geometry: FieldGeometry,
    prolongator: Mat<c64>,
}

impl Transfer {
    /// Wrap an explicit prolongator of shape `fine.len() × n_coarse`.
    pub fn new(
        kind: TransferType,
        fine_geometry: FieldGeometry,
        prolongator: Mat<c64>,
    ) -> Result<Self, Error> {
        if prolongator.nrows() != fine_geometry.len() {
            return Err(ErrorKind::LengthMismatch {
                expected: fine_geometry.len(),
                actual: prolongator.nrows(),
            }
            .into());
        }
        Ok(Self {
            kind,
            fine_geometry,
            prolongator,
        })
    }

    /// Aggregation transfer over 4D blocks of extent `block`.
    ///
    /// Each aggregate contains every colour and fifth-dimension component of its
    /// sites. The null vectors are Gram-Schmidt orthonormalised within each
    /// aggregate, so `P† P = I`.
    pub fn aggregate(
        fine_geometry: &FieldGeometry,
        block: [usize; 4],
        null_vectors: &[SpinorField],
    ) -> Result<Self, Error> {
        let dims = fine_geometry.dims();
        for mu in 0..4 {
            if block[mu] == 0 || dims[mu] % block[mu] != 0 {
                return Err(ErrorKind::InvalidParameter(format!(
                    "aggregate extent {} does not divide lattice extent {} in direction {}",
                    block[mu], dims[mu], mu
                ))
                .into());
            }
        }
        if null_vectors.is_empty() {
            return Err(
                ErrorKind::InvalidParameter("no null vectors for aggregation".into()).into(),
            );
        }
        for v in null_vectors {
            if v.len() != fine_geometry.len() {
                return Err(ErrorKind::LengthMismatch {
                    expected: fine_geometry.len(),
                    actual: v.len(),
                }
                .into());
            }
        }

        let nc = fine_geometry.n_color;
        let vol4: usize = dims.iter().product();
        let agg_dims = [0, 1, 2, 3].map(|mu| dims[mu] / block[mu]);
        let n_agg: usize = agg_dims.iter().product();
        let n_vec = null_vectors.len();

        // Fine indices belonging to each aggregate.
        let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_agg];
        for s in 0..fine_geometry.ls() {
            for site in 0..vol4 {
                let mut rest = site;
                let mut agg = 0;
                let mut stride = 1;
                for mu in 0..4 {
                    let x = rest % dims[mu];
                    rest /= dims[mu];
                    agg += (x / block[mu]) * stride;
                    stride *= agg_dims[mu];
                }
                for c in 0..nc {
                    members[agg].push((s * vol4 + site) * nc + c);
                }
            }
        }

        let mut prolongator = Mat::<c64>::zeros(fine_geometry.len(), n_agg * n_vec);
        let mut local: Vec<Col<c64>> = Vec::with_capacity(n_vec);
        for (agg, rows) in members.iter().enumerate() {
            local.clear();
            for v in null_vectors {
                let data = v.as_slice();
                let mut w = Col::<c64>::from_fn(rows.len(), |i| data[rows[i]]);
                for _pass in 0..2 {
                    for q in &local {
                        let dot = q.adjoint() * &w;
                        w -= q * Scale(dot);
                    }
                }
                let norm = w.norm_l2();
                if norm < COLLAPSE_TOLERANCE {
                    return Err(ErrorKind::InvalidParameter(format!(
                        "null vectors are linearly dependent on aggregate {agg}"
                    ))
                    .into());
                }
                local.push(&w * Scale(c64::new(1.0 / norm, 0.0)));
            }
            for (k, q) in local.iter().enumerate() {
                for (i, &r) in rows.iter().enumerate() {
                    prolongator[(r, agg * n_vec + k)] = q[i];
                }
            }
        }

        Self::new(TransferType::Aggregate, fine_geometry.clone(), prolongator)
    }

    pub fn kind(&self) -> TransferType {
        self.kind
    }

    pub fn fine_geometry(&self) -> &FieldGeometry {
        &self.fine_geometry
    }

    /// Geometry of coarse vectors.
    pub fn coarse_geometry(&self) -> FieldGeometry {
        FieldGeometry::flat(self.prolongator.ncols())
    }

    pub fn prolongator(&self) -> &Mat<c64> {
        &self.prolongator
    }

    /// `fine = P coarse`
    pub fn prolongate(&self, fine: &mut SpinorField, coarse: &SpinorField) {
        matmul(
            fine.as_mat_mut(),
            Accum::Replace,
            self.prolongator.as_ref(),
            coarse.as_mat(),
            c64::new(1.0, 0.0),
            Par::Seq,
        );
    }

    /// `coarse = P† fine`
    pub fn restrict(&self, coarse: &mut SpinorField, fine: &SpinorField) {
        matmul(
            coarse.as_mat_mut(),
            Accum::Replace,
            self.prolongator.adjoint(),
            fine.as_mat(),
            c64::new(1.0, 0.0),
            Par::Seq,
        );
    }
}

/// Builds `Y = P† A P` column by column from applications of `A`.
pub(crate) fn galerkin(dirac: &dyn Dirac, transfer: &Transfer) -> Result<CoarseDirac, Error> {
    if transfer.kind() != TransferType::Aggregate {
        return Err(ErrorKind::UnsupportedTransfer(transfer.kind()).into());
    }
    let coarse_geometry = transfer.coarse_geometry();
    let n = coarse_geometry.len();
    let mut y = Mat::<c64>::zeros(n, n);

    let mut e = SpinorField::zeros(&coarse_geometry);
    let mut column = SpinorField::zeros(&coarse_geometry);
    let mut fine = SpinorField::zeros(transfer.fine_geometry());
    let mut a_fine = SpinorField::zeros(transfer.fine_geometry());
    for j in 0..n {
        e.zero();
        e.as_mut_slice()[j] = c64::new(1.0, 0.0);
        transfer.prolongate(&mut fine, &e);
        dirac.m(&mut a_fine, &fine)?;
        transfer.restrict(&mut column, &a_fine);
        y.col_mut(j).copy_from(column.as_col());
    }
    log::debug!("Built {n}x{n} Galerkin coarse operator from a {:?} operator", dirac.kind());
    Ok(CoarseDirac::new(y, dirac.mass()))
}

/// Dense coarse-grid operator.
#[derive(Clone, Debug)]
pub struct CoarseDirac {
    y: Mat<c64>,
    mass: f64,
    flops: Cell<u64>,
}

impl CoarseDirac {
    pub fn new(y: Mat<c64>, mass: f64) -> Self {
        Self {
            y,
            mass,
            flops: Cell::new(0),
        }
    }

    pub fn matrix(&self) -> &Mat<c64> {
        &self.y
    }

    pub fn geometry(&self) -> FieldGeometry {
        FieldGeometry::flat(self.y.nrows())
    }
}

impl Dirac for CoarseDirac {
    fn kind(&self) -> DiracKind {
        DiracKind::Coarse
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn apply(
        &self,
        out: &mut SpinorField,
        input: &SpinorField,
        dagger: Dagger,
    ) -> Result<(), Error> {
        let n = self.y.nrows();
        for len in [input.len(), out.len()] {
            if len != n {
                return Err(ErrorKind::LengthMismatch {
                    expected: n,
                    actual: len,
                }
                .into());
            }
        }
        let one = c64::new(1.0, 0.0);
        match dagger {
            Dagger::No => matmul(
                out.as_mat_mut(),
                Accum::Replace,
                self.y.as_ref(),
                input.as_mat(),
                one,
                Par::Seq,
            ),
            Dagger::Yes => matmul(
                out.as_mat_mut(),
                Accum::Replace,
                self.y.adjoint(),
                input.as_mat(),
                one,
                Par::Seq,
            ),
        }
        self.flops.set(self.flops.get() + 8 * (n * n) as u64);
        Ok(())
    }

    fn create_coarse_op(&self, transfer: &Transfer) -> Result<CoarseDirac, Error> {
        galerkin(self, transfer)
    }

    fn flops(&self) -> u64 {
        self.flops.replace(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dirac::StaggeredDirac,
        field::Precision,
        lattice::GaugeField,
    };
    use std::sync::Arc;

    fn setup() -> (StaggeredDirac, FieldGeometry, Vec<SpinorField>) {
        let gauge = Arc::new(GaugeField::random([2, 2, 2, 2], Precision::Double, 8));
        let geometry = FieldGeometry::staggered(gauge.dims, 1, 3, Precision::Double);
        let nulls = (0..3).map(|k| SpinorField::random(&geometry, 100 + k)).collect();
        (StaggeredDirac::new(gauge, 0.1), geometry, nulls)
    }

    #[test]
    fn aggregate_prolongator_is_orthonormal() {
        let (_, geometry, nulls) = setup();
        let transfer = Transfer::aggregate(&geometry, [2, 2, 1, 1], &nulls).unwrap();
        let p = transfer.prolongator();
        assert_eq!(p.ncols(), 4 * 3);
        let gram = p.adjoint() * p;
        assert!((&gram - Mat::<c64>::identity(p.ncols(), p.ncols())).norm_l2() < 1e-12);
    }

    #[test]
    fn coarse_operator_matches_galerkin_product() {
        let (dirac, geometry, nulls) = setup();
        let transfer = Transfer::aggregate(&geometry, [2, 2, 2, 1], &nulls).unwrap();
        let coarse = dirac.create_coarse_op(&transfer).unwrap();
        assert_eq!(coarse.kind(), DiracKind::Coarse);

        let cg = transfer.coarse_geometry();
        let xc = SpinorField::random(&cg, 1);
        let mut yc = SpinorField::zeros(&cg);
        coarse.m(&mut yc, &xc).unwrap();

        let mut fine = SpinorField::zeros(&geometry);
        let mut a_fine = SpinorField::zeros(&geometry);
        let mut expected = SpinorField::zeros(&cg);
        transfer.prolongate(&mut fine, &xc);
        dirac.m(&mut a_fine, &fine).unwrap();
        transfer.restrict(&mut expected, &a_fine);

        yc.axpy(-1.0, &expected);
        assert!(yc.norm() < 1e-12);
    }

    #[test]
    fn coarse_dagger_applies_the_adjoint() {
        let (dirac, geometry, nulls) = setup();
        let transfer = Transfer::aggregate(&geometry, [2, 2, 2, 2], &nulls).unwrap();
        let coarse = dirac.create_coarse_op(&transfer).unwrap();
        let cg = transfer.coarse_geometry();
        let x = SpinorField::random(&cg, 2);
        let y = SpinorField::random(&cg, 3);
        let mut ax = SpinorField::zeros(&cg);
        let mut ady = SpinorField::zeros(&cg);
        coarse.apply(&mut ax, &x, Dagger::No).unwrap();
        coarse.apply(&mut ady, &y, Dagger::Yes).unwrap();
        assert!((y.c_dot(&ax) - ady.c_dot(&x)).norm() < 1e-12);
    }

    #[test]
    fn non_aggregate_transfer_is_rejected() {
        let (dirac, geometry, _) = setup();
        let p = Mat::<c64>::zeros(geometry.len(), 2);
        let transfer = Transfer::new(TransferType::OptimizedKd, geometry, p).unwrap();
        let err = dirac.create_coarse_op(&transfer).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::UnsupportedTransfer(TransferType::OptimizedKd)
        ));
    }

    #[test]
    fn indivisible_block_is_rejected() {
        let (_, geometry, nulls) = setup();
        assert!(Transfer::aggregate(&geometry, [3, 1, 1, 1], &nulls).is_err());
    }
}
