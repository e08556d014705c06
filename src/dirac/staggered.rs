//! Staggered (Kogut-Susskind) Dirac operator.
//!
//! The hopping term is
//!
//!   (D ψ)(x) = Σ_μ η_μ(x) [U_μ(x) ψ(x+μ) − U_μ†(x−μ) ψ(x−μ)]
//!
//! and the full operator is `M = 2m − D`. Since `D` is anti-Hermitian,
//! `M† = 2m + D`. Each site carries one colour vector; fifth-dimension slices
//! are independent copies of the 4D problem.

use super::{CoarseDirac, Dagger, Dirac, DiracKind, Transfer, coarse};
use crate::{
    error::{Error, ErrorKind},
    field::{SiteSubset, SpinorField},
    lattice::{GaugeField, staggered_phase},
};
use faer::c64;
use std::{cell::Cell, sync::Arc};

/// Flops per 5-d site of the stencil with the mass term.
pub const STAGGERED_FLOPS_XPAY: u64 = 582;
/// Flops per 5-d site of the bare stencil.
pub const STAGGERED_FLOPS: u64 = 570;

/// Applies the staggered stencil.
///
/// With `a != 0` this computes `out = a·in − D_dag in`, otherwise `out = D_dag in`,
/// where `D_dag` is `D` for [`Dagger::No`] and `D† = −D` for [`Dagger::Yes`].
/// Callers that want `M = −D` at zero mass therefore pass the flipped dagger.
pub fn apply_staggered(
    out: &mut SpinorField,
    input: &SpinorField,
    gauge: &GaugeField,
    a: f64,
    dagger: Dagger,
) {
    let nc = input.geometry().n_color;
    let vol4 = gauge.volume();
    let ls = input.geometry().ls();
    let precision = out.geometry().precision;
    let sign = match dagger {
        Dagger::No => 1.0,
        Dagger::Yes => -1.0,
    };
    let src = input.as_slice();
    let dst = out.as_mut_slice();

    let mut hop = vec![c64::new(0.0, 0.0); nc];
    for s in 0..ls {
        let offset = s * vol4 * nc;
        for site in 0..vol4 {
            let x = gauge.site_coords(site);
            hop.fill(c64::new(0.0, 0.0));
            for mu in 0..4 {
                let eta = sign * staggered_phase(x, mu);

                let x_fwd = gauge.neighbor(x, mu, true);
                let i_fwd = offset + gauge.site_index(x_fwd) * nc;
                gauge
                    .link(x, mu)
                    .mul_vec_add(&src[i_fwd..i_fwd + nc], &mut hop, eta);

                let x_bwd = gauge.neighbor(x, mu, false);
                let i_bwd = offset + gauge.site_index(x_bwd) * nc;
                gauge
                    .link(x_bwd, mu)
                    .adj_mul_vec_add(&src[i_bwd..i_bwd + nc], &mut hop, -eta);
            }
            let i = offset + site * nc;
            for c in 0..nc {
                let v = if a != 0.0 {
                    src[i + c] * a - hop[c]
                } else {
                    hop[c]
                };
                dst[i + c] = precision.quantize(v);
            }
        }
    }
}

/// Checks that `input` and `out` are full-parity 5-d fields matching `gauge`.
pub fn check_full_spinor(
    out: &SpinorField,
    input: &SpinorField,
    gauge: &GaugeField,
) -> Result<(), Error> {
    let (gi, go) = (input.geometry(), out.geometry());
    for g in [gi, go] {
        if g.n_dim() != 5 {
            return Err(ErrorKind::NotFiveDimensional { ndim: g.n_dim() }.into());
        }
    }
    if gi.precision != go.precision {
        return Err(ErrorKind::PrecisionMismatch {
            input: gi.precision,
            output: go.precision,
        }
        .into());
    }
    if gi.subset != SiteSubset::Full || go.subset != SiteSubset::Full {
        return Err(ErrorKind::SubsetMismatch {
            input: gi.subset,
            output: go.subset,
        }
        .into());
    }
    for g in [gi, go] {
        let spinor = g.volume() / g.ls();
        if spinor != gauge.volume() || g.dims() != gauge.dims {
            return Err(ErrorKind::VolumeMismatch {
                spinor,
                gauge: gauge.volume(),
            }
            .into());
        }
    }
    if gi.ls() != go.ls() || gi.n_color != go.n_color || gi.n_color != 3 {
        return Err(ErrorKind::LengthMismatch {
            expected: input.len(),
            actual: out.len(),
        }
        .into());
    }
    Ok(())
}

/// The plain staggered operator `M = 2m − D`.
#[derive(Clone, Debug)]
pub struct StaggeredDirac {
    gauge: Arc<GaugeField>,
    mass: f64,
    flops: Cell<u64>,
}

impl StaggeredDirac {
    pub fn new(gauge: Arc<GaugeField>, mass: f64) -> Self {
        Self {
            gauge,
            mass,
            flops: Cell::new(0),
        }
    }

    pub fn gauge(&self) -> &Arc<GaugeField> {
        &self.gauge
    }

    /// Install a new gauge field.
    pub fn update_fields(&mut self, gauge: Arc<GaugeField>) {
        self.gauge = gauge;
    }

    pub(crate) fn add_flops(&self, flops: u64) {
        self.flops.set(self.flops.get() + flops);
    }

    /// Applies `M` (or `M†`) without any field checks.
    ///
    /// The zero-mass case runs the bare stencil with the flipped dagger so that
    /// the result is still `−D` (or `D` for the conjugate).
    pub(crate) fn apply_unchecked(
        &self,
        out: &mut SpinorField,
        input: &SpinorField,
        dagger: Dagger,
    ) {
        let volume = input.geometry().volume() as u64;
        if self.mass == 0.0 {
            apply_staggered(out, input, &self.gauge, 0.0, dagger.flip());
            self.add_flops(STAGGERED_FLOPS * volume);
        } else {
            apply_staggered(out, input, &self.gauge, 2.0 * self.mass, dagger);
            self.add_flops(STAGGERED_FLOPS_XPAY * volume);
        }
    }
}

impl Dirac for StaggeredDirac {
    fn kind(&self) -> DiracKind {
        DiracKind::Plain
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
        check_full_spinor(out, input, &self.gauge)?;
        self.apply_unchecked(out, input, dagger);
        Ok(())
    }

    fn create_coarse_op(&self, transfer: &Transfer) -> Result<CoarseDirac, Error> {
        coarse::galerkin(self, transfer)
    }

    fn flops(&self) -> u64 {
        self.flops.replace(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldGeometry, Precision};

    fn setup(mass: f64) -> (StaggeredDirac, FieldGeometry) {
        let gauge = Arc::new(GaugeField::random([4, 2, 2, 2], Precision::Double, 11));
        let geometry = FieldGeometry::staggered(gauge.dims, 1, 3, Precision::Double);
        (StaggeredDirac::new(gauge, mass), geometry)
    }

    fn adjoint_mismatch(dirac: &StaggeredDirac, geometry: &FieldGeometry) -> f64 {
        let x = SpinorField::random(geometry, 1);
        let y = SpinorField::random(geometry, 2);
        let mut mx = SpinorField::zeros(geometry);
        let mut mdy = SpinorField::zeros(geometry);
        dirac.m(&mut mx, &x).unwrap();
        dirac.mdag(&mut mdy, &y).unwrap();
        (y.c_dot(&mx) - mdy.c_dot(&x)).norm()
    }

    #[test]
    fn mdag_is_adjoint_of_m() {
        for mass in [0.0, 0.1] {
            let (dirac, geometry) = setup(mass);
            assert!(adjoint_mismatch(&dirac, &geometry) < 1e-12, "mass {mass}");
        }
    }

    #[test]
    fn zero_mass_operator_is_minus_hopping_term() {
        let (massless, geometry) = setup(0.0);
        let (massive, _) = setup(0.25);
        let x = SpinorField::random(&geometry, 4);
        let mut m0 = SpinorField::zeros(&geometry);
        let mut m1 = SpinorField::zeros(&geometry);
        massless.m(&mut m0, &x).unwrap();
        massive.m(&mut m1, &x).unwrap();
        // M(m) − M(0) = 2m
        m1.axpy(-1.0, &m0);
        m1.axpy(-0.5, &x);
        assert!(m1.norm() < 1e-12);
    }

    #[test]
    fn flops_are_read_and_reset() {
        let (dirac, geometry) = setup(0.1);
        let x = SpinorField::random(&geometry, 4);
        let mut y = SpinorField::zeros(&geometry);
        dirac.m(&mut y, &x).unwrap();
        assert_eq!(dirac.flops(), STAGGERED_FLOPS_XPAY * 32);
        assert_eq!(dirac.flops(), 0);
    }

    #[test]
    fn rejects_four_dimensional_fields() {
        let (dirac, _) = setup(0.1);
        let g4 = FieldGeometry {
            extent: vec![4, 2, 2, 2],
            n_color: 3,
            precision: Precision::Double,
            subset: SiteSubset::Full,
        };
        let x = SpinorField::zeros(&g4);
        let mut y = SpinorField::zeros(&g4);
        let err = dirac.m(&mut y, &x).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotFiveDimensional { ndim: 4 }));
    }

    #[test]
    fn rejects_mismatched_volume() {
        let (dirac, _) = setup(0.1);
        let wrong = FieldGeometry::staggered([2, 2, 2, 2], 1, 3, Precision::Double);
        let x = SpinorField::zeros(&wrong);
        let mut y = SpinorField::zeros(&wrong);
        let err = dirac.m(&mut y, &x).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::VolumeMismatch {
                spinor: 16,
                gauge: 32
            }
        ));
    }
}
