//! The Kähler-Dirac block inverse `Xinv`.
//!
//! The lattice is tiled by 2⁴ hypercubes. Restricting `M = 2m − D` to the links
//! internal to one hypercube gives a dense block of dimension
//! `16 · n_color` (48 for SU(3)); `Xinv` stores the inverse of every block,
//! indexed by the coarse site `x / 2`.
//!
//! Within a block, rows are ordered by the hypercube corner
//! `c = Σ_μ (x_μ mod 2) · 2^μ` and then by colour.

use super::Dagger;
use crate::{
    error::{Error, ErrorKind},
    field::{Precision, SpinorField},
    lattice::{GaugeField, staggered_phase},
};
use faer::{Accum, Mat, Par, c64, linalg::matmul::matmul, prelude::*};

/// Largest accepted `max |B · Xinv − I|` for a freshly built block inverse.
pub const BLOCK_INVERSE_TOLERANCE: f64 = 1e-8;

/// Flops of one `Xinv` application per 5-d fine site.
pub fn xinv_flops(volume: u64) -> u64 {
    (8 * 48 - 2) * 48 * volume / 16
}

/// Dense inverse of every 2⁴ hypercube block of the staggered operator.
#[derive(Clone, Debug)]
pub struct KdInverse {
    fine_dims: [usize; 4],
    coarse_dims: [usize; 4],
    n_color: usize,
    precision: Precision,
    blocks: Vec<Mat<c64>>,
}

/// Precision used to store `Xinv`: the override if given, else the gauge
/// precision, clamped to `[Half, Single]`.
pub fn xinv_precision(gauge: Precision, override_precision: Option<Precision>) -> Precision {
    override_precision
        .unwrap_or(gauge)
        .clamp(Precision::Half, Precision::Single)
}

#[inline]
fn corner(x: [usize; 4]) -> usize {
    (0..4).map(|mu| (x[mu] % 2) << mu).sum()
}

impl KdInverse {
    /// Build `Xinv` for the given gauge field and mass.
    pub fn build(
        gauge: &GaugeField,
        mass: f64,
        override_precision: Option<Precision>,
    ) -> Result<Self, Error> {
        for (mu, &extent) in gauge.dims.iter().enumerate() {
            if extent % 2 != 0 || extent == 0 {
                return Err(ErrorKind::OddExtent { mu, extent }.into());
            }
        }
        let n_color = 3;
        let precision = xinv_precision(gauge.precision, override_precision);
        let coarse_dims = gauge.dims.map(|d| d / 2);
        let n_blocks: usize = coarse_dims.iter().product();
        let dim = 16 * n_color;
        let identity = Mat::<c64>::identity(dim, dim);

        let mut blocks = Vec::with_capacity(n_blocks);
        for block in 0..n_blocks {
            let origin = block_origin(block, coarse_dims);
            let b = block_matrix(gauge, mass, origin, n_color);
            let inverse = b.partial_piv_lu().solve(&identity);

            let residual = (&b * &inverse - &identity).norm_max();
            if !inverse.as_ref().is_all_finite() || !(residual <= BLOCK_INVERSE_TOLERANCE) {
                return Err(ErrorKind::BlockInverse { block, residual }.into());
            }

            blocks.push(Mat::from_fn(dim, dim, |i, j| {
                precision.quantize(inverse[(i, j)])
            }));
        }

        log::debug!(
            "Built Kähler-Dirac inverse: {} blocks of dimension {} at {:?} precision",
            n_blocks,
            dim,
            precision
        );

        Ok(Self {
            fine_dims: gauge.dims,
            coarse_dims,
            n_color,
            precision,
            blocks,
        })
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Extents of the coarse lattice (half the fine extents).
    pub fn coarse_dims(&self) -> [usize; 4] {
        self.coarse_dims
    }

    /// Dimension of a single block, `16 · n_color`.
    pub fn block_dim(&self) -> usize {
        16 * self.n_color
    }

    pub fn block(&self, index: usize) -> &Mat<c64> {
        &self.blocks[index]
    }

    /// `out = Xinv in` or `out = Xinv† in`, slice by slice in the fifth dimension.
    pub fn apply(
        &self,
        out: &mut SpinorField,
        input: &SpinorField,
        dagger: Dagger,
    ) -> Result<(), Error> {
        let geometry = input.geometry();
        if geometry.dims() != self.fine_dims || geometry.n_color != self.n_color {
            return Err(ErrorKind::VolumeMismatch {
                spinor: geometry.volume() / geometry.ls(),
                gauge: self.fine_dims.iter().product(),
            }
            .into());
        }
        out.check_compatible(input)?;

        let nc = self.n_color;
        let dim = self.block_dim();
        let vol4: usize = self.fine_dims.iter().product();
        let out_precision = out.geometry().precision;
        let src = input.as_slice();
        let dst = out.as_mut_slice();

        // Fine-field index of every block row.
        let mut gather = vec![0usize; dim];
        let mut local = Mat::<c64>::zeros(dim, 1);
        let mut result = Mat::<c64>::zeros(dim, 1);
        let one = c64::new(1.0, 0.0);

        for s in 0..geometry.ls() {
            let offset = s * vol4 * nc;
            for (block, xinv) in self.blocks.iter().enumerate() {
                let origin = block_origin(block, self.coarse_dims);
                for c in 0..16 {
                    let x = corner_site(origin, c);
                    let site = site_index(x, self.fine_dims);
                    for color in 0..nc {
                        gather[c * nc + color] = offset + site * nc + color;
                    }
                }
                for (i, &g) in gather.iter().enumerate() {
                    local[(i, 0)] = src[g];
                }
                match dagger {
                    Dagger::No => matmul(
                        result.as_mut(),
                        Accum::Replace,
                        xinv.as_ref(),
                        local.as_ref(),
                        one,
                        Par::Seq,
                    ),
                    Dagger::Yes => matmul(
                        result.as_mut(),
                        Accum::Replace,
                        xinv.adjoint(),
                        local.as_ref(),
                        one,
                        Par::Seq,
                    ),
                }
                for (i, &g) in gather.iter().enumerate() {
                    dst[g] = out_precision.quantize(result[(i, 0)]);
                }
            }
        }
        Ok(())
    }
}

fn block_origin(block: usize, coarse_dims: [usize; 4]) -> [usize; 4] {
    let mut rest = block;
    let mut x = [0; 4];
    for (xi, &d) in x.iter_mut().zip(coarse_dims.iter()) {
        *xi = 2 * (rest % d);
        rest /= d;
    }
    x
}

fn corner_site(origin: [usize; 4], c: usize) -> [usize; 4] {
    let mut x = origin;
    for (mu, xi) in x.iter_mut().enumerate() {
        *xi += (c >> mu) & 1;
    }
    x
}

fn site_index(x: [usize; 4], dims: [usize; 4]) -> usize {
    x[0] + dims[0] * (x[1] + dims[1] * (x[2] + dims[2] * x[3]))
}

/// The block of `2m − D` on the hypercube at `origin`, internal links only.
///
/// A forward hop is internal when `x_μ` is even and a backward hop when `x_μ`
/// is odd, so periodic wrap-around links never enter even when an extent is 2.
fn block_matrix(gauge: &GaugeField, mass: f64, origin: [usize; 4], nc: usize) -> Mat<c64> {
    let dim = 16 * nc;
    let mut b = Mat::<c64>::zeros(dim, dim);
    for i in 0..dim {
        b[(i, i)] = c64::new(2.0 * mass, 0.0);
    }
    for cx in 0..16 {
        let x = corner_site(origin, cx);
        debug_assert_eq!(corner(x), cx);
        for mu in 0..4 {
            let eta = staggered_phase(x, mu);
            if x[mu] % 2 == 0 {
                let cy = cx | (1 << mu);
                let u = gauge.link(x, mu);
                for a in 0..nc {
                    for bb in 0..nc {
                        b[(cx * nc + a, cy * nc + bb)] -= u.m[a][bb] * eta;
                    }
                }
            } else {
                let cy = cx & !(1 << mu);
                let y = corner_site(origin, cy);
                let u = gauge.link(y, mu);
                for a in 0..nc {
                    for bb in 0..nc {
                        b[(cx * nc + a, cy * nc + bb)] += u.m[bb][a].conj() * eta;
                    }
                }
            }
        }
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dirac::{Dirac, StaggeredDirac},
        field::FieldGeometry,
    };
    use std::sync::Arc;

    #[test]
    fn precision_is_clamped() {
        assert_eq!(xinv_precision(Precision::Double, None), Precision::Single);
        assert_eq!(xinv_precision(Precision::Quarter, None), Precision::Half);
        assert_eq!(
            xinv_precision(Precision::Double, Some(Precision::Half)),
            Precision::Half
        );
    }

    #[test]
    fn odd_extent_is_rejected() {
        let gauge = GaugeField::cold_start([2, 3, 2, 2], Precision::Single);
        let err = KdInverse::build(&gauge, 0.1, None).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::OddExtent { mu: 1, extent: 3 }));
    }

    #[test]
    fn xinv_inverts_the_blocked_operator() {
        // Links leaving a site with odd x_mu cross a hypercube boundary. With all
        // of them zeroed the staggered operator is block diagonal and Xinv·M = I.
        let mut gauge = GaugeField::random([4, 2, 2, 2], Precision::Double, 21);
        for site in 0..gauge.volume() {
            let x = gauge.site_coords(site);
            for mu in 0..4 {
                if x[mu] % 2 == 1 {
                    gauge.set_link(x, mu, crate::lattice::Su3Matrix::ZERO);
                }
            }
        }
        let mass = 0.2;
        let xinv = KdInverse::build(&gauge, mass, Some(Precision::Double)).unwrap();
        assert_eq!(xinv.block_dim(), 48);
        assert_eq!(xinv.coarse_dims(), [2, 1, 1, 1]);

        let geometry = FieldGeometry::staggered(gauge.dims, 1, 3, Precision::Double);
        let x = SpinorField::random(&geometry, 3);
        let mut mx = SpinorField::zeros(&geometry);
        let mut back = SpinorField::zeros(&geometry);

        let dirac = StaggeredDirac::new(Arc::new(gauge), mass);
        dirac.m(&mut mx, &x).unwrap();
        xinv.apply(&mut back, &mx, Dagger::No).unwrap();
        back.axpy(-1.0, &x);
        // Xinv is stored at single precision.
        assert!(back.norm() / x.norm() < 1e-5);
    }

    #[test]
    fn dagger_applies_conjugate_transpose() {
        let gauge = GaugeField::random([2, 2, 2, 2], Precision::Double, 5);
        let xinv = KdInverse::build(&gauge, 0.1, None).unwrap();
        let geometry = FieldGeometry::staggered(gauge.dims, 2, 3, Precision::Double);
        let x = SpinorField::random(&geometry, 1);
        let y = SpinorField::random(&geometry, 2);
        let mut ax = SpinorField::zeros(&geometry);
        let mut ady = SpinorField::zeros(&geometry);
        xinv.apply(&mut ax, &x, Dagger::No).unwrap();
        xinv.apply(&mut ady, &y, Dagger::Yes).unwrap();
        assert!((y.c_dot(&ax) - ady.c_dot(&x)).norm() < 1e-10);
    }
}
