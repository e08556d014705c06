//! Host reference implementation of the lattice field abstraction.
//!
//! The operators and solvers in this crate never touch field storage directly:
//! they only use the BLAS-like primitives defined here (`copy`, `zero`, `ax`,
//! `axpy`, `caxpy`, `norm2`, `c_dot` and their batched forms). A device backend
//! would provide the same primitives over device memory.
//!
//! The primitives run on [`faer`] views of the field storage. Reductions use a
//! fixed kernel and order, so repeated runs on identical inputs are bit-for-bit
//! reproducible. On a distributed grid these
//! reductions would be all-reduced and every rank must issue them in the same
//! order.
//!
//! ## Layout
//!
//! Colour is the fastest index, then the 4D site in lexicographic order
//! (`x` fastest, `t` slowest), then the fifth dimension `s`:
//!
//! `index = ((s * volume_4d + site) * n_color) + color`

use crate::error::{Error, ErrorKind};
use faer::{Col, ColRef, MatMut, MatRef, c64, unzip, zip};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// Storage precision tag carried by fields and gauge-like objects.
///
/// The host reference stores every value as `f64`; the tag records the
/// precision a device backend would use and drives [`Precision::quantize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Precision {
    Quarter,
    Half,
    Single,
    Double,
}

impl Precision {
    /// Rounds a value to what this precision can hold on the host.
    ///
    /// Quarter and half precision are held at single precision.
    #[inline]
    pub fn quantize(self, value: c64) -> c64 {
        match self {
            Precision::Double => value,
            _ => c64::new(value.re as f32 as f64, value.im as f32 as f64),
        }
    }
}

/// Which lattice sites a field covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteSubset {
    /// Every site of the lattice.
    Full,
    /// Only the even or only the odd checkerboard.
    Parity(Parity),
}

/// Checkerboard parity of a site, `(x + y + z + t) mod 2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parity {
    Even,
    Odd,
}

/// Shape and storage description shared by all fields of one operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGeometry {
    /// Extent per dimension; staggered fields are 5-d with the fifth extent last.
    pub extent: Vec<usize>,
    /// Number of colour components per site.
    pub n_color: usize,
    pub precision: Precision,
    pub subset: SiteSubset,
}

impl FieldGeometry {
    /// A full-parity 5-d staggered geometry: `dims` in 4D plus `ls` fifth-dimension slices.
    pub fn staggered(dims: [usize; 4], ls: usize, n_color: usize, precision: Precision) -> Self {
        Self {
            extent: vec![dims[0], dims[1], dims[2], dims[3], ls],
            n_color,
            precision,
            subset: SiteSubset::Full,
        }
    }

    /// A flat geometry of `n` single-component sites, used for dense operators.
    pub fn flat(n: usize) -> Self {
        Self {
            extent: vec![n],
            n_color: 1,
            precision: Precision::Double,
            subset: SiteSubset::Full,
        }
    }

    /// Number of dimensions of the field.
    #[inline]
    pub fn n_dim(&self) -> usize {
        self.extent.len()
    }

    /// Number of sites (product of all extents, including the fifth dimension).
    #[inline]
    pub fn volume(&self) -> usize {
        let full: usize = self.extent.iter().product();
        match self.subset {
            SiteSubset::Full => full,
            SiteSubset::Parity(_) => full / 2,
        }
    }

    /// Extent of the fifth dimension, 1 for fields with fewer than five dimensions.
    #[inline]
    pub fn ls(&self) -> usize {
        self.extent.get(4).copied().unwrap_or(1)
    }

    /// The four lattice extents; missing dimensions count as 1.
    pub fn dims(&self) -> [usize; 4] {
        let mut dims = [1; 4];
        for (d, &x) in dims.iter_mut().zip(self.extent.iter().take(4)) {
            *d = x;
        }
        dims
    }

    /// Number of complex entries stored for this geometry.
    #[inline]
    pub fn len(&self) -> usize {
        self.volume() * self.n_color
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A complex field over a lattice geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct SpinorField {
    geometry: FieldGeometry,
    data: Vec<c64>,
}

impl SpinorField {
    /// Create a zero field.
    pub fn zeros(geometry: &FieldGeometry) -> Self {
        Self {
            data: vec![c64::new(0.0, 0.0); geometry.len()],
            geometry: geometry.clone(),
        }
    }

    /// Create a field with entries uniform in `[-0.5, 0.5)` from a seeded generator.
    ///
    /// The seed fully determines the field, so every rank generates the same values.
    pub fn random(geometry: &FieldGeometry, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let data = (0..geometry.len())
            .map(|_| c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect();
        Self {
            geometry: geometry.clone(),
            data,
        }
    }

    /// Wrap existing values; fails if the length does not match the geometry.
    pub fn from_vec(geometry: &FieldGeometry, data: Vec<c64>) -> Result<Self, Error> {
        if data.len() != geometry.len() {
            return Err(ErrorKind::LengthMismatch {
                expected: geometry.len(),
                actual: data.len(),
            }
            .into());
        }
        Ok(Self {
            geometry: geometry.clone(),
            data,
        })
    }

    #[inline]
    pub fn geometry(&self) -> &FieldGeometry {
        &self.geometry
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[c64] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [c64] {
        &mut self.data
    }

    /// The field as an `n × 1` matrix view, for dense products.
    #[inline]
    pub fn as_mat(&self) -> MatRef<'_, c64> {
        MatRef::from_column_major_slice(&self.data, self.data.len(), 1)
    }

    #[inline]
    pub fn as_mat_mut(&mut self) -> MatMut<'_, c64> {
        let n = self.data.len();
        MatMut::from_column_major_slice_mut(&mut self.data, n, 1)
    }

    #[inline]
    pub fn as_col(&self) -> ColRef<'_, c64> {
        ColRef::from_slice(&self.data)
    }

    /// Fails unless `other` has the same length and precision as `self`.
    pub fn check_compatible(&self, other: &Self) -> Result<(), Error> {
        if self.len() != other.len() {
            return Err(ErrorKind::LengthMismatch {
                expected: self.len(),
                actual: other.len(),
            }
            .into());
        }
        if self.geometry.precision != other.geometry.precision {
            return Err(ErrorKind::PrecisionMismatch {
                input: other.geometry.precision,
                output: self.geometry.precision,
            }
            .into());
        }
        Ok(())
    }

    /// Copy the values of `other` into `self`.
    pub fn copy_from(&mut self, other: &Self) {
        self.as_mat_mut().copy_from(other.as_mat());
    }

    /// Zero all entries.
    pub fn zero(&mut self) {
        self.data.fill(c64::new(0.0, 0.0));
    }

    /// Real scale in place: `self *= a`.
    pub fn ax(&mut self, a: f64) {
        zip!(self.as_mat_mut()).for_each(|unzip!(v)| *v *= a);
    }

    /// Real axpy: `self += a * x`.
    pub fn axpy(&mut self, a: f64, x: &Self) {
        zip!(self.as_mat_mut(), x.as_mat()).for_each(|unzip!(s, xi)| *s += *xi * a);
    }

    /// Complex axpy: `self += a * x`.
    pub fn caxpy(&mut self, a: c64, x: &Self) {
        zip!(self.as_mat_mut(), x.as_mat()).for_each(|unzip!(s, xi)| *s += a * *xi);
    }

    /// Squared norm `‖self‖²`.
    #[inline]
    pub fn norm2(&self) -> f64 {
        self.as_col().squared_norm_l2()
    }

    /// Euclidean norm `‖self‖`.
    #[inline]
    pub fn norm(&self) -> f64 {
        self.as_col().norm_l2()
    }

    /// Inner product `⟨self | other⟩ = Σ conj(self_i) other_i`.
    #[inline]
    pub fn c_dot(&self, other: &Self) -> c64 {
        self.as_col().adjoint() * other.as_col()
    }

    /// Batched inner products `⟨basis_i | self⟩` for every vector of `basis`.
    pub fn c_dot_block(basis: &[SpinorField], x: &SpinorField) -> Col<c64> {
        Col::from_fn(basis.len(), |i| basis[i].c_dot(x))
    }

    /// Batched complex axpy: `self += Σ_i coeffs_i * basis_i`.
    pub fn caxpy_block(&mut self, coeffs: ColRef<'_, c64>, basis: &[SpinorField]) {
        for (i, b) in basis.iter().enumerate().take(coeffs.nrows()) {
            self.caxpy(coeffs[i], b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> FieldGeometry {
        FieldGeometry::staggered([2, 2, 2, 2], 1, 3, Precision::Double)
    }

    #[test]
    fn geometry_sizes() {
        let g = geometry();
        assert_eq!(g.n_dim(), 5);
        assert_eq!(g.volume(), 16);
        assert_eq!(g.len(), 48);
        assert_eq!(g.dims(), [2, 2, 2, 2]);
        assert_eq!(FieldGeometry::flat(7).len(), 7);
    }

    #[test]
    fn dot_is_conjugate_symmetric() {
        let a = SpinorField::random(&geometry(), 1);
        let b = SpinorField::random(&geometry(), 2);
        let ab = a.c_dot(&b);
        let ba = b.c_dot(&a);
        assert!((ab - ba.conj()).norm() < 1e-13);
        assert!((a.c_dot(&a).re - a.norm2()).abs() < 1e-13);
    }

    #[test]
    fn caxpy_and_ax() {
        let g = geometry();
        let x = SpinorField::random(&g, 3);
        let mut y = SpinorField::zeros(&g);
        y.caxpy(c64::new(0.0, 2.0), &x);
        y.ax(0.5);
        // y = i x, so <x|y> = i ‖x‖²
        let d = x.c_dot(&y);
        assert!(d.re.abs() < 1e-13);
        assert!((d.im - x.norm2()).abs() < 1e-12);
    }

    #[test]
    fn views_share_storage() {
        let g = FieldGeometry::flat(4);
        let mut x = SpinorField::random(&g, 4);
        assert_eq!(x.as_mat().nrows(), 4);
        assert_eq!(x.as_mat().ncols(), 1);
        assert_eq!(x.as_col()[2], x.as_slice()[2]);
        x.as_mat_mut()[(1, 0)] = c64::new(7.0, -1.0);
        assert_eq!(x.as_slice()[1], c64::new(7.0, -1.0));
        assert!((x.norm() * x.norm() - x.norm2()).abs() < 1e-12);
    }

    #[test]
    fn random_is_reproducible() {
        let g = geometry();
        assert_eq!(SpinorField::random(&g, 9), SpinorField::random(&g, 9));
        assert_ne!(SpinorField::random(&g, 9), SpinorField::random(&g, 10));
    }

    #[test]
    fn from_vec_checks_length() {
        let g = FieldGeometry::flat(3);
        let err = SpinorField::from_vec(&g, vec![c64::new(1.0, 0.0); 2]).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::LengthMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn compatibility_checks_precision() {
        let g = geometry();
        let mut g_single = g.clone();
        g_single.precision = Precision::Single;
        let a = SpinorField::zeros(&g);
        let b = SpinorField::zeros(&g_single);
        assert!(a.check_compatible(&b).is_err());
    }
}
