//! Gauge field with SU(3) link variables on a periodic 4D lattice.
//!
//! Links are stored as `links[site * 4 + mu]`, with sites in lexicographic
//! order (`x` fastest, `t` slowest), matching the site order of
//! [`SpinorField`](crate::field::SpinorField).

use crate::field::Precision;
use faer::c64;
use rand::{Rng, SeedableRng, rngs::StdRng};

const ZERO: c64 = c64 { re: 0.0, im: 0.0 };
const ONE: c64 = c64 { re: 1.0, im: 0.0 };

/// 3×3 complex matrix, row-major `m[row][col]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Su3Matrix {
    pub m: [[c64; 3]; 3],
}

impl Su3Matrix {
    pub const IDENTITY: Self = Self {
        m: [[ONE, ZERO, ZERO], [ZERO, ONE, ZERO], [ZERO, ZERO, ONE]],
    };

    pub const ZERO: Self = Self { m: [[ZERO; 3]; 3] };

    /// Conjugate transpose.
    pub fn adjoint(self) -> Self {
        let mut r = Self::ZERO;
        for i in 0..3 {
            for j in 0..3 {
                r.m[i][j] = self.m[j][i].conj();
            }
        }
        r
    }

    /// Determinant by cofactor expansion along the first row.
    pub fn det(self) -> c64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// A random SU(3) matrix: Gaussian-free uniform entries projected onto the group.
    pub fn random(rng: &mut StdRng) -> Self {
        let mut u = Self::ZERO;
        for row in &mut u.m {
            for v in row.iter_mut() {
                *v = c64::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5);
            }
        }
        u.reunitarize()
    }

    /// Project onto SU(3) by Gram-Schmidt on the first two rows; the third row is
    /// the conjugate cross product, which fixes `det = 1`.
    pub fn reunitarize(self) -> Self {
        let mut u = self;

        let n0 = row_norm(&u, 0);
        for v in &mut u.m[0] {
            *v /= n0;
        }

        let dot01 = row_dot(&u, 0, 1);
        for j in 0..3 {
            let r0 = u.m[0][j];
            u.m[1][j] -= r0 * dot01;
        }
        let n1 = row_norm(&u, 1);
        for v in &mut u.m[1] {
            *v /= n1;
        }

        u.m[2][0] = (u.m[0][1] * u.m[1][2] - u.m[0][2] * u.m[1][1]).conj();
        u.m[2][1] = (u.m[0][2] * u.m[1][0] - u.m[0][0] * u.m[1][2]).conj();
        u.m[2][2] = (u.m[0][0] * u.m[1][1] - u.m[0][1] * u.m[1][0]).conj();
        u
    }

    /// `out += U v` on one colour vector.
    #[inline]
    pub fn mul_vec_add(&self, v: &[c64], out: &mut [c64], scale: f64) {
        for (c, o) in out.iter_mut().enumerate().take(3) {
            let mut s = ZERO;
            for (cp, &vv) in v.iter().enumerate().take(3) {
                s += self.m[c][cp] * vv;
            }
            *o += s * scale;
        }
    }

    /// `out += U† v` on one colour vector.
    #[inline]
    pub fn adj_mul_vec_add(&self, v: &[c64], out: &mut [c64], scale: f64) {
        for (c, o) in out.iter_mut().enumerate().take(3) {
            let mut s = ZERO;
            for (cp, &vv) in v.iter().enumerate().take(3) {
                s += self.m[cp][c].conj() * vv;
            }
            *o += s * scale;
        }
    }
}

fn row_norm(u: &Su3Matrix, row: usize) -> f64 {
    u.m[row].iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt()
}

/// `⟨row r1 | row r2⟩` with the first row conjugated.
fn row_dot(u: &Su3Matrix, r1: usize, r2: usize) -> c64 {
    let mut s = ZERO;
    for j in 0..3 {
        s += u.m[r1][j].conj() * u.m[r2][j];
    }
    s
}

/// SU(3) gauge field with periodic boundary conditions.
#[derive(Clone, Debug)]
pub struct GaugeField {
    pub dims: [usize; 4],
    /// `links[site * 4 + mu]`
    pub links: Vec<Su3Matrix>,
    pub precision: Precision,
}

impl GaugeField {
    /// All links set to the identity.
    pub fn cold_start(dims: [usize; 4], precision: Precision) -> Self {
        let volume = dims.iter().product::<usize>();
        Self {
            dims,
            links: vec![Su3Matrix::IDENTITY; volume * 4],
            precision,
        }
    }

    /// Every link an independent random SU(3) matrix.
    pub fn random(dims: [usize; 4], precision: Precision, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let volume = dims.iter().product::<usize>();
        let links = (0..volume * 4).map(|_| Su3Matrix::random(&mut rng)).collect();
        Self {
            dims,
            links,
            precision,
        }
    }

    #[inline]
    pub fn volume(&self) -> usize {
        self.dims.iter().product()
    }

    /// Lexicographic site index, `x` fastest.
    #[inline]
    pub fn site_index(&self, x: [usize; 4]) -> usize {
        x[0] + self.dims[0] * (x[1] + self.dims[1] * (x[2] + self.dims[2] * x[3]))
    }

    /// Inverse of [`site_index`](Self::site_index).
    #[inline]
    pub fn site_coords(&self, mut idx: usize) -> [usize; 4] {
        let mut x = [0; 4];
        for (xi, &d) in x.iter_mut().zip(self.dims.iter()) {
            *xi = idx % d;
            idx /= d;
        }
        x
    }

    /// Neighbour in direction `mu` with periodic wrap.
    #[inline]
    pub fn neighbor(&self, x: [usize; 4], mu: usize, forward: bool) -> [usize; 4] {
        let mut y = x;
        let d = self.dims[mu];
        y[mu] = if forward {
            (x[mu] + 1) % d
        } else {
            (x[mu] + d - 1) % d
        };
        y
    }

    /// `U_mu(x)`
    #[inline]
    pub fn link(&self, x: [usize; 4], mu: usize) -> &Su3Matrix {
        &self.links[self.site_index(x) * 4 + mu]
    }

    pub fn set_link(&mut self, x: [usize; 4], mu: usize, u: Su3Matrix) {
        let idx = self.site_index(x);
        self.links[idx * 4 + mu] = u;
    }
}

/// Staggered phase `η_μ(x) = (−1)^{x_0 + … + x_{μ−1}}`.
#[inline]
pub fn staggered_phase(x: [usize; 4], mu: usize) -> f64 {
    let sum: usize = x[..mu].iter().sum();
    if sum % 2 == 0 { 1.0 } else { -1.0 }
}
