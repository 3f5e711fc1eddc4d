//! 3D expansions: truncated spherical-harmonic series.
//!
//! A series interleaves a "local" part (non-negative powers of r, valid
//! inside a ball of evaluation points) and a "multipole" part (negative
//! powers, valid outside a ball containing the sources). Only non-negative
//! orders are stored; order −m follows from the Hermitian symmetry
//! M_{l,−m} = (−1)^m conj(M_{l,m}).
use std::f64::consts::PI;
use std::sync::RwLock;

use log::warn;
use num::complex::Complex64;
use num::Zero;
use once_cell::sync::Lazy;

use multipole_traits::parallel::PackedMessage;
use multipole_traits::types::{Coordinate, Spherical, Vector3};

use crate::buffer::{BinomialBuffer, CoefficientBuffer};
use crate::harmonic;
use crate::legendre::{tri_index, tri_size};

mod kkylin;
mod rotate;
mod translate;

fn beta_generator(l: usize, _buf: &CoefficientBuffer) -> f64 {
    (4.0 * PI / (2.0 * l as f64 + 1.0)).sqrt()
}

fn alpha_generator(l: usize, m: usize, buf: &BinomialBuffer) -> f64 {
    if l == 0 {
        return 1.0;
    }

    let (fl, fm) = (l as f64, m as f64);

    if m == 0 {
        return buf.get_unsafe(l - 1, 0) / fl;
    }

    if l == m {
        return buf.get_unsafe(l - 1, l - 1) / ((2.0 * fl - 1.0) * 2.0 * fl).sqrt();
    }

    ((fl - fm + 1.0) / (fl + fm)).sqrt() * buf.get_unsafe(l, m - 1)
}

static BETA: Lazy<RwLock<CoefficientBuffer>> =
    Lazy::new(|| RwLock::new(CoefficientBuffer::new(beta_generator, 32)));

static ALPHA: Lazy<RwLock<BinomialBuffer>> =
    Lazy::new(|| RwLock::new(BinomialBuffer::new(alpha_generator, 32)));

/// β(l) = √(4π/(2l+1)).
pub fn beta(l: usize) -> f64 {
    {
        let table = BETA.read().unwrap();
        if l <= table.max_index() {
            return table.get_unsafe(l);
        }
    }
    BETA.write().unwrap().get(l)
}

/// α(l, m) = 1/√((l−m)!·(l+m)!), built by its left-to-right recurrence.
pub fn alpha(l: usize, m: usize) -> f64 {
    {
        let table = ALPHA.read().unwrap();
        if l as isize <= table.max_degree() {
            return table.get_unsafe(l, m);
        }
    }
    let mut table = ALPHA.write().unwrap();
    table.require(l);
    table.get_unsafe(l, m)
}

pub fn beta_require(deg: usize) {
    BETA.write().unwrap().require(deg);
}

pub fn alpha_require(deg: usize) {
    ALPHA.write().unwrap().require(deg);
}

/// A truncated spherical-harmonic series about a center:
///
///   f(r,θ,φ) = Σ_{l≤posdeg} Σ_m M_{l,m}·Y_l^m(θ,φ)·r^l
///            + Σ_{l<negdeg} Σ_m L_{l,m}·Y_l^m(θ,φ)·r^{−l−1}
#[derive(Clone, Debug, PartialEq)]
pub struct SphericalSeries {
    posdeg: usize,
    negdeg: usize,
    pos: Vec<Complex64>,
    neg: Vec<Complex64>,
}

impl SphericalSeries {
    /// A zeroed series with the given local (positive) and multipole
    /// (negative) degrees. Warms the α/β tables up to the needed degree.
    pub fn new(posdeg: usize, negdeg: usize) -> SphericalSeries {
        beta_require(posdeg + negdeg);
        alpha_require(posdeg + negdeg);

        SphericalSeries {
            posdeg,
            negdeg,
            pos: vec![Complex64::zero(); tri_size(posdeg)],
            neg: vec![Complex64::zero(); negdeg * (negdeg + 1) / 2],
        }
    }

    pub fn posdeg(&self) -> usize {
        self.posdeg
    }

    pub fn negdeg(&self) -> usize {
        self.negdeg
    }

    /// Local term M_{l,m}, 0 <= m <= l <= posdeg.
    pub fn pos_term(&self, l: usize, m: usize) -> Complex64 {
        self.pos[tri_index(l, m)]
    }

    pub fn pos_term_mut(&mut self, l: usize, m: usize) -> &mut Complex64 {
        &mut self.pos[tri_index(l, m)]
    }

    /// Multipole term L_{l,m}, 0 <= m <= l < negdeg.
    pub fn neg_term(&self, l: usize, m: usize) -> Complex64 {
        self.neg[tri_index(l, m)]
    }

    pub fn neg_term_mut(&mut self, l: usize, m: usize) -> &mut Complex64 {
        &mut self.neg[tri_index(l, m)]
    }

    pub(crate) fn pos_row(&self, l: usize) -> &[Complex64] {
        &self.pos[tri_index(l, 0)..tri_index(l, 0) + l + 1]
    }

    pub(crate) fn neg_row(&self, l: usize) -> &[Complex64] {
        &self.neg[tri_index(l, 0)..tri_index(l, 0) + l + 1]
    }

    /// Signed-degree access: degree `l >= 0` addresses the local part,
    /// `l < 0` the multipole term of degree `−l − 1` (the r^l exponent).
    pub fn term(&self, l: i32, m: usize) -> Complex64 {
        if l < 0 {
            self.neg_term((-l - 1) as usize, m)
        } else {
            self.pos_term(l as usize, m)
        }
    }

    pub fn term_mut(&mut self, l: i32, m: usize) -> &mut Complex64 {
        if l < 0 {
            self.neg_term_mut((-l - 1) as usize, m)
        } else {
            self.pos_term_mut(l as usize, m)
        }
    }

    pub fn set_zero(&mut self) {
        for c in &mut self.pos {
            *c = Complex64::zero();
        }
        for c in &mut self.neg {
            *c = Complex64::zero();
        }
    }

    /// Copies into `dst` up to its degrees; truncation emits a diagnostic.
    pub fn copy_into(&self, dst: &mut SphericalSeries) {
        if self.posdeg > dst.posdeg || self.negdeg > dst.negdeg {
            warn!(
                "copying ({}, {}) series into ({}, {}) loses precision",
                self.posdeg, self.negdeg, dst.posdeg, dst.negdeg
            );
        }

        dst.set_zero();
        let pn = tri_size(self.posdeg.min(dst.posdeg));
        dst.pos[..pn].copy_from_slice(&self.pos[..pn]);

        let nd = self.negdeg.min(dst.negdeg);
        let nn = nd * (nd + 1) / 2;
        dst.neg[..nn].copy_from_slice(&self.neg[..nn]);
    }

    /// Accumulates `other` termwise over the common degree ranges.
    pub fn add(&mut self, other: &SphericalSeries) {
        let pn = tri_size(self.posdeg.min(other.posdeg));
        for i in 0..pn {
            self.pos[i] += other.pos[i];
        }

        let nd = self.negdeg.min(other.negdeg);
        for i in 0..nd * (nd + 1) / 2 {
            self.neg[i] += other.neg[i];
        }
    }

    /// Degree the harmonics must reach to evaluate this series.
    fn eval_degree(&self) -> usize {
        self.posdeg.max(self.negdeg.saturating_sub(1))
    }

    /// Evaluates at a point given in spherical form. Horner in r on the
    /// local part, Horner in 1/r on the multipole part; at r = 0 the
    /// multipole part contributes zero by convention.
    pub fn evaluate_internal(&self, s: &Spherical) -> Complex64 {
        let n = self.eval_degree();
        let mut harmonics = vec![Complex64::zero(); tri_size(n)];
        harmonic::evaluate_multiple_internal(
            n,
            s.cos_theta,
            s.sin_theta,
            Complex64::new(s.cos_phi, s.sin_phi),
            &mut harmonics,
        );

        let mut res = Complex64::zero();

        for l in (0..=self.posdeg).rev() {
            let coeff = self.pos_row(l);
            let hrow = &harmonics[tri_index(l, 0)..];

            let mut pair = 0.0;
            for m in 1..=l {
                pair += (coeff[m] * hrow[m]).re;
            }
            let sum = coeff[0] * hrow[0] + 2.0 * pair;

            res = res * s.r + sum;
        }

        if self.negdeg != 0 && s.r > 0.0 {
            let invr = 1.0 / s.r;
            let mut negres = Complex64::zero();

            for l in (0..self.negdeg).rev() {
                let coeff = self.neg_row(l);
                let hrow = &harmonics[tri_index(l, 0)..];

                let mut pair = 0.0;
                for m in 1..=l {
                    pair += (coeff[m] * hrow[m]).re;
                }
                let sum = coeff[0] * hrow[0] + 2.0 * pair;

                negres = (negres + sum) * invr;
            }

            res += negres;
        }

        res
    }

    /// Evaluates at `x` relative to the series center.
    pub fn evaluate(&self, x: &Vector3) -> Complex64 {
        self.evaluate_internal(&x.to_spherical())
    }

    /// Angular sums shared by the gradient evaluations: the θ-derivative
    /// mixes same-order and order-shifted harmonics, the φ-derivative uses
    /// the sin-θ-reduced values.
    fn angular_gradient_sums(
        l: usize,
        coeff: &[Complex64],
        harmonics: &[Complex64],
        special: &[Complex64],
        cost: f64,
        conj_expp: Complex64,
    ) -> (f64, f64, f64) {
        let hrow = &harmonics[tri_index(l, 0)..];
        let shrow = &special[tri_index(l, 0)..];
        let fl = l as f64;

        let mut sumr = 0.0;
        let mut sumt = 0.0;
        let mut sump = 0.0;

        for m in 1..=l {
            let fm = m as f64;
            sumr += (hrow[m] * coeff[m]).re;
            sumt += (shrow[m] * coeff[m]).re * (cost * fm);
            sump += (shrow[m] * coeff[m]).im * fm;
        }
        for m in 1..l {
            let fm = m as f64;
            sumt += (hrow[m + 1] * coeff[m] * conj_expp).re * ((fl - fm) * (fl + fm + 1.0)).sqrt();
        }

        sumr = 2.0 * sumr + (hrow[0] * coeff[0]).re;
        sumt = 2.0 * sumt + (hrow[1] * coeff[0] * conj_expp).re * (fl * (fl + 1.0)).sqrt();
        sump *= -2.0;

        (sumr, sumt, sump)
    }

    /// Gradient of the local part in spherical components
    /// (∂f/∂r, r⁻¹·∂f/∂θ, (r·sin θ)⁻¹·∂f/∂φ).
    pub fn local_gradient_evaluate_internal(&self, s: &Spherical) -> (f64, f64, f64) {
        let deg = self.posdeg;
        let expp = Complex64::new(s.cos_phi, s.sin_phi);
        let mut harmonics = vec![Complex64::zero(); tri_size(deg)];
        let mut special = vec![Complex64::zero(); tri_size(deg)];
        harmonic::pre_gradient_multiple_internal(
            deg,
            s.cos_theta,
            s.sin_theta,
            expp,
            &mut harmonics,
            &mut special,
        );

        let conj_expp = expp.conj();
        let mut dr = 0.0;
        let mut dt = 0.0;
        let mut dp = 0.0;

        for l in (1..=deg).rev() {
            let (sumr, sumt, sump) = Self::angular_gradient_sums(
                l,
                self.pos_row(l),
                &harmonics,
                &special,
                s.cos_theta,
                conj_expp,
            );

            dr = dr * s.r + sumr * l as f64;
            dt = dt * s.r + sumt;
            dp = dp * s.r + sump;
        }

        (dr, dt, dp)
    }

    /// Gradient of the multipole part in the same spherical components.
    /// Not defined at r = 0.
    pub fn multipole_gradient_evaluate_internal(&self, s: &Spherical) -> (f64, f64, f64) {
        if self.negdeg == 0 {
            return (0.0, 0.0, 0.0);
        }

        let deg = self.negdeg - 1;
        let expp = Complex64::new(s.cos_phi, s.sin_phi);
        let mut harmonics = vec![Complex64::zero(); tri_size(deg)];
        let mut special = vec![Complex64::zero(); tri_size(deg)];
        harmonic::pre_gradient_multiple_internal(
            deg,
            s.cos_theta,
            s.sin_theta,
            expp,
            &mut harmonics,
            &mut special,
        );

        let conj_expp = expp.conj();
        let invr = 1.0 / s.r;
        let mut dr = 0.0;
        let mut dt = 0.0;
        let mut dp = 0.0;

        for l in (0..=deg).rev() {
            let (sumr, sumt, sump) = if l > 0 {
                Self::angular_gradient_sums(
                    l,
                    self.neg_row(l),
                    &harmonics,
                    &special,
                    s.cos_theta,
                    conj_expp,
                )
            } else {
                ((harmonics[0] * self.neg_row(0)[0]).re, 0.0, 0.0)
            };

            dr = dr * invr + sumr * (l + 1) as f64;
            dt = dt * invr + sumt;
            dp = dp * invr + sump;
        }

        let invr2 = invr * invr;
        (-dr * invr2, dt * invr2, dp * invr2)
    }

    /// Cartesian gradient of the local part at `x`.
    pub fn local_gradient_evaluate(&self, x: &Vector3) -> Vector3 {
        let s = x.to_spherical();
        let (dr, dt, dp) = self.local_gradient_evaluate_internal(&s);
        spherical_gradient_to_cartesian(&s, dr, dt, dp)
    }

    /// Cartesian gradient of the multipole part at `x`.
    pub fn multipole_gradient_evaluate(&self, x: &Vector3) -> Vector3 {
        let s = x.to_spherical();
        let (dr, dt, dp) = self.multipole_gradient_evaluate_internal(&s);
        spherical_gradient_to_cartesian(&s, dr, dt, dp)
    }

    /// Appends every coefficient to `msg`; the peer must unpack into a
    /// series of identical degrees.
    pub fn pack(&self, msg: &mut PackedMessage) {
        for c in self.pos.iter().chain(self.neg.iter()) {
            msg.put_f64(c.re);
            msg.put_f64(c.im);
        }
    }

    pub fn unpack(&mut self, msg: &mut PackedMessage) {
        for c in self.pos.iter_mut().chain(self.neg.iter_mut()) {
            c.re = msg.get_f64();
            c.im = msg.get_f64();
        }
    }
}

/// Composes spherical gradient components into the Cartesian frame.
pub fn spherical_gradient_to_cartesian(s: &Spherical, dr: f64, dt: f64, dp: f64) -> Vector3 {
    Vector3 {
        x: s.sin_theta * s.cos_phi * dr + s.cos_theta * s.cos_phi * dt - s.sin_phi * dp,
        y: s.sin_theta * s.sin_phi * dr + s.cos_theta * s.sin_phi * dt + s.cos_phi * dp,
        z: s.cos_theta * dr - s.sin_theta * dt,
    }
}


#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::fixtures::{newton_local, newton_multipole};
    use super::*;

    #[test]
    fn alpha_beta_closed_forms() {
        fn factorial(n: usize) -> f64 {
            (1..=n).map(|i| i as f64).product()
        }

        for l in 0..16 {
            assert_relative_eq!(
                beta(l),
                (4.0 * PI / (2.0 * l as f64 + 1.0)).sqrt(),
                epsilon = 1e-14
            );
            for m in 0..=l {
                assert_relative_eq!(
                    alpha(l, m),
                    1.0 / (factorial(l - m) * factorial(l + m)).sqrt(),
                    max_relative = 1e-12
                );
            }
        }
    }

    #[test]
    fn multipole_matches_newton_potential() {
        let p = Vector3::new(0.2, -0.1, 0.15);
        let series = newton_multipole(24, &p, 1.0);

        for &(x, y, z) in &[(1.0, 0.0, 0.0), (0.0, -1.2, 0.3), (0.7, 0.7, -0.7)] {
            let at = Vector3::new(x, y, z);
            let reference = 1.0 / at.dist(&p);
            let got = series.evaluate(&at);
            assert_relative_eq!(got.re, reference, max_relative = 1e-9);
            assert_relative_eq!(got.im, 0.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn local_matches_newton_potential() {
        let p = Vector3::new(3.0, -1.0, 2.0);
        let series = newton_local(24, &p, 0.5);

        for &(x, y, z) in &[(0.3, 0.0, 0.0), (-0.2, 0.4, 0.1), (0.0, 0.0, -0.5)] {
            let at = Vector3::new(x, y, z);
            let reference = 0.5 / at.dist(&p);
            let got = series.evaluate(&at);
            assert_relative_eq!(got.re, reference, max_relative = 1e-9);
        }
    }

    #[test]
    fn pure_multipole_is_zero_at_origin() {
        let series = newton_multipole(12, &Vector3::new(0.4, 0.0, 0.1), 1.0);
        assert_eq!(series.evaluate(&Vector3::ZERO), Complex64::zero());
    }

    #[test]
    fn zeroed_series_accumulates_like_source() {
        let a = newton_multipole(10, &Vector3::new(0.1, 0.2, 0.3), 2.0);
        let mut b = SphericalSeries::new(0, 10);
        b.set_zero();
        b.add(&a);
        let x = Vector3::new(1.5, -0.5, 0.25);
        assert_eq!(a.evaluate(&x), b.evaluate(&x));
    }

    #[test]
    fn local_gradient_matches_newton_field() {
        let p = Vector3::new(3.0, -1.0, -1.0);
        let series = newton_local(28, &p, 1.0);

        for &(x, y, z) in &[(0.3, 0.2, -0.1), (-0.4, 0.0, 0.3), (0.1, -0.5, 0.0)] {
            let at = Vector3::new(x, y, z);
            let grad = series.local_gradient_evaluate(&at);

            // ∇(1/|x − p|) = −(x − p)/|x − p|³
            let diff = at.sub(&p);
            let r = diff.norm();
            let want = diff.scale(-1.0 / (r * r * r));

            assert!(grad.dist(&want) / want.norm() < 1e-8);
        }
    }

    #[test]
    fn multipole_gradient_matches_newton_field() {
        let p = Vector3::new(0.2, 0.15, -0.1);
        let series = newton_multipole(28, &p, 1.0);

        for &(x, y, z) in &[(1.2, 0.0, 0.4), (-0.9, 0.8, 0.0), (0.0, -1.1, 0.6)] {
            let at = Vector3::new(x, y, z);
            let grad = series.multipole_gradient_evaluate(&at);

            let diff = at.sub(&p);
            let r = diff.norm();
            let want = diff.scale(-1.0 / (r * r * r));

            assert!(grad.dist(&want) / want.norm() < 1e-8);
        }
    }

    #[test]
    fn copy_truncates_to_destination_degrees() {
        let a = newton_multipole(12, &Vector3::new(0.3, 0.1, 0.0), 1.0);
        let mut b = SphericalSeries::new(0, 8);
        a.copy_into(&mut b);
        for l in 0..8 {
            for m in 0..=l {
                assert_eq!(a.neg_term(l, m), b.neg_term(l, m));
            }
        }
    }

    #[test]
    fn pack_unpack_round_trip() {
        let a = newton_multipole(9, &Vector3::new(0.25, -0.3, 0.2), 1.5);
        let mut msg = PackedMessage::new();
        a.pack(&mut msg);

        let mut msg = PackedMessage::from_bytes(msg.into_bytes());
        let mut b = SphericalSeries::new(0, 9);
        b.unpack(&mut msg);
        assert!(msg.exhausted());
        assert_eq!(a, b);
    }
}
