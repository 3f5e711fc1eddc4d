//! 2D expansions: truncated Laurent/Taylor series in a complex variable.
use log::warn;
use num::complex::Complex64;
use num::Zero;

use multipole_traits::parallel::PackedMessage;

use crate::binomial::binomial;

/// A polynomial Σ c_i·z^i with i in [-negdeg, posdeg], centered wherever the
/// caller says it is. The negative-degree part is the multipole half of a 2D
/// expansion, the positive-degree part the local (Taylor) half.
#[derive(Clone, Debug, PartialEq)]
pub struct LaurentSeries {
    posdeg: usize,
    negdeg: usize,
    coeffs: Vec<Complex64>,
}

impl LaurentSeries {
    /// A zeroed series with terms from z^posdeg down to z^{-negdeg}.
    pub fn new(posdeg: usize, negdeg: usize) -> LaurentSeries {
        LaurentSeries {
            posdeg,
            negdeg,
            coeffs: vec![Complex64::zero(); posdeg + negdeg + 1],
        }
    }

    pub fn posdeg(&self) -> usize {
        self.posdeg
    }

    pub fn negdeg(&self) -> usize {
        self.negdeg
    }

    /// Coefficient of z^i. Panics outside [-negdeg, posdeg].
    pub fn term(&self, i: i32) -> Complex64 {
        self.coeffs[(i + self.negdeg as i32) as usize]
    }

    pub fn term_mut(&mut self, i: i32) -> &mut Complex64 {
        &mut self.coeffs[(i + self.negdeg as i32) as usize]
    }

    pub fn set_zero(&mut self) {
        for c in &mut self.coeffs {
            *c = Complex64::zero();
        }
    }

    /// Copies into `dst`, truncating to its degrees. Truncation is a
    /// precision loss the caller accepted; a diagnostic is emitted.
    pub fn copy_into(&self, dst: &mut LaurentSeries) {
        if self.posdeg > dst.posdeg || self.negdeg > dst.negdeg {
            warn!(
                "copying ({}, {}) series into ({}, {}) loses precision",
                self.posdeg, self.negdeg, dst.posdeg, dst.negdeg
            );
        }

        dst.set_zero();
        let pd = self.posdeg.min(dst.posdeg) as i32;
        let nd = self.negdeg.min(dst.negdeg) as i32;
        for i in -nd..=pd {
            *dst.term_mut(i) = self.term(i);
        }
    }

    /// Accumulates `other` termwise over the common degree range.
    pub fn add(&mut self, other: &LaurentSeries) {
        let pd = self.posdeg.min(other.posdeg) as i32;
        let nd = self.negdeg.min(other.negdeg) as i32;
        for i in -nd..=pd {
            *self.term_mut(i) += other.term(i);
        }
    }

    /// Evaluates the series at `z` (relative to the center). Horner on both
    /// halves; for z = 0 the negative part contributes zero by convention.
    pub fn evaluate(&self, z: Complex64) -> Complex64 {
        let mut pos = self.term(self.posdeg as i32);
        for i in (0..self.posdeg as i32).rev() {
            pos = pos * z + self.term(i);
        }

        let mut res = pos;

        if self.negdeg > 0 && !z.is_zero() {
            let invz = z.inv();
            let mut neg = self.term(-(self.negdeg as i32));
            for j in (1..self.negdeg as i32).rev() {
                neg = neg * invz + self.term(-j);
            }
            // negative terms begin with degree -1
            res += neg * invz;
        }

        res
    }

    fn taylor_translate(&self, dst: &mut LaurentSeries, delta: Complex64) {
        if self.posdeg > dst.posdeg {
            warn!(
                "translating positive degree {} into {} loses precision",
                self.posdeg, dst.posdeg
            );
        }

        for i in 0..=dst.posdeg {
            let mut sum = Complex64::zero();
            for j in (i..=self.posdeg).rev() {
                sum = sum * delta + binomial(j, i) * self.term(j as i32);
            }
            *dst.term_mut(i as i32) += sum;
        }
    }

    /// Translates this series to a new center and accumulates into `dst`:
    /// with Δ = z_dst − z_src,
    ///
    ///   B_i    += Σ_{j≥i} C(j,i)·A_j·Δ^{j−i}
    ///   B_{−i} += Σ_{j=1}^{min(i,n⁻)} C(i−1,j−1)·A_{−j}·(−Δ)^{i−j}
    pub fn translate(&self, zsrc: Complex64, dst: &mut LaurentSeries, zdst: Complex64) {
        let delta = zdst - zsrc;

        self.taylor_translate(dst, delta);

        if self.negdeg > 0 {
            if self.negdeg > dst.negdeg {
                warn!(
                    "translating negative degree {} into {} loses precision",
                    self.negdeg, dst.negdeg
                );
            }

            let u = zsrc - zdst;
            for i in 1..=dst.negdeg {
                let jmax = i.min(self.negdeg);
                let mut sum = Complex64::zero();
                for j in 1..=jmax {
                    sum = sum * u + binomial(i - 1, j - 1) * self.term(-(j as i32));
                }
                if jmax < i {
                    sum *= u.powi((i - jmax) as i32);
                }
                *dst.term_mut(-(i as i32)) += sum;
            }
        }
    }

    /// Converts the negative-degree part into the positive-degree part of
    /// `dst` around a different center, the 2D multipole-to-local
    /// transformation. Built on the kernel identity
    ///
    ///   1/(z − z_s) = Σ_{i≥0} (−1)^i/Δ^{i+1}·(z − z_d)^i,  Δ = z_d − z_s
    ///
    /// folded to higher Laurent orders with binomial weights. The positive
    /// part of the source translates unchanged. Accumulates into `dst`.
    pub fn to_local(&self, zsrc: Complex64, dst: &mut LaurentSeries, zdst: Complex64) {
        let delta = zdst - zsrc;

        self.taylor_translate(dst, delta);

        if self.negdeg > 0 {
            if self.negdeg > dst.posdeg {
                warn!(
                    "local conversion of negative degree {} into positive degree {} \
                     loses precision",
                    self.negdeg, dst.posdeg
                );
            }

            let invd = delta.inv();
            let mut pow = Complex64::new(1.0, 0.0);
            for i in 0..=dst.posdeg {
                let mut sum = Complex64::zero();
                for j in (1..=self.negdeg).rev() {
                    sum = (sum + binomial(i + j - 1, j - 1) * self.term(-(j as i32))) * invd;
                }
                *dst.term_mut(i as i32) += sum * pow;
                pow *= -invd;
            }
        }
    }

    /// Appends every coefficient to `msg`. The peer must unpack into a
    /// series of identical degrees.
    pub fn pack(&self, msg: &mut PackedMessage) {
        for c in &self.coeffs {
            msg.put_f64(c.re);
            msg.put_f64(c.im);
        }
    }

    pub fn unpack(&mut self, msg: &mut PackedMessage) {
        for c in &mut self.coeffs {
            c.re = msg.get_f64();
            c.im = msg.get_f64();
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn assert_close(a: Complex64, b: Complex64, tol: f64) {
        assert!(
            (a - b).norm() <= tol * b.norm().max(1.0),
            "{a} != {b} (tol {tol})"
        );
    }

    /// Multipole series of 1/(z - c) around the origin: a_{-j} = c^{j-1}.
    fn pole_series(order: usize, c: Complex64) -> LaurentSeries {
        let mut s = LaurentSeries::new(0, order);
        let mut pow = Complex64::new(1.0, 0.0);
        for j in 1..=order {
            *s.term_mut(-(j as i32)) = pow;
            pow *= c;
        }
        s
    }

    #[test]
    fn evaluate_geometric_series() {
        let c = Complex64::new(1.0, 0.0);
        let s = pole_series(40, c);

        for &(re, im) in &[(2.5, 0.0), (0.0, 3.0), (-2.0, 1.5)] {
            let z = Complex64::new(re, im);
            assert_close(s.evaluate(z), (z - c).inv(), 1e-10);
        }
    }

    #[test]
    fn evaluate_at_zero_skips_multipole_part() {
        let s = pole_series(10, Complex64::new(1.0, 0.0));
        assert_eq!(s.evaluate(Complex64::zero()), Complex64::zero());
    }

    #[test]
    fn zeroed_series_accumulates_like_source() {
        let c = Complex64::new(0.3, -0.2);
        let a = pole_series(16, c);
        let mut b = LaurentSeries::new(0, 16);
        b.set_zero();
        b.add(&a);
        let z = Complex64::new(2.0, 1.0);
        assert_eq!(a.evaluate(z), b.evaluate(z));
    }

    #[test]
    fn multipole_translation_preserves_far_field() {
        // Source at c, multipole about the origin, translated to zd.
        let c = Complex64::new(0.2, 0.1);
        let src = pole_series(30, c);
        let zd = Complex64::new(0.5, -0.5);

        let mut dst = LaurentSeries::new(0, 30);
        src.translate(Complex64::zero(), &mut dst, zd);

        for &(re, im) in &[(4.0, 0.0), (0.0, -4.0), (3.0, 3.0)] {
            let z = Complex64::new(re, im);
            let reference = (z - c).inv();
            assert_close(dst.evaluate(z - zd), reference, 1e-9);
        }
    }

    #[test]
    fn translation_round_trip_recovers_series() {
        let c = Complex64::new(0.1, 0.4);
        let src = pole_series(20, c);
        let zd = Complex64::new(0.3, 0.2);

        let mut there = LaurentSeries::new(0, 20);
        src.translate(Complex64::zero(), &mut there, zd);
        let mut back = LaurentSeries::new(0, 20);
        there.translate(zd, &mut back, Complex64::zero());

        for j in 1..=20 {
            let want = src.term(-j);
            let got = back.term(-j);
            assert_relative_eq!(got.re, want.re, epsilon = 1e-8, max_relative = 1e-8);
            assert_relative_eq!(got.im, want.im, epsilon = 1e-8, max_relative = 1e-8);
        }
    }

    #[test]
    fn taylor_translation_is_exact_for_polynomials() {
        // f(z) = 1 + 2z + 3z^2 recentred: exact for any shift.
        let mut src = LaurentSeries::new(2, 0);
        *src.term_mut(0) = Complex64::new(1.0, 0.0);
        *src.term_mut(1) = Complex64::new(2.0, 0.0);
        *src.term_mut(2) = Complex64::new(3.0, 0.0);

        let zd = Complex64::new(-1.0, 0.5);
        let mut dst = LaurentSeries::new(2, 0);
        src.translate(Complex64::zero(), &mut dst, zd);

        for &(re, im) in &[(0.7, -0.3), (2.0, 2.0), (0.0, 0.0)] {
            let z = Complex64::new(re, im);
            let f = src.evaluate(z);
            assert_close(dst.evaluate(z - zd), f, 1e-13);
        }
    }

    #[test]
    fn to_local_converges_near_destination() {
        let c = Complex64::new(0.1, -0.1);
        let src = pole_series(30, c);
        let zd = Complex64::new(5.0, 0.0);

        let mut local = LaurentSeries::new(30, 0);
        src.to_local(Complex64::zero(), &mut local, zd);

        for &(re, im) in &[(0.5, 0.0), (-0.4, 0.3), (0.0, -0.6)] {
            let dz = Complex64::new(re, im);
            let reference = (zd + dz - c).inv();
            assert_close(local.evaluate(dz), reference, 1e-9);
        }
    }

    #[test]
    fn pack_unpack_round_trip() {
        let src = pole_series(12, Complex64::new(0.7, 0.2));
        let mut msg = PackedMessage::new();
        src.pack(&mut msg);

        let mut msg = PackedMessage::from_bytes(msg.into_bytes());
        let mut dst = LaurentSeries::new(0, 12);
        dst.unpack(&mut msg);
        assert!(msg.exhausted());
        assert_eq!(src, dst);
    }
}
