//! Point-and-shoot translations: rotate the translation axis onto +z,
//! apply the vertical-only operator, rotate back. O(p³) end to end.
use num::complex::Complex64;
use num::Zero;

use multipole_traits::types::{Coordinate, Vector3};

use crate::harmonic::sph_sym;
use crate::wigner::{Wigner, WignerRepo};

use super::SphericalSeries;

/// Rotates one triangular coefficient buffer of degree `deg`, accumulating
/// into `dst`. Negative orders of the source are reconstructed through the
/// Hermitian symmetry.
fn buffer_rotate(aw: &Wigner, deg: usize, src: &[Complex64], dst: &mut [Complex64]) {
    let mut src_l = vec![Complex64::zero(); deg + 1];
    let mut src_l_neg = vec![Complex64::zero(); deg + 1];

    let mut offset = 0;
    for l in 0..=deg {
        for m in 0..=l {
            src_l[m] = src[offset + m];
            src_l_neg[m] = sph_sym(src_l[m], m);
        }

        for mprime in 0..=l {
            let mut sum = Complex64::zero();

            for m in 1..=l as i64 {
                sum += aw.term(l, mprime, -m) * src_l_neg[m as usize];
            }
            for m in 0..=l {
                sum += aw.term(l, mprime, m as i64) * src_l[m];
            }

            dst[offset + mprime] += sum;
        }

        offset += l + 1;
    }
}

impl SphericalSeries {
    /// Rotates this series by the ZYZ Euler angles (α, β, γ), accumulating
    /// into `dst`. Condition 0 <= β < π must hold.
    pub fn rotate(&self, alpha: f64, beta: f64, gamma: f64, dst: &mut SphericalSeries) {
        let pd = self.posdeg.min(dst.posdeg);
        let nd = self.negdeg.min(dst.negdeg);
        let lmax = (pd + 1).max(nd);

        let aw = WignerRepo::lookup(alpha, beta, gamma, lmax);

        buffer_rotate(&aw, pd, &self.pos, &mut dst.pos);

        if nd > 0 {
            buffer_rotate(&aw, nd - 1, &self.neg, &mut dst.neg);
        }
    }

    /// Undoes [`SphericalSeries::rotate`] with the same angles: rotating and
    /// then inverse-rotating accumulates the identity.
    pub fn rotate_inverse(&self, alpha: f64, beta: f64, gamma: f64, dst: &mut SphericalSeries) {
        let pd = self.posdeg.min(dst.posdeg);
        let nd = self.negdeg.min(dst.negdeg);
        let lmax = (pd + 1).max(nd);

        let aw = WignerRepo::lookup(-gamma, -beta, -alpha, lmax);

        buffer_rotate(&aw, pd, &self.pos, &mut dst.pos);

        if nd > 0 {
            buffer_rotate(&aw, nd - 1, &self.neg, &mut dst.neg);
        }
    }

    /// [`SphericalSeries::translate`] by point-and-shoot.
    pub fn translate_rotate(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let mut rot = SphericalSeries::new(self.posdeg, self.negdeg);
        let mut trans = SphericalSeries::new(dst.posdeg, dst.negdeg);

        let mut dir = xdst.sub(xsrc);
        let mut cost = 1.0;
        if dir.z < 0.0 {
            cost = -1.0;
            dir = dir.scale(-1.0);
        }

        let (r, theta, phi) = dir.to_angles();

        self.rotate(-phi, theta, 0.0, &mut rot);
        rot.translate_vertical(&mut trans, r, cost);
        trans.rotate_inverse(-phi, theta, 0.0, dst);
    }

    /// [`SphericalSeries::to_local`] by point-and-shoot.
    pub fn to_local_rotate(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let mut rot = SphericalSeries::new(self.posdeg, self.negdeg);
        let mut trans = SphericalSeries::new(dst.posdeg, dst.negdeg);

        let mut dir = xdst.sub(xsrc);
        let mut cost = 1.0;
        if dir.z < 0.0 {
            cost = -1.0;
            dir = dir.scale(-1.0);
        }

        let (r, theta, phi) = dir.to_angles();

        self.rotate(-phi, theta, 0.0, &mut rot);
        rot.to_local_vertical(&mut trans, r, cost);
        trans.rotate_inverse(-phi, theta, 0.0, dst);
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::super::fixtures::{newton_local, newton_multipole};
    use super::*;

    #[test]
    fn rotation_round_trip_recovers_series() {
        let src = newton_multipole(16, &Vector3::new(0.2, -0.3, 0.1), 1.0);
        let (alpha, beta, gamma) = (0.6, 1.1, -0.8);

        let mut rotated = SphericalSeries::new(0, 16);
        src.rotate(alpha, beta, gamma, &mut rotated);
        let mut back = SphericalSeries::new(0, 16);
        rotated.rotate_inverse(alpha, beta, gamma, &mut back);

        for l in 0..16 {
            for m in 0..=l {
                let want = src.neg_term(l, m);
                let got = back.neg_term(l, m);
                assert_relative_eq!(got.re, want.re, epsilon = 1e-11, max_relative = 1e-9);
                assert_relative_eq!(got.im, want.im, epsilon = 1e-11, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn rotation_is_a_change_of_frame() {
        // Evaluating the rotated series along +z must reproduce the
        // original potential along the rotated axis.
        let p = Vector3::new(0.2, 0.1, -0.15);
        let src = newton_multipole(24, &p, 1.0);

        let (theta, phi) = (0.9f64, 0.4f64);
        let mut rotated = SphericalSeries::new(0, 24);
        src.rotate(-phi, theta, 0.0, &mut rotated);

        // the +z axis of the rotated frame is the (θ, φ) direction
        let axis = Vector3::new(
            theta.sin() * phi.cos(),
            theta.sin() * phi.sin(),
            theta.cos(),
        );

        for &r in &[1.5, 2.0, 3.0] {
            let got = rotated.evaluate(&Vector3::new(0.0, 0.0, r)).re;
            let want = 1.0 / axis.scale(r).dist(&p);
            assert_relative_eq!(got, want, max_relative = 1e-9);
        }
    }

    #[test]
    fn translate_rotate_agrees_with_direct() {
        let src = newton_multipole(15, &Vector3::new(0.25, -0.05, 0.1), 1.0);
        let shift = Vector3::new(0.8, -1.1, 1.4);

        let mut direct = SphericalSeries::new(0, 15);
        src.translate(&Vector3::ZERO, &mut direct, &shift);

        let mut ps = SphericalSeries::new(0, 15);
        src.translate_rotate(&Vector3::ZERO, &mut ps, &shift);

        for l in 0..15 {
            for m in 0..=l {
                let want = direct.neg_term(l, m);
                let got = ps.neg_term(l, m);
                assert!(
                    (got - want).norm() <= 1e-9 * want.norm().max(1.0),
                    "({l},{m}): {got} vs {want}"
                );
            }
        }
    }

    #[test]
    fn translate_rotate_downward_shift() {
        // Exercises the axis flip taken when the shift points below the
        // equator.
        let src = newton_local(14, &Vector3::new(3.0, 2.0, -4.0), 1.0);
        let shift = Vector3::new(0.3, 0.2, -0.6);

        let mut direct = SphericalSeries::new(14, 0);
        src.translate(&Vector3::ZERO, &mut direct, &shift);

        let mut ps = SphericalSeries::new(14, 0);
        src.translate_rotate(&Vector3::ZERO, &mut ps, &shift);

        for l in 0..=14 {
            for m in 0..=l {
                let want = direct.pos_term(l, m);
                let got = ps.pos_term(l, m);
                assert!(
                    (got - want).norm() <= 1e-9 * want.norm().max(1.0),
                    "({l},{m}): {got} vs {want}"
                );
            }
        }
    }

    #[test]
    fn to_local_rotate_agrees_with_direct() {
        let src = newton_multipole(14, &Vector3::new(0.15, 0.2, -0.1), 1.0);
        let center = Vector3::new(-3.0, 2.0, 4.0);

        let mut direct = SphericalSeries::new(14, 0);
        src.to_local(&Vector3::ZERO, &mut direct, &center);

        let mut ps = SphericalSeries::new(14, 0);
        src.to_local_rotate(&Vector3::ZERO, &mut ps, &center);

        for l in 0..=14 {
            for m in 0..=l {
                let want = direct.pos_term(l, m);
                let got = ps.pos_term(l, m);
                assert!(
                    (got - want).norm() <= 1e-8 * want.norm().max(1.0),
                    "({l},{m}): {got} vs {want}"
                );
            }
        }
    }
}
