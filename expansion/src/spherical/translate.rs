//! Direct translation operators for spherical series.
//!
//! Term-by-term summation with the α/β normalisation tables. The vertical
//! specialisations drop every φ-dependent term and serve both the
//! |sin θ| ≈ 0 fallback of the general multipole-to-local conversion and
//! the point-and-shoot path.
use log::warn;
use num::complex::Complex64;
use num::Zero;

use multipole_traits::types::{Coordinate, Spherical, Vector3};

use crate::harmonic::{self, sph_sym};
use crate::legendre::{tri_index, tri_size};

use super::{alpha, alpha_require, beta, beta_require, SphericalSeries};

impl SphericalSeries {
    fn local_translate(&self, dst: &mut SphericalSeries, s: &Spherical) {
        if self.posdeg > dst.posdeg {
            warn!(
                "translating local degree {} into {} loses precision",
                self.posdeg, dst.posdeg
            );
        }

        let d = self.posdeg.max(dst.posdeg);
        beta_require(d);
        alpha_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(self.posdeg)];
        harmonic::evaluate_multiple_internal(
            self.posdeg,
            s.cos_theta,
            s.sin_theta,
            Complex64::new(s.cos_phi, s.sin_phi),
            &mut harmonics,
        );

        let mut rpow = vec![1.0; self.posdeg + 1];
        for l in 1..=self.posdeg {
            rpow[l] = rpow[l - 1] * s.r;
        }

        for l in 0..=dst.posdeg {
            for m in 0..=l {
                let mut acc = Complex64::zero();

                for n in l..=self.posdeg {
                    let normaliz = beta(n - l) * beta(l) / beta(n);
                    let srcrow = self.pos_row(n);
                    let hrow = &harmonics[tri_index(n - l, 0)..];
                    let mut sum = Complex64::zero();

                    for o in (l + m) as i64 - n as i64..=(m + n - l) as i64 {
                        let o_m_m = o - m as i64;
                        let abs_o_m_m = o_m_m.unsigned_abs() as usize;

                        let factor =
                            alpha(n - l, abs_o_m_m) * alpha(l, m) / alpha(n, o.unsigned_abs() as usize);

                        let mut h = hrow[abs_o_m_m];
                        if o_m_m < 0 {
                            h = sph_sym(h, abs_o_m_m);
                        }

                        if o >= 0 {
                            h *= srcrow[o as usize];
                        } else {
                            h *= sph_sym(srcrow[(-o) as usize], (-o) as usize);
                        }

                        sum += h * factor;
                    }

                    acc += sum * (normaliz * rpow[n - l]);
                }

                *dst.pos_term_mut(l, m) += acc;
            }
        }
    }

    fn multipole_translate(&self, dst: &mut SphericalSeries, s: &Spherical) {
        if self.negdeg > dst.negdeg {
            warn!(
                "translating multipole degree {} into {} loses precision",
                self.negdeg, dst.negdeg
            );
        }

        let d = self.negdeg.max(dst.negdeg) - 1;
        alpha_require(d);
        beta_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(dst.negdeg - 1)];
        harmonic::evaluate_multiple_internal(
            dst.negdeg - 1,
            s.cos_theta,
            s.sin_theta,
            Complex64::new(s.cos_phi, s.sin_phi),
            &mut harmonics,
        );

        let mut rpow = vec![1.0; dst.negdeg];
        for l in 1..dst.negdeg {
            rpow[l] = rpow[l - 1] * s.r;
        }

        for l in 0..dst.negdeg {
            for m in 0..=l {
                let mut acc = Complex64::zero();

                for n in 0..=l.min(self.negdeg - 1) {
                    let normaliz = beta(l - n) * beta(l) / beta(n);
                    let srcrow = self.neg_row(n);
                    let hrow = &harmonics[tri_index(l - n, 0)..];
                    let mut sum = Complex64::zero();

                    let lo = (-(n as i64)).max(m as i64 + n as i64 - l as i64);
                    let hi = (n as i64).min(l as i64 + m as i64 - n as i64);
                    for o in lo..=hi {
                        let m_m_o = m as i64 - o;
                        let abs_m_m_o = m_m_o.unsigned_abs() as usize;

                        let factor =
                            alpha(l - n, abs_m_m_o) * alpha(n, o.unsigned_abs() as usize) / alpha(l, m);

                        let mut h = hrow[abs_m_m_o].conj();
                        if m_m_o < 0 {
                            h = sph_sym(h, abs_m_m_o);
                        }

                        if o >= 0 {
                            h *= srcrow[o as usize];
                        } else {
                            h *= sph_sym(srcrow[(-o) as usize], (-o) as usize);
                        }

                        sum += h * factor;
                    }

                    acc += sum * normaliz * rpow[l - n];
                }

                *dst.neg_term_mut(l, m) += acc;
            }
        }
    }

    fn multipole_to_local(&self, dst: &mut SphericalSeries, s: &Spherical) {
        // sin θ in a tree-to-tree conversion is either essentially zero or
        // far from it
        if s.sin_theta.abs() < 1.0e-5 {
            self.to_local_vertical(dst, s.r, s.cos_theta);
            return;
        }

        let d = dst.posdeg + self.negdeg;
        alpha_require(d);
        beta_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(d)];
        harmonic::evaluate_multiple_internal(
            d,
            s.cos_theta,
            s.sin_theta,
            Complex64::new(s.cos_phi, s.sin_phi),
            &mut harmonics,
        );

        let inv_r = 1.0 / s.r;
        let mut rpow = vec![1.0; d + 1];
        for l in 1..=d {
            rpow[l] = rpow[l - 1] * inv_r;
        }

        let mut sign = 1.0;
        for l in 0..=dst.posdeg {
            for m in 0..=l {
                let mut acc = Complex64::zero();

                for n in 0..self.negdeg {
                    let normaliz = beta(l + n) * beta(l) / beta(n);
                    let srcrow = self.neg_row(n);
                    let hrow = &harmonics[tri_index(l + n, 0)..];

                    let mut sum =
                        alpha(l, m) * alpha(n, 0) / alpha(l + n, m) * hrow[m] * srcrow[0];

                    for o in 1..=n {
                        let factor = alpha(l, m) * alpha(n, o);

                        let m_p_o = m + o;
                        sum += hrow[m_p_o] * srcrow[o] * factor / alpha(l + n, m_p_o);

                        let m_m_o = m as i64 - o as i64;
                        let abs_m_m_o = m_m_o.unsigned_abs() as usize;
                        let mut h = hrow[abs_m_m_o];
                        if m_m_o < 0 {
                            h = sph_sym(h, abs_m_m_o);
                        }

                        sum += h * sph_sym(srcrow[o], o) * factor / alpha(l + n, abs_m_m_o);
                    }

                    acc += sum.conj() * sign * normaliz * rpow[l + n + 1];
                }

                *dst.pos_term_mut(l, m) += acc;
            }
            sign = -sign;
        }
    }

    /// Vertical-axis local translation: the translation vector is
    /// (0, 0, ±r) with cos θ = ±1, so only the m-preserving terms survive.
    fn local_translate_vertical(&self, dst: &mut SphericalSeries, r: f64, cost: f64) {
        if self.posdeg > dst.posdeg {
            warn!(
                "translating local degree {} into {} loses precision",
                self.posdeg, dst.posdeg
            );
        }

        let d = self.posdeg.max(dst.posdeg);
        beta_require(d);
        alpha_require(d);

        let mut rpow = vec![1.0; self.posdeg + 1];
        for l in 1..=self.posdeg {
            rpow[l] = rpow[l - 1] * r;
        }

        for l in 0..=dst.posdeg {
            for m in 0..=l {
                let mut acc = Complex64::zero();

                for n in l..=self.posdeg {
                    let normaliz = beta(l) / beta(n);
                    let factor = alpha(n - l, 0) * alpha(l, m) / alpha(n, m);

                    // Y_(n-l)^0 simplifies against the normalisation down
                    // to P_(n-l)^0(±1) = (cos θ)^(n-l)
                    let h = if (n - l) % 2 == 0 { 1.0 } else { cost };

                    acc += self.pos_row(n)[m] * (h * factor * normaliz * rpow[n - l]);
                }

                *dst.pos_term_mut(l, m) += acc;
            }
        }
    }

    fn multipole_translate_vertical(&self, dst: &mut SphericalSeries, r: f64, cost: f64) {
        if self.negdeg > dst.negdeg {
            warn!(
                "translating multipole degree {} into {} loses precision",
                self.negdeg, dst.negdeg
            );
        }

        let d = self.negdeg.max(dst.negdeg) - 1;
        alpha_require(d);
        beta_require(d);

        let mut rpow = vec![1.0; dst.negdeg];
        for l in 1..dst.negdeg {
            rpow[l] = rpow[l - 1] * r;
        }

        for l in 0..dst.negdeg {
            for m in 0..=l {
                let mut acc = Complex64::zero();

                for n in m..=l.min(self.negdeg - 1) {
                    let normaliz = beta(l) / beta(n);
                    let factor = alpha(l - n, 0) * alpha(n, m) / alpha(l, m);
                    let h = if (l - n) % 2 == 0 { 1.0 } else { cost };

                    acc += self.neg_row(n)[m] * (h * factor * normaliz * rpow[l - n]);
                }

                *dst.neg_term_mut(l, m) += acc;
            }
        }
    }

    /// Same-type translation along the polar axis, used by the
    /// point-and-shoot operators. `cost` is ±1.
    pub fn translate_vertical(&self, dst: &mut SphericalSeries, r: f64, cost: f64) {
        self.local_translate_vertical(dst, r, cost);

        if self.negdeg > 0 {
            self.multipole_translate_vertical(dst, r, -cost);
        }
    }

    /// Multipole-to-local conversion along the polar axis:
    ///
    ///   M_l^m(c') = (−1)^l Σ_n r^{−(l+n+1)}·β(l)β(l+n)/β(n)
    ///                      ·α(l,m)α(n,m)/α(l+n,0)·(cos θ)^{l+n}·L_n^m
    pub fn to_local_vertical(&self, dst: &mut SphericalSeries, r: f64, cost: f64) {
        let d = dst.posdeg + self.negdeg;
        alpha_require(d);
        beta_require(d);

        let inv_r = 1.0 / r;
        let mut rpow = vec![0.0; d + 1];
        let mut pow = 1.0;
        for (l, slot) in rpow.iter_mut().enumerate() {
            *slot = pow;
            // (cos θ)^(l+n) with cos θ = ±1 folds into the radial powers
            if l % 2 == 0 {
                *slot *= cost;
            }
            pow *= inv_r;
        }

        for l in 0..=dst.posdeg {
            for m in 0..=l {
                let mut sum = Complex64::zero();

                for n in m..self.negdeg {
                    let tf = beta(l) / beta(n) * alpha(l, m) * alpha(n, m) / alpha(l + n, 0);
                    sum += self.neg_row(n)[m] * (rpow[l + n + 1] * tf);
                }

                if (l + m) % 2 != 0 {
                    sum = -sum;
                }

                *dst.pos_term_mut(l, m) += sum;
            }
        }
    }

    /// Translates this series to a new center and accumulates into `dst`:
    /// the spherical equivalent of dst += T·src for both the local and the
    /// multipole part (M2M and L2L use this same operator).
    pub fn translate(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let s = xdst.sub(xsrc).to_spherical();

        self.local_translate(dst, &s);

        if self.negdeg > 0 {
            let antipode = Spherical {
                r: s.r,
                cos_theta: -s.cos_theta,
                sin_theta: s.sin_theta,
                cos_phi: -s.cos_phi,
                sin_phi: -s.sin_phi,
            };
            self.multipole_translate(dst, &antipode);
        }
    }

    /// Like [`SphericalSeries::translate`] except the multipole part of the
    /// source becomes a local expansion in `dst`.
    pub fn to_local(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let s = xdst.sub(xsrc).to_spherical();

        self.local_translate(dst, &s);

        if self.negdeg > 0 {
            self.multipole_to_local(dst, &s);
        }
    }
}
