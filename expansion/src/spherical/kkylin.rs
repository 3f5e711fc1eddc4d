//! Accelerated translations with partial-sum recurrences along the
//! destination order (K. Kylin's scheme). Same semantics as the direct
//! operators at O(p⁴) cost: for each destination degree only the lowest and
//! highest orders are summed explicitly, the orders in between follow from
//! a three-point recurrence on the previous degree's partial sums.
use num::complex::Complex64;
use num::Zero;

use multipole_traits::types::{Coordinate, Spherical, Vector3};

use crate::harmonic::{self, sph_sym};
use crate::legendre::{tri_index, tri_size};

use super::{alpha, alpha_require, beta, beta_require, SphericalSeries};

struct PartialSums {
    stride: usize,
    cur: Vec<Complex64>,
    prev: Vec<Complex64>,
}

impl PartialSums {
    fn new(degree: usize) -> PartialSums {
        let stride = degree + 1;
        PartialSums {
            stride,
            cur: vec![Complex64::zero(); stride * stride],
            prev: vec![Complex64::zero(); stride * stride],
        }
    }

    fn flip(&mut self) {
        std::mem::swap(&mut self.cur, &mut self.prev);
    }

    fn get(&self, m: usize, n: usize) -> Complex64 {
        self.cur[m * self.stride + n]
    }

    fn get_prev(&self, m: usize, n: usize) -> Complex64 {
        self.prev[m * self.stride + n]
    }

    fn set(&mut self, m: usize, n: usize, value: Complex64) {
        self.cur[m * self.stride + n] = value;
    }
}

impl SphericalSeries {
    fn multipole_translate_kkylin(&self, dst: &mut SphericalSeries, s: &Spherical) {
        assert!(
            self.negdeg <= dst.negdeg,
            "kkylin multipole translation cannot truncate"
        );

        let d = self.negdeg.max(dst.negdeg) - 1;
        let expp = Complex64::new(s.cos_phi, s.sin_phi);
        let mut partial = PartialSums::new(d);

        alpha_require(d);
        beta_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(dst.negdeg - 1)];
        harmonic::evaluate_multiple_internal(
            dst.negdeg - 1,
            s.cos_theta,
            s.sin_theta,
            expp,
            &mut harmonics,
        );

        let mut rpow = vec![0.0; dst.negdeg];
        rpow[0] = 1.0;
        let mut pow = s.r;

        partial.set(0, 0, harmonics[0].conj() * self.neg_row(0)[0]);
        *dst.neg_term_mut(0, 0) += partial.get(0, 0) * beta(0);

        for l in 1..dst.negdeg {
            rpow[l] = pow;
            pow *= s.r;

            partial.flip();

            let nmax = (l - 1).min(self.negdeg - 1);
            for n in 0..=nmax {
                let hrow = &harmonics[tri_index(l - n, 0)..];
                let srcrow = self.neg_row(n);
                let fact = beta(l - n) / beta(n);
                let (il, inn) = (l as i64, n as i64);

                // order 0
                let mut sum = Complex64::zero();
                for o in (-inn).max(inn - il)..=inn.min(il - inn) {
                    let abs_o = o.unsigned_abs() as usize;
                    let mut h = hrow[abs_o]; // Y_(l-n)^(-o)
                    let mut src = srcrow[abs_o];

                    if o > 0 {
                        h = sph_sym(h, abs_o);
                    } else if o < 0 {
                        src = sph_sym(src, abs_o);
                    }

                    sum += (rpow[l - n] * alpha(n, abs_o) * alpha(l - n, abs_o)) * h.conj() * src;
                }
                partial.set(0, n, sum * fact);

                if l > 1 {
                    // order l-1; don't overwrite the order-0 slot
                    let mut sum = Complex64::zero();
                    for o in (-inn).max(inn - 1)..=inn.min(2 * il - 1 - inn) {
                        let abs_o = o.unsigned_abs() as usize;
                        let h_order = il - o - 1;
                        let abs_h = h_order.unsigned_abs() as usize;

                        let mut h = hrow[abs_h]; // Y_(l-n)^(l-o-1)
                        let mut src = srcrow[abs_o];

                        if h_order < 0 {
                            h = sph_sym(h, abs_h);
                        }
                        if o < 0 {
                            src = sph_sym(src, abs_o);
                        }

                        sum += (rpow[l - n] * alpha(n, abs_o) * alpha(l - n, abs_h))
                            * h.conj()
                            * src;
                    }
                    partial.set(l - 1, n, sum * fact);
                }

                // order l
                let mut sum = Complex64::zero();
                for o in (-inn).max(inn)..=inn.min(2 * il - inn) {
                    let abs_o = o.unsigned_abs() as usize;
                    let h_order = il - o;
                    let abs_h = h_order.unsigned_abs() as usize;

                    let mut h = hrow[abs_h]; // Y_(l-n)^(l-o)
                    let mut src = srcrow[abs_o];

                    if h_order < 0 {
                        h = sph_sym(h, abs_h);
                    }
                    if o < 0 {
                        src = sph_sym(src, abs_o);
                    }

                    sum += (rpow[l - n] * alpha(n, abs_o) * alpha(l - n, abs_h)) * h.conj() * src;
                }
                partial.set(l, n, sum * fact);

                // recurrence on the remaining orders
                let fact = 0.5 * s.r / (l - n) as f64;
                let f_sint_expp = fact * s.sin_theta * expp;
                let fact = fact * 2.0 * s.cos_theta;
                for m in 1..l.saturating_sub(1) {
                    let value = f_sint_expp * partial.get_prev(m + 1, n)
                        - f_sint_expp.conj() * partial.get_prev(m - 1, n)
                        + fact * partial.get_prev(m, n);
                    partial.set(m, n, value);
                }
            }

            // highest source degree by the direct formula
            if l < self.negdeg {
                let fact = beta(0) / beta(l);
                let srcrow = self.neg_row(l);
                for m in 0..=l {
                    partial.set(m, l, (alpha(l, m) * fact) * harmonics[0].conj() * srcrow[m]);
                }
            }

            let nsum = l.min(self.negdeg - 1);
            for m in 0..=l {
                let mut sum = Complex64::zero();
                for n in 0..=nsum {
                    sum += partial.get(m, n);
                }
                *dst.neg_term_mut(l, m) += sum * (beta(l) / alpha(l, m));
            }
        }
    }

    fn local_translate_kkylin(&self, dst: &mut SphericalSeries, s: &Spherical) {
        assert!(
            self.posdeg <= dst.posdeg,
            "kkylin local translation cannot truncate"
        );

        let d = self.posdeg.max(dst.posdeg);
        let expp = Complex64::new(s.cos_phi, s.sin_phi);
        let mut partial = PartialSums::new(d);

        alpha_require(d);
        beta_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(self.posdeg)];
        harmonic::evaluate_multiple_internal(
            self.posdeg,
            s.cos_theta,
            s.sin_theta,
            expp,
            &mut harmonics,
        );

        let y00 = harmonics[0];

        let mut rpow = vec![1.0; self.posdeg + 1];
        for l in 1..=self.posdeg {
            rpow[l] = rpow[l - 1] * s.r;
        }

        for l in (0..=dst.posdeg).rev() {
            if l <= self.posdeg {
                let srcrow = self.pos_row(l);
                let fact = beta(0) / beta(l);
                for m in 0..=l {
                    partial.set(m, l, fact / alpha(l, m) * (y00 * srcrow[m]).conj());
                }
            }

            for n in l + 1..=self.posdeg {
                let hrow = &harmonics[tri_index(n - l, 0)..];
                let srcrow = self.pos_row(n);
                let fact = beta(n - l) / beta(n);
                let (il, inn) = (l as i64, n as i64);

                // order 0
                let mut sum = Complex64::zero();
                for o in (-inn).max(il - inn)..=inn.min(inn - il) {
                    let abs_o = o.unsigned_abs() as usize;
                    let mut h = hrow[abs_o]; // Y_(n-l)^o
                    let mut src = srcrow[abs_o];

                    if o < 0 {
                        h = sph_sym(h, abs_o);
                        src = sph_sym(src, abs_o);
                    }

                    sum += (rpow[n - l] * alpha(n - l, abs_o) / alpha(n, abs_o)) * (h * src).conj();
                }
                partial.set(0, n, sum * fact);

                if l > 0 {
                    // order l
                    let mut sum = Complex64::zero();
                    for o in (-inn).max(2 * il - inn)..=inn {
                        let abs_o = o.unsigned_abs() as usize;
                        let h_order = o - il;
                        let abs_h = h_order.unsigned_abs() as usize;

                        let mut h = hrow[abs_h]; // Y_(n-l)^(o-l)
                        let mut src = srcrow[abs_o];

                        if h_order < 0 {
                            h = sph_sym(h, abs_h);
                        }
                        if o < 0 {
                            src = sph_sym(src, abs_o);
                        }

                        sum += (rpow[n - l] * alpha(n - l, abs_h) / alpha(n, abs_o))
                            * (h * src).conj();
                    }
                    partial.set(l, n, sum * fact);
                }

                // recurrence on the remaining orders
                let fact = 0.5 * s.r / (n - l) as f64;
                let f_sint_expp = fact * s.sin_theta * expp;
                let fact = fact * 2.0 * s.cos_theta;
                for m in 1..l {
                    let value = f_sint_expp * partial.get_prev(m - 1, n)
                        - f_sint_expp.conj() * partial.get_prev(m + 1, n)
                        + fact * partial.get_prev(m, n);
                    partial.set(m, n, value);
                }
            }

            for m in 0..=l {
                let mut sum = Complex64::zero();
                for n in l..=self.posdeg {
                    sum += partial.get(m, n);
                }
                *dst.pos_term_mut(l, m) += sum.conj() * (beta(l) * alpha(l, m));
            }

            partial.flip();
        }
    }

    fn multipole_to_local_kkylin(&self, dst: &mut SphericalSeries, s: &Spherical) {
        assert!(
            self.negdeg <= dst.posdeg + 1,
            "kkylin local conversion cannot truncate"
        );

        if s.sin_theta.abs() < 1.0e-5 {
            self.to_local_vertical(dst, s.r, s.cos_theta);
            return;
        }

        let d = dst.posdeg + self.negdeg;
        let expp = Complex64::new(s.cos_phi, s.sin_phi);
        let mut partial = PartialSums::new(d);

        alpha_require(d);
        beta_require(d);

        let mut harmonics = vec![Complex64::zero(); tri_size(d)];
        harmonic::evaluate_multiple_internal(d, s.cos_theta, s.sin_theta, expp, &mut harmonics);

        let inv_r = 1.0 / s.r;
        let mut rpow = vec![1.0; d + 1];
        for l in 1..=d {
            rpow[l] = rpow[l - 1] * inv_r;
        }

        let mut sign = 1.0;
        for l in 0..=dst.posdeg {
            for n in 0..self.negdeg {
                let hrow = &harmonics[tri_index(l + n, 0)..];
                let srcrow = self.neg_row(n);
                let fact = rpow[l + n + 1] * beta(l + n) / beta(n);
                let inn = n as i64;

                // order 0
                let mut sum = Complex64::zero();
                for o in -inn..=inn {
                    let abs_o = o.unsigned_abs() as usize;
                    let mut h = hrow[abs_o]; // Y_(l+n)^o
                    let mut src = srcrow[abs_o];

                    if o < 0 {
                        h = sph_sym(h, abs_o);
                        src = sph_sym(src, abs_o);
                    }

                    sum += (alpha(n, abs_o) / alpha(l + n, abs_o)) * h * src;
                }
                partial.set(0, n, sum * fact);

                if l > 0 {
                    // order 1
                    let mut sum = Complex64::zero();
                    for o in -inn..=inn {
                        let abs_o = o.unsigned_abs() as usize;
                        let h_order = o + 1;
                        let abs_h = h_order.unsigned_abs() as usize;

                        let mut h = hrow[abs_h]; // Y_(l+n)^(o+1)
                        let mut src = srcrow[abs_o];

                        if h_order < 0 {
                            h = sph_sym(h, abs_h);
                        }
                        if o < 0 {
                            src = sph_sym(src, abs_o);
                        }

                        sum += (alpha(n, abs_o) / alpha(l + n, abs_h)) * h * src;
                    }
                    partial.set(1, n, sum * fact);
                }

                // recurrence on the remaining orders
                let two_cott_expp = 2.0 * s.cos_theta / s.sin_theta * expp;
                let exp2p = expp * expp;
                let lift = 2.0 * (l + n) as f64 * inv_r / s.sin_theta * expp;
                for m in 2..=l {
                    let value = two_cott_expp * partial.get(m - 1, n)
                        + exp2p * partial.get(m - 2, n)
                        - lift * partial.get_prev(m - 1, n);
                    partial.set(m, n, value);
                }
            }

            let fact = beta(l) * sign;
            for m in 0..=l {
                let mut sum = Complex64::zero();
                for n in 0..self.negdeg {
                    sum += partial.get(m, n);
                }
                *dst.pos_term_mut(l, m) += sum.conj() * (alpha(l, m) * fact);
            }

            partial.flip();
            sign = -sign;
        }
    }

    /// [`SphericalSeries::translate`] by the partial-sum scheme.
    pub fn translate_kkylin(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let s = xdst.sub(xsrc).to_spherical();

        self.local_translate_kkylin(dst, &s);

        if self.negdeg > 0 {
            let antipode = Spherical {
                r: s.r,
                cos_theta: -s.cos_theta,
                sin_theta: s.sin_theta,
                cos_phi: -s.cos_phi,
                sin_phi: -s.sin_phi,
            };
            self.multipole_translate_kkylin(dst, &antipode);
        }
    }

    /// [`SphericalSeries::to_local`] by the partial-sum scheme.
    pub fn to_local_kkylin(&self, xsrc: &Vector3, dst: &mut SphericalSeries, xdst: &Vector3) {
        let s = xdst.sub(xsrc).to_spherical();

        self.local_translate_kkylin(dst, &s);

        if self.negdeg > 0 {
            self.multipole_to_local_kkylin(dst, &s);
        }
    }
}
