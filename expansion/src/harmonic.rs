//! Spherical harmonics Y_l^m.
use std::f64::consts::PI;
use std::sync::RwLock;

use num::complex::Complex64;
use num::Zero;
use once_cell::sync::Lazy;

use crate::buffer::BinomialBuffer;
use crate::legendre;
pub use crate::legendre::{tri_index, tri_size};

fn norm_generator(l: usize, m: usize, buf: &BinomialBuffer) -> f64 {
    if m == 0 {
        return ((2.0 * l as f64 + 1.0) / (4.0 * PI)).sqrt();
    }

    let (fl, fm) = (l as f64, m as f64);
    buf.get_unsafe(l, m - 1) / ((fl - fm + 1.0) * (fl + fm)).sqrt()
}

static NORM: Lazy<RwLock<BinomialBuffer>> =
    Lazy::new(|| RwLock::new(BinomialBuffer::new(norm_generator, 32)));

/// Allows spherical-harmonic evaluation up to `degree` without growing the
/// normalisation table mid-computation.
pub fn require(degree: usize) {
    NORM.write().unwrap().require(degree);
}

fn norm(l: usize, m: usize) -> f64 {
    {
        let table = NORM.read().unwrap();
        if l as isize <= table.max_degree() {
            return table.get_unsafe(l, m);
        }
    }

    let mut table = NORM.write().unwrap();
    table.require(l);
    table.get_unsafe(l, m)
}

/// Hermitian symmetry of packed coefficients and harmonics: the value for
/// order `-m` from the stored value for order `m`.
#[inline]
pub fn sph_sym(z: Complex64, m: usize) -> Complex64 {
    let z = z.conj();
    if m % 2 != 0 {
        -z
    } else {
        z
    }
}

/// Y_l^m given cos θ, sin θ and e^{i·m·φ}. Negative orders go through the
/// Hermitian symmetry.
pub fn evaluate_internal(l: usize, m: i64, cost: f64, sint: f64, expmp: Complex64) -> Complex64 {
    let mneg = m < 0;
    let m = m.unsigned_abs() as usize;

    let mut plm = vec![0.0; tri_size(l)];
    legendre::associated_multiple_internal(l, cost, sint, &mut plm);
    let value = plm[tri_index(l, m)] * norm(l, m);

    let res = value * expmp;
    if mneg {
        sph_sym(res, m)
    } else {
        res
    }
}

/// Y_l^m(θ, φ).
pub fn evaluate(l: usize, m: i64, theta: f64, phi: f64) -> Complex64 {
    let mp = phi * m.unsigned_abs() as f64;
    let expmp = Complex64::new(mp.cos(), mp.sin());
    evaluate_internal(l, m, theta.cos(), theta.sin(), expmp)
}

/// Fills a triangular buffer with Y_i^j(θ, φ) for 0 <= i <= l, 0 <= j <= i.
/// Negative orders are recovered by [`sph_sym`].
pub fn evaluate_multiple_internal(
    l: usize,
    cost: f64,
    sint: f64,
    expp: Complex64,
    result: &mut [Complex64],
) {
    require(l);

    let mut plm = vec![0.0; tri_size(l)];
    legendre::associated_multiple_internal(l, cost, sint, &mut plm);

    let table = NORM.read().unwrap();
    let mut expppow = vec![Complex64::zero(); l + 1];
    let mut pow = Complex64::new(1.0, 0.0);

    let mut idx = 0;
    for i in 0..=l {
        expppow[i] = pow;

        for j in 0..=i {
            result[idx] = expppow[j] * plm[idx] * table.get_unsafe(i, j);
            idx += 1;
        }
        pow *= expp;
    }
}

/// As [`evaluate_multiple_internal`] plus the companion values (built on
/// P_l^m / sin θ) consumed by the series gradient evaluations.
pub fn pre_gradient_multiple_internal(
    l: usize,
    cost: f64,
    sint: f64,
    expp: Complex64,
    harmonics: &mut [Complex64],
    special: &mut [Complex64],
) {
    require(l);

    let mut plm = vec![0.0; tri_size(l)];
    let mut slm = vec![0.0; tri_size(l)];
    legendre::associated_multiple_internal(l, cost, sint, &mut plm);
    legendre::associated_special_internal(l, cost, sint, &plm, &mut slm);

    let table = NORM.read().unwrap();
    let mut expppow = vec![Complex64::zero(); l + 1];
    let mut pow = Complex64::new(1.0, 0.0);

    let mut idx = 0;
    for i in 0..=l {
        expppow[i] = pow;

        for j in 0..=i {
            let tmp = expppow[j] * table.get_unsafe(i, j);
            harmonics[idx] = tmp * plm[idx];
            special[idx] = tmp * slm[idx];
            idx += 1;
        }
        pow *= expp;
    }
}

/// Fills a triangular buffer with Y_i^j(θ, φ).
pub fn evaluate_multiple(l: usize, theta: f64, phi: f64, result: &mut [Complex64]) {
    let expp = Complex64::new(phi.cos(), phi.sin());
    evaluate_multiple_internal(l, theta.cos(), theta.sin(), expp, result);
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use approx::assert_relative_eq;
    use num::complex::Complex64;

    use super::*;

    fn y_closed(l: usize, m: i64, theta: f64, phi: f64) -> Complex64 {
        // Low-order closed forms.
        let (ct, st) = (theta.cos(), theta.sin());
        let ep = Complex64::new(phi.cos(), phi.sin());
        match (l, m) {
            (0, 0) => Complex64::new((1.0 / (4.0 * PI)).sqrt(), 0.0),
            (1, 0) => Complex64::new((3.0 / (4.0 * PI)).sqrt() * ct, 0.0),
            (1, 1) => -(3.0 / (8.0 * PI)).sqrt() * st * ep,
            (2, 0) => Complex64::new((5.0 / (16.0 * PI)).sqrt() * (3.0 * ct * ct - 1.0), 0.0),
            (2, 1) => -(15.0 / (8.0 * PI)).sqrt() * st * ct * ep,
            (2, 2) => (15.0 / (32.0 * PI)).sqrt() * st * st * ep * ep,
            _ => unreachable!(),
        }
    }

    #[test]
    fn matches_closed_forms() {
        for &(l, m) in &[(0, 0), (1, 0), (1, 1), (2, 0), (2, 1), (2, 2)] {
            for &(theta, phi) in &[(0.3, 1.1), (1.4, -2.0), (2.8, 0.4)] {
                let got = evaluate(l, m as i64, theta, phi);
                let want = y_closed(l, m, theta, phi);
                assert_relative_eq!(got.re, want.re, epsilon = 1e-12);
                assert_relative_eq!(got.im, want.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn multiple_agrees_with_single() {
        let l = 8;
        let (theta, phi) = (0.9, -1.3);
        let mut buf = vec![Complex64::new(0.0, 0.0); tri_size(l)];
        evaluate_multiple(l, theta, phi, &mut buf);

        for i in 0..=l {
            for j in 0..=i {
                let got = buf[tri_index(i, j)];
                let want = evaluate(i, j as i64, theta, phi);
                assert_relative_eq!(got.re, want.re, epsilon = 1e-12);
                assert_relative_eq!(got.im, want.im, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn negative_order_symmetry() {
        let y = evaluate(3, 2, 0.7, 0.5);
        let yneg = evaluate(3, -2, 0.7, 0.5);
        let sym = sph_sym(y, 2);
        assert_relative_eq!(yneg.re, sym.re, epsilon = 1e-13);
        assert_relative_eq!(yneg.im, sym.im, epsilon = 1e-13);
    }
}
