//! Wigner rotation matrices for spherical-harmonic coefficients.
//!
//! For a ZYZ Euler rotation (α, β, γ) the real d^l_{m',m}(β) elements are
//! built by the standard three-term recurrence, then the complex D matrix
//! follows by the e^{−imα} and e^{−im'γ} phases. A process-wide repository
//! shares the tables across calls; entries are keyed exactly on the angle
//! bit patterns and never evicted until [`WignerRepo::forget_all`].
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use num::complex::Complex64;
use num::Zero;
use once_cell::sync::Lazy;

fn phase(m: usize) -> f64 {
    if m % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// D^l_{m',m} coefficients for one rotation, valid for 0 <= l <= lmax,
/// 0 <= m' <= l, -l <= m <= l. Immutable once built.
#[derive(Clone, Debug)]
pub struct Wigner {
    alpha: f64,
    beta: f64,
    gamma: f64,
    lmax: usize,
    /// Rows of width 2l+1 per (l, m'), concatenated.
    terms: Vec<Complex64>,
    offsets: Vec<usize>,
}

impl Wigner {
    /// Builds the D table up to degree `lmax` inclusive.
    pub fn new(alpha: f64, beta: f64, gamma: f64, lmax: usize) -> Wigner {
        let mut offsets = Vec::with_capacity((lmax + 1) * (lmax + 2) / 2);
        let mut size = 0;
        for l in 0..=lmax {
            for _mprime in 0..=l {
                offsets.push(size);
                size += 2 * l + 1;
            }
        }

        let mut aw = Wigner {
            alpha,
            beta,
            gamma,
            lmax,
            terms: vec![Complex64::zero(); size],
            offsets,
        };

        aw.fill_d();
        aw.apply_phases();
        aw
    }

    pub fn lmax(&self) -> usize {
        self.lmax
    }

    pub fn angles(&self) -> (f64, f64, f64) {
        (self.alpha, self.beta, self.gamma)
    }

    #[inline]
    fn index(&self, l: usize, mprime: usize, m: i64) -> usize {
        self.offsets[l * (l + 1) / 2 + mprime] + (l as i64 + m) as usize
    }

    /// D^l_{m,m'}; `mprime <= l` and `-l <= m <= l` must hold.
    pub fn term(&self, l: usize, mprime: usize, m: i64) -> Complex64 {
        self.terms[self.index(l, mprime, m)]
    }

    fn set(&mut self, l: usize, mprime: usize, m: i64, value: Complex64) {
        let idx = self.index(l, mprime, m);
        self.terms[idx] = value;
    }

    fn fill_d(&mut self) {
        let cb = self.beta.cos();
        let sb = self.beta.sin();
        let cb2 = (self.beta * 0.5).cos();
        let sb2 = (self.beta * 0.5).sin();
        let tb2 = sb2 / cb2;

        self.set(0, 0, 0, Complex64::new(1.0, 0.0));

        if self.lmax == 0 {
            return;
        }

        let d1_0_0 = Complex64::new(cb, 0.0);
        let d1_1_1 = Complex64::new(cb2 * cb2, 0.0);
        let d1_1_m1 = Complex64::new(sb2 * sb2, 0.0);
        let d1_0_1 = Complex64::new(sb / 2.0f64.sqrt(), 0.0);

        self.set(1, 0, 0, d1_0_0);
        self.set(1, 1, -1, d1_1_m1);
        self.set(1, 1, 0, d1_0_1);
        self.set(1, 1, 1, d1_1_1);
        self.set(1, 0, -1, d1_0_1);
        self.set(1, 0, 1, -d1_0_1);

        for l in 2..=self.lmax {
            let fl = l as f64;
            let il = l as i64;
            let two_l_m_1 = 2.0 * fl - 1.0;
            let sq_l = fl * fl;
            let sq_l_m_1 = (fl - 1.0) * (fl - 1.0);

            // interior, by the three-term recurrence in l
            for mprime in 0..=l - 2 {
                let fmp = mprime as f64;
                let sq_mp = fmp * fmp;

                for m in -(mprime as i64)..=mprime as i64 {
                    let fm = m as f64;
                    let sq_m = fm * fm;
                    let a = (fl * two_l_m_1) / ((sq_l - sq_mp) * (sq_l - sq_m)).sqrt();
                    let b = d1_0_0 - (fmp * fm) / (fl * (fl - 1.0));
                    let c = ((sq_l_m_1 - sq_mp) * (sq_l_m_1 - sq_m)).sqrt()
                        / ((fl - 1.0) * two_l_m_1);

                    let value = a
                        * (b * self.term(l - 1, mprime, m)
                            - c * self.term(l - 2, mprime, m));
                    self.set(l, mprime, m, value);
                }
            }

            // top-corner seeds
            let corner = self.term(l - 1, l - 1, (l - 1) as i64);
            self.set(l, l, il, d1_1_1 * corner);
            self.set(l, l - 1, il - 1, (fl * d1_0_0 - fl + 1.0) * corner);

            let anticorner = self.term(l - 1, l - 1, -((l - 1) as i64));
            self.set(l, l, -il, d1_1_m1 * anticorner);
            self.set(l, l - 1, -il + 1, (fl * d1_0_0 + fl - 1.0) * anticorner);

            // last column, descending m'
            for mprime in (1..=l).rev() {
                let fmp = mprime as f64;
                let value = -((fl + fmp) / (fl - fmp + 1.0)).sqrt() * tb2 * self.term(l, mprime, il);
                self.set(l, mprime - 1, il, value);
            }

            // penultimate column
            for mprime in (1..=l - 1).rev() {
                let fmp = mprime as f64;
                let a = ((fl + fmp) / ((fl + fl) * (fl - fmp + 1.0))).sqrt();
                let value = (fl * cb - fmp + 1.0) * a * self.term(l, mprime, il) / d1_1_1;
                self.set(l, mprime - 1, il - 1, value);
            }

            // last rows from the columns just filled
            for mprime in l - 1..=l {
                for m in 0..mprime {
                    let value = phase(mprime + m) * self.term(l, m, mprime as i64);
                    self.set(l, mprime, m as i64, value);
                }
            }

            // negative-m edge of the last two rows
            for m in 0..l {
                let fm = m as f64;
                let value =
                    ((fl - fm) / (fl + fm + 1.0)).sqrt() * tb2 * self.term(l, l, -(m as i64));
                self.set(l, l, -(m as i64) - 1, value);
            }

            for m in 0..l {
                let fm = m as f64;
                let a = ((fl - fm) / ((fl + fl) * (fl + fm + 1.0))).sqrt();
                let value = (fl * cb + fm + 1.0) * a * self.term(l, l, -(m as i64)) / d1_1_1;
                self.set(l, l - 1, -(m as i64) - 1, value);
            }

            // remaining entries by the two symmetries
            for mprime in 0..=l {
                for m in mprime + 1..=l {
                    let value = phase(m + mprime) * self.term(l, m, mprime as i64);
                    self.set(l, mprime, m as i64, value);

                    let value = self.term(l, m, -(mprime as i64));
                    self.set(l, mprime, -(m as i64), value);
                }
            }
        }
    }

    fn apply_phases(&mut self) {
        if self.alpha.abs() >= 1.0e-5 {
            let expa = Complex64::new(self.alpha.cos(), -self.alpha.sin());
            let mut expma = vec![Complex64::new(1.0, 0.0); self.lmax + 1];
            for m in 1..=self.lmax {
                expma[m] = expma[m - 1] * expa;
            }

            for l in 0..=self.lmax {
                for mprime in 0..=l {
                    for m in 1..=l as i64 {
                        let idx = self.index(l, mprime, -m);
                        self.terms[idx] *= expma[m as usize].conj();
                    }
                    for m in 0..=l as i64 {
                        let idx = self.index(l, mprime, m);
                        self.terms[idx] *= expma[m as usize];
                    }
                }
            }
        }

        if self.gamma.abs() >= 1.0e-5 {
            let expg = Complex64::new(self.gamma.cos(), -self.gamma.sin());
            let mut expmg = vec![Complex64::new(1.0, 0.0); self.lmax + 1];
            for m in 1..=self.lmax {
                expmg[m] = expmg[m - 1] * expg;
            }

            for l in 0..=self.lmax {
                for mprime in 0..=l {
                    for m in -(l as i64)..=l as i64 {
                        let idx = self.index(l, mprime, m);
                        self.terms[idx] *= expmg[mprime];
                    }
                }
            }
        }
    }
}

static REPO: Lazy<Mutex<HashMap<[u64; 3], Arc<Wigner>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Process-wide cache of [`Wigner`] tables keyed by rotation angles.
pub struct WignerRepo;

impl WignerRepo {
    /// The table for (α, β, γ), valid up to at least `lmax`. Created on
    /// demand; an existing entry of insufficient degree is rebuilt larger.
    pub fn lookup(alpha: f64, beta: f64, gamma: f64, lmax: usize) -> Arc<Wigner> {
        let key = [alpha.to_bits(), beta.to_bits(), gamma.to_bits()];
        let mut repo = REPO.lock().unwrap();

        if let Some(existing) = repo.get(&key) {
            if existing.lmax() >= lmax {
                return Arc::clone(existing);
            }
        }

        let grown = repo
            .get(&key)
            .map(|w| (2 * w.lmax()).max(lmax))
            .unwrap_or(lmax);
        let table = Arc::new(Wigner::new(alpha, beta, gamma, grown));
        repo.insert(key, Arc::clone(&table));
        table
    }

    /// Drops every cached table.
    pub fn forget_all() {
        REPO.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn zonal_column_matches_legendre() {
        // d^l_{0,0}(β) = P_l(cos β), a convention-free identity.
        let beta = 0.73;
        let w = Wigner::new(0.0, beta, 0.0, 8);
        for l in 0..=8usize {
            let got = w.term(l, 0, 0);
            assert_relative_eq!(got.re, crate::legendre::legendre(l, beta.cos()), epsilon = 1e-12);
            assert_relative_eq!(got.im, 0.0, epsilon = 1e-15);
        }
    }

    #[test]
    fn rows_are_orthonormal() {
        // Rotation matrices are unitary: Σ_m d^l_{m',m}·d^l_{m'',m} = δ.
        let w = Wigner::new(0.0, 1.1, 0.0, 8);
        for l in 0..=8usize {
            for mp1 in 0..=l {
                for mp2 in 0..=l {
                    let mut dot = 0.0;
                    for m in -(l as i64)..=l as i64 {
                        dot += w.term(l, mp1, m).re * w.term(l, mp2, m).re;
                    }
                    let want = if mp1 == mp2 { 1.0 } else { 0.0 };
                    assert_relative_eq!(dot, want, epsilon = 1e-10);
                }
            }
        }
    }

    #[test]
    fn identity_rotation_is_identity() {
        let w = Wigner::new(0.0, 0.0, 0.0, 6);
        for l in 0..=6usize {
            for mprime in 0..=l {
                for m in -(l as i64)..=l as i64 {
                    let want = if m == mprime as i64 { 1.0 } else { 0.0 };
                    let got = w.term(l, mprime, m);
                    assert_relative_eq!(got.re, want, epsilon = 1e-12);
                    assert_relative_eq!(got.im, 0.0, epsilon = 1e-12);
                }
            }
        }
    }

    #[test]
    fn repo_shares_and_grows() {
        WignerRepo::forget_all();
        let a = WignerRepo::lookup(0.1, 0.9, -0.4, 5);
        let b = WignerRepo::lookup(0.1, 0.9, -0.4, 3);
        assert!(Arc::ptr_eq(&a, &b));

        let c = WignerRepo::lookup(0.1, 0.9, -0.4, 20);
        assert!(c.lmax() >= 20);
        assert_relative_eq!(c.term(3, 2, 1).re, a.term(3, 2, 1).re, epsilon = 1e-13);
    }
}
