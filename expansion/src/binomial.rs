//! Process-wide binomial coefficient table.
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::buffer::BinomialBuffer;

fn pascal(l: usize, m: usize, buf: &BinomialBuffer) -> f64 {
    if l == 0 || m == 0 || m == l {
        return 1.0;
    }

    buf.get_unsafe(l - 1, m) + buf.get_unsafe(l - 1, m - 1)
}

static BINOMIAL: Lazy<RwLock<BinomialBuffer>> =
    Lazy::new(|| RwLock::new(BinomialBuffer::new(pascal, 32)));

/// Binomial coefficient C(n, p) by the recursive definition. Slow; kept as
/// the first-principles reference the buffered table is checked against.
pub fn slow_binomial(n: usize, p: usize) -> f64 {
    if p > n {
        return 0.0;
    }
    if p == 0 {
        return 1.0;
    }

    slow_binomial(n - 1, p) + slow_binomial(n - 1, p - 1)
}

/// Binomial coefficient C(n, p) from the buffered Pascal table.
pub fn binomial(n: usize, p: usize) -> f64 {
    if p > n {
        return 0.0;
    }

    {
        let table = BINOMIAL.read().unwrap();
        if n as isize <= table.max_degree() {
            return table.get_unsafe(n, p);
        }
    }

    let mut table = BINOMIAL.write().unwrap();
    table.require(n);
    table.get_unsafe(n, p)
}

/// Preallocates binomial coefficients up to `n = max`. Calling this once for
/// a sufficiently large `max` avoids repeated table growth under the write
/// lock during a solve.
pub fn binomial_require(max: usize) {
    BINOMIAL.write().unwrap().require(max);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_recursive_definition() {
        for n in 0..12 {
            for p in 0..=n {
                assert_eq!(binomial(n, p), slow_binomial(n, p));
            }
        }
    }

    #[test]
    fn out_of_triangle_is_zero() {
        assert_eq!(binomial(3, 5), 0.0);
    }

    #[test]
    fn extends_past_initial_allocation() {
        binomial_require(70);
        assert_eq!(binomial(70, 1), 70.0);
        assert_eq!(binomial(70, 69), 70.0);
    }
}
