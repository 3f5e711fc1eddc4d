//! Selection of the semifar interaction regime.
//!
//! With a threshold τ configured, near leaf pairs are dispatched by local
//! particle count: two small leaves interact directly (P2P), a small leaf
//! against a large one goes through P2L and M2P, and two large leaves fall
//! back to the expansion conversion. τ = 0 asks the solver to pick the
//! threshold minimising the estimated cost over the tree's near pairs,
//! using profiled per-operator cost models.
use itertools::Itertools;

use crate::profile;

/// Estimated cost of one call of each operator at a fixed expansion order.
/// Entries may be NaN when no profile is known.
#[derive(Copy, Clone, Debug)]
pub struct OperatorCosts {
    pub p2p: f64,
    pub p2m: f64,
    pub m2m: f64,
    pub m2l: f64,
    pub l2l: f64,
    pub l2p: f64,
    pub p2l: f64,
    pub m2p: f64,
}

impl OperatorCosts {
    /// Looks every operator up in the process-wide profile database,
    /// evaluating the cost polynomials at `order`.
    pub fn from_profile_db(order: f64) -> OperatorCosts {
        OperatorCosts {
            p2p: profile::eval("p2p", order),
            p2m: profile::eval("p2m", order),
            m2m: profile::eval("m2m", order),
            m2l: profile::eval("m2l", order),
            l2l: profile::eval("l2l", order),
            l2p: profile::eval("l2p", order),
            p2l: profile::eval("p2l", order),
            m2p: profile::eval("m2p", order),
        }
    }

    /// True when every cost the semifar dispatch needs is known.
    pub fn semifar_complete(&self) -> bool {
        self.p2p.is_finite()
            && self.m2l.is_finite()
            && self.p2l.is_finite()
            && self.m2p.is_finite()
    }
}

/// Estimated cost of handling one near leaf pair under threshold τ.
fn pair_cost(costs: &OperatorCosts, na: usize, nb: usize, threshold: usize) -> f64 {
    let small = na.min(nb);
    let large = na.max(nb);

    if large < threshold {
        costs.p2p * (na * nb) as f64
    } else if small < threshold {
        small as f64 * (costs.p2l + costs.m2p)
    } else {
        2.0 * costs.m2l
    }
}

/// The threshold minimising the estimated total cost of the given near
/// leaf pairs (pairs of local point counts). Returns `usize::MAX` — the
/// regime disabled — when a required profile is missing or no candidate
/// beats plain direct interaction.
pub fn optimal_threshold(pairs: &[(usize, usize)], costs: &OperatorCosts) -> usize {
    if !costs.semifar_complete() {
        return usize::MAX;
    }

    let candidates: Vec<usize> = pairs
        .iter()
        .flat_map(|&(a, b)| [a + 1, b + 1])
        .chain([1, usize::MAX])
        .sorted_unstable()
        .dedup()
        .collect();

    let mut best = usize::MAX;
    let mut best_cost = f64::INFINITY;

    for &threshold in &candidates {
        let total: f64 = pairs
            .iter()
            .map(|&(na, nb)| pair_cost(costs, na, nb, threshold))
            .sum();

        if total < best_cost {
            best_cost = total;
            best = threshold;
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn costs() -> OperatorCosts {
        OperatorCosts {
            p2p: 1.0,
            p2m: 10.0,
            m2m: 50.0,
            m2l: 1000.0,
            l2l: 50.0,
            l2p: 10.0,
            p2l: 30.0,
            m2p: 30.0,
        }
    }

    #[test]
    fn missing_profiles_disable_the_regime() {
        let mut c = costs();
        c.m2p = f64::NAN;
        assert_eq!(optimal_threshold(&[(4, 4)], &c), usize::MAX);
    }

    #[test]
    fn small_pairs_stay_direct() {
        // 4·4 direct interactions are cheaper than anything else.
        let threshold = optimal_threshold(&[(4, 4), (3, 4)], &costs());
        assert!(threshold > 4);
    }

    #[test]
    fn lopsided_pairs_prefer_particle_expansion_hybrids() {
        // A handful of sources against a big box: 5·(p2l+m2p) = 300 beats
        // 5·500 direct calls and 2·m2l = 2000.
        let pairs = [(5, 500)];
        let threshold = optimal_threshold(&pairs, &costs());
        assert!(threshold > 5 && threshold <= 500);
        assert_eq!(pair_cost(&costs(), 5, 500, threshold), 5.0 * 60.0);
    }

    #[test]
    fn huge_pairs_prefer_expansions() {
        let pairs = [(200, 200)];
        let threshold = optimal_threshold(&pairs, &costs());
        assert!(threshold <= 200);
        assert_eq!(pair_cost(&costs(), 200, 200, threshold), 2000.0);
    }
}
