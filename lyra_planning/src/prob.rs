//! Settlement of branch probabilities.
//!
//! An action's outcome branches are annotated with either a precise
//! probability or a closed interval from which a concrete value must be
//! drawn. Settlement picks one value per branch such that all values are
//! non-negative and their sum does not exceed 1.

use anyhow::{ensure, Result};
use rand::Rng;

/// Tolerance applied when comparing probability sums to 1.
pub const PROB_EPSILON: f64 = 1e-9;

/// Probability annotation of a single outcome branch.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ProbSpec {
    Precise(f64),
    /// An imprecise probability, known only to lie in `[lo, hi]`.
    Interval(f64, f64),
}

impl ProbSpec {
    pub fn lower_bound(self) -> f64 {
        match self {
            ProbSpec::Precise(p) => p,
            ProbSpec::Interval(lo, _) => lo,
        }
    }

    pub fn is_interval(self) -> bool {
        matches!(self, ProbSpec::Interval(_, _))
    }
}

/// Checks that some assignment of concrete values can satisfy the ≤ 1 sum
/// constraint: the lower bounds alone must not already exceed it.
///
/// Must be invoked before any grounding of the action proceeds; settlement
/// repeats the check on every call.
pub fn check_feasible(specs: &[ProbSpec]) -> Result<()> {
    let lower: f64 = specs.iter().map(|s| s.lower_bound()).sum();
    ensure!(
        lower <= 1.0 + PROB_EPSILON,
        "Unsatisfiable probabilities: lower bounds sum to {lower}, above 1"
    );
    Ok(())
}

/// Draws one concrete probability per branch.
///
/// Precise values are kept as declared. Interval values are drawn uniformly
/// and redrawn until the overall sum is admissible (rejection sampling),
/// which terminates with probability 1 once the feasibility check passed.
/// Settlement is re-runnable: a second call on the same specs redraws the
/// interval values.
pub fn settle<R: Rng>(specs: &[ProbSpec], rng: &mut R) -> Result<Vec<f64>> {
    check_feasible(specs)?;
    if !specs.iter().any(|s| s.is_interval()) {
        return Ok(specs.iter().map(|s| s.lower_bound()).collect());
    }
    loop {
        let draws: Vec<f64> = specs
            .iter()
            .map(|s| match *s {
                ProbSpec::Precise(p) => p,
                ProbSpec::Interval(lo, hi) => rng.random_range(lo..=hi),
            })
            .collect();
        if draws.iter().sum::<f64>() <= 1.0 + PROB_EPSILON {
            return Ok(draws);
        }
    }
}

/// Cumulative-threshold selection of one outcome among weighted branches.
///
/// `draw` is a uniform sample in `[0, 1)`. Returns the index of the first
/// branch whose cumulative probability exceeds the draw, or None when the
/// draw lands in the probability mass not assigned to any branch.
pub fn sample_index(probabilities: impl IntoIterator<Item = f64>, draw: f64) -> Option<usize> {
    let mut cumulative = 0.0;
    for (i, p) in probabilities.into_iter().enumerate() {
        cumulative += p;
        if draw < cumulative {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn precise_specs_are_kept_verbatim() {
        let mut rng = SmallRng::seed_from_u64(0);
        let specs = [ProbSpec::Precise(0.3), ProbSpec::Precise(0.5)];
        assert_eq!(settle(&specs, &mut rng).unwrap(), vec![0.3, 0.5]);
    }

    #[test]
    fn interval_draws_stay_in_bounds_and_sum_below_one() {
        let mut rng = SmallRng::seed_from_u64(42);
        let specs = [
            ProbSpec::Precise(0.4),
            ProbSpec::Interval(0.1, 0.6),
            ProbSpec::Interval(0.0, 0.5),
        ];
        for _ in 0..100 {
            let settled = settle(&specs, &mut rng).unwrap();
            assert_eq!(settled[0], 0.4);
            assert!((0.1..=0.6).contains(&settled[1]));
            assert!((0.0..=0.5).contains(&settled[2]));
            assert!(settled.iter().sum::<f64>() <= 1.0 + PROB_EPSILON);
        }
    }

    #[test]
    fn settlement_is_reproducible_for_a_fixed_seed() {
        let specs = [ProbSpec::Interval(0.2, 0.9)];
        let a = settle(&specs, &mut SmallRng::seed_from_u64(7)).unwrap();
        let b = settle(&specs, &mut SmallRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn infeasible_lower_bounds_are_a_configuration_error() {
        let mut rng = SmallRng::seed_from_u64(0);
        let specs = [ProbSpec::Precise(0.7), ProbSpec::Interval(0.4, 0.8)];
        assert!(settle(&specs, &mut rng).is_err());
        assert!(check_feasible(&specs).is_err());
    }

    #[test]
    fn precise_sum_above_one_is_rejected_too() {
        let mut rng = SmallRng::seed_from_u64(0);
        let specs = [ProbSpec::Precise(0.7), ProbSpec::Precise(0.7)];
        assert!(settle(&specs, &mut rng).is_err());
    }

    #[test]
    fn cumulative_sampling_picks_the_covering_branch() {
        let probs = [0.2, 0.5, 0.3];
        assert_eq!(sample_index(probs, 0.0), Some(0));
        assert_eq!(sample_index(probs, 0.19), Some(0));
        assert_eq!(sample_index(probs, 0.2), Some(1));
        assert_eq!(sample_index(probs, 0.69), Some(1));
        assert_eq!(sample_index(probs, 0.95), Some(2));
    }

    #[test]
    fn leftover_mass_selects_no_branch() {
        assert_eq!(sample_index([0.3, 0.3], 0.9), None);
    }
}
