#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::correlation::CholeskyFactor;
use super::paths::simulate_paths;
use super::random::RandomSource;
use crate::error::UscanError;
use crate::structure::Structure;
use crate::types::{Price, Rate, Years};
use crate::UscanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Market assumptions and simulation controls for one valuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAssumptions {
    /// Continuously compounded risk-free rate.
    #[serde(default = "default_rate")]
    pub rate: Rate,
    /// Lognormal volatility shared by every underlying.
    #[serde(default = "default_volatility")]
    pub volatility: Rate,
    /// Number of simulation paths; 0 is treated as 1.
    #[serde(default = "default_n_paths")]
    pub n_paths: u32,
    /// Time steps to maturity; 0 is treated as 1.
    #[serde(default = "default_n_steps")]
    pub n_steps: u32,
    /// Correlation matrix across underlyings. Identity when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Vec<Vec<f64>>>,
    /// Paths per independently seeded partition.
    #[serde(default = "default_paths_per_partition")]
    pub paths_per_partition: u32,
}

fn default_rate() -> Rate {
    0.05
}

fn default_volatility() -> Rate {
    0.25
}

fn default_n_paths() -> u32 {
    10_000
}

fn default_n_steps() -> u32 {
    1
}

fn default_paths_per_partition() -> u32 {
    4_096
}

impl Default for MarketAssumptions {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            volatility: default_volatility(),
            n_paths: default_n_paths(),
            n_steps: default_n_steps(),
            correlation: None,
            paths_per_partition: default_paths_per_partition(),
        }
    }
}

impl MarketAssumptions {
    pub fn effective_paths(&self) -> usize {
        self.n_paths.max(1) as usize
    }

    pub fn effective_steps(&self) -> usize {
        self.n_steps.max(1) as usize
    }

    fn validate(&self, maturity: Years) -> UscanResult<()> {
        if !self.rate.is_finite() {
            return Err(UscanError::InvalidInput {
                field: "rate".into(),
                reason: "Must be finite".into(),
            });
        }
        if !self.volatility.is_finite() || self.volatility < 0.0 {
            return Err(UscanError::InvalidInput {
                field: "volatility".into(),
                reason: format!("Must be non-negative, got {}", self.volatility),
            });
        }
        let dt = maturity / self.effective_steps() as f64;
        let drift = (self.rate - 0.5 * self.volatility * self.volatility) * dt;
        if !drift.is_finite() || !(self.rate * maturity).is_finite() {
            return Err(UscanError::InvalidInput {
                field: "volatility".into(),
                reason: format!(
                    "Per-step drift overflows for volatility {} and rate {}",
                    self.volatility, self.rate
                ),
            });
        }
        Ok(())
    }
}

/// Outcome of one valuation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    /// Principal plus the discounted expected net payoff.
    pub fair_value_gross: Price,
    /// Discounted expected net payoff; negative when principal is lost.
    pub fair_value_net: Price,
    /// Percentage of paths that avoided the knock-out, in [0, 100].
    pub prob_no_ko: f64,
    /// Undiscounted mean of the net payoffs.
    pub mean_net_payoff: Price,
    /// Standard error of `fair_value_net`.
    pub std_error: Price,
    pub n_paths: u32,
    pub n_steps: u32,
}

/// Partial sums of one path partition.
#[derive(Debug, Clone, Copy, Default)]
struct PartitionSummary {
    paths: usize,
    survived: usize,
    sum_net: f64,
    sum_net_sq: f64,
}

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Split `n_paths` into consecutive blocks of at most `block` paths.
///
/// The layout depends only on the two counts, so the set of random streams
/// used is fixed regardless of how many threads run them.
pub fn partition_paths(n_paths: usize, block: usize) -> Vec<usize> {
    let block = block.max(1);
    let mut sizes = vec![block; n_paths / block];
    if n_paths % block != 0 {
        sizes.push(n_paths % block);
    }
    sizes
}

fn simulate_partition(
    structure: &Structure,
    assumptions: &MarketAssumptions,
    factor: &CholeskyFactor,
    source: &RandomSource,
    index: usize,
    size: usize,
) -> UscanResult<PartitionSummary> {
    let mut rng = source.stream(index);
    let tensor = simulate_paths(structure, assumptions, factor, &mut rng, size)?;

    let basket_type = structure.basket_type();
    let mut terminal = vec![0.0_f64; structure.n_assets()];
    let mut summary = PartitionSummary {
        paths: size,
        ..PartitionSummary::default()
    };

    for path in 0..tensor.n_paths() {
        tensor.terminal_prices_into(path, &mut terminal);
        let basket = basket_type.aggregate(&terminal);
        let net = structure.net_payoff(basket);
        if structure.survives(basket) {
            summary.survived += 1;
        }
        summary.sum_net += net;
        summary.sum_net_sq += net * net;
    }

    Ok(summary)
}

#[cfg(feature = "parallel")]
fn run_partitions(
    structure: &Structure,
    assumptions: &MarketAssumptions,
    factor: &CholeskyFactor,
    source: &RandomSource,
    sizes: &[usize],
) -> UscanResult<Vec<PartitionSummary>> {
    sizes
        .par_iter()
        .enumerate()
        .map(|(i, &size)| simulate_partition(structure, assumptions, factor, source, i, size))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_partitions(
    structure: &Structure,
    assumptions: &MarketAssumptions,
    factor: &CholeskyFactor,
    source: &RandomSource,
    sizes: &[usize],
) -> UscanResult<Vec<PartitionSummary>> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| simulate_partition(structure, assumptions, factor, source, i, size))
        .collect()
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Value a worst-of knock-out note by Monte Carlo.
///
/// Paths are simulated per partition, each from its own sub-stream of
/// `source`; partition sums are reduced in partition order so a fixed seed
/// gives bit-identical results with or without the `parallel` feature.
/// The net payoff mean is discounted at `exp(-r·T)`; the survival
/// probability counts paths whose worst-of value at maturity sits at or
/// above every knock-out level.
pub fn valuate(
    structure: &Structure,
    assumptions: &MarketAssumptions,
    source: &RandomSource,
) -> UscanResult<ValuationResult> {
    assumptions.validate(structure.maturity())?;
    let factor = CholeskyFactor::resolve(assumptions.correlation.as_deref(), structure.n_assets())?;

    let n_paths = assumptions.effective_paths();
    let n_steps = assumptions.effective_steps();
    let sizes = partition_paths(n_paths, assumptions.paths_per_partition as usize);
    debug!(
        structure = structure.name(),
        n_assets = structure.n_assets(),
        n_paths,
        n_steps,
        partitions = sizes.len(),
        seed = source.seed(),
        "simulating note"
    );

    let summaries = run_partitions(structure, assumptions, &factor, source, &sizes)?;
    let total = summaries
        .iter()
        .fold(PartitionSummary::default(), |acc, s| PartitionSummary {
            paths: acc.paths + s.paths,
            survived: acc.survived + s.survived,
            sum_net: acc.sum_net + s.sum_net,
            sum_net_sq: acc.sum_net_sq + s.sum_net_sq,
        });

    let n = total.paths as f64;
    let discount = (-assumptions.rate * structure.maturity()).exp();
    let mean_net_payoff = total.sum_net / n;
    let fair_value_net = discount * mean_net_payoff;

    let std_error = if total.paths > 1 {
        let variance = ((total.sum_net_sq - n * mean_net_payoff * mean_net_payoff) / (n - 1.0))
            .max(0.0);
        discount * (variance / n).sqrt()
    } else {
        0.0
    };

    let result = ValuationResult {
        fair_value_gross: structure.principal() + fair_value_net,
        fair_value_net,
        prob_no_ko: total.survived as f64 / n * 100.0,
        mean_net_payoff,
        std_error,
        n_paths: total.paths as u32,
        n_steps: n_steps as u32,
    };
    debug!(
        structure = structure.name(),
        fair_value_gross = result.fair_value_gross,
        prob_no_ko = result.prob_no_ko,
        "valuation complete"
    );

    Ok(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Barrier, BarrierKind, BasketType};
    use pretty_assertions::assert_eq;

    const SEED: u64 = 42;

    fn note(barrier: Option<f64>, coupon: f64) -> Structure {
        let barriers = barrier
            .map(|level| {
                vec![Barrier {
                    kind: BarrierKind::KnockOutDown,
                    level,
                }]
            })
            .unwrap_or_default();
        Structure::new(
            "Tencent_Baba",
            vec!["Tencent".into(), "Baba".into()],
            vec![100.0, 100.0],
            barriers,
            BasketType::WorstOf,
            4.0 / 12.0,
            100.0,
            coupon,
        )
        .unwrap()
    }

    fn seeded() -> RandomSource {
        RandomSource::seeded(SEED)
    }

    #[test]
    fn test_partition_layout() {
        assert_eq!(partition_paths(10_000, 4_096), vec![4_096, 4_096, 1_808]);
        assert_eq!(partition_paths(4_096, 4_096), vec![4_096]);
        assert_eq!(partition_paths(1, 4_096), vec![1]);
        assert_eq!(partition_paths(5, 0), vec![1, 1, 1, 1, 1]);
    }

    #[test]
    fn test_seeded_reproducibility() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions::default();
        let r1 = valuate(&s, &a, &seeded()).unwrap();
        let r2 = valuate(&s, &a, &seeded()).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(r1.fair_value_gross.to_bits(), r2.fair_value_gross.to_bits());
    }

    #[test]
    fn test_different_seeds_differ() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions::default();
        let r1 = valuate(&s, &a, &RandomSource::seeded(1)).unwrap();
        let r2 = valuate(&s, &a, &RandomSource::seeded(2)).unwrap();
        assert_ne!(r1.fair_value_gross, r2.fair_value_gross);
    }

    #[test]
    fn test_gross_and_net_are_consistent() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions::default();
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert!((r.fair_value_gross - (100.0 + r.fair_value_net)).abs() < 1e-12);
        let discount = (-0.05_f64 * 4.0 / 12.0).exp();
        assert!((r.fair_value_net - discount * r.mean_net_payoff).abs() < 1e-12);
        assert!((0.0..=100.0).contains(&r.prob_no_ko));
        assert_eq!(r.n_paths, 10_000);
        assert_eq!(r.n_steps, 1);
    }

    #[test]
    fn test_unreachable_barrier_pays_discounted_coupon() {
        let s = note(Some(0.0), 11.0);
        let a = MarketAssumptions::default();
        let r = valuate(&s, &a, &seeded()).unwrap();
        let t = 4.0 / 12.0;
        let expected = 100.0 + (-0.05_f64 * t).exp() * (11.0 / 100.0 * t * 100.0);
        assert_eq!(r.prob_no_ko, 100.0);
        assert!((r.fair_value_gross - expected).abs() < 1e-9);
        assert!(r.std_error < 1e-6);
    }

    #[test]
    fn test_no_barrier_matches_unreachable_barrier() {
        let a = MarketAssumptions::default();
        let none = valuate(&note(None, 11.0), &a, &seeded()).unwrap();
        let zero = valuate(&note(Some(0.0), 11.0), &a, &seeded()).unwrap();
        assert_eq!(none, zero);
    }

    #[test]
    fn test_zero_volatility_is_deterministic() {
        // Forward after 4 months at 5% is ~101.68, above a 98 barrier.
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            volatility: 0.0,
            n_paths: 100,
            ..MarketAssumptions::default()
        };
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert_eq!(r.prob_no_ko, 100.0);

        // Barrier above the forward: every path knocks out at the forward.
        let s = note(Some(105.0), 11.0);
        let r = valuate(&s, &a, &seeded()).unwrap();
        let t = 4.0_f64 / 12.0;
        let fwd = 100.0 * (0.05 * t).exp();
        assert_eq!(r.prob_no_ko, 0.0);
        assert!((r.mean_net_payoff - (fwd - 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_paths_and_steps_clamped() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            n_paths: 0,
            n_steps: 0,
            ..MarketAssumptions::default()
        };
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert_eq!(r.n_paths, 1);
        assert_eq!(r.n_steps, 1);
        assert!(r.fair_value_gross.is_finite());
        assert!(r.prob_no_ko == 0.0 || r.prob_no_ko == 100.0);
        assert_eq!(r.std_error, 0.0);
    }

    #[test]
    fn test_partition_size_does_not_change_path_count() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            n_paths: 1_000,
            paths_per_partition: 7,
            ..MarketAssumptions::default()
        };
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert_eq!(r.n_paths, 1_000);
    }

    #[test]
    fn test_multi_step_runs() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            n_steps: 20,
            ..MarketAssumptions::default()
        };
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert_eq!(r.n_steps, 20);
        // Terminal barrier only: survival matches the one-step estimate
        // within sampling error.
        let one = valuate(&s, &MarketAssumptions::default(), &seeded()).unwrap();
        assert!((r.prob_no_ko - one.prob_no_ko).abs() < 3.0);
    }

    #[test]
    fn test_invalid_volatility_rejected() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            volatility: -0.1,
            ..MarketAssumptions::default()
        };
        assert!(matches!(
            valuate(&s, &a, &seeded()),
            Err(UscanError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_overflowing_volatility_rejected() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            volatility: 1e200,
            ..MarketAssumptions::default()
        };
        let err = valuate(&s, &a, &seeded()).unwrap_err();
        assert!(matches!(err, UscanError::InvalidInput { ref field, .. } if field == "volatility"));

        // Large but representable volatility still values to finite numbers.
        let a = MarketAssumptions {
            volatility: 5.0,
            n_paths: 500,
            ..MarketAssumptions::default()
        };
        let r = valuate(&s, &a, &seeded()).unwrap();
        assert!(r.fair_value_gross.is_finite());
        assert!(r.std_error.is_finite());
    }

    #[test]
    fn test_explicit_bad_correlation_not_replaced() {
        let s = note(Some(98.0), 11.0);
        let a = MarketAssumptions {
            correlation: Some(vec![vec![1.0, 1.0], vec![1.0, 1.0]]),
            ..MarketAssumptions::default()
        };
        assert!(matches!(
            valuate(&s, &a, &seeded()),
            Err(UscanError::InvalidCorrelation(_))
        ));

        let a = MarketAssumptions {
            correlation: Some(vec![vec![1.0]]),
            ..MarketAssumptions::default()
        };
        assert!(matches!(
            valuate(&s, &a, &seeded()),
            Err(UscanError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_identity_matrix_matches_default() {
        let s = note(Some(98.0), 11.0);
        let explicit = MarketAssumptions {
            correlation: Some(vec![vec![1.0, 0.0], vec![0.0, 1.0]]),
            ..MarketAssumptions::default()
        };
        let r1 = valuate(&s, &explicit, &seeded()).unwrap();
        let r2 = valuate(&s, &MarketAssumptions::default(), &seeded()).unwrap();
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_assumptions_deserialize_with_defaults() {
        let a: MarketAssumptions = serde_json::from_str(r#"{"volatility": 0.3}"#).unwrap();
        assert_eq!(
            a,
            MarketAssumptions {
                volatility: 0.3,
                ..MarketAssumptions::default()
            }
        );
    }
}
