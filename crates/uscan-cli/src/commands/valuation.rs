use clap::Args;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use uscan_core::monte_carlo::{
    run_intent_valuation, run_note_valuation, IntentBatchInput, MarketAssumptions,
    NoteValuationInput,
};

use crate::input;

/// Command-line overrides applied on top of the input file's assumptions.
#[derive(Args, Debug, Default)]
pub struct AssumptionOverrides {
    /// Risk-free rate, continuously compounded (e.g. 0.05)
    #[arg(long)]
    pub rate: Option<f64>,
    /// Volatility shared by all underlyings (e.g. 0.25)
    #[arg(long)]
    pub volatility: Option<f64>,
    /// Number of Monte Carlo paths
    #[arg(long)]
    pub paths: Option<u32>,
    /// Time steps to maturity
    #[arg(long)]
    pub steps: Option<u32>,
    /// Master seed for the random source
    #[arg(long, conflicts_with = "unseeded")]
    pub seed: Option<u64>,
    /// Draw a fresh seed from the OS instead of the default
    #[arg(long)]
    pub unseeded: bool,
}

impl AssumptionOverrides {
    fn apply(&self, assumptions: &mut MarketAssumptions, seed: &mut Option<u64>) {
        if let Some(rate) = self.rate {
            assumptions.rate = rate;
        }
        if let Some(vol) = self.volatility {
            assumptions.volatility = vol;
        }
        if let Some(paths) = self.paths {
            assumptions.n_paths = paths;
        }
        if let Some(steps) = self.steps {
            assumptions.n_steps = steps;
        }
        if self.unseeded {
            *seed = None;
        } else if let Some(s) = self.seed {
            *seed = Some(s);
        }
    }
}

/// Arguments for single-note valuation
#[derive(Args)]
pub struct ValueArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub overrides: AssumptionOverrides,
}

/// Arguments for batch valuation of parsed deal intents
#[derive(Args)]
pub struct IntentArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub overrides: AssumptionOverrides,
}

fn load<T: DeserializeOwned>(
    path: Option<&str>,
    what: &str,
) -> Result<T, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        debug!(path, "reading {what} input");
        input::file::read_input(path)
    } else if let Some(data) = input::stdin::read_stdin()? {
        Ok(serde_json::from_value(data)?)
    } else {
        Err(format!("--input <file.json|file.yaml> or stdin required for {what}").into())
    }
}

pub fn run_value(args: ValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut note: NoteValuationInput = load(args.input.as_deref(), "note valuation")?;
    args.overrides.apply(&mut note.assumptions, &mut note.seed);
    let result = run_note_valuation(&note)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_value_intents(args: IntentArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut batch: IntentBatchInput = load(args.input.as_deref(), "intent valuation")?;
    args.overrides.apply(&mut batch.assumptions, &mut batch.seed);
    let result = run_intent_valuation(&batch)?;
    Ok(serde_json::to_value(result)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let overrides = AssumptionOverrides {
            volatility: Some(0.4),
            paths: Some(500),
            ..AssumptionOverrides::default()
        };
        let mut a = MarketAssumptions::default();
        let mut seed = Some(42);
        overrides.apply(&mut a, &mut seed);
        assert_eq!(a.volatility, 0.4);
        assert_eq!(a.n_paths, 500);
        assert_eq!(a.rate, 0.05);
        assert_eq!(seed, Some(42));
    }

    #[test]
    fn test_unseeded_clears_seed() {
        let overrides = AssumptionOverrides {
            unseeded: true,
            ..AssumptionOverrides::default()
        };
        let mut seed = Some(42);
        overrides.apply(&mut MarketAssumptions::default(), &mut seed);
        assert_eq!(seed, None);
    }
}
