use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{info, warn};

use super::engine::{valuate, MarketAssumptions, ValuationResult};
use super::random::RandomSource;
use crate::error::UscanError;
use crate::structure::{DealIntent, Structure, StructureInput};
use crate::types::{with_metadata, ComputationOutput, Price, Rate, Years};
use crate::UscanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for valuing a single note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteValuationInput {
    pub structure: StructureInput,
    #[serde(default)]
    pub assumptions: MarketAssumptions,
    /// Master seed; `null` draws one from the OS.
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
}

/// Input for valuing a batch of parsed deal intents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentBatchInput {
    pub intents: Vec<DealIntent>,
    #[serde(default)]
    pub assumptions: MarketAssumptions,
    #[serde(default = "default_seed")]
    pub seed: Option<u64>,
}

fn default_seed() -> Option<u64> {
    Some(42)
}

/// Deal terms echoed back for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub name: String,
    pub underlyings: Vec<String>,
    pub initial_prices: Vec<Price>,
    pub basket_type: String,
    pub maturity: Years,
    pub knock_out_level: Option<Price>,
    pub principal: Price,
    pub coupon_rate: Rate,
}

impl From<&Structure> for StructureSummary {
    fn from(s: &Structure) -> Self {
        Self {
            name: s.name().to_string(),
            underlyings: s.underlyings().to_vec(),
            initial_prices: s.initial_prices().to_vec(),
            basket_type: s.basket_type().to_string(),
            maturity: s.maturity(),
            knock_out_level: s.knock_out_level(),
            principal: s.principal(),
            coupon_rate: s.coupon_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteValuationOutput {
    pub structure: StructureSummary,
    pub valuation: ValuationResult,
}

/// One entry of a batch, keyed by structure name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureValuation {
    pub structure_name: String,
    #[serde(flatten)]
    pub valuation: ValuationResult,
    pub structure: StructureSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchValuationOutput {
    pub results: Vec<StructureValuation>,
    /// Mean of `fair_value_gross` across the batch.
    pub average_fair_value_gross: Price,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn structure_warnings(structure: &Structure, assumptions: &MarketAssumptions) -> Vec<String> {
    let mut warnings = Vec::new();
    if !structure.is_price_normalised() {
        warnings.push(format!(
            "{}: initial prices {:?} are not normalised to the principal {}; \
             the knock-out branch pays the worst-of price level as cash",
            structure.name(),
            structure.initial_prices(),
            structure.principal()
        ));
    }
    if assumptions.n_paths == 0 {
        warnings.push("n_paths below 1 clamped to 1".to_string());
    }
    if assumptions.n_steps == 0 {
        warnings.push("n_steps below 1 clamped to 1".to_string());
    }
    warnings
}

fn assumptions_json(assumptions: &MarketAssumptions, source: &RandomSource) -> serde_json::Value {
    serde_json::json!({
        "rate": assumptions.rate,
        "volatility": assumptions.volatility,
        "n_paths": assumptions.effective_paths(),
        "n_steps": assumptions.effective_steps(),
        "correlation": match &assumptions.correlation {
            Some(m) => serde_json::json!(m),
            None => serde_json::json!("identity"),
        },
        "paths_per_partition": assumptions.paths_per_partition,
        "seed": source.seed(),
    })
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the deal model from raw terms and value it.
pub fn run_note_valuation(
    input: &NoteValuationInput,
) -> UscanResult<ComputationOutput<NoteValuationOutput>> {
    let start = Instant::now();

    let structure = Structure::from_input(&input.structure)?;
    let source = RandomSource::from_seed(input.seed);
    let warnings = structure_warnings(&structure, &input.assumptions);
    for w in &warnings {
        warn!("{w}");
    }

    let valuation = valuate(&structure, &input.assumptions, &source)?;
    info!(
        structure = structure.name(),
        fair_value_gross = valuation.fair_value_gross,
        prob_no_ko = valuation.prob_no_ko,
        "note valued"
    );

    let output = NoteValuationOutput {
        structure: StructureSummary::from(&structure),
        valuation,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo Worst-of Knock-out Note Valuation (GBM, terminal barrier)",
        &assumptions_json(&input.assumptions, &source),
        warnings,
        elapsed,
        output,
    ))
}

/// Value every parsed deal intent under shared assumptions.
///
/// Deal `i` draws from `source.derive(i)`, so adding or reordering deals
/// never perturbs the paths of the others.
pub fn run_intent_valuation(
    input: &IntentBatchInput,
) -> UscanResult<ComputationOutput<BatchValuationOutput>> {
    let start = Instant::now();

    if input.intents.is_empty() {
        return Err(UscanError::InvalidInput {
            field: "intents".into(),
            reason: "At least one deal intent is required".into(),
        });
    }

    let source = RandomSource::from_seed(input.seed);
    let structures = input
        .intents
        .iter()
        .map(Structure::from_intent)
        .collect::<UscanResult<Vec<_>>>()?;

    let mut warnings = Vec::new();
    let mut results = Vec::with_capacity(structures.len());
    for (i, structure) in structures.iter().enumerate() {
        warnings.extend(structure_warnings(structure, &input.assumptions));
        let valuation = valuate(structure, &input.assumptions, &source.derive(i))?;
        results.push(StructureValuation {
            structure_name: structure.name().to_string(),
            valuation,
            structure: StructureSummary::from(structure),
        });
    }
    warnings.dedup();
    for w in &warnings {
        warn!("{w}");
    }

    let average_fair_value_gross = results
        .iter()
        .map(|r| r.valuation.fair_value_gross)
        .sum::<f64>()
        / results.len() as f64;
    info!(
        structures = results.len(),
        average_fair_value_gross, "intent batch valued"
    );

    let output = BatchValuationOutput {
        results,
        average_fair_value_gross,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Monte Carlo Worst-of Knock-out Note Valuation (batch of parsed deals)",
        &assumptions_json(&input.assumptions, &source),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
