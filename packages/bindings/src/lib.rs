use napi::Result as NapiResult;
use napi_derive::napi;

use uscan_core::monte_carlo::{
    run_intent_valuation, run_note_valuation, IntentBatchInput, NoteValuationInput,
};

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Valuation
// ---------------------------------------------------------------------------

#[napi]
pub fn value_note(input_json: String) -> NapiResult<String> {
    let input: NoteValuationInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = run_note_valuation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn value_intents(input_json: String) -> NapiResult<String> {
    let input: IntentBatchInput = serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = run_intent_valuation(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
