pub mod correlation;
pub mod engine;
pub mod paths;
pub mod random;
pub mod simulation;

pub use correlation::CholeskyFactor;
pub use engine::{partition_paths, valuate, MarketAssumptions, ValuationResult};
pub use paths::{simulate_paths, PathTensor};
pub use random::{stream_seed, RandomSource};
pub use simulation::{
    run_intent_valuation, run_note_valuation, BatchValuationOutput, IntentBatchInput,
    NoteValuationInput, NoteValuationOutput, StructureSummary, StructureValuation,
};
