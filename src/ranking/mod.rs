//! Tournament ranking of a main hypothesis against a candidate pool.

pub mod batch;
pub mod comparison;
pub mod store;
pub mod tournament;
pub mod trace;
pub mod types;

pub use batch::{rank_directory, rank_file, BatchError, BatchSummary, DEFAULT_UNIT_CONCURRENCY};
pub use comparison::{
    parse_verdict, ComparisonError, ComparisonOutcome, PairwiseComparator,
    DEFAULT_MAX_VERDICT_ATTEMPTS,
};
pub use store::{list_unit_inputs, load_unit, RankStore, StoreError};
pub use tournament::{
    tally, Tournament, TournamentConfig, TournamentError, TournamentOutcome, TournamentStats,
    DEFAULT_COMPARISON_CONCURRENCY, DEFAULT_R_MAX,
};
pub use trace::{ComparisonTrace, JsonlTraceSink, TraceError, TraceSink, TraceWorker};
pub use types::{
    CandidateKind, ComparisonTask, EvaluationUnit, RankResult, UnitId, UnitRecord, Verdict,
};
