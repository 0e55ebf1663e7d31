//! Score extraction and hierarchical aggregation.

pub mod aggregate;
pub mod extract;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod rounds;

pub use aggregate::{aggregate, aggregate_by_category, merge, AggregateRecord, Aggregates};
pub use extract::{
    composition_records, extract_composition, extract_ranking, ranking_records, ConvertSummary,
    ExtractError, ScoreRecord, DEFAULT_MIN_EVAL_FILES,
};
pub use models::{ModelSuffixMap, DEFAULT_MODEL_SUFFIXES};
pub use pipeline::{
    aggregate_composition, aggregate_ranking, convert_rounds, default_categories,
    score_composition, score_ranking, RankingTable, DEFAULT_CATEGORIES,
};
pub use report::ReportError;
pub use rounds::{convert_eval_result, HypothesisScore, Round, RoundScores};
