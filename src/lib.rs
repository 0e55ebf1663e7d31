#![forbid(unsafe_code)]

//! # hyporank
//!
//! Tournament ranking of machine-generated scientific hypotheses, and the
//! aggregation of those rankings into per-model scores.
//!
//! A judging model compares a main hypothesis against each candidate of a
//! pool (distractors and model-generated alternatives). Every candidate the
//! judge prefers costs the main hypothesis one step from a fixed starting rank.
//! Ranked results are then folded, sample-weighted, into per-category and
//! global tables.

pub mod config;
pub mod gateway;
pub mod oracle;
pub mod prompts;
pub mod ranking;
pub mod scoring;
pub mod telemetry;

pub use config::{ConfigError, HyporankConfig};
pub use gateway::{Attribution, ChatGateway, ProviderGateway, UsageSink};
pub use oracle::{AskContext, ChatOracle, Oracle, OracleError, OracleReply};
pub use ranking::{
    rank_directory, rank_file, BatchSummary, PairwiseComparator, RankResult, RankStore,
    Tournament, TournamentConfig, Verdict,
};
pub use scoring::{aggregate, merge, AggregateRecord, ScoreRecord};
