//! Single-unit tournament: main hypothesis against every candidate.
//!
//! Each candidate costs the main hypothesis one rank step if the judge
//! prefers it. Comparisons are independent, so they fan out through a
//! bounded `buffer_unordered` pool and are tallied once all have returned.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::gateway::Attribution;
use crate::oracle::AskContext;

use super::comparison::{ComparisonError, ComparisonOutcome, PairwiseComparator};
use super::trace::{now_epoch_ms, ComparisonTrace, TraceError, TraceSink};
use super::types::{ComparisonTask, EvaluationUnit, RankResult, Verdict};

// =============================================================================
// Constants
// =============================================================================

/// Starting rank, independent of pool size.
pub const DEFAULT_R_MAX: u32 = 16;

/// Default maximum number of comparisons in flight per unit.
pub const DEFAULT_COMPARISON_CONCURRENCY: usize = 15;
pub const MAX_COMPARISON_CONCURRENCY: usize = 256;

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TournamentError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("comparison against candidate {index} failed: {source}")]
    Comparison {
        index: usize,
        #[source]
        source: ComparisonError,
    },
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

#[derive(Debug, Clone)]
pub struct TournamentConfig {
    pub r_max: u32,
    pub comparison_concurrency: usize,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            r_max: DEFAULT_R_MAX,
            comparison_concurrency: DEFAULT_COMPARISON_CONCURRENCY,
        }
    }
}

impl TournamentConfig {
    pub fn validate(&self) -> Result<(), TournamentError> {
        if self.r_max == 0 {
            return Err(TournamentError::InvalidConfig(
                "r_max must be >= 1".to_string(),
            ));
        }
        if self.comparison_concurrency == 0 {
            return Err(TournamentError::InvalidConfig(
                "comparison_concurrency must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    fn effective_concurrency(&self) -> usize {
        self.comparison_concurrency
            .clamp(1, MAX_COMPARISON_CONCURRENCY)
    }
}

/// Counters for one tournament.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TournamentStats {
    pub comparisons: usize,
    pub candidate_wins: usize,
    pub oracle_calls: u32,
    pub fallbacks: usize,
    pub prompt_too_large_hits: u32,
    pub latency_ms: u128,
}

#[derive(Debug, Clone)]
pub struct TournamentOutcome {
    pub result: RankResult,
    pub stats: TournamentStats,
}

// =============================================================================
// Tally
// =============================================================================

/// Final rank: `r_max` minus one per `PrefersCandidate`, floored at zero.
///
/// `Unparseable` never reaches here in practice (the comparator resolves it),
/// but it leaves the rank unchanged like `PrefersMain`.
pub fn tally(r_max: u32, verdicts: impl IntoIterator<Item = Verdict>) -> u32 {
    verdicts.into_iter().fold(r_max, |rank, verdict| match verdict {
        Verdict::PrefersCandidate => rank.saturating_sub(1),
        Verdict::PrefersMain | Verdict::Unparseable => rank,
    })
}

// =============================================================================
// Tournament
// =============================================================================

pub struct Tournament {
    comparator: Arc<PairwiseComparator>,
    config: TournamentConfig,
    trace: Option<Arc<dyn TraceSink>>,
    run_id: Option<Uuid>,
}

impl Tournament {
    pub fn new(
        comparator: Arc<PairwiseComparator>,
        config: TournamentConfig,
    ) -> Result<Self, TournamentError> {
        config.validate()?;
        Ok(Self {
            comparator,
            config,
            trace: None,
            run_id: None,
        })
    }

    pub fn with_trace(mut self, trace: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    /// Rank one unit. Any fatal comparison fails the whole unit.
    pub async fn rank(&self, unit: &EvaluationUnit) -> Result<TournamentOutcome, TournamentError> {
        let started = Instant::now();
        let n = unit.candidate_count();

        if n as u64 > u64::from(self.config.r_max) {
            warn!(
                unit = %unit.id,
                doc_id = %unit.id.normalized(),
                candidates = n,
                r_max = self.config.r_max,
                "more candidates than r_max, rank may clamp at 0"
            );
        }

        let mut attribution = Attribution::new("tournament").with_unit(unit.id.as_str());
        if let Some(run_id) = self.run_id {
            attribution = attribution.with_run(run_id);
        }
        let ctx = AskContext { attribution };

        let results = stream::iter(unit.comparison_tasks().into_iter().map(|task| {
            let comparator = self.comparator.clone();
            let ctx = &ctx;
            async move {
                let outcome = comparator.compare(&task, ctx).await;
                (task, outcome)
            }
        }))
        .buffer_unordered(self.config.effective_concurrency())
        .collect::<Vec<_>>()
        .await;

        let mut stats = TournamentStats {
            comparisons: n,
            ..TournamentStats::default()
        };
        let mut verdicts = Vec::with_capacity(n);
        let mut first_failure: Option<(usize, ComparisonError)> = None;

        for (task, outcome) in results {
            self.record_trace(unit, &task, &outcome)?;
            match outcome {
                Ok(outcome) => {
                    stats.oracle_calls += outcome.attempts;
                    stats.prompt_too_large_hits += outcome.prompt_too_large_hits;
                    if outcome.fell_back {
                        stats.fallbacks += 1;
                    }
                    if outcome.verdict == Verdict::PrefersCandidate {
                        stats.candidate_wins += 1;
                    }
                    verdicts.push(outcome.verdict);
                }
                Err(err) => {
                    warn!(unit = %unit.id, candidate = task.index, error = %err, "comparison failed");
                    let replace = first_failure
                        .as_ref()
                        .map_or(true, |(index, _)| task.index < *index);
                    if replace {
                        first_failure = Some((task.index, err));
                    }
                }
            }
        }

        if let Some((index, source)) = first_failure {
            return Err(TournamentError::Comparison { index, source });
        }

        let rank = tally(self.config.r_max, verdicts);
        stats.latency_ms = started.elapsed().as_millis();

        info!(
            unit = %unit.id,
            doc_id = %unit.id.normalized(),
            candidates = n,
            rank,
            fallbacks = stats.fallbacks,
            latency_ms = stats.latency_ms as u64,
            "tournament complete"
        );

        Ok(TournamentOutcome {
            result: RankResult::for_unit(unit, rank),
            stats,
        })
    }

    fn record_trace(
        &self,
        unit: &EvaluationUnit,
        task: &ComparisonTask<'_>,
        outcome: &Result<ComparisonOutcome, ComparisonError>,
    ) -> Result<(), TournamentError> {
        let Some(trace) = self.trace.as_ref() else {
            return Ok(());
        };
        let mut event = ComparisonTrace {
            timestamp_ms: now_epoch_ms(),
            unit_id: unit.id.to_string(),
            doc_id: unit.id.normalized(),
            candidate_index: task.index,
            candidate_kind: task.kind.as_str().to_string(),
            prompt_hash: String::new(),
            model: self.comparator.model().to_string(),
            verdict: None,
            attempts: 0,
            fell_back: false,
            prompt_too_large_hits: 0,
            error: None,
        };
        match outcome {
            Ok(o) => {
                event.prompt_hash = o.prompt_hash.clone();
                event.verdict = Some(o.verdict.as_str().to_string());
                event.attempts = o.attempts;
                event.fell_back = o.fell_back;
                event.prompt_too_large_hits = o.prompt_too_large_hits;
            }
            Err(err) => event.error = Some(err.to_string()),
        }
        debug!(unit = %unit.id, candidate = task.index, "trace recorded");
        trace.record(event)?;
        Ok(())
    }
}
