//! Directory-level driver: rank every unit that has no result yet.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use super::store::{list_unit_inputs, load_unit, RankStore, StoreError};
use super::tournament::{Tournament, TournamentError, TournamentOutcome};
use super::types::UnitId;

/// Default number of units ranked at the same time.
pub const DEFAULT_UNIT_CONCURRENCY: usize = 1;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("cannot list input directory: {0}")]
    Input(#[source] StoreError),
    #[error("unit_concurrency must be >= 1")]
    InvalidConcurrency,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Tournament(#[from] TournamentError),
}

/// What a batch run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Unit inputs found in the input directory.
    pub found: usize,
    /// Units whose result already existed.
    pub skipped: usize,
    pub ranked: usize,
    pub failed: usize,
}

enum UnitStatus {
    Ranked,
    Failed,
}

/// Rank one unit file and persist its result, unless the result already
/// exists. Returns `None` when skipped.
pub async fn rank_file(
    tournament: &Tournament,
    input: &Path,
    store: &RankStore,
) -> Result<Option<(PathBuf, TournamentOutcome)>, BatchError> {
    let id = UnitId::from_input_path(input)
        .ok_or_else(|| StoreError::NotAUnit(input.to_path_buf()))?;
    if store.exists(&id) {
        info!(unit = %id, "result exists, skipping");
        return Ok(None);
    }
    let unit = load_unit(input)?;
    let outcome = tournament.rank(&unit).await?;
    let path = store.save(&id, &outcome.result)?;
    info!(unit = %id, rank = outcome.result.rank, path = %path.display(), "saved");
    Ok(Some((path, outcome)))
}

/// Rank every pending `random_*.json` in `input_dir` into `store`.
///
/// Per-unit failures are logged and counted; only an unreadable input
/// directory aborts the run.
pub async fn rank_directory(
    tournament: &Tournament,
    input_dir: &Path,
    store: &RankStore,
    unit_concurrency: usize,
) -> Result<BatchSummary, BatchError> {
    if unit_concurrency == 0 {
        return Err(BatchError::InvalidConcurrency);
    }
    let inputs = list_unit_inputs(input_dir).map_err(BatchError::Input)?;

    let mut summary = BatchSummary {
        found: inputs.len(),
        ..BatchSummary::default()
    };

    let pending: Vec<(UnitId, PathBuf)> = inputs
        .into_iter()
        .filter_map(|path| UnitId::from_input_path(&path).map(|id| (id, path)))
        .filter(|(id, _)| {
            let exists = store.exists(id);
            if exists {
                info!(unit = %id, "result exists, skipping");
            }
            !exists
        })
        .collect();
    summary.skipped = summary.found - pending.len();

    let total = pending.len();
    info!(
        input = %input_dir.display(),
        output = %store.root().display(),
        found = summary.found,
        skipped = summary.skipped,
        pending = total,
        "starting batch"
    );

    let started = Instant::now();
    let done = AtomicUsize::new(0);

    let statuses = stream::iter(pending.into_iter().map(|(id, path)| {
        let done = &done;
        async move {
            let status = match rank_pending(tournament, &id, &path, store).await {
                Ok(rank) => {
                    info!(unit = %id, rank, "saved");
                    UnitStatus::Ranked
                }
                Err(err) => {
                    warn!(unit = %id, error = %err, "unit failed, continuing");
                    UnitStatus::Failed
                }
            };
            let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
            let eta = estimate_remaining(started.elapsed(), finished, total);
            info!(
                progress = %format!("{finished}/{total}"),
                eta_secs = eta.as_secs(),
                "unit finished"
            );
            status
        }
    }))
    .buffer_unordered(unit_concurrency)
    .collect::<Vec<_>>()
    .await;

    for status in statuses {
        match status {
            UnitStatus::Ranked => summary.ranked += 1,
            UnitStatus::Failed => summary.failed += 1,
        }
    }

    info!(
        found = summary.found,
        skipped = summary.skipped,
        ranked = summary.ranked,
        failed = summary.failed,
        elapsed_secs = started.elapsed().as_secs(),
        "batch complete"
    );
    Ok(summary)
}

async fn rank_pending(
    tournament: &Tournament,
    id: &UnitId,
    path: &Path,
    store: &RankStore,
) -> Result<u32, BatchError> {
    let unit = load_unit(path)?;
    let outcome = tournament.rank(&unit).await?;
    store.save(id, &outcome.result)?;
    Ok(outcome.result.rank)
}

/// Linear extrapolation from the average time per finished unit.
fn estimate_remaining(elapsed: Duration, finished: usize, total: usize) -> Duration {
    if finished == 0 || finished >= total {
        return Duration::ZERO;
    }
    let per_unit = elapsed.as_secs_f64() / finished as f64;
    Duration::from_secs_f64(per_unit * (total - finished) as f64)
}
