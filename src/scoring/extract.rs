//! File-level score extraction for both pipelines.
//!
//! Ranking: `<category>/<results_dir>/<model>/ranking_res_*.json`, one record
//! of `Rank / r_max` per file.
//! Composition: `<category>/<run>/score_res_<suffix>`, one record of the mean
//! final-round score per file, attributed through the suffix map.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::ranking::store::{to_pretty_json, write_atomic, StoreError};
use crate::ranking::types::OUTPUT_PREFIX as RANKING_PREFIX;

use super::models::ModelSuffixMap;
use super::rounds::{convert_eval_result, lenient_f64, RoundScores};

pub const EVAL_PREFIX: &str = "eval_res_";
pub const SCORE_PREFIX: &str = "score_res_";

/// Default minimum number of `eval_res_` files for a run folder to count as
/// complete.
pub const DEFAULT_MIN_EVAL_FILES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unexpected document shape: {0}")]
    Shape(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One normalized score attributed to a model within a category.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub model: String,
    pub category: String,
    pub score: f64,
    /// Weight of `score` in aggregation.
    pub samples: u64,
}

impl ScoreRecord {
    pub fn new(model: impl Into<String>, category: impl Into<String>, score: f64, samples: u64) -> Self {
        Self {
            model: model.into(),
            category: category.into(),
            score,
            samples,
        }
    }
}

// =============================================================================
// Single documents
// =============================================================================

/// `Rank / r_max` of a persisted tournament result.
pub fn normalized_rank(value: &Value, r_max: u32) -> Option<f64> {
    if r_max == 0 {
        return None;
    }
    let rank = value.get("Rank")?;
    if !rank.is_number() {
        return None;
    }
    lenient_f64(rank).map(|r| r / f64::from(r_max))
}

pub fn extract_ranking(
    value: &Value,
    model: &str,
    category: &str,
    r_max: u32,
) -> Option<ScoreRecord> {
    normalized_rank(value, r_max).map(|score| ScoreRecord::new(model, category, score, 1))
}

/// Mean valid final-round score of a `score_res_` document. `Ok(None)` when
/// the final round has no valid hypothesis.
pub fn extract_composition(
    value: &Value,
    model: &str,
    category: &str,
) -> Result<Option<ScoreRecord>, ExtractError> {
    let rounds = RoundScores::from_value(value)?;
    if rounds.rounds.is_empty() {
        return Err(ExtractError::Shape("no round entries".into()));
    }
    Ok(rounds
        .final_round_mean()
        .map(|(mean, _)| ScoreRecord::new(model, category, mean, 1)))
}

// =============================================================================
// Directory walkers
// =============================================================================

/// Per-file ranking records of one category.
pub fn ranking_records(
    category_dir: &Path,
    category: &str,
    results_dir: &str,
    r_max: u32,
) -> Vec<ScoreRecord> {
    let res_dir = category_dir.join(results_dir);
    let Some(model_dirs) = subdirectories(&res_dir) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for model_dir in model_dirs {
        let Some(model) = file_name(&model_dir) else {
            continue;
        };
        for path in files_with_prefix(&model_dir, RANKING_PREFIX) {
            let value = match read_json(&path) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "unreadable ranking result, skipping");
                    continue;
                }
            };
            match extract_ranking(&value, &model, category, r_max) {
                Some(record) => records.push(record),
                None => debug!(path = %path.display(), "no numeric Rank, skipping"),
            }
        }
    }
    records
}

/// Per-file composition records of one category.
pub fn composition_records(
    category_dir: &Path,
    category: &str,
    suffixes: &ModelSuffixMap,
) -> Vec<ScoreRecord> {
    let Some(run_dirs) = subdirectories(category_dir) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for run_dir in run_dirs {
        for path in files_with_prefix(&run_dir, SCORE_PREFIX) {
            let Some(name) = file_name(&path) else {
                continue;
            };
            let Some(model) = suffixes.resolve_file(&name, SCORE_PREFIX) else {
                debug!(file = %name, "unmapped model suffix, skipping");
                continue;
            };
            let value = match read_json(&path) {
                Ok(value) => value,
                Err(err) => {
                    warn!(error = %err, "unreadable score file, skipping");
                    continue;
                }
            };
            match extract_composition(&value, model, category) {
                Ok(Some(record)) => records.push(record),
                Ok(None) => debug!(path = %path.display(), "no valid hypotheses in final round"),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping score file"),
            }
        }
    }
    records
}

// =============================================================================
// eval_res_ -> score_res_ conversion
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    /// Run folders seen.
    pub folders: usize,
    /// Folders with too few `eval_res_` files.
    pub incomplete: usize,
    pub converted: usize,
    /// Outputs that already existed.
    pub existing: usize,
    pub failed: usize,
}

impl ConvertSummary {
    pub fn merge(&mut self, other: &ConvertSummary) {
        self.folders += other.folders;
        self.incomplete += other.incomplete;
        self.converted += other.converted;
        self.existing += other.existing;
        self.failed += other.failed;
    }
}

pub fn score_file_name(eval_name: &str) -> Option<String> {
    eval_name
        .strip_prefix(EVAL_PREFIX)
        .map(|rest| format!("{SCORE_PREFIX}{rest}"))
}

/// Convert one raw artifact and write its `score_res_` sibling.
pub fn convert_file(eval_path: &Path) -> Result<PathBuf, ExtractError> {
    let name = file_name(eval_path)
        .and_then(|n| score_file_name(&n))
        .ok_or_else(|| ExtractError::Shape(format!("not an eval file: {}", eval_path.display())))?;
    let out = eval_path.with_file_name(name);
    let value = read_json(eval_path)?;
    let scores = convert_eval_result(&value)?;
    let bytes = to_pretty_json(&scores).map_err(|source| ExtractError::Json {
        path: out.clone(),
        source,
    })?;
    write_atomic(&out, &bytes)?;
    Ok(out)
}

/// Convert every complete run folder of a category.
pub fn convert_category(category_dir: &Path, min_eval_files: usize) -> ConvertSummary {
    let mut summary = ConvertSummary::default();
    let Some(run_dirs) = subdirectories(category_dir) else {
        return summary;
    };

    for run_dir in run_dirs {
        summary.folders += 1;
        let eval_files = files_with_prefix(&run_dir, EVAL_PREFIX);
        if eval_files.len() < min_eval_files {
            info!(
                folder = %run_dir.display(),
                files = eval_files.len(),
                min = min_eval_files,
                "too few eval files, skipping folder"
            );
            summary.incomplete += 1;
            continue;
        }

        for path in eval_files {
            let existing = file_name(&path)
                .and_then(|n| score_file_name(&n))
                .map(|n| path.with_file_name(n).exists())
                .unwrap_or(false);
            if existing {
                summary.existing += 1;
                continue;
            }
            match convert_file(&path) {
                Ok(out) => {
                    debug!(path = %out.display(), "score file saved");
                    summary.converted += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "conversion failed");
                    summary.failed += 1;
                }
            }
        }
    }
    summary
}

// =============================================================================
// Helpers
// =============================================================================

fn read_json(path: &Path) -> Result<Value, ExtractError> {
    let text = fs::read_to_string(path).map_err(|source| ExtractError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ExtractError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
}

/// Sorted subdirectories, or `None` (logged) when `dir` cannot be read.
fn subdirectories(dir: &Path) -> Option<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "directory not readable, skipping");
            return None;
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Some(dirs)
}

/// Sorted `<prefix>*.json` files in `dir`.
fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            file_name(p)
                .map(|n| n.starts_with(prefix) && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}
