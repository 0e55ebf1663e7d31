//! Category-then-global aggregation over an on-disk results tree.
//!
//! Layout (`root` is the results root):
//!
//! ```text
//! <root>/<category>/<run>/eval_res_*.json      raw composition output
//! <root>/<category>/<run>/score_res_*.json     per-round scores
//! <root>/<category>/model_generate_score.csv   composition, category level
//! <root>/model_generate_score.csv              composition, global
//! <root>/<category>/<results_dir>/<model>/ranking_res_*.json
//! <root>/<category>/llm_ranking.csv            ranking, category level
//! <root>/avg_llm_ranking.csv                   ranking, global
//! ```
//!
//! Missing categories are logged and skipped; only write failures abort.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::aggregate::{aggregate, aggregate_by_category, merge, Aggregates};
use super::extract::{composition_records, convert_category, ranking_records, ConvertSummary};
use super::models::ModelSuffixMap;
use super::report::{
    read_composition_csv, read_ranking_category_csv, write_composition_csv,
    write_ranking_category_csv, write_ranking_global_csv, write_ranking_per_category_csv,
    ReportError, COMPOSITION_CSV, RANKING_CATEGORY_CSV, RANKING_GLOBAL_CSV,
    RANKING_PER_CATEGORY_CSV,
};

/// Twelve disciplines of the benchmark.
pub const DEFAULT_CATEGORIES: &[&str] = &[
    "Cell Biology",
    "Chemistry",
    "Earth Science",
    "Material Science",
    "Physics",
    "Energy Science",
    "Environmental Science",
    "Biology",
    "Business",
    "Law",
    "Math",
    "Astronomy",
];

pub fn default_categories() -> Vec<String> {
    DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect()
}

/// Shape of the global ranking table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingTable {
    /// `model_name,avg_rank,count3`
    Counts,
    /// `model_name,avg_rank,<category...>`
    PerCategory,
}

impl RankingTable {
    pub fn default_file_name(&self) -> &'static str {
        match self {
            RankingTable::Counts => RANKING_GLOBAL_CSV,
            RankingTable::PerCategory => RANKING_PER_CATEGORY_CSV,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CategoryOutput {
    pub category: String,
    pub path: PathBuf,
    pub table: Aggregates,
}

fn category_dir(root: &Path, category: &str) -> Option<PathBuf> {
    let dir = root.join(category);
    if dir.is_dir() {
        Some(dir)
    } else {
        warn!(category, dir = %dir.display(), "category directory not found, skipping");
        None
    }
}

// =============================================================================
// Composition pipeline
// =============================================================================

/// Regroup raw `eval_res_` artifacts into `score_res_` files.
pub fn convert_rounds(root: &Path, categories: &[String], min_eval_files: usize) -> ConvertSummary {
    let mut total = ConvertSummary::default();
    for category in categories {
        let Some(dir) = category_dir(root, category) else {
            continue;
        };
        let summary = convert_category(&dir, min_eval_files);
        info!(
            category = %category,
            folders = summary.folders,
            incomplete = summary.incomplete,
            converted = summary.converted,
            existing = summary.existing,
            failed = summary.failed,
            "category converted"
        );
        total.merge(&summary);
    }
    total
}

/// Write `<category>/model_generate_score.csv` for each category.
pub fn score_composition(
    root: &Path,
    categories: &[String],
    suffixes: &ModelSuffixMap,
) -> Result<Vec<CategoryOutput>, ReportError> {
    let mut outputs = Vec::new();
    for category in categories {
        let Some(dir) = category_dir(root, category) else {
            continue;
        };
        let records = composition_records(&dir, category, suffixes);
        let table = aggregate(&records);
        let path = dir.join(COMPOSITION_CSV);
        write_composition_csv(&path, &table)?;
        info!(category = %category, files = records.len(), models = table.len(), path = %path.display(), "category scores written");
        outputs.push(CategoryOutput {
            category: category.clone(),
            path,
            table,
        });
    }
    Ok(outputs)
}

/// Fold category tables into `<root>/model_generate_score.csv`.
pub fn aggregate_composition(
    root: &Path,
    categories: &[String],
) -> Result<(PathBuf, Aggregates), ReportError> {
    let mut global = Aggregates::new();
    for category in categories {
        let path = root.join(category).join(COMPOSITION_CSV);
        if !path.exists() {
            warn!(category = %category, path = %path.display(), "category table not found, skipping");
            continue;
        }
        let records = match read_composition_csv(&path, category) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "unreadable category table, skipping");
                continue;
            }
        };
        global = merge(global, aggregate(&records));
    }
    let out = root.join(COMPOSITION_CSV);
    write_composition_csv(&out, &global)?;
    info!(models = global.len(), path = %out.display(), "global scores written");
    Ok((out, global))
}

// =============================================================================
// Ranking pipeline
// =============================================================================

/// Write `<category>/llm_ranking.csv` for each category.
pub fn score_ranking(
    root: &Path,
    categories: &[String],
    results_dir: &str,
    r_max: u32,
) -> Result<Vec<CategoryOutput>, ReportError> {
    let mut outputs = Vec::new();
    for category in categories {
        let Some(dir) = category_dir(root, category) else {
            continue;
        };
        let records = ranking_records(&dir, category, results_dir, r_max);
        let table = aggregate(&records);
        let path = dir.join(RANKING_CATEGORY_CSV);
        write_ranking_category_csv(&path, &table)?;
        info!(category = %category, files = records.len(), models = table.len(), path = %path.display(), "category ranking written");
        outputs.push(CategoryOutput {
            category: category.clone(),
            path,
            table,
        });
    }
    Ok(outputs)
}

/// Fold category ranking tables into one global table.
///
/// `out` overrides the file name (relative to `root`) or path.
pub fn aggregate_ranking(
    root: &Path,
    categories: &[String],
    shape: RankingTable,
    out: Option<&Path>,
) -> Result<(PathBuf, Aggregates), ReportError> {
    let mut records = Vec::new();
    for category in categories {
        let path = root.join(category).join(RANKING_CATEGORY_CSV);
        if !path.exists() {
            warn!(category = %category, path = %path.display(), "category ranking not found, skipping");
            continue;
        }
        match read_ranking_category_csv(&path, category) {
            Ok(rows) => records.extend(rows),
            Err(err) => warn!(error = %err, "unreadable category ranking, skipping"),
        }
    }

    let global = aggregate(&records);
    let out = match out {
        Some(p) if p.is_absolute() => p.to_path_buf(),
        Some(p) => root.join(p),
        None => root.join(shape.default_file_name()),
    };
    match shape {
        RankingTable::Counts => write_ranking_global_csv(&out, &global)?,
        RankingTable::PerCategory => {
            let by_category = aggregate_by_category(&records);
            write_ranking_per_category_csv(&out, categories, &global, &by_category)?
        }
    }
    info!(models = global.len(), path = %out.display(), "global ranking written");
    Ok((out, global))
}
