//! Sample-weighted aggregation of score records.
//!
//! `avg(m) = Σ score_i · samples_i / Σ samples_i`. The same fold serves both
//! levels: per-file records (weight 1) into a category table, and category
//! rows (weight = their count) into the global table. Records with zero
//! samples or a non-finite score contribute to neither sum.

use std::collections::BTreeMap;

use tracing::debug;

use super::extract::ScoreRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRecord {
    pub model: String,
    pub avg_score: f64,
    pub count: u64,
    /// Σ score · samples.
    pub total_score: f64,
}

impl AggregateRecord {
    fn empty(model: &str) -> Self {
        Self {
            model: model.to_string(),
            avg_score: 0.0,
            count: 0,
            total_score: 0.0,
        }
    }

    fn add(&mut self, total: f64, count: u64) {
        self.total_score += total;
        self.count += count;
        if self.count > 0 {
            self.avg_score = self.total_score / self.count as f64;
        }
    }
}

/// Model name to aggregate, in model-name order.
pub type Aggregates = BTreeMap<String, AggregateRecord>;

/// Category name to aggregate, per model.
pub type CategoryTable = BTreeMap<String, BTreeMap<String, AggregateRecord>>;

fn contributes(record: &ScoreRecord) -> bool {
    let ok = record.samples > 0 && record.score.is_finite();
    if !ok {
        debug!(
            model = %record.model,
            category = %record.category,
            samples = record.samples,
            "excluding record without usable samples"
        );
    }
    ok
}

/// Fold records into per-model weighted averages.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a ScoreRecord>) -> Aggregates {
    records
        .into_iter()
        .filter(|r| contributes(r))
        .fold(Aggregates::new(), |mut acc, r| {
            acc.entry(r.model.clone())
                .or_insert_with(|| AggregateRecord::empty(&r.model))
                .add(r.score * r.samples as f64, r.samples);
            acc
        })
}

/// Combine two partial folds. `aggregate(a ++ b) == merge(aggregate(a), aggregate(b))`.
pub fn merge(mut left: Aggregates, right: Aggregates) -> Aggregates {
    for (model, rec) in right {
        left.entry(model)
            .or_insert_with(|| AggregateRecord::empty(&rec.model))
            .add(rec.total_score, rec.count);
    }
    left
}

/// Per-model, per-category weighted averages.
pub fn aggregate_by_category<'a>(
    records: impl IntoIterator<Item = &'a ScoreRecord>,
) -> CategoryTable {
    records
        .into_iter()
        .filter(|r| contributes(r))
        .fold(CategoryTable::new(), |mut acc, r| {
            acc.entry(r.model.clone())
                .or_default()
                .entry(r.category.clone())
                .or_insert_with(|| AggregateRecord::empty(&r.model))
                .add(r.score * r.samples as f64, r.samples);
            acc
        })
}
