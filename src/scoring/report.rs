//! CSV tables for the aggregation pipeline.
//!
//! Column names are kept byte-for-byte compatible with the historical files,
//! including the `totle_score` spelling, so downstream notebooks keep working.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::ranking::store::{write_atomic, StoreError};

use super::aggregate::{Aggregates, CategoryTable};
use super::extract::ScoreRecord;

pub const COMPOSITION_HEADER: &[&str] = &["model", "avg_score", "count", "totle_score"];
pub const RANKING_CATEGORY_HEADER: &[&str] = &["model_name", "avg_rank", "count"];

pub const COMPOSITION_CSV: &str = "model_generate_score.csv";
pub const RANKING_CATEGORY_CSV: &str = "llm_ranking.csv";
pub const RANKING_GLOBAL_CSV: &str = "avg_llm_ranking.csv";
pub const RANKING_PER_CATEGORY_CSV: &str = "avg_llm_ranking2.csv";

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: missing column {column}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{path}: empty file")]
    Empty { path: PathBuf },
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// CSV primitives
// =============================================================================

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push_str(&line);
    out.push_str("\r\n");
}

/// Split CSV text into records, honouring quoted fields with embedded
/// commas, quotes and newlines.
///
/// Only a quote that opens a field starts quoting; a quote inside an
/// unquoted field is kept literally. Bare `\r` outside quotes is dropped.
/// Rows are not checked against the header width: short rows leave the
/// trailing columns absent and extra fields are ignored by [`read_rows`].
/// No other dialect (alternate delimiters, escape characters) is accepted.
fn parse_records(text: &str) -> Vec<Vec<String>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.trim_start_matches('\u{feff}').chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    records.retain(|r| !(r.len() == 1 && r[0].is_empty()));
    records
}

/// Header-keyed rows of a CSV file.
fn read_rows(path: &Path, required: &[&str]) -> Result<Vec<HashMap<String, String>>, ReportError> {
    let text = fs::read_to_string(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut records = parse_records(&text).into_iter();
    let header = records.next().ok_or_else(|| ReportError::Empty {
        path: path.to_path_buf(),
    })?;
    let header: Vec<String> = header.into_iter().map(|h| h.trim().to_string()).collect();
    for column in required {
        if !header.iter().any(|h| h == column) {
            return Err(ReportError::MissingColumn {
                path: path.to_path_buf(),
                column: column.to_string(),
            });
        }
    }
    Ok(records
        .map(|fields| header.iter().cloned().zip(fields).collect())
        .collect())
}

fn write_table(path: &Path, body: &str) -> Result<(), ReportError> {
    write_atomic(path, body.as_bytes())?;
    Ok(())
}

fn fmt_f64(value: f64) -> String {
    let mut s = String::new();
    let _ = write!(s, "{value}");
    s
}

fn field<'a>(row: &'a HashMap<String, String>, column: &str) -> Option<&'a str> {
    row.get(column).map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Counts written by older tooling may be floats (`15.0`).
fn parse_count(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

// =============================================================================
// Composition tables
// =============================================================================

/// `model,avg_score,count,totle_score`; used at category and global level.
pub fn write_composition_csv(path: &Path, table: &Aggregates) -> Result<(), ReportError> {
    let mut out = String::new();
    push_row(&mut out, COMPOSITION_HEADER);
    for rec in table.values() {
        push_row(
            &mut out,
            &[
                rec.model.clone(),
                fmt_f64(rec.avg_score),
                rec.count.to_string(),
                fmt_f64(rec.total_score),
            ],
        );
    }
    write_table(path, &out)
}

/// Category rows as records weighted by their `count`. The score is taken
/// from `totle_score / count`; rows with bad numbers are skipped.
pub fn read_composition_csv(path: &Path, category: &str) -> Result<Vec<ScoreRecord>, ReportError> {
    let rows = read_rows(path, &["model", "count", "totle_score"])?;
    let mut records = Vec::new();
    for row in rows {
        let model = field(&row, "model");
        let count = field(&row, "count").and_then(parse_count);
        let total = field(&row, "totle_score").and_then(|s| s.parse::<f64>().ok());
        match (model, count, total) {
            (Some(model), Some(count), Some(total)) if count > 0 => {
                records.push(ScoreRecord::new(model, category, total / count as f64, count));
            }
            _ => debug!(path = %path.display(), ?row, "skipping composition row"),
        }
    }
    Ok(records)
}

// =============================================================================
// Ranking tables
// =============================================================================

/// `model_name,avg_rank,count` for one category.
pub fn write_ranking_category_csv(path: &Path, table: &Aggregates) -> Result<(), ReportError> {
    let mut out = String::new();
    push_row(&mut out, RANKING_CATEGORY_HEADER);
    for rec in table.values() {
        push_row(
            &mut out,
            &[rec.model.clone(), fmt_f64(rec.avg_score), rec.count.to_string()],
        );
    }
    write_table(path, &out)
}

/// Category rows as records weighted by `count`. A row without `avg_rank`
/// contributes to neither sum.
pub fn read_ranking_category_csv(
    path: &Path,
    category: &str,
) -> Result<Vec<ScoreRecord>, ReportError> {
    let rows = read_rows(path, RANKING_CATEGORY_HEADER)?;
    let mut records = Vec::new();
    for row in rows {
        let model = field(&row, "model_name");
        let avg = field(&row, "avg_rank").and_then(|s| s.parse::<f64>().ok());
        let count = field(&row, "count").and_then(parse_count);
        match (model, avg, count) {
            (Some(model), Some(avg), Some(count)) if count > 0 => {
                records.push(ScoreRecord::new(model, category, avg, count));
            }
            _ => debug!(path = %path.display(), ?row, "skipping ranking row"),
        }
    }
    Ok(records)
}

/// `model_name,avg_rank,count3`.
pub fn write_ranking_global_csv(path: &Path, table: &Aggregates) -> Result<(), ReportError> {
    let mut out = String::new();
    push_row(&mut out, &["model_name", "avg_rank", "count3"]);
    for rec in table.values() {
        push_row(
            &mut out,
            &[rec.model.clone(), fmt_f64(rec.avg_score), rec.count.to_string()],
        );
    }
    write_table(path, &out)
}

/// `model_name,avg_rank,<category...>`: the global average followed by each
/// category's average (empty where the model has no data).
pub fn write_ranking_per_category_csv(
    path: &Path,
    categories: &[String],
    global: &Aggregates,
    by_category: &CategoryTable,
) -> Result<(), ReportError> {
    let mut out = String::new();
    let mut header = vec!["model_name".to_string(), "avg_rank".to_string()];
    header.extend(categories.iter().cloned());
    push_row(&mut out, &header);

    for rec in global.values() {
        let mut row = vec![rec.model.clone(), fmt_f64(rec.avg_score)];
        let per_model = by_category.get(&rec.model);
        for category in categories {
            let cell = per_model
                .and_then(|m| m.get(category))
                .map(|c| fmt_f64(c.avg_score))
                .unwrap_or_default();
            row.push(cell);
        }
        push_row(&mut out, &row);
    }
    write_table(path, &out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::aggregate::aggregate;

    #[test]
    fn parses_quoted_fields() {
        let rows = parse_records("a,b\r\n\"x, y\",\"say \"\"hi\"\"\"\r\nlast,\n");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1], vec!["x, y".to_string(), "say \"hi\"".to_string()]);
        assert_eq!(rows[2], vec!["last".to_string(), String::new()]);
    }

    #[test]
    fn quoted_newline_and_stray_quote() {
        let rows = parse_records("model,avg\n\"multi\nline\",1\nsay 5\" model,2\nshort\n");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1], vec!["multi\nline".to_string(), "1".to_string()]);
        assert_eq!(rows[2], vec!["say 5\" model".to_string(), "2".to_string()]);
        assert_eq!(rows[3], vec!["short".to_string()]);
    }

    #[test]
    fn escapes_only_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("q\"q"), "\"q\"\"q\"");
    }

    #[test]
    fn ranking_category_table_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RANKING_CATEGORY_CSV);
        let table = aggregate(&vec![
            ScoreRecord::new("gpt-4o", "Physics", 0.75, 4),
            ScoreRecord::new("model, with comma", "Physics", 0.5, 2),
        ]);
        write_ranking_category_csv(&path, &table).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("model_name,avg_rank,count\r\n"));

        let back = read_ranking_category_csv(&path, "Physics").unwrap();
        assert_eq!(back.len(), 2);
        let comma = back.iter().find(|r| r.model == "model, with comma").unwrap();
        assert_eq!(comma.samples, 2);
        assert_eq!(comma.score, 0.5);
    }

    #[test]
    fn ranking_rows_without_average_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm_ranking.csv");
        fs::write(&path, "model_name,avg_rank,count\na,,3\nb,0.5,2.0\nc,0.1,0\n").unwrap();
        let rows = read_ranking_category_csv(&path, "Law").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].model, "b");
        assert_eq!(rows[0].samples, 2);
    }

    #[test]
    fn composition_reads_totals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMPOSITION_CSV);
        fs::write(
            &path,
            "model,avg_score,count,totle_score\nDeepSeek-V3,3.5,2,7.0\nbad,x,y,z\n",
        )
        .unwrap();
        let rows = read_composition_csv(&path, "Math").unwrap();
        assert_eq!(rows, vec![ScoreRecord::new("DeepSeek-V3", "Math", 3.5, 2)]);
    }

    #[test]
    fn missing_column_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.csv");
        fs::write(&path, "model,avg\n").unwrap();
        assert!(matches!(
            read_composition_csv(&path, "c"),
            Err(ReportError::MissingColumn { .. })
        ));
    }
}
