//! Per-round hypothesis scores of a composition run.
//!
//! Raw artifacts (`eval_res_*.json`) hold a flat list of generation records.
//! They are regrouped into `score_res_*.json`:
//!
//! ```json
//! { "round 3": { "hypothesis 1": { "content": "...", "ground_truth_score": 4 } } }
//! ```
//!
//! with rounds in descending order and hypotheses sorted by descending score.

use std::cmp::Ordering;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use super::extract::ExtractError;

/// Hypotheses shorter than this (in characters) are truncated or empty
/// generations and never count toward a score.
pub const MIN_CONTENT_CHARS: usize = 20;

/// Positions inside one raw generation record.
const RECORD_CONTENT: usize = 0;
const RECORD_SCORE: usize = 7;
const RECORD_ROUND: usize = 9;
/// Position of the record list inside a raw artifact.
const ARTIFACT_RECORDS: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisScore {
    pub content: String,
    /// `None` when the score is null or not a number.
    pub ground_truth_score: Option<f64>,
}

impl HypothesisScore {
    /// Long enough content and a non-null, non-zero score.
    pub fn is_valid(&self) -> bool {
        self.content.chars().count() >= MIN_CONTENT_CHARS
            && matches!(self.ground_truth_score, Some(s) if s != 0.0 && s.is_finite())
    }
}

impl Serialize for HypothesisScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("HypothesisScore", 2)?;
        s.serialize_field("content", &self.content)?;
        s.serialize_field("ground_truth_score", &self.ground_truth_score)?;
        s.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub number: i64,
    /// Ordered as stored: `hypothesis 1` first.
    pub hypotheses: Vec<HypothesisScore>,
}

/// All rounds of one composition run, highest round first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundScores {
    pub rounds: Vec<Round>,
}

struct HypothesesMap<'a>(&'a [HypothesisScore]);

impl Serialize for HypothesesMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (idx, hyp) in self.0.iter().enumerate() {
            map.serialize_entry(&format!("hypothesis {}", idx + 1), hyp)?;
        }
        map.end()
    }
}

impl Serialize for RoundScores {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.rounds.len()))?;
        for round in &self.rounds {
            map.serialize_entry(
                &format!("round {}", round.number),
                &HypothesesMap(&round.hypotheses),
            )?;
        }
        map.end()
    }
}

impl RoundScores {
    /// Parse a `score_res_` document. Keys that are not `round <n>` are
    /// ignored, as are hypothesis entries without `content`.
    pub fn from_value(value: &Value) -> Result<Self, ExtractError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ExtractError::Shape("expected a JSON object of rounds".into()))?;

        let mut rounds = Vec::new();
        for (key, hyps) in obj {
            let Some(number) = parse_round_key(key) else {
                debug!(key = %key, "ignoring non-round key");
                continue;
            };
            let Some(hyps) = hyps.as_object() else {
                debug!(round = number, "round is not an object");
                rounds.push(Round {
                    number,
                    hypotheses: Vec::new(),
                });
                continue;
            };
            let mut entries: Vec<(u64, HypothesisScore)> = hyps
                .iter()
                .filter_map(|(hkey, hval)| {
                    let content = hval.get("content")?.as_str()?.to_string();
                    let ground_truth_score = hval.get("ground_truth_score").and_then(lenient_f64);
                    let order = hkey
                        .strip_prefix("hypothesis ")
                        .and_then(|n| n.trim().parse().ok())
                        .unwrap_or(u64::MAX);
                    Some((
                        order,
                        HypothesisScore {
                            content,
                            ground_truth_score,
                        },
                    ))
                })
                .collect();
            entries.sort_by_key(|(order, _)| *order);
            rounds.push(Round {
                number,
                hypotheses: entries.into_iter().map(|(_, h)| h).collect(),
            });
        }
        rounds.sort_by(|a, b| b.number.cmp(&a.number));
        Ok(Self { rounds })
    }

    /// Highest-numbered round, if any.
    pub fn final_round(&self) -> Option<&Round> {
        self.rounds.iter().max_by_key(|r| r.number)
    }

    /// Mean score of the valid hypotheses in the final round, with the number
    /// of hypotheses that passed. `None` when nothing passed.
    pub fn final_round_mean(&self) -> Option<(f64, usize)> {
        let round = self.final_round()?;
        let (sum, n) = round
            .hypotheses
            .iter()
            .filter(|h| h.is_valid())
            .filter_map(|h| h.ground_truth_score)
            .fold((0.0, 0usize), |(sum, n), s| (sum + s, n + 1));
        if n == 0 {
            return None;
        }
        Some((sum / n as f64, n))
    }
}

/// Group a raw `eval_res_` artifact by round.
///
/// Records too short to carry content, score and round are logged and
/// skipped. A missing record list is an error.
pub fn convert_eval_result(value: &Value) -> Result<RoundScores, ExtractError> {
    let records = value
        .get(ARTIFACT_RECORDS)
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::Shape("missing record list at index 2".into()))?;

    let mut rounds: Vec<Round> = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        let Some(parsed) = parse_record(record) else {
            warn!(record = idx, "invalid record format, skipping");
            continue;
        };
        let (number, hyp) = parsed;
        match rounds.iter_mut().find(|r| r.number == number) {
            Some(round) => round.hypotheses.push(hyp),
            None => rounds.push(Round {
                number,
                hypotheses: vec![hyp],
            }),
        }
    }

    for round in &mut rounds {
        round
            .hypotheses
            .sort_by(|a, b| descending_score(a.ground_truth_score, b.ground_truth_score));
    }
    rounds.sort_by(|a, b| b.number.cmp(&a.number));
    Ok(RoundScores { rounds })
}

fn parse_record(record: &Value) -> Option<(i64, HypothesisScore)> {
    let fields = record.as_array()?;
    let content = match fields.get(RECORD_CONTENT)? {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let ground_truth_score = lenient_f64(fields.get(RECORD_SCORE)?);
    let number = lenient_i64(fields.get(RECORD_ROUND)?)?;
    Some((
        number,
        HypothesisScore {
            content,
            ground_truth_score,
        },
    ))
}

/// Stable descending sort; unscored hypotheses go last.
fn descending_score(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn parse_round_key(key: &str) -> Option<i64> {
    key.strip_prefix("round ")?.trim().parse().ok()
}

/// Numbers, and strings that parse as numbers.
pub(crate) fn lenient_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
