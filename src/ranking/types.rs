//! Data model for tournament ranking.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// File name prefix of a tournament input.
pub const INPUT_PREFIX: &str = "random_";
/// File name prefix of a persisted tournament result.
pub const OUTPUT_PREFIX: &str = "ranking_res_";

// =============================================================================
// Unit identity
// =============================================================================

/// Stable identifier of an evaluation unit, taken from its input file name
/// (`random_<id>.json`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse `random_<id>.json`. Returns `None` for any other file name.
    pub fn from_input_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let id = name.strip_prefix(INPUT_PREFIX)?.strip_suffix(".json")?;
        if id.is_empty() {
            return None;
        }
        Some(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalized document identifier (alphanumerics only, lower-cased).
    pub fn normalized(&self) -> String {
        normalize_doc_id(&self.0)
    }

    pub fn output_file_name(&self) -> String {
        format!("{OUTPUT_PREFIX}{}.json", self.0)
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip everything but letters and digits and lower-case the rest, so that
/// `10.1021/ACS.jpc_123` and `101021acsjpc123` name the same document.
pub fn normalize_doc_id(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

// =============================================================================
// Units and candidates
// =============================================================================

/// Where a competing hypothesis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Distractor written to look plausible.
    Fake,
    /// Generated by a model under evaluation.
    Model,
}

impl CandidateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Fake => "fake",
            CandidateKind::Model => "model",
        }
    }
}

/// On-disk shape of a tournament input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnitRecord {
    #[serde(rename = "Background Question", default)]
    pub question: String,
    #[serde(rename = "Main hypothesis", default)]
    pub main_hypothesis: String,
    #[serde(rename = "fake generate hypothesis", default)]
    pub fake_hypotheses: Vec<String>,
    #[serde(rename = "model generate hypothesis", default)]
    pub model_hypotheses: Vec<String>,
}

/// One question, its main hypothesis and the pool it competes against.
#[derive(Debug, Clone)]
pub struct EvaluationUnit {
    pub id: UnitId,
    pub question: String,
    pub main_hypothesis: String,
    pub fake_hypotheses: Vec<String>,
    pub model_hypotheses: Vec<String>,
}

impl EvaluationUnit {
    pub fn from_record(id: UnitId, record: UnitRecord) -> Self {
        Self {
            id,
            question: record.question,
            main_hypothesis: record.main_hypothesis,
            fake_hypotheses: record.fake_hypotheses,
            model_hypotheses: record.model_hypotheses,
        }
    }

    /// Combined pool: distractors first, then model-generated, in file order.
    pub fn candidates(&self) -> impl Iterator<Item = (CandidateKind, &str)> {
        self.fake_hypotheses
            .iter()
            .map(|h| (CandidateKind::Fake, h.as_str()))
            .chain(
                self.model_hypotheses
                    .iter()
                    .map(|h| (CandidateKind::Model, h.as_str())),
            )
    }

    pub fn candidate_count(&self) -> usize {
        self.fake_hypotheses.len() + self.model_hypotheses.len()
    }

    /// One comparison per candidate, all against the main hypothesis.
    pub fn comparison_tasks(&self) -> Vec<ComparisonTask<'_>> {
        self.candidates()
            .enumerate()
            .map(|(index, (kind, candidate))| ComparisonTask {
                index,
                kind,
                question: &self.question,
                main_hypothesis: &self.main_hypothesis,
                candidate,
            })
            .collect()
    }
}

/// A single main-vs-candidate comparison inside one tournament.
#[derive(Debug, Clone, Copy)]
pub struct ComparisonTask<'a> {
    /// Position in the combined candidate pool (0-based).
    pub index: usize,
    pub kind: CandidateKind,
    pub question: &'a str,
    pub main_hypothesis: &'a str,
    pub candidate: &'a str,
}

// =============================================================================
// Verdicts and results
// =============================================================================

/// Outcome of one judged comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    PrefersMain,
    PrefersCandidate,
    Unparseable,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::PrefersMain => "prefers_main",
            Verdict::PrefersCandidate => "prefers_candidate",
            Verdict::Unparseable => "unparseable",
        }
    }
}

/// Persisted tournament result. Field order matches the historical files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankResult {
    #[serde(rename = "Background Question")]
    pub question: String,
    #[serde(rename = "Main hypothesis")]
    pub main_hypothesis: String,
    #[serde(rename = "Rank")]
    pub rank: u32,
    #[serde(rename = "fake generate hypothesis")]
    pub fake_hypotheses: Vec<String>,
    #[serde(rename = "model generate hypothesis")]
    pub model_hypotheses: Vec<String>,
}

impl RankResult {
    pub fn for_unit(unit: &EvaluationUnit, rank: u32) -> Self {
        Self {
            question: unit.question.clone(),
            main_hypothesis: unit.main_hypothesis.clone(),
            rank,
            fake_hypotheses: unit.fake_hypotheses.clone(),
            model_hypotheses: unit.model_hypotheses.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn unit() -> EvaluationUnit {
        EvaluationUnit {
            id: UnitId::new("x"),
            question: "q".into(),
            main_hypothesis: "m".into(),
            fake_hypotheses: vec!["f1".into(), "f2".into()],
            model_hypotheses: vec!["g1".into()],
        }
    }

    #[test]
    fn unit_id_from_input_path() {
        let id = UnitId::from_input_path(&PathBuf::from("/data/random_10.1021_ABC.json")).unwrap();
        assert_eq!(id.as_str(), "10.1021_ABC");
        assert_eq!(id.output_file_name(), "ranking_res_10.1021_ABC.json");
        assert_eq!(id.normalized(), "101021abc");
    }

    #[test]
    fn unit_id_rejects_other_files() {
        assert!(UnitId::from_input_path(&PathBuf::from("ranking_res_1.json")).is_none());
        assert!(UnitId::from_input_path(&PathBuf::from("random_1.txt")).is_none());
        assert!(UnitId::from_input_path(&PathBuf::from("random_.json")).is_none());
    }

    #[test]
    fn candidates_are_fake_then_model() {
        let u = unit();
        let kinds: Vec<_> = u.candidates().collect();
        assert_eq!(
            kinds,
            vec![
                (CandidateKind::Fake, "f1"),
                (CandidateKind::Fake, "f2"),
                (CandidateKind::Model, "g1"),
            ]
        );
        let tasks = u.comparison_tasks();
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks[2].index, 2);
        assert_eq!(tasks[2].main_hypothesis, "m");
    }

    #[test]
    fn unit_record_tolerates_missing_fields() {
        let rec: UnitRecord = serde_json::from_str(r#"{"Main hypothesis": "m"}"#).unwrap();
        assert_eq!(rec.main_hypothesis, "m");
        assert!(rec.question.is_empty());
        assert!(rec.fake_hypotheses.is_empty());
    }

    #[test]
    fn rank_result_key_order() {
        let r = RankResult::for_unit(&unit(), 3);
        let json = serde_json::to_string(&r).unwrap();
        let q = json.find("Background Question").unwrap();
        let rank = json.find("\"Rank\"").unwrap();
        let fake = json.find("fake generate hypothesis").unwrap();
        assert!(q < rank && rank < fake);
    }
}
