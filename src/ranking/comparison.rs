//! Pairwise hypothesis comparison against the judging oracle.
//!
//! Implements the contract between free-text judge output and a verdict:
//! render the fixed prompt, ask the oracle, parse the selection line, and
//! re-ask on unusable output until the attempt budget runs out.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::oracle::{AskContext, Oracle, OracleError, OracleReply};
use crate::prompts::{PromptTemplate, DEFAULT_PROMPT};

use super::types::{ComparisonTask, Verdict};

// =============================================================================
// Constants
// =============================================================================

/// Full comparisons issued before falling back to `PrefersMain`.
pub const DEFAULT_MAX_VERDICT_ATTEMPTS: u32 = 10;

/// `Selection of research hypothesis candidate: candidate <n>`, anchored at a
/// line start. Tolerates markdown emphasis, any spacing and case, and a
/// full-width colon.
static SELECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s>#*_-]*selection\s+of\s+research\s+hypothesis\s+candidate[\s*_]*[:：][\s*_]*candidate\s*(\d+)",
    )
    .expect("Invalid selection regex")
});

// =============================================================================
// Parsing
// =============================================================================

/// Parse judge output into a verdict.
///
/// The first selection line decides. Slot 1 is the main hypothesis and slot 2
/// the candidate; any other number is unparseable.
pub fn parse_verdict(raw: &str) -> Verdict {
    let Some(caps) = SELECTION.captures(raw) else {
        return Verdict::Unparseable;
    };
    match caps.get(1).map(|m| m.as_str()) {
        Some("1") => Verdict::PrefersMain,
        Some("2") => Verdict::PrefersCandidate,
        _ => Verdict::Unparseable,
    }
}

// =============================================================================
// Comparator
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ComparisonError {
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),
}

/// Resolved comparison plus how it was reached.
#[derive(Debug, Clone)]
pub struct ComparisonOutcome {
    /// Never `Unparseable`: exhausted attempts resolve to `PrefersMain`.
    pub verdict: Verdict,
    /// Oracle calls made for this comparison.
    pub attempts: u32,
    /// Whether the verdict is the fallback rather than a parsed answer.
    pub fell_back: bool,
    /// Attempts answered with the context-length sentinel.
    pub prompt_too_large_hits: u32,
    /// blake3 of the rendered prompt.
    pub prompt_hash: String,
}

pub struct PairwiseComparator {
    oracle: Arc<dyn Oracle>,
    template: PromptTemplate,
    max_attempts: u32,
}

impl PairwiseComparator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            template: DEFAULT_PROMPT,
            max_attempts: DEFAULT_MAX_VERDICT_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn model(&self) -> &str {
        self.oracle.model()
    }

    /// Judge `task.main_hypothesis` against `task.candidate`.
    pub async fn compare(
        &self,
        task: &ComparisonTask<'_>,
        ctx: &AskContext,
    ) -> Result<ComparisonOutcome, ComparisonError> {
        let prompt = self
            .template
            .render(task.question, task.main_hypothesis, task.candidate);
        let prompt_hash = prompt.hash();
        let mut prompt_too_large_hits = 0;

        for attempt in 1..=self.max_attempts {
            let reply = self.oracle.ask(&prompt.text, ctx).await?;
            let verdict = match &reply {
                OracleReply::Text(text) => parse_verdict(text),
                OracleReply::PromptTooLarge => {
                    prompt_too_large_hits += 1;
                    Verdict::Unparseable
                }
            };

            if verdict != Verdict::Unparseable {
                debug!(
                    candidate = task.index,
                    attempt,
                    verdict = verdict.as_str(),
                    "comparison resolved"
                );
                return Ok(ComparisonOutcome {
                    verdict,
                    attempts: attempt,
                    fell_back: false,
                    prompt_too_large_hits,
                    prompt_hash,
                });
            }

            debug!(
                candidate = task.index,
                attempt,
                prompt_too_large = matches!(reply, OracleReply::PromptTooLarge),
                "invalid judge output, retrying"
            );
        }

        warn!(
            candidate = task.index,
            attempts = self.max_attempts,
            "max verdict attempts reached, defaulting to main hypothesis"
        );
        Ok(ComparisonOutcome {
            verdict: Verdict::PrefersMain,
            attempts: self.max_attempts,
            fell_back: true,
            prompt_too_large_hits,
            prompt_hash,
        })
    }
}
