//! Prompt templates for pairwise hypothesis comparisons.
//!
//! Slot order is fixed: the main hypothesis is always rendered as
//! "candidate 1" and the competing hypothesis as "candidate 2". Verdict
//! parsing and the "prefers main" fallback rely on this assignment.

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the oracle.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: &'static str,
    pub text: String,
}

impl PromptInstance {
    /// Stable content hash, used in comparison traces.
    pub fn hash(&self) -> String {
        blake3::hash(self.text.as_bytes()).to_hex().to_string()
    }
}

/// A prompt template with `{question}`, `{candidate_1}` and `{candidate_2}`
/// placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub body: &'static str,
}

impl PromptTemplate {
    /// Render with the main hypothesis in slot 1 and the candidate in slot 2.
    pub fn render(&self, question: &str, main: &str, candidate: &str) -> PromptInstance {
        // Substitute in a single pass so hypothesis text that happens to
        // contain a placeholder is never expanded again.
        let mut text = String::with_capacity(
            self.body.len() + question.len() + main.len() + candidate.len(),
        );
        let mut rest = self.body;
        while let Some(start) = rest.find('{') {
            text.push_str(&rest[..start]);
            let tail = &rest[start..];
            let replacement = [
                ("{question}", question),
                ("{candidate_1}", main),
                ("{candidate_2}", candidate),
            ]
            .into_iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder));
            match replacement {
                Some((placeholder, value)) => {
                    text.push_str(value);
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    text.push('{');
                    rest = &tail[1..];
                }
            }
        }
        text.push_str(rest);

        PromptInstance {
            template_slug: self.slug,
            text,
        }
    }
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const HYPOTHESIS_COMPARE_V1: PromptTemplate = PromptTemplate {
    slug: "hypothesis_compare_v1",
    body: r#"You are assisting scientists with their research. Given a research question and two research hypothesis candidates proposed by large language models, your task is to predict which hypothesis is a better research hypothesis. By 'better', we mean the hypothesis is more valid and effective for the research question.
Please note:
(1) Neither hypothesis has been tested experimentally. Ignore any described expected performance and focus only on technical content to predict effectiveness in real experiments.
(2) Focus on the core idea's effectiveness, not additional details or complexity.
The research question is: {question}
Research hypothesis candidate 1 is: {candidate_1}
Research hypothesis candidate 2 is: {candidate_2}
Now, predict which hypothesis will be more effective if tested in real experiments. Use this format:
**Analysis**:
**Selection of research hypothesis candidate**: candidate 1 or candidate 2
"#,
};

pub const PROMPTS: &[PromptTemplate] = &[HYPOTHESIS_COMPARE_V1];
pub const DEFAULT_PROMPT: PromptTemplate = HYPOTHESIS_COMPARE_V1;

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================
