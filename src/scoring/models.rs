//! File-suffix to canonical model name mapping.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Suffixes that identify the generating model of a `score_res_<suffix>` file.
pub const DEFAULT_MODEL_SUFFIXES: &[(&str, &str)] = &[
    ("4o.json", "gpt-4o-2024-11-20"),
    ("4omini.json", "gpt-4o-mini-2024-07-18"),
    ("claude35haiku.json", "claude-3-5-haiku-20241022"),
    ("claude35sonnet.json", "claude-3-5-sonnet-20241022"),
    ("deepseek.json", "DeepSeek-V3"),
    ("gemini2flash.json", "gemini-2.0-flash-exp"),
    ("gemini2flashthinking.json", "gemini-2.0-flash-thinking-exp"),
    ("llama318b.json", "Meta-Llama-3.1-8B-Instruct"),
    ("llama321b.json", "Meta-Llama-3.2-1B-Instruct"),
    ("llama3170b.json", "Meta-Llama-3.1-70B-Instruct"),
    ("qwenplus.json", "qwen-plus-2024-11-25"),
    ("qwenturbo.json", "qwen-turbo-2024-11-01"),
];

/// Exact-match lookup from file suffix (the part after the artifact prefix)
/// to model name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelSuffixMap(BTreeMap<String, String>);

impl Default for ModelSuffixMap {
    fn default() -> Self {
        Self(
            DEFAULT_MODEL_SUFFIXES
                .iter()
                .map(|(suffix, model)| (suffix.to_string(), model.to_string()))
                .collect(),
        )
    }
}

impl ModelSuffixMap {
    pub fn resolve(&self, suffix: &str) -> Option<&str> {
        self.0.get(suffix).map(String::as_str)
    }

    /// Strip `prefix` from a file name and resolve the remainder.
    pub fn resolve_file(&self, file_name: &str, prefix: &str) -> Option<&str> {
        file_name
            .strip_prefix(prefix)
            .and_then(|suffix| self.resolve(suffix))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_map_is_exact_match() {
        let map = ModelSuffixMap::default();
        assert_eq!(map.len(), 12);
        assert_eq!(map.resolve("4o.json"), Some("gpt-4o-2024-11-20"));
        assert_eq!(map.resolve("4omini.json"), Some("gpt-4o-mini-2024-07-18"));
        assert_eq!(
            map.resolve("gemini2flashthinking.json"),
            Some("gemini-2.0-flash-thinking-exp")
        );
        assert_eq!(map.resolve("gpt5.json"), None);
    }

    #[test]
    fn resolve_file_strips_prefix() {
        let map = ModelSuffixMap::default();
        assert_eq!(
            map.resolve_file("score_res_deepseek.json", "score_res_"),
            Some("DeepSeek-V3")
        );
        assert_eq!(map.resolve_file("eval_res_deepseek.json", "score_res_"), None);
    }
}
