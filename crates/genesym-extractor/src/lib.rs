//! genesym Extractor - Gene symbol extraction from definition text
//!
//! The model is asked to name the gene symbols in a definition; its free
//! text answer is then scanned with a fixed pattern so only
//! symbol-shaped tokens (two or more uppercase letters, optional
//! trailing digits) become candidates.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use genesym_core::{ChatMessage, LlmClient, Result};
use regex::{Captures, Regex};

/// Pattern for a symbol-shaped token
pub const SYMBOL_PATTERN: &str = r"\b[A-Z]{2,}[0-9]*\b";

/// System message establishing the assistant's domain
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant with knowledge about gene names and symbols.";

fn symbol_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SYMBOL_PATTERN).expect("symbol pattern is valid"))
}

// ============================================================================
// Prompt
// ============================================================================

/// Build the two-message conversation for one definition
pub fn build_messages(definition: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        "Identify any gene symbols in the following text: {definition}. \
         Include only the gene symbol found in the prompt text. \
         Do not return example gene symbols."
    );

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)]
}

// ============================================================================
// Token helpers
// ============================================================================

/// Distinct symbol-shaped tokens of `text`, in first-occurrence order
pub fn extract_symbols(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    symbol_regex()
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|s| seen.insert(*s))
        .map(str::to_string)
        .collect()
}

fn word_regex(word: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(word))).ok()
}

/// Whether `word` occurs in `text` as a whole word
pub fn contains_word(text: &str, word: &str) -> bool {
    match word_regex(word) {
        Some(re) => re.is_match(text),
        None => text.contains(word),
    }
}

/// Rewrite every whole-word occurrence of each `(old, new)` pair in one pass
///
/// Replacements never chain: with `FOO -> BAR` and `BAR -> BAZ`,
/// "FOO and BAR" becomes "BAR and BAZ". `SCA1` is not rewritten inside
/// `SCA12`.
pub fn replace_symbols(text: &str, renames: &[(String, String)]) -> String {
    let table: HashMap<&str, &str> = renames
        .iter()
        .filter(|(old, new)| old != new)
        .map(|(old, new)| (old.as_str(), new.as_str()))
        .collect();
    if table.is_empty() {
        return text.to_string();
    }

    // longest first so a symbol wins over its own prefix
    let mut olds: Vec<&str> = table.keys().copied().collect();
    olds.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    let alternation: Vec<String> = olds.iter().map(|old| regex::escape(old)).collect();

    match Regex::new(&format!(r"\b(?:{})\b", alternation.join("|"))) {
        Ok(re) => re
            .replace_all(text, |caps: &Captures| {
                let matched = &caps[0];
                table.get(matched).copied().unwrap_or(matched).to_string()
            })
            .into_owned(),
        Err(e) => {
            tracing::warn!("Cannot build substitution pattern: {}", e);
            text.to_string()
        }
    }
}

// ============================================================================
// Extractor
// ============================================================================

/// Asks the model for gene symbols and filters its answer into candidates
pub struct SymbolExtractor {
    llm: Arc<dyn LlmClient>,
    require_in_definition: bool,
}

impl SymbolExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            require_in_definition: true,
        }
    }

    /// Keep only candidates that appear as a whole word in the definition
    pub fn with_require_in_definition(mut self, enabled: bool) -> Self {
        self.require_in_definition = enabled;
        self
    }

    /// Candidate symbols for one definition
    ///
    /// An empty list is a normal outcome; only a failed LLM call is an error.
    pub async fn extract_candidates(&self, definition: &str) -> Result<Vec<String>> {
        let answer = self.llm.chat(&build_messages(definition)).await?;
        tracing::debug!("Model answer: {:?}", answer);

        let mut candidates = extract_symbols(&answer);
        if self.require_in_definition {
            candidates.retain(|symbol| {
                let present = contains_word(definition, symbol);
                if !present {
                    tracing::debug!("Discarding {}: not present in definition", symbol);
                }
                present
            });
        }

        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use genesym_core::GenesymError;
    use proptest::prelude::*;

    struct CannedLlm(std::result::Result<&'static str, u16>);

    #[async_trait::async_trait]
    impl LlmClient for CannedLlm {
        async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
            assert_eq!(messages.len(), 2);
            match self.0 {
                Ok(answer) => Ok(answer.to_string()),
                Err(status) => Err(GenesymError::LlmStatus {
                    status,
                    message: "rate limited".to_string(),
                }),
            }
        }

        fn model(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages("Caused by mutation in SCA12 gene.");
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].role, "user");
        assert!(messages[1]
            .content
            .contains("following text: Caused by mutation in SCA12 gene.."));
        assert!(messages[1].content.contains("Do not return example gene symbols."));
    }

    #[test]
    fn test_extract_symbols() {
        assert_eq!(extract_symbols("SCA12"), vec!["SCA12"]);
        assert_eq!(
            extract_symbols("The gene symbols are BRCA1 and TP53, not BRCA1 again."),
            vec!["BRCA1", "TP53"]
        );
        assert!(extract_symbols("There are no gene symbols in this text.").is_empty());
        // single letters and mixed-case words are not symbols
        assert!(extract_symbols("A Kinase in Brca1").is_empty());
        // digits must trail the letters
        assert!(extract_symbols("12ABC abc ABC12x").is_empty());
    }

    fn renames(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(old, new)| (old.to_string(), new.to_string()))
            .collect()
    }

    #[test]
    fn test_replace_symbols_whole_words() {
        assert_eq!(
            replace_symbols(
                "Caused by mutation in SCA12 gene.",
                &renames(&[("SCA12", "PPP2R2B")])
            ),
            "Caused by mutation in PPP2R2B gene."
        );
        assert_eq!(
            replace_symbols(
                "SCA1 differs from SCA12; see SCA1.",
                &renames(&[("SCA1", "ATXN1")])
            ),
            "ATXN1 differs from SCA12; see ATXN1."
        );
        assert_eq!(
            replace_symbols(
                "SCA1 and SCA12",
                &renames(&[("SCA1", "ATXN1"), ("SCA12", "PPP2R2B")])
            ),
            "ATXN1 and PPP2R2B"
        );
        // replacement text is literal
        assert_eq!(replace_symbols("FOO$1", &renames(&[("FOO", "$0")])), "$0$1");
        assert_eq!(replace_symbols("SCA12", &[]), "SCA12");
    }

    #[test]
    fn test_replace_symbols_does_not_chain() {
        let table = renames(&[("FOO", "BAR"), ("BAR", "BAZ")]);
        assert_eq!(
            replace_symbols("FOO and BAR genes.", &table),
            "BAR and BAZ genes."
        );

        let swap = renames(&[("ABC1", "XYZ2"), ("XYZ2", "ABC1")]);
        assert_eq!(replace_symbols("ABC1 vs XYZ2", &swap), "XYZ2 vs ABC1");
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("mutation in SCA12 gene", "SCA12"));
        assert!(!contains_word("mutation in SCA12 gene", "SCA1"));
        assert!(!contains_word("mutation in SCA12 gene", "BRCA1"));
    }

    #[tokio::test]
    async fn test_extract_candidates_filters_examples() {
        let llm = Arc::new(CannedLlm(Ok("Gene symbols: SCA12. Example: BRCA1")));
        let extractor = SymbolExtractor::new(llm.clone());

        let candidates = extractor
            .extract_candidates("Caused by mutation in SCA12 gene.")
            .await
            .unwrap();
        assert_eq!(candidates, vec!["SCA12"]);

        let unfiltered = SymbolExtractor::new(llm).with_require_in_definition(false);
        let candidates = unfiltered
            .extract_candidates("Caused by mutation in SCA12 gene.")
            .await
            .unwrap();
        assert_eq!(candidates, vec!["SCA12", "BRCA1"]);
    }

    #[tokio::test]
    async fn test_extract_candidates_propagates_llm_error() {
        let extractor = SymbolExtractor::new(Arc::new(CannedLlm(Err(429))));
        let err = extractor.extract_candidates("text").await.unwrap_err();
        assert!(matches!(err, GenesymError::LlmStatus { status: 429, .. }));
    }

    proptest! {
        #[test]
        fn prop_extraction_is_idempotent(text in "[A-Za-z0-9 ,.;()-]{0,80}") {
            let first = extract_symbols(&text);
            prop_assert_eq!(&first, &extract_symbols(&text));

            // candidates re-extract to themselves
            prop_assert_eq!(&first, &extract_symbols(&first.join(" ")));

            for symbol in &first {
                prop_assert!(symbol.len() >= 2);
                prop_assert!(contains_word(&text, symbol));
            }
        }
    }
}
