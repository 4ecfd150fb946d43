//! Sentence validity and named entities.
//!
//! A real part-of-speech tagger can be plugged in through [`NlpTagger`].
//! Without one, [`HeuristicTagger`] decides validity from verb suffixes and a
//! short list of common nouns, and reports no entities.

use serde::{Deserialize, Serialize};

use crate::core::error::ConsolidationError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySet {
    pub person: Vec<String>,
    pub location: Vec<String>,
    pub organization: Vec<String>,
}

impl EntitySet {
    pub fn is_empty(&self) -> bool {
        self.person.is_empty() && self.location.is_empty() && self.organization.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextAnalysis {
    pub has_verb: bool,
    pub has_noun: bool,
    pub entities: EntitySet,
}

impl TextAnalysis {
    /// One verb-like or noun-like token is enough.
    pub fn is_sentence(&self) -> bool {
        self.has_verb || self.has_noun
    }
}

pub trait NlpTagger: Send + Sync {
    fn name(&self) -> &str;

    fn analyze(&self, text: &str) -> Result<TextAnalysis, ConsolidationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicRules {
    pub verb_suffixes: Vec<String>,
    pub common_nouns: Vec<String>,
}

impl Default for HeuristicRules {
    fn default() -> Self {
        let owned = |words: &[&str]| -> Vec<String> { words.iter().map(|w| w.to_string()).collect() };
        Self {
            verb_suffixes: owned(&[
                "yor", "dı", "di", "du", "dü", "acak", "ecek", "mış", "miş", "muş", "müş", "ti",
            ]),
            common_nouns: owned(&[
                "türkiye",
                "ankara",
                "istanbul",
                "cumhurbaşkanı",
                "bakan",
                "meclis",
                "hükümet",
            ]),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HeuristicTagger {
    rules: HeuristicRules,
}

impl HeuristicTagger {
    pub fn new(rules: HeuristicRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &HeuristicRules {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> TextAnalysis {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
            .filter(|w| !w.is_empty())
            .collect();

        let has_verb = words.iter().any(|word| {
            self.rules
                .verb_suffixes
                .iter()
                .any(|suffix| word.ends_with(suffix.as_str()))
        });
        let has_noun = words
            .iter()
            .any(|word| self.rules.common_nouns.iter().any(|noun| noun == word));

        TextAnalysis {
            has_verb,
            has_noun,
            entities: EntitySet::default(),
        }
    }
}

impl NlpTagger for HeuristicTagger {
    fn name(&self) -> &str {
        "heuristic"
    }

    fn analyze(&self, text: &str) -> Result<TextAnalysis, ConsolidationError> {
        Ok(self.classify(text))
    }
}
