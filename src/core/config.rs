use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::core::consolidator::ReportConfig;
use crate::core::error::ConsolidationError;
use crate::core::nlp::HeuristicRules;
use crate::core::text::{NormalizationRules, Normalizer, SentenceConfig, VariationLexicon, DEFAULT_THRESHOLD};
use crate::core::video::FlowConfig;

/// How accepted entries are built from observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConsolidationMode {
    /// Static on-screen text: fuzzy-match every observation against what was
    /// already accepted.
    Dedup,
    /// Captions: rebuild sentences from fragments and keep the valid ones.
    Sentences,
}

impl FromStr for ConsolidationMode {
    type Err = ConsolidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dedup" | "a" => Ok(ConsolidationMode::Dedup),
            "sentences" | "b" => Ok(ConsolidationMode::Sentences),
            other => Err(ConsolidationError::Config(format!(
                "unknown mode '{}', expected 'dedup' or 'sentences'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for ConsolidationMode {
    type Error = ConsolidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConsolidationMode> for String {
    fn from(mode: ConsolidationMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for ConsolidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsolidationMode::Dedup => write!(f, "dedup"),
            ConsolidationMode::Sentences => write!(f, "sentences"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: ConsolidationMode,
    /// 0-100 score an observation must beat to count as a repeat.
    pub similarity_threshold: f64,
    /// Detections must be strictly above this.
    pub min_confidence: f32,
    /// Run observations through the motion tracker before the mode strategy.
    pub flow_tracking: bool,
    pub sentence: SentenceConfig,
    pub flow: FlowConfig,
    pub normalization: NormalizationRules,
    pub lexicon: VariationLexicon,
    pub heuristics: HeuristicRules,
    pub report: ReportConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: ConsolidationMode::Dedup,
            similarity_threshold: DEFAULT_THRESHOLD,
            min_confidence: 0.5,
            flow_tracking: false,
            sentence: SentenceConfig::default(),
            flow: FlowConfig::default(),
            normalization: NormalizationRules::default(),
            lexicon: VariationLexicon::default(),
            heuristics: HeuristicRules::default(),
            report: ReportConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Subtitles and lower thirds: sentence reconstruction, no motion.
    pub fn for_captions() -> Self {
        Self {
            mode: ConsolidationMode::Sentences,
            ..Self::default()
        }
    }

    /// Scrolling news tickers: dedup on top of motion tracking. Static
    /// overlays such as channel bugs keep feeding one motion buffer and are
    /// never emitted here; use the default dedup config for those.
    pub fn for_ticker() -> Self {
        Self {
            mode: ConsolidationMode::Dedup,
            flow_tracking: true,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConsolidationError> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConsolidationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String, ConsolidationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConsolidationError> {
        let invalid = |msg: String| Err(ConsolidationError::Config(msg));

        if !(0.0..=100.0).contains(&self.similarity_threshold) {
            return invalid(format!(
                "similarity_threshold {} is outside 0..=100",
                self.similarity_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return invalid(format!(
                "min_confidence {} is outside 0..=1",
                self.min_confidence
            ));
        }
        if self.sentence.max_buffer_size == 0 {
            return invalid("sentence.max_buffer_size must be positive".to_string());
        }
        if self.sentence.terminators.is_empty() {
            return invalid("sentence.terminators must not be empty".to_string());
        }
        if self.flow.terminators.is_empty() {
            return invalid("flow.terminators must not be empty".to_string());
        }
        if self.flow.idle_timeout == 0 {
            return invalid("flow.idle_timeout must be positive".to_string());
        }
        if self.flow.merge_distance.is_nan() || self.flow.merge_distance <= 0.0 {
            return invalid(format!(
                "flow.merge_distance {} must be positive",
                self.flow.merge_distance
            ));
        }

        let estimator = &self.flow.estimator;
        if estimator.pyr_scale.is_nan() || estimator.pyr_scale <= 0.0 || estimator.pyr_scale >= 1.0 {
            return invalid(format!(
                "flow.estimator.pyr_scale {} is outside (0, 1)",
                estimator.pyr_scale
            ));
        }
        if estimator.window < 3 || estimator.window % 2 == 0 {
            return invalid(format!(
                "flow.estimator.window {} must be odd and at least 3",
                estimator.window
            ));
        }
        if estimator.levels == 0 || estimator.iterations == 0 {
            return invalid("flow.estimator levels and iterations must be positive".to_string());
        }

        if self.report.top_limit > self.report.bottom_limit {
            return invalid(format!(
                "report.top_limit {} exceeds report.bottom_limit {}",
                self.report.top_limit, self.report.bottom_limit
            ));
        }

        Normalizer::new(&self.normalization)?;
        Ok(())
    }
}
