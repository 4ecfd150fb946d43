//! The two ways observations become accepted entries.

use std::ops::AddAssign;
use std::sync::Arc;

use log::{debug, warn};

use super::entry::AcceptedEntry;
use crate::core::config::ConsolidationMode;
use crate::core::nlp::{HeuristicTagger, NlpTagger, TextAnalysis};
use crate::core::observation::TextObservation;
use crate::core::text::{SentenceBuffer, SentenceConfig, SimilarityScorer};

/// What one or more observations did to the entry collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Outcome {
    pub created: usize,
    pub merged: usize,
    pub rejected: usize,
}

impl AddAssign for Outcome {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.merged += other.merged;
        self.rejected += other.rejected;
    }
}

pub trait ConsolidationStrategy: Send {
    fn mode(&self) -> ConsolidationMode;

    fn consume(
        &mut self,
        observation: &TextObservation,
        entries: &mut Vec<AcceptedEntry>,
    ) -> Outcome;

    /// Text held back waiting for more input.
    fn flush(&mut self) -> Vec<String>;
}

/// Fuzzy dedup against everything accepted so far.
pub struct DedupStrategy {
    scorer: SimilarityScorer,
    threshold: f64,
}

impl DedupStrategy {
    pub fn new(scorer: SimilarityScorer, threshold: f64) -> Self {
        Self { scorer, threshold }
    }

    /// Index of the matching entry with the highest exact-alignment ratio.
    /// Ties go to the older entry.
    fn best_match(&self, observation: &TextObservation, entries: &[AcceptedEntry]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, entry) in entries.iter().enumerate() {
            let score = self.scorer.score(observation, entry, self.threshold);
            if !score.is_match() {
                continue;
            }
            if best.map_or(true, |(_, ratio)| score.ratio > ratio) {
                best = Some((idx, score.ratio));
            }
        }
        best.map(|(idx, _)| idx)
    }
}

impl ConsolidationStrategy for DedupStrategy {
    fn mode(&self) -> ConsolidationMode {
        ConsolidationMode::Dedup
    }

    fn consume(
        &mut self,
        observation: &TextObservation,
        entries: &mut Vec<AcceptedEntry>,
    ) -> Outcome {
        match self.best_match(observation, entries) {
            Some(idx) => {
                let entry = &mut entries[idx];
                entry.absorb(&observation.raw_text, observation.polygon.as_ref());
                entry.is_flowing |= observation.is_flowing;
                debug!(
                    "🔁 '{}' matched '{}' (seen {}x)",
                    observation.raw_text, entry.canonical_text, entry.occurrence_count
                );
                Outcome {
                    merged: 1,
                    ..Outcome::default()
                }
            }
            None => {
                let mut entry = AcceptedEntry::new(
                    &observation.raw_text,
                    observation.polygon.clone(),
                    observation.timestamp,
                    observation.frame_index,
                );
                entry.is_flowing = observation.is_flowing;
                debug!("🆕 New entry: '{}'", entry.canonical_text);
                entries.push(entry);
                Outcome {
                    created: 1,
                    ..Outcome::default()
                }
            }
        }
    }

    fn flush(&mut self) -> Vec<String> {
        Vec::new()
    }
}

/// Sentence reconstruction: fragments are joined until a terminator shows
/// up, and each completed sentence that reads like language is accepted.
pub struct SentenceStrategy {
    buffer: SentenceBuffer,
    min_sentence_len: usize,
    tagger: Option<Arc<dyn NlpTagger>>,
    fallback: HeuristicTagger,
    /// Timestamp and frame of the first fragment still in the buffer.
    pending_since: Option<(f64, u64)>,
}

impl SentenceStrategy {
    pub fn new(
        config: &SentenceConfig,
        tagger: Option<Arc<dyn NlpTagger>>,
        fallback: HeuristicTagger,
    ) -> Self {
        Self {
            buffer: SentenceBuffer::with_config(config),
            min_sentence_len: config.min_sentence_len,
            tagger,
            fallback,
            pending_since: None,
        }
    }

    pub fn pending(&self) -> &str {
        self.buffer.get_pending()
    }

    fn analyze(&self, sentence: &str) -> TextAnalysis {
        match &self.tagger {
            Some(tagger) => match tagger.analyze(sentence) {
                Ok(analysis) => analysis,
                Err(e) => {
                    warn!("⚠️ Tagger '{}' failed, using heuristics: {}", tagger.name(), e);
                    self.fallback.classify(sentence)
                }
            },
            None => self.fallback.classify(sentence),
        }
    }
}

impl ConsolidationStrategy for SentenceStrategy {
    fn mode(&self) -> ConsolidationMode {
        ConsolidationMode::Sentences
    }

    fn consume(
        &mut self,
        observation: &TextObservation,
        entries: &mut Vec<AcceptedEntry>,
    ) -> Outcome {
        let here = (observation.timestamp, observation.frame_index);
        let start = self.pending_since.take().unwrap_or(here);

        let sentences = self.buffer.add(&observation.normalized_text);
        let mut outcome = Outcome::default();

        for (i, sentence) in sentences.iter().enumerate() {
            let analysis = if sentence.chars().count() >= self.min_sentence_len {
                Some(self.analyze(sentence))
            } else {
                None
            };

            match analysis.filter(TextAnalysis::is_sentence) {
                Some(analysis) => {
                    let (timestamp, frame_index) = if i == 0 { start } else { here };
                    let mut entry = AcceptedEntry::new(
                        sentence,
                        observation.polygon.clone(),
                        timestamp,
                        frame_index,
                    );
                    entry.entities = Some(analysis.entities);
                    entry.is_flowing = observation.is_flowing;
                    debug!("📝 Sentence accepted: '{}'", sentence);
                    entries.push(entry);
                    outcome.created += 1;
                }
                None => {
                    debug!("🚫 Sentence rejected: '{}'", sentence);
                    outcome.rejected += 1;
                }
            }
        }

        if !self.buffer.is_empty() {
            self.pending_since = Some(if sentences.is_empty() { start } else { here });
        }

        outcome
    }

    fn flush(&mut self) -> Vec<String> {
        self.pending_since = None;
        self.buffer.clear().into_iter().collect()
    }
}
