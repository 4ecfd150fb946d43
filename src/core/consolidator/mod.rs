//! Session driver: frames in, accepted entries and a report out.
//!
//! One `Consolidator` owns everything stateful for one video: the accepted
//! entries, the sentence buffer (inside the sentence strategy) and the
//! optional motion tracker. Frames must arrive in order.

pub mod entry;
pub mod report;
pub mod strategy;

pub use entry::AcceptedEntry;
pub use report::{format_timestamp, Region, Report, ReportConfig, ReportLine, ReportSection, Reporter};
pub use strategy::{ConsolidationStrategy, DedupStrategy, Outcome, SentenceStrategy};

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::core::config::{ConsolidationMode, SessionConfig};
use crate::core::error::ConsolidationError;
use crate::core::nlp::{HeuristicTagger, NlpTagger};
use crate::core::observation::TextObservation;
use crate::core::ocr::{OcrDetection, OcrEngine};
use crate::core::text::{Normalizer, SimilarityScorer};
use crate::core::video::{FlowTracker, Frame, FrameSource, TrackedText};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    /// Undecodable or out-of-order frames.
    pub frames_skipped: u64,
    pub ocr_failures: u64,
    pub detections_seen: u64,
    /// Detections that passed the confidence and empty-text filters.
    pub detections_kept: u64,
    pub entries_created: u64,
    pub repeats_merged: u64,
    pub sentences_rejected: u64,
    /// Merged texts the motion tracker handed on.
    pub flowing_texts: u64,
}

pub struct Consolidator {
    config: SessionConfig,
    normalizer: Arc<Normalizer>,
    strategy: Box<dyn ConsolidationStrategy>,
    tracker: Option<FlowTracker>,
    entries: Vec<AcceptedEntry>,
    stats: SessionStats,
    last_frame: Option<u64>,
}

impl Consolidator {
    /// Fails on an invalid configuration; nothing else is fatal later on
    /// except a frame source that cannot be opened.
    pub fn new(
        config: SessionConfig,
        tagger: Option<Arc<dyn NlpTagger>>,
    ) -> Result<Self, ConsolidationError> {
        config.validate()?;

        let normalizer = Arc::new(Normalizer::new(&config.normalization)?);
        let strategy: Box<dyn ConsolidationStrategy> = match config.mode {
            ConsolidationMode::Dedup => Box::new(DedupStrategy::new(
                SimilarityScorer::new(normalizer.clone(), config.lexicon.clone()),
                config.similarity_threshold,
            )),
            ConsolidationMode::Sentences => Box::new(SentenceStrategy::new(
                &config.sentence,
                tagger,
                HeuristicTagger::new(config.heuristics.clone()),
            )),
        };
        let tracker = config
            .flow_tracking
            .then(|| FlowTracker::new(config.flow.clone()));

        Ok(Self {
            config,
            normalizer,
            strategy,
            tracker,
            entries: Vec::new(),
            stats: SessionStats::default(),
            last_frame: None,
        })
    }

    /// Replaces the motion tracker, enabling tracking if it was off.
    pub fn with_tracker(mut self, tracker: FlowTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn mode(&self) -> ConsolidationMode {
        self.strategy.mode()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Runs OCR on one frame and consolidates the result. OCR failures cost
    /// only this frame's detections.
    pub fn process_frame(&mut self, frame: &Frame, ocr: &dyn OcrEngine) -> Outcome {
        let detections = match ocr.detect(frame) {
            Ok(detections) => detections,
            Err(e) => {
                warn!(
                    "⚠️ OCR engine '{}' failed on frame {}: {}",
                    ocr.name(),
                    frame.frame_number,
                    e
                );
                self.stats.ocr_failures += 1;
                Vec::new()
            }
        };
        self.process_detections(frame, detections)
    }

    /// Consolidates detections that were produced for `frame` elsewhere.
    pub fn process_detections(&mut self, frame: &Frame, detections: Vec<OcrDetection>) -> Outcome {
        if let Some(last) = self.last_frame {
            if frame.frame_number <= last {
                warn!(
                    "⚠️ Frame {} arrived after frame {}, skipping",
                    frame.frame_number, last
                );
                self.stats.frames_skipped += 1;
                return Outcome::default();
            }
        }
        self.last_frame = Some(frame.frame_number);
        self.stats.frames_processed += 1;
        self.stats.detections_seen += detections.len() as u64;

        let mut observations = self.observe(frame, detections);
        self.stats.detections_kept += observations.len() as u64;

        if let Some(tracker) = self.tracker.as_mut() {
            match tracker.process_frame(frame, &observations) {
                Ok(tracked) => {
                    observations = tracked
                        .into_iter()
                        .map(|t| to_observation(&self.normalizer, t))
                        .collect();
                    self.stats.flowing_texts +=
                        observations.iter().filter(|o| o.is_flowing).count() as u64;
                }
                Err(e) => {
                    warn!(
                        "⚠️ Motion tracking failed on frame {}, using raw observations: {}",
                        frame.frame_number, e
                    );
                }
            }
        }

        let mut outcome = Outcome::default();
        for observation in &observations {
            outcome += self.strategy.consume(observation, &mut self.entries);
        }

        self.stats.entries_created += outcome.created as u64;
        self.stats.repeats_merged += outcome.merged as u64;
        self.stats.sentences_rejected += outcome.rejected as u64;
        outcome
    }

    fn observe(&self, frame: &Frame, detections: Vec<OcrDetection>) -> Vec<TextObservation> {
        let timestamp = frame.timestamp_secs();
        detections
            .into_iter()
            .filter_map(|detection| {
                if !detection.confidence.is_finite()
                    || detection.confidence <= self.config.min_confidence
                {
                    debug!(
                        "Dropping '{}' (confidence {})",
                        detection.text, detection.confidence
                    );
                    return None;
                }

                let normalized_text = self.normalizer.normalize(&detection.text);
                if normalized_text.is_empty() {
                    return None;
                }

                Some(TextObservation {
                    raw_text: detection.text,
                    normalized_text,
                    polygon: detection.polygon,
                    confidence: detection.confidence,
                    frame_index: frame.frame_number,
                    timestamp,
                    is_flowing: false,
                })
            })
            .collect()
    }

    /// Pulls frames until the source runs dry. Only a source that cannot be
    /// opened ends the session with an error; entries gathered so far stay
    /// available either way.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        ocr: &dyn OcrEngine,
    ) -> Result<SessionStats, ConsolidationError> {
        if let Err(e) = source.open() {
            log::error!("❌ Frame source failed to open: {}", e);
            return Err(e);
        }
        info!(
            "▶️ Consolidation started ({} mode, OCR: {}, motion tracking: {})",
            self.mode(),
            ocr.name(),
            self.tracker.is_some()
        );

        while let Some(next) = source.next_frame() {
            match next {
                Ok(frame) => {
                    self.process_frame(&frame, ocr);
                }
                Err(e) => {
                    warn!("⚠️ Skipping undecodable frame: {}", e);
                    self.stats.frames_skipped += 1;
                }
            }
        }

        info!(
            "✅ Consolidation finished: {} entries from {} frames ({} skipped)",
            self.entries.len(),
            self.stats.frames_processed,
            self.stats.frames_skipped
        );
        Ok(self.stats.clone())
    }

    /// Takes whatever is still waiting: the unterminated sentence remainder
    /// and every live motion buffer. Nothing is turned into an entry.
    pub fn flush_pending(&mut self) -> Vec<String> {
        let mut pending = self.strategy.flush();
        if let Some(tracker) = self.tracker.as_mut() {
            pending.extend(tracker.drain().into_iter().map(|t| t.text));
        }
        pending
    }

    pub fn entries(&self) -> &[AcceptedEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<AcceptedEntry> {
        self.entries
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn report(&self) -> Report {
        Reporter::new(self.config.report.clone()).build(&self.entries)
    }
}

fn to_observation(normalizer: &Normalizer, tracked: TrackedText) -> TextObservation {
    TextObservation {
        normalized_text: normalizer.normalize(&tracked.text),
        raw_text: tracked.raw_text,
        polygon: tracked.polygon,
        confidence: tracked.confidence,
        frame_index: tracked.frame_index,
        timestamp: tracked.timestamp,
        is_flowing: tracked.is_flowing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::Polygon;
    use crate::core::ocr::ScriptedOcrEngine;
    use crate::core::video::{FlowConfig, VecFrameSource, ZeroDisplacement};

    fn frame(n: u64) -> Frame {
        Frame::from_luma(64, 48, vec![0u8; 64 * 48], n * 1000, n)
    }

    fn det(text: &str, confidence: f32) -> OcrDetection {
        OcrDetection::new(text, None, confidence)
    }

    fn det_at(text: &str, x: f64, y: f64) -> OcrDetection {
        OcrDetection::new(text, Some(Polygon::rect(x, y, 80.0, 20.0)), 0.9)
    }

    #[test]
    fn test_same_text_twice_is_one_entry() {
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();
        consolidator.process_detections(&frame(0), vec![det("Son Dakika", 0.9)]);
        consolidator.process_detections(&frame(1), vec![det("Son Dakika", 0.9)]);

        let entries = consolidator.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].occurrence_count, 2);
    }

    #[test]
    fn test_noisy_reads_collapse_end_to_end() {
        let ocr = ScriptedOcrEngine::with_frames(vec![
            (0, vec![det("HABR TRT", 0.8)]),
            (1, vec![det("HABER TRT", 0.9)]),
            (2, vec![det("tamamen farklı metin", 0.7)]),
        ]);
        let mut source = VecFrameSource::new((0..3).map(frame).collect());
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();

        let stats = consolidator.run(&mut source, &ocr).unwrap();
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.entries_created, 2);
        assert_eq!(stats.repeats_merged, 1);

        let entries = consolidator.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].occurrence_count, 2);
        assert_eq!(entries[0].variations, vec!["HABR TRT", "HABER TRT"]);
        assert_eq!(entries[1].occurrence_count, 1);
        assert_eq!(entries[1].canonical_text, "tamamen farklı metin");
    }

    #[test]
    fn test_low_confidence_and_empty_text_are_dropped() {
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();
        consolidator.process_detections(
            &frame(0),
            vec![
                det("düşük", 0.5),
                det("geçersiz", f32::NAN),
                det("  \"\"  ", 0.9),
                det("gündem", 0.51),
            ],
        );

        assert_eq!(consolidator.stats().detections_seen, 4);
        assert_eq!(consolidator.stats().detections_kept, 1);
        assert_eq!(consolidator.entries().len(), 1);
        assert_eq!(consolidator.entries()[0].canonical_text, "gündem");
    }

    #[test]
    fn test_out_of_order_frame_is_skipped() {
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();
        consolidator.process_detections(&frame(5), vec![det("birinci metin", 0.9)]);
        let outcome = consolidator.process_detections(&frame(3), vec![det("ikinci metin", 0.9)]);

        assert_eq!(outcome, Outcome::default());
        assert_eq!(consolidator.stats().frames_skipped, 1);
        assert_eq!(consolidator.entries().len(), 1);
    }

    #[test]
    fn test_sentence_mode_end_to_end() {
        let ocr = ScriptedOcrEngine::with_frames(vec![
            (0, vec![det("Ankara'da", 0.9)]),
            (1, vec![det("yağmur başladı.", 0.9)]),
            (2, vec![det("Bakan açıklama", 0.9)]),
        ]);
        let mut source = VecFrameSource::new((0..3).map(frame).collect());
        let mut consolidator = Consolidator::new(SessionConfig::for_captions(), None).unwrap();
        consolidator.run(&mut source, &ocr).unwrap();

        let entries = consolidator.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].canonical_text, "ankarada yağmur başladı.");
        assert_eq!(entries[0].first_timestamp, 0.0);

        assert_eq!(consolidator.flush_pending(), vec!["bakan açıklama".to_string()]);
        assert!(consolidator.flush_pending().is_empty());
    }

    #[test]
    fn test_source_and_ocr_failures_are_not_fatal() {
        let ocr = ScriptedOcrEngine::with_pattern(|_| vec![det("Canlı Yayın", 0.9)])
            .failing_on(vec![1]);
        let mut source = VecFrameSource::with_results(vec![
            Ok(frame(0)),
            Ok(frame(1)),
            Err(ConsolidationError::Frame("corrupt packet".to_string())),
            Ok(frame(3)),
        ]);
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();

        let stats = consolidator.run(&mut source, &ocr).unwrap();
        assert_eq!(stats.frames_processed, 3);
        assert_eq!(stats.frames_skipped, 1);
        assert_eq!(stats.ocr_failures, 1);
        assert_eq!(consolidator.entries().len(), 1);
        assert_eq!(consolidator.entries()[0].occurrence_count, 2);
    }

    #[test]
    fn test_unopenable_source_is_terminal() {
        let mut source = VecFrameSource::unopenable("no such file");
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();
        let result = consolidator.run(&mut source, &ScriptedOcrEngine::new());
        assert!(matches!(result, Err(ConsolidationError::SourceOpen(_))));
        assert!(consolidator.entries().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = SessionConfig::default();
        config.min_confidence = 2.0;
        assert!(matches!(
            Consolidator::new(config, None),
            Err(ConsolidationError::Config(_))
        ));
    }

    #[test]
    fn test_motion_tracking_feeds_dedup() {
        let tracker = FlowTracker::with_estimator(FlowConfig::default(), Box::new(ZeroDisplacement));
        let mut consolidator = Consolidator::new(SessionConfig::for_ticker(), None)
            .unwrap()
            .with_tracker(tracker);

        // First frame only primes the tracker.
        consolidator.process_detections(&frame(0), vec![det_at("TRT HABER", 10.0, 20.0)]);
        assert_eq!(consolidator.entries().len(), 1);
        assert!(!consolidator.entries()[0].is_flowing);

        consolidator.process_detections(&frame(1), vec![det_at("dolar yükseldi", 100.0, 420.0)]);
        consolidator.process_detections(&frame(2), vec![det_at("euro düştü.", 130.0, 420.0)]);

        let entries = consolidator.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].canonical_text, "dolar yükseldi euro düştü.");
        assert!(entries[1].is_flowing);
        assert_eq!(entries[1].frame_index, 1);
        assert_eq!(consolidator.stats().flowing_texts, 1);
    }

    #[test]
    fn test_static_overlay_needs_untracked_dedup() {
        let logo = || vec![det_at("TRT HABER", 20.0, 20.0)];

        let mut plain = Consolidator::new(SessionConfig::default(), None).unwrap();
        for n in 0..20 {
            plain.process_detections(&frame(n), logo());
        }
        assert_eq!(plain.entries().len(), 1);
        assert_eq!(plain.entries()[0].occurrence_count, 20);

        let tracker = FlowTracker::with_estimator(FlowConfig::default(), Box::new(ZeroDisplacement));
        let mut ticker = Consolidator::new(SessionConfig::for_ticker(), None)
            .unwrap()
            .with_tracker(tracker);
        for n in 0..20 {
            ticker.process_detections(&frame(n), logo());
        }
        // Only the priming frame reaches dedup; the rest pile into one buffer.
        assert_eq!(ticker.entries().len(), 1);
        assert_eq!(ticker.entries()[0].occurrence_count, 1);
        assert_eq!(ticker.stats().flowing_texts, 0);

        let pending = ticker.flush_pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].matches("trt haber").count(), 19);
    }

    #[test]
    fn test_flush_drains_motion_buffers() {
        let tracker = FlowTracker::with_estimator(FlowConfig::default(), Box::new(ZeroDisplacement));
        let mut consolidator = Consolidator::new(SessionConfig::for_ticker(), None)
            .unwrap()
            .with_tracker(tracker);

        consolidator.process_detections(&frame(0), Vec::new());
        consolidator.process_detections(&frame(1), vec![det_at("borsa güne", 100.0, 420.0)]);

        assert_eq!(consolidator.flush_pending(), vec!["borsa güne".to_string()]);
    }

    #[test]
    fn test_report_groups_entries() {
        let mut consolidator = Consolidator::new(SessionConfig::default(), None).unwrap();
        consolidator.process_detections(
            &frame(0),
            vec![
                det_at("kanal logosu", 10.0, 150.0),
                det_at("alt yazı satırı", 10.0, 450.0),
                det_at("orta bölge metni", 10.0, 300.0),
            ],
        );

        let report = consolidator.report();
        let region_of = |text: &str| {
            report
                .sections
                .iter()
                .find(|s| s.lines.iter().any(|l| l.text == text))
                .map(|s| s.region)
        };
        assert_eq!(region_of("kanal logosu"), Some(Region::Top));
        assert_eq!(region_of("alt yazı satırı"), Some(Region::Bottom));
        assert_eq!(region_of("orta bölge metni"), Some(Region::Other));
    }
}
