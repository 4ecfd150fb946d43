//! Caller-facing text analyzer for one video.

use std::sync::{Arc, Mutex, MutexGuard};

use log::info;

use crate::core::config::SessionConfig;
use crate::core::consolidator::{AcceptedEntry, Consolidator, Outcome, SessionStats};
use crate::core::error::ConsolidationError;
use crate::core::nlp::NlpTagger;
use crate::core::ocr::OcrEngine;
use crate::core::video::{Frame, FrameSource};

/// Consolidates on-screen text of one video into a report.
///
/// ```ignore
/// let analyzer = VideoTextAnalyzer::create(SessionConfig::for_ticker(), ocr, None)?;
/// analyzer.analyze(&mut source)?;
/// println!("{}", analyzer.report());
/// ```
pub struct VideoTextAnalyzer {
    session: Mutex<Consolidator>,
    ocr: Arc<dyn OcrEngine>,
}

impl VideoTextAnalyzer {
    pub fn create(
        config: SessionConfig,
        ocr: Arc<dyn OcrEngine>,
        tagger: Option<Arc<dyn NlpTagger>>,
    ) -> Result<Self, ConsolidationError> {
        let mode = config.mode;
        let consolidator = Consolidator::new(config, tagger)?;
        info!("🎬 VideoTextAnalyzer: created ({} mode, OCR: {})", mode, ocr.name());
        Ok(Self {
            session: Mutex::new(consolidator),
            ocr,
        })
    }

    /// Same as [`create`](Self::create) with the configuration given as JSON.
    pub fn from_json_config(
        json: &str,
        ocr: Arc<dyn OcrEngine>,
        tagger: Option<Arc<dyn NlpTagger>>,
    ) -> Result<Self, ConsolidationError> {
        Self::create(SessionConfig::from_json(json)?, ocr, tagger)
    }

    fn session(&self) -> MutexGuard<'_, Consolidator> {
        self.session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn process_frame(&self, frame: &Frame) -> Outcome {
        self.session().process_frame(frame, self.ocr.as_ref())
    }

    /// Feeds the Y plane of a YUV frame without any color conversion.
    pub fn process_y_frame(
        &self,
        width: u32,
        height: u32,
        y_plane: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Outcome {
        let frame = Frame::from_luma(width, height, y_plane, timestamp_ms, frame_number);
        self.process_frame(&frame)
    }

    /// Drains `source` through OCR and consolidation.
    pub fn analyze(&self, source: &mut dyn FrameSource) -> Result<SessionStats, ConsolidationError> {
        self.session().run(source, self.ocr.as_ref())
    }

    pub fn entries(&self) -> Vec<AcceptedEntry> {
        self.session().entries().to_vec()
    }

    pub fn stats(&self) -> SessionStats {
        self.session().stats().clone()
    }

    /// Formatted text report; writing it anywhere is up to the caller.
    pub fn report(&self) -> String {
        self.session().report().render()
    }

    pub fn report_json(&self) -> Result<String, ConsolidationError> {
        self.session().report().to_json()
    }

    /// Unfinished text: the sentence remainder and live motion buffers.
    pub fn flush(&self) -> Vec<String> {
        self.session().flush_pending()
    }
}

impl Drop for VideoTextAnalyzer {
    fn drop(&mut self) {
        info!("🗑️ VideoTextAnalyzer: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observation::Polygon;
    use crate::core::ocr::{OcrDetection, ScriptedOcrEngine};
    use crate::core::video::VecFrameSource;

    fn ticker_ocr() -> Arc<dyn OcrEngine> {
        Arc::new(ScriptedOcrEngine::with_pattern(|n| {
            let caption = if n % 2 == 0 { "HABR TRT" } else { "HABER TRT" };
            vec![OcrDetection::new(
                caption,
                Some(Polygon::rect(20.0, 440.0, 200.0, 30.0)),
                0.9,
            )]
        }))
    }

    #[test]
    fn test_analyze_and_report() {
        let analyzer = VideoTextAnalyzer::create(SessionConfig::default(), ticker_ocr(), None).unwrap();
        let frames = (0..4)
            .map(|n| Frame::from_luma(2, 2, vec![0; 4], n * 1000, n))
            .collect();

        let stats = analyzer.analyze(&mut VecFrameSource::new(frames)).unwrap();
        assert_eq!(stats.frames_processed, 4);

        let entries = analyzer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].occurrence_count, 4);

        let report = analyzer.report();
        assert!(report.contains("🔸 Bottom Region Text (Captions):"));
        assert!(report.contains("[0:00] HABR TRT (seen 4x; variations: HABR TRT | HABER TRT)"));
        assert!(analyzer.report_json().unwrap().contains("\"bottom\""));
    }

    #[test]
    fn test_process_y_frame() {
        let analyzer = VideoTextAnalyzer::create(SessionConfig::default(), ticker_ocr(), None).unwrap();
        let outcome = analyzer.process_y_frame(2, 2, vec![0; 4], 0, 0);
        assert_eq!(outcome.created, 1);
        assert_eq!(analyzer.stats().frames_processed, 1);
    }

    #[test]
    fn test_bad_json_config_fails_creation() {
        let result = VideoTextAnalyzer::from_json_config(
            r#"{"similarity_threshold": -3}"#,
            Arc::new(ScriptedOcrEngine::new()),
            None,
        );
        assert!(matches!(result, Err(ConsolidationError::Config(_))));
    }

    #[test]
    fn test_flush_in_caption_mode() {
        let ocr: Arc<dyn OcrEngine> = Arc::new(ScriptedOcrEngine::with_frames(vec![(
            0,
            vec![OcrDetection::new("Yarın hava", None, 0.8)],
        )]));
        let analyzer = VideoTextAnalyzer::create(SessionConfig::for_captions(), ocr, None).unwrap();
        analyzer.process_y_frame(2, 2, vec![0; 4], 0, 0);

        assert!(analyzer.entries().is_empty());
        assert_eq!(analyzer.flush(), vec!["yarın hava".to_string()]);
        assert_eq!(analyzer.report(), "No text has been processed yet.");
    }
}
