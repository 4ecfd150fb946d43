//! OCR capability consumed by the consolidator.
//!
//! Every backend is adapted to one shape: a frame goes in, a list of
//! `(polygon, text, confidence)` detections comes out. The consolidator never
//! knows which engine it talks to.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::ConsolidationError;
use crate::core::observation::Polygon;
use crate::core::video::Frame;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrDetection {
    pub polygon: Option<Polygon>,
    pub text: String,
    pub confidence: f32,
}

impl OcrDetection {
    pub fn new(text: &str, polygon: Option<Polygon>, confidence: f32) -> Self {
        Self {
            polygon,
            text: text.to_string(),
            confidence,
        }
    }

    /// Reads the common `[polygon, text, confidence]` triple some engines
    /// emit. The polygon may be nested or flat; a confidence that is not a
    /// number becomes NaN and is filtered out downstream.
    pub fn from_json(value: &Value) -> Result<Self, ConsolidationError> {
        let items = value
            .as_array()
            .filter(|items| items.len() >= 3)
            .ok_or_else(|| {
                ConsolidationError::Ocr(format!("expected [polygon, text, confidence], got {}", value))
            })?;

        let text = items[1]
            .as_str()
            .ok_or_else(|| ConsolidationError::Ocr(format!("detection text is not a string: {}", items[1])))?;
        let polygon = match &items[0] {
            Value::Null => None,
            other => Some(Polygon::from_json(other)),
        };
        let confidence = items[2].as_f64().map(|c| c as f32).unwrap_or(f32::NAN);

        Ok(Self::new(text, polygon, confidence))
    }
}

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    /// May return no detections; an error loses only this frame.
    fn detect(&self, frame: &Frame) -> Result<Vec<OcrDetection>, ConsolidationError>;
}

type DetectionPattern = Box<dyn Fn(u64) -> Vec<OcrDetection> + Send + Sync>;

/// Engine that replays canned detections keyed by frame number.
pub struct ScriptedOcrEngine {
    script: HashMap<u64, Vec<OcrDetection>>,
    pattern: Option<DetectionPattern>,
    failing_frames: HashSet<u64>,
}

impl ScriptedOcrEngine {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            pattern: None,
            failing_frames: HashSet::new(),
        }
    }

    pub fn with_frames(script: Vec<(u64, Vec<OcrDetection>)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            ..Self::new()
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<OcrDetection> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
            ..Self::new()
        }
    }

    /// Makes `detect` fail on the given frame numbers.
    pub fn failing_on(mut self, frames: Vec<u64>) -> Self {
        self.failing_frames.extend(frames);
        self
    }
}

impl Default for ScriptedOcrEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<OcrDetection>, ConsolidationError> {
        if self.failing_frames.contains(&frame.frame_number) {
            return Err(ConsolidationError::Ocr(format!(
                "scripted failure on frame {}",
                frame.frame_number
            )));
        }

        if let Some(detections) = self.script.get(&frame.frame_number) {
            return Ok(detections.clone());
        }

        Ok(self
            .pattern
            .as_ref()
            .map(|p| p(frame.frame_number))
            .unwrap_or_default())
    }
}
