//! Follows scrolling/ticking text across frames.
//!
//! Each OCR fragment is matched against live motion buffers by predicting
//! where the buffer moved using the dense displacement field between the
//! previous and current frame. Fragments that land close to a prediction are
//! appended to that buffer; the rest open new buffers. Buffers leave the live
//! set when they complete a sentence or sit idle for too long.

use image::GrayImage;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::flow_field::{DisplacementEstimator, DisplacementField, FlowParams, PyramidalFlow};
use super::frame::Frame;
use crate::core::error::ConsolidationError;
use crate::core::observation::{Point, Polygon, TextObservation};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Max distance (source pixels) between predicted and observed centroids.
    pub merge_distance: f64,
    /// Untouched frames after which a buffer is emitted and dropped.
    pub idle_timeout: u32,
    pub terminators: Vec<char>,
    pub estimator: FlowParams,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            merge_distance: 50.0,
            idle_timeout: 10,
            terminators: vec!['.', '!', '?'],
            estimator: FlowParams::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionBuffer {
    pub id: u64,
    pub text: String,
    pub polygon: Polygon,
    pub idle_frames: u32,
    pub confidence: f32,
    pub first_frame: u64,
    pub first_timestamp: f64,
}

/// Text leaving the tracker: finished, timed out, flushed, or passed through.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedText {
    /// Normalized text; for merged buffers, the space-joined fragments.
    pub text: String,
    /// Original OCR reading for pass-through texts, `text` otherwise.
    pub raw_text: String,
    pub polygon: Option<Polygon>,
    pub confidence: f32,
    pub frame_index: u64,
    pub timestamp: f64,
    /// Reassembled from motion buffers rather than passed through.
    pub is_flowing: bool,
    /// Ends with a sentence terminator.
    pub is_complete: bool,
}

impl TrackedText {
    fn passthrough(observation: &TextObservation) -> Self {
        Self {
            text: observation.normalized_text.clone(),
            raw_text: observation.raw_text.clone(),
            polygon: observation.polygon.clone(),
            confidence: observation.confidence,
            frame_index: observation.frame_index,
            timestamp: observation.timestamp,
            is_flowing: false,
            is_complete: false,
        }
    }

    fn from_buffer(buffer: MotionBuffer, is_complete: bool) -> Self {
        Self {
            raw_text: buffer.text.clone(),
            text: buffer.text,
            polygon: Some(buffer.polygon),
            confidence: buffer.confidence,
            frame_index: buffer.first_frame,
            timestamp: buffer.first_timestamp,
            is_flowing: true,
            is_complete,
        }
    }
}

enum TrackerState {
    /// No frame seen yet, so no motion can be computed.
    Idle,
    Tracking { previous: GrayImage },
}

pub struct FlowTracker {
    config: FlowConfig,
    estimator: Box<dyn DisplacementEstimator>,
    state: TrackerState,
    /// Live buffers in ascending id order.
    buffers: Vec<MotionBuffer>,
    next_id: u64,
}

impl FlowTracker {
    pub fn new(config: FlowConfig) -> Self {
        let estimator = Box::new(PyramidalFlow::new(config.estimator.clone()));
        Self::with_estimator(config, estimator)
    }

    pub fn with_estimator(config: FlowConfig, estimator: Box<dyn DisplacementEstimator>) -> Self {
        Self {
            config,
            estimator,
            state: TrackerState::Idle,
            buffers: Vec::new(),
            next_id: 0,
        }
    }

    /// Feeds one frame and its observations; returns only the texts that
    /// finished or timed out on this frame. The very first frame has no motion
    /// reference, so its observations come back untouched.
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        observations: &[TextObservation],
    ) -> Result<Vec<TrackedText>, ConsolidationError> {
        let current = frame.to_luma()?;

        let field = match &self.state {
            TrackerState::Idle => None,
            TrackerState::Tracking { previous } => Some(self.estimator.estimate(previous, &current)),
        };
        self.state = TrackerState::Tracking { previous: current };

        let Some(field) = field else {
            debug!("🎞️ Flow tracker primed on frame {}", frame.frame_number);
            return Ok(observations.iter().map(TrackedText::passthrough).collect());
        };

        let mut emitted = Vec::new();
        let mut touched: HashSet<u64> = HashSet::new();
        let mut retired: HashSet<u64> = HashSet::new();

        // Phase 1: merge decisions. Buffers finished here are only marked.
        for observation in observations {
            let polygon = match observation.polygon.as_ref() {
                Some(p) if p.is_well_formed() => p,
                _ => {
                    emitted.push(TrackedText::passthrough(observation));
                    continue;
                }
            };

            let target = self.buffers.iter().position(|buffer| {
                !retired.contains(&buffer.id) && self.follows(buffer, polygon, &field)
            });

            match target {
                Some(idx) => {
                    let buffer = &mut self.buffers[idx];
                    buffer.text = format!("{} {}", buffer.text, observation.normalized_text);
                    buffer.polygon = buffer.polygon.union(polygon);
                    buffer.idle_frames = 0;
                    buffer.confidence = buffer.confidence.min(observation.confidence);
                    touched.insert(buffer.id);

                    if ends_sentence(&buffer.text, &self.config.terminators) {
                        debug!("✂️ Motion buffer {} completed: {}", buffer.id, buffer.text);
                        retired.insert(buffer.id);
                        emitted.push(TrackedText::from_buffer(buffer.clone(), true));
                    }
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    touched.insert(id);
                    self.buffers.push(MotionBuffer {
                        id,
                        text: observation.normalized_text.clone(),
                        polygon: polygon.clone(),
                        idle_frames: 0,
                        confidence: observation.confidence,
                        first_frame: observation.frame_index,
                        first_timestamp: observation.timestamp,
                    });
                }
            }
        }

        // Phase 2: removals and idle bookkeeping.
        let mut live = Vec::with_capacity(self.buffers.len());
        for mut buffer in self.buffers.drain(..) {
            if retired.contains(&buffer.id) {
                continue;
            }
            if !touched.contains(&buffer.id) {
                buffer.idle_frames += 1;
            }
            if buffer.idle_frames >= self.config.idle_timeout {
                let complete = ends_sentence(&buffer.text, &self.config.terminators);
                debug!(
                    "⏱️ Motion buffer {} timed out after {} idle frames",
                    buffer.id, buffer.idle_frames
                );
                emitted.push(TrackedText::from_buffer(buffer, complete));
            } else {
                live.push(buffer);
            }
        }
        self.buffers = live;

        Ok(emitted)
    }

    /// Whether `polygon` is where `buffer` should be after this frame's motion.
    fn follows(&self, buffer: &MotionBuffer, polygon: &Polygon, field: &DisplacementField) -> bool {
        let (Some(old), Some(new)) = (buffer.polygon.centroid(), polygon.centroid()) else {
            return false;
        };
        let (dx, dy) = field.sample(old.x, old.y);
        let predicted = Point::new(old.x + dx, old.y + dy);
        predicted.distance(&new) < self.config.merge_distance
    }

    /// Empties the live set, returning every buffer as a flowing text.
    pub fn drain(&mut self) -> Vec<TrackedText> {
        let terminators = self.config.terminators.clone();
        self.buffers
            .drain(..)
            .map(|buffer| {
                let complete = ends_sentence(&buffer.text, &terminators);
                TrackedText::from_buffer(buffer, complete)
            })
            .collect()
    }

    pub fn live_buffers(&self) -> &[MotionBuffer] {
        &self.buffers
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, TrackerState::Tracking { .. })
    }

    pub fn estimator_name(&self) -> &str {
        self.estimator.name()
    }

    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
        self.buffers.clear();
    }
}

fn ends_sentence(text: &str, terminators: &[char]) -> bool {
    text.trim_end().ends_with(terminators)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::video::flow_field::ZeroDisplacement;

    struct Uniform(f32, f32);

    impl DisplacementEstimator for Uniform {
        fn name(&self) -> &str {
            "uniform"
        }

        fn estimate(&self, _previous: &GrayImage, current: &GrayImage) -> DisplacementField {
            DisplacementField::uniform(current.width(), current.height(), self.0, self.1)
        }
    }

    fn frame(n: u64) -> Frame {
        Frame::from_luma(640, 480, vec![0u8; 640 * 480], n * 1000, n)
    }

    fn obs(text: &str, x: f64, y: f64, n: u64) -> TextObservation {
        TextObservation {
            raw_text: text.to_string(),
            normalized_text: text.to_string(),
            polygon: Some(Polygon::rect(x, y, 60.0, 20.0)),
            confidence: 0.9,
            frame_index: n,
            timestamp: n as f64,
            is_flowing: false,
        }
    }

    fn tracker() -> FlowTracker {
        FlowTracker::with_estimator(FlowConfig::default(), Box::new(ZeroDisplacement))
    }

    #[test]
    fn test_first_frame_passes_through() {
        let mut tracker = tracker();
        assert!(!tracker.is_tracking());

        let out = tracker.process_frame(&frame(0), &[obs("son dakika", 100.0, 400.0, 0)]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "son dakika");
        assert!(!out[0].is_flowing);
        assert!(tracker.is_tracking());
        assert!(tracker.live_buffers().is_empty());
    }

    #[test]
    fn test_nearby_fragments_merge() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();

        let out = tracker.process_frame(&frame(1), &[obs("son dakika", 100.0, 400.0, 1)]).unwrap();
        assert!(out.is_empty());
        let out = tracker.process_frame(&frame(2), &[obs("deprem oldu", 130.0, 400.0, 2)]).unwrap();
        assert!(out.is_empty());

        let live = tracker.live_buffers();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].text, "son dakika deprem oldu");
        assert_eq!(live[0].polygon.points.len(), 8);
        assert_eq!(live[0].first_frame, 1);
    }

    #[test]
    fn test_distant_fragments_stay_apart() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        tracker.process_frame(&frame(1), &[obs("son dakika", 100.0, 400.0, 1)]).unwrap();
        tracker.process_frame(&frame(2), &[obs("hava durumu", 300.0, 400.0, 2)]).unwrap();

        let live = tracker.live_buffers();
        assert_eq!(live.len(), 2);
        assert!(live[0].id < live[1].id);
    }

    #[test]
    fn test_merge_distance_is_exclusive() {
        // Seed centroid is x = 130; each candidate is 60 wide, so its centroid is x + 30.
        let mut at_limit = tracker();
        at_limit.process_frame(&frame(0), &[]).unwrap();
        at_limit.process_frame(&frame(1), &[obs("sol", 100.0, 400.0, 1)]).unwrap();
        at_limit.process_frame(&frame(2), &[obs("sağ", 150.0, 400.0, 2)]).unwrap();
        assert_eq!(at_limit.live_buffers().len(), 2);

        let mut inside = tracker();
        inside.process_frame(&frame(0), &[]).unwrap();
        inside.process_frame(&frame(1), &[obs("sol", 100.0, 400.0, 1)]).unwrap();
        inside.process_frame(&frame(2), &[obs("sağ", 149.9, 400.0, 2)]).unwrap();
        assert_eq!(inside.live_buffers().len(), 1);
        assert_eq!(inside.live_buffers()[0].text, "sol sağ");
    }

    #[test]
    fn test_same_frame_fragments_merge_first_match_wins() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        tracker
            .process_frame(
                &frame(1),
                &[
                    obs("a", 100.0, 400.0, 1),
                    obs("b", 400.0, 400.0, 1),
                    obs("c", 110.0, 400.0, 1),
                ],
            )
            .unwrap();

        let texts: Vec<&str> = tracker.live_buffers().iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["a c", "b"]);
    }

    #[test]
    fn test_displacement_guides_merge() {
        let mut moving =
            FlowTracker::with_estimator(FlowConfig::default(), Box::new(Uniform(-80.0, 0.0)));
        moving.process_frame(&frame(0), &[]).unwrap();
        moving.process_frame(&frame(1), &[obs("borsa", 300.0, 420.0, 1)]).unwrap();
        moving.process_frame(&frame(2), &[obs("güne yükselişle", 220.0, 420.0, 2)]).unwrap();
        assert_eq!(moving.live_buffers().len(), 1);

        let mut still = tracker();
        still.process_frame(&frame(0), &[]).unwrap();
        still.process_frame(&frame(1), &[obs("borsa", 300.0, 420.0, 1)]).unwrap();
        still.process_frame(&frame(2), &[obs("güne yükselişle", 220.0, 420.0, 2)]).unwrap();
        assert_eq!(still.live_buffers().len(), 2);
    }

    #[test]
    fn test_completed_sentence_is_emitted() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        tracker.process_frame(&frame(1), &[obs("faiz kararı", 100.0, 400.0, 1)]).unwrap();
        let out = tracker.process_frame(&frame(2), &[obs("açıklandı.", 120.0, 400.0, 2)]).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "faiz kararı açıklandı.");
        assert!(out[0].is_flowing);
        assert!(out[0].is_complete);
        assert_eq!(out[0].frame_index, 1);
        assert!(tracker.live_buffers().is_empty());
    }

    #[test]
    fn test_idle_buffer_times_out() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        tracker.process_frame(&frame(1), &[obs("yarım kalan", 100.0, 400.0, 1)]).unwrap();

        for n in 2..11 {
            let out = tracker.process_frame(&frame(n), &[]).unwrap();
            assert!(out.is_empty(), "emitted early on frame {}", n);
        }
        assert_eq!(tracker.live_buffers()[0].idle_frames, 9);

        let out = tracker.process_frame(&frame(11), &[]).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "yarım kalan");
        assert!(out[0].is_flowing);
        assert!(!out[0].is_complete);
        assert!(tracker.live_buffers().is_empty());
    }

    #[test]
    fn test_observation_without_polygon_passes_through() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        let mut o = obs("konumsuz", 0.0, 0.0, 1);
        o.polygon = None;
        let out = tracker.process_frame(&frame(1), &[o]).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_flowing);
        assert!(tracker.live_buffers().is_empty());
    }

    #[test]
    fn test_drain_flushes_live_buffers() {
        let mut tracker = tracker();
        tracker.process_frame(&frame(0), &[]).unwrap();
        tracker
            .process_frame(&frame(1), &[obs("bir", 100.0, 100.0, 1), obs("iki", 400.0, 300.0, 1)])
            .unwrap();

        let drained = tracker.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|t| t.is_flowing && !t.is_complete));
        assert!(tracker.live_buffers().is_empty());
    }
}
