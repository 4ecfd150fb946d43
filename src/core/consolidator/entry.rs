use serde::{Deserialize, Serialize};

use crate::core::nlp::EntitySet;
use crate::core::observation::{Polygon, TextLike};

/// A deduplicated logical text that lives for the whole session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedEntry {
    pub canonical_text: String,
    /// Distinct raw readings, in the order they were first seen.
    pub variations: Vec<String>,
    pub occurrence_count: u32,
    pub first_timestamp: f64,
    pub frame_index: u64,
    /// Last known position.
    pub polygon: Option<Polygon>,
    pub entities: Option<EntitySet>,
    pub is_flowing: bool,
}

impl AcceptedEntry {
    pub fn new(text: &str, polygon: Option<Polygon>, timestamp: f64, frame_index: u64) -> Self {
        Self {
            canonical_text: text.to_string(),
            variations: vec![text.to_string()],
            occurrence_count: 1,
            first_timestamp: timestamp,
            frame_index,
            polygon,
            entities: None,
            is_flowing: false,
        }
    }

    /// Records another sighting of this entry.
    pub fn absorb(&mut self, text: &str, polygon: Option<&Polygon>) {
        self.occurrence_count += 1;
        if !self.variations.iter().any(|v| v == text) {
            self.variations.push(text.to_string());
        }
        if let Some(polygon) = polygon {
            self.polygon = Some(polygon.clone());
        }
    }

    pub fn has_variations(&self) -> bool {
        self.variations.len() > 1
    }
}

impl TextLike for AcceptedEntry {
    fn text(&self) -> &str {
        &self.canonical_text
    }

    fn polygon(&self) -> Option<&Polygon> {
        self.polygon.as_ref()
    }
}
