//! Per-frame OCR observations and their bounding geometry.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Bounding polygon as reported by an OCR backend, in source pixel space.
///
/// A polygon may be malformed (no points, non-finite coordinates). Such a
/// polygon is kept as-is so callers can fall back to default regions, but it
/// never takes part in spatial comparisons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Axis-aligned rectangle, clockwise from the top-left corner.
    pub fn rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(vec![
            Point::new(x, y),
            Point::new(x + width, y),
            Point::new(x + width, y + height),
            Point::new(x, y + height),
        ])
    }

    /// Builds a polygon from a flat `[x1, y1, x2, y2, ...]` list.
    /// A trailing odd coordinate is ignored.
    pub fn from_flat(coords: &[f64]) -> Self {
        Self::new(
            coords
                .chunks_exact(2)
                .map(|pair| Point::new(pair[0], pair[1]))
                .collect(),
        )
    }

    /// Parses either the nested `[[x, y], ...]` or the flat `[x, y, ...]`
    /// shape. Non-numeric entries become NaN so the result reads as malformed
    /// instead of failing the whole detection.
    pub fn from_json(value: &Value) -> Self {
        let Some(items) = value.as_array() else {
            return Self::default();
        };

        let nested = items.first().map(|v| v.is_array()).unwrap_or(false);
        if nested {
            let points = items
                .iter()
                .map(|pair| {
                    let coord = |i: usize| {
                        pair.get(i)
                            .and_then(Value::as_f64)
                            .unwrap_or(f64::NAN)
                    };
                    Point::new(coord(0), coord(1))
                })
                .collect();
            Self::new(points)
        } else {
            let flat: Vec<f64> = items
                .iter()
                .map(|v| v.as_f64().unwrap_or(f64::NAN))
                .collect();
            Self::from_flat(&flat)
        }
    }

    pub fn is_well_formed(&self) -> bool {
        !self.points.is_empty()
            && self
                .points
                .iter()
                .all(|p| p.x.is_finite() && p.y.is_finite())
    }

    /// Mean of all points; `None` for malformed polygons.
    pub fn centroid(&self) -> Option<Point> {
        if !self.is_well_formed() {
            return None;
        }
        let n = self.points.len() as f64;
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Some(Point::new(sx / n, sy / n))
    }

    /// Vertical coordinate of the first point, used for region grouping.
    pub fn first_y(&self) -> Option<f64> {
        self.points.first().map(|p| p.y).filter(|y| y.is_finite())
    }

    /// Point-set union: every point of `self` followed by every point of `other`.
    pub fn union(&self, other: &Polygon) -> Polygon {
        let mut points = Vec::with_capacity(self.points.len() + other.points.len());
        points.extend_from_slice(&self.points);
        points.extend_from_slice(&other.points);
        Polygon::new(points)
    }

    pub fn flatten(&self) -> Vec<f64> {
        self.points.iter().flat_map(|p| [p.x, p.y]).collect()
    }
}

/// One OCR-detected text instance in one frame. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObservation {
    pub raw_text: String,
    pub normalized_text: String,
    pub polygon: Option<Polygon>,
    pub confidence: f32,
    pub frame_index: u64,
    pub timestamp: f64,
    /// Set when the text was reassembled by the flow tracker.
    #[serde(default)]
    pub is_flowing: bool,
}

/// Anything the similarity scorer can compare: a text plus optional geometry.
pub trait TextLike {
    fn text(&self) -> &str;
    fn polygon(&self) -> Option<&Polygon>;
}

impl TextLike for TextObservation {
    fn text(&self) -> &str {
        &self.raw_text
    }

    fn polygon(&self) -> Option<&Polygon> {
        self.polygon.as_ref()
    }
}

impl TextLike for str {
    fn text(&self) -> &str {
        self
    }

    fn polygon(&self) -> Option<&Polygon> {
        None
    }
}

impl TextLike for String {
    fn text(&self) -> &str {
        self
    }

    fn polygon(&self) -> Option<&Polygon> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_polygon_centroid() {
        let poly = Polygon::rect(0.0, 0.0, 100.0, 20.0);
        let c = poly.centroid().unwrap();
        assert_eq!(c, Point::new(50.0, 10.0));
    }

    #[test]
    fn test_polygon_from_nested_and_flat_json() {
        let nested = Polygon::from_json(&json!([[10, 20], [30, 20], [30, 40], [10, 40]]));
        let flat = Polygon::from_json(&json!([10, 20, 30, 20, 30, 40, 10, 40]));
        assert_eq!(nested, flat);
        assert_eq!(nested.first_y(), Some(20.0));
    }

    #[test]
    fn test_malformed_polygon() {
        let poly = Polygon::from_json(&json!([["a", 1], [2, 3]]));
        assert!(!poly.is_well_formed());
        assert!(poly.centroid().is_none());

        let empty = Polygon::from_json(&json!("not a polygon"));
        assert!(empty.points.is_empty());
        assert!(empty.first_y().is_none());
    }

    #[test]
    fn test_polygon_union_keeps_all_points() {
        let a = Polygon::rect(0.0, 0.0, 10.0, 10.0);
        let b = Polygon::rect(20.0, 0.0, 10.0, 10.0);
        let u = a.union(&b);
        assert_eq!(u.points.len(), 8);
        assert_eq!(u.centroid().unwrap(), Point::new(15.0, 5.0));
    }
}
