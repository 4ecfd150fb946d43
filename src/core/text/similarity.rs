//! "Same logical text" decisions for noisy OCR reads.
//!
//! Four fuzzy ratios are computed on normalized text and the best one is
//! checked against a layered set of rules: exact match, known keyword
//! misreading, co-located boxes, and finally the plain threshold.

use std::collections::BTreeSet;
use std::sync::Arc;

use strsim::normalized_levenshtein;

use super::lexicon::VariationLexicon;
use super::normalizer::Normalizer;
use crate::core::observation::TextLike;

pub const DEFAULT_THRESHOLD: f64 = 65.0;

/// Strings this short collide easily, so they need a much higher score.
const SHORT_TEXT_LEN: usize = 3;
const SHORT_TEXT_THRESHOLD: f64 = 90.0;

/// Centroids closer than this (source pixels) count as the same screen spot.
const COORD_MATCH_DISTANCE: f64 = 50.0;
const COORD_BOOST_MIN_RATIO: f64 = 40.0;
const COORD_BOOST: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityScore {
    /// Exact-alignment ratio, 0-100.
    pub ratio: f64,
    /// Best of the four ratios, including the co-location boost (uncapped).
    pub max_ratio: f64,
    pub variation_match: bool,
    pub coord_match: bool,
    /// Threshold after the short-text adjustment.
    pub threshold: f64,
}

impl SimilarityScore {
    pub fn is_match(&self) -> bool {
        if self.ratio >= 100.0 {
            return true;
        }
        if self.variation_match && self.max_ratio > self.threshold - 10.0 {
            return true;
        }
        if self.coord_match && self.max_ratio > self.threshold - 5.0 {
            return true;
        }
        self.max_ratio > self.threshold
    }
}

#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    normalizer: Arc<Normalizer>,
    lexicon: VariationLexicon,
}

impl SimilarityScorer {
    pub fn new(normalizer: Arc<Normalizer>, lexicon: VariationLexicon) -> Self {
        Self { normalizer, lexicon }
    }

    pub fn score<A, B>(&self, a: &A, b: &B, threshold: f64) -> SimilarityScore
    where
        A: TextLike + ?Sized,
        B: TextLike + ?Sized,
    {
        let norm_a = self.normalizer.normalize(a.text());
        let norm_b = self.normalizer.normalize(b.text());

        let threshold = if norm_a.chars().count() <= SHORT_TEXT_LEN
            || norm_b.chars().count() <= SHORT_TEXT_LEN
        {
            SHORT_TEXT_THRESHOLD
        } else {
            threshold
        };

        let ratio = ratio(&norm_a, &norm_b);
        let mut max_ratio = ratio
            .max(partial_ratio(&norm_a, &norm_b))
            .max(token_sort_ratio(&norm_a, &norm_b))
            .max(token_set_ratio(&norm_a, &norm_b));

        let variation_match =
            self.lexicon.canonicalize(a.text()) == self.lexicon.canonicalize(b.text());

        let centroids = a
            .polygon()
            .and_then(|p| p.centroid())
            .zip(b.polygon().and_then(|p| p.centroid()));
        let coord_match = match centroids {
            Some((ca, cb)) => ca.distance(&cb) < COORD_MATCH_DISTANCE,
            None => false,
        };
        if coord_match && max_ratio > COORD_BOOST_MIN_RATIO {
            max_ratio += COORD_BOOST;
        }

        SimilarityScore {
            ratio,
            max_ratio,
            variation_match,
            coord_match,
            threshold,
        }
    }

    pub fn same_text<A, B>(&self, a: &A, b: &B, threshold: f64) -> bool
    where
        A: TextLike + ?Sized,
        B: TextLike + ?Sized,
    {
        self.score(a, b, threshold).is_match()
    }

    pub fn normalizer(&self) -> &Arc<Normalizer> {
        &self.normalizer
    }
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(Arc::new(Normalizer::default()), VariationLexicon::default())
    }
}

/// Exact-alignment ratio on a 0-100 scale.
pub fn ratio(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b) * 100.0
}

/// Best ratio between the shorter string and any equally long window of the
/// longer one.
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (short, long) = if a_chars.len() <= b_chars.len() {
        (a_chars, b_chars)
    } else {
        (b_chars, a_chars)
    };

    if short.is_empty() {
        return if long.is_empty() { 100.0 } else { 0.0 };
    }

    let needle: String = short.iter().collect();
    let mut best = 0.0_f64;
    for window in long.windows(short.len()) {
        let candidate: String = window.iter().collect();
        let score = ratio(&needle, &candidate);
        if score > best {
            best = score;
            if best >= 100.0 {
                break;
            }
        }
    }
    best
}

/// Ratio after sorting whitespace tokens alphabetically.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Compares the shared token set against each side's full token set, so a
/// string whose tokens are a subset of the other's scores 100.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return if set_a.is_empty() && set_b.is_empty() { 100.0 } else { 0.0 };
    }

    let common = join(set_a.intersection(&set_b));
    let only_a = join(set_a.difference(&set_b));
    let only_b = join(set_b.difference(&set_a));

    let with_a = join_nonempty(&common, &only_a);
    let with_b = join_nonempty(&common, &only_b);

    let mut best = ratio(&with_a, &with_b);
    if !common.is_empty() {
        best = best.max(ratio(&common, &with_a)).max(ratio(&common, &with_b));
    }
    best
}

fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

fn join<'a>(tokens: impl Iterator<Item = &'a &'a str>) -> String {
    tokens.copied().collect::<Vec<_>>().join(" ")
}

fn join_nonempty(head: &str, tail: &str) -> String {
    match (head.is_empty(), tail.is_empty()) {
        (true, _) => tail.to_string(),
        (_, true) => head.to_string(),
        _ => format!("{} {}", head, tail),
    }
}
