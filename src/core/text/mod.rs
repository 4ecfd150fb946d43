//! Text-side building blocks: normalization, similarity and sentence
//! reconstruction. None of these know about frames or geometry beyond the
//! optional polygons carried by observations.

pub mod lexicon;
pub mod normalizer;
pub mod sentence_buffer;
pub mod similarity;

pub use lexicon::VariationLexicon;
pub use normalizer::{normalize, NormalizationRules, Normalizer};
pub use sentence_buffer::{SentenceBuffer, SentenceConfig};
pub use similarity::{SimilarityScore, SimilarityScorer, DEFAULT_THRESHOLD};
