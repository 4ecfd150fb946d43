pub mod config;
pub mod consolidator;
pub mod error;
pub mod nlp;
pub mod observation;
pub mod ocr;
pub mod text;
pub mod video;

pub use error::ConsolidationError;
