use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Frame source could not be opened: {0}")]
    SourceOpen(String),
    #[error("Frame could not be decoded: {0}")]
    Frame(String),
    #[error("OCR engine failed: {0}")]
    Ocr(String),
    #[error("NLP tagger failed: {0}")]
    Tagger(String),
    #[error("Raster buffer mismatch: {0}")]
    Image(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
