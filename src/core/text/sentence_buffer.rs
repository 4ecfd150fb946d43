use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SentenceConfig {
    /// Pending text longer than this (in characters) is force-split.
    pub max_buffer_size: usize,
    pub terminators: Vec<char>,
    /// Shortest sentence (in characters) worth keeping.
    pub min_sentence_len: usize,
}

impl Default for SentenceConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            terminators: vec!['.', '!', '?'],
            min_sentence_len: 3,
        }
    }
}

/// Rebuilds whole sentences from text fragments that arrive frame by frame.
#[derive(Debug, Clone)]
pub struct SentenceBuffer {
    buffer: String,
    max_buffer_size: usize,
    terminators: Vec<char>,
}

impl SentenceBuffer {
    pub fn new() -> Self {
        Self::with_config(&SentenceConfig::default())
    }

    pub fn with_config(config: &SentenceConfig) -> Self {
        Self {
            buffer: String::new(),
            max_buffer_size: config.max_buffer_size.max(1),
            terminators: config.terminators.clone(),
        }
    }

    /// Appends a fragment and returns every sentence it completed, in order.
    pub fn add(&mut self, text: &str) -> Vec<String> {
        self.buffer.push(' ');
        self.buffer.push_str(text.trim());
        self.buffer = self.buffer.trim().to_string();

        let mut completed = Vec::new();

        while let Some(end) = self.buffer.find(self.terminators.as_slice()) {
            // Terminator is a single char; split right after it.
            let cut = end + self.buffer[end..].chars().next().map_or(1, char::len_utf8);
            let sentence = self.buffer[..cut].trim();
            if !sentence.is_empty() {
                completed.push(sentence.to_string());
            }
            self.buffer = self.buffer[cut..].trim().to_string();
        }

        while self.buffer.chars().count() > self.max_buffer_size {
            let limit = self
                .buffer
                .char_indices()
                .nth(self.max_buffer_size)
                .map(|(i, _)| i)
                .unwrap_or(self.buffer.len());

            // Cut at the last space before the limit; without one, cut hard at it.
            let cut = match self.buffer[..limit].rfind(' ') {
                Some(space) if space > 0 => space,
                _ => limit,
            };
            let head = self.buffer[..cut].trim();
            if !head.is_empty() {
                completed.push(format!("{}...", head));
            }
            self.buffer = self.buffer[cut..].trim().to_string();
        }

        completed
    }

    /// Unterminated remainder, left in place.
    pub fn get_pending(&self) -> &str {
        &self.buffer
    }

    /// Takes the unterminated remainder, if any.
    pub fn clear(&mut self) -> Option<String> {
        let pending = std::mem::take(&mut self.buffer);
        if pending.is_empty() {
            None
        } else {
            Some(pending)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for SentenceBuffer {
    fn default() -> Self {
        Self::new()
    }
}
