//! OCR text normalization.
//!
//! Turns a raw OCR string into a canonical lowercase form so that repeated
//! reads of the same on-screen text compare equal despite glyph confusions,
//! stray quotes and uneven spacing. Every step is table-driven and the whole
//! transform is idempotent.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::error::ConsolidationError;

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").unwrap());
static MULTI_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{2,}").unwrap());
static MULTI_BANG: Lazy<Regex> = Lazy::new(|| Regex::new(r"!{2,}").unwrap());
static MULTI_QUESTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?{2,}").unwrap());

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);

const SPACE_VARIANTS: &[char] = &['\u{200b}', '\u{a0}', '\t', '\n', '\r'];
const QUOTES: &[char] = &['"', '\'', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}', '\u{201e}', '\u{201a}'];
const SPACED_PUNCTUATION: &[char] = &['.', ',', '!', '?'];

/// Locale tables a deployment supplies to the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationRules {
    /// Applied before generic lowercasing, for letters whose locale-specific
    /// lowercase differs from the Unicode default (Turkish `I` → `ı`).
    pub lowercase_map: BTreeMap<String, String>,
    /// Known OCR confusions, matched case-insensitively.
    pub char_map: BTreeMap<String, String>,
    /// Letters that always count as word characters when re-tokenizing.
    pub locale_letters: String,
}

impl Default for NormalizationRules {
    fn default() -> Self {
        Self::turkish()
    }
}

impl NormalizationRules {
    pub fn turkish() -> Self {
        let lowercase_map = [("I", "ı"), ("İ", "i")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let char_map = [
            ("|", "i"),
            ("1", "ı"),
            ("0", "o"),
            ("€", "e"),
            ("¢", "c"),
            ("ã", "a"),
            ("õ", "o"),
            ("ñ", "n"),
            ("í", "i"),
            ("ó", "o"),
            ("é", "e"),
            ("á", "a"),
            ("ú", "u"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            lowercase_map,
            char_map,
            locale_letters: "çğıöşü".to_string(),
        }
    }

    /// Rules with no locale tables: only spacing, quotes, case and punctuation.
    pub fn plain() -> Self {
        Self {
            lowercase_map: BTreeMap::new(),
            char_map: BTreeMap::new(),
            locale_letters: String::new(),
        }
    }
}

/// Compiled normalization tables.
#[derive(Debug, Clone)]
pub struct Normalizer {
    lowercase_map: HashMap<char, String>,
    char_map: HashMap<char, String>,
    locale_letters: Vec<char>,
}

impl Normalizer {
    /// Compiles the rules, rejecting tables that would break idempotence:
    /// every key must be a single character and no replacement may produce a
    /// character that some later pass would rewrite again.
    pub fn new(rules: &NormalizationRules) -> Result<Self, ConsolidationError> {
        let lowercase_map = compile_table("lowercase_map", &rules.lowercase_map, false)?;
        let char_map = compile_table("char_map", &rules.char_map, true)?;

        for (key, replacement) in &char_map {
            for c in replacement.chars() {
                let rewritten = char_map.contains_key(&c)
                    || lowercase_map.contains_key(&c)
                    || c.to_lowercase().ne(std::iter::once(c));
                if rewritten {
                    return Err(ConsolidationError::Config(format!(
                        "char_map entry '{}' -> '{}' produces '{}', which would be rewritten again",
                        key, replacement, c
                    )));
                }
            }
        }

        for (key, replacement) in &lowercase_map {
            if replacement.chars().any(|c| lowercase_map.contains_key(&c)) {
                return Err(ConsolidationError::Config(format!(
                    "lowercase_map entry '{}' -> '{}' is not stable",
                    key, replacement
                )));
            }
        }

        Ok(Self {
            lowercase_map,
            char_map,
            locale_letters: rules.locale_letters.chars().collect(),
        })
    }

    pub fn normalize(&self, raw: &str) -> String {
        if raw.is_empty() {
            return String::new();
        }

        let mut text = String::with_capacity(raw.len());
        for c in raw.chars() {
            if SPACE_VARIANTS.contains(&c) {
                text.push(' ');
            } else if QUOTES.contains(&c) {
                continue;
            } else if let Some(lower) = self.lowercase_map.get(&c) {
                text.push_str(lower);
            } else {
                text.extend(c.to_lowercase());
            }
        }

        let mut fixed = String::with_capacity(text.len());
        for c in text.chars() {
            match self.char_map.get(&c) {
                Some(replacement) => fixed.push_str(replacement),
                None => fixed.push(c),
            }
        }

        let retokenized = self.retokenize(&fixed);
        let collapsed = MULTI_SPACE.replace_all(&retokenized, " ");
        let collapsed = MULTI_DOT.replace_all(&collapsed, ".");
        let collapsed = MULTI_BANG.replace_all(&collapsed, "!");
        let collapsed = MULTI_QUESTION.replace_all(&collapsed, "?");

        space_after_punctuation(&collapsed).trim().to_string()
    }

    fn is_word_char(&self, c: char) -> bool {
        c.is_alphanumeric() || self.locale_letters.contains(&c)
    }

    /// Splits into word runs and separator runs, folding every whitespace run
    /// into one space and keeping punctuation as-is.
    fn retokenize(&self, text: &str) -> String {
        let mut tokens: Vec<String> = Vec::new();
        let mut current = String::new();

        for c in text.chars() {
            if self.is_word_char(c) {
                current.push(c);
                continue;
            }
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            if c.is_whitespace() {
                if tokens.last().map(|t| t != " ").unwrap_or(true) {
                    tokens.push(" ".to_string());
                }
            } else {
                tokens.push(c.to_string());
            }
        }
        if !current.is_empty() {
            tokens.push(current);
        }

        tokens.concat()
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        // The built-in Turkish tables satisfy the stability checks.
        Self::new(&NormalizationRules::turkish()).unwrap_or_else(|_| Self {
            lowercase_map: HashMap::new(),
            char_map: HashMap::new(),
            locale_letters: Vec::new(),
        })
    }
}

/// Normalizes with the built-in Turkish tables.
pub fn normalize(raw: &str) -> String {
    DEFAULT_NORMALIZER.normalize(raw)
}

fn compile_table(
    name: &str,
    table: &BTreeMap<String, String>,
    lowercase_keys: bool,
) -> Result<HashMap<char, String>, ConsolidationError> {
    let mut compiled = HashMap::with_capacity(table.len());
    for (key, replacement) in table {
        let mut chars = key.chars();
        let (Some(c), None) = (chars.next(), chars.next()) else {
            return Err(ConsolidationError::Config(format!(
                "{} key '{}' must be exactly one character",
                name, key
            )));
        };
        let replacement = if lowercase_keys {
            replacement.to_lowercase()
        } else {
            replacement.clone()
        };
        if lowercase_keys {
            for lower in c.to_lowercase() {
                compiled.insert(lower, replacement.clone());
            }
        } else {
            compiled.insert(c, replacement);
        }
    }
    Ok(compiled)
}

/// Inserts a space after `. , ! ?` when the next character is not whitespace.
fn space_after_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut prev: Option<char> = None;
    for c in text.chars() {
        if let Some(p) = prev {
            if SPACED_PUNCTUATION.contains(&p) && !c.is_whitespace() {
                out.push(' ');
            }
        }
        out.push(c);
        prev = Some(c);
    }
    out
}
