//! Known misreadings of recurring broadcast keywords.

use serde::{Deserialize, Serialize};

/// Canonical keyword → OCR misreadings. Entries apply in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    from = "Vec<(String, Vec<String>)>",
    into = "Vec<(String, Vec<String>)>"
)]
pub struct VariationLexicon {
    entries: Vec<(String, Vec<String>)>,
}

impl VariationLexicon {
    pub fn new(entries: Vec<(String, Vec<String>)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(canonical, variants)| {
                (
                    canonical.to_uppercase(),
                    variants.into_iter().map(|v| v.to_uppercase()).collect(),
                )
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Uppercases the raw text and rewrites every known misreading to its
    /// canonical keyword.
    pub fn canonicalize(&self, raw: &str) -> String {
        let mut text = raw.to_uppercase();
        for (canonical, variants) in &self.entries {
            for variant in variants {
                if !variant.is_empty() && text.contains(variant.as_str()) {
                    text = text.replace(variant.as_str(), canonical);
                }
            }
        }
        text
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<(String, Vec<String>)>> for VariationLexicon {
    fn from(entries: Vec<(String, Vec<String>)>) -> Self {
        Self::new(entries)
    }
}

impl From<VariationLexicon> for Vec<(String, Vec<String>)> {
    fn from(lexicon: VariationLexicon) -> Self {
        lexicon.entries
    }
}

impl Default for VariationLexicon {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            ("HABER", &["HABR", "HA8ER", "HABFR", "HAEER"]),
            ("TRT", &["TR7", "TRI"]),
            ("CANLI", &["CANII", "CANL1", "CANL|"]),
            ("SON DAKİKA", &["SON DAKIKA", "S0N DAKİKA", "SON DAKlKA"]),
            ("GÜNDEM", &["GUNDEM"]),
            ("SPOR", &["SP0R", "5POR"]),
        ];
        Self::new(
            table
                .iter()
                .map(|(canonical, variants)| {
                    (
                        canonical.to_string(),
                        variants.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_known_misreading() {
        let lexicon = VariationLexicon::default();
        assert_eq!(lexicon.canonicalize("habr trt"), "HABER TRT");
        assert_eq!(lexicon.canonicalize("HABER TR7"), "HABER TRT");
        assert_eq!(
            lexicon.canonicalize("habr trt"),
            lexicon.canonicalize("HABER TRT")
        );
    }

    #[test]
    fn test_unrelated_text_untouched() {
        let lexicon = VariationLexicon::default();
        assert_eq!(lexicon.canonicalize("hava durumu"), "HAVA DURUMU");
    }

    #[test]
    fn test_empty_lexicon_only_uppercases() {
        let lexicon = VariationLexicon::empty();
        assert!(lexicon.is_empty());
        assert_eq!(lexicon.canonicalize("Habr"), "HABR");
    }
}
