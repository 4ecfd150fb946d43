//! Groups accepted entries by screen region and renders them.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entry::AcceptedEntry;
use crate::core::error::ConsolidationError;

const HEADER: &str = "📺 Video Text Report:";
const EMPTY_REPORT: &str = "No text has been processed yet.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// First polygon point above this y is a heading.
    pub top_limit: f64,
    /// First polygon point below this y is a caption.
    pub bottom_limit: f64,
    /// Stand-in y for entries without a usable polygon.
    pub default_y: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_limit: 200.0,
            bottom_limit: 400.0,
            default_y: 300.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Region {
    Top,
    Bottom,
    Other,
}

impl Region {
    pub const ALL: [Region; 3] = [Region::Top, Region::Bottom, Region::Other];

    pub fn title(self) -> &'static str {
        match self {
            Region::Top => "Top Region Text",
            Region::Bottom => "Bottom Region Text (Captions)",
            Region::Other => "Other Text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportLine {
    pub timestamp: f64,
    pub text: String,
    pub occurrence_count: u32,
    pub variations: Vec<String>,
    pub is_flowing: bool,
}

impl ReportLine {
    fn from_entry(entry: &AcceptedEntry) -> Self {
        Self {
            timestamp: entry.first_timestamp,
            text: entry.canonical_text.clone(),
            occurrence_count: entry.occurrence_count,
            variations: entry.variations.clone(),
            is_flowing: entry.is_flowing,
        }
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  - [{}] {}", format_timestamp(self.timestamp), self.text)?;
        if self.variations.len() > 1 {
            write!(
                f,
                " (seen {}x; variations: {})",
                self.occurrence_count,
                self.variations.join(" | ")
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSection {
    pub region: Region,
    /// Chronological.
    pub lines: Vec<ReportLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    /// Non-empty sections only, in top, bottom, other order.
    pub sections: Vec<ReportSection>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, region: Region) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.region == region)
    }

    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn to_json(&self) -> Result<String, ConsolidationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "{}", EMPTY_REPORT);
        }

        writeln!(f, "{}", HEADER)?;
        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "🔸 {}:", section.region.title())?;
            for line in &section.lines {
                writeln!(f, "{}", line)?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reporter {
    config: ReportConfig,
}

impl Reporter {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    /// Region from the y of the first polygon point.
    pub fn classify(&self, entry: &AcceptedEntry) -> Region {
        let y = entry
            .polygon
            .as_ref()
            .and_then(|p| p.first_y())
            .unwrap_or(self.config.default_y);

        if y < self.config.top_limit {
            Region::Top
        } else if y > self.config.bottom_limit {
            Region::Bottom
        } else {
            Region::Other
        }
    }

    pub fn build(&self, entries: &[AcceptedEntry]) -> Report {
        let sections = Region::ALL
            .iter()
            .filter_map(|&region| {
                let mut grouped: Vec<&AcceptedEntry> = entries
                    .iter()
                    .filter(|e| self.classify(e) == region)
                    .collect();
                if grouped.is_empty() {
                    return None;
                }
                grouped.sort_by(|a, b| a.first_timestamp.total_cmp(&b.first_timestamp));
                Some(ReportSection {
                    region,
                    lines: grouped.into_iter().map(ReportLine::from_entry).collect(),
                })
            })
            .collect();

        Report { sections }
    }
}

/// `m:ss`, minutes unbounded.
pub fn format_timestamp(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}
