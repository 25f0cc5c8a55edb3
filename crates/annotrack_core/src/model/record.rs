//! Report record assembly.
//!
//! # Responsibility
//! - Represent the immutable annotatable unit served to graders.
//! - Assemble display text from the narrative/impression partitions and
//!   derive the canonical section structure.
//!
//! # Invariants
//! - Records are never mutated by the core.
//! - Section derivation is deterministic for a given body text.

use crate::model::assignment::RecordId;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical section headers appearing in report bodies, in match priority.
pub const SECTION_HEADERS: &[&str] = &[
    "CLINICAL INDICATION",
    "TECHNIQUE",
    "HISTORY",
    "FINDINGS",
    "COMPARISON",
    "IMPRESSION",
];

static SECTION_RE: Lazy<Regex> = Lazy::new(|| {
    // SECTION_HEADERS are fixed identifiers; the pattern is infallible.
    Regex::new(r"\b(CLINICAL INDICATION|TECHNIQUE|HISTORY|FINDINGS|COMPARISON|IMPRESSION)\b")
        .expect("section header pattern is valid")
});

/// Procedure-order metadata attached to assignments at allocation time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordMeta {
    pub record_id: RecordId,
    pub pat_id: String,
    pub age_in_days: Option<i64>,
    pub proc_ord_year: Option<i32>,
    pub proc_name: String,
}

impl RecordMeta {
    /// Age at scan in years, rounded to two decimals.
    pub fn age_years(&self) -> Option<f64> {
        self.age_in_days
            .map(|days| (days as f64 / 365.25 * 100.0).round() / 100.0)
    }
}

/// One derived section of a report body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSection {
    /// `None` for leading text before the first recognized header.
    pub header: Option<String>,
    pub text: String,
}

/// Immutable annotatable unit: one report's text as served to a grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub record_id: RecordId,
    pub narrative: String,
    pub impression: Option<String>,
}

impl ReportRecord {
    pub fn new(
        record_id: impl Into<RecordId>,
        narrative: impl Into<String>,
        impression: Option<String>,
    ) -> Self {
        Self {
            record_id: record_id.into(),
            narrative: narrative.into(),
            impression,
        }
    }

    /// Full body text: whitespace-normalized narrative with the impression
    /// appended under its own header when present.
    pub fn body(&self) -> String {
        let mut body = normalize_whitespace(&self.narrative);
        if let Some(impression) = &self.impression {
            let impression = normalize_whitespace(impression);
            if !impression.is_empty() {
                body.push_str("\n\nIMPRESSION: ");
                body.push_str(&impression);
            }
        }
        body
    }

    /// Splits the body at each canonical header.
    pub fn sections(&self) -> Vec<ReportSection> {
        split_sections(&self.body())
    }
}

/// Collapses runs of whitespace into single spaces.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a body at every canonical section header occurrence.
pub fn split_sections(body: &str) -> Vec<ReportSection> {
    let mut sections = Vec::new();
    let mut cursor = 0usize;
    let mut open_header: Option<String> = None;

    for found in SECTION_RE.find_iter(body) {
        let preceding = body[cursor..found.start()].trim();
        if !preceding.is_empty() || open_header.is_some() {
            sections.push(ReportSection {
                header: open_header.take(),
                text: trim_section_text(preceding),
            });
        }
        open_header = Some(found.as_str().to_string());
        cursor = found.end();
    }

    let tail = body[cursor..].trim();
    if !tail.is_empty() || open_header.is_some() {
        sections.push(ReportSection {
            header: open_header,
            text: trim_section_text(tail),
        });
    }

    sections
}

fn trim_section_text(text: &str) -> String {
    text.trim_start_matches([':', '-', ' ']).trim().to_string()
}
