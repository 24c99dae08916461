//! DocumentReconstructor: redacts a template's sample text and writes user
//! data in its place.
//!
//! One document at a time, strictly ordered: every scalar field is redacted
//! then filled, then every repeating section is redacted, laid out and drawn.
//! Failures local to one field or entry are recorded and skipped; only an
//! unreadable template aborts.

pub mod data_path;
pub mod entries;
pub mod pipeline;
pub mod redaction;
pub mod writer;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use pipeline::DocumentReconstructor;

// ────────────────────────────────────────────────────────────────────────────
// Layout configuration
// ────────────────────────────────────────────────────────────────────────────

/// Every positioning constant the reconstructor uses. Values are in PDF
/// points unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Padding around literal text matches.
    pub redact_margin: f32,
    /// Padding around the stored bbox in the broad pass.
    pub bbox_margin: f32,
    /// Fraction of an operator's box that must fall inside a redaction
    /// region for the operator to be stripped.
    pub strip_overlap_ratio: f32,
    /// Values longer than this many characters are word-wrapped.
    pub wrap_threshold: usize,
    /// Average glyph width in em, for the characters-per-line estimate.
    pub avg_char_width: f32,
    pub min_chars_per_line: usize,
    /// Line pitch as a multiple of font size.
    pub line_height_factor: f32,
    /// Name baseline below the box top, as a multiple of font size.
    pub name_baseline_ratio: f32,
    /// Contact baseline below the box top, as a multiple of font size.
    pub contact_baseline_ratio: f32,
    /// Generic baseline below the box top, as a fraction of box height.
    pub generic_baseline_ratio: f32,
    /// Vertical distance between consecutive repeating entries.
    pub entry_height: f32,
    /// Gap between a section's anchor and its first entry.
    pub section_top_padding: f32,
    /// Added to font size to advance the cursor between sub-field lines.
    pub entry_leading: f32,
    /// Entries may not extend below `page_height - bottom_margin`.
    pub bottom_margin: f32,
    /// Prefix for each item of a list value.
    pub list_bullet: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            redact_margin: 2.0,
            bbox_margin: 4.0,
            strip_overlap_ratio: 0.5,
            wrap_threshold: 50,
            avg_char_width: 0.5,
            min_chars_per_line: 10,
            line_height_factor: 1.2,
            name_baseline_ratio: 0.8,
            contact_baseline_ratio: 0.9,
            generic_baseline_ratio: 0.7,
            entry_height: 80.0,
            section_top_padding: 4.0,
            entry_leading: 2.0,
            bottom_margin: 36.0,
            list_bullet: "- ".to_string(),
        }
    }
}

impl LayoutConfig {
    /// Reads overrides from a JSON file; missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading layout config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing layout config {}", path.display()))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    RedactField,
    InsertField,
    RedactSection,
    LayoutEntries,
    InsertEntries,
    Finalize,
}

impl Stage {
    pub fn can_transition(self, to: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, to),
            (Idle, RedactField | RedactSection | Finalize)
                | (RedactField, InsertField)
                | (InsertField, RedactField | RedactSection | Finalize)
                | (RedactSection, LayoutEntries)
                | (LayoutEntries, InsertEntries)
                | (InsertEntries, RedactSection | Finalize)
        )
    }
}

/// Tracks the current stage and every stage visited.
#[derive(Debug, Clone)]
pub struct StageMachine {
    current: Stage,
    trace: Vec<Stage>,
}

impl Default for StageMachine {
    fn default() -> Self {
        Self {
            current: Stage::Idle,
            trace: vec![Stage::Idle],
        }
    }
}

impl StageMachine {
    pub fn current(&self) -> Stage {
        self.current
    }

    pub fn advance(&mut self, to: Stage) -> Result<(), ReconstructionError> {
        if !self.current.can_transition(to) {
            return Err(ReconstructionError::IllegalTransition {
                from: self.current,
                to,
            });
        }
        self.current = to;
        self.trace.push(to);
        Ok(())
    }

    pub fn into_trace(self) -> Vec<Stage> {
        self.trace
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors and results
// ────────────────────────────────────────────────────────────────────────────

/// Failures that abort the whole document.
#[derive(Debug, Error)]
pub enum ReconstructionError {
    #[error("template unreadable: {0}")]
    Unreadable(String),

    #[error("failed to write output document: {0}")]
    Write(String),

    #[error("illegal stage transition {from:?} -> {to:?}")]
    IllegalTransition { from: Stage, to: Stage },
}

/// A single field or section that could not be redacted or filled.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("field '{field}': {reason}")]
pub struct FieldError {
    pub field: String,
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Entries of one repeating section that did not fit on the page. They are
/// reported, not drawn; no page is added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverflowReport {
    pub section: String,
    pub total_entries: usize,
    pub rendered_entries: usize,
    /// Indices of the entries that were not drawn.
    pub overflowed: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionResult {
    #[serde(skip)]
    pub document: Vec<u8>,
    pub fields_written: usize,
    /// Fields with no value in the user data.
    pub fields_skipped: Vec<String>,
    pub field_errors: Vec<FieldError>,
    pub overflow: Vec<OverflowReport>,
    pub stages: Vec<Stage>,
}

impl ReconstructionResult {
    pub fn has_overflow(&self) -> bool {
        !self.overflow.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_machine_accepts_full_pipeline() {
        let mut machine = StageMachine::default();
        for stage in [
            Stage::RedactField,
            Stage::InsertField,
            Stage::RedactField,
            Stage::InsertField,
            Stage::RedactSection,
            Stage::LayoutEntries,
            Stage::InsertEntries,
            Stage::RedactSection,
            Stage::LayoutEntries,
            Stage::InsertEntries,
            Stage::Finalize,
        ] {
            machine.advance(stage).unwrap();
        }
        assert_eq!(machine.current(), Stage::Finalize);
        assert_eq!(machine.into_trace().len(), 12);
    }

    #[test]
    fn test_stage_machine_rejects_insert_before_redact() {
        let mut machine = StageMachine::default();
        let err = machine.advance(Stage::InsertField).unwrap_err();
        assert!(matches!(
            err,
            ReconstructionError::IllegalTransition {
                from: Stage::Idle,
                to: Stage::InsertField
            }
        ));
    }

    #[test]
    fn test_fields_cannot_follow_sections() {
        assert!(!Stage::InsertEntries.can_transition(Stage::RedactField));
        assert!(!Stage::Finalize.can_transition(Stage::Idle));
    }

    #[test]
    fn test_layout_config_partial_override() {
        let config: LayoutConfig =
            serde_json::from_str(r#"{"entry_height": 64.0, "bottom_margin": 50}"#).unwrap();
        assert_eq!(config.entry_height, 64.0);
        assert_eq!(config.bottom_margin, 50.0);
        assert_eq!(config.wrap_threshold, 50);
    }

    #[test]
    fn test_layout_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        std::fs::write(&path, r#"{"redact_margin": 3.5}"#).unwrap();
        let config = LayoutConfig::from_json_file(&path).unwrap();
        assert_eq!(config.redact_margin, 3.5);
        assert!(LayoutConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
