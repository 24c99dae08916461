//! StyleResolver: maps a field name to a fixed visual preset.
//!
//! Total by construction: the needles are checked in order against the
//! lowercased name and anything unmatched gets the `description` preset.

use serde::Serialize;

use crate::extraction::Color;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StylePreset {
    /// Category the preset was registered under.
    pub category: &'static str,
    /// Standard 14 font name.
    pub font: &'static str,
    pub size: f32,
    pub color: Color,
    pub alignment: Alignment,
}

const fn preset(
    category: &'static str,
    font: &'static str,
    size: f32,
    color: u32,
    alignment: Alignment,
) -> StylePreset {
    StylePreset {
        category,
        font,
        size,
        color: Color::from_hex(color),
        alignment,
    }
}

/// Checked top to bottom; the first needle contained in the name wins.
static PRESETS: &[StylePreset] = &[
    preset("name", "Helvetica-Bold", 12.0, 0x000000, Alignment::Left),
    preset("email", "Helvetica", 10.0, 0x1f3a93, Alignment::Left),
    preset("phone", "Helvetica", 10.0, 0x333333, Alignment::Left),
    preset("location", "Helvetica-Oblique", 9.5, 0x555555, Alignment::Left),
    preset("company", "Helvetica-Bold", 11.0, 0x000000, Alignment::Left),
    preset("position", "Helvetica-Oblique", 10.5, 0x222222, Alignment::Left),
    preset("institution", "Helvetica-Bold", 11.0, 0x000000, Alignment::Left),
    preset("degree", "Helvetica-Oblique", 10.5, 0x222222, Alignment::Left),
    preset("date", "Helvetica", 9.0, 0x555555, Alignment::Right),
    preset("skills", "Helvetica", 10.0, 0x222222, Alignment::Left),
    preset("summary", "Times-Roman", 10.5, 0x222222, Alignment::Left),
];

static DESCRIPTION: StylePreset =
    preset("description", "Helvetica", 10.0, 0x222222, Alignment::Left);

/// Explicitly constructed and passed to whoever lays out entries.
#[derive(Debug, Clone, Copy)]
pub struct StyleResolver {
    presets: &'static [StylePreset],
    default: &'static StylePreset,
}

impl Default for StyleResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl StyleResolver {
    pub fn new() -> Self {
        Self {
            presets: PRESETS,
            default: &DESCRIPTION,
        }
    }

    pub fn resolve(&self, field_name: &str) -> &'static StylePreset {
        let name = field_name.to_lowercase();
        self.presets
            .iter()
            .find(|p| name.contains(p.category))
            .unwrap_or(self.default)
    }
}
