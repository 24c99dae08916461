//! Vertical layout of repeating-section entries.
//!
//! Entry `i` starts at `base_y + i * entry_height`. Inside an entry each
//! sub-field, in item-schema order, gets one or more lines stacked by a
//! cursor that advances `font_size + entry_leading` per line. The first
//! entry whose last line would cross `page_height - bottom_margin` is
//! flagged overflow, along with every entry after it.

use serde_json::Value;

use super::data_path::scalar_text;
use super::{LayoutConfig, OverflowReport};
use crate::extraction::BBox;
use crate::layout::{chars_per_line, wrap_text};
use crate::schema::ItemField;
use crate::style::{StylePreset, StyleResolver};

/// Baseline sits this far below the line top, as a fraction of font size.
const LINE_ASCENT: f32 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct EntryLine {
    pub field: String,
    pub text: String,
    /// Top of the line, top-left page coordinates.
    pub y: f32,
    pub baseline: f32,
    pub preset: &'static StylePreset,
}

/// One user-supplied record positioned on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEntry {
    pub index: usize,
    pub y_offset: f32,
    pub lines: Vec<EntryLine>,
    pub overflow: bool,
}

/// Horizontal band entries are drawn in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFrame {
    pub x: f32,
    pub width: f32,
    pub base_y: f32,
    pub page_height: f32,
}

impl EntryFrame {
    /// Entries start just below the anchor and span the page width with the
    /// anchor's left margin mirrored on the right.
    pub fn below_anchor(
        anchor: &BBox,
        page_width: f32,
        page_height: f32,
        config: &LayoutConfig,
    ) -> Self {
        Self {
            x: anchor.x0,
            width: (page_width - 2.0 * anchor.x0).max(anchor.width()),
            base_y: anchor.y1 + config.section_top_padding,
            page_height,
        }
    }
}

/// Text values of one entry, one `(field, text)` per line before wrapping.
fn entry_values(entry: &Value, item_schema: &[ItemField], bullet: &str) -> Vec<(String, String)> {
    let mut values = Vec::new();
    match entry {
        Value::Object(map) => {
            for item in item_schema {
                match map.get(&item.name) {
                    Some(Value::Array(list)) => values.extend(
                        list.iter()
                            .filter_map(scalar_text)
                            .map(|text| (item.name.clone(), format!("{bullet}{text}"))),
                    ),
                    Some(value) => {
                        if let Some(text) = scalar_text(value) {
                            values.push((item.name.clone(), text));
                        }
                    }
                    None => {}
                }
            }
        }
        // A bare string entry (a skills list of strings, say) fills the
        // `items` field, or the first field when there is none.
        other => {
            if let Some(text) = scalar_text(other) {
                let field = item_schema
                    .iter()
                    .find(|i| i.name == "items")
                    .or_else(|| item_schema.first())
                    .map(|i| i.name.clone())
                    .unwrap_or_else(|| "items".to_string());
                values.push((field, text));
            }
        }
    }
    values
}

/// Lays out every entry of one section.
pub fn layout_entries(
    section: &str,
    entries: &[Value],
    item_schema: &[ItemField],
    frame: &EntryFrame,
    config: &LayoutConfig,
    styles: &StyleResolver,
) -> (Vec<RenderEntry>, Option<OverflowReport>) {
    let limit = frame.page_height - config.bottom_margin;
    let mut rendered = Vec::with_capacity(entries.len());
    let mut overflowing = false;

    for (index, entry) in entries.iter().enumerate() {
        let y_offset = frame.base_y + index as f32 * config.entry_height;
        let mut cursor = y_offset;
        let mut lines = Vec::new();

        for (field, text) in entry_values(entry, item_schema, &config.list_bullet) {
            let preset = styles.resolve(&field);
            let pieces = if text.chars().count() > config.wrap_threshold {
                let capacity = chars_per_line(
                    frame.width,
                    preset.size,
                    config.avg_char_width,
                    config.min_chars_per_line,
                );
                wrap_text(&text, capacity)
            } else {
                vec![text]
            };
            for piece in pieces {
                lines.push(EntryLine {
                    field: field.clone(),
                    text: piece,
                    y: cursor,
                    baseline: cursor + preset.size * LINE_ASCENT,
                    preset,
                });
                cursor += preset.size + config.entry_leading;
            }
        }

        overflowing = overflowing || cursor > limit;
        rendered.push(RenderEntry {
            index,
            y_offset,
            lines,
            overflow: overflowing,
        });
    }

    let overflowed: Vec<usize> = rendered
        .iter()
        .filter(|e| e.overflow)
        .map(|e| e.index)
        .collect();
    let report = (!overflowed.is_empty()).then(|| OverflowReport {
        section: section.to_string(),
        total_entries: entries.len(),
        rendered_entries: entries.len() - overflowed.len(),
        overflowed,
    });
    (rendered, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::builder::item_schema;
    use crate::classification::SectionCategory;
    use serde_json::json;

    fn frame(base_y: f32) -> EntryFrame {
        EntryFrame {
            x: 72.0,
            width: 468.0,
            base_y,
            page_height: 792.0,
        }
    }

    fn experience(n: usize) -> Vec<Value> {
        (0..n)
            .map(|i| json!({"company": format!("Company {i}"), "position": "Engineer"}))
            .collect()
    }

    #[test]
    fn test_entries_spaced_by_entry_height() {
        let schema = item_schema(SectionCategory::Experience);
        let (entries, overflow) = layout_entries(
            "experience",
            &experience(3),
            &schema,
            &frame(200.0),
            &LayoutConfig::default(),
            &StyleResolver::new(),
        );
        assert!(overflow.is_none());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].y_offset, 200.0 + 160.0);
        assert_eq!(entries[2].lines[0].y, 360.0);
    }

    #[test]
    fn test_subfields_follow_item_schema_order_and_cursor() {
        let schema = item_schema(SectionCategory::Experience);
        let entry = json!({
            "position": "Engineer",
            "company": "Acme",
            "dates": "2020 - 2024",
            "responsibilities": ["Built things", "Fixed things"],
        });
        let config = LayoutConfig::default();
        let (entries, _) = layout_entries(
            "experience",
            &[entry],
            &schema,
            &frame(100.0),
            &config,
            &StyleResolver::new(),
        );
        let lines = &entries[0].lines;
        let fields: Vec<&str> = lines.iter().map(|l| l.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["company", "position", "dates", "responsibilities", "responsibilities"]
        );
        assert_eq!(lines[3].text, "- Built things");
        let company = StyleResolver::new().resolve("company");
        assert_eq!(lines[1].y, 100.0 + company.size + config.entry_leading);
    }

    #[test]
    fn test_long_value_wraps() {
        let schema = item_schema(SectionCategory::Leadership);
        let description = "word ".repeat(40);
        let entry = json!({"organization": "Club", "description": description});
        let narrow = EntryFrame {
            width: 200.0,
            ..frame(100.0)
        };
        let (entries, _) = layout_entries(
            "leadership",
            &[entry],
            &schema,
            &narrow,
            &LayoutConfig::default(),
            &StyleResolver::new(),
        );
        let description_lines = entries[0]
            .lines
            .iter()
            .filter(|l| l.field == "description")
            .count();
        // 199 chars at 40 per line.
        assert_eq!(description_lines, 5);
    }

    #[test]
    fn test_overflow_flags_remaining_entries() {
        let schema = item_schema(SectionCategory::Experience);
        let (entries, overflow) = layout_entries(
            "experience",
            &experience(6),
            &schema,
            &frame(500.0),
            &LayoutConfig::default(),
            &StyleResolver::new(),
        );
        // Entry 3 starts at 740 and its second line ends past 756.
        let flags: Vec<bool> = entries.iter().map(|e| e.overflow).collect();
        assert_eq!(flags, vec![false, false, false, true, true, true]);
        let report = overflow.unwrap();
        assert_eq!(report.rendered_entries, 3);
        assert_eq!(report.overflowed, vec![3, 4, 5]);
    }

    #[test]
    fn test_string_entries_fill_items() {
        let schema = item_schema(SectionCategory::Skills);
        let (entries, _) = layout_entries(
            "skills",
            &[json!("Rust"), json!(["Go", "Zig"])],
            &schema,
            &frame(100.0),
            &LayoutConfig::default(),
            &StyleResolver::new(),
        );
        assert_eq!(entries[0].lines[0].field, "items");
        assert_eq!(entries[1].lines[0].text, "Go, Zig");
    }
}
