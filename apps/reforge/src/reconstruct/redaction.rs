//! Dual-pass redaction of one content area.
//!
//! 1. Literal pass: a span whose text equals the area's source text is
//!    covered whole. A span level with the stored bbox that holds the source
//!    text between word boundaries is covered over the matched columns only.
//!    Regions are padded by `redact_margin`.
//! 2. Broad pass: the stored bbox, padded by `bbox_margin`.
//! 3. Word pass, only when the literal pass found nothing: each remaining
//!    fragment level with the stored bbox that shares a word with the source
//!    text. Source text split across several operators lands here.
//!
//! Each region has its text operators stripped and an opaque cover painted.

use tracing::debug;

use super::writer::PageCanvas;
use super::LayoutConfig;
use crate::classification::ContentArea;
use crate::extraction::{BBox, SpanExtractor, TextSpan};
use crate::layout::metrics_for_font;

/// What one redaction touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RedactionReport {
    pub literal_matches: usize,
    pub word_matches: usize,
    pub stripped: usize,
    pub regions: Vec<BBox>,
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_boundary(c: Option<char>) -> bool {
    c.map_or(true, |c| !c.is_alphanumeric())
}

/// Region of `span` that shows `needle`, if any.
fn literal_region(span: &TextSpan, needle: &str, area_bbox: &BBox) -> Option<BBox> {
    let text = collapse_whitespace(&span.text);
    if text == needle {
        return Some(span.bbox);
    }
    if needle.is_empty() || !span.bbox.overlaps_vertically(area_bbox) {
        return None;
    }
    let (start, _) = text.match_indices(needle).find(|(start, matched)| {
        is_word_boundary(text[..*start].chars().next_back())
            && is_word_boundary(text[start + matched.len()..].chars().next())
    })?;

    let metrics = metrics_for_font(&span.font_name);
    let total = metrics.measure_str(&text);
    if total <= 0.0 {
        return Some(span.bbox);
    }
    let scale = span.bbox.width() / total;
    let x0 = span.bbox.x0 + metrics.measure_str(&text[..start]) * scale;
    let x1 = x0 + metrics.measure_str(needle) * scale;
    Some(BBox::new(x0, span.bbox.y0, x1.min(span.bbox.x1), span.bbox.y1))
}

/// Words worth searching for on their own.
fn search_words(source: &str) -> Vec<String> {
    source
        .split(|c: char| !c.is_alphanumeric() && c != '@' && c != '.' && c != '+')
        .map(|w| w.trim_matches('.').to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .collect()
}

pub fn redact_area(
    canvas: &mut PageCanvas,
    area: &ContentArea,
    config: &LayoutConfig,
    extractor: &SpanExtractor,
) -> RedactionReport {
    let mut report = RedactionReport::default();
    let needle = collapse_whitespace(&area.source_text);

    let live: Vec<_> = canvas.live_text().cloned().collect();
    for span in extractor.spans_from_shown(live, area.page) {
        if let Some(region) = literal_region(&span, &needle, &area.bbox) {
            report.literal_matches += 1;
            report.regions.push(region.padded(config.redact_margin));
        }
    }

    report.regions.push(area.bbox.padded(config.bbox_margin));

    if report.literal_matches == 0 {
        let words = search_words(&area.source_text);
        let fragments: Vec<BBox> = canvas
            .live_text()
            .filter(|s| s.bbox.overlaps_vertically(&area.bbox))
            .filter(|s| {
                let text = s.text.to_lowercase();
                words.iter().any(|w| text.contains(w.as_str()))
            })
            .map(|s| s.bbox.padded(config.redact_margin))
            .collect();
        report.word_matches = fragments.len();
        report.regions.extend(fragments);
    }

    for region in &report.regions {
        report.stripped += canvas.strip_region(region, config.strip_overlap_ratio);
        canvas.cover(region);
    }
    debug!(
        "Redacted '{}': {} literal, {} word matches, {} operators stripped",
        area.source_text, report.literal_matches, report.word_matches, report.stripped
    );
    report
}
