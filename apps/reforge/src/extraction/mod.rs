//! Span extraction: turns a template PDF into ordered, positioned text spans.
//!
//! Extraction is a single deterministic pass per page. A document lopdf cannot
//! open (corrupt, truncated, encrypted) is an `ExtractionError`; the ingest
//! step answers it with a degraded fallback schema rather than aborting.

pub mod fonts;
pub mod interpreter;

#[cfg(test)]
pub mod fixtures;

use lopdf::Document;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::extraction::interpreter::{interpret_page, ShownText};

/// Fragments shorter than this (after trimming) are layout noise: bullets,
/// separators, stray punctuation.
pub const MIN_SPAN_CHARS: usize = 3;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("document could not be parsed: {0}")]
    Unreadable(String),

    #[error("document is encrypted")]
    Encrypted,

    #[error("document has no pages")]
    NoPages,
}

// ────────────────────────────────────────────────────────────────────────────
// Geometry and style primitives
// ────────────────────────────────────────────────────────────────────────────

/// Axis-aligned box in page points, top-left origin (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        (self.x1 - self.x0).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y1 - self.y0).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn padded(&self, margin: f32) -> BBox {
        BBox::new(
            self.x0 - margin,
            self.y0 - margin,
            self.x1 + margin,
            self.y1 + margin,
        )
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.x0.min(other.x0),
            self.y0.min(other.y0),
            self.x1.max(other.x1),
            self.y1.max(other.y1),
        )
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let w = self.x1.min(other.x1) - self.x0.max(other.x0);
        let h = self.y1.min(other.y1) - self.y0.max(other.y0);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.intersection_area(other) > 0.0
    }

    /// True when the vertical extents overlap (ignores x).
    pub fn overlaps_vertically(&self, other: &BBox) -> bool {
        self.y0 < other.y1 && other.y0 < self.y1
    }
}

/// Fill colour, RGB components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn from_cmyk(c: f32, m: f32, y: f32, k: f32) -> Self {
        Self::new((1.0 - c) * (1.0 - k), (1.0 - m) * (1.0 - k), (1.0 - y) * (1.0 - k))
    }

    /// `0xRRGGBB`.
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanFlags {
    pub bold: bool,
    pub italic: bool,
}

impl SpanFlags {
    pub fn from_font_name(font_name: &str) -> Self {
        let lower = font_name.to_lowercase();
        Self {
            bold: lower.contains("bold") || lower.contains("black") || lower.contains("heavy"),
            italic: lower.contains("italic") || lower.contains("oblique"),
        }
    }
}

/// A contiguous run of text with uniform font, size and colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub bbox: BBox,
    pub font_name: String,
    pub font_size: f32,
    pub color: Color,
    /// Zero-based page index.
    pub page: usize,
    pub flags: SpanFlags,
}

// ────────────────────────────────────────────────────────────────────────────
// Extractor
// ────────────────────────────────────────────────────────────────────────────

/// Extracts spans from template PDFs. Constructed once and shared by reference.
#[derive(Debug, Clone)]
pub struct SpanExtractor {
    /// Maximum horizontal gap, as a fraction of font size, across which two
    /// fragments on the same baseline are joined into one span.
    pub merge_gap_factor: f32,
    /// Gaps wider than this fraction of font size get a space when joined.
    pub space_gap_factor: f32,
}

impl Default for SpanExtractor {
    fn default() -> Self {
        Self {
            merge_gap_factor: 0.6,
            space_gap_factor: 0.1,
        }
    }
}

impl SpanExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `bytes` and returns spans in page order, then reading order.
    pub fn extract(&self, bytes: &[u8]) -> Result<Vec<TextSpan>, ExtractionError> {
        let doc =
            Document::load_mem(bytes).map_err(|e| ExtractionError::Unreadable(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(ExtractionError::Encrypted);
        }
        if doc.get_pages().is_empty() {
            return Err(ExtractionError::NoPages);
        }
        Ok(self.extract_document(&doc))
    }

    /// Same as `extract`, but an unreadable document yields no spans.
    pub fn extract_or_empty(&self, bytes: &[u8]) -> Vec<TextSpan> {
        match self.extract(bytes) {
            Ok(spans) => spans,
            Err(e) => {
                warn!("Span extraction failed, returning no spans: {e}");
                Vec::new()
            }
        }
    }

    /// Extracts from an already-loaded document. Pages whose content stream
    /// cannot be decoded contribute no spans.
    pub fn extract_document(&self, doc: &Document) -> Vec<TextSpan> {
        let mut spans = Vec::new();
        for (page_index, (page_number, page_id)) in doc.get_pages().into_iter().enumerate() {
            match interpret_page(doc, page_id) {
                Ok(page) => {
                    let before = spans.len();
                    spans.extend(self.spans_from_shown(page.shown, page_index));
                    debug!(
                        "Page {page_number}: {} spans extracted",
                        spans.len() - before
                    );
                }
                Err(e) => warn!("Skipping page {page_number}: content stream unreadable: {e}"),
            }
        }
        spans
    }

    /// Merges same-line fragments, drops noise and sorts into reading order.
    pub fn spans_from_shown(&self, shown: Vec<ShownText>, page: usize) -> Vec<TextSpan> {
        let mut merged: Vec<ShownText> = Vec::with_capacity(shown.len());
        for fragment in shown {
            match merged.last_mut() {
                Some(prev) if self.continues(prev, &fragment) => {
                    let gap = fragment.bbox.x0 - prev.bbox.x1;
                    if gap > self.space_gap_factor * prev.font_size
                        && !prev.text.ends_with(' ')
                        && !fragment.text.starts_with(' ')
                    {
                        prev.text.push(' ');
                    }
                    prev.text.push_str(&fragment.text);
                    prev.bbox = prev.bbox.union(&fragment.bbox);
                }
                _ => merged.push(fragment),
            }
        }

        let mut lines: Vec<(i64, TextSpan)> = merged
            .into_iter()
            .filter_map(|s| {
                let text = s.text.trim();
                if text.chars().count() < MIN_SPAN_CHARS {
                    return None;
                }
                let line_key = s.baseline.round() as i64;
                Some((
                    line_key,
                    TextSpan {
                        text: text.to_string(),
                        bbox: s.bbox,
                        flags: SpanFlags::from_font_name(&s.font_name),
                        font_name: s.font_name,
                        font_size: s.font_size,
                        color: s.color,
                        page,
                    },
                ))
            })
            .collect();

        lines.sort_by(|(ka, a), (kb, b)| {
            ka.cmp(kb)
                .then(a.bbox.x0.partial_cmp(&b.bbox.x0).unwrap_or(std::cmp::Ordering::Equal))
        });
        lines.into_iter().map(|(_, span)| span).collect()
    }

    fn continues(&self, prev: &ShownText, next: &ShownText) -> bool {
        let gap = next.bbox.x0 - prev.bbox.x1;
        prev.font_name == next.font_name
            && (prev.font_size - next.font_size).abs() < 0.1
            && (prev.baseline - next.baseline).abs() < 0.5
            && gap > -0.5 * prev.font_size
            && gap < self.merge_gap_factor * prev.font_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::fixtures::{FixtureFont, PdfFixture, TextLine};
    use lopdf::{Object, StringFormat};

    #[test]
    fn test_extracts_spans_in_reading_order() {
        let pdf = PdfFixture::new()
            .line(TextLine::new("Work history follows", 72.0, 600.0, 10.0))
            .line(TextLine::bold("JOHN SMITH", 72.0, 760.0, 18.0))
            .line(TextLine::new("john@example.com", 72.0, 735.0, 10.0))
            .build();

        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["JOHN SMITH", "john@example.com", "Work history follows"]
        );
        assert!(spans[0].flags.bold);
        assert_eq!(spans[0].font_name, "Helvetica-Bold");
        assert!((spans[0].font_size - 18.0).abs() < 1e-3);
        assert_eq!(spans[0].page, 0);
    }

    #[test]
    fn test_short_and_blank_fragments_are_dropped() {
        let pdf = PdfFixture::new()
            .line(TextLine::new("|", 60.0, 700.0, 10.0))
            .line(TextLine::new("   ", 60.0, 680.0, 10.0))
            .line(TextLine::new("ab", 60.0, 660.0, 10.0))
            .line(TextLine::new("abc", 60.0, 640.0, 10.0))
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "abc");
    }

    #[test]
    fn test_word_per_tj_fragments_are_merged() {
        let pdf = PdfFixture::new()
            .words(&["University", "of", "Nairobi"], 72.0, 500.0, 11.0)
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "University of Nairobi");
    }

    #[test]
    fn test_pages_are_ordered() {
        let pdf = PdfFixture::new()
            .line(TextLine::new("first page text", 72.0, 700.0, 10.0))
            .page_break()
            .line(TextLine::new("second page text", 72.0, 760.0, 10.0))
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].page, 0);
        assert_eq!(spans[1].page, 1);
    }

    #[test]
    fn test_fill_colour_is_carried_to_span() {
        let pdf = PdfFixture::new()
            .line(TextLine::new("Accent heading", 72.0, 700.0, 12.0).colored([1.0, 0.0, 0.0]))
            .line(TextLine::new("Plain body text", 72.0, 680.0, 10.0))
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 2);
        assert!((spans[0].color.r - 1.0).abs() < 1e-3);
        assert!(spans[0].color.g.abs() < 1e-3);
        assert!(spans[0].color.b.abs() < 1e-3);
    }

    #[test]
    fn test_win_ansi_font_decodes_smart_punctuation() {
        let pdf = PdfFixture::new()
            .font(
                "F3",
                FixtureFont::WinAnsi {
                    base: "ABCDEF+Calibri",
                    width: 500,
                },
            )
            .show(
                "F3",
                72.0,
                700.0,
                10.0,
                Object::string_literal(&b"Seamus O\x92Brien \x96 CV"[..]),
            )
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Seamus O\u{2019}Brien \u{2013} CV");
        assert_eq!(spans[0].font_name, "Calibri");
        // 19 codes at 500/1000 em, 10pt.
        assert!((spans[0].bbox.width() - 95.0).abs() < 1e-3);
    }

    #[test]
    fn test_identity_font_decodes_through_to_unicode() {
        let pdf = PdfFixture::new()
            .font(
                "F3",
                FixtureFont::Identity {
                    base: "Inter-Regular",
                    cids: vec![(1, 'A'), (2, 'd'), (3, 'a')],
                    width: 600,
                },
            )
            .show(
                "F3",
                72.0,
                700.0,
                12.0,
                Object::String(vec![0, 1, 0, 2, 0, 3], StringFormat::Hexadecimal),
            )
            .build();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Ada");
        assert_eq!(spans[0].font_name, "Inter-Regular");
        assert!((spans[0].bbox.width() - 3.0 * 0.6 * 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_corrupt_input_is_an_error_and_empty_on_lenient_path() {
        let garbage = b"%PDF-1.4 this is not really a pdf";
        let extractor = SpanExtractor::new();
        assert!(extractor.extract(garbage).is_err());
        assert!(extractor.extract_or_empty(garbage).is_empty());
        assert!(extractor.extract_or_empty(&[]).is_empty());
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let pdf = PdfFixture::resume_template();
        let extractor = SpanExtractor::new();
        assert_eq!(
            extractor.extract(&pdf).unwrap(),
            extractor.extract(&pdf).unwrap()
        );
    }

    #[test]
    fn test_bbox_helpers() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 5.0, 15.0, 15.0);
        assert!((a.intersection_area(&b) - 25.0).abs() < 1e-6);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&BBox::new(20.0, 0.0, 30.0, 10.0)));
        assert!(a.overlaps_vertically(&BBox::new(100.0, 2.0, 120.0, 4.0)));
        assert_eq!(a.padded(2.0), BBox::new(-2.0, -2.0, 12.0, 12.0));
    }

    #[test]
    fn test_color_from_hex() {
        let c = Color::from_hex(0xFF8000);
        assert!((c.r - 1.0).abs() < 1e-6);
        assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(c.b, 0.0);
    }
}
