//! Page-level content editing on top of lopdf.
//!
//! A `PageCanvas` decodes one page, lets the reconstructor strip text
//! operators and queue cover rectangles and new text, then writes a single
//! replacement content stream: the original operators wrapped in `q`/`Q`,
//! then every cover, then every inserted line. Covers therefore never hide
//! text inserted for a neighbouring field.

use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::extraction::interpreter::{inherited_attribute, interpret_page, PageGeometry, ShownText};
use crate::extraction::{BBox, Color};
use crate::layout::{metrics_for_font, FontFamily};

/// Prefix for font resources added by the reconstructor.
const FONT_PREFIX: &str = "Rf";

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

/// Standard 14 font closest to a template font and its style flags.
pub fn base14_font(font_name: &str, bold: bool, italic: bool) -> &'static str {
    match (FontFamily::from_font_name(font_name), bold, italic) {
        (FontFamily::Helvetica, false, false) => "Helvetica",
        (FontFamily::Helvetica, true, false) => "Helvetica-Bold",
        (FontFamily::Helvetica, false, true) => "Helvetica-Oblique",
        (FontFamily::Helvetica, true, true) => "Helvetica-BoldOblique",
        (FontFamily::Times, false, false) => "Times-Roman",
        (FontFamily::Times, true, false) => "Times-Bold",
        (FontFamily::Times, false, true) => "Times-Italic",
        (FontFamily::Times, true, true) => "Times-BoldItalic",
        (FontFamily::Courier, false, false) => "Courier",
        (FontFamily::Courier, true, false) => "Courier-Bold",
        (FontFamily::Courier, false, true) => "Courier-Oblique",
        (FontFamily::Courier, true, true) => "Courier-BoldOblique",
    }
}

/// WinAnsi bytes for a string; characters outside Latin-1 become `?`.
fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            c if (c as u32) < 0x100 => c as u8,
            _ => b'?',
        })
        .collect()
}

pub struct PageCanvas {
    pub page_id: ObjectId,
    pub geometry: PageGeometry,
    operations: Vec<Operation>,
    shown: Vec<ShownText>,
    removed: BTreeSet<usize>,
    covers: Vec<Operation>,
    inserted: Vec<Operation>,
    /// Base font name → resource name.
    fonts: BTreeMap<&'static str, String>,
}

impl PageCanvas {
    pub fn load(doc: &Document, page_id: ObjectId) -> Result<Self, lopdf::Error> {
        let page = interpret_page(doc, page_id)?;
        Ok(Self {
            page_id,
            geometry: page.geometry,
            operations: page.operations,
            shown: page.shown,
            removed: BTreeSet::new(),
            covers: Vec::new(),
            inserted: Vec::new(),
            fonts: BTreeMap::new(),
        })
    }

    /// Template text still present on the page.
    pub fn live_text(&self) -> impl Iterator<Item = &ShownText> {
        self.shown
            .iter()
            .filter(|s| !self.removed.contains(&s.op_index))
    }

    /// Strips every text operator that lies mostly inside `region`. Returns
    /// how many were stripped.
    pub fn strip_region(&mut self, region: &BBox, min_overlap: f32) -> usize {
        let hits: Vec<usize> = self
            .live_text()
            .filter(|s| {
                let area = s.bbox.area();
                area > 0.0 && s.bbox.intersection_area(region) >= min_overlap * area
            })
            .map(|s| s.op_index)
            .collect();
        let count = hits.len();
        self.removed.extend(hits);
        count
    }

    /// Queues an opaque white rectangle over `region`.
    pub fn cover(&mut self, region: &BBox) {
        let (x, y) = self.geometry.to_pdf(region.x0, region.y1);
        self.covers.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![real(1.0), real(1.0), real(1.0)]),
            Operation::new(
                "re",
                vec![real(x), real(y), real(region.width()), real(region.height())],
            ),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    fn font_resource(&mut self, base_font: &'static str) -> String {
        let next = self.fonts.len() + 1;
        self.fonts
            .entry(base_font)
            .or_insert_with(|| format!("{FONT_PREFIX}{next}"))
            .clone()
    }

    /// Queues one line of text with its baseline at `(x, baseline)` in
    /// top-left page coordinates.
    pub fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        baseline: f32,
        base_font: &'static str,
        size: f32,
        color: Color,
    ) {
        let resource = self.font_resource(base_font);
        let (px, py) = self.geometry.to_pdf(x, baseline);
        self.inserted.extend([
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![real(color.r), real(color.g), real(color.b)]),
            Operation::new("Tf", vec![Object::Name(resource.into_bytes()), real(size)]),
            Operation::new(
                "Tm",
                vec![real(1.0), real(0.0), real(0.0), real(1.0), real(px), real(py)],
            ),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Width of `text` in points when drawn with a standard 14 font.
    pub fn text_width(text: &str, base_font: &str, size: f32) -> f32 {
        metrics_for_font(base_font).measure_pt(text, size)
    }

    /// Operators that keep a stripped operator's effect on the text state
    /// without painting anything.
    fn blank_operator(op: &Operation, shown: Option<&ShownText>) -> Vec<Operation> {
        let advance = shown.map(|s| s.advance_adjust).unwrap_or(0.0);
        let placeholder = Operation::new("TJ", vec![Object::Array(vec![real(advance)])]);
        match op.operator.as_str() {
            "'" => vec![Operation::new("T*", vec![]), placeholder],
            "\"" => {
                let mut ops = Vec::with_capacity(4);
                if let [aw, ac, ..] = op.operands.as_slice() {
                    ops.push(Operation::new("Tw", vec![aw.clone()]));
                    ops.push(Operation::new("Tc", vec![ac.clone()]));
                }
                ops.push(Operation::new("T*", vec![]));
                ops.push(placeholder);
                ops
            }
            _ => vec![placeholder],
        }
    }

    /// Writes the edited page back into `doc`.
    pub fn finish(self, doc: &mut Document) -> Result<(), lopdf::Error> {
        let shown_by_op: BTreeMap<usize, &ShownText> =
            self.shown.iter().map(|s| (s.op_index, s)).collect();

        let mut operations = Vec::with_capacity(self.operations.len() + self.inserted.len() + 2);
        operations.push(Operation::new("q", vec![]));
        for (index, op) in self.operations.iter().enumerate() {
            if self.removed.contains(&index) {
                operations.extend(Self::blank_operator(op, shown_by_op.get(&index).copied()));
            } else {
                operations.push(op.clone());
            }
        }
        operations.push(Operation::new("Q", vec![]));
        operations.extend(self.covers);
        operations.extend(self.inserted);

        let encoded = Content { operations }.encode()?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let resources = merged_resources(doc, self.page_id, &self.fonts);

        let page = doc.get_object_mut(self.page_id)?.as_dict_mut()?;
        page.set("Contents", content_id);
        page.set("Resources", resources);
        Ok(())
    }
}

fn resolve_dict(doc: &Document, object: &Object) -> Option<Dictionary> {
    match object {
        Object::Dictionary(dict) => Some(dict.clone()),
        Object::Reference(id) => doc.get_dictionary(*id).ok().cloned(),
        _ => None,
    }
}

/// The page's effective resources with the reconstructor's fonts added.
fn merged_resources(
    doc: &Document,
    page_id: ObjectId,
    fonts: &BTreeMap<&'static str, String>,
) -> Dictionary {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|r| resolve_dict(doc, r))
        .unwrap_or_default();
    let mut font_dict = resources
        .get(b"Font")
        .ok()
        .and_then(|f| resolve_dict(doc, f))
        .unwrap_or_default();
    for (base_font, resource) in fonts {
        font_dict.set(
            resource.as_bytes().to_vec(),
            dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => *base_font,
                "Encoding" => "WinAnsiEncoding",
            },
        );
    }
    resources.set("Font", font_dict);
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::fixtures::{PdfFixture, TextLine};
    use crate::extraction::SpanExtractor;

    fn first_page(bytes: &[u8]) -> (Document, ObjectId) {
        let doc = Document::load_mem(bytes).unwrap();
        let page_id = *doc.get_pages().values().next().unwrap();
        (doc, page_id)
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    #[test]
    fn test_base14_mapping() {
        assert_eq!(base14_font("ABCDEF+Garamond", true, false), "Times-Bold");
        assert_eq!(base14_font("Arial", false, true), "Helvetica-Oblique");
        assert_eq!(base14_font("Consolas", false, false), "Courier");
    }

    #[test]
    fn test_strip_and_draw_round_trip() {
        let pdf = PdfFixture::new()
            .line(TextLine::new("Keep this line", 72.0, 700.0, 12.0))
            .line(TextLine::new("Remove this line", 72.0, 650.0, 12.0))
            .build();
        let (mut doc, page_id) = first_page(&pdf);
        let mut canvas = PageCanvas::load(&doc, page_id).unwrap();

        let target = canvas
            .live_text()
            .find(|s| s.text == "Remove this line")
            .map(|s| s.bbox)
            .unwrap();
        assert_eq!(canvas.strip_region(&target.padded(2.0), 0.5), 1);
        canvas.cover(&target.padded(2.0));
        canvas.draw_text("Inserted", target.x0, target.y1 - 2.4, "Helvetica-Bold", 12.0, Color::BLACK);
        canvas.finish(&mut doc).unwrap();

        let spans = SpanExtractor::new().extract(&save(doc)).unwrap();
        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Keep this line", "Inserted"]);
        assert_eq!(spans[1].font_name, "Helvetica-Bold");
        assert!(spans[1].flags.bold);
    }

    #[test]
    fn test_stripped_word_keeps_line_positions() {
        let pdf = PdfFixture::new()
            .words(&["Alpha", "Beta", "Gamma"], 72.0, 700.0, 10.0)
            .build();
        let (mut doc, page_id) = first_page(&pdf);
        let mut canvas = PageCanvas::load(&doc, page_id).unwrap();
        let gamma_before = canvas.live_text().find(|s| s.text == "Gamma").unwrap().bbox;
        let beta = canvas.live_text().find(|s| s.text == "Beta").unwrap().bbox;
        canvas.strip_region(&beta, 0.9);
        canvas.finish(&mut doc).unwrap();

        let spans = SpanExtractor::new().extract(&save(doc)).unwrap();
        let gamma = spans.iter().find(|s| s.text.contains("Gamma")).unwrap();
        assert!((gamma.bbox.x1 - gamma_before.x1).abs() < 0.5);
        assert!(spans.iter().all(|s| !s.text.contains("Beta")));
    }

    #[test]
    fn test_encode_win_ansi() {
        assert_eq!(encode_win_ansi("Café • ok"), b"Caf\xe9 \x95 ok".to_vec());
        assert_eq!(encode_win_ansi("日本"), b"??".to_vec());
    }
}
