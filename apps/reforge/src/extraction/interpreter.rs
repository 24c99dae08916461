//! Content-stream interpreter: walks a page's operators and reports every
//! text-showing operation with its position, font and fill colour.
//!
//! Used twice: by the span extractor on the uploaded template, and by the
//! reconstructor on the working copy to locate operators it must strip.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId};

use crate::extraction::fonts::{Glyph, PageFont};
use crate::extraction::{BBox, Color};

/// Fraction of the font size above the baseline counted as glyph height.
const ASCENT: f32 = 0.8;
/// Fraction of the font size below the baseline.
const DESCENT: f32 = 0.2;
/// `TJ` adjustments beyond this (thousandths of an em) read as a word gap.
const TJ_SPACE_THRESHOLD: f32 = 200.0;
/// Guards against cyclic `Parent` chains in malformed page trees.
const MAX_TREE_DEPTH: usize = 32;

/// Page box in PDF user space. Converts between PDF coordinates (origin
/// bottom-left) and the top-left origin used everywhere else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub origin_x: f32,
    pub origin_y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for PageGeometry {
    /// US letter.
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            width: 612.0,
            height: 792.0,
        }
    }
}

impl PageGeometry {
    /// PDF user-space point → top-left page coordinates.
    pub fn to_top_left(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.origin_x, self.origin_y + self.height - y)
    }

    /// Top-left page coordinates → PDF user-space point.
    pub fn to_pdf(&self, x: f32, y: f32) -> (f32, f32) {
        (x + self.origin_x, self.origin_y + self.height - y)
    }
}

/// One text-showing operator as painted on the page.
#[derive(Debug, Clone)]
pub struct ShownText {
    /// Index into the page's decoded operation list.
    pub op_index: usize,
    pub text: String,
    /// Top-left origin.
    pub bbox: BBox,
    /// Baseline y, top-left origin.
    pub baseline: f32,
    pub font_name: String,
    pub font_size: f32,
    pub color: Color,
    /// Horizontal advance of the operator as a `TJ` adjustment. Showing
    /// `[advance_adjust]` instead of the text moves the pen identically.
    pub advance_adjust: f32,
}

/// Decoded page: operations plus everything they paint.
#[derive(Debug, Clone)]
pub struct PageText {
    pub geometry: PageGeometry,
    pub operations: Vec<Operation>,
    pub shown: Vec<ShownText>,
}

// ────────────────────────────────────────────────────────────────────────────
// Page-tree helpers
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

/// Looks up an inheritable page attribute (`Resources`, `MediaBox`) by
/// walking the `Parent` chain.
pub fn inherited_attribute<'a>(
    doc: &'a Document,
    page_id: ObjectId,
    key: &[u8],
) -> Option<&'a Object> {
    let mut current = doc.get_dictionary(page_id).ok()?;
    for _ in 0..MAX_TREE_DEPTH {
        if let Ok(value) = current.get(key) {
            return Some(resolve(doc, value));
        }
        let parent = current.get(b"Parent").ok()?.as_reference().ok()?;
        current = doc.get_dictionary(parent).ok()?;
    }
    None
}

pub fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let Some(Object::Array(values)) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return PageGeometry::default();
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| number(resolve(doc, v)))
        .collect();
    if numbers.len() < 4 {
        return PageGeometry::default();
    }
    let (llx, lly, urx, ury) = (numbers[0], numbers[1], numbers[2], numbers[3]);
    PageGeometry {
        origin_x: llx.min(urx),
        origin_y: lly.min(ury),
        width: (urx - llx).abs(),
        height: (ury - lly).abs(),
    }
}

/// Loads every font resource of a page, keyed by resource name (`F1`).
pub fn page_fonts(doc: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, PageFont> {
    let mut fonts = HashMap::new();
    let Some(Object::Dictionary(resources)) = inherited_attribute(doc, page_id, b"Resources")
    else {
        return fonts;
    };
    let Ok(font_dict) = resources.get(b"Font").map(|f| resolve(doc, f)) else {
        return fonts;
    };
    let Ok(font_dict) = font_dict.as_dict() else {
        return fonts;
    };
    for (resource_name, font_ref) in font_dict.iter() {
        let font = match resolve(doc, font_ref).as_dict() {
            Ok(font) => PageFont::from_dict(doc, font, resource_name),
            Err(_) => PageFont::named(&String::from_utf8_lossy(resource_name)),
        };
        fonts.insert(resource_name.clone(), font);
    }
    fonts
}

/// Decodes and interprets one page.
pub fn interpret_page(doc: &Document, page_id: ObjectId) -> Result<PageText, lopdf::Error> {
    let geometry = page_geometry(doc, page_id);
    let fonts = page_fonts(doc, page_id);
    let raw = doc.get_page_content(page_id)?;
    let content = Content::decode(&raw)?;
    let shown = interpret_operations(&content.operations, &fonts, &geometry);
    Ok(PageText {
        geometry,
        operations: content.operations,
        shown,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Interpreter
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    /// `self × other` in PDF's row-vector convention.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn x_scale(&self) -> f32 {
        (self.0[0] * self.0[0] + self.0[1] * self.0[1]).sqrt()
    }

    fn y_scale(&self) -> f32 {
        (self.0[2] * self.0[2] + self.0[3] * self.0[3]).sqrt()
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: Color,
}

#[derive(Debug, Clone)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    font_resource: Vec<u8>,
    font_size: f32,
    leading: f32,
    char_spacing: f32,
    word_spacing: f32,
    horizontal_scale: f32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            font_resource: Vec::new(),
            font_size: 12.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
        }
    }
}

impl TextState {
    fn move_line(&mut self, tx: f32, ty: f32) {
        self.tlm = Matrix::translate(tx, ty).then(&self.tlm);
        self.tm = self.tlm;
    }

    fn next_line(&mut self) {
        let leading = self.leading;
        self.move_line(0.0, -leading);
    }
}

pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

fn numbers<const N: usize>(operands: &[Object]) -> Option<[f32; N]> {
    if operands.len() < N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = number(operand)?;
    }
    Some(out)
}

/// `sc`/`scn` colour by component count: gray, RGB or CMYK. A trailing
/// pattern name is ignored.
fn fill_from_components(operands: &[Object]) -> Option<Color> {
    let components: Vec<f32> = operands.iter().map_while(number).collect();
    match components.as_slice() {
        [gray] => Some(Color::new(*gray, *gray, *gray)),
        [r, g, b] => Some(Color::new(*r, *g, *b)),
        [c, m, y, k] => Some(Color::from_cmyk(*c, *m, *y, *k)),
        _ => None,
    }
}

/// A decoded text run and the advance its glyph pieces produce.
struct Run {
    text: String,
    /// Advance in unscaled text space.
    advance: f32,
}

fn measure_glyphs(glyphs: &[Glyph], ts: &TextState) -> f32 {
    glyphs
        .iter()
        .map(|g| {
            let spacing = ts.char_spacing + if g.word_space { ts.word_spacing } else { 0.0 };
            (g.width * ts.font_size + spacing) * ts.horizontal_scale
        })
        .sum()
}

fn push_glyphs(run: &mut Run, bytes: &[u8], font: &PageFont, ts: &TextState) {
    let glyphs = font.glyphs(bytes);
    run.advance += measure_glyphs(&glyphs, ts);
    run.text.extend(glyphs.iter().map(|g| g.text.as_str()));
}

fn collect_run(operand: &Object, font: &PageFont, ts: &TextState) -> Run {
    let mut run = Run {
        text: String::new(),
        advance: 0.0,
    };
    match operand {
        Object::String(bytes, _) => push_glyphs(&mut run, bytes, font, ts),
        Object::Array(items) => {
            for item in items {
                match item {
                    Object::String(bytes, _) => push_glyphs(&mut run, bytes, font, ts),
                    other => {
                        if let Some(adjust) = number(other) {
                            run.advance -= adjust / 1000.0 * ts.font_size * ts.horizontal_scale;
                            if -adjust > TJ_SPACE_THRESHOLD
                                && !run.text.is_empty()
                                && !run.text.ends_with(' ')
                            {
                                run.text.push(' ');
                            }
                        }
                    }
                }
            }
        }
        _ => {}
    }
    run
}

/// Runs the text and graphics state machine over `operations`.
pub fn interpret_operations(
    operations: &[Operation],
    fonts: &HashMap<Vec<u8>, PageFont>,
    geometry: &PageGeometry,
) -> Vec<ShownText> {
    let mut shown = Vec::new();
    // Fonts selected by `Tf` but missing from the resources.
    let mut unlisted: HashMap<Vec<u8>, PageFont> = HashMap::new();
    let mut gs = GraphicsState {
        ctm: Matrix::IDENTITY,
        fill: Color::BLACK,
    };
    let mut stack: Vec<GraphicsState> = Vec::new();
    let mut ts = TextState::default();

    for (op_index, op) in operations.iter().enumerate() {
        let operands = op.operands.as_slice();
        match op.operator.as_str() {
            "q" => stack.push(gs.clone()),
            "Q" => {
                if let Some(saved) = stack.pop() {
                    gs = saved;
                }
            }
            "cm" => {
                if let Some(m) = numbers::<6>(operands) {
                    gs.ctm = Matrix(m).then(&gs.ctm);
                }
            }
            "rg" => {
                if let Some([r, g, b]) = numbers::<3>(operands) {
                    gs.fill = Color::new(r, g, b);
                }
            }
            "g" => {
                if let Some([gray]) = numbers::<1>(operands) {
                    gs.fill = Color::new(gray, gray, gray);
                }
            }
            "k" => {
                if let Some([c, m, y, k]) = numbers::<4>(operands) {
                    gs.fill = Color::from_cmyk(c, m, y, k);
                }
            }
            "sc" | "scn" => {
                if let Some(fill) = fill_from_components(operands) {
                    gs.fill = fill;
                }
            }
            "BT" => {
                ts.tm = Matrix::IDENTITY;
                ts.tlm = Matrix::IDENTITY;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = operands.first() {
                    ts.font_resource = name.clone();
                }
                if let Some(size) = operands.get(1).and_then(number) {
                    ts.font_size = size;
                }
            }
            "TL" => {
                if let Some([leading]) = numbers::<1>(operands) {
                    ts.leading = leading;
                }
            }
            "Tc" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    ts.char_spacing = spacing;
                }
            }
            "Tw" => {
                if let Some([spacing]) = numbers::<1>(operands) {
                    ts.word_spacing = spacing;
                }
            }
            "Tz" => {
                if let Some([scale]) = numbers::<1>(operands) {
                    ts.horizontal_scale = scale / 100.0;
                }
            }
            "Td" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    ts.move_line(tx, ty);
                }
            }
            "TD" => {
                if let Some([tx, ty]) = numbers::<2>(operands) {
                    ts.leading = -ty;
                    ts.move_line(tx, ty);
                }
            }
            "Tm" => {
                if let Some(m) = numbers::<6>(operands) {
                    ts.tm = Matrix(m);
                    ts.tlm = ts.tm;
                }
            }
            "T*" => ts.next_line(),
            "Tj" | "TJ" | "'" | "\"" => {
                let text_operand = match op.operator.as_str() {
                    "'" => {
                        ts.next_line();
                        operands.first()
                    }
                    "\"" => {
                        if let Some([aw, ac]) = numbers::<2>(operands) {
                            ts.word_spacing = aw;
                            ts.char_spacing = ac;
                        }
                        ts.next_line();
                        operands.get(2)
                    }
                    _ => operands.first(),
                };
                let Some(text_operand) = text_operand else {
                    continue;
                };
                let font = match fonts.get(&ts.font_resource) {
                    Some(font) => font,
                    None => &*unlisted
                        .entry(ts.font_resource.clone())
                        .or_insert_with(|| {
                            PageFont::named(&String::from_utf8_lossy(&ts.font_resource))
                        }),
                };
                let run = collect_run(text_operand, font, &ts);
                let font_name = font.base_name.clone();

                let trm = ts.tm.then(&gs.ctm);
                let size = ts.font_size * trm.y_scale();
                let width = run.advance * trm.x_scale();
                let (x, baseline) = geometry.to_top_left(trm.0[4], trm.0[5]);
                ts.tm = Matrix::translate(run.advance, 0.0).then(&ts.tm);
                let unit = ts.font_size * ts.horizontal_scale;
                let advance_adjust = if unit.abs() > f32::EPSILON {
                    -run.advance * 1000.0 / unit
                } else {
                    0.0
                };

                if run.text.trim().is_empty() {
                    continue;
                }
                shown.push(ShownText {
                    op_index,
                    text: run.text,
                    bbox: BBox::new(
                        x.min(x + width),
                        baseline - size * ASCENT,
                        x.max(x + width),
                        baseline + size * DESCENT,
                    ),
                    baseline,
                    font_name,
                    font_size: size,
                    color: gs.fill,
                    advance_adjust,
                });
            }
            _ => {}
        }
    }
    shown
}
