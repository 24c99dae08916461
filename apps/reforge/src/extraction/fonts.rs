//! Font resources: string bytes to text and to glyph advances.
//!
//! Simple fonts decode through their named base encoding (lopdf's tables)
//! patched by `/Differences`. Composite fonts split codes by the codespace of
//! their `/ToUnicode` map, two bytes when there is none. A `/ToUnicode` entry
//! wins over everything else. Advances come from `/Widths` or the descendant
//! font's `/W`; fonts that carry neither are measured with the base-14 tables.

use std::collections::HashMap;

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object};

use super::interpreter::{number, resolve};
use crate::layout::font_metrics::get_metrics;
use crate::layout::FontFamily;

/// Used when a simple font names no encoding, or one lopdf has no table for.
const DEFAULT_ENCODING: &str = "WinAnsiEncoding";
const SIMPLE_ENCODINGS: &[&str] = &[
    "WinAnsiEncoding",
    "StandardEncoding",
    "MacRomanEncoding",
    "MacExpertEncoding",
];
/// Default CID width, thousandths of an em.
const DEFAULT_CID_WIDTH: f32 = 1000.0;
/// Upper bound on codes expanded from one range entry.
const MAX_RANGE_SPAN: u32 = 0xFFFF;

/// One shown glyph.
#[derive(Debug, Clone, PartialEq)]
pub struct Glyph {
    pub text: String,
    /// Advance in em units.
    pub width: f32,
    /// Single-byte code 32, the only code word spacing applies to.
    pub word_space: bool,
}

#[derive(Debug, Clone)]
enum Kind {
    /// Text for each of the 256 byte codes.
    Simple(Vec<String>),
    Composite,
}

/// Parsed `/ToUnicode` CMap.
#[derive(Debug, Clone, Default, PartialEq)]
struct ToUnicode {
    codespace: Vec<(Vec<u8>, Vec<u8>)>,
    map: HashMap<u32, String>,
}

/// A font as the interpreter needs it.
#[derive(Debug, Clone)]
pub struct PageFont {
    /// `BaseFont` without a subset prefix.
    pub base_name: String,
    family: FontFamily,
    kind: Kind,
    to_unicode: Option<ToUnicode>,
    /// Code → width in thousandths of an em.
    widths: HashMap<u32, f32>,
    /// `MissingWidth` for simple fonts, `DW` for composite ones.
    missing_width: Option<f32>,
}

impl PageFont {
    /// A font known only by name: WinAnsi text, base-14 widths.
    pub fn named(base_name: &str) -> Self {
        Self {
            base_name: base_name.to_string(),
            family: FontFamily::from_font_name(base_name),
            kind: Kind::Simple(encoding_table(DEFAULT_ENCODING)),
            to_unicode: None,
            widths: HashMap::new(),
            missing_width: None,
        }
    }

    pub fn from_dict(doc: &Document, font: &Dictionary, resource_name: &[u8]) -> Self {
        let base_name = font
            .get(b"BaseFont")
            .ok()
            .and_then(|base| match resolve(doc, base) {
                Object::Name(name) => Some(String::from_utf8_lossy(name).to_string()),
                _ => None,
            })
            .map(|base| strip_subset_prefix(&base))
            .unwrap_or_else(|| String::from_utf8_lossy(resource_name).to_string());
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .and_then(|stream| resolve(doc, stream).as_stream().ok())
            .and_then(|stream| {
                let data = stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone());
                parse_to_unicode(&data)
            });

        let is_composite = font.get(b"Subtype").and_then(Object::as_name_str).ok() == Some("Type0");
        let (kind, widths, missing_width) = if is_composite {
            let descendant = font
                .get(b"DescendantFonts")
                .ok()
                .and_then(|d| resolve(doc, d).as_array().ok())
                .and_then(|d| d.first())
                .and_then(|d| resolve(doc, d).as_dict().ok());
            let widths = descendant
                .and_then(|d| d.get(b"W").ok())
                .and_then(|w| resolve(doc, w).as_array().ok())
                .map(|w| cid_widths(doc, w))
                .unwrap_or_default();
            let default_width = descendant
                .and_then(|d| d.get(b"DW").ok())
                .and_then(|dw| number(resolve(doc, dw)))
                .unwrap_or(DEFAULT_CID_WIDTH);
            (Kind::Composite, widths, Some(default_width))
        } else {
            let missing_width = font
                .get(b"FontDescriptor")
                .ok()
                .and_then(|d| resolve(doc, d).as_dict().ok())
                .and_then(|d| d.get(b"MissingWidth").ok())
                .and_then(|w| number(resolve(doc, w)));
            (
                Kind::Simple(simple_table(doc, font)),
                simple_widths(doc, font),
                missing_width,
            )
        };

        Self {
            family: FontFamily::from_font_name(&base_name),
            base_name,
            kind,
            to_unicode,
            widths,
            missing_width,
        }
    }

    /// Splits string bytes into glyphs.
    pub fn glyphs(&self, bytes: &[u8]) -> Vec<Glyph> {
        let mut glyphs = Vec::new();
        let mut rest = bytes;
        while !rest.is_empty() {
            let len = self.code_length(rest);
            let (code_bytes, tail) = rest.split_at(len);
            rest = tail;
            let code = code_value(code_bytes);
            let text = self.text_for(code);
            glyphs.push(Glyph {
                width: self.width_for(code, &text),
                word_space: len == 1 && code == 32,
                text,
            });
        }
        glyphs
    }

    /// Text of `bytes` without measuring.
    pub fn decode(&self, bytes: &[u8]) -> String {
        self.glyphs(bytes).into_iter().map(|g| g.text).collect()
    }

    fn code_length(&self, bytes: &[u8]) -> usize {
        if matches!(self.kind, Kind::Simple(_)) {
            return 1;
        }
        let codespace = self
            .to_unicode
            .as_ref()
            .map(|cmap| cmap.codespace.as_slice())
            .unwrap_or_default();
        codespace
            .iter()
            .filter(|(lo, _)| !lo.is_empty() && lo.len() <= bytes.len())
            .find(|(lo, hi)| {
                lo.len() == hi.len()
                    && bytes[..lo.len()]
                        .iter()
                        .zip(lo.iter().zip(hi))
                        .all(|(b, (l, h))| l <= b && b <= h)
            })
            .map(|(lo, _)| lo.len())
            .unwrap_or(2)
            .min(bytes.len())
    }

    fn text_for(&self, code: u32) -> String {
        if let Some(text) = self.to_unicode.as_ref().and_then(|cmap| cmap.map.get(&code)) {
            return text.clone();
        }
        match &self.kind {
            Kind::Simple(table) => table.get(code as usize).cloned().unwrap_or_default(),
            // Without a ToUnicode entry a CID says nothing about its text.
            Kind::Composite => String::new(),
        }
    }

    fn width_for(&self, code: u32, text: &str) -> f32 {
        if let Some(width) = self.widths.get(&code) {
            return width / 1000.0;
        }
        match (&self.kind, self.missing_width) {
            (Kind::Composite, width) => width.unwrap_or(DEFAULT_CID_WIDTH) / 1000.0,
            (Kind::Simple(_), Some(width)) if !self.widths.is_empty() => width / 1000.0,
            (Kind::Simple(_), _) => {
                let metrics = get_metrics(&self.family);
                if text.is_empty() {
                    metrics.average_char_width
                } else {
                    metrics.measure_str(text)
                }
            }
        }
    }
}

fn strip_subset_prefix(base: &str) -> String {
    match base.split_once('+') {
        Some((prefix, rest)) if prefix.len() == 6 => rest.to_string(),
        _ => base.to_string(),
    }
}

fn code_value(bytes: &[u8]) -> u32 {
    bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

fn encoding_table(encoding: &str) -> Vec<String> {
    let encoding = if SIMPLE_ENCODINGS.contains(&encoding) {
        encoding
    } else {
        DEFAULT_ENCODING
    };
    (0..=255u8)
        .map(|byte| Document::decode_text(Some(encoding), &[byte]))
        .collect()
}

/// Base encoding plus `/Differences`.
fn simple_table(doc: &Document, font: &Dictionary) -> Vec<String> {
    let (base, differences) = match font.get(b"Encoding").map(|e| resolve(doc, e)) {
        Ok(Object::Name(_)) => (font.get_font_encoding(), None),
        Ok(Object::Dictionary(encoding)) => (
            encoding
                .get(b"BaseEncoding")
                .and_then(Object::as_name_str)
                .unwrap_or(DEFAULT_ENCODING),
            encoding
                .get(b"Differences")
                .ok()
                .and_then(|d| resolve(doc, d).as_array().ok()),
        ),
        _ => (DEFAULT_ENCODING, None),
    };

    let mut table = encoding_table(base);
    let mut code = 0usize;
    for entry in differences.into_iter().flatten() {
        match resolve(doc, entry) {
            Object::Integer(start) => code = usize::try_from(*start).unwrap_or(usize::MAX),
            Object::Name(glyph) => {
                if let (Some(slot), Some(text)) = (table.get_mut(code), glyph_text(glyph)) {
                    *slot = text;
                }
                code = code.saturating_add(1);
            }
            _ => {}
        }
    }
    table
}

/// `/FirstChar` + `/Widths`.
fn simple_widths(doc: &Document, font: &Dictionary) -> HashMap<u32, f32> {
    let first = font
        .get(b"FirstChar")
        .ok()
        .and_then(|f| number(resolve(doc, f)))
        .unwrap_or(0.0)
        .max(0.0) as u32;
    font.get(b"Widths")
        .ok()
        .and_then(|w| resolve(doc, w).as_array().ok())
        .map(|widths| {
            widths
                .iter()
                .enumerate()
                .filter_map(|(i, w)| Some((first + i as u32, number(resolve(doc, w))?)))
                .collect()
        })
        .unwrap_or_default()
}

/// Descendant `/W`: `c [w1 w2 ...]` and `c_first c_last w` entries.
fn cid_widths(doc: &Document, entries: &[Object]) -> HashMap<u32, f32> {
    let mut widths = HashMap::new();
    let mut i = 0;
    while let Some(first) = entries.get(i).and_then(|f| number(resolve(doc, f))) {
        let first = first.max(0.0) as u32;
        match entries.get(i + 1).map(|e| resolve(doc, e)) {
            Some(Object::Array(run)) => {
                for (offset, w) in run.iter().enumerate() {
                    if let Some(w) = number(resolve(doc, w)) {
                        widths.insert(first + offset as u32, w);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(w)) = (
                    number(last),
                    entries.get(i + 2).and_then(|w| number(resolve(doc, w))),
                ) else {
                    break;
                };
                let last = (last.max(0.0) as u32).min(first.saturating_add(MAX_RANGE_SPAN));
                for cid in first..=last {
                    widths.insert(cid, w);
                }
                i += 3;
            }
            None => break,
        }
    }
    widths
}

/// Glyph names common in `/Differences` arrays.
const GLYPH_NAMES: &[(&str, &str)] = &[
    ("space", " "),
    ("exclam", "!"),
    ("quotedbl", "\""),
    ("numbersign", "#"),
    ("dollar", "$"),
    ("percent", "%"),
    ("ampersand", "&"),
    ("quotesingle", "'"),
    ("parenleft", "("),
    ("parenright", ")"),
    ("asterisk", "*"),
    ("plus", "+"),
    ("comma", ","),
    ("hyphen", "-"),
    ("period", "."),
    ("slash", "/"),
    ("zero", "0"),
    ("one", "1"),
    ("two", "2"),
    ("three", "3"),
    ("four", "4"),
    ("five", "5"),
    ("six", "6"),
    ("seven", "7"),
    ("eight", "8"),
    ("nine", "9"),
    ("colon", ":"),
    ("semicolon", ";"),
    ("less", "<"),
    ("equal", "="),
    ("greater", ">"),
    ("question", "?"),
    ("at", "@"),
    ("bracketleft", "["),
    ("backslash", "\\"),
    ("bracketright", "]"),
    ("underscore", "_"),
    ("bar", "|"),
    ("quoteleft", "\u{2018}"),
    ("quoteright", "\u{2019}"),
    ("quotedblleft", "\u{201C}"),
    ("quotedblright", "\u{201D}"),
    ("endash", "\u{2013}"),
    ("emdash", "\u{2014}"),
    ("bullet", "\u{2022}"),
    ("ellipsis", "\u{2026}"),
    ("fi", "fi"),
    ("fl", "fl"),
    ("ff", "ff"),
    ("eacute", "\u{E9}"),
    ("egrave", "\u{E8}"),
    ("aacute", "\u{E1}"),
    ("oacute", "\u{F3}"),
    ("udieresis", "\u{FC}"),
    ("odieresis", "\u{F6}"),
    ("adieresis", "\u{E4}"),
    ("ntilde", "\u{F1}"),
    ("ccedilla", "\u{E7}"),
    ("copyright", "\u{A9}"),
    ("registered", "\u{AE}"),
    ("trademark", "\u{2122}"),
    ("degree", "\u{B0}"),
    ("middot", "\u{B7}"),
    ("periodcentered", "\u{B7}"),
    ("nbspace", "\u{A0}"),
];

/// Text of a glyph name: the table above, single letters, `uniXXXX` and
/// `uXXXX[XX]`. Suffixes such as `.sc` are ignored.
fn glyph_text(name: &[u8]) -> Option<String> {
    let name = std::str::from_utf8(name).ok()?;
    let name = name.split('.').next().filter(|n| !n.is_empty())?;
    if let Some((_, text)) = GLYPH_NAMES.iter().find(|(glyph, _)| *glyph == name) {
        return Some(text.to_string());
    }
    if name.len() == 1 && name.chars().all(|c| c.is_ascii_alphabetic()) {
        return Some(name.to_string());
    }
    if let Some(hex) = name.strip_prefix("uni") {
        if hex.is_ascii() && hex.len() % 4 == 0 && !hex.is_empty() {
            let units: Option<Vec<u16>> = (0..hex.len())
                .step_by(4)
                .map(|i| u16::from_str_radix(&hex[i..i + 4], 16).ok())
                .collect();
            return units.map(|u| String::from_utf16_lossy(&u));
        }
    }
    if let Some(hex) = name.strip_prefix('u') {
        if (4..=6).contains(&hex.len()) {
            return u32::from_str_radix(hex, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from);
        }
    }
    None
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [single] => u16::from(*single),
            _ => 0,
        })
        .collect()
}

/// Reads `codespacerange`, `bfchar` and `bfrange` sections. The CMap body
/// is PostScript, which lopdf's content tokenizer reads once comments are
/// dropped: each section's entries become the operands of its `end...`
/// keyword.
fn parse_to_unicode(data: &[u8]) -> Option<ToUnicode> {
    let body: Vec<u8> = data
        .split(|b| *b == b'\n' || *b == b'\r')
        .filter(|line| {
            line.iter()
                .find(|b| !b.is_ascii_whitespace())
                .map_or(true, |first| *first != b'%')
        })
        .flat_map(|line| line.iter().copied().chain(std::iter::once(b'\n')))
        .collect();
    let content = Content::decode(&body).ok()?;

    let mut cmap = ToUnicode::default();
    for op in &content.operations {
        match op.operator.as_str() {
            "endcodespacerange" => {
                for pair in op.operands.chunks_exact(2) {
                    if let [Object::String(lo, _), Object::String(hi, _)] = pair {
                        cmap.codespace.push((lo.clone(), hi.clone()));
                    }
                }
            }
            "endbfchar" => {
                for pair in op.operands.chunks_exact(2) {
                    if let [Object::String(src, _), Object::String(dst, _)] = pair {
                        cmap.map
                            .insert(code_value(src), String::from_utf16_lossy(&utf16_units(dst)));
                    }
                }
            }
            "endbfrange" => {
                for entry in op.operands.chunks_exact(3) {
                    let [Object::String(lo, _), Object::String(hi, _), dst] = entry else {
                        continue;
                    };
                    let (lo, hi) = (code_value(lo), code_value(hi));
                    if hi < lo {
                        continue;
                    }
                    let span = (hi - lo).min(MAX_RANGE_SPAN);
                    match dst {
                        Object::String(start, _) => {
                            let start = utf16_units(start);
                            for offset in 0..=span {
                                let mut units = start.clone();
                                if let Some(last) = units.last_mut() {
                                    *last = last.wrapping_add(offset as u16);
                                }
                                cmap.map.insert(lo + offset, String::from_utf16_lossy(&units));
                            }
                        }
                        Object::Array(targets) => {
                            for (offset, target) in targets.iter().enumerate().take(span as usize + 1) {
                                if let Object::String(target, _) = target {
                                    cmap.map.insert(
                                        lo + offset as u32,
                                        String::from_utf16_lossy(&utf16_units(target)),
                                    );
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    (!cmap.map.is_empty()).then_some(cmap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Stream};

    const CMAP: &str = "%!PS-Adobe-3.0 Resource-CMap
/CIDInit /ProcSet findresource begin
12 dict begin
begincmap
/CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def
/CMapName /Adobe-Identity-UCS def
/CMapType 2 def
1 begincodespacerange
<0000> <FFFF>
endcodespacerange
2 beginbfchar
<0001> <004A>
<0002> <2019>
endbfchar
2 beginbfrange
<0003> <0005> <0061>
<0010> <0011> [<0066006C> <00E9>]
endbfrange
endcmap
CMapName currentdict /CMap defineresource pop
end
end
";

    #[test]
    fn test_to_unicode_sections() {
        let cmap = parse_to_unicode(CMAP.as_bytes()).unwrap();
        assert_eq!(cmap.codespace, vec![(vec![0, 0], vec![0xFF, 0xFF])]);
        assert_eq!(cmap.map[&1], "J");
        assert_eq!(cmap.map[&2], "\u{2019}");
        assert_eq!(cmap.map[&3], "a");
        assert_eq!(cmap.map[&5], "c");
        assert_eq!(cmap.map[&0x10], "fl");
        assert_eq!(cmap.map[&0x11], "\u{E9}");
        assert!(parse_to_unicode(b"begincmap endcmap").is_none());
    }

    #[test]
    fn test_named_font_decodes_win_ansi() {
        let font = PageFont::named("Helvetica");
        assert_eq!(font.decode(b"O\x92Brien \x96 CV"), "O\u{2019}Brien \u{2013} CV");
        let glyphs = font.glyphs(b"a b");
        assert!(glyphs[1].word_space);
        assert!((glyphs[0].width - 0.556).abs() < 1e-3);
    }

    #[test]
    fn test_differences_override_base_encoding() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "ABCDEF+Garamond",
            "Encoding" => dictionary! {
                "Type" => "Encoding",
                "BaseEncoding" => "WinAnsiEncoding",
                "Differences" => vec![
                    Object::Integer(1),
                    Object::Name(b"quoteright".to_vec()),
                    Object::Name(b"uni00E9".to_vec()),
                ],
            },
        };
        let font = PageFont::from_dict(&doc, &font, b"F9");
        assert_eq!(font.base_name, "Garamond");
        assert_eq!(font.decode(b"Ren\x02\x01s"), "Ren\u{E9}\u{2019}s");
    }

    #[test]
    fn test_widths_array_beats_base14_table() {
        let doc = Document::with_version("1.5");
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => "Calibri",
            "FirstChar" => 65,
            "LastChar" => 77,
            "Widths" => vec![Object::Integer(400); 13],
        };
        let font = PageFont::from_dict(&doc, &font, b"F1");
        let glyphs = font.glyphs(b"MMMM");
        assert!(glyphs.iter().all(|g| (g.width - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_type0_identity_font() {
        let mut doc = Document::with_version("1.5");
        let to_unicode = doc.add_object(Stream::new(dictionary! {}, CMAP.as_bytes().to_vec()));
        let descendant = dictionary! {
            "Type" => "Font",
            "Subtype" => "CIDFontType2",
            "BaseFont" => "Arial",
            "DW" => 500,
            "W" => vec![
                Object::Integer(1),
                Object::Array(vec![Object::Integer(600), Object::Integer(250)]),
                Object::Integer(3),
                Object::Integer(5),
                Object::Integer(450),
            ],
        };
        let font = dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => "QWERTY+Arial",
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Dictionary(descendant)],
            "ToUnicode" => to_unicode,
        };
        let font = PageFont::from_dict(&doc, &font, b"F3");
        let glyphs = font.glyphs(&[0, 1, 0, 2, 0, 3, 0, 0x20]);
        let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
        assert_eq!(text, "J\u{2019}a");
        let widths: Vec<f32> = glyphs.iter().map(|g| g.width).collect();
        assert_eq!(widths, vec![0.6, 0.25, 0.45, 0.5]);
        assert!(glyphs.iter().all(|g| !g.word_space));
    }
}
