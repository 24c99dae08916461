//! Test-only PDF builder. Produces real documents through lopdf so extraction
//! and reconstruction tests run against genuine content streams.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

use crate::layout::metrics_for_font;

/// One line of text, positioned in PDF user space (baseline, bottom-left origin).
#[derive(Debug, Clone)]
pub struct TextLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub bold: bool,
    pub color: Option<[f32; 3]>,
}

impl TextLine {
    pub fn new(text: &str, x: f32, y: f32, size: f32) -> Self {
        Self {
            text: text.to_string(),
            x,
            y,
            size,
            bold: false,
            color: None,
        }
    }

    pub fn bold(text: &str, x: f32, y: f32, size: f32) -> Self {
        Self {
            bold: true,
            ..Self::new(text, x, y, size)
        }
    }

    pub fn colored(mut self, rgb: [f32; 3]) -> Self {
        self.color = Some(rgb);
        self
    }
}

fn real(v: f32) -> Object {
    Object::Real(v.into())
}

/// Fonts beyond the two base-14 faces every fixture carries.
#[derive(Debug, Clone)]
pub enum FixtureFont {
    /// TrueType font with `WinAnsiEncoding` and one width for every code.
    WinAnsi { base: &'static str, width: i64 },
    /// `Identity-H` Type0 font whose CIDs map to text through `/ToUnicode`.
    Identity {
        base: &'static str,
        cids: Vec<(u16, char)>,
        width: i64,
    },
}

impl FixtureFont {
    fn add_to(&self, doc: &mut Document) -> Object {
        match self {
            FixtureFont::WinAnsi { base, width } => doc
                .add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "TrueType",
                    "BaseFont" => *base,
                    "Encoding" => "WinAnsiEncoding",
                    "FirstChar" => 32,
                    "LastChar" => 255,
                    "Widths" => vec![Object::Integer(*width); 224],
                })
                .into(),
            FixtureFont::Identity { base, cids, width } => {
                let mut cmap = String::from(
                    "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
                     1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
                );
                cmap.push_str(&format!("{} beginbfchar\n", cids.len()));
                for (cid, ch) in cids {
                    cmap.push_str(&format!("<{cid:04X}> <{:04X}>\n", *ch as u32));
                }
                cmap.push_str("endbfchar\nendcmap\nend\nend\n");
                let to_unicode = doc.add_object(Stream::new(dictionary! {}, cmap.into_bytes()));

                let mut descendant = Dictionary::new();
                descendant.set("Type", "Font");
                descendant.set("Subtype", "CIDFontType2");
                descendant.set("BaseFont", *base);
                descendant.set("DW", *width);
                let descendant = doc.add_object(descendant);
                doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type0",
                    "BaseFont" => *base,
                    "Encoding" => "Identity-H",
                    "DescendantFonts" => vec![descendant.into()],
                    "ToUnicode" => to_unicode,
                })
                .into()
            }
        }
    }
}

pub struct PdfFixture {
    pages: Vec<Vec<Operation>>,
    fonts: Vec<(String, FixtureFont)>,
    width: f32,
    height: f32,
}

impl Default for PdfFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfFixture {
    /// One empty US-letter page.
    pub fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            fonts: Vec::new(),
            width: 612.0,
            height: 792.0,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    pub fn line(mut self, line: TextLine) -> Self {
        let font = if line.bold { "F2" } else { "F1" };
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec![font.into(), real(line.size)]));
        if let Some([r, g, b]) = line.color {
            ops.push(Operation::new("rg", vec![real(r), real(g), real(b)]));
        }
        ops.push(Operation::new("Td", vec![real(line.x), real(line.y)]));
        ops.push(Operation::new(
            "Tj",
            vec![Object::string_literal(line.text.as_str())],
        ));
        ops.push(Operation::new("ET", vec![]));
        self
    }

    /// Emits each word as its own `Tj`, the way many generators do.
    pub fn words(mut self, words: &[&str], x: f32, y: f32, size: f32) -> Self {
        let metrics = metrics_for_font("Helvetica");
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec!["F1".into(), real(size)]));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        for (i, word) in words.iter().enumerate() {
            if i > 0 {
                let step = metrics.measure_pt(words[i - 1], size) + metrics.space_width * size;
                ops.push(Operation::new("Td", vec![real(step), real(0.0)]));
            }
            ops.push(Operation::new("Tj", vec![Object::string_literal(*word)]));
        }
        ops.push(Operation::new("ET", vec![]));
        self
    }

    /// Registers `font` under resource name `resource`.
    pub fn font(mut self, resource: &str, font: FixtureFont) -> Self {
        self.fonts.push((resource.to_string(), font));
        self
    }

    /// Shows a raw string operand with a registered font.
    pub fn show(mut self, resource: &str, x: f32, y: f32, size: f32, string: Object) -> Self {
        let ops = self.ops();
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new(
            "Tf",
            vec![Object::Name(resource.as_bytes().to_vec()), real(size)],
        ));
        ops.push(Operation::new("Td", vec![real(x), real(y)]));
        ops.push(Operation::new("Tj", vec![string]));
        ops.push(Operation::new("ET", vec![]));
        self
    }

    pub fn page_break(mut self) -> Self {
        self.pages.push(Vec::new());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let mut font_dict = dictionary! {
            "F1" => regular,
            "F2" => bold,
        };
        for (resource, font) in &self.fonts {
            let font = font.add_to(&mut doc);
            font_dict.set(resource.as_str(), font);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => font_dict,
        });

        let mut kids: Vec<Object> = Vec::new();
        for operations in self.pages {
            let content = Content { operations };
            let encoded = content.encode().expect("fixture content encodes");
            let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), real(self.width), real(self.height)],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("fixture saves");
        buffer
    }

    /// A one-page resume covering every section the rule classifier knows.
    pub fn resume_template() -> Vec<u8> {
        PdfFixture::new()
            .line(TextLine::bold("JOHN SMITH", 72.0, 740.0, 20.0))
            .line(TextLine::new(
                "john.smith@example.com | +254 712 345 678",
                72.0,
                718.0,
                10.0,
            ))
            .line(TextLine::bold("EDUCATION", 72.0, 680.0, 12.0))
            .line(TextLine::bold("University of Nairobi", 72.0, 662.0, 11.0))
            .line(TextLine::new(
                "Bachelor of Science in Computer Science",
                72.0,
                648.0,
                10.0,
            ))
            .line(TextLine::bold("PROFESSIONAL EXPERIENCE", 72.0, 610.0, 12.0))
            .line(TextLine::bold("Software Engineer", 72.0, 592.0, 11.0))
            .line(TextLine::new("Safaricom Limited", 72.0, 578.0, 10.0))
            .line(TextLine::bold("SKILLS", 72.0, 540.0, 12.0))
            .line(TextLine::new("Python, SQL, Project Management", 72.0, 522.0, 10.0))
            .line(TextLine::bold("REFEREES", 72.0, 480.0, 12.0))
            .line(TextLine::new(
                "Dr. Jane Wanjiku, Head of Department",
                72.0,
                462.0,
                10.0,
            ))
            .line(TextLine::new("jane.wanjiku@uon.ac.ke", 72.0, 448.0, 10.0))
            .build()
    }
}
