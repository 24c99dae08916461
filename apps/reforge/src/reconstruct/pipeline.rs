use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use lopdf::{Document, ObjectId};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::data_path::{entries, resolve_field};
use super::entries::{layout_entries, EntryFrame, RenderEntry};
use super::redaction::redact_area;
use super::writer::{base14_font, PageCanvas};
use super::{
    FieldError, LayoutConfig, ReconstructionError, ReconstructionResult, Stage, StageMachine,
};
use crate::classification::{AreaKind, ContentArea};
use crate::extraction::SpanExtractor;
use crate::layout::{chars_per_line, wrap_text};
use crate::schema::{FormField, FormSchema, Section};
use crate::style::{Alignment, StyleResolver};

/// A line of replacement text for a scalar field.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub baseline: f32,
}

/// Per-document working state. Never shared between documents.
struct Run {
    pages: Vec<ObjectId>,
    canvases: BTreeMap<usize, PageCanvas>,
    machine: StageMachine,
    result: ReconstructionResult,
}

fn record_error(result: &mut ReconstructionResult, field: &str, reason: impl Into<String>) {
    let error = FieldError::new(field, reason);
    warn!("Skipping {error}");
    result.field_errors.push(error);
}

/// Canvas for a zero-based page index, decoded on first use.
fn canvas_for<'a>(
    doc: &Document,
    pages: &[ObjectId],
    canvases: &'a mut BTreeMap<usize, PageCanvas>,
    page: usize,
) -> Result<&'a mut PageCanvas, String> {
    let page_id = *pages
        .get(page)
        .ok_or_else(|| format!("page {page} does not exist"))?;
    match canvases.entry(page) {
        Entry::Occupied(slot) => Ok(slot.into_mut()),
        Entry::Vacant(slot) => {
            let canvas = PageCanvas::load(doc, page_id)
                .map_err(|e| format!("page {page} unreadable: {e}"))?;
            Ok(slot.insert(canvas))
        }
    }
}

/// Rebuilds documents from a template, its schema and user data.
/// Holds no per-document state; one instance serves every request.
#[derive(Debug, Clone)]
pub struct DocumentReconstructor {
    config: LayoutConfig,
    styles: StyleResolver,
    extractor: SpanExtractor,
}

impl DocumentReconstructor {
    pub fn new(config: LayoutConfig, styles: StyleResolver) -> Self {
        Self {
            config,
            styles,
            extractor: SpanExtractor::new(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Produces the output document. Only an unreadable template or a failure
    /// to serialise the output is an error; everything else is reported in
    /// the result.
    pub fn reconstruct(
        &self,
        template: &[u8],
        schema: &FormSchema,
        data: &Value,
    ) -> Result<ReconstructionResult, ReconstructionError> {
        let mut doc = Document::load_mem(template)
            .map_err(|e| ReconstructionError::Unreadable(e.to_string()))?;
        if doc.is_encrypted() {
            return Err(ReconstructionError::Unreadable(
                "document is encrypted".to_string(),
            ));
        }

        let mut run = Run {
            pages: doc.get_pages().into_values().collect(),
            canvases: BTreeMap::new(),
            machine: StageMachine::default(),
            result: ReconstructionResult {
                document: Vec::new(),
                fields_written: 0,
                fields_skipped: Vec::new(),
                field_errors: Vec::new(),
                overflow: Vec::new(),
                stages: Vec::new(),
            },
        };

        for area in schema.scalar_areas() {
            self.fill_scalar(&doc, &mut run, area, data)?;
        }
        for (section, field) in schema.repeating_sections() {
            let areas: Vec<&ContentArea> = schema.section_areas(&section.id).collect();
            self.fill_section(&doc, &mut run, section, field, &areas, data)?;
        }

        run.machine.advance(Stage::Finalize)?;
        for canvas in std::mem::take(&mut run.canvases).into_values() {
            canvas
                .finish(&mut doc)
                .map_err(|e| ReconstructionError::Write(e.to_string()))?;
        }
        let mut document = Vec::new();
        doc.save_to(&mut document)
            .map_err(|e| ReconstructionError::Write(e.to_string()))?;

        let mut result = run.result;
        result.document = document;
        result.stages = run.machine.into_trace();
        info!(
            "Reconstructed '{}' v{}: {} written, {} skipped, {} errors, {} overflowing sections",
            schema.template_id,
            schema.version,
            result.fields_written,
            result.fields_skipped.len(),
            result.field_errors.len(),
            result.overflow.len()
        );
        Ok(result)
    }

    fn fill_scalar(
        &self,
        doc: &Document,
        run: &mut Run,
        area: &ContentArea,
        data: &Value,
    ) -> Result<(), ReconstructionError> {
        let Some(field) = area.form_field.as_deref() else {
            return Ok(());
        };
        let Some(value) = resolve_field(data, field) else {
            debug!("No value for '{field}', leaving template text");
            run.result.fields_skipped.push(field.to_string());
            return Ok(());
        };
        if area.bbox.area() <= 0.0 {
            record_error(&mut run.result, field, "no bounding box");
            return Ok(());
        }
        let canvas = match canvas_for(doc, &run.pages, &mut run.canvases, area.page) {
            Ok(canvas) => canvas,
            Err(reason) => {
                record_error(&mut run.result, field, reason);
                return Ok(());
            }
        };

        run.machine.advance(Stage::RedactField)?;
        redact_area(canvas, area, &self.config, &self.extractor);

        run.machine.advance(Stage::InsertField)?;
        let font = base14_font(&area.style.font_name, area.style.bold, area.style.italic);
        for line in self.place_scalar(area, &value) {
            canvas.draw_text(
                &line.text,
                line.x,
                line.baseline,
                font,
                area.style.font_size,
                area.style.color,
            );
        }
        run.result.fields_written += 1;
        Ok(())
    }

    /// Lines of a scalar value at the area's position. Long values wrap at
    /// the estimated characters per line of the original box.
    pub fn place_scalar(&self, area: &ContentArea, value: &str) -> Vec<PlacedLine> {
        let config = &self.config;
        let size = area.style.font_size;
        let bbox = &area.bbox;
        let first_baseline = match area.area_type {
            AreaKind::Header => bbox.y0 + config.name_baseline_ratio * size,
            AreaKind::Contact => bbox.y0 + config.contact_baseline_ratio * size,
            _ => bbox.y0 + config.generic_baseline_ratio * bbox.height(),
        };
        let lines = if value.chars().count() > config.wrap_threshold {
            let capacity = chars_per_line(
                bbox.width(),
                size,
                config.avg_char_width,
                config.min_chars_per_line,
            );
            wrap_text(value, capacity)
        } else {
            vec![value.to_string()]
        };
        lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| PlacedLine {
                text,
                x: bbox.x0,
                baseline: first_baseline + i as f32 * size * config.line_height_factor,
            })
            .collect()
    }

    fn fill_section(
        &self,
        doc: &Document,
        run: &mut Run,
        section: &Section,
        field: &FormField,
        areas: &[&ContentArea],
        data: &Value,
    ) -> Result<(), ReconstructionError> {
        let Some(items) = entries(data, &field.name) else {
            debug!("No entries for '{}', leaving template text", field.name);
            run.result.fields_skipped.push(field.name.clone());
            return Ok(());
        };
        let Some(anchor) = section.anchor else {
            record_error(&mut run.result, &field.name, "section has no anchor position");
            return Ok(());
        };
        let geometry = match canvas_for(doc, &run.pages, &mut run.canvases, section.page) {
            Ok(canvas) => canvas.geometry,
            Err(reason) => {
                record_error(&mut run.result, &field.name, reason);
                return Ok(());
            }
        };

        run.machine.advance(Stage::RedactSection)?;
        for area in areas {
            match canvas_for(doc, &run.pages, &mut run.canvases, area.page) {
                Ok(canvas) => {
                    redact_area(canvas, area, &self.config, &self.extractor);
                }
                Err(reason) => record_error(&mut run.result, &field.name, reason),
            }
        }

        run.machine.advance(Stage::LayoutEntries)?;
        let frame =
            EntryFrame::below_anchor(&anchor, geometry.width, geometry.height, &self.config);
        let (rendered, overflow) = layout_entries(
            &section.id,
            items,
            &field.item_schema,
            &frame,
            &self.config,
            &self.styles,
        );

        run.machine.advance(Stage::InsertEntries)?;
        match canvas_for(doc, &run.pages, &mut run.canvases, section.page) {
            Ok(canvas) => {
                for entry in rendered.iter().filter(|e| !e.overflow) {
                    draw_entry(canvas, &frame, entry);
                }
            }
            Err(reason) => record_error(&mut run.result, &field.name, reason),
        }
        if let Some(report) = overflow {
            warn!(
                "Section '{}': {} of {} entries overflow the page and were not drawn",
                report.section,
                report.overflowed.len(),
                report.total_entries
            );
            run.result.overflow.push(report);
        }
        run.result.fields_written += 1;
        Ok(())
    }
}

fn draw_entry(canvas: &mut PageCanvas, frame: &EntryFrame, entry: &RenderEntry) {
    for line in &entry.lines {
        let preset = line.preset;
        let width = PageCanvas::text_width(&line.text, preset.font, preset.size);
        let x = match preset.alignment {
            Alignment::Left => frame.x,
            Alignment::Center => frame.x + (frame.width - width).max(0.0) / 2.0,
            Alignment::Right => frame.x + (frame.width - width).max(0.0),
        };
        canvas.draw_text(&line.text, x, line.baseline, preset.font, preset.size, preset.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classification::RuleClassifier;
    use crate::extraction::fixtures::PdfFixture;
    use crate::extraction::TextSpan;
    use crate::schema::SchemaBuilder;
    use serde_json::json;

    fn reconstructor() -> DocumentReconstructor {
        DocumentReconstructor::new(LayoutConfig::default(), StyleResolver::new())
    }

    fn resume() -> (Vec<u8>, FormSchema) {
        let pdf = PdfFixture::resume_template();
        let spans = SpanExtractor::new().extract(&pdf).unwrap();
        let areas = RuleClassifier::default().classify_spans(&spans);
        let schema = SchemaBuilder::new().build("tpl-resume", 1, areas, "rules");
        (pdf, schema)
    }

    fn user_data() -> Value {
        json!({
            "personalInfo": {
                "firstName": "Grace",
                "lastName": "Hopper",
                "email": "grace@navy.mil",
                "phone": "+1 202 555 0100",
            },
            "education": [
                {"institution": "Yale University", "degree": "PhD Mathematics"},
            ],
            "experience": [
                {"company": "Entry One Ltd", "position": "Programmer"},
                {"company": "Entry Two Ltd", "position": "Director"},
                {"company": "Entry Three Ltd", "position": "Rear Admiral"},
            ],
            "skills": [{"items": ["COBOL", "Compilers"]}],
            "referees": [{"name": "Howard Aiken", "email": "aiken@harvard.edu"}],
        })
    }

    fn reextract(bytes: &[u8]) -> Vec<TextSpan> {
        SpanExtractor::new().extract(bytes).unwrap()
    }

    #[test]
    fn test_redacted_text_is_gone_and_new_text_present() {
        let (pdf, schema) = resume();
        let result = reconstructor()
            .reconstruct(&pdf, &schema, &user_data())
            .unwrap();
        assert!(result.field_errors.is_empty(), "{:?}", result.field_errors);
        assert!(result.overflow.is_empty());

        let spans = reextract(&result.document);
        for area in schema.content_areas.iter().filter(|a| a.form_field.is_some()) {
            assert!(
                !spans
                    .iter()
                    .any(|s| s.bbox.intersects(&area.bbox) && s.text.contains(&area.source_text)),
                "'{}' still visible",
                area.source_text
            );
        }
        let text: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        for expected in [
            "Grace Hopper",
            "grace@navy.mil +1 202 555 0100",
            "Yale University",
            "Entry Three Ltd",
            "- COBOL",
            "Howard Aiken",
            "EDUCATION",
            "PROFESSIONAL EXPERIENCE",
        ] {
            assert!(text.contains(&expected), "missing '{expected}' in {text:?}");
        }
    }

    #[test]
    fn test_name_keeps_template_style() {
        let (pdf, schema) = resume();
        let result = reconstructor()
            .reconstruct(&pdf, &schema, &user_data())
            .unwrap();
        let spans = reextract(&result.document);
        let name = spans.iter().find(|s| s.text == "Grace Hopper").unwrap();
        assert_eq!(name.font_name, "Helvetica-Bold");
        assert!((name.font_size - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_third_entry_at_two_entry_heights() {
        let (pdf, schema) = resume();
        let config = LayoutConfig::default();
        let anchor = schema.section("experience").unwrap().anchor.unwrap();
        let base_y = anchor.y1 + config.section_top_padding;

        let result = reconstructor()
            .reconstruct(&pdf, &schema, &user_data())
            .unwrap();
        let spans = reextract(&result.document);
        let third = spans.iter().find(|s| s.text == "Entry Three Ltd").unwrap();
        assert!((third.bbox.y0 - (base_y + 2.0 * config.entry_height)).abs() < 0.01);
    }

    #[test]
    fn test_stage_trace() {
        let (pdf, schema) = resume();
        let result = reconstructor()
            .reconstruct(&pdf, &schema, &user_data())
            .unwrap();
        use Stage::*;
        let mut expected = vec![Idle];
        // name, contact line
        expected.extend([RedactField, InsertField, RedactField, InsertField]);
        // education, experience, skills, referees
        for _ in 0..4 {
            expected.extend([RedactSection, LayoutEntries, InsertEntries]);
        }
        expected.push(Finalize);
        assert_eq!(result.stages, expected);
        assert_eq!(result.fields_written, 6);
    }

    #[test]
    fn test_missing_values_leave_template_untouched() {
        let (pdf, schema) = resume();
        let result = reconstructor().reconstruct(&pdf, &schema, &json!({})).unwrap();
        assert_eq!(result.fields_written, 0);
        assert_eq!(result.stages, vec![Stage::Idle, Stage::Finalize]);
        assert!(result.fields_skipped.contains(&"experience".to_string()));
        let spans = reextract(&result.document);
        assert!(spans.iter().any(|s| s.text == "JOHN SMITH"));
    }

    #[test]
    fn test_overflowing_entries_reported_and_document_produced() {
        let (pdf, schema) = resume();
        let experience: Vec<Value> = (0..10)
            .map(|i| json!({"company": format!("Employer {i}"), "position": "Clerk"}))
            .collect();
        let data = json!({ "experience": experience });
        let result = reconstructor().reconstruct(&pdf, &schema, &data).unwrap();

        assert_eq!(result.overflow.len(), 1);
        let report = &result.overflow[0];
        assert_eq!(report.section, "experience");
        assert_eq!(report.rendered_entries + report.overflowed.len(), 10);
        assert!(report.rendered_entries > 0);

        let spans = reextract(&result.document);
        let last = format!("Employer {}", report.rendered_entries - 1);
        assert!(spans.iter().any(|s| s.text == last));
        let first_dropped = format!("Employer {}", report.rendered_entries);
        assert!(!spans.iter().any(|s| s.text == first_dropped));
    }

    #[test]
    fn test_sections_without_anchor_are_field_errors() {
        let (pdf, _) = resume();
        let schema = FormSchema::fallback("tpl-resume");
        let result = reconstructor()
            .reconstruct(&pdf, &schema, &user_data())
            .unwrap();
        assert_eq!(result.field_errors.len(), 3);
        assert!(!result.document.is_empty());
    }

    #[test]
    fn test_unreadable_template() {
        let (_, schema) = resume();
        let err = reconstructor()
            .reconstruct(b"%PDF-1.4 garbage", &schema, &user_data())
            .unwrap_err();
        assert!(matches!(err, ReconstructionError::Unreadable(_)));
    }

    #[test]
    fn test_long_scalar_wraps_into_three_lines() {
        let (_, schema) = resume();
        let mut area = schema
            .content_areas
            .iter()
            .find(|a| a.area_type == AreaKind::Contact)
            .cloned()
            .unwrap();
        area.bbox.x1 = area.bbox.x0 + 200.0;
        area.style.font_size = 10.0;
        let value = format!("abcdefghij{}", " abcdefghi".repeat(11));
        assert_eq!(value.len(), 120);

        let lines = reconstructor().place_scalar(&area, &value);
        assert_eq!(lines.len(), 3);
        assert!((lines[0].baseline - (area.bbox.y0 + 9.0)).abs() < 1e-3);
        assert!((lines[1].baseline - lines[0].baseline - 12.0).abs() < 1e-3);
    }

    #[test]
    fn test_name_baseline_is_top_aligned() {
        let (_, schema) = resume();
        let name = schema
            .content_areas
            .iter()
            .find(|a| a.area_type == AreaKind::Header)
            .unwrap();
        let lines = reconstructor().place_scalar(name, "Grace Hopper");
        assert_eq!(lines.len(), 1);
        assert!((lines[0].baseline - (name.bbox.y0 + 0.8 * 20.0)).abs() < 1e-3);
    }
}
