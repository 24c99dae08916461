//! Remote classification through the text-classification service.
//!
//! One request per template: span summaries are capped at `max_spans`, sent in
//! a single round trip, and the answer is matched back to spans by content so
//! each area keeps the span's bbox and style. Spans past the cap are left to
//! the rule classifier and merged into the answer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::field_map::{default_subtype, form_field};
use super::keywords::section_category;
use super::prompts::{CLASSIFY_PROMPT_TEMPLATE, CLASSIFY_SYSTEM};
use super::{AreaKind, ClassificationError, ClassificationStrategy, ContentArea, RuleClassifier};
use crate::extraction::TextSpan;
use crate::llm_client::{strip_code_fence, LlmClient};

/// What the service sees of one span.
#[derive(Debug, Serialize)]
struct SpanSummary<'a> {
    index: usize,
    text: &'a str,
    font: &'a str,
    size: f32,
    bold: bool,
}

/// One labelled fragment in the service's answer.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteArea {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub area_type: String,
    pub content: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(rename = "isRequired", default)]
    pub is_required: bool,
}

/// The service answers with a bare array or wraps it in `{"areas": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RemoteAnswer {
    List(Vec<RemoteArea>),
    Wrapped { areas: Vec<RemoteArea> },
}

impl RemoteAnswer {
    fn into_areas(self) -> Vec<RemoteArea> {
        match self {
            RemoteAnswer::List(areas) | RemoteAnswer::Wrapped { areas } => areas,
        }
    }
}

#[derive(Clone)]
pub struct RemoteClassifier {
    llm: LlmClient,
    max_spans: usize,
    /// Classifies the spans past `max_spans`.
    rules: RuleClassifier,
}

impl RemoteClassifier {
    pub fn new(llm: LlmClient, max_spans: usize) -> Self {
        Self {
            llm,
            max_spans,
            rules: RuleClassifier::default(),
        }
    }

    /// Adds rule areas for every span the service never saw. Rules run over
    /// the whole template so the tail keeps its section context.
    fn with_rule_tail(&self, mut areas: Vec<ContentArea>, spans: &[TextSpan]) -> Vec<ContentArea> {
        let Some(tail) = spans.get(self.max_spans..).filter(|t| !t.is_empty()) else {
            return areas;
        };
        let before = areas.len();
        areas.extend(
            self.rules
                .classify_spans(spans)
                .into_iter()
                .filter(|a| tail.iter().any(|s| s.page == a.page && s.bbox == a.bbox)),
        );
        debug!(
            "Rules classified {} areas among {} spans past the remote cap",
            areas.len() - before,
            tail.len()
        );
        sort_document_order(&mut areas);
        areas
    }

    fn build_prompt(&self, spans: &[TextSpan], template_name: &str) -> String {
        if spans.len() > self.max_spans {
            warn!(
                "Template '{template_name}' has {} spans, classifying the first {}",
                spans.len(),
                self.max_spans
            );
        }
        let summaries: Vec<SpanSummary> = spans
            .iter()
            .take(self.max_spans)
            .enumerate()
            .map(|(index, span)| SpanSummary {
                index,
                text: span.text.trim(),
                font: &span.font_name,
                size: (span.font_size * 10.0).round() / 10.0,
                bold: span.flags.bold,
            })
            .collect();
        let spans_json = serde_json::to_string_pretty(&summaries).unwrap_or_default();
        CLASSIFY_PROMPT_TEMPLATE
            .replace("{template_name}", template_name)
            .replace("{spans_json}", &spans_json)
    }
}

#[async_trait]
impl ClassificationStrategy for RemoteClassifier {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn classify(
        &self,
        spans: &[TextSpan],
        template_name: &str,
    ) -> Result<Vec<ContentArea>, ClassificationError> {
        let prompt = self.build_prompt(spans, template_name);
        let text = self.llm.complete(CLASSIFY_SYSTEM, &prompt).await?;
        let areas = parse_answer(&text, &spans[..spans.len().min(self.max_spans)])?;
        Ok(self.with_rule_tail(areas, spans))
    }
}

/// Turns the service's text answer into content areas.
pub fn parse_answer(text: &str, spans: &[TextSpan]) -> Result<Vec<ContentArea>, ClassificationError> {
    let answer: RemoteAnswer = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| ClassificationError::Unparseable(e.to_string()))?;

    let mut used = vec![false; spans.len()];
    let mut areas = Vec::new();

    for entry in answer.into_areas() {
        let Some(kind) = AreaKind::parse(&entry.area_type) else {
            debug!("Skipping remote area with unknown type '{}'", entry.area_type);
            continue;
        };
        let Some(index) = match_span(&entry.content, spans, &used) else {
            debug!("Remote area '{}' matches no span", entry.content);
            continue;
        };
        used[index] = true;

        let subtype = resolve_subtype(kind, entry.name.as_deref(), &entry.content);
        let field = form_field(kind, subtype).map(str::to_string);
        if let Some(mut area) = ContentArea::from_span(&spans[index], kind, subtype, field) {
            area.confidence = entry.confidence;
            area.is_required = entry.is_required;
            areas.push(area);
        }
    }

    if areas.is_empty() {
        return Err(ClassificationError::Empty);
    }
    sort_document_order(&mut areas);
    Ok(areas)
}

/// Keeps document order regardless of answer order.
fn sort_document_order(areas: &mut [ContentArea]) {
    areas.sort_by(|a, b| {
        (a.page, a.bbox.y0, a.bbox.x0)
            .partial_cmp(&(b.page, b.bbox.y0, b.bbox.x0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn resolve_subtype(kind: AreaKind, name: Option<&str>, content: &str) -> &'static str {
    if kind == AreaKind::SectionHeader {
        return section_category(content).as_str();
    }
    name.map(|n| n.trim().to_lowercase())
        .and_then(|n| KNOWN_SUBTYPES.iter().copied().find(|s| *s == n))
        .filter(|s| form_field(kind, s).is_some())
        .unwrap_or_else(|| default_subtype(kind))
}

const KNOWN_SUBTYPES: &[&str] = &[
    "name",
    "email",
    "phone",
    "email_phone",
    "institution",
    "degree",
    "position",
    "company",
    "skills",
    "interests",
    "contact",
];

/// First unused span whose text equals the content, else one that contains
/// it (or is contained by it), compared case-insensitively.
fn match_span(content: &str, spans: &[TextSpan], used: &[bool]) -> Option<usize> {
    let needle = content.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    let candidates = || {
        spans
            .iter()
            .enumerate()
            .filter(|(i, _)| !used[*i])
            .map(|(i, s)| (i, s.text.trim().to_lowercase()))
    };
    candidates()
        .find(|(_, text)| *text == needle)
        .or_else(|| {
            candidates().find(|(_, text)| {
                !text.is_empty() && (text.contains(&needle) || needle.contains(text.as_str()))
            })
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{BBox, Color, SpanFlags};

    fn span(text: &str, y: f32) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            bbox: BBox::new(72.0, y, 300.0, y + 12.0),
            font_name: "Helvetica".to_string(),
            font_size: 12.0,
            color: Color::BLACK,
            page: 0,
            flags: SpanFlags::default(),
        }
    }

    fn spans() -> Vec<TextSpan> {
        vec![
            span("JANE DOE", 40.0),
            span("jane@doe.dev", 60.0),
            span("EDUCATION", 100.0),
            span("Strathmore University", 120.0),
        ]
    }

    #[test]
    fn test_parse_plain_array() {
        let answer = r#"[
            {"name": "name", "type": "header", "content": "JANE DOE", "confidence": 0.9, "isRequired": true},
            {"name": "email", "type": "contact", "content": "jane@doe.dev", "confidence": 0.8, "isRequired": true},
            {"name": "education", "type": "section_header", "content": "EDUCATION", "confidence": 0.99, "isRequired": false},
            {"name": "institution", "type": "education", "content": "Strathmore University", "confidence": 0.4, "isRequired": false}
        ]"#;
        let areas = parse_answer(answer, &spans()).unwrap();
        assert_eq!(areas.len(), 4);
        assert_eq!(areas[0].area_type, AreaKind::Header);
        assert_eq!(
            areas[0].form_field.as_deref(),
            Some("personalInfo.firstName personalInfo.lastName")
        );
        assert_eq!(areas[2].subtype, "education");
        assert_eq!(areas[3].form_field.as_deref(), Some("education.institution"));
        // Low confidence never drops an area.
        assert_eq!(areas[3].confidence, Some(0.4));
    }

    #[test]
    fn test_parse_wrapped_answer_and_restore_order() {
        let answer = r#"{"areas": [
            {"name": "institution", "type": "education", "content": "strathmore university"},
            {"name": "name", "type": "header", "content": "JANE DOE"}
        ]}"#;
        let areas = parse_answer(answer, &spans()).unwrap();
        assert_eq!(areas[0].source_text, "JANE DOE");
        assert_eq!(areas[1].source_text, "Strathmore University");
    }

    #[test]
    fn test_fenced_answer_accepted() {
        let answer = "```json\n[{\"name\": \"email\", \"type\": \"contact\", \"content\": \"jane@doe.dev\"}]\n```";
        let areas = parse_answer(answer, &spans()).unwrap();
        assert_eq!(areas[0].form_field.as_deref(), Some("personalInfo.email"));
    }

    #[test]
    fn test_spans_past_cap_fall_to_rules() {
        let llm = LlmClient::new(
            "test-key".to_string(),
            "test-model".to_string(),
            std::time::Duration::from_secs(1),
        )
        .unwrap();
        let classifier = RemoteClassifier::new(llm, 2);
        let spans = spans();
        let answer = r#"[
            {"name": "name", "type": "header", "content": "JANE DOE"},
            {"name": "email", "type": "contact", "content": "jane@doe.dev"}
        ]"#;
        let head = parse_answer(answer, &spans[..2]).unwrap();
        let areas = classifier.with_rule_tail(head, &spans);

        let sources: Vec<&str> = areas.iter().map(|a| a.source_text.as_str()).collect();
        assert_eq!(
            sources,
            vec!["JANE DOE", "jane@doe.dev", "EDUCATION", "Strathmore University"]
        );
        assert_eq!(areas[2].area_type, AreaKind::SectionHeader);
        assert_eq!(areas[3].form_field.as_deref(), Some("education.institution"));

        // Under the cap nothing is added.
        let all = parse_answer(answer, &spans).unwrap();
        let uncapped = RemoteClassifier::new(classifier.llm.clone(), 10).with_rule_tail(all, &spans);
        assert_eq!(uncapped.len(), 2);
    }

    #[test]
    fn test_unknown_name_uses_default_subtype() {
        let answer = r#"[{"name": "employer", "type": "experience", "content": "EDUCATION"}]"#;
        let areas = parse_answer(answer, &spans()).unwrap();
        assert_eq!(areas[0].subtype, "position");
    }

    #[test]
    fn test_unparseable_answer() {
        let err = parse_answer("I could not classify this", &spans()).unwrap_err();
        assert!(matches!(err, ClassificationError::Unparseable(_)));
    }

    #[test]
    fn test_answer_matching_nothing_is_empty() {
        let answer = r#"[{"name": "name", "type": "header", "content": "SOMEONE ELSE"}]"#;
        let err = parse_answer(answer, &spans()).unwrap_err();
        assert!(matches!(err, ClassificationError::Empty));
    }

    #[test]
    fn test_each_span_matched_once() {
        let spans = vec![span("Software Engineer", 10.0), span("Software Engineer", 40.0)];
        let answer = r#"[
            {"name": "position", "type": "experience", "content": "Software Engineer"},
            {"name": "position", "type": "experience", "content": "Software Engineer"}
        ]"#;
        let areas = parse_answer(answer, &spans).unwrap();
        assert_eq!(areas.len(), 2);
        assert!(areas[0].bbox.y0 < areas[1].bbox.y0);
    }
}
