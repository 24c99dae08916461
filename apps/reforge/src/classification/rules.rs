//! Deterministic rule-based classification.
//!
//! `RULES` is evaluated top to bottom for every span and the first predicate
//! that matches decides the area kind and subtype. Spans no rule claims are
//! discarded. The only state carried between spans is the section opened by
//! the most recent section header.

use async_trait::async_trait;

use super::field_map::form_field;
use super::keywords::{
    contains_keyword, has_email, has_phone, has_section_keyword, is_all_caps, normalize,
    section_category, DEGREE_KEYWORDS, EMPLOYER_KEYWORDS, INSTITUTION_KEYWORDS, ROLE_KEYWORDS,
    SENIORITY_KEYWORDS, SKILL_KEYWORDS,
};
use super::{AreaKind, ClassificationError, ClassificationStrategy, ContentArea, SectionCategory};
use crate::extraction::TextSpan;

/// Everything a rule predicate may look at.
pub struct RuleInput<'a> {
    pub text: &'a str,
    pub normalized: String,
    pub tokens: usize,
    pub font_size: f32,
    pub section: Option<SectionCategory>,
    pub name_min_font_size: f32,
}

impl<'a> RuleInput<'a> {
    fn new(span: &'a TextSpan, section: Option<SectionCategory>, name_min_font_size: f32) -> Self {
        let text = span.text.trim();
        Self {
            text,
            normalized: normalize(text),
            tokens: text.split_whitespace().count(),
            font_size: span.font_size,
            section,
            name_min_font_size,
        }
    }

    fn in_referees(&self) -> bool {
        self.section == Some(SectionCategory::Referees)
    }
}

/// A predicate paired with the kind it assigns. The predicate returns the
/// subtype on a match.
pub struct Rule {
    pub kind: AreaKind,
    pub matches: fn(&RuleInput) -> Option<&'static str>,
}

pub const RULES: &[Rule] = &[
    Rule {
        kind: AreaKind::Header,
        matches: header_rule,
    },
    Rule {
        kind: AreaKind::Contact,
        matches: contact_rule,
    },
    Rule {
        kind: AreaKind::SectionHeader,
        matches: section_header_rule,
    },
    Rule {
        kind: AreaKind::Education,
        matches: education_rule,
    },
    Rule {
        kind: AreaKind::Experience,
        matches: experience_rule,
    },
    Rule {
        kind: AreaKind::Skills,
        matches: skills_rule,
    },
    Rule {
        kind: AreaKind::Referee,
        matches: referee_rule,
    },
];

fn header_rule(input: &RuleInput) -> Option<&'static str> {
    let is_heading = is_all_caps(input.text) && has_section_keyword(input.text);
    (input.font_size > input.name_min_font_size
        && input.tokens <= 4
        && !is_heading
        && !has_email(input.text))
    .then_some("name")
}

fn contact_rule(input: &RuleInput) -> Option<&'static str> {
    if input.in_referees() {
        return None;
    }
    match (has_email(input.text), has_phone(input.text)) {
        (true, true) => Some("email_phone"),
        (true, false) => Some("email"),
        (false, true) => Some("phone"),
        (false, false) => None,
    }
}

fn section_header_rule(input: &RuleInput) -> Option<&'static str> {
    (is_all_caps(input.text) && has_section_keyword(input.text))
        .then(|| section_category(input.text).as_str())
}

fn education_rule(input: &RuleInput) -> Option<&'static str> {
    if contains_keyword(&input.normalized, INSTITUTION_KEYWORDS) {
        Some("institution")
    } else if contains_keyword(&input.normalized, DEGREE_KEYWORDS) {
        Some("degree")
    } else {
        None
    }
}

fn experience_rule(input: &RuleInput) -> Option<&'static str> {
    if input.in_referees() {
        return None;
    }
    if contains_keyword(&input.normalized, ROLE_KEYWORDS) {
        Some("position")
    } else if contains_keyword(&input.normalized, EMPLOYER_KEYWORDS) {
        Some("company")
    } else {
        None
    }
}

fn skills_rule(input: &RuleInput) -> Option<&'static str> {
    if !contains_keyword(&input.normalized, SKILL_KEYWORDS) {
        return None;
    }
    if input.section == Some(SectionCategory::Interests) {
        Some("interests")
    } else {
        Some("skills")
    }
}

fn referee_rule(input: &RuleInput) -> Option<&'static str> {
    if contains_keyword(&input.normalized, SENIORITY_KEYWORDS) {
        Some("name")
    } else if input.in_referees() && (has_email(input.text) || has_phone(input.text)) {
        Some("contact")
    } else {
        None
    }
}

/// Experience-shaped entries take the kind of the section they sit in.
fn retype_for_section(kind: AreaKind, section: Option<SectionCategory>) -> AreaKind {
    match (kind, section) {
        (AreaKind::Experience, Some(SectionCategory::Leadership)) => AreaKind::Leadership,
        (AreaKind::Experience, Some(SectionCategory::Volunteer)) => AreaKind::Volunteer,
        _ => kind,
    }
}

#[derive(Debug, Clone)]
pub struct RuleClassifier {
    /// Spans must be strictly larger than this to read as the candidate's name.
    pub name_min_font_size: f32,
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self {
            name_min_font_size: 14.0,
        }
    }
}

impl RuleClassifier {
    pub fn new(name_min_font_size: f32) -> Self {
        Self { name_min_font_size }
    }

    /// Classifies spans in document order. Pure: identical input always yields
    /// identical areas.
    pub fn classify_spans(&self, spans: &[TextSpan]) -> Vec<ContentArea> {
        let mut section: Option<SectionCategory> = None;
        let mut areas = Vec::new();

        for span in spans {
            let input = RuleInput::new(span, section, self.name_min_font_size);
            if input.text.is_empty() {
                continue;
            }
            let Some((rule, subtype)) = RULES
                .iter()
                .find_map(|rule| (rule.matches)(&input).map(|subtype| (rule, subtype)))
            else {
                continue;
            };

            if rule.kind == AreaKind::SectionHeader {
                section = Some(SectionCategory::parse(subtype));
            }
            let kind = retype_for_section(rule.kind, section);
            let field = form_field(kind, subtype).map(str::to_string);
            if let Some(area) = ContentArea::from_span(span, kind, subtype, field) {
                areas.push(area);
            }
        }
        areas
    }
}

#[async_trait]
impl ClassificationStrategy for RuleClassifier {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn classify(
        &self,
        spans: &[TextSpan],
        _template_name: &str,
    ) -> Result<Vec<ContentArea>, ClassificationError> {
        Ok(self.classify_spans(spans))
    }
}
