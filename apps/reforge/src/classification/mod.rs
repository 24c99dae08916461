//! Region classification: assigns each extracted span a semantic content area.
//!
//! Two interchangeable strategies implement `ClassificationStrategy`:
//! - `RemoteClassifier`: the text-classification service behind `LlmClient`.
//! - `RuleClassifier`: deterministic first-match-wins rules over keyword tables.
//!
//! `ClassifierChain` tries the remote strategy once, bounded by a fixed
//! timeout, and answers with the rules on any failure.

pub mod field_map;
pub mod keywords;
pub mod prompts;
pub mod remote;
pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::extraction::{BBox, Color, TextSpan};
use crate::llm_client::LlmError;

pub use remote::RemoteClassifier;
pub use rules::RuleClassifier;

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("classification service error: {0}")]
    Service(#[from] LlmError),

    #[error("classification timed out after {0:?}")]
    Timeout(Duration),

    #[error("unparseable classification response: {0}")]
    Unparseable(String),

    #[error("classification returned no usable areas")]
    Empty,
}

// ────────────────────────────────────────────────────────────────────────────
// Area types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    Header,
    Contact,
    SectionHeader,
    Education,
    Experience,
    Leadership,
    Volunteer,
    Skills,
    Referee,
}

impl AreaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AreaKind::Header => "header",
            AreaKind::Contact => "contact",
            AreaKind::SectionHeader => "section_header",
            AreaKind::Education => "education",
            AreaKind::Experience => "experience",
            AreaKind::Leadership => "leadership",
            AreaKind::Volunteer => "volunteer",
            AreaKind::Skills => "skills",
            AreaKind::Referee => "referee",
        }
    }

    /// Parses the loose type labels the classification service returns.
    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase().replace(['-', ' '], "_");
        let kind = match label.as_str() {
            "header" | "name" | "personal_info" => AreaKind::Header,
            "contact" | "email" | "phone" => AreaKind::Contact,
            "section_header" | "section" | "heading" => AreaKind::SectionHeader,
            "education" => AreaKind::Education,
            "experience" | "work" | "work_experience" => AreaKind::Experience,
            "leadership" | "organizations" => AreaKind::Leadership,
            "volunteer" | "volunteer_work" => AreaKind::Volunteer,
            "skills" | "skill" | "interests" => AreaKind::Skills,
            "referee" | "referees" | "reference" | "references" => AreaKind::Referee,
            _ => return None,
        };
        Some(kind)
    }

    /// Kinds whose areas feed one array field filled with N user entries.
    pub fn is_repeating(&self) -> bool {
        matches!(
            self,
            AreaKind::Education
                | AreaKind::Experience
                | AreaKind::Leadership
                | AreaKind::Volunteer
                | AreaKind::Skills
                | AreaKind::Referee
        )
    }

    /// Section a kind's fields belong to. `None` for section headers, whose
    /// section comes from their subtype.
    pub fn section(&self) -> Option<SectionCategory> {
        match self {
            AreaKind::Header | AreaKind::Contact => Some(SectionCategory::Header),
            AreaKind::SectionHeader => None,
            AreaKind::Education => Some(SectionCategory::Education),
            AreaKind::Experience => Some(SectionCategory::Experience),
            AreaKind::Leadership => Some(SectionCategory::Leadership),
            AreaKind::Volunteer => Some(SectionCategory::Volunteer),
            AreaKind::Skills => Some(SectionCategory::Skills),
            AreaKind::Referee => Some(SectionCategory::Referees),
        }
    }
}

/// Section a heading introduces. `Interests` headings share the skills section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionCategory {
    Header,
    Education,
    Experience,
    Leadership,
    Volunteer,
    Skills,
    Interests,
    Referees,
    Custom,
}

impl SectionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionCategory::Header => "header",
            SectionCategory::Education => "education",
            SectionCategory::Experience => "experience",
            SectionCategory::Leadership => "leadership",
            SectionCategory::Volunteer => "volunteer",
            SectionCategory::Skills => "skills",
            SectionCategory::Interests => "interests",
            SectionCategory::Referees => "referees",
            SectionCategory::Custom => "custom",
        }
    }

    pub fn parse(label: &str) -> Self {
        match label {
            "header" => SectionCategory::Header,
            "education" => SectionCategory::Education,
            "experience" => SectionCategory::Experience,
            "leadership" => SectionCategory::Leadership,
            "volunteer" => SectionCategory::Volunteer,
            "skills" => SectionCategory::Skills,
            "interests" => SectionCategory::Interests,
            "referees" => SectionCategory::Referees,
            _ => SectionCategory::Custom,
        }
    }

    /// Schema section id this category renders into.
    pub fn section_id(&self) -> &'static str {
        match self {
            SectionCategory::Interests => SectionCategory::Skills.as_str(),
            other => other.as_str(),
        }
    }
}

/// Visual style captured from the source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleSnapshot {
    pub font_name: String,
    pub font_size: f32,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
}

impl From<&TextSpan> for StyleSnapshot {
    fn from(span: &TextSpan) -> Self {
        Self {
            font_name: span.font_name.clone(),
            font_size: span.font_size,
            color: span.color,
            bold: span.flags.bold,
            italic: span.flags.italic,
        }
    }
}

/// A classified region of the template mapped to a target form field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentArea {
    pub area_type: AreaKind,
    pub subtype: String,
    pub source_text: String,
    pub bbox: BBox,
    pub style: StyleSnapshot,
    /// Dotted path, or several space-joined paths for composite fields.
    /// `None` for section headers, which anchor sections but are never replaced.
    pub form_field: Option<String>,
    pub page: usize,
    /// Reported by the remote classifier; informational only.
    pub confidence: Option<f32>,
    pub is_required: bool,
}

impl ContentArea {
    /// Builds an area from a span. Returns `None` when the span has no text.
    pub fn from_span(
        span: &TextSpan,
        area_type: AreaKind,
        subtype: impl Into<String>,
        form_field: Option<String>,
    ) -> Option<Self> {
        let source_text = span.text.trim();
        if source_text.is_empty() {
            return None;
        }
        Some(Self {
            area_type,
            subtype: subtype.into(),
            source_text: source_text.to_string(),
            bbox: span.bbox,
            style: StyleSnapshot::from(span),
            form_field,
            page: span.page,
            confidence: None,
            is_required: matches!(area_type, AreaKind::Header | AreaKind::Contact),
        })
    }

    /// The individual dotted paths of a (possibly composite) form field.
    pub fn field_paths(&self) -> Vec<&str> {
        self.form_field
            .as_deref()
            .map(|f| f.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Section category this area belongs to.
    pub fn section(&self) -> SectionCategory {
        self.area_type
            .section()
            .unwrap_or_else(|| SectionCategory::parse(&self.subtype))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Strategy seam
// ────────────────────────────────────────────────────────────────────────────

/// One way of turning spans into content areas.
#[async_trait]
pub trait ClassificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(
        &self,
        spans: &[TextSpan],
        template_name: &str,
    ) -> Result<Vec<ContentArea>, ClassificationError>;
}

/// Result of a classification run, including which strategy produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationOutcome {
    pub areas: Vec<ContentArea>,
    pub strategy: String,
    /// Why the remote strategy was not used, when it was configured.
    pub fallback_reason: Option<String>,
}

/// Remote-first resolver with a deterministic fallback.
#[derive(Clone)]
pub struct ClassifierChain {
    remote: Option<Arc<dyn ClassificationStrategy>>,
    rules: RuleClassifier,
    timeout: Duration,
}

impl ClassifierChain {
    pub fn new(
        remote: Option<Arc<dyn ClassificationStrategy>>,
        rules: RuleClassifier,
        timeout: Duration,
    ) -> Self {
        Self {
            remote,
            rules,
            timeout,
        }
    }

    pub fn rules_only(rules: RuleClassifier) -> Self {
        Self::new(None, rules, Duration::from_secs(0))
    }

    /// Classifies `spans`. Never fails: any remote error, empty answer or
    /// timeout routes to the rule classifier.
    pub async fn classify(&self, spans: &[TextSpan], template_name: &str) -> ClassificationOutcome {
        let mut fallback_reason = None;

        if let Some(remote) = &self.remote {
            let attempt = tokio::time::timeout(self.timeout, remote.classify(spans, template_name));
            let error = match attempt.await {
                Ok(Ok(areas)) if !areas.is_empty() => {
                    info!(
                        "Classified {} areas for '{template_name}' via {}",
                        areas.len(),
                        remote.name()
                    );
                    return ClassificationOutcome {
                        areas,
                        strategy: remote.name().to_string(),
                        fallback_reason: None,
                    };
                }
                Ok(Ok(_)) => ClassificationError::Empty,
                Ok(Err(e)) => e,
                Err(_) => ClassificationError::Timeout(self.timeout),
            };
            warn!("Remote classification failed for '{template_name}', using rules: {error}");
            fallback_reason = Some(error.to_string());
        }

        let areas = self.rules.classify_spans(spans);
        info!(
            "Classified {} areas for '{template_name}' via {}",
            areas.len(),
            self.rules.name()
        );
        ClassificationOutcome {
            areas,
            strategy: self.rules.name().to_string(),
            fallback_reason,
        }
    }
}
