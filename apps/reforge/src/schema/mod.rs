//! FormSchema: the declarative description of a template's fields and
//! sections. Drives both the fill-in form and the reconstructor.
//!
//! Persisted as JSON keyed by template id. A written version is never
//! mutated; re-ingesting a template writes the next version.

pub mod builder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classification::{ContentArea, StyleSnapshot};
use crate::extraction::BBox;

pub use builder::SchemaBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    Textarea,
    Array,
    Select,
}

/// One sub-field of an array field's item schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

impl ItemField {
    pub fn new(name: &str, kind: FieldKind, required: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    /// Dotted path into user data (`personalInfo.email`) or, for array
    /// fields, the array's key (`experience`).
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    /// Regex the value must match, when the kind has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<String>,
    /// Owning section id.
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSnapshot>,
    /// Ordered item schema; empty unless `kind == Array`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_schema: Vec<ItemField>,
}

impl FormField {
    pub fn is_array(&self) -> bool {
        self.kind == FieldKind::Array
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<StyleSnapshot>,
    /// Where the section's heading (or first entry) sits on the template.
    /// Repeating entries are laid out below it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<BBox>,
    pub page: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub total_fields: usize,
    pub total_sections: usize,
    pub required_fields: usize,
    pub content_area_count: usize,
    /// Classification strategy that produced the areas.
    pub strategy: String,
    /// True for the default schema substituted when the template was unreadable.
    pub degraded: bool,
}

impl SchemaMetadata {
    /// Computes every count from the final collections.
    pub fn aggregate(
        fields: &[FormField],
        sections: &[Section],
        content_areas: &[ContentArea],
        strategy: &str,
        degraded: bool,
    ) -> Self {
        Self {
            total_fields: fields.len(),
            total_sections: sections.len(),
            required_fields: fields.iter().filter(|f| f.required).count(),
            content_area_count: content_areas.len(),
            strategy: strategy.to_string(),
            degraded,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSchema {
    pub template_id: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub fields: Vec<FormField>,
    pub content_areas: Vec<ContentArea>,
    pub metadata: SchemaMetadata,
}

impl FormSchema {
    /// Default schema offered when a template cannot be read.
    pub fn fallback(template_id: &str) -> Self {
        SchemaBuilder::new().fallback(template_id)
    }

    pub fn field(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn section(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Areas replaced one value at a time (name, contact details).
    pub fn scalar_areas(&self) -> impl Iterator<Item = &ContentArea> {
        self.content_areas
            .iter()
            .filter(|a| a.form_field.is_some() && !a.area_type.is_repeating())
    }

    /// Areas belonging to a repeating section, in document order.
    pub fn section_areas<'a>(
        &'a self,
        section_id: &'a str,
    ) -> impl Iterator<Item = &'a ContentArea> {
        self.content_areas
            .iter()
            .filter(move |a| a.area_type.is_repeating() && a.section().section_id() == section_id)
    }

    /// Sections that hold repeating entries, in canonical order.
    pub fn repeating_sections(&self) -> impl Iterator<Item = (&Section, &FormField)> {
        self.sections.iter().filter_map(move |section| {
            self.fields
                .iter()
                .find(|f| f.is_array() && f.section == section.id)
                .map(|field| (section, field))
        })
    }
}
