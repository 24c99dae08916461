//! SchemaBuilder: groups classified areas into a FormSchema.

use chrono::Utc;
use tracing::debug;

use super::{FieldKind, FormField, FormSchema, ItemField, SchemaMetadata, Section};
use crate::classification::{AreaKind, ContentArea, SectionCategory};

pub const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";
pub const PHONE_PATTERN: &str = r"^\+?[0-9][0-9\s().-]{6,}$";

/// Sections in the order they are emitted, whatever the page order.
pub const CANONICAL_SECTIONS: &[SectionCategory] = &[
    SectionCategory::Header,
    SectionCategory::Education,
    SectionCategory::Experience,
    SectionCategory::Leadership,
    SectionCategory::Volunteer,
    SectionCategory::Skills,
    SectionCategory::Referees,
];

/// Fixed item schema for each repeating section.
pub fn item_schema(section: SectionCategory) -> Vec<ItemField> {
    use FieldKind::{Email, Tel, Text, Textarea};
    let fields: &[(&str, FieldKind, bool)] = match section {
        SectionCategory::Experience => &[
            ("company", Text, true),
            ("position", Text, true),
            ("location", Text, false),
            ("dates", Text, false),
            ("responsibilities", Textarea, false),
        ],
        SectionCategory::Education => &[
            ("institution", Text, true),
            ("degree", Text, true),
            ("location", Text, false),
            ("dates", Text, false),
            ("details", Textarea, false),
        ],
        SectionCategory::Leadership | SectionCategory::Volunteer => &[
            ("organization", Text, true),
            ("role", Text, true),
            ("dates", Text, false),
            ("description", Textarea, false),
        ],
        SectionCategory::Skills | SectionCategory::Interests => {
            &[("category", Text, false), ("items", Textarea, true)]
        }
        SectionCategory::Referees => &[
            ("name", Text, true),
            ("position", Text, false),
            ("organization", Text, false),
            ("email", Email, false),
            ("phone", Tel, false),
        ],
        SectionCategory::Header | SectionCategory::Custom => &[],
    };
    fields
        .iter()
        .map(|(name, kind, required)| ItemField::new(name, *kind, *required))
        .collect()
}

fn default_title(section: SectionCategory) -> &'static str {
    match section {
        SectionCategory::Header => "Personal Information",
        SectionCategory::Education => "Education",
        SectionCategory::Experience => "Professional Experience",
        SectionCategory::Leadership => "Leadership",
        SectionCategory::Volunteer => "Volunteer Work",
        SectionCategory::Skills | SectionCategory::Interests => "Skills",
        SectionCategory::Referees => "Referees",
        SectionCategory::Custom => "Other",
    }
}

fn scalar(
    name: &str,
    label: &str,
    kind: FieldKind,
    required: bool,
    area: Option<&ContentArea>,
) -> FormField {
    let validation = match kind {
        FieldKind::Email => Some(EMAIL_PATTERN.to_string()),
        FieldKind::Tel => Some(PHONE_PATTERN.to_string()),
        _ => None,
    };
    FormField {
        name: name.to_string(),
        label: label.to_string(),
        kind,
        required,
        validation,
        section: SectionCategory::Header.section_id().to_string(),
        style: area.map(|a| a.style.clone()),
        item_schema: Vec::new(),
    }
}

fn array(section: SectionCategory, area: Option<&ContentArea>) -> FormField {
    FormField {
        name: section.section_id().to_string(),
        label: default_title(section).to_string(),
        kind: FieldKind::Array,
        required: false,
        validation: None,
        section: section.section_id().to_string(),
        style: area.map(|a| a.style.clone()),
        item_schema: item_schema(section),
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder;

impl SchemaBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Builds a schema from classified areas. Sections with no detected
    /// content are omitted; that is never an error.
    pub fn build(
        &self,
        template_id: &str,
        version: u32,
        areas: Vec<ContentArea>,
        strategy: &str,
    ) -> FormSchema {
        let mut sections = Vec::new();
        let mut fields = Vec::new();

        for (order, category) in CANONICAL_SECTIONS.iter().enumerate() {
            let id = category.section_id();
            let heading = areas
                .iter()
                .find(|a| a.area_type == AreaKind::SectionHeader && a.section().section_id() == id);
            let members: Vec<&ContentArea> = areas
                .iter()
                .filter(|a| a.area_type != AreaKind::SectionHeader && a.section().section_id() == id)
                .collect();

            if heading.is_none() && members.is_empty() {
                debug!("No content detected for section '{id}', omitting");
                continue;
            }

            if *category == SectionCategory::Header {
                fields.extend(header_fields(&members));
            } else {
                fields.push(array(*category, members.first().copied()));
            }

            let anchor_area = heading.or(members.first().copied());
            sections.push(Section {
                id: id.to_string(),
                title: heading
                    .map(|h| h.source_text.clone())
                    .unwrap_or_else(|| default_title(*category).to_string()),
                order: order as u32,
                style: anchor_area.map(|a| a.style.clone()),
                anchor: anchor_area.map(|a| a.bbox),
                page: anchor_area.map(|a| a.page).unwrap_or(0),
            });
        }

        let metadata = SchemaMetadata::aggregate(&fields, &sections, &areas, strategy, false);
        FormSchema {
            template_id: template_id.to_string(),
            version,
            created_at: Utc::now(),
            sections,
            fields,
            content_areas: areas,
            metadata,
        }
    }

    /// Default schema for templates that could not be read: personal
    /// details plus education, experience and skills.
    pub fn fallback(&self, template_id: &str) -> FormSchema {
        let mut fields = vec![
            scalar("personalInfo.firstName", "First Name", FieldKind::Text, true, None),
            scalar("personalInfo.lastName", "Last Name", FieldKind::Text, true, None),
            scalar("personalInfo.email", "Email", FieldKind::Email, true, None),
            scalar("personalInfo.phone", "Phone", FieldKind::Tel, false, None),
        ];
        let mut sections = vec![Section {
            id: SectionCategory::Header.section_id().to_string(),
            title: default_title(SectionCategory::Header).to_string(),
            order: 0,
            style: None,
            anchor: None,
            page: 0,
        }];
        for category in [
            SectionCategory::Education,
            SectionCategory::Experience,
            SectionCategory::Skills,
        ] {
            fields.push(array(category, None));
            sections.push(Section {
                id: category.section_id().to_string(),
                title: default_title(category).to_string(),
                order: canonical_order(category),
                style: None,
                anchor: None,
                page: 0,
            });
        }

        let metadata = SchemaMetadata::aggregate(&fields, &sections, &[], "fallback", true);
        FormSchema {
            template_id: template_id.to_string(),
            version: 0,
            created_at: Utc::now(),
            sections,
            fields,
            content_areas: Vec::new(),
            metadata,
        }
    }
}

fn canonical_order(category: SectionCategory) -> u32 {
    CANONICAL_SECTIONS
        .iter()
        .position(|c| c.section_id() == category.section_id())
        .unwrap_or(CANONICAL_SECTIONS.len()) as u32
}

/// Name and contact areas become scalar fields under the header section.
fn header_fields(members: &[&ContentArea]) -> Vec<FormField> {
    let find = |kind: AreaKind, subtypes: &[&str]| {
        members
            .iter()
            .find(|a| a.area_type == kind && subtypes.contains(&a.subtype.as_str()))
            .copied()
    };
    let mut fields = Vec::new();

    if let Some(name) = find(AreaKind::Header, &["name"]) {
        fields.push(scalar("personalInfo.firstName", "First Name", FieldKind::Text, true, Some(name)));
        fields.push(scalar("personalInfo.lastName", "Last Name", FieldKind::Text, true, Some(name)));
    }
    if let Some(email) = find(AreaKind::Contact, &["email", "email_phone"]) {
        fields.push(scalar("personalInfo.email", "Email", FieldKind::Email, true, Some(email)));
    }
    if let Some(phone) = find(AreaKind::Contact, &["phone", "email_phone"]) {
        fields.push(scalar("personalInfo.phone", "Phone", FieldKind::Tel, false, Some(phone)));
    }
    fields
}
