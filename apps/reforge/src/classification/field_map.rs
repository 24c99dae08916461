//! Static `(kind, subtype) → form field` lookup.
//!
//! Composite targets are several dotted paths joined by one space; the
//! reconstructor resolves each and concatenates the values with a space.

use super::AreaKind;

const FIELD_MAP: &[(AreaKind, &str, &str)] = &[
    (
        AreaKind::Header,
        "name",
        "personalInfo.firstName personalInfo.lastName",
    ),
    (AreaKind::Contact, "email", "personalInfo.email"),
    (AreaKind::Contact, "phone", "personalInfo.phone"),
    (
        AreaKind::Contact,
        "email_phone",
        "personalInfo.email personalInfo.phone",
    ),
    (AreaKind::Education, "institution", "education.institution"),
    (AreaKind::Education, "degree", "education.degree"),
    (AreaKind::Experience, "position", "experience.position"),
    (AreaKind::Experience, "company", "experience.company"),
    (AreaKind::Leadership, "position", "leadership.role"),
    (AreaKind::Leadership, "company", "leadership.organization"),
    (AreaKind::Volunteer, "position", "volunteer.role"),
    (AreaKind::Volunteer, "company", "volunteer.organization"),
    (AreaKind::Skills, "skills", "skills.items"),
    (AreaKind::Skills, "interests", "skills.items"),
    (AreaKind::Referee, "name", "referees.name"),
    (AreaKind::Referee, "contact", "referees.email"),
];

/// Target form field for a classified area. Section headers and unknown
/// subtypes map to nothing.
pub fn form_field(kind: AreaKind, subtype: &str) -> Option<&'static str> {
    FIELD_MAP
        .iter()
        .find(|(k, s, _)| *k == kind && *s == subtype)
        .map(|(_, _, path)| *path)
}

/// Fallback subtype for a kind when a remote answer names none we know.
pub fn default_subtype(kind: AreaKind) -> &'static str {
    match kind {
        AreaKind::Header => "name",
        AreaKind::Contact => "email",
        AreaKind::SectionHeader => "custom",
        AreaKind::Education => "institution",
        AreaKind::Experience | AreaKind::Leadership | AreaKind::Volunteer => "position",
        AreaKind::Skills => "skills",
        AreaKind::Referee => "name",
    }
}
