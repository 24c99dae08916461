//! Keyword tables for the rule-based classifier. Pure data: the rules in
//! `rules.rs` only ever read these through `contains_keyword`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::classification::SectionCategory;

/// All-caps headings recognised as section headers.
pub const SECTION_VOCABULARY: &[&str] = &[
    "EDUCATION",
    "PROFESSIONAL EXPERIENCE",
    "LEADERSHIP",
    "ORGANIZATIONS",
    "VOLUNTEER WORK",
    "SKILLS",
    "INTERESTS",
    "REFEREES",
];

/// Heading keyword → section category. First match wins.
pub const SECTION_CATEGORIES: &[(&str, SectionCategory)] = &[
    ("EDUCATION", SectionCategory::Education),
    ("EXPERIENCE", SectionCategory::Experience),
    ("LEADERSHIP", SectionCategory::Leadership),
    ("ORGANIZATIONS", SectionCategory::Leadership),
    ("VOLUNTEER", SectionCategory::Volunteer),
    ("SKILLS", SectionCategory::Skills),
    ("INTERESTS", SectionCategory::Interests),
    ("REFEREES", SectionCategory::Referees),
    ("REFERENCES", SectionCategory::Referees),
];

pub const INSTITUTION_KEYWORDS: &[&str] = &[
    "university",
    "college",
    "institute",
    "institution",
    "school",
    "academy",
    "polytechnic",
];

pub const DEGREE_KEYWORDS: &[&str] = &[
    "bachelor",
    "bachelors",
    "master",
    "masters",
    "diploma",
    "degree",
    "phd",
    "doctorate",
    "certificate",
    "bsc",
    "msc",
    "mba",
    "b sc",
    "m sc",
    "kcse",
];

pub const ROLE_KEYWORDS: &[&str] = &[
    "engineer",
    "developer",
    "manager",
    "intern",
    "internship",
    "analyst",
    "consultant",
    "officer",
    "assistant",
    "director",
    "lead",
    "specialist",
    "coordinator",
    "administrator",
    "designer",
    "accountant",
    "associate",
    "supervisor",
    "president",
    "chairperson",
    "secretary",
    "treasurer",
    "captain",
    "representative",
    "volunteer",
    "mentor",
    "tutor",
];

pub const EMPLOYER_KEYWORDS: &[&str] = &[
    "ltd",
    "limited",
    "inc",
    "llc",
    "plc",
    "company",
    "corporation",
    "bank",
    "group",
    "foundation",
    "ministry",
    "agency",
    "organization",
    "organisation",
    "club",
    "society",
];

pub const SKILL_KEYWORDS: &[&str] = &[
    "python",
    "java",
    "javascript",
    "typescript",
    "rust",
    "sql",
    "excel",
    "html",
    "css",
    "react",
    "linux",
    "communication",
    "teamwork",
    "management",
    "marketing",
    "accounting",
    "data analysis",
    "microsoft office",
    "public speaking",
    "problem solving",
    "reading",
    "music",
    "football",
    "travel",
    "travelling",
    "photography",
    "chess",
    "swimming",
    "hiking",
    "cooking",
];

pub const SENIORITY_KEYWORDS: &[&str] = &[
    "dr",
    "prof",
    "professor",
    "ceo",
    "cto",
    "cfo",
    "head of",
    "hod",
    "dean",
    "lecturer",
    "supervisor",
    "principal",
    "chairman",
    "director",
    "manager",
    "referee",
];

static PHONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\+?\(?\d[\d\s().-]{5,}\d").expect("phone pattern compiles"));

/// Minimum digit count for a match to read as a phone number rather than a
/// date range such as `2019 - 2021`.
const MIN_PHONE_DIGITS: usize = 9;

/// Lowercases, replaces punctuation with spaces and pads with one space on
/// each side so keywords match whole words only.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Whole-word (or whole-phrase) match against text produced by `normalize`.
pub fn contains_keyword(normalized: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|kw| normalized.contains(&format!(" {kw} ")))
}

/// True when the text has letters and none of them are lowercase.
pub fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase)
}

pub fn has_section_keyword(text: &str) -> bool {
    let upper = text.to_uppercase();
    SECTION_VOCABULARY.iter().any(|kw| upper.contains(kw))
}

/// Heading text → category, `Custom` when nothing in the table matches.
pub fn section_category(text: &str) -> SectionCategory {
    let upper = text.to_uppercase();
    SECTION_CATEGORIES
        .iter()
        .find(|(kw, _)| upper.contains(kw))
        .map(|(_, category)| *category)
        .unwrap_or(SectionCategory::Custom)
}

pub fn has_email(text: &str) -> bool {
    text.contains('@')
}

pub fn has_phone(text: &str) -> bool {
    PHONE_PATTERN.find_iter(text).any(|m| {
        m.as_str().chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation() {
        assert_eq!(normalize("Dr. Jane, Head-of Dept"), " dr jane head of dept ");
    }

    #[test]
    fn test_keywords_match_whole_words_only() {
        let n = normalize("International Relations");
        assert!(!contains_keyword(&n, &["intern"]));
        assert!(contains_keyword(&normalize("Software Intern"), &["intern"]));
        assert!(contains_keyword(&normalize("Head of Department"), &["head of"]));
    }

    #[test]
    fn test_phone_detection_ignores_date_ranges() {
        assert!(has_phone("+254 712 345 678"));
        assert!(has_phone("(020) 555-0199 ext"));
        assert!(!has_phone("Jan 2019 - Dec 2021"));
    }

    #[test]
    fn test_section_category_table_order() {
        assert_eq!(section_category("EDUCATION"), SectionCategory::Education);
        assert_eq!(
            section_category("PROFESSIONAL EXPERIENCE"),
            SectionCategory::Experience
        );
        assert_eq!(
            section_category("CLUBS & ORGANIZATIONS"),
            SectionCategory::Leadership
        );
        assert_eq!(section_category("VOLUNTEER WORK"), SectionCategory::Volunteer);
        assert_eq!(section_category("INTERESTS"), SectionCategory::Interests);
        assert_eq!(section_category("PUBLICATIONS"), SectionCategory::Custom);
    }

    #[test]
    fn test_all_caps() {
        assert!(is_all_caps("JOHN SMITH"));
        assert!(is_all_caps("SKILLS & INTERESTS"));
        assert!(!is_all_caps("John Smith"));
        assert!(!is_all_caps("2019 - 2021"));
    }
}
