// LLM prompt constants for region classification.

/// System prompt for span classification. Asks for bare JSON.
pub const CLASSIFY_SYSTEM: &str = "You are an expert at reading resume layouts. \
    You label fragments of text extracted from a resume template with the \
    form field each fragment stands for. \
    Respond with valid JSON only: no prose, no markdown code fences.";

/// Classification prompt template. Replace `{template_name}` and `{spans_json}` before sending.
pub const CLASSIFY_PROMPT_TEMPLATE: &str = r#"The following text fragments were extracted, in reading order, from the resume template "{template_name}".
Each fragment has an index, its text, its font, its size in points and whether it is bold.

{spans_json}

Label every fragment that a different person's resume would replace or that introduces a section.
Return a JSON array with this EXACT schema (no extra fields):
[
  {"name": "name", "type": "header", "content": "JOHN SMITH", "confidence": 0.95, "isRequired": true}
]

TYPE OPTIONS (pick exactly one per fragment):
- "header": the candidate's name
- "contact": email address and/or phone number
- "section_header": a heading such as EDUCATION or SKILLS
- "education", "experience", "leadership", "volunteer": entries in those sections
- "skills": skill or interest lists
- "referee": a referee's name or contact details

NAME OPTIONS by type:
- header: "name"
- contact: "email", "phone", or "email_phone" when both appear in one fragment
- education: "institution" or "degree"
- experience, leadership, volunteer: "position" or "company"
- skills: "skills" or "interests"
- referee: "name" or "contact"
- section_header: the lowercase section, e.g. "education"

Rules:
- "content" MUST repeat the fragment text exactly as given.
- Omit fragments that are decoration, dates, locations or boilerplate.
- "confidence" is a number between 0 and 1."#;
