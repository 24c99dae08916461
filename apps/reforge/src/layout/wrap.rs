//! Greedy word wrap used when a replacement value is longer than its box.
//!
//! Line capacity is estimated in characters, not glyph widths: the original
//! box width divided by an average character width at the field's font size.

/// Estimated characters that fit on one line of `box_width` points.
///
/// Never returns less than `min_chars` so a degenerate box still wraps to
/// something readable.
pub fn chars_per_line(
    box_width: f32,
    font_size: f32,
    avg_char_width_em: f32,
    min_chars: usize,
) -> usize {
    let char_width = font_size * avg_char_width_em;
    if char_width <= 0.0 || box_width <= 0.0 {
        return min_chars.max(1);
    }
    ((box_width / char_width).floor() as usize).max(min_chars.max(1))
}

/// Word-wraps `text` into lines of at most `max_chars` characters.
///
/// Words longer than a line are placed on their own line rather than split.
/// Returns no lines for whitespace-only input.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current_len == 0 {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= max_chars {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if current_len > 0 {
        lines.push(current);
    }
    lines
}
