//! Lenient JSON extraction from model output.
//!
//! Models asked for JSON sometimes wrap it in markdown fences or prose.
//! [`extract_json`] tries, in order: the raw text, the contents of a fenced
//! block, and the first balanced top-level `{…}` or `[…]` span.

use serde_json::Value;

/// Pull the first parseable JSON value out of `response`.
pub fn extract_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(inner) = strip_fence(trimmed) {
        if let Ok(value) = serde_json::from_str(inner.trim()) {
            return Some(value);
        }
    }

    for open in ['{', '['] {
        if let Some(span) = balanced_span(trimmed, open) {
            if let Ok(value) = serde_json::from_str(span) {
                return Some(value);
            }
        }
    }

    None
}

/// Contents of a ```json … ``` (or plain ```) fence, if present.
fn strip_fence(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// The first balanced `{…}`/`[…]` span, ignoring brackets inside strings.
fn balanced_span(text: &str, open: char) -> Option<&str> {
    let close = if open == '{' { '}' } else { ']' };
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}
