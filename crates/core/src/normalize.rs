//! Block content normalization.
//!
//! Block bodies are captured verbatim between `{% name %}` and `{% endname %}`,
//! so they carry the directive's own line breaks and whatever indentation the
//! block sits at. Handlers get the body with both removed.

use std::borrow::Cow;

/// Normalize a block body before it reaches the handler.
///
/// Strips the indentation shared by all non-blank lines, then drops
/// whitespace-only lines at both ends. Normalizing twice is a no-op.
pub fn normalize_block_content(raw: &str) -> String {
    let dedented = strip_indent(raw);
    trim_blank_lines(&dedented).to_string()
}

/// Remove the minimum leading indentation of non-blank lines from every line.
///
/// Blank lines lose at most that much leading whitespace.
pub fn strip_indent(text: &str) -> Cow<'_, str> {
    let indent = min_indent(text);
    if indent == 0 {
        return Cow::Borrowed(text);
    }

    let mut output = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let leading = leading_indent(line).min(indent);
        output.push_str(&line[leading..]);
    }
    Cow::Owned(output)
}

/// Drop whitespace-only lines from the start and end of `text`.
pub fn trim_blank_lines(text: &str) -> &str {
    let mut rest = text;

    while let Some(nl) = rest.find('\n') {
        if !rest[..nl].trim().is_empty() {
            break;
        }
        rest = &rest[nl + 1..];
    }

    while let Some(nl) = rest.rfind('\n') {
        if !rest[nl + 1..].trim().is_empty() {
            break;
        }
        rest = &rest[..nl];
        rest = rest.strip_suffix('\r').unwrap_or(rest);
    }

    if rest.trim().is_empty() { "" } else { rest }
}

fn min_indent(text: &str) -> usize {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(leading_indent)
        .min()
        .unwrap_or(0)
}

/// Count of leading spaces and tabs (one byte each).
fn leading_indent(line: &str) -> usize {
    line.bytes()
        .take_while(|b| *b == b' ' || *b == b'\t')
        .count()
}
