//! Fenced code block detection.
//!
//! Used by the scanner when `skip_code_fences` is enabled: tag directives
//! inside ``` / ~~~ fences are documentation, not directives.

use std::ops::Range;

/// Open fence being tracked across lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenFence {
    marker: char,
    length: usize,
    start: usize,
}

/// Byte ranges of fenced code blocks in `input`, fence lines included.
///
/// An unclosed fence runs to the end of the input (CommonMark behavior).
pub fn fenced_code_ranges(input: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    let mut open: Option<OpenFence> = None;
    let mut offset = 0;

    for line in input.split_inclusive('\n') {
        let line_start = offset;
        offset += line.len();
        let body = line.trim_end_matches(['\n', '\r']);

        let (visual_indent, byte_offset) = leading_whitespace_info(body);
        // CommonMark: 4+ columns of indentation is an indented code block
        if visual_indent > 3 {
            continue;
        }
        let after_indent = &body[byte_offset..];

        match open {
            None => {
                if let Some((marker, length)) = fence_marker(after_indent) {
                    open = Some(OpenFence {
                        marker,
                        length,
                        start: line_start,
                    });
                }
            }
            Some(fence) => {
                if let Some((marker, length)) = fence_marker(after_indent)
                    && marker == fence.marker
                    && length >= fence.length
                    && after_indent[length..].trim().is_empty()
                {
                    ranges.push(fence.start..offset);
                    open = None;
                }
            }
        }
    }

    if let Some(fence) = open {
        ranges.push(fence.start..input.len());
    }

    ranges
}

/// Returns (visual_columns, byte_offset) for leading whitespace.
/// Tabs expand to the next 4-column boundary.
fn leading_whitespace_info(line: &str) -> (usize, usize) {
    let mut col = 0;
    let mut bytes = 0;
    for b in line.bytes() {
        match b {
            b' ' => {
                col += 1;
                bytes += 1;
            }
            b'\t' => {
                col += 4 - (col % 4);
                bytes += 1;
            }
            _ => break,
        }
    }
    (col, bytes)
}

/// Marker character and run length when `text` starts with 3+ backticks or tildes.
fn fence_marker(text: &str) -> Option<(char, usize)> {
    let first = text.chars().next()?;
    if first != '`' && first != '~' {
        return None;
    }
    let run_len = text.chars().take_while(|c| *c == first).count();
    (run_len >= 3).then_some((first, run_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_backtick_fence() {
        let input = "a\n```js\n{% x %}\n```\nb";
        let ranges = fenced_code_ranges(input);
        assert_eq!(ranges.len(), 1);
        assert_eq!(&input[ranges[0].clone()], "```js\n{% x %}\n```\n");
    }

    #[test]
    fn unclosed_fence_runs_to_end() {
        let input = "~~~\n{% x %}";
        assert_eq!(fenced_code_ranges(input), vec![0..input.len()]);
    }

    #[test]
    fn mismatched_marker_does_not_close() {
        let input = "~~~\n```\n{% x %}\n~~~\nafter";
        let ranges = fenced_code_ranges(input);
        assert_eq!(&input[ranges[0].clone()], "~~~\n```\n{% x %}\n~~~\n");
    }

    #[test]
    fn shorter_closer_does_not_close() {
        let input = "````\n```\n````\n";
        let ranges = fenced_code_ranges(input);
        assert_eq!(ranges, vec![0..input.len()]);
    }

    #[test]
    fn closer_with_info_string_does_not_close() {
        let input = "```\ncode\n```js\n```\n";
        let ranges = fenced_code_ranges(input);
        assert_eq!(ranges, vec![0..input.len()]);
    }

    #[test]
    fn deeply_indented_fence_not_opened() {
        assert!(fenced_code_ranges("    ```js\n{% x %}\n").is_empty());
        assert!(fenced_code_ranges("\t```js\n{% x %}\n").is_empty());
    }

    #[test]
    fn requires_three_markers() {
        assert!(fenced_code_ranges("``\n{% x %}\n``").is_empty());
    }
}
