//! Tag directive scanning.
//!
//! Turns a document into an ordered token stream of literal text runs and
//! tag occurrences with byte offsets. The scanner knows nothing about which
//! tags are blocks; pairing openers with closers is the matcher's job.

use std::ops::Range;

use crate::code_fence::fenced_code_ranges;
use crate::config::EngineConfig;
use crate::error::LocationCursor;
use crate::{SourceLocation, TagError};

/// Name of the built-in literal block.
pub const RAW_TAG: &str = "raw";
/// Name of the built-in literal block's end directive.
pub const END_RAW_TAG: &str = "endraw";

/// A tag directive as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagOccurrence {
    /// Tag name (first word inside the delimiters).
    pub name: String,
    /// Everything after the name, trimmed.
    pub raw_args: String,
    /// Byte offset of the opening delimiter.
    pub start: usize,
    /// Byte offset just past the closing delimiter.
    pub end: usize,
    /// Whether the name reads as an end directive (`endX`).
    ///
    /// This is lexical only: a registered tag may legitimately start with
    /// `end`, so the matcher makes the final call.
    pub is_closing: bool,
    /// Line/column of the opening delimiter.
    pub location: SourceLocation,
}

impl TagOccurrence {
    /// Name this occurrence would close, if it is an end directive.
    pub fn closes(&self) -> Option<&str> {
        if self.is_closing {
            self.name.strip_prefix("end")
        } else {
            None
        }
    }
}

/// One element of a scanned document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Literal text, as a byte range into the document.
    Text(Range<usize>),
    /// A tag directive.
    Tag(TagOccurrence),
}

/// Produces the token stream the matcher consumes.
///
/// Hosts with their own lexer can implement this to feed pre-computed tag
/// positions into the engine.
pub trait TagScanner {
    /// Scan `document` into text runs and tag occurrences, in source order.
    fn scan(&self, document: &str) -> Result<Vec<Token>, TagError>;
}

impl<F> TagScanner for F
where
    F: Fn(&str) -> Result<Vec<Token>, TagError>,
{
    fn scan(&self, document: &str) -> Result<Vec<Token>, TagError> {
        (self)(document)
    }
}

/// Default scanner for `{% name args %}` style directives.
#[derive(Debug, Clone)]
pub struct DelimiterScanner {
    open: String,
    close: String,
    skip_code_fences: bool,
}

impl Default for DelimiterScanner {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl DelimiterScanner {
    /// Build a scanner from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            open: config.open_delimiter.clone(),
            close: config.close_delimiter.clone(),
            skip_code_fences: config.skip_code_fences,
        }
    }

    /// Parse the directive starting at `start`, returning it with its body.
    fn directive_at(
        &self,
        document: &str,
        start: usize,
        cursor: &mut LocationCursor<'_>,
    ) -> Result<TagOccurrence, TagError> {
        let body_start = start + self.open.len();
        let Some(close_rel) = document[body_start..].find(&self.close) else {
            return Err(TagError::malformed(
                format!("unterminated tag: missing `{}`", self.close),
                cursor.locate(start),
            ));
        };
        let body_end = body_start + close_rel;
        let body = document[body_start..body_end].trim();
        let (name, raw_args) = match body.find(char::is_whitespace) {
            Some(split) => (&body[..split], body[split..].trim_start()),
            None => (body, ""),
        };
        if name.is_empty() {
            return Err(TagError::malformed(
                "missing tag name",
                cursor.locate(start),
            ));
        }

        Ok(TagOccurrence {
            name: name.to_string(),
            raw_args: raw_args.to_string(),
            start,
            end: body_end + self.close.len(),
            is_closing: name.starts_with("end") && name.len() > 3,
            location: cursor.locate(start),
        })
    }

    /// Find the `endraw` directive closing a raw block whose body starts at `from`.
    fn find_end_raw(
        &self,
        document: &str,
        from: usize,
        cursor: &mut LocationCursor<'_>,
    ) -> Option<TagOccurrence> {
        let mut search = from;
        while let Some(rel) = document[search..].find(&self.open) {
            let candidate = search + rel;
            match self.directive_at(document, candidate, cursor) {
                Ok(occurrence) if occurrence.name == END_RAW_TAG => return Some(occurrence),
                Ok(occurrence) => search = occurrence.end,
                Err(_) => search = candidate + self.open.len(),
            }
        }
        None
    }
}

impl TagScanner for DelimiterScanner {
    fn scan(&self, document: &str) -> Result<Vec<Token>, TagError> {
        let fences = if self.skip_code_fences {
            fenced_code_ranges(document)
        } else {
            Vec::new()
        };

        let mut cursor = LocationCursor::new(document);
        let mut tokens = Vec::new();
        let mut text_start = 0;
        let mut search = 0;

        while let Some(rel) = document[search..].find(&self.open) {
            let start = search + rel;

            if let Some(fence) = fences.iter().find(|r| r.contains(&start)) {
                search = fence.end;
                continue;
            }

            let occurrence = self.directive_at(document, start, &mut cursor)?;
            if text_start < start {
                tokens.push(Token::Text(text_start..start));
            }

            if occurrence.name == RAW_TAG {
                let Some(end_raw) = self.find_end_raw(document, occurrence.end, &mut cursor) else {
                    return Err(TagError::malformed(
                        "unclosed raw block: expected `endraw`",
                        occurrence.location,
                    ));
                };
                if occurrence.end < end_raw.start {
                    tokens.push(Token::Text(occurrence.end..end_raw.start));
                }
                text_start = end_raw.end;
                search = end_raw.end;
                continue;
            }

            text_start = occurrence.end;
            search = occurrence.end;
            tokens.push(Token::Tag(occurrence));
        }

        if text_start < document.len() {
            tokens.push(Token::Text(text_start..document.len()));
        }

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(tokens: &[Token]) -> Vec<(&str, &str, bool)> {
        tokens
            .iter()
            .filter_map(|t| match t {
                Token::Tag(o) => Some((o.name.as_str(), o.raw_args.as_str(), o.is_closing)),
                Token::Text(_) => None,
            })
            .collect()
    }

    #[test]
    fn scans_inline_tag_with_args() {
        let doc = "a {% test foo.bar | x > fn(a, b) %} b";
        let tokens = DelimiterScanner::default().scan(doc).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::Text(0..2));
        assert_eq!(tags(&tokens), vec![("test", "foo.bar | x > fn(a, b)", false)]);
        let Token::Text(tail) = &tokens[2] else {
            panic!("expected trailing text");
        };
        assert_eq!(&doc[tail.clone()], " b");
    }

    #[test]
    fn marks_end_directives() {
        let doc = "{% test %}x{% endtest %}";
        let tokens = DelimiterScanner::default().scan(doc).unwrap();
        assert_eq!(tags(&tokens), vec![("test", "", false), ("endtest", "", true)]);
        let Token::Tag(end) = &tokens[2] else {
            panic!("expected end tag");
        };
        assert_eq!(end.closes(), Some("test"));
    }

    #[test]
    fn bare_end_is_not_a_closer() {
        let tokens = DelimiterScanner::default().scan("{% end %}").unwrap();
        assert_eq!(tags(&tokens), vec![("end", "", false)]);
    }

    #[test]
    fn raw_block_becomes_text() {
        let doc = "{% raw %}{% test %}{% endraw %}!";
        let tokens = DelimiterScanner::default().scan(doc).unwrap();
        assert!(tags(&tokens).is_empty());
        let text: String = tokens
            .iter()
            .map(|t| match t {
                Token::Text(r) => &doc[r.clone()],
                Token::Tag(_) => unreachable!(),
            })
            .collect();
        assert_eq!(text, "{% test %}!");
    }

    #[test]
    fn unclosed_raw_is_malformed() {
        let err = DelimiterScanner::default().scan("{% raw %} x").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedTemplate);
    }

    #[test]
    fn unterminated_tag_reports_position() {
        let err = DelimiterScanner::default().scan("ok\n  {% test").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedTemplate);
        assert_eq!(err.location(), Some(&SourceLocation::new(2, 3)));
    }

    #[test]
    fn empty_tag_is_malformed() {
        let err = DelimiterScanner::default().scan("{%   %}").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::MalformedTemplate);
    }

    #[test]
    fn skips_code_fences_when_configured() {
        let config = EngineConfig {
            skip_code_fences: true,
            ..EngineConfig::default()
        };
        let doc = "```\n{% test %}\n```\n{% test %}";
        let tokens = DelimiterScanner::from_config(&config).scan(doc).unwrap();
        assert_eq!(tags(&tokens).len(), 1);
        assert_eq!(tokens[0], Token::Text(0..19));

        let tokens = DelimiterScanner::default().scan(doc).unwrap();
        assert_eq!(tags(&tokens).len(), 2);
    }

    #[test]
    fn locations_stay_exact_across_many_tags() {
        let doc = "lorem ipsum é {% t a %}\n".repeat(5_000);
        let tokens = DelimiterScanner::default().scan(&doc).unwrap();
        let occurrences: Vec<&TagOccurrence> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Tag(o) => Some(o),
                Token::Text(_) => None,
            })
            .collect();
        assert_eq!(occurrences.len(), 5_000);
        for (i, o) in occurrences.iter().enumerate() {
            assert_eq!(o.location, SourceLocation::new(i + 1, 15));
        }
    }

    #[test]
    fn custom_delimiters() {
        let config = EngineConfig {
            open_delimiter: "<%".into(),
            close_delimiter: "%>".into(),
            ..EngineConfig::default()
        };
        let tokens = DelimiterScanner::from_config(&config)
            .scan("{% no %}<% yes a %>")
            .unwrap();
        assert_eq!(tags(&tokens), vec![("yes", "a", false)]);
    }
}
