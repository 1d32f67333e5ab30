//! Block matching.
//!
//! Pairs each block tag's opening occurrence with its end directive using an
//! explicit stack, producing a tree of text runs, inline tags, and matched
//! blocks. The whole document is matched before any handler runs, so
//! structural errors and unknown tags fail the render up front.

use std::ops::Range;

use crate::registry::Registry;
use crate::scan::{TagOccurrence, Token};
use crate::{SourceLocation, TagError};

/// A node of the matched document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Literal text, as a byte range into the document.
    Text(Range<usize>),
    /// A tag with no content.
    Inline(TagOccurrence),
    /// A block tag with its end directive and nested nodes.
    Block(MatchedBlock),
}

/// A block tag paired with its end directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedBlock {
    /// The `{% name args %}` occurrence.
    pub opening: TagOccurrence,
    /// The `{% endname %}` occurrence.
    pub closing: TagOccurrence,
    /// Nodes between the two directives, in source order.
    pub children: Vec<Node>,
}

impl MatchedBlock {
    /// Byte range of the raw body, between the two directives.
    pub fn inner_range(&self) -> Range<usize> {
        self.opening.end..self.closing.start
    }

    /// Raw body text, before nested tags are expanded.
    pub fn inner_text<'a>(&self, document: &'a str) -> &'a str {
        &document[self.inner_range()]
    }
}

struct Frame {
    opening: TagOccurrence,
    children: Vec<Node>,
}

/// Build the document tree from a token stream.
pub fn match_blocks(tokens: Vec<Token>, registry: &Registry) -> Result<Vec<Node>, TagError> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        let occurrence = match token {
            Token::Text(range) => {
                current(&mut root, &mut stack).push(Node::Text(range));
                continue;
            }
            Token::Tag(occurrence) => occurrence,
        };

        let closes_top = match (occurrence.closes(), stack.last()) {
            (Some(target), Some(frame)) => frame.opening.name == target,
            _ => false,
        };

        if closes_top {
            if let Some(frame) = stack.pop() {
                let block = MatchedBlock {
                    opening: frame.opening,
                    closing: occurrence,
                    children: frame.children,
                };
                current(&mut root, &mut stack).push(Node::Block(block));
            }
            continue;
        }

        match registry.get(&occurrence.name) {
            Some(definition) if definition.is_block() => stack.push(Frame {
                opening: occurrence,
                children: Vec::new(),
            }),
            Some(_) => current(&mut root, &mut stack).push(Node::Inline(occurrence)),
            None if occurrence.is_closing => {
                return Err(stray_end_tag(&occurrence, stack.last()));
            }
            None => {
                return Err(TagError::unknown_tag(occurrence.name, occurrence.location));
            }
        }
    }

    if let Some(frame) = stack.pop() {
        return Err(TagError::malformed(
            format!(
                "unclosed block tag `{}`: expected `end{}`",
                frame.opening.name, frame.opening.name
            ),
            frame.opening.location,
        ));
    }

    Ok(root)
}

fn current<'a>(root: &'a mut Vec<Node>, stack: &'a mut [Frame]) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.children,
        None => root,
    }
}

fn stray_end_tag(occurrence: &TagOccurrence, open: Option<&Frame>) -> TagError {
    let location: SourceLocation = occurrence.location.clone();
    match open {
        Some(frame) => TagError::malformed(
            format!(
                "mismatched end tag `{}`: expected `end{}` to close the block opened at {}",
                occurrence.name, frame.opening.name, frame.opening.location
            ),
            location,
        ),
        None => TagError::malformed(
            format!("unexpected end tag `{}`: no open block", occurrence.name),
            location,
        ),
    }
}
