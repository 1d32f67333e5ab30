use thiserror::Error;

/// Boxed error produced by a tag handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Source location information for error reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Optional file path
    pub file: Option<String>,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location
    pub fn new(line: usize, column: usize) -> Self {
        Self {
            file: None,
            line,
            column,
        }
    }

    /// Create a source location with file information
    pub fn with_file(file: String, line: usize, column: usize) -> Self {
        Self {
            file: Some(file),
            line,
            column,
        }
    }

    /// Compute the 1-indexed line/column of a byte offset in `source`.
    ///
    /// Columns count characters, not bytes. Offsets past the end clamp to the
    /// end of the input.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        LocationCursor::new(source).locate(offset)
    }
}

/// Forward-moving line/column tracker over one source string.
///
/// Locating increasing offsets costs time proportional to the distance
/// advanced, so a scan resolves every directive position in one pass. A
/// request behind the cursor restarts from the beginning.
#[derive(Debug, Clone)]
pub(crate) struct LocationCursor<'a> {
    source: &'a str,
    offset: usize,
    line: usize,
    column: usize,
}

impl<'a> LocationCursor<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    pub(crate) fn locate(&mut self, offset: usize) -> SourceLocation {
        let offset = floor_char_boundary(self.source, offset.min(self.source.len()));
        if offset < self.offset {
            *self = Self::new(self.source);
        }
        for ch in self.source[self.offset..offset].chars() {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.offset = offset;
        SourceLocation::new(self.line, self.column)
    }
}

fn floor_char_boundary(source: &str, mut offset: usize) -> usize {
    while offset > 0 && !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// Discriminant of a [`TagError`], for callers that only need to branch on
/// the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad registration call (missing name or handler, reserved name).
    InvalidArgument,
    /// A template referenced a tag that is not registered.
    UnknownTag,
    /// Unbalanced or mismatched block nesting, or broken tag delimiters.
    MalformedTemplate,
    /// A tag handler returned or signaled an error.
    HandlerFailure,
}

/// Errors raised by tag registration and rendering.
#[derive(Debug, Error)]
pub enum TagError {
    /// Invalid registration call. Raised synchronously, never from a render.
    #[error("{message}")]
    InvalidArgument {
        /// What was wrong with the call
        message: String,
    },
    /// Render referenced an unregistered tag.
    #[error("unknown block tag: {name} (at {location})")]
    UnknownTag {
        /// Tag name as written in the template
        name: String,
        /// Source location of the tag occurrence
        location: SourceLocation,
    },
    /// Template structure could not be matched.
    #[error("Malformed template at {location}: {message}")]
    MalformedTemplate {
        /// Error message
        message: String,
        /// Source location
        location: SourceLocation,
    },
    /// A handler failed; the original error is kept as the source.
    #[error("Tag `{name}` failed at {location}: {source}")]
    HandlerFailure {
        /// Name of the failing tag
        name: String,
        /// Source location of the tag occurrence
        location: SourceLocation,
        /// Error returned or signaled by the handler
        #[source]
        source: HandlerError,
    },
}

impl TagError {
    /// Create an invalid-argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an unknown tag error with location
    pub fn unknown_tag(name: impl Into<String>, location: SourceLocation) -> Self {
        Self::UnknownTag {
            name: name.into(),
            location,
        }
    }

    /// Create a malformed template error with location
    pub fn malformed(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::MalformedTemplate {
            message: message.into(),
            location,
        }
    }

    /// Wrap a handler error
    pub fn handler_failure(
        name: impl Into<String>,
        location: SourceLocation,
        source: HandlerError,
    ) -> Self {
        Self::HandlerFailure {
            name: name.into(),
            location,
            source,
        }
    }

    /// Failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TagError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            TagError::UnknownTag { .. } => ErrorKind::UnknownTag,
            TagError::MalformedTemplate { .. } => ErrorKind::MalformedTemplate,
            TagError::HandlerFailure { .. } => ErrorKind::HandlerFailure,
        }
    }

    /// Offending tag name, for unknown tags and handler failures
    pub fn name(&self) -> Option<&str> {
        match self {
            TagError::UnknownTag { name, .. } | TagError::HandlerFailure { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }

    /// Location in the rendered document, when the error came from a render
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            TagError::InvalidArgument { .. } => None,
            TagError::UnknownTag { location, .. }
            | TagError::MalformedTemplate { location, .. }
            | TagError::HandlerFailure { location, .. } => Some(location),
        }
    }

    /// Attach a file path to the error location, if it has none yet.
    pub(crate) fn with_file(mut self, file: Option<&str>) -> Self {
        if let Some(file) = file {
            match &mut self {
                TagError::UnknownTag { location, .. }
                | TagError::MalformedTemplate { location, .. }
                | TagError::HandlerFailure { location, .. } => {
                    if location.file.is_none() {
                        location.file = Some(file.to_string());
                    }
                }
                TagError::InvalidArgument { .. } => {}
            }
        }
        self
    }
}
