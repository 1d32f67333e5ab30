#![deny(missing_docs)]
//! xtag core: extension tag registry and expansion engine.
//!
//! Hosts register named tags (`{% name args %}` or block tags closed by
//! `{% endname %}`) with synchronous or asynchronous handlers, then render
//! documents through a [`TagEngine`].
//!
//! ```
//! use xtag_core::{RenderContext, TagEngine};
//!
//! let mut engine = TagEngine::new();
//! engine
//!     .register_fn("test", |args, _content, _ctx| args.join(" "), false)
//!     .unwrap();
//!
//! let out = engine
//!     .render_blocking("{% test foo.bar | x > fn(a,b,c) < fn() %}", &RenderContext::new())
//!     .unwrap();
//! assert_eq!(out, "foo.bar | x > fn(a,b,c) < fn()");
//! ```

/// Fenced code block detection for the scanner.
pub mod code_fence;
/// Engine configuration.
pub mod config;
/// Per-render handler context.
pub mod context;
/// Handler invocation and async completion.
pub mod dispatch;
/// Tag engine and renderer.
pub mod engine;
/// Core error types.
pub mod error;
/// Block matching over scanned tokens.
pub mod matcher;
/// Block content normalization.
pub mod normalize;
/// Tag handler registry.
pub mod registry;
/// Tag directive scanning.
pub mod scan;

pub use config::{DuplicatePolicy, EngineConfig};
pub use context::RenderContext;
pub use dispatch::{Completion, split_args};
pub use engine::TagEngine;
pub use error::{ErrorKind, HandlerError, SourceLocation, TagError};
pub use matcher::{MatchedBlock, Node, match_blocks};
pub use normalize::{normalize_block_content, strip_indent};
pub use registry::{
    Handler, IntoTagOutput, Registry, TagDefinition, TagDefinitionBuilder, TagFuture, TagKind,
    TagOptions,
};
pub use scan::{DelimiterScanner, TagOccurrence, TagScanner, Token};
