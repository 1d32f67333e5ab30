//! Tag handler registry.
//!
//! Maps tag names to their handler and flags. The handler's execution model
//! (sync or async) and the tag's shape (inline or block) are fixed when the
//! tag is registered and never re-inspected per call.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::config::DuplicatePolicy;
use crate::context::RenderContext;
use crate::dispatch::Completion;
use crate::scan::{END_RAW_TAG, RAW_TAG};
use crate::{HandlerError, TagError};

/// Future returned by asynchronous handlers.
pub type TagFuture = BoxFuture<'static, Result<String, HandlerError>>;

type SyncFn =
    dyn Fn(&[String], Option<&str>, &RenderContext) -> Result<String, HandlerError> + Send + Sync;
type AsyncFn =
    dyn Fn(Vec<String>, Option<String>, RenderContext, Completion) -> TagFuture + Send + Sync;

/// Values a handler may produce as its replacement text.
pub trait IntoTagOutput {
    /// Convert into the tag's output or the handler's error.
    fn into_tag_output(self) -> Result<String, HandlerError>;
}

impl IntoTagOutput for String {
    fn into_tag_output(self) -> Result<String, HandlerError> {
        Ok(self)
    }
}

impl IntoTagOutput for &'static str {
    fn into_tag_output(self) -> Result<String, HandlerError> {
        Ok(self.to_string())
    }
}

impl<E> IntoTagOutput for Result<String, E>
where
    E: Into<HandlerError>,
{
    fn into_tag_output(self) -> Result<String, HandlerError> {
        self.map_err(Into::into)
    }
}

/// A tag handler: synchronous function or asynchronous function.
#[derive(Clone)]
pub enum Handler {
    /// Runs to completion and returns the output directly.
    Sync(Arc<SyncFn>),
    /// Produces its output from a future, or through the [`Completion`] it
    /// is handed, whichever happens first.
    Async(Arc<AsyncFn>),
}

impl Handler {
    /// Wrap a synchronous handler `(args, content, context) -> output`.
    pub fn sync<F, R>(handler: F) -> Self
    where
        F: Fn(&[String], Option<&str>, &RenderContext) -> R + Send + Sync + 'static,
        R: IntoTagOutput,
    {
        Handler::Sync(Arc::new(
            move |args: &[String], content: Option<&str>, context: &RenderContext| {
                handler(args, content, context).into_tag_output()
            },
        ))
    }

    /// Wrap a future-returning handler `(args, content, context) -> future`.
    pub fn future<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(Vec<String>, Option<String>, RenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoTagOutput + 'static,
    {
        Handler::Async(Arc::new(
            move |args: Vec<String>,
                  content: Option<String>,
                  context: RenderContext,
                  _done: Completion| {
                handler(args, content, context)
                    .map(IntoTagOutput::into_tag_output)
                    .boxed()
            },
        ))
    }

    /// Wrap a handler that may deliver its result through a completion
    /// callback instead of (or before) its returned future.
    ///
    /// The returned future races the [`Completion`]. A handler that settles
    /// the completion later, from a spawned task, must return a future that
    /// never resolves (for example `std::future::pending()`); otherwise its
    /// return value wins.
    pub fn callback<F, Fut, R>(handler: F) -> Self
    where
        F: Fn(Vec<String>, Option<String>, RenderContext, Completion) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoTagOutput + 'static,
    {
        Handler::Async(Arc::new(
            move |args: Vec<String>,
                  content: Option<String>,
                  context: RenderContext,
                  done: Completion| {
                handler(args, content, context, done)
                    .map(IntoTagOutput::into_tag_output)
                    .boxed()
            },
        ))
    }

    /// Whether this handler may suspend.
    pub fn is_async(&self) -> bool {
        matches!(self, Handler::Async(_))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync(..)"),
            Handler::Async(_) => f.write_str("Handler::Async(..)"),
        }
    }
}

/// Registration flags, deserializable from `{ "ends": bool, "async": bool }`.
///
/// `true` converts to a synchronous block tag, `false` to a synchronous
/// inline tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagOptions {
    /// Block tag requiring a matching `end<name>` directive.
    pub ends: bool,
    /// Dispatch on the asynchronous path.
    #[serde(rename = "async")]
    pub is_async: bool,
}

impl TagOptions {
    /// Inline, synchronous tag.
    pub const fn inline() -> Self {
        Self {
            ends: false,
            is_async: false,
        }
    }

    /// Block, synchronous tag.
    pub const fn block() -> Self {
        Self {
            ends: true,
            is_async: false,
        }
    }

    /// Same flags, dispatched asynchronously.
    pub const fn asynchronous(self) -> Self {
        Self {
            is_async: true,
            ..self
        }
    }
}

impl From<bool> for TagOptions {
    fn from(ends: bool) -> Self {
        Self {
            ends,
            is_async: false,
        }
    }
}

/// Whether a tag stands alone or wraps content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// `{% name args %}`
    Inline,
    /// `{% name args %}...{% endname %}`
    Block,
}

/// A registered tag.
#[derive(Debug, Clone)]
pub struct TagDefinition {
    name: String,
    handler: Handler,
    kind: TagKind,
    is_async: bool,
}

impl TagDefinition {
    /// Start building a definition for `name`.
    pub fn builder(name: impl Into<String>) -> TagDefinitionBuilder {
        TagDefinitionBuilder {
            name: name.into(),
            handler: None,
            options: TagOptions::default(),
        }
    }

    /// Tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The registered handler.
    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Inline or block.
    pub fn kind(&self) -> TagKind {
        self.kind
    }

    /// Whether the tag captures content up to `end<name>`.
    pub fn is_block(&self) -> bool {
        self.kind == TagKind::Block
    }

    /// Whether the tag is dispatched on the asynchronous path.
    ///
    /// Always true for [`Handler::Async`]; a synchronous handler registered
    /// with the `async` flag reports true but still completes immediately.
    pub fn is_async(&self) -> bool {
        self.is_async
    }
}

/// Builder validating a [`TagDefinition`].
#[derive(Debug)]
pub struct TagDefinitionBuilder {
    name: String,
    handler: Option<Handler>,
    options: TagOptions,
}

impl TagDefinitionBuilder {
    /// Set the handler.
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set the registration flags.
    pub fn options(mut self, options: impl Into<TagOptions>) -> Self {
        self.options = options.into();
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<TagDefinition, TagError> {
        if self.name.trim().is_empty() {
            return Err(TagError::invalid_argument("name is required"));
        }
        if self.name == RAW_TAG || self.name == END_RAW_TAG {
            return Err(TagError::invalid_argument(format!(
                "`{}` is a reserved tag name",
                self.name
            )));
        }
        let Some(handler) = self.handler else {
            return Err(TagError::invalid_argument("handler is required"));
        };

        let is_async = self.options.is_async || handler.is_async();
        Ok(TagDefinition {
            name: self.name,
            handler,
            kind: if self.options.ends {
                TagKind::Block
            } else {
                TagKind::Inline
            },
            is_async,
        })
    }
}

/// Name-to-definition table for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tags: HashMap<String, TagDefinition>,
    policy: DuplicatePolicy,
}

impl Registry {
    /// Create an empty registry that overwrites duplicates.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with the given duplicate policy.
    pub fn with_policy(policy: DuplicatePolicy) -> Self {
        Self {
            tags: HashMap::new(),
            policy,
        }
    }

    /// Register `handler` under `name`.
    pub fn register(
        &mut self,
        name: &str,
        handler: Handler,
        options: impl Into<TagOptions>,
    ) -> Result<(), TagError> {
        let definition = TagDefinition::builder(name)
            .handler(handler)
            .options(options)
            .build()?;
        self.insert(definition)
    }

    /// Insert a pre-built definition.
    pub fn insert(&mut self, definition: TagDefinition) -> Result<(), TagError> {
        if self.tags.contains_key(&definition.name) {
            if self.policy == DuplicatePolicy::Reject {
                return Err(TagError::invalid_argument(format!(
                    "tag `{}` is already registered",
                    definition.name
                )));
            }
            log::debug!("Overwriting tag definition `{}`", definition.name);
        } else {
            log::debug!(
                "Registered tag `{}` ({:?}, async: {})",
                definition.name,
                definition.kind,
                definition.is_async
            );
        }
        self.tags.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Remove `name`. Removing an unknown name is not an error.
    pub fn unregister(&mut self, name: &str) -> Result<Option<TagDefinition>, TagError> {
        if name.trim().is_empty() {
            return Err(TagError::invalid_argument("name is required"));
        }
        let removed = self.tags.remove(name);
        if removed.is_some() {
            log::debug!("Unregistered tag `{}`", name);
        }
        Ok(removed)
    }

    /// Look up a definition.
    pub fn get(&self, name: &str) -> Option<&TagDefinition> {
        self.tags.get(name)
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Number of registered tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Whether no tags are registered.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn echo() -> Handler {
        Handler::sync(|args, _, _| args.join(" "))
    }

    #[test]
    fn bool_shorthand_means_sync_block() {
        assert_eq!(TagOptions::from(true), TagOptions::block());
        assert_eq!(TagOptions::from(false), TagOptions::inline());
    }

    #[test]
    fn options_deserialize_from_json_object() {
        let options: TagOptions = serde_json::from_str(r#"{"ends": true, "async": true}"#).unwrap();
        assert_eq!(options, TagOptions::block().asynchronous());

        let options: TagOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, TagOptions::inline());
    }

    #[test]
    fn register_requires_name() {
        let mut registry = Registry::new();
        let err = registry.register("", echo(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "name is required");
    }

    #[test]
    fn builder_requires_handler() {
        let err = TagDefinition::builder("test").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.to_string(), "handler is required");
    }

    #[test]
    fn raw_is_reserved() {
        let mut registry = Registry::new();
        assert!(registry.register("raw", echo(), true).is_err());
        assert!(registry.register("endraw", echo(), false).is_err());
    }

    #[test]
    fn last_registration_wins() {
        let mut registry = Registry::new();
        registry.register("test", echo(), false).unwrap();
        registry.register("test", echo(), true).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("test").unwrap().is_block());
    }

    #[test]
    fn reject_policy_refuses_duplicates() {
        let mut registry = Registry::with_policy(DuplicatePolicy::Reject);
        registry.register("test", echo(), false).unwrap();
        let err = registry.register("test", echo(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(!registry.get("test").unwrap().is_block());
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let mut registry = Registry::new();
        assert!(registry.unregister("missing").unwrap().is_none());
        assert_eq!(
            registry.unregister("").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn async_flag_follows_handler() {
        let handler = Handler::future(|args, _, _| async move { args.join(" ") });
        let def = TagDefinition::builder("a").handler(handler).build().unwrap();
        assert!(def.is_async());
        assert_eq!(def.kind(), TagKind::Inline);

        let def = TagDefinition::builder("b")
            .handler(echo())
            .options(TagOptions::inline().asynchronous())
            .build()
            .unwrap();
        assert!(def.is_async());
        assert!(!def.handler().is_async());
    }
}
