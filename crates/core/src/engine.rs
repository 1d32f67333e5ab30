//! The tag engine: registry plus renderer.
//!
//! A render runs scan → match → dispatch → assemble. Matching covers the
//! whole document before any handler runs. Dispatch resolves each block's
//! children first, normalizes the expanded body, then calls the block's
//! handler, so parents always see fully expanded content. Sibling tags are
//! polled concurrently and reassembled in source order.

use futures::future::{self, BoxFuture};
use futures::FutureExt;

use crate::config::EngineConfig;
use crate::context::RenderContext;
use crate::dispatch::{Completion, dispatch};
use crate::matcher::{Node, match_blocks};
use crate::normalize::normalize_block_content;
use crate::registry::{Handler, IntoTagOutput, Registry, TagOptions};
use crate::scan::{DelimiterScanner, TagOccurrence, TagScanner};
use crate::TagError;

/// Tag registry and renderer.
pub struct TagEngine {
    registry: Registry,
    scanner: Box<dyn TagScanner + Send + Sync>,
    config: EngineConfig,
}

impl std::fmt::Debug for TagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for TagEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TagEngine {
    /// Create an engine with default configuration and no tags.
    pub fn new() -> Self {
        let config = EngineConfig::default();
        Self {
            registry: Registry::with_policy(config.duplicate_policy),
            scanner: Box::new(DelimiterScanner::from_config(&config)),
            config,
        }
    }

    /// Create an engine from configuration.
    pub fn with_config(config: EngineConfig) -> Result<Self, TagError> {
        config.validate()?;
        Ok(Self {
            registry: Registry::with_policy(config.duplicate_policy),
            scanner: Box::new(DelimiterScanner::from_config(&config)),
            config,
        })
    }

    /// Replace the scanner, for hosts that lex directives themselves.
    pub fn with_scanner<S>(mut self, scanner: S) -> Self
    where
        S: TagScanner + Send + Sync + 'static,
    {
        self.scanner = Box::new(scanner);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Registered tags.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Registered tags, mutably.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Register `handler` under `name`.
    ///
    /// `options` accepts [`TagOptions`] or the `bool` shorthand (`true` for a
    /// synchronous block tag).
    pub fn register(
        &mut self,
        name: &str,
        handler: Handler,
        options: impl Into<TagOptions>,
    ) -> Result<(), TagError> {
        self.registry.register(name, handler, options)
    }

    /// Register a synchronous handler.
    pub fn register_fn<F, R>(
        &mut self,
        name: &str,
        handler: F,
        options: impl Into<TagOptions>,
    ) -> Result<(), TagError>
    where
        F: Fn(&[String], Option<&str>, &RenderContext) -> R + Send + Sync + 'static,
        R: IntoTagOutput,
    {
        self.register(name, Handler::sync(handler), options)
    }

    /// Register a future-returning handler.
    pub fn register_async<F, Fut, R>(
        &mut self,
        name: &str,
        handler: F,
        options: impl Into<TagOptions>,
    ) -> Result<(), TagError>
    where
        F: Fn(Vec<String>, Option<String>, RenderContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoTagOutput + 'static,
    {
        let options = options.into().asynchronous();
        self.register(name, Handler::future(handler), options)
    }

    /// Register an async handler that may report through a [`Completion`].
    ///
    /// Whichever settles first wins: the completion or the returned future.
    /// Handlers that complete from a spawned task should return
    /// `std::future::pending()`.
    pub fn register_callback<F, Fut, R>(
        &mut self,
        name: &str,
        handler: F,
        options: impl Into<TagOptions>,
    ) -> Result<(), TagError>
    where
        F: Fn(Vec<String>, Option<String>, RenderContext, Completion) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoTagOutput + 'static,
    {
        let options = options.into().asynchronous();
        self.register(name, Handler::callback(handler), options)
    }

    /// Remove a tag. Unknown names are ignored.
    pub fn unregister(&mut self, name: &str) -> Result<(), TagError> {
        self.registry.unregister(name).map(|_| ())
    }

    /// Expand every tag in `document`.
    ///
    /// Fails on the first unknown tag, malformed block, or handler error;
    /// no partial output is returned.
    pub async fn render(
        &self,
        document: &str,
        context: &RenderContext,
    ) -> Result<String, TagError> {
        self.render_document(document, context).await.map_err(|err| {
            log::debug!("Tag render failed: {}", err);
            err.with_file(context.source())
        })
    }

    /// Render with an empty context and report through `callback` as well.
    ///
    /// The callback runs before the returned future settles.
    pub async fn render_with_callback<C>(
        &self,
        document: &str,
        callback: C,
    ) -> Result<String, TagError>
    where
        C: FnOnce(Result<&str, &TagError>),
    {
        let result = self.render(document, &RenderContext::default()).await;
        match &result {
            Ok(output) => callback(Ok(output.as_str())),
            Err(err) => callback(Err(err)),
        }
        result
    }

    /// Render on the current thread, blocking until every handler finishes.
    pub fn render_blocking(
        &self,
        document: &str,
        context: &RenderContext,
    ) -> Result<String, TagError> {
        futures::executor::block_on(self.render(document, context))
    }

    async fn render_document(
        &self,
        document: &str,
        context: &RenderContext,
    ) -> Result<String, TagError> {
        let tokens = self.scanner.scan(document)?;
        let nodes = match_blocks(tokens, &self.registry)?;
        self.render_nodes(document, &nodes, context).await
    }

    fn render_nodes<'a>(
        &'a self,
        document: &'a str,
        nodes: &'a [Node],
        context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<String, TagError>> {
        let parts = nodes
            .iter()
            .map(|node| self.render_node(document, node, context));
        future::try_join_all(parts)
            .map(|parts| parts.map(|parts| parts.concat()))
            .boxed()
    }

    fn render_node<'a>(
        &'a self,
        document: &'a str,
        node: &'a Node,
        context: &'a RenderContext,
    ) -> BoxFuture<'a, Result<String, TagError>> {
        match node {
            Node::Text(range) => future::ready(Ok(document[range.clone()].to_string())).boxed(),
            Node::Inline(occurrence) => self.invoke(occurrence, None, context).boxed(),
            Node::Block(block) => async move {
                let expanded = self.render_nodes(document, &block.children, context).await?;
                let content = normalize_block_content(&expanded);
                self.invoke(&block.opening, Some(content), context).await
            }
            .boxed(),
        }
    }

    async fn invoke(
        &self,
        occurrence: &TagOccurrence,
        content: Option<String>,
        context: &RenderContext,
    ) -> Result<String, TagError> {
        let Some(definition) = self.registry.get(&occurrence.name) else {
            return Err(TagError::unknown_tag(
                occurrence.name.clone(),
                occurrence.location.clone(),
            ));
        };
        dispatch(definition, occurrence, content, context).await
    }
}
