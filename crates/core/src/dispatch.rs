//! Handler invocation.
//!
//! Async handlers can deliver their output two ways: by settling the future
//! they return, or by calling the [`Completion`] they were handed. Both paths
//! write into one single-assignment slot; whichever lands first is the tag's
//! result and the other is ignored.

use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::{self, Either};

use crate::context::RenderContext;
use crate::registry::{Handler, TagDefinition};
use crate::scan::TagOccurrence;
use crate::{HandlerError, TagError};

type Slot = Option<oneshot::Sender<Result<String, HandlerError>>>;

/// Legacy completion callback for async handlers.
///
/// Only the first call has any effect.
#[derive(Clone)]
pub struct Completion {
    slot: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<Result<String, HandlerError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Settle with a result. Returns `false` if already settled.
    pub fn complete(&self, result: Result<String, HandlerError>) -> bool {
        let sender = self
            .slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            // The receiver may be gone if the render already failed elsewhere.
            Some(tx) => {
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }

    /// Settle with the tag's output.
    pub fn resolve(&self, output: impl Into<String>) -> bool {
        self.complete(Ok(output.into()))
    }

    /// Settle with an error.
    pub fn fail(&self, error: impl Into<HandlerError>) -> bool {
        self.complete(Err(error.into()))
    }

    /// Whether a result has been delivered.
    pub fn is_settled(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

/// Split raw tag arguments on whitespace.
///
/// No quoting grammar: every other character, `|`, `<`, `>`, parentheses and
/// commas included, stays inside its token.
pub fn split_args(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

/// Invoke `definition` for `occurrence` and collect its output.
pub(crate) async fn dispatch(
    definition: &TagDefinition,
    occurrence: &TagOccurrence,
    content: Option<String>,
    context: &RenderContext,
) -> Result<String, TagError> {
    let args = split_args(&occurrence.raw_args);
    log::trace!(
        "Dispatching tag `{}` at {} ({} args, block: {})",
        occurrence.name,
        occurrence.location,
        args.len(),
        content.is_some()
    );

    let result = match definition.handler() {
        Handler::Sync(handler) => handler(&args, content.as_deref(), context),
        Handler::Async(handler) => {
            let (completion, delivered) = Completion::channel();
            let pending = handler(args, content, context.clone(), completion.clone());
            match future::select(pending, delivered).await {
                Either::Left((returned, delivered)) => {
                    completion.complete(returned);
                    flatten(delivered.await)
                }
                Either::Right((delivered, _pending)) => flatten(delivered),
            }
        }
    };

    result.map_err(|source| {
        TagError::handler_failure(&occurrence.name, occurrence.location.clone(), source)
    })
}

fn flatten(
    delivered: Result<Result<String, HandlerError>, oneshot::Canceled>,
) -> Result<String, HandlerError> {
    delivered.unwrap_or_else(|_| Err("tag completion was dropped without a result".into()))
}
