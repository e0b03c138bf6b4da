//! Command dispatch.
//!
//! A case-insensitive, name-keyed table of boxed handler objects. The
//! table is read-mostly: registration and wrapping happen while the server
//! is being built, lookups happen on every command.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::conn::CommandContext;
use crate::error::ServerResult;

/// A command handler.
///
/// Handlers read their arguments from the context decoder, invoke the
/// session, and either return success (the dispatch layer then emits the
/// tagged OK) or an error translated into `NO`/`BAD`/`BYE`. A handler that
/// writes its own tagged response must call
/// [`CommandContext::set_tagged_written`].
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Executes the command.
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()>;
}

/// Shared handler reference as stored in the dispatch table.
pub type Handler = Arc<dyn CommandHandler>;

/// Boxed handler future used by [`FnHandler`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ServerResult<()>> + Send + 'a>>;

/// Adapts a plain function (returning a boxed future) into a handler.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: for<'a, 'b> Fn(&'a mut CommandContext<'b>) -> HandlerFuture<'a> + Send + Sync,
{
    async fn handle(&self, ctx: &mut CommandContext<'_>) -> ServerResult<()> {
        (self.0)(ctx).await
    }
}

/// Name-keyed command dispatch table.
#[derive(Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Handler>,
}

impl Dispatcher {
    /// Creates an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under a (case-folded) command name.
    ///
    /// Returns the previously registered handler, if any.
    pub fn register(&mut self, name: &str, handler: Handler) -> Option<Handler> {
        self.handlers.insert(name.to_ascii_uppercase(), handler)
    }

    /// Registers a plain function as a handler.
    pub fn register_fn<F>(&mut self, name: &str, f: F) -> Option<Handler>
    where
        F: for<'a, 'b> Fn(&'a mut CommandContext<'b>) -> HandlerFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(FnHandler(f)))
    }

    /// Looks up the handler for a command name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Handler> {
        self.handlers.get(&name.to_ascii_uppercase()).cloned()
    }

    /// Returns `true` if a handler is registered for the name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(&name.to_ascii_uppercase())
    }

    /// Atomically replaces the handler for `name` with
    /// `wrapper(current)`.
    ///
    /// Returns `false` (without invoking the wrapper) when no handler is
    /// registered under the name.
    pub fn wrap<W>(&mut self, name: &str, wrapper: W) -> bool
    where
        W: FnOnce(Handler) -> Handler,
    {
        let key = name.to_ascii_uppercase();
        match self.handlers.remove(&key) {
            Some(old) => {
                self.handlers.insert(key, wrapper(old));
                true
            }
            None => false,
        }
    }

    /// All registered command names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.names())
            .finish()
    }
}
