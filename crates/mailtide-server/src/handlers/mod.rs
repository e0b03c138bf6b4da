//! Standard command handlers.

mod append;
mod auth;
mod core;
mod idle;
mod mailbox;
mod message;

use std::sync::Arc;

use crate::dispatch::Dispatcher;

pub use append::AppendHandler;
pub use auth::{
    AuthenticateHandler, EnableHandler, LoginHandler, StartTlsHandler, UnauthenticateHandler,
};
pub use core::{CapabilityHandler, CheckHandler, LogoutHandler, NoopHandler};
pub use idle::IdleHandler;
pub use mailbox::{
    CreateHandler, DeleteHandler, ListHandler, RenameHandler, SelectHandler, StatusHandler,
    SubscribeHandler, UnsubscribeHandler,
};
pub use message::{
    CloseHandler, CopyHandler, ExpungeHandler, FetchHandler, MoveHandler, SearchHandler,
    StoreHandler,
};

/// Registers every standard command handler.
pub fn register_standard(dispatcher: &mut Dispatcher) {
    dispatcher.register("CAPABILITY", Arc::new(CapabilityHandler));
    dispatcher.register("NOOP", Arc::new(NoopHandler));
    dispatcher.register("CHECK", Arc::new(CheckHandler));
    dispatcher.register("LOGOUT", Arc::new(LogoutHandler));
    dispatcher.register("LOGIN", Arc::new(LoginHandler));
    dispatcher.register("AUTHENTICATE", Arc::new(AuthenticateHandler));
    dispatcher.register("UNAUTHENTICATE", Arc::new(UnauthenticateHandler));
    dispatcher.register("STARTTLS", Arc::new(StartTlsHandler));
    dispatcher.register("ENABLE", Arc::new(EnableHandler));
    dispatcher.register("SELECT", Arc::new(SelectHandler { read_only: false }));
    dispatcher.register("EXAMINE", Arc::new(SelectHandler { read_only: true }));
    dispatcher.register("CREATE", Arc::new(CreateHandler));
    dispatcher.register("DELETE", Arc::new(DeleteHandler));
    dispatcher.register("RENAME", Arc::new(RenameHandler));
    dispatcher.register("SUBSCRIBE", Arc::new(SubscribeHandler));
    dispatcher.register("UNSUBSCRIBE", Arc::new(UnsubscribeHandler));
    dispatcher.register("LIST", Arc::new(ListHandler));
    dispatcher.register("STATUS", Arc::new(StatusHandler));
    dispatcher.register("APPEND", Arc::new(AppendHandler));
    dispatcher.register("IDLE", Arc::new(IdleHandler));
    dispatcher.register("CLOSE", Arc::new(CloseHandler { expunge: true }));
    dispatcher.register("UNSELECT", Arc::new(CloseHandler { expunge: false }));
    dispatcher.register("EXPUNGE", Arc::new(ExpungeHandler));
    dispatcher.register("SEARCH", Arc::new(SearchHandler));
    dispatcher.register("FETCH", Arc::new(FetchHandler));
    dispatcher.register("STORE", Arc::new(StoreHandler));
    dispatcher.register("COPY", Arc::new(CopyHandler));
    dispatcher.register("MOVE", Arc::new(MoveHandler));
}
