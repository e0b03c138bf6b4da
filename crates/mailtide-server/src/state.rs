//! Connection state machine.
//!
//! The four protocol states of RFC 9051 §3 with a validated transition
//! table, ordered before/after hooks, and the static command admission
//! table consulted before dispatch.

use std::collections::{HashMap, HashSet};

use mailtide_proto::StatusResponse;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnState {
    /// Initial state: only authentication commands are admitted.
    #[default]
    NotAuthenticated,
    /// A user is authenticated; mailbox management is admitted.
    Authenticated,
    /// A mailbox is selected; message commands are admitted.
    Selected,
    /// Terminal state; the connection is closing.
    Logout,
}

impl ConnState {
    /// Human-readable state name used in BAD texts.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::NotAuthenticated => "not authenticated",
            Self::Authenticated => "authenticated",
            Self::Selected => "selected",
            Self::Logout => "logout",
        }
    }
}

/// Hook invoked around a transition; receives (from, to).
pub type TransitionHook =
    Box<dyn Fn(ConnState, ConnState) -> Result<(), StatusResponse> + Send + Sync>;

/// Per-connection state machine with a configurable adjacency table.
pub struct StateMachine {
    current: ConnState,
    transitions: HashMap<ConnState, HashSet<ConnState>>,
    before: Vec<TransitionHook>,
    after: Vec<TransitionHook>,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    /// Creates a machine in `NotAuthenticated` with the default table:
    ///
    /// | from | to |
    /// |---|---|
    /// | NotAuthenticated | Authenticated, Logout |
    /// | Authenticated | Selected, NotAuthenticated, Logout |
    /// | Selected | Authenticated, Selected, Logout |
    /// | Logout | — |
    #[must_use]
    pub fn new() -> Self {
        use ConnState::{Authenticated, Logout, NotAuthenticated, Selected};
        let mut transitions: HashMap<ConnState, HashSet<ConnState>> = HashMap::new();
        transitions.insert(NotAuthenticated, HashSet::from([Authenticated, Logout]));
        transitions.insert(
            Authenticated,
            HashSet::from([Selected, NotAuthenticated, Logout]),
        );
        transitions.insert(Selected, HashSet::from([Authenticated, Selected, Logout]));
        transitions.insert(Logout, HashSet::new());
        Self {
            current: NotAuthenticated,
            transitions,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// The current state.
    #[must_use]
    pub const fn state(&self) -> ConnState {
        self.current
    }

    /// Returns `true` if a transition to `target` is permitted.
    #[must_use]
    pub fn can_transition(&self, target: ConnState) -> bool {
        self.transitions
            .get(&self.current)
            .is_some_and(|targets| targets.contains(&target))
    }

    /// Performs a validated transition.
    ///
    /// Before-hooks run in registration order; if any fails the state is
    /// unchanged and the failure propagates. After a successful change,
    /// after-hooks run and their failures propagate (the state stays
    /// changed).
    pub fn transition(&mut self, target: ConnState) -> Result<(), StatusResponse> {
        if !self.can_transition(target) {
            return Err(StatusResponse::bad(format!(
                "illegal state transition from {} to {}",
                self.current.name(),
                target.name()
            )));
        }
        let from = self.current;
        for hook in &self.before {
            hook(from, target)?;
        }
        self.current = target;
        for hook in &self.after {
            hook(from, target)?;
        }
        Ok(())
    }

    /// Fails with BAD unless the current state is one of `allowed`.
    pub fn require_state(&self, allowed: &[ConnState]) -> Result<(), StatusResponse> {
        if allowed.contains(&self.current) {
            Ok(())
        } else {
            Err(StatusResponse::bad(format!(
                "command not allowed in {} state",
                self.current.name()
            )))
        }
    }

    /// Adds a permitted transition.
    pub fn add_transition(&mut self, from: ConnState, to: ConnState) {
        self.transitions.entry(from).or_default().insert(to);
    }

    /// Replaces the whole adjacency table.
    pub fn set_transitions(&mut self, pairs: &[(ConnState, ConnState)]) {
        self.transitions.clear();
        for &(from, to) in pairs {
            self.add_transition(from, to);
        }
    }

    /// Registers a before-hook.
    pub fn on_before(&mut self, hook: TransitionHook) {
        self.before.push(hook);
    }

    /// Registers an after-hook.
    pub fn on_after(&mut self, hook: TransitionHook) {
        self.after.push(hook);
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current)
            .field("before_hooks", &self.before.len())
            .field("after_hooks", &self.after.len())
            .finish()
    }
}

/// States in which a standard command is admitted.
///
/// Returns `None` for unknown commands; admission is then left to the
/// extension-registered handler itself.
#[must_use]
pub fn allowed_states(command: &str) -> Option<&'static [ConnState]> {
    use ConnState::{Authenticated, Logout, NotAuthenticated, Selected};
    const ANY: &[ConnState] = &[NotAuthenticated, Authenticated, Selected, Logout];
    const NOT_AUTH: &[ConnState] = &[NotAuthenticated];
    const AUTH: &[ConnState] = &[Authenticated, Selected];
    const SELECTED: &[ConnState] = &[Selected];
    match command.to_ascii_uppercase().as_str() {
        "CAPABILITY" | "NOOP" | "LOGOUT" | "ID" => Some(ANY),
        "STARTTLS" | "AUTHENTICATE" | "LOGIN" => Some(NOT_AUTH),
        "ENABLE" | "SELECT" | "EXAMINE" | "CREATE" | "DELETE" | "RENAME" | "SUBSCRIBE"
        | "UNSUBSCRIBE" | "LIST" | "LSUB" | "NAMESPACE" | "STATUS" | "APPEND" | "IDLE"
        | "UNAUTHENTICATE" => Some(AUTH),
        "CHECK" | "CLOSE" | "UNSELECT" | "EXPUNGE" | "SEARCH" | "FETCH" | "STORE" | "COPY"
        | "MOVE" | "UID" => Some(SELECTED),
        _ => None,
    }
}
