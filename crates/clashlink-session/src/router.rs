//! Phase-gated dispatch of queued messages.
//!
//! The router holds three handler tables:
//!
//! | Table    | Runs while          | Examples                        |
//! |----------|---------------------|---------------------------------|
//! | `Lobby`  | Connecting, Lobby   | countdown, match start          |
//! | `InGame` | InGame              | units, resources, damage, end   |
//! | `Always` | every live phase    | roster notifications            |
//!
//! Each [`Router::dispatch`] looks at the head of the queue only, so
//! messages are processed strictly in arrival order. An in-game message
//! that arrives while still in the lobby stays at the head until the
//! match starts.
//!
//! Handlers are plain function pointers. They get the message and the
//! session state as arguments and capture nothing.

use std::collections::HashMap;

use clashlink_protocol::{Message, MessageType};

use crate::{InboundQueue, Phase, SessionError, SessionState};

/// Whether a handler used up the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Done; remove it from the queue.
    Consumed,
    /// Not applicable in the current phase; leave it at the head.
    Deferred,
}

/// A message handler.
pub type Handler =
    fn(&Message, &mut SessionState) -> Result<Handled, SessionError>;

/// Selects one of the router's tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Always,
    Lobby,
    InGame,
}

// ---------------------------------------------------------------------------
// HandlerTable
// ---------------------------------------------------------------------------

/// Map from discriminant to handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerTable {
    handlers: HashMap<MessageType, Handler>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `handler` for `kind` and returns the one it replaced.
    pub fn insert(&mut self, kind: MessageType, handler: Handler) -> Option<Handler> {
        self.handlers.insert(kind, handler)
    }

    pub fn get(&self, kind: MessageType) -> Option<Handler> {
        self.handlers.get(&kind).copied()
    }

    pub fn contains(&self, kind: MessageType) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DispatchReport
// ---------------------------------------------------------------------------

/// What one dispatch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Messages a handler consumed.
    pub handled: usize,
    /// Messages dropped as malformed, invalid, or unroutable.
    pub dropped: usize,
    /// Messages dropped because they didn't match the local view.
    pub desynced: usize,
    /// Handlers that left their message for a later phase.
    pub deferred: usize,
}

impl DispatchReport {
    /// Messages removed from the queue.
    pub fn removed(&self) -> usize {
        self.handled + self.dropped + self.desynced
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Router {
    always: HandlerTable,
    lobby: HandlerTable,
    in_game: HandlerTable,
}

impl Router {
    /// A router with no handlers at all.
    ///
    /// Most callers want [`Router::default`], which carries the standard
    /// handlers.
    pub fn empty() -> Self {
        Self {
            always: HandlerTable::new(),
            lobby: HandlerTable::new(),
            in_game: HandlerTable::new(),
        }
    }

    /// Installs or overrides a handler.
    pub fn register(
        &mut self,
        table: Table,
        kind: MessageType,
        handler: Handler,
    ) -> Option<Handler> {
        self.table_mut(table).insert(kind, handler)
    }

    pub fn table(&self, table: Table) -> &HandlerTable {
        match table {
            Table::Always => &self.always,
            Table::Lobby => &self.lobby,
            Table::InGame => &self.in_game,
        }
    }

    fn table_mut(&mut self, table: Table) -> &mut HandlerTable {
        match table {
            Table::Always => &mut self.always,
            Table::Lobby => &mut self.lobby,
            Table::InGame => &mut self.in_game,
        }
    }

    /// Returns `true` if any table handles `kind`.
    pub fn routes(&self, kind: MessageType) -> bool {
        self.always.contains(kind)
            || self.lobby.contains(kind)
            || self.in_game.contains(kind)
    }

    /// Runs one dispatch round against the head of `queue`.
    ///
    /// 1. An `Ended` session that is still open returns to `Lobby`.
    /// 2. The phase table gets the head.
    /// 3. The always table gets the (possibly new) head. A match is
    ///    removed whatever the handler answers.
    /// 4. A head no table knows is dropped so it can't block the queue.
    ///
    /// Handler errors are logged and the message is dropped. Nothing here
    /// fails the session.
    pub fn dispatch(
        &self,
        queue: &mut InboundQueue,
        state: &mut SessionState,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        if state.phase() == Phase::Ended && !state.is_closed() {
            if let Err(e) = state.return_to_lobby() {
                tracing::warn!(error = %e, "could not return to lobby");
            }
        }

        let phase_table = match state.phase() {
            Phase::Connecting | Phase::Lobby => &self.lobby,
            Phase::InGame => &self.in_game,
            Phase::Ended | Phase::Failed => return report,
        };

        // -- Phase pass --
        if let Some(outcome) = run_head(phase_table, queue, state) {
            match outcome {
                Ok(Handled::Consumed) => {
                    queue.remove_head();
                    report.handled += 1;
                }
                Ok(Handled::Deferred) => report.deferred += 1,
                Err(e) => drop_head(queue, &e, &mut report),
            }
        }

        // -- Always pass --
        if let Some(outcome) = run_head(&self.always, queue, state) {
            match outcome {
                Ok(_) => report.handled += 1,
                Err(ref e) => record_error(e, &mut report),
            }
            queue.remove_head();
        }

        // -- Unroutable head --
        if let Some(head) = queue.peek_head() {
            let kind = head.kind();
            if !self.routes(kind) {
                tracing::warn!(?kind, "no handler for message, dropped");
                queue.remove_head();
                report.dropped += 1;
            }
        }

        report
    }
}

impl Default for Router {
    /// A router carrying the standard handlers.
    fn default() -> Self {
        let mut router = Self::empty();
        crate::handlers::install(&mut router);
        router
    }
}

/// Calls the handler for the queue head, if `table` has one.
fn run_head(
    table: &HandlerTable,
    queue: &InboundQueue,
    state: &mut SessionState,
) -> Option<Result<Handled, SessionError>> {
    let head = queue.peek_head()?;
    let handler = table.get(head.kind())?;
    let outcome = handler(head, state);
    tracing::trace!(kind = ?head.kind(), ?outcome, "handler ran");
    Some(outcome)
}

fn drop_head(
    queue: &mut InboundQueue,
    error: &SessionError,
    report: &mut DispatchReport,
) {
    record_error(error, report);
    queue.remove_head();
}

fn record_error(error: &SessionError, report: &mut DispatchReport) {
    match error {
        SessionError::Desync(_) => {
            tracing::warn!(%error, "desynchronized message skipped");
            report.desynced += 1;
        }
        SessionError::Decode(_) => {
            tracing::warn!(%error, "malformed message dropped");
            report.dropped += 1;
        }
        SessionError::InvalidTransition { .. } => {
            tracing::warn!(%error, "message not valid in this phase, dropped");
            report.dropped += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use clashlink_protocol::{
        GameEnded, PROTOCOL_VERSION, PlayerAccepted, UserId, WireMessage,
    };

    use super::*;

    fn consume(_: &Message, _: &mut SessionState) -> Result<Handled, SessionError> {
        Ok(Handled::Consumed)
    }

    fn defer(_: &Message, _: &mut SessionState) -> Result<Handled, SessionError> {
        Ok(Handled::Deferred)
    }

    fn desync(_: &Message, _: &mut SessionState) -> Result<Handled, SessionError> {
        Err(SessionError::Desync("unknown unit".into()))
    }

    fn lobby_state() -> SessionState {
        let mut state = SessionState::new(PROTOCOL_VERSION);
        state
            .accept(PlayerAccepted {
                user_id: UserId(1),
                players: vec![],
                available_nations: vec![],
            })
            .unwrap();
        state.take_events();
        state
    }

    fn queue_of(kinds: &[MessageType]) -> InboundQueue {
        let mut queue = InboundQueue::new();
        for kind in kinds {
            queue.append(Message::empty(*kind));
        }
        queue
    }

    #[test]
    fn test_register_returns_replaced_handler() {
        let mut router = Router::empty();
        assert!(router.register(Table::Lobby, MessageType::GameStarted, consume).is_none());
        assert!(router.register(Table::Lobby, MessageType::GameStarted, defer).is_some());
        assert_eq!(router.table(Table::Lobby).len(), 1);
    }

    #[test]
    fn test_dispatch_empty_queue_does_nothing() {
        let router = Router::default();
        let mut state = lobby_state();
        let report = router.dispatch(&mut InboundQueue::new(), &mut state);
        assert_eq!(report, DispatchReport::default());
    }

    #[test]
    fn test_dispatch_phase_and_always_pass_in_one_round() {
        let mut router = Router::empty();
        router.register(Table::Lobby, MessageType::GameWillStartIn, consume);
        router.register(Table::Always, MessageType::PlayerConnected, consume);
        let mut queue = queue_of(&[
            MessageType::GameWillStartIn,
            MessageType::PlayerConnected,
            MessageType::PlayerConnected,
        ]);

        let report = router.dispatch(&mut queue, &mut lobby_state());

        assert_eq!(report.handled, 2);
        assert_eq!(queue.len(), 1, "at most one message per pass");
    }

    #[test]
    fn test_dispatch_deferred_head_blocks_later_messages() {
        let mut router = Router::empty();
        router.register(Table::Lobby, MessageType::GameStarted, defer);
        router.register(Table::Always, MessageType::PlayerConnected, consume);
        let mut queue =
            queue_of(&[MessageType::GameStarted, MessageType::PlayerConnected]);

        let report = router.dispatch(&mut queue, &mut lobby_state());

        assert_eq!(report.deferred, 1);
        assert_eq!(report.handled, 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_dispatch_always_table_removes_even_when_deferred() {
        let mut router = Router::empty();
        router.register(Table::Always, MessageType::PlayerConnected, defer);
        let mut queue = queue_of(&[MessageType::PlayerConnected]);

        router.dispatch(&mut queue, &mut lobby_state());

        assert!(queue.is_empty());
    }

    #[test]
    fn test_dispatch_handler_error_drops_message_and_counts_desync() {
        let mut router = Router::empty();
        router.register(Table::Lobby, MessageType::GameStarted, desync);
        let mut queue = queue_of(&[MessageType::GameStarted]);
        let mut state = lobby_state();

        let report = router.dispatch(&mut queue, &mut state);

        assert_eq!(report.desynced, 1);
        assert!(queue.is_empty());
        assert_eq!(state.phase(), Phase::Lobby, "never escalated");
    }

    #[test]
    fn test_dispatch_unroutable_head_is_dropped() {
        let router = Router::empty();
        let mut queue = queue_of(&[MessageType::UnitQueueRequest]);

        let report = router.dispatch(&mut queue, &mut lobby_state());

        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dispatch_in_game_message_waits_in_lobby() {
        let router = Router::default();
        let mut queue = InboundQueue::new();
        queue.append(GameEnded { winner: 0 }.to_message().unwrap());

        for _ in 0..3 {
            let report = router.dispatch(&mut queue, &mut lobby_state());
            assert_eq!(report.removed(), 0);
        }
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_dispatch_failed_session_dispatches_nothing() {
        let router = Router::default();
        let mut state = SessionState::new(PROTOCOL_VERSION);
        state.fail("gone");
        let mut queue = queue_of(&[MessageType::PlayerConnected]);

        let report = router.dispatch(&mut queue, &mut state);

        assert_eq!(report, DispatchReport::default());
        assert_eq!(queue.len(), 1);
    }
}
