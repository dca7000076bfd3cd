//! The session state machine.
//!
//! ```text
//!                 accept              start_match
//!   Connecting ──────────→ Lobby ─────────────────→ InGame
//!        │                  ↑ │                       │
//!        │   return_to_lobby│ │ local_disconnect      │ end_match /
//!        │                  │ ↓                       │ local_disconnect
//!        └───────────────→ Ended ←────────────────────┘
//!
//!   Failed is reachable from every phase except itself and is terminal.
//! ```
//!
//! [`SessionState`] is the only owner of "am I in a match". The router
//! reads [`SessionState::phase`] to pick which handler table runs.

use std::collections::VecDeque;
use std::fmt;

use clashlink_protocol::{GameStarted, PlayerAccepted, ProtocolVersion, UserId};

use crate::{GameEvent, MatchState, Roster, SessionError};

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Handshake sent, waiting for the server's answer.
    Connecting,
    /// Accepted; in the lobby between matches.
    Lobby,
    /// A match is running.
    InGame,
    /// A match ended or the client disconnected.
    Ended,
    /// Unrecoverable. The connection is gone.
    Failed,
}

impl Phase {
    /// Returns `true` if moving from `self` to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        use Phase::*;
        matches!(
            (self, target),
            (Connecting, Lobby | Ended | Failed)
                | (Lobby, InGame | Ended | Failed)
                | (InGame, Ended | Failed)
                | (Ended, Lobby | Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Lobby => write!(f, "Lobby"),
            Self::InGame => write!(f, "InGame"),
            Self::Ended => write!(f, "Ended"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Most events kept between two [`SessionState::take_events`] calls.
pub const MAX_PENDING_EVENTS: usize = 4096;

/// Everything the client knows about its session with the server.
///
/// Handlers record [`GameEvent`]s here and the embedder drains them with
/// [`take_events`](Self::take_events). At most [`MAX_PENDING_EVENTS`]
/// are held; an embedder that stops draining loses the oldest ones.
#[derive(Debug, Clone)]
pub struct SessionState {
    phase: Phase,
    version: ProtocolVersion,
    user_id: Option<UserId>,
    roster: Roster,
    available_nations: Vec<String>,
    game: Option<MatchState>,
    events: VecDeque<GameEvent>,
    events_dropped: u64,
    failure: Option<String>,
    closed: bool,
}

impl SessionState {
    /// A fresh session in `Connecting`, declaring `version`.
    pub fn new(version: ProtocolVersion) -> Self {
        Self {
            phase: Phase::Connecting,
            version,
            user_id: None,
            roster: Roster::new(),
            available_nations: Vec::new(),
            game: None,
            events: VecDeque::new(),
            events_dropped: 0,
            failure: None,
            closed: false,
        }
    }

    // -- Accessors --

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The id the server assigned, once accepted.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn roster_mut(&mut self) -> &mut Roster {
        &mut self.roster
    }

    pub fn available_nations(&self) -> &[String] {
        &self.available_nations
    }

    /// The running match, only present while `InGame`.
    pub fn game(&self) -> Option<&MatchState> {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> Option<&mut MatchState> {
        self.game.as_mut()
    }

    /// Why the session failed, once `Failed`.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Returns `true` after [`local_disconnect`](Self::local_disconnect).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Records an event for the game layer, dropping the oldest pending
    /// one when [`MAX_PENDING_EVENTS`] are already waiting.
    pub fn push_event(&mut self, event: GameEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            self.events.pop_front();
            self.events_dropped += 1;
            tracing::warn!(
                dropped = self.events_dropped,
                "pending events not drained, oldest event dropped"
            );
        }
        self.events.push_back(event);
    }

    /// Drains the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events).into()
    }

    /// Events lost because nobody drained them in time.
    pub fn events_dropped(&self) -> u64 {
        self.events_dropped
    }

    // -- Transitions --

    /// Moves to `to` if the transition is allowed.
    pub fn transition(&mut self, to: Phase) -> Result<(), SessionError> {
        if !self.phase.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        tracing::info!(from = %self.phase, %to, "session phase changed");
        self.phase = to;
        Ok(())
    }

    /// Applies a successful handshake: Connecting → Lobby.
    ///
    /// The accepted player list is authoritative. It replaces the roster
    /// outright, including any join or leave notices applied while still
    /// `Connecting`.
    pub fn accept(&mut self, accepted: PlayerAccepted) -> Result<(), SessionError> {
        self.transition(Phase::Lobby)?;
        let user_id = accepted.user_id;
        self.user_id = Some(user_id);
        self.roster = Roster::from(accepted.players);
        self.available_nations = accepted.available_nations;
        tracing::info!(
            %user_id,
            players = self.roster.len(),
            nations = self.available_nations.len(),
            "accepted by server"
        );
        self.push_event(GameEvent::Accepted { user_id });
        Ok(())
    }

    /// Marks the session as failed. Idempotent.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.phase.is_terminal() {
            return;
        }
        let reason = reason.into();
        tracing::warn!(from = %self.phase, %reason, "session failed");
        self.phase = Phase::Failed;
        self.game = None;
        self.failure = Some(reason.clone());
        self.push_event(GameEvent::ConnectionFailed { reason });
    }

    /// Starts a match: Lobby → InGame.
    pub fn start_match(&mut self, started: &GameStarted) -> Result<(), SessionError> {
        self.transition(Phase::InGame)?;
        let game = MatchState::new(started, &self.roster, self.user_id);
        let role = game.role();
        self.game = Some(game);
        self.push_event(GameEvent::MatchStarted {
            player_a: started.player_a,
            player_b: started.player_b,
            map: started.map.clone(),
            role,
        });
        Ok(())
    }

    /// Ends the match: InGame → Ended. Gameplay state is cleared; the
    /// roster stays.
    pub fn end_match(&mut self, winner: u8) -> Result<(), SessionError> {
        self.transition(Phase::Ended)?;
        self.game = None;
        self.push_event(GameEvent::MatchEnded { winner });
        Ok(())
    }

    /// Ended → Lobby, ready for the next match.
    pub fn return_to_lobby(&mut self) -> Result<(), SessionError> {
        self.transition(Phase::Lobby)?;
        self.push_event(GameEvent::ReturnedToLobby);
        Ok(())
    }

    /// The local side closed the session. Moves to Ended unless already
    /// Ended or Failed; the session stays closed either way.
    pub fn local_disconnect(&mut self) {
        if self.closed || self.phase.is_terminal() {
            self.closed = true;
            return;
        }
        self.closed = true;
        if self.phase != Phase::Ended {
            self.phase = Phase::Ended;
            tracing::info!("session closed locally");
        }
        self.game = None;
        self.push_event(GameEvent::Disconnected);
    }
}
