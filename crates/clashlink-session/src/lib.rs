//! Session layer for clashlink.
//!
//! This crate decides what an incoming message means for the client:
//!
//! 1. **Queueing**: parsed messages wait in an [`InboundQueue`] in
//!    arrival order.
//! 2. **Dispatch**: the [`Router`] hands the queue head to the handler
//!    table for the current [`Phase`].
//! 3. **State**: handlers update [`SessionState`] (roster, match view)
//!    and record [`GameEvent`]s for the game layer.
//!
//! Nothing here does I/O.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)           ← owns the socket, feeds the queue, pumps dispatch
//!     ↕
//! Session Layer (this crate)  ← phases, handler tables, local match view
//!     ↕
//! Protocol Layer (below)   ← Message, MessageType, typed payloads
//! ```

mod error;
mod event;
mod game;
pub mod handlers;
mod queue;
mod roster;
mod router;
mod state;

pub use error::SessionError;
pub use event::GameEvent;
pub use game::{
    LocalResource, LocalUnit, MatchPlayer, MatchState, PlayerRole, STARTING_HEALTH,
};
pub use queue::{InboundQueue, QueuePolicy};
pub use roster::Roster;
pub use router::{DispatchReport, Handled, Handler, HandlerTable, Router, Table};
pub use state::{MAX_PENDING_EVENTS, Phase, SessionState};
