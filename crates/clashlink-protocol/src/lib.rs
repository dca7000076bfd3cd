//! Wire protocol for clashlink.
//!
//! This crate defines how the client and the game server talk over one
//! TCP stream:
//!
//! - **Types** ([`MessageType`], [`Message`], [`UserId`], ...): the
//!   discriminants and raw message values.
//! - **Wire** ([`PayloadWriter`], [`PayloadReader`]): the fixed binary
//!   layout of payload fields.
//! - **Messages** ([`WireMessage`] and one struct per discriminant):
//!   typed views over raw payloads.
//! - **Framing** ([`Framing`], [`FrameDecoder`]): where one message ends
//!   and the next begins.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about sockets or session state. It
//! only turns bytes into messages and back.
//!
//! ```text
//! Transport (bytes) → FrameDecoder (frames) → Framing::decode (Message)
//!                   → WireMessage::from_message (typed message)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod error;
mod framing;
mod messages;
mod types;
mod wire;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use error::ProtocolError;
pub use framing::{
    DEFAULT_MAX_FRAME_SIZE, FrameDecoder, Framing, SENTINEL, SENTINEL_LEN,
};
pub use messages::{
    ContentChecksum, GameEnded, GameStarted, GameWillStartIn,
    HandshakeRequest, Participant, PlayerAccepted, PlayerChangedNick,
    PlayerChangedState, PlayerConnected, PlayerDisconnected, PlayerHurt,
    PlayerRejected, ResourceAdded, ResourceGathered, UnitCreated,
    UnitDestroyed, UnitQueueRequest, UnitQueued, WireMessage,
};
pub use types::{
    DisconnectReason, EntityId, Message, MessageType, PROTOCOL_VERSION,
    ProtocolVersion, RejectStatus, UserId,
};
pub use wire::{PayloadReader, PayloadWriter};
