//! Core protocol types: discriminants, the raw [`Message`] value, and the
//! small newtypes that show up inside message payloads.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Numeric id the server assigns to each connected user.
///
/// Newtype over `u32` so it can't be confused with an [`EntityId`], even
/// though both travel as a plain `u32` on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u32);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Numeric id the server assigns to a unit or resource during a match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Protocol version
// ---------------------------------------------------------------------------

/// The protocol version a client declares in its handshake.
///
/// The server compares it against its own and rejects clients it can't
/// talk to. Serialized in config files as `{ major, minor, patch }`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        PROTOCOL_VERSION
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// The version this build of the protocol speaks.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// The closed set of message discriminants.
///
/// Every frame starts with one of these as a little-endian `u16`. The
/// numbering groups related kinds: handshake, roster, match lifecycle,
/// units, and resources/damage.
///
/// `MessageEnd` is reserved. It never labels a message; the delimited
/// framing writes it twice to mark where a frame ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum MessageType {
    // -- Handshake --
    HandshakeRequest = 0x0001,
    PlayerAccepted = 0x0002,
    PlayerRejected = 0x0003,

    // -- Roster --
    PlayerConnected = 0x0010,
    PlayerDisconnected = 0x0011,
    PlayerChangedNick = 0x0012,
    PlayerChangedState = 0x0013,

    // -- Match lifecycle --
    GameWillStartIn = 0x0020,
    GameStarted = 0x0021,
    GameEnded = 0x0022,

    // -- Units --
    UnitQueueRequest = 0x0030,
    UnitQueued = 0x0031,
    UnitCreated = 0x0032,
    UnitDestroyed = 0x0033,

    // -- Resources and damage --
    ResourceAdded = 0x0040,
    ResourceGathered = 0x0041,
    PlayerHurt = 0x0042,

    /// Reserved end-of-message marker.
    MessageEnd = 0xFFFE,
}

impl MessageType {
    /// Every discriminant that can label a message (excludes `MessageEnd`).
    pub const ALL: [MessageType; 17] = [
        Self::HandshakeRequest,
        Self::PlayerAccepted,
        Self::PlayerRejected,
        Self::PlayerConnected,
        Self::PlayerDisconnected,
        Self::PlayerChangedNick,
        Self::PlayerChangedState,
        Self::GameWillStartIn,
        Self::GameStarted,
        Self::GameEnded,
        Self::UnitQueueRequest,
        Self::UnitQueued,
        Self::UnitCreated,
        Self::UnitDestroyed,
        Self::ResourceAdded,
        Self::ResourceGathered,
        Self::PlayerHurt,
    ];

    /// The raw `u16` written on the wire.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for the reserved framing marker.
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::MessageEnd)
    }
}

impl TryFrom<u16> for MessageType {
    type Error = ProtocolError;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        if raw == Self::MessageEnd.as_u16() {
            return Ok(Self::MessageEnd);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_u16() == raw)
            .ok_or(ProtocolError::UnknownType(raw))
    }
}

impl From<MessageType> for u16 {
    fn from(kind: MessageType) -> u16 {
        kind.as_u16()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A parsed frame: a discriminant and its still-encoded payload.
///
/// This is what the inbound queue holds. Handlers turn it into a typed
/// message with [`WireMessage::from_message`](crate::WireMessage::from_message)
/// once they know which shape to expect. `Bytes` makes clones cheap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageType,
    payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message with an empty payload.
    pub fn empty(kind: MessageType) -> Self {
        Self::new(kind, Bytes::new())
    }

    pub fn kind(&self) -> MessageType {
        self.kind
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

// ---------------------------------------------------------------------------
// Status codes carried inside payloads
// ---------------------------------------------------------------------------

/// Why the server refused a handshake.
///
/// Travels as a `u8`. Codes this build doesn't know are kept as `Other`
/// so a rejection is still reported instead of being dropped as
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectStatus {
    VersionMismatch,
    ServerFull,
    NickTaken,
    ContentMismatch,
    Banned,
    Other(u8),
}

impl RejectStatus {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::VersionMismatch,
            2 => Self::ServerFull,
            3 => Self::NickTaken,
            4 => Self::ContentMismatch,
            5 => Self::Banned,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::VersionMismatch => 1,
            Self::ServerFull => 2,
            Self::NickTaken => 3,
            Self::ContentMismatch => 4,
            Self::Banned => 5,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for RejectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VersionMismatch => write!(f, "version mismatch"),
            Self::ServerFull => write!(f, "server full"),
            Self::NickTaken => write!(f, "nick taken"),
            Self::ContentMismatch => write!(f, "content mismatch"),
            Self::Banned => write!(f, "banned"),
            Self::Other(raw) => write!(f, "status {raw}"),
        }
    }
}

/// Why another player left the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    Quit,
    Kicked,
    TimedOut,
    Error,
    Other(u8),
}

impl DisconnectReason {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Quit,
            1 => Self::Kicked,
            2 => Self::TimedOut,
            3 => Self::Error,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Quit => 0,
            Self::Kicked => 1,
            Self::TimedOut => 2,
            Self::Error => 3,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quit => write!(f, "quit"),
            Self::Kicked => write!(f, "kicked"),
            Self::TimedOut => write!(f, "timed out"),
            Self::Error => write!(f, "error"),
            Self::Other(raw) => write!(f, "reason {raw}"),
        }
    }
}
