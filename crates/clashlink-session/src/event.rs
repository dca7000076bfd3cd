//! Domain events handed to the game layer.
//!
//! Handlers never call into rendering or game rules. They record what
//! happened as a [`GameEvent`] on the session, and the embedding game
//! drains them with `SessionState::take_events` once per frame.

use clashlink_protocol::{DisconnectReason, EntityId, UserId};

use crate::PlayerRole;

#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    // -- Session lifecycle --
    /// The handshake succeeded and this client joined the lobby.
    Accepted { user_id: UserId },
    /// The session failed and will not recover.
    ConnectionFailed { reason: String },
    /// The local side closed the session.
    Disconnected,

    // -- Roster --
    PlayerJoined { user_id: UserId, nick: String },
    PlayerLeft {
        user_id: UserId,
        nick: String,
        reason: DisconnectReason,
    },
    NickChanged {
        user_id: UserId,
        old: String,
        new: String,
    },
    ReadyChanged { user_id: UserId, ready: bool },

    // -- Match lifecycle --
    /// A match starts in `millis` milliseconds.
    Countdown { millis: u32 },
    /// A match started. The game layer builds the playable scene from
    /// this: the two players, the map, and how this client takes part.
    MatchStarted {
        player_a: UserId,
        player_b: UserId,
        map: String,
        role: PlayerRole,
    },
    /// The match ended; `winner` is the winning slot.
    MatchEnded { winner: u8 },
    /// Back in the lobby after a match, roster intact.
    ReturnedToLobby,

    // -- Gameplay --
    UnitQueued { unit_type: String, accepted: bool },
    UnitSpawned {
        player: u8,
        unit_type: String,
        unit_id: EntityId,
    },
    UnitDestroyed {
        player: u8,
        unit_type: String,
        unit_id: EntityId,
    },
    ResourceSpawned {
        resource_id: EntityId,
        resource_type: String,
        amount: u32,
        position: f32,
    },
    ResourceGathered {
        player: u8,
        unit_id: EntityId,
        resource_id: EntityId,
        resource_type: String,
        amount: u32,
    },
    PlayerHurt { player: u8, health: u32 },
}
