//! Typed messages: one struct per discriminant.
//!
//! Each struct implements [`WireMessage`], which ties it to its
//! [`MessageType`] and knows how to write and read its fields. Field
//! order in each struct is the order on the wire.
//!
//! ```rust
//! use clashlink_protocol::{EntityId, UnitCreated, WireMessage};
//!
//! let created = UnitCreated {
//!     player: 0,
//!     unit_type: "Archer".into(),
//!     unit_id: EntityId(42),
//! };
//! let msg = created.to_message().unwrap();
//! assert_eq!(UnitCreated::from_message(&msg).unwrap(), created);
//! ```

use crate::{
    DisconnectReason, EntityId, Message, MessageType, PayloadReader,
    PayloadWriter, ProtocolError, ProtocolVersion, RejectStatus, UserId,
};

/// A message type with a fixed payload shape.
pub trait WireMessage: Sized {
    /// The discriminant this message travels under.
    const KIND: MessageType;

    /// Writes the fields in wire order.
    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError>;

    /// Reads the fields in wire order.
    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError>;

    /// Encodes into a raw [`Message`].
    fn to_message(&self) -> Result<Message, ProtocolError> {
        let mut w = PayloadWriter::new();
        self.write_payload(&mut w)?;
        Ok(Message::new(Self::KIND, w.finish()))
    }

    /// Decodes from a raw [`Message`].
    ///
    /// Fails with [`ProtocolError::TypeMismatch`] before touching the
    /// payload if the discriminant is not [`Self::KIND`], and with
    /// [`ProtocolError::TrailingBytes`] if fields are left unread.
    fn from_message(msg: &Message) -> Result<Self, ProtocolError> {
        if msg.kind() != Self::KIND {
            return Err(ProtocolError::TypeMismatch {
                expected: Self::KIND,
                actual: msg.kind(),
            });
        }
        let mut r = PayloadReader::new(msg.payload());
        let value = Self::read_payload(&mut r)?;
        r.finish(Self::KIND)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Shared field helpers
// ---------------------------------------------------------------------------

fn put_user(w: &mut PayloadWriter, id: UserId) {
    w.put_u32(id.0);
}

fn get_user(r: &mut PayloadReader<'_>) -> Result<UserId, ProtocolError> {
    r.u32().map(UserId)
}

fn put_entity(w: &mut PayloadWriter, id: EntityId) {
    w.put_u32(id.0);
}

fn get_entity(r: &mut PayloadReader<'_>) -> Result<EntityId, ProtocolError> {
    r.u32().map(EntityId)
}

fn put_texts(
    w: &mut PayloadWriter,
    items: &[String],
) -> Result<(), ProtocolError> {
    w.put_list_len(items.len())?;
    items.iter().try_for_each(|s| w.put_text(s))
}

fn get_texts(r: &mut PayloadReader<'_>) -> Result<Vec<String>, ProtocolError> {
    let len = r.list_len()?;
    (0..len).map(|_| r.text()).collect()
}

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// A content package the client has installed, with its checksum.
///
/// The server compares checksums to make sure both sides run the same
/// unit and nation definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChecksum {
    pub name: String,
    pub checksum: Vec<u8>,
}

/// Client → server: the first message on every connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    pub version: ProtocolVersion,
    pub nick: String,
    pub content: Vec<ContentChecksum>,
}

impl WireMessage for HandshakeRequest {
    const KIND: MessageType = MessageType::HandshakeRequest;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u16(self.version.major);
        w.put_u16(self.version.minor);
        w.put_u16(self.version.patch);
        w.put_text(&self.nick)?;
        w.put_list_len(self.content.len())?;
        for item in &self.content {
            w.put_text(&item.name)?;
            w.put_blob(&item.checksum)?;
        }
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let version = ProtocolVersion::new(r.u16()?, r.u16()?, r.u16()?);
        let nick = r.text()?;
        let len = r.list_len()?;
        let content = (0..len)
            .map(|_| -> Result<_, ProtocolError> {
                Ok(ContentChecksum {
                    name: r.text()?,
                    checksum: r.blob()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            version,
            nick,
            content,
        })
    }
}

/// One entry of the lobby roster as the server reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: UserId,
    pub nick: String,
    pub ready: bool,
}

/// Server → client: the handshake succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerAccepted {
    /// The id assigned to this client.
    pub user_id: UserId,
    /// Everyone already in the lobby.
    pub players: Vec<Participant>,
    pub available_nations: Vec<String>,
}

impl WireMessage for PlayerAccepted {
    const KIND: MessageType = MessageType::PlayerAccepted;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.user_id);
        w.put_list_len(self.players.len())?;
        for p in &self.players {
            put_user(w, p.user_id);
            w.put_text(&p.nick)?;
            w.put_bool(p.ready);
        }
        put_texts(w, &self.available_nations)
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let user_id = get_user(r)?;
        let len = r.list_len()?;
        let players = (0..len)
            .map(|_| -> Result<_, ProtocolError> {
                Ok(Participant {
                    user_id: get_user(r)?,
                    nick: r.text()?,
                    ready: r.bool()?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let available_nations = get_texts(r)?;
        Ok(Self {
            user_id,
            players,
            available_nations,
        })
    }
}

/// Server → client: the handshake was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRejected {
    pub status: RejectStatus,
    pub reason: String,
}

impl WireMessage for PlayerRejected {
    const KIND: MessageType = MessageType::PlayerRejected;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.status.as_u8());
        w.put_text(&self.reason)
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            status: RejectStatus::from_u8(r.u8()?),
            reason: r.text()?,
        })
    }
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConnected {
    pub user_id: UserId,
    pub nick: String,
}

impl WireMessage for PlayerConnected {
    const KIND: MessageType = MessageType::PlayerConnected;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.user_id);
        w.put_text(&self.nick)
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: get_user(r)?,
            nick: r.text()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerDisconnected {
    pub user_id: UserId,
    pub reason: DisconnectReason,
}

impl WireMessage for PlayerDisconnected {
    const KIND: MessageType = MessageType::PlayerDisconnected;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.user_id);
        w.put_u8(self.reason.as_u8());
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: get_user(r)?,
            reason: DisconnectReason::from_u8(r.u8()?),
        })
    }
}

/// Either direction: a player's nick changed.
///
/// The client sends it to request a change for itself; the server
/// broadcasts it once the change is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerChangedNick {
    pub user_id: UserId,
    pub nick: String,
}

impl WireMessage for PlayerChangedNick {
    const KIND: MessageType = MessageType::PlayerChangedNick;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.user_id);
        w.put_text(&self.nick)
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: get_user(r)?,
            nick: r.text()?,
        })
    }
}

/// Either direction: a player toggled between ready and spectating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerChangedState {
    pub user_id: UserId,
}

impl WireMessage for PlayerChangedState {
    const KIND: MessageType = MessageType::PlayerChangedState;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.user_id);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            user_id: get_user(r)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Match lifecycle
// ---------------------------------------------------------------------------

/// Server → client: countdown before the next match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameWillStartIn {
    pub millis: u32,
}

impl WireMessage for GameWillStartIn {
    const KIND: MessageType = MessageType::GameWillStartIn;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u32(self.millis);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { millis: r.u32()? })
    }
}

/// Server → client: a match between two lobby members begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStarted {
    pub player_a: UserId,
    pub player_b: UserId,
    pub map: String,
}

impl WireMessage for GameStarted {
    const KIND: MessageType = MessageType::GameStarted;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        put_user(w, self.player_a);
        put_user(w, self.player_b);
        w.put_text(&self.map)
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player_a: get_user(r)?,
            player_b: get_user(r)?,
            map: r.text()?,
        })
    }
}

/// Server → client: the match is over. `winner` is a player slot (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEnded {
    pub winner: u8,
}

impl WireMessage for GameEnded {
    const KIND: MessageType = MessageType::GameEnded;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.winner);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self { winner: r.u8()? })
    }
}

// ---------------------------------------------------------------------------
// Units
// ---------------------------------------------------------------------------

/// Client → server: add (or remove) a unit from the local build queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitQueueRequest {
    pub unit_type: String,
    pub enqueue: bool,
}

impl WireMessage for UnitQueueRequest {
    const KIND: MessageType = MessageType::UnitQueueRequest;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_text(&self.unit_type)?;
        w.put_bool(self.enqueue);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            unit_type: r.text()?,
            enqueue: r.bool()?,
        })
    }
}

/// Server → client: answer to a [`UnitQueueRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitQueued {
    pub unit_type: String,
    pub accepted: bool,
}

impl WireMessage for UnitQueued {
    const KIND: MessageType = MessageType::UnitQueued;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_text(&self.unit_type)?;
        w.put_bool(self.accepted);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            unit_type: r.text()?,
            accepted: r.bool()?,
        })
    }
}

/// Server → client: a unit spawned for one of the two match slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitCreated {
    pub player: u8,
    pub unit_type: String,
    pub unit_id: EntityId,
}

impl WireMessage for UnitCreated {
    const KIND: MessageType = MessageType::UnitCreated;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.player);
        w.put_text(&self.unit_type)?;
        put_entity(w, self.unit_id);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: r.u8()?,
            unit_type: r.text()?,
            unit_id: get_entity(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDestroyed {
    pub player: u8,
    pub unit_id: EntityId,
}

impl WireMessage for UnitDestroyed {
    const KIND: MessageType = MessageType::UnitDestroyed;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.player);
        put_entity(w, self.unit_id);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: r.u8()?,
            unit_id: get_entity(r)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Resources and damage
// ---------------------------------------------------------------------------

/// Server → client: a resource appeared on the map.
///
/// `position` is the horizontal coordinate along the lane.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceAdded {
    pub resource_type: String,
    pub amount: u32,
    pub position: f32,
    pub resource_id: EntityId,
}

impl WireMessage for ResourceAdded {
    const KIND: MessageType = MessageType::ResourceAdded;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_text(&self.resource_type)?;
        w.put_u32(self.amount);
        w.put_f32(self.position);
        put_entity(w, self.resource_id);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            resource_type: r.text()?,
            amount: r.u32()?,
            position: r.f32()?,
            resource_id: get_entity(r)?,
        })
    }
}

/// Server → client: a unit picked up a resource for its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceGathered {
    pub player: u8,
    pub unit_id: EntityId,
    pub resource_id: EntityId,
}

impl WireMessage for ResourceGathered {
    const KIND: MessageType = MessageType::ResourceGathered;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.player);
        put_entity(w, self.unit_id);
        put_entity(w, self.resource_id);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: r.u8()?,
            unit_id: get_entity(r)?,
            resource_id: get_entity(r)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerHurt {
    pub player: u8,
    pub amount: u32,
}

impl WireMessage for PlayerHurt {
    const KIND: MessageType = MessageType::PlayerHurt;

    fn write_payload(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_u8(self.player);
        w.put_u32(self.amount);
        Ok(())
    }

    fn read_payload(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            player: r.u8()?,
            amount: r.u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<M: WireMessage + PartialEq + std::fmt::Debug>(msg: M) {
        let raw = msg.to_message().expect("encode");
        assert_eq!(raw.kind(), M::KIND);
        let back = M::from_message(&raw).expect("decode");
        assert_eq!(back, msg);
    }

    // =====================================================================
    // Round trips, including empty strings and lists
    // =====================================================================

    #[test]
    fn test_handshake_request_round_trip() {
        round_trip(HandshakeRequest {
            version: ProtocolVersion::new(1, 2, 3),
            nick: "Alice".into(),
            content: vec![
                ContentChecksum {
                    name: "nations/knights".into(),
                    checksum: vec![0xDE, 0xAD, 0xBE, 0xEF],
                },
                ContentChecksum {
                    name: String::new(),
                    checksum: vec![],
                },
            ],
        });
    }

    #[test]
    fn test_player_accepted_round_trip() {
        round_trip(PlayerAccepted {
            user_id: UserId(7),
            players: vec![Participant {
                user_id: UserId(3),
                nick: "Alice".into(),
                ready: true,
            }],
            available_nations: vec!["Knights".into(), "Vikings".into()],
        });
    }

    #[test]
    fn test_player_accepted_empty_lists_round_trip() {
        round_trip(PlayerAccepted {
            user_id: UserId(0),
            players: vec![],
            available_nations: vec![],
        });
    }

    #[test]
    fn test_lobby_messages_round_trip() {
        round_trip(PlayerRejected {
            status: RejectStatus::NickTaken,
            reason: "nick in use".into(),
        });
        round_trip(PlayerConnected {
            user_id: UserId(9),
            nick: "Żółw".into(),
        });
        round_trip(PlayerDisconnected {
            user_id: UserId(9),
            reason: DisconnectReason::Kicked,
        });
        round_trip(PlayerChangedNick {
            user_id: UserId(9),
            nick: String::new(),
        });
        round_trip(PlayerChangedState { user_id: UserId(9) });
    }

    #[test]
    fn test_match_messages_round_trip() {
        round_trip(GameWillStartIn { millis: 5000 });
        round_trip(GameStarted {
            player_a: UserId(3),
            player_b: UserId(7),
            map: "default".into(),
        });
        round_trip(GameEnded { winner: 1 });
    }

    #[test]
    fn test_gameplay_messages_round_trip() {
        round_trip(UnitQueueRequest {
            unit_type: "Archer".into(),
            enqueue: true,
        });
        round_trip(UnitQueued {
            unit_type: "Archer".into(),
            accepted: false,
        });
        round_trip(UnitCreated {
            player: 0,
            unit_type: "Archer".into(),
            unit_id: EntityId(42),
        });
        round_trip(UnitDestroyed {
            player: 1,
            unit_id: EntityId(42),
        });
        round_trip(ResourceAdded {
            resource_type: "wood".into(),
            amount: 50,
            position: 312.5,
            resource_id: EntityId(5),
        });
        round_trip(ResourceGathered {
            player: 0,
            unit_id: EntityId(42),
            resource_id: EntityId(5),
        });
        round_trip(PlayerHurt {
            player: 1,
            amount: u32::MAX,
        });
    }

    // =====================================================================
    // Exact layout
    // =====================================================================

    #[test]
    fn test_unit_created_payload_layout() {
        let msg = UnitCreated {
            player: 1,
            unit_type: "AB".into(),
            unit_id: EntityId(0x0102_0304),
        }
        .to_message()
        .unwrap();

        assert_eq!(
            msg.payload().as_ref(),
            &[1, 2, 0, b'A', 0, b'B', 0, 0x04, 0x03, 0x02, 0x01]
        );
    }

    // =====================================================================
    // Decode failures
    // =====================================================================

    #[test]
    fn test_from_message_wrong_kind_returns_type_mismatch() {
        let raw = GameEnded { winner: 0 }.to_message().unwrap();
        let err = UnitCreated::from_message(&raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TypeMismatch {
                expected: MessageType::UnitCreated,
                actual: MessageType::GameEnded,
            }
        );
    }

    #[test]
    fn test_from_message_truncated_payload_returns_error() {
        let raw = Message::new(MessageType::UnitDestroyed, vec![0u8, 42]);
        let err = UnitDestroyed::from_message(&raw).unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { .. }));
    }

    #[test]
    fn test_from_message_extra_bytes_returns_trailing_bytes() {
        let raw = Message::new(MessageType::GameEnded, vec![1u8, 0xFF]);
        let err = GameEnded::from_message(&raw).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::TrailingBytes {
                kind: MessageType::GameEnded,
                count: 1
            }
        );
    }

    #[test]
    fn test_from_message_empty_payload_for_fielded_kind_fails() {
        let raw = Message::empty(MessageType::PlayerHurt);
        assert!(PlayerHurt::from_message(&raw).is_err());
    }
}
