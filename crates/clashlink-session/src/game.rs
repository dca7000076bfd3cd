//! Local view of a running match.
//!
//! The server is authoritative. This module only mirrors what the server
//! reported: the two players in slots 0 and 1, and a table from the
//! numeric ids the server assigns to local unit and resource records.
//! Any message referring to an id or slot this table doesn't know is a
//! desynchronization: the caller logs it and carries on.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use clashlink_protocol::{EntityId, GameStarted, UserId};

use crate::{Roster, SessionError};

/// Health each player starts a match with.
pub const STARTING_HEALTH: u32 = 100;

// ---------------------------------------------------------------------------
// PlayerRole
// ---------------------------------------------------------------------------

/// How this client takes part in a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlayerRole {
    /// Plays slot 0 (`player_a`).
    First,
    /// Plays slot 1 (`player_b`).
    Second,
    /// Watches without a slot.
    Spectator,
}

impl PlayerRole {
    /// The slot this role plays, if any.
    pub fn slot(self) -> Option<u8> {
        match self {
            Self::First => Some(0),
            Self::Second => Some(1),
            Self::Spectator => None,
        }
    }
}

impl fmt::Display for PlayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Second => write!(f, "second"),
            Self::Spectator => write!(f, "spectator"),
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A unit the server created, bound to its server-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUnit {
    pub id: EntityId,
    pub unit_type: String,
    /// Slot of the owning player.
    pub owner: u8,
}

/// A resource lying on the map.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalResource {
    pub id: EntityId,
    pub resource_type: String,
    pub amount: u32,
    pub position: f32,
}

/// One of the two players in a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPlayer {
    pub user_id: UserId,
    pub nick: String,
    pub health: u32,
    /// Ids of the units this player owns.
    pub units: BTreeSet<EntityId>,
    /// Gathered amount per resource type.
    pub resources: BTreeMap<String, u32>,
    /// Unit types the server accepted into the build queue but hasn't
    /// spawned yet, oldest first.
    pub queued: VecDeque<String>,
}

impl MatchPlayer {
    fn new(user_id: UserId, nick: String) -> Self {
        Self {
            user_id,
            nick,
            health: STARTING_HEALTH,
            units: BTreeSet::new(),
            resources: BTreeMap::new(),
            queued: VecDeque::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// MatchState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchState {
    map: String,
    role: PlayerRole,
    players: [MatchPlayer; 2],
    units: HashMap<EntityId, LocalUnit>,
    resources: HashMap<EntityId, LocalResource>,
}

impl MatchState {
    /// Builds the match from a start message, resolving both players
    /// against the lobby roster.
    ///
    /// A player missing from the roster still gets a slot, named after
    /// its id, so the match can proceed.
    pub fn new(
        started: &GameStarted,
        roster: &Roster,
        local: Option<UserId>,
    ) -> Self {
        let resolve = |user_id: UserId| {
            let nick = match roster.get(user_id) {
                Some(p) => p.nick.clone(),
                None => {
                    tracing::warn!(%user_id, "match player not in roster");
                    user_id.to_string()
                }
            };
            MatchPlayer::new(user_id, nick)
        };

        let role = match local {
            Some(id) if id == started.player_a => PlayerRole::First,
            Some(id) if id == started.player_b => PlayerRole::Second,
            _ => PlayerRole::Spectator,
        };

        Self {
            map: started.map.clone(),
            role,
            players: [resolve(started.player_a), resolve(started.player_b)],
            units: HashMap::new(),
            resources: HashMap::new(),
        }
    }

    pub fn map(&self) -> &str {
        &self.map
    }

    pub fn role(&self) -> PlayerRole {
        self.role
    }

    pub fn player(&self, slot: u8) -> Result<&MatchPlayer, SessionError> {
        Ok(&self.players[slot_index(slot)?])
    }

    pub fn players(&self) -> &[MatchPlayer; 2] {
        &self.players
    }

    /// The player this client controls, unless spectating.
    pub fn local_player(&self) -> Option<&MatchPlayer> {
        let slot = self.role.slot()?;
        self.players.get(usize::from(slot))
    }

    pub fn unit(&self, id: EntityId) -> Option<&LocalUnit> {
        self.units.get(&id)
    }

    pub fn resource(&self, id: EntityId) -> Option<&LocalResource> {
        self.resources.get(&id)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    // -- Mutations, one per gameplay message --

    /// Appends an accepted unit request to the local player's queue.
    pub fn queue_unit(&mut self, unit_type: &str) -> Result<(), SessionError> {
        let slot = self.role.slot().ok_or_else(|| {
            SessionError::desync("unit queue answer while spectating")
        })?;
        self.players[usize::from(slot)]
            .queued
            .push_back(unit_type.to_string());
        Ok(())
    }

    /// Binds a newly created unit to its id.
    ///
    /// The oldest matching entry of the owner's build queue is consumed.
    pub fn create_unit(
        &mut self,
        player: u8,
        unit_type: &str,
        id: EntityId,
    ) -> Result<(), SessionError> {
        let idx = slot_index(player)?;
        if self.units.contains_key(&id) {
            return Err(SessionError::desync(format!("unit {id} already exists")));
        }

        let owner = &mut self.players[idx];
        if let Some(pos) = owner.queued.iter().position(|t| t == unit_type) {
            owner.queued.remove(pos);
        }
        owner.units.insert(id);
        self.units.insert(
            id,
            LocalUnit {
                id,
                unit_type: unit_type.to_string(),
                owner: player,
            },
        );
        Ok(())
    }

    /// Removes a unit and returns its record.
    pub fn destroy_unit(
        &mut self,
        player: u8,
        id: EntityId,
    ) -> Result<LocalUnit, SessionError> {
        let idx = slot_index(player)?;
        self.check_owner(player, id)?;
        self.players[idx].units.remove(&id);
        self.units
            .remove(&id)
            .ok_or_else(|| SessionError::desync(format!("unknown unit {id}")))
    }

    pub fn add_resource(
        &mut self,
        resource: LocalResource,
    ) -> Result<(), SessionError> {
        if self.resources.contains_key(&resource.id) {
            return Err(SessionError::desync(format!(
                "resource {} already exists",
                resource.id
            )));
        }
        self.resources.insert(resource.id, resource);
        Ok(())
    }

    /// Credits a resource to the gathering unit's owner and removes it
    /// from the map.
    pub fn gather_resource(
        &mut self,
        player: u8,
        unit_id: EntityId,
        resource_id: EntityId,
    ) -> Result<LocalResource, SessionError> {
        let idx = slot_index(player)?;
        self.check_owner(player, unit_id)?;
        let resource = self.resources.remove(&resource_id).ok_or_else(|| {
            SessionError::desync(format!("unknown resource {resource_id}"))
        })?;

        let total = self.players[idx]
            .resources
            .entry(resource.resource_type.clone())
            .or_insert(0);
        *total = total.saturating_add(resource.amount);
        Ok(resource)
    }

    /// Applies damage and returns the remaining health.
    pub fn hurt(&mut self, player: u8, amount: u32) -> Result<u32, SessionError> {
        let target = &mut self.players[slot_index(player)?];
        target.health = target.health.saturating_sub(amount);
        Ok(target.health)
    }

    fn check_owner(&self, player: u8, id: EntityId) -> Result<(), SessionError> {
        match self.units.get(&id) {
            Some(unit) if unit.owner == player => Ok(()),
            Some(unit) => Err(SessionError::desync(format!(
                "unit {id} belongs to slot {}, not {player}",
                unit.owner
            ))),
            None => Err(SessionError::desync(format!("unknown unit {id}"))),
        }
    }
}

fn slot_index(player: u8) -> Result<usize, SessionError> {
    match player {
        0 | 1 => Ok(usize::from(player)),
        other => Err(SessionError::desync(format!("no player slot {other}"))),
    }
}
