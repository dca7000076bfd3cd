//! The lobby roster: who is connected to the server right now.
//!
//! The server's broadcasts are the only source of truth. The client
//! applies each roster notification as it arrives and never predicts
//! changes locally.

use clashlink_protocol::{Participant, UserId};

/// Ordered list of lobby participants, in the order they joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant, replacing any entry with the same id.
    pub fn insert(&mut self, participant: Participant) {
        match self.get_mut(participant.user_id) {
            Some(existing) => *existing = participant,
            None => self.members.push(participant),
        }
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<Participant> {
        let idx = self.members.iter().position(|p| p.user_id == user_id)?;
        Some(self.members.remove(idx))
    }

    pub fn get(&self, user_id: UserId) -> Option<&Participant> {
        self.members.iter().find(|p| p.user_id == user_id)
    }

    pub fn get_mut(&mut self, user_id: UserId) -> Option<&mut Participant> {
        self.members.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Changes a participant's nick and returns the old one.
    pub fn rename(&mut self, user_id: UserId, nick: String) -> Option<String> {
        let member = self.get_mut(user_id)?;
        Some(std::mem::replace(&mut member.nick, nick))
    }

    /// Flips a participant's ready flag and returns the new value.
    pub fn toggle_ready(&mut self, user_id: UserId) -> Option<bool> {
        let member = self.get_mut(user_id)?;
        member.ready = !member.ready;
        Some(member.ready)
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.get(user_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.iter()
    }
}

impl From<Vec<Participant>> for Roster {
    fn from(players: Vec<Participant>) -> Self {
        let mut roster = Self::new();
        for p in players {
            roster.insert(p);
        }
        roster
    }
}
