//! The inbound queue: parsed messages waiting for dispatch.
//!
//! Messages are appended in arrival order and only ever removed from the
//! head. Inspection (`contains_type`, `find_first_of_type`, `iter`) is
//! read-only.

use std::collections::VecDeque;

use clashlink_protocol::{Message, MessageType};
use serde::{Deserialize, Serialize};

/// What to do when messages arrive faster than they are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePolicy {
    /// Grow without bound.
    #[default]
    Unbounded,
    /// Keep at most `capacity` messages, evicting the oldest.
    DropOldest { capacity: usize },
}

#[derive(Debug, Default)]
pub struct InboundQueue {
    messages: VecDeque<Message>,
    policy: QueuePolicy,
    evicted: u64,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: QueuePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Appends a message at the tail.
    ///
    /// Under [`QueuePolicy::DropOldest`] a full queue evicts its head
    /// first.
    pub fn append(&mut self, msg: Message) {
        if let QueuePolicy::DropOldest { capacity } = self.policy {
            while self.messages.len() >= capacity.max(1) {
                if let Some(old) = self.messages.pop_front() {
                    self.evicted += 1;
                    tracing::warn!(
                        kind = ?old.kind(),
                        capacity,
                        evicted = self.evicted,
                        "inbound queue full, oldest message evicted"
                    );
                }
            }
        }
        self.messages.push_back(msg);
    }

    pub fn peek_head(&self) -> Option<&Message> {
        self.messages.front()
    }

    pub fn remove_head(&mut self) -> Option<Message> {
        self.messages.pop_front()
    }

    pub fn contains_type(&self, kind: MessageType) -> bool {
        self.messages.iter().any(|m| m.kind() == kind)
    }

    pub fn find_first_of_type(&self, kind: MessageType) -> Option<&Message> {
        self.messages.iter().find(|m| m.kind() == kind)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn policy(&self) -> QueuePolicy {
        self.policy
    }

    /// How many messages the overflow policy has dropped so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
