//! Channel membership collaborator.
//!
//! Channel state proper lives outside the core. Sessions keep the folded
//! names of their channels; the collaborator keeps the other direction
//! and is told to drop a session from all of them during destruction.

use crate::casemap::irc_to_lower;
use crate::state::SessionId;
use std::collections::{BTreeSet, HashMap};

pub trait ChannelMembership {
    fn join(&mut self, _channel: &str, _session: SessionId) {}

    fn part(&mut self, _channel: &str, _session: SessionId) {}

    /// Remove a destroyed session from every channel it was on.
    /// The session is already gone from the registry when this runs.
    fn leave_all_channels(&mut self, session: SessionId, nick: &str, channels: &[String]);
}

/// In-memory member lists, keyed by folded channel name.
#[derive(Debug, Default)]
pub struct ChannelTable {
    members: HashMap<String, BTreeSet<SessionId>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self, channel: &str) -> Vec<SessionId> {
        self.members
            .get(&irc_to_lower(channel))
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn channel_count(&self) -> usize {
        self.members.len()
    }
}

impl ChannelMembership for ChannelTable {
    fn join(&mut self, channel: &str, session: SessionId) {
        self.members
            .entry(irc_to_lower(channel))
            .or_default()
            .insert(session);
    }

    fn part(&mut self, channel: &str, session: SessionId) {
        let key = irc_to_lower(channel);
        if let Some(members) = self.members.get_mut(&key) {
            members.remove(&session);
            if members.is_empty() {
                self.members.remove(&key);
            }
        }
    }

    fn leave_all_channels(&mut self, session: SessionId, _nick: &str, channels: &[String]) {
        for channel in channels {
            self.part(channel, session);
        }
    }
}
