//! The client registry.
//!
//! Owns every live [`Session`] and the two indices over them: folded
//! nickname and network UID. A session is in an index exactly when it is
//! live and the index applies to it (sessions without a UID are only in
//! the nickname index). All index writes happen here.

use crate::casemap::{irc_eq, irc_to_lower};
use crate::error::{CoreError, CoreResult};
use crate::state::stats::StatsManager;
use crate::state::{Session, SessionId, UserModeName};
use std::collections::HashMap;
use tracing::{debug, info};

pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    nicks: HashMap<String, SessionId>,
    uids: HashMap<String, SessionId>,
    next_id: u64,
    pub(crate) stats: StatsManager,
    log_max_users: bool,
}

impl Registry {
    pub fn new(log_max_users: bool) -> Self {
        Self {
            sessions: HashMap::new(),
            nicks: HashMap::new(),
            uids: HashMap::new(),
            next_id: 1,
            stats: StatsManager::new(),
            log_max_users,
        }
    }

    /// Create a session. The caller has already checked that `nick` is free.
    pub fn create(&mut self, nick: &str, uid: Option<&str>, now: i64) -> CoreResult<SessionId> {
        if nick.is_empty() {
            return Err(CoreError::InvalidArgument("empty nickname"));
        }

        let id = SessionId(self.next_id);
        self.next_id += 1;

        let uid = uid.filter(|u| !u.is_empty()).map(str::to_string);
        self.nicks.insert(irc_to_lower(nick), id);
        if let Some(uid) = &uid {
            self.uids.insert(uid.clone(), id);
        }
        self.sessions
            .insert(id, Session::new(id, nick.to_string(), uid));

        if let Some(peak) = self.stats.user_connected(now)
            && self.log_max_users
        {
            info!(peak, "New maximum user count");
        }
        debug!(nick = %nick, id = %id, "Session created");
        Ok(id)
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    /// Case-insensitive nickname lookup.
    pub fn lookup_by_nick(&self, nick: &str) -> Option<SessionId> {
        self.nicks.get(&irc_to_lower(nick)).copied()
    }

    /// Exact UID lookup.
    pub fn lookup_by_uid(&self, uid: &str) -> Option<SessionId> {
        self.uids.get(uid).copied()
    }

    /// Resolve a protocol source that may be a UID (leading digit) or a nick.
    pub fn find(&self, name: &str) -> Option<SessionId> {
        if name.starts_with(|c: char| c.is_ascii_digit()) {
            return self.lookup_by_uid(name);
        }
        self.lookup_by_nick(name)
    }

    /// Move a session to a new nickname. A case-only change rewrites the
    /// stored casing under the same key. The new nickname must not belong
    /// to another live session.
    pub fn rename(&mut self, id: SessionId, new_nick: &str) -> CoreResult<()> {
        if new_nick.is_empty() {
            return Err(CoreError::InvalidArgument("empty nickname"));
        }
        if let Some(holder) = self.nicks.get(&irc_to_lower(new_nick))
            && *holder != id
        {
            return Err(CoreError::NickInUse(new_nick.to_string()));
        }
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(CoreError::UnknownSession)?;

        if !irc_eq(&session.nick, new_nick) {
            self.nicks.remove(&irc_to_lower(&session.nick));
            self.nicks.insert(irc_to_lower(new_nick), id);
        }
        debug!(old = %session.nick, new = %new_nick, "Session renamed");
        session.nick = new_nick.to_string();
        Ok(())
    }

    /// Remove a session from both indices and hand back ownership.
    pub fn destroy(&mut self, id: SessionId) -> Option<Session> {
        let session = self.sessions.remove(&id)?;

        let key = irc_to_lower(&session.nick);
        if self.nicks.get(&key) == Some(&id) {
            self.nicks.remove(&key);
        }
        if let Some(uid) = &session.uid
            && self.uids.get(uid) == Some(&id)
        {
            self.uids.remove(uid);
        }

        self.stats.user_disconnected();
        debug!(nick = %session.nick, id = %id, "Session destroyed");
        Some(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn stats(&self) -> &StatsManager {
        &self.stats
    }

    /// Drop every session and index entry without any detachment work.
    /// The user and operator counters go down with them.
    pub(crate) fn clear(&mut self) {
        for (_, session) in self.sessions.drain() {
            if session.has_mode(UserModeName::Oper) {
                self.stats.user_deopered();
            }
            self.stats.user_disconnected();
        }
        self.nicks.clear();
        self.uids.clear();
    }

    /// Check that both indices describe exactly the live sessions.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (key, id) in &self.nicks {
            let s = self.sessions.get(id).expect("nick index points at dead session");
            assert_eq!(&irc_to_lower(&s.nick), key);
        }
        for (uid, id) in &self.uids {
            let s = self.sessions.get(id).expect("uid index points at dead session");
            assert_eq!(s.uid.as_deref(), Some(uid.as_str()));
        }
        for (id, s) in &self.sessions {
            assert_eq!(self.nicks.get(&irc_to_lower(&s.nick)), Some(id));
            if let Some(uid) = &s.uid {
                assert_eq!(self.uids.get(uid), Some(id));
            }
        }
    }
}
