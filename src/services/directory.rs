//! Account directory collaborator.
//!
//! The persistent account store lives outside the core. The core only
//! needs to look up registered nicknames and their owning accounts, write
//! back a few bookkeeping fields, and maintain each account's list of
//! logged-in sessions. [`MemoryDirectory`] is the in-process implementation
//! used by the replay driver and the tests.

use crate::casemap::irc_to_lower;
use crate::state::SessionId;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Status flags on a registered nickname.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NickFlags {
    /// Nobody may use this nickname.
    pub forbidden: bool,
    /// A collision is in progress; cleared by the cleanup hook.
    pub collided: bool,
    /// Held by services after a collision.
    pub held: bool,
}

/// Per-account protection settings.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AccountFlags {
    /// Access-list recognition alone does not count.
    pub secure: bool,
    pub suspended: bool,
    /// Enforce the nickname against unidentified users.
    pub kill_protect: bool,
    /// Enforce after the short delay.
    pub kill_quick: bool,
    /// Enforce immediately.
    pub kill_immed: bool,
}

/// A registered nickname.
#[derive(Debug, Clone, Deserialize)]
pub struct NickRecord {
    pub nick: String,
    /// Owning account name.
    pub account: String,
    #[serde(default)]
    pub flags: NickFlags,
    #[serde(default)]
    pub last_seen: i64,
    #[serde(default)]
    pub last_quit: String,
    #[serde(default)]
    pub last_usermask: String,
    #[serde(default)]
    pub last_realname: String,
}

impl NickRecord {
    pub fn new(nick: &str, account: &str) -> Self {
        Self {
            nick: nick.to_string(),
            account: account.to_string(),
            flags: NickFlags::default(),
            last_seen: 0,
            last_quit: String::new(),
            last_usermask: String::new(),
            last_realname: String::new(),
        }
    }
}

/// A persistent identity.
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub name: String,
    #[serde(default)]
    pub flags: AccountFlags,
    /// `user@host` wildcard masks for recognition.
    #[serde(default)]
    pub access: Vec<String>,
    /// Sessions logged in to this account. Written only by login/logout.
    #[serde(skip)]
    pub(crate) sessions: Vec<SessionId>,
}

impl Account {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flags: AccountFlags::default(),
            access: Vec::new(),
            sessions: Vec::new(),
        }
    }

    pub fn sessions(&self) -> &[SessionId] {
        &self.sessions
    }
}

/// Lookup interface the core uses against the account store.
pub trait AccountDirectory {
    fn nick(&self, nick: &str) -> Option<&NickRecord>;

    fn nick_mut(&mut self, nick: &str) -> Option<&mut NickRecord>;

    fn account(&self, name: &str) -> Option<&Account>;

    fn account_mut(&mut self, name: &str) -> Option<&mut Account>;

    /// Cleanup hook for a nickname that a session has just left.
    ///
    /// Runs after the session is fully detached. `holder` is whoever holds
    /// the nickname *now*, which may be nobody or an unrelated session.
    fn on_cancel(&mut self, _nick: &str, _holder: Option<SessionId>) {}
}

/// Seed file layout for [`MemoryDirectory::load`].
#[derive(Debug, Default, Deserialize)]
struct DirectorySeed {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default)]
    nicks: Vec<NickRecord>,
}

/// Errors loading a directory seed.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read directory seed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse directory seed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// In-memory account store keyed by folded names.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    accounts: HashMap<String, Account>,
    nicks: HashMap<String, NickRecord>,
    cancels: Vec<(String, Option<SessionId>)>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load accounts and nicknames from a JSON seed file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SeedError> {
        let content = std::fs::read_to_string(path)?;
        let seed: DirectorySeed = serde_json::from_str(&content)?;
        let mut dir = Self::new();
        for account in seed.accounts {
            dir.accounts.insert(irc_to_lower(&account.name), account);
        }
        for record in seed.nicks {
            dir.nicks.insert(irc_to_lower(&record.nick), record);
        }
        Ok(dir)
    }

    /// Register an account, replacing any existing one of the same name.
    pub fn add_account(&mut self, name: &str) -> &mut Account {
        let slot = self
            .accounts
            .entry(irc_to_lower(name))
            .or_insert_with(|| Account::new(name));
        *slot = Account::new(name);
        slot
    }

    /// Register `nick` to `account`.
    pub fn add_nick(&mut self, nick: &str, account: &str) -> &mut NickRecord {
        let slot = self
            .nicks
            .entry(irc_to_lower(nick))
            .or_insert_with(|| NickRecord::new(nick, account));
        *slot = NickRecord::new(nick, account);
        slot
    }

    /// Every cleanup-hook call so far, oldest first.
    pub fn cancels(&self) -> &[(String, Option<SessionId>)] {
        &self.cancels
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn nick_count(&self) -> usize {
        self.nicks.len()
    }
}

impl AccountDirectory for MemoryDirectory {
    fn nick(&self, nick: &str) -> Option<&NickRecord> {
        self.nicks.get(&irc_to_lower(nick))
    }

    fn nick_mut(&mut self, nick: &str) -> Option<&mut NickRecord> {
        self.nicks.get_mut(&irc_to_lower(nick))
    }

    fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.get(&irc_to_lower(name))
    }

    fn account_mut(&mut self, name: &str) -> Option<&mut Account> {
        self.accounts.get_mut(&irc_to_lower(name))
    }

    fn on_cancel(&mut self, nick: &str, holder: Option<SessionId>) {
        self.cancels.push((nick.to_string(), holder));
    }
}
