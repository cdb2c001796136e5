//! Connected-client records.
//!
//! A [`Session`] is owned by the [`Registry`](super::Registry); everything
//! else refers to it by [`SessionId`], which is never reused. The account
//! link and channel set are non-owning: they hold names, not references.

use crate::casemap::wildcard_match;
use crate::config::NetworkConfig;
use crate::state::modes::UserModeName;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// Stable handle to a session. Monotonic; a destroyed id never comes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A connected client.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    /// Current nickname with its original casing. Only the registry renames.
    pub(crate) nick: String,
    /// Network-assigned unique id (TS6 UID), if the uplink uses them.
    pub(crate) uid: Option<String>,
    pub ident: String,
    /// Virtual ident shown while cloaked or when the network supports vidents.
    pub vident: String,
    /// Real hostname.
    pub host: String,
    /// Virtual host assigned by services or the network.
    pub vhost: String,
    /// Cloaked host reported by the network.
    pub chost: String,
    pub ip: Option<String>,
    pub realname: String,
    /// Server the client is connected to.
    pub server: String,
    /// Network timestamp of the last nick change / introduction.
    pub timestamp: i64,
    /// When we last saw the client take its current nickname.
    pub signon: i64,
    /// Services root flag; dropped on every nick change.
    pub super_admin: bool,
    pub(crate) modes: HashSet<UserModeName>,
    pub(crate) params: HashMap<UserModeName, String>,
    /// Logged-in account name (non-owning).
    pub(crate) account: Option<String>,
    /// Channels the client is on (folded names, non-owning).
    pub(crate) channels: BTreeSet<String>,
    /// On the access list of the account owning the current nickname.
    pub(crate) on_access: bool,
    pub(crate) bad_pass_count: u32,
    pub(crate) bad_pass_time: i64,
}

impl Session {
    pub(crate) fn new(id: SessionId, nick: String, uid: Option<String>) -> Self {
        Self {
            id,
            nick,
            uid,
            ident: String::new(),
            vident: String::new(),
            host: String::new(),
            vhost: String::new(),
            chost: String::new(),
            ip: None,
            realname: String::new(),
            server: String::new(),
            timestamp: 0,
            signon: 0,
            super_admin: false,
            modes: HashSet::new(),
            params: HashMap::new(),
            account: None,
            channels: BTreeSet::new(),
            on_access: false,
            bad_pass_count: 0,
            bad_pass_time: 0,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    pub fn bad_pass_count(&self) -> u32 {
        self.bad_pass_count
    }

    // === Modes ===

    pub fn has_mode(&self, name: UserModeName) -> bool {
        self.modes.contains(&name)
    }

    pub fn mode_param(&self, name: UserModeName) -> Option<&str> {
        self.params.get(&name).map(String::as_str)
    }

    /// Set a flag locally. Parameterised modes always arrive with their
    /// parameter, so flag and parameter entry are written together.
    pub(crate) fn insert_mode(&mut self, name: UserModeName, param: Option<String>) {
        self.modes.insert(name);
        match param {
            Some(p) => {
                self.params.insert(name, p);
            }
            None => {
                self.params.remove(&name);
            }
        }
    }

    pub(crate) fn clear_mode(&mut self, name: UserModeName) {
        self.modes.remove(&name);
        self.params.remove(&name);
    }

    /// Mode letters in a stable order, e.g. `+iox`.
    pub fn mode_string(&self) -> String {
        let mut letters: Vec<char> = self.modes.iter().map(|m| m.default_letter()).collect();
        letters.sort_unstable();
        let mut s = String::from("+");
        s.extend(letters);
        s
    }

    // === Host and ident display ===

    /// The host other users see.
    pub fn displayed_host(&self, net: &NetworkConfig) -> &str {
        if net.vhost && !self.vhost.is_empty() {
            &self.vhost
        } else if self.has_mode(UserModeName::Cloak) && !self.chost.is_empty() {
            &self.chost
        } else {
            &self.host
        }
    }

    /// The ident other users see.
    pub fn displayed_ident(&self, net: &NetworkConfig) -> &str {
        if self.has_mode(UserModeName::Cloak) || (net.vident && !self.vident.is_empty()) {
            &self.vident
        } else {
            &self.ident
        }
    }

    /// `nick!ident@host` with the real ident and host.
    pub fn mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.host)
    }

    /// `ident@host` as recorded in a nickname's last-usermask.
    pub fn usermask(&self, net: &NetworkConfig) -> String {
        format!("{}@{}", self.displayed_ident(net), self.displayed_host(net))
    }

    /// A wildcard mask likely to match this client from the same place.
    ///
    /// Dotted-quad hosts keep the first octet (`35.*`), multi-label
    /// hostnames drop the leftmost label (`*.example.com`), and a `~`
    /// ident gains a leading `*`.
    pub fn create_mask(&self, net: &NetworkConfig) -> String {
        let ident = &self.ident;
        let host = self.displayed_host(net);

        let mut mask = if ident.starts_with('~') {
            format!("*{ident}@")
        } else {
            format!("{ident}@")
        };

        let is_ipv4 = host.split('.').count() == 4
            && host.chars().all(|c| c.is_ascii_digit() || c == '.');

        if is_ipv4 {
            let first = host.split('.').next().unwrap_or_default();
            mask.push_str(first);
            mask.push_str(".*");
        } else if host.matches('.').count() >= 2 {
            // at least two dots: wildcard the leftmost label
            if let Some(dot) = host.find('.') {
                mask.push('*');
                mask.push_str(&host[dot..]);
            }
        } else {
            mask.push_str(host);
        }
        mask
    }

    /// Whether `[nick!]user@host` matches this client. The host part is
    /// tried against both the real and the displayed host.
    pub fn matches_usermask(&self, mask: &str, net: &NetworkConfig) -> bool {
        let (nick, rest) = match mask.split_once('!') {
            Some((n, r)) => (Some(n), r),
            None => (None, mask),
        };
        let Some((user, host)) = rest.split_once('@') else {
            return false;
        };
        if user.is_empty() || host.is_empty() {
            return false;
        }

        nick.is_none_or(|n| wildcard_match(n, &self.nick))
            && wildcard_match(user, &self.ident)
            && (wildcard_match(host, &self.host)
                || wildcard_match(host, self.displayed_host(net)))
    }
}
