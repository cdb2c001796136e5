//! Client identity and session transitions.
//!
//! Connect, rename, login/logout, host changes and departure. A session's
//! account link and the account's session list are written together here
//! and nowhere else.

use super::{AccountDirectory, ChannelMembership, Directive, Introduction, Services};
use crate::casemap::irc_eq;
use crate::error::{CoreError, CoreResult};
use crate::state::{SessionId, UserModeName};
use tracing::{debug, info, warn};

impl<D: AccountDirectory, C: ChannelMembership> Services<D, C> {
    // === Connect ===

    /// Create a session for a client the uplink has introduced, then run
    /// nickname protection on it.
    pub fn introduce_client(&mut self, intro: Introduction) -> CoreResult<SessionId> {
        if intro.nick.is_empty() {
            return Err(CoreError::InvalidArgument("empty nickname"));
        }
        if intro.host.is_empty() {
            return Err(CoreError::InvalidArgument("empty host"));
        }

        if let Some(stale) = self.registry.lookup_by_nick(&intro.nick) {
            warn!(nick = %intro.nick, "Introduction for a nick already in use; dropping the old session");
            self.destroy(stale);
        }
        if let Some(uid) = intro.uid.as_deref()
            && let Some(stale) = self.registry.lookup_by_uid(uid)
        {
            warn!(uid = %uid, "Introduction for a UID already in use; dropping the old session");
            self.destroy(stale);
        }

        let now = self.now();
        let id = self.registry.create(&intro.nick, intro.uid.as_deref(), now)?;

        let chost = intro.vhost.filter(|v| !v.is_empty() && v != "*");
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.vident = intro.ident.clone();
        session.ident = intro.ident;
        session.host = intro.host;
        session.chost = chost.unwrap_or_default();
        session.ip = intro.ip;
        session.realname = intro.realname;
        session.server = intro.server;
        session.timestamp = intro.ts;
        session.signon = now;

        if self.config.logging.log_users {
            info!(
                nick = %session.nick,
                mask = %session.mask(),
                realname = %session.realname,
                server = %session.server,
                "User connected"
            );
        }

        let mut parts = intro.modes.split_whitespace();
        if let Some(modes) = parts.next() {
            let params: Vec<String> = parts.map(str::to_string).collect();
            self.apply_network_modes(id, modes, &params);
        }

        self.update_host(id);
        self.validate(id);
        Ok(id)
    }

    // === Rename ===

    /// Move a session to a new nickname and re-evaluate its standing there.
    pub fn rename(&mut self, id: SessionId, new_nick: &str, ts: i64) -> CoreResult<()> {
        if new_nick.is_empty() {
            return Err(CoreError::InvalidArgument("empty nickname"));
        }
        let old = {
            let session = self
                .registry
                .get_mut(id)
                .ok_or(CoreError::UnknownSession)?;
            session.super_admin = false;
            session.timestamp = ts;
            session.nick.clone()
        };

        if self.config.logging.log_users {
            info!(old = %old, new = %new_nick, "User changed nick");
        }

        if irc_eq(&old, new_nick) {
            return self.registry.rename(id, new_nick);
        }

        if let Some(stale) = self.registry.lookup_by_nick(new_nick) {
            warn!(nick = %new_nick, "Rename onto a nick already in use; dropping the old session");
            self.destroy(stale);
        }

        let now = self.now();
        let stamp_old = self.is_identified(id, true) || self.is_recognized(id, false);
        if stamp_old && let Some(record) = self.directory.nick_mut(&old) {
            record.last_seen = now;
        }

        let forced = self.enforcer.is_collision_pending(&old);
        self.registry.rename(id, new_nick)?;
        let on_access = self.compute_on_access(id);
        if let Some(session) = self.registry.get_mut(id) {
            session.signon = now;
            session.on_access = on_access;
        }
        if forced {
            info!(old = %old, new = %new_nick, "Forced nick change completed");
        }

        // the session is fully on the new nick; clean up behind it
        self.cancel(&old);

        if self.is_identified(id, true) {
            if let Some(record) = self.directory.nick_mut(new_nick) {
                record.last_seen = now;
            }
            self.update_host(id);
            self.set_mode(id, UserModeName::Registered, None);
            let account = self
                .registry
                .get(id)
                .and_then(|s| s.account.clone())
                .unwrap_or_default();
            info!(nick = %new_nick, account = %account, "Automatically identified");
            self.emit(Directive::AutoIdentify {
                target: new_nick.to_string(),
                account,
            });
        } else {
            self.remove_mode(id, UserModeName::Registered);
            self.emit(Directive::UnregisteredNick {
                target: new_nick.to_string(),
            });
            self.validate(id);
        }
        Ok(())
    }

    // === Accounts ===

    /// Link a session to an account, replacing any previous link.
    pub fn login(&mut self, id: SessionId, account: &str) -> CoreResult<()> {
        let name = self
            .directory
            .account(account)
            .map(|a| a.name.clone())
            .ok_or_else(|| CoreError::UnknownAccount(account.to_string()))?;
        self.logout(id)?;

        if let Some(account) = self.directory.account_mut(&name) {
            account.sessions.push(id);
        }
        let nick = {
            let session = self
                .registry
                .get_mut(id)
                .ok_or(CoreError::UnknownSession)?;
            session.account = Some(name.clone());
            session.nick.clone()
        };
        debug!(nick = %nick, account = %name, "Logged in");

        self.update_host(id);
        self.emit(Directive::DeliverNotifications {
            account: name,
            target: nick,
        });
        Ok(())
    }

    /// Drop a session's account link. Logging out twice is harmless.
    pub fn logout(&mut self, id: SessionId) -> CoreResult<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        let Some(name) = session.account.take() else {
            return Ok(());
        };
        if let Some(account) = self.directory.account_mut(&name) {
            account.sessions.retain(|&s| s != id);
        }
        debug!(account = %name, "Logged out");
        Ok(())
    }

    /// Log in and, when the account owns the current nickname, mark the
    /// client identified on it. Any collision in flight for the nickname is
    /// called off.
    pub fn identify(&mut self, id: SessionId, account: &str) -> CoreResult<()> {
        self.login(id, account)?;
        let nick = self
            .registry
            .get(id)
            .map(|s| s.nick.clone())
            .ok_or(CoreError::UnknownSession)?;

        if !self.is_identified(id, true) {
            return Ok(());
        }

        if self.enforcer.end_collision(&nick) {
            debug!(nick = %nick, "Collision called off");
        }
        let now = self.now();
        if let Some(record) = self.directory.nick_mut(&nick) {
            record.flags.collided = false;
            record.last_seen = now;
        }
        self.set_mode(id, UserModeName::Registered, None);

        let account = self
            .registry
            .get(id)
            .and_then(|s| s.account.clone())
            .unwrap_or_default();
        info!(nick = %nick, account = %account, "Identified");
        self.emit(Directive::AutoIdentify {
            target: nick,
            account,
        });
        Ok(())
    }

    /// Logged in at all, or (with `check_nick`) to the account that owns the
    /// current nickname.
    pub fn is_identified(&self, id: SessionId, check_nick: bool) -> bool {
        let Some(session) = self.registry.get(id) else {
            return false;
        };
        let Some(account) = session.account.as_deref() else {
            return false;
        };
        if !check_nick {
            return true;
        }
        self.directory
            .nick(&session.nick)
            .is_some_and(|record| irc_eq(&record.account, account))
    }

    /// On the access list of the account owning the current nickname. With
    /// `check_secure`, recognition on a SECURE account does not count.
    pub fn is_recognized(&self, id: SessionId, check_secure: bool) -> bool {
        let Some(session) = self.registry.get(id) else {
            return false;
        };
        if !session.on_access {
            return false;
        }
        if !check_secure {
            return true;
        }
        !self
            .directory
            .nick(&session.nick)
            .and_then(|record| self.directory.account(&record.account))
            .is_some_and(|account| account.flags.secure)
    }

    fn compute_on_access(&self, id: SessionId) -> bool {
        let Some(session) = self.registry.get(id) else {
            return false;
        };
        let Some(account) = self
            .directory
            .nick(&session.nick)
            .and_then(|record| self.directory.account(&record.account))
        else {
            return false;
        };
        account
            .access
            .iter()
            .any(|mask| session.matches_usermask(mask, &self.config.network))
    }

    // === Host, ident and realname ===

    /// Recompute recognition and refresh the nickname's last usermask.
    pub(crate) fn update_host(&mut self, id: SessionId) {
        let on_access = self.compute_on_access(id);
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        if session.host.is_empty() {
            return;
        }
        session.on_access = on_access;

        if self.is_identified(id, true) || self.is_recognized(id, true) {
            let Some(session) = self.registry.get(id) else {
                return;
            };
            let usermask = session.usermask(&self.config.network);
            let nick = session.nick.clone();
            if let Some(record) = self.directory.nick_mut(&nick) {
                record.last_usermask = usermask;
            }
        }
    }

    pub fn set_displayed_host(&mut self, id: SessionId, host: &str) -> CoreResult<()> {
        if host.is_empty() {
            return Err(CoreError::InvalidArgument("empty host"));
        }
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.vhost = host.to_string();
        debug!(nick = %session.nick, vhost = %host, "Displayed host changed");
        self.update_host(id);
        Ok(())
    }

    pub fn set_cloaked_host(&mut self, id: SessionId, host: &str) -> CoreResult<()> {
        if host.is_empty() {
            return Err(CoreError::InvalidArgument("empty host"));
        }
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.chost = host.to_string();
        self.update_host(id);
        Ok(())
    }

    pub fn set_ident(&mut self, id: SessionId, ident: &str) -> CoreResult<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.ident = ident.to_string();
        self.update_host(id);
        Ok(())
    }

    pub fn set_vident(&mut self, id: SessionId, ident: &str) -> CoreResult<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.vident = ident.to_string();
        self.update_host(id);
        Ok(())
    }

    pub fn set_realname(&mut self, id: SessionId, realname: &str) -> CoreResult<()> {
        if realname.is_empty() {
            return Err(CoreError::InvalidArgument("empty realname"));
        }
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;
        session.realname = realname.to_string();
        let nick = session.nick.clone();

        if (self.is_identified(id, true) || self.is_recognized(id, true))
            && let Some(record) = self.directory.nick_mut(&nick)
        {
            record.last_realname = realname.to_string();
        }
        Ok(())
    }

    // === Departure ===

    /// The client quit.
    pub fn quit(&mut self, id: SessionId, reason: &str) -> CoreResult<()> {
        let session = self.registry.get(id).ok_or(CoreError::UnknownSession)?;
        if self.config.logging.log_users {
            info!(nick = %session.nick, mask = %session.mask(), reason = %reason, "User quit");
        }
        self.stamp_departure(id, reason);
        self.destroy(id);
        Ok(())
    }

    /// The network removed the client.
    pub fn kill(&mut self, id: SessionId, reason: &str) -> CoreResult<()> {
        let session = self.registry.get(id).ok_or(CoreError::UnknownSession)?;
        debug!(nick = %session.nick, reason = %reason, "Killed");
        self.stamp_departure(id, reason);
        self.destroy(id);
        Ok(())
    }

    /// Ask the network to kill `nick`. An empty `source` means the services
    /// server itself. When the daemon will not echo a QUIT back, the
    /// session is destroyed right away.
    pub fn kill_user(&mut self, source: &str, nick: &str, reason: &str) {
        if nick.is_empty() {
            return;
        }
        let source = if source.is_empty() {
            self.config.server.name.clone()
        } else {
            source.to_string()
        };
        let reason = format!("{source} ({reason})");

        info!(nick = %nick, reason = %reason, "Killing user");
        self.emit(Directive::Kill {
            source,
            target: nick.to_string(),
            reason: reason.clone(),
        });

        if !self.config.network.quit_on_kill
            && let Some(id) = self.registry.lookup_by_nick(nick)
            && let Err(e) = self.kill(id, &reason)
        {
            warn!(error = %e, "Immediate kill failed");
        }
    }

    /// Record when and why the owner of a registered nickname left.
    fn stamp_departure(&mut self, id: SessionId, reason: &str) {
        let Some(nick) = self.registry.get(id).map(|s| s.nick.clone()) else {
            return;
        };
        let Some(record) = self.directory.nick(&nick) else {
            return;
        };
        if record.flags.forbidden {
            return;
        }
        let suspended = self
            .directory
            .account(&record.account)
            .is_some_and(|a| a.flags.suspended);
        if suspended || !(self.is_recognized(id, false) || self.is_identified(id, true)) {
            return;
        }

        let now = self.now();
        if let Some(record) = self.directory.nick_mut(&nick) {
            record.last_seen = now;
            record.last_quit = reason.to_string();
        }
    }

    /// Tear a session down.
    ///
    /// Detaches it from the indices, its account, the channel table and
    /// the mode stacker, in that order, and only then runs the cleanup hook
    /// on the nickname it held. Returns false if it was already gone.
    pub fn destroy(&mut self, id: SessionId) -> bool {
        let Some(session) = self.registry.destroy(id) else {
            return false;
        };

        if let Some(name) = session.account.as_deref()
            && let Some(account) = self.directory.account_mut(name)
        {
            account.sessions.retain(|&s| s != id);
        }

        let channels: Vec<String> = session.channels.iter().cloned().collect();
        self.channels.leave_all_channels(id, &session.nick, &channels);

        // protect timers name this id, which is never handed out again
        self.modes.discard(id);
        if session.has_mode(UserModeName::Oper) {
            self.track_oper(false);
        }

        self.cancel(&session.nick);
        true
    }
}
