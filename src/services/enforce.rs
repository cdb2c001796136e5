//! Nickname enforcement.
//!
//! Decides what happens to a client sitting on a nickname it may not hold
//! and owns the timers that follow from that decision.
//!
//! A collision either force-renames the client to a guest nickname or
//! kills it. Either way the client leaves the nickname through the normal
//! rename or destroy path, and only once it is fully detached does
//! [`Services::cancel`] run against the nickname *string*. That hook then
//! holds the nickname with a placeholder client (or a server-side hold)
//! and schedules its release.
//!
//! Timers are keyed by nickname and are never cancelled. Each one looks
//! the nickname up again when it fires and does nothing if the world has
//! moved on.

use super::{AccountDirectory, ChannelMembership, Directive, Services};
use crate::casemap::irc_to_lower;
use crate::state::SessionId;
use rand::Rng;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::{debug, info};

const ENFORCER_REALNAME: &str = "Services Enforcer";

/// What a timer does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerKind {
    /// Quit the placeholder holding `nick`.
    Release { nick: String },
    /// Collide `session` off `nick` unless it has identified by now.
    Protect { nick: String, session: SessionId },
}

impl TimerKind {
    pub fn nick(&self) -> &str {
        match self {
            Self::Release { nick } | Self::Protect { nick, .. } => nick,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Release { .. } => "release",
            Self::Protect { .. } => "protect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Timer {
    deadline: i64,
    seq: u64,
    kind: TimerKind,
}

/// An enforcer client holding a collided nickname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    pub nick: String,
    /// When the release timer for this placeholder is due.
    pub release_at: i64,
}

/// Timer queue, outstanding placeholders and in-flight collisions.
#[derive(Debug, Default)]
pub struct Enforcer {
    timers: BinaryHeap<Reverse<Timer>>,
    next_seq: u64,
    /// Keyed by folded nickname.
    placeholders: HashMap<String, Placeholder>,
    /// Folded nicknames with a forced rename or kill on the way.
    pending: HashSet<String>,
}

impl Enforcer {
    pub(crate) fn schedule(&mut self, deadline: i64, kind: TimerKind) {
        debug!(kind = kind.label(), nick = %kind.nick(), deadline, "Timer scheduled");
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Reverse(Timer {
            deadline,
            seq,
            kind,
        }));
    }

    /// Pop the earliest timer if it is due at `now`.
    pub(crate) fn pop_due(&mut self, now: i64) -> Option<(i64, TimerKind)> {
        match self.timers.peek() {
            Some(Reverse(timer)) if timer.deadline <= now => {}
            _ => return None,
        }
        self.timers
            .pop()
            .map(|Reverse(timer)| (timer.deadline, timer.kind))
    }

    pub fn next_deadline(&self) -> Option<i64> {
        self.timers.peek().map(|Reverse(timer)| timer.deadline)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn placeholder(&self, nick: &str) -> Option<&Placeholder> {
        self.placeholders.get(&irc_to_lower(nick))
    }

    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    pub fn is_collision_pending(&self, nick: &str) -> bool {
        self.pending.contains(&irc_to_lower(nick))
    }

    /// Returns false if a collision was already pending.
    pub(crate) fn begin_collision(&mut self, nick: &str) -> bool {
        self.pending.insert(irc_to_lower(nick))
    }

    /// Returns whether a collision was pending.
    pub(crate) fn end_collision(&mut self, nick: &str) -> bool {
        self.pending.remove(&irc_to_lower(nick))
    }

    pub(crate) fn clear(&mut self) {
        self.timers.clear();
        self.placeholders.clear();
        self.pending.clear();
    }
}

impl<D: AccountDirectory, C: ChannelMembership> Services<D, C> {
    /// Check a client against the registration of the nickname it is on.
    ///
    /// Runs after introduction and after a rename onto a nickname the
    /// client's account does not own. May collide the client, which can
    /// destroy it before this returns.
    pub(crate) fn validate(&mut self, id: SessionId) {
        let Some(session) = self.registry.get(id) else {
            return;
        };
        let nick = session.nick.clone();
        let on_access = session.on_access;
        let usermask = session.usermask(&self.config.network);
        let realname = session.realname.clone();

        let Some(record) = self.directory.nick(&nick) else {
            return;
        };
        if self.is_identified(id, true) {
            return;
        }
        let forbidden = record.flags.forbidden;
        let flags = self
            .directory
            .account(&record.account)
            .map(|a| a.flags.clone())
            .unwrap_or_default();
        let services_nick = self.config.server.services_nick.clone();

        if forbidden || flags.suspended {
            let text = if forbidden {
                "This nickname may not be used. Please choose another one."
            } else {
                "This nickname has been suspended and may not be used."
            };
            self.notice(&nick, text.to_string());
            self.collide(id);
            return;
        }

        if on_access && !flags.secure {
            let now = self.now();
            if let Some(record) = self.directory.nick_mut(&nick) {
                record.last_seen = now;
                record.last_usermask = usermask;
                record.last_realname = realname;
            }
            return;
        }

        let immediate = flags.kill_protect && flags.kill_immed;
        if !immediate {
            let text = if flags.secure {
                format!(
                    "This nickname is registered and protected. If it is your nick, type \
                     /msg {services_nick} IDENTIFY password. Otherwise, please choose a different nick."
                )
            } else {
                format!(
                    "This nick is owned by someone else. Please choose another. \
                     (If this is your nick, type /msg {services_nick} IDENTIFY password.)"
                )
            };
            self.notice(&nick, text);
        }

        if !flags.kill_protect {
            return;
        }
        if immediate {
            self.notice(
                &nick,
                "This nickname has been registered; you may not use it.".to_string(),
            );
            self.collide(id);
            return;
        }

        let delay = if flags.kill_quick {
            self.config.nickserv.protect_quick_delay
        } else {
            self.config.nickserv.protect_delay
        };
        self.notice(
            &nick,
            format!("If you do not change within {delay} seconds, I will change your nick."),
        );
        let deadline = self.now() + delay as i64;
        self.enforcer
            .schedule(deadline, TimerKind::Protect { nick, session: id });
    }

    /// Get a client off the nickname it is on: a forced rename to a guest
    /// nickname when the network supports it, a kill otherwise.
    pub fn collide(&mut self, id: SessionId) {
        let Some(nick) = self.registry.get(id).map(|s| s.nick.clone()) else {
            return;
        };
        if !self.enforcer.begin_collision(&nick) {
            debug!(nick = %nick, "Collision already pending");
            return;
        }
        if let Some(record) = self.directory.nick_mut(&nick) {
            record.flags.collided = true;
        }

        if self.config.network.svsnick {
            let guest = self.guest_nick();
            info!(nick = %nick, guest = %guest, "Forcing nick change");
            self.notice(&nick, format!("Your nickname is now being changed to {guest}"));
            let ts = self.now();
            self.emit(Directive::ForceNick {
                target: nick,
                new_nick: guest,
                ts,
            });
        } else {
            let source = self.config.server.services_nick.clone();
            self.kill_user(&source, &nick, "Services nickname-enforcer kill");
        }
    }

    /// Guest prefix plus a random 16-bit suffix, not held by anyone.
    pub(crate) fn guest_nick(&self) -> String {
        let prefix = &self.config.nickserv.guest_prefix;
        let mut rng = rand::thread_rng();
        loop {
            let suffix: u16 = rng.gen_range(0..=u16::MAX);
            let guest = format!("{prefix}{suffix}");
            if self.registry.lookup_by_nick(&guest).is_none() {
                return guest;
            }
        }
    }

    /// Cleanup hook for a nickname a client has just left.
    ///
    /// Callers must have finished detaching the client. The current holder
    /// is resolved here by lookup; it may be nobody, or an unrelated client
    /// that has already taken the nickname.
    pub(crate) fn cancel(&mut self, nick: &str) {
        let was_pending = self.enforcer.end_collision(nick);
        if !was_pending && self.directory.nick(nick).is_none() {
            return;
        }

        let holder = self.registry.lookup_by_nick(nick);
        self.directory.on_cancel(nick, holder);

        let Some(record) = self.directory.nick_mut(nick) else {
            return;
        };
        if !record.flags.collided {
            return;
        }
        record.flags.collided = false;

        if holder.is_some() {
            debug!(nick = %nick, "Nickname reclaimed before it could be held");
            return;
        }
        record.flags.held = true;

        if self.config.network.svshold {
            let duration = self.config.nickserv.release_timeout;
            self.emit(Directive::Hold {
                nick: nick.to_string(),
                duration,
            });
            return;
        }

        let ident = self.config.nickserv.enforcer_user.clone();
        let host = self.config.nickserv.enforcer_host.clone();
        self.emit(Directive::IntroducePlaceholder {
            nick: nick.to_string(),
            ident,
            host,
            realname: ENFORCER_REALNAME.to_string(),
        });

        let release_at = self.now() + self.config.nickserv.release_timeout as i64;
        self.enforcer.placeholders.insert(
            irc_to_lower(nick),
            Placeholder {
                nick: nick.to_string(),
                release_at,
            },
        );
        self.enforcer.schedule(
            release_at,
            TimerKind::Release {
                nick: nick.to_string(),
            },
        );
    }

    pub(crate) fn fire_timer(&mut self, deadline: i64, kind: TimerKind) {
        let span = crate::telemetry::spans::timer(kind.label(), kind.nick());
        let _enter = span.enter();

        match kind {
            TimerKind::Release { nick } => self.release(&nick, deadline),
            TimerKind::Protect { nick, session } => {
                if self.registry.lookup_by_nick(&nick) != Some(session) {
                    debug!("Client left the nickname; nothing to enforce");
                    return;
                }
                if self.is_identified(session, true) || self.is_recognized(session, true) {
                    debug!("Client identified in time");
                    return;
                }
                info!(nick = %nick, "Protection delay expired");
                self.collide(session);
            }
        }
    }

    fn release(&mut self, nick: &str, deadline: i64) {
        let key = irc_to_lower(nick);

        if self.registry.lookup_by_nick(nick).is_some() {
            // a real client has the name now; the placeholder is gone
            self.enforcer.placeholders.remove(&key);
            if let Some(record) = self.directory.nick_mut(nick) {
                record.flags.held = false;
            }
            debug!("Nickname reclaimed; release skipped");
            return;
        }

        match self.enforcer.placeholders.get(&key) {
            Some(placeholder) if placeholder.release_at <= deadline => {}
            _ => {
                debug!("No placeholder for this timer");
                return;
            }
        }
        let Some(placeholder) = self.enforcer.placeholders.remove(&key) else {
            return;
        };
        if let Some(record) = self.directory.nick_mut(nick) {
            record.flags.held = false;
        }
        info!(nick = %placeholder.nick, "Releasing held nickname");
        self.emit(Directive::ReleasePlaceholder {
            nick: placeholder.nick,
        });
    }
}
