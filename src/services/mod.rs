//! The services core.
//!
//! [`Services`] owns the client registry, the mode stacker and the
//! enforcement timers, and sits on top of two collaborators: the account
//! directory and the channel membership table. Inbound protocol events go
//! through [`Services::handle`] one at a time. Anything the core wants the
//! network to do is queued as a [`Directive`] until the driver collects it
//! with [`Services::take_directives`].

pub mod channels;
pub mod directory;
mod enforce;
mod guard;
mod identity;
pub mod output;
mod umode;

pub use channels::{ChannelMembership, ChannelTable};
pub use directory::{
    Account, AccountDirectory, AccountFlags, MemoryDirectory, NickFlags, NickRecord, SeedError,
};
pub use enforce::{Enforcer, Placeholder, TimerKind};
pub use guard::GuardVerdict;
pub use output::{Directive, JsonOutput, LogOutput, NetworkOutput};

use crate::casemap::irc_to_lower;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::CoreResult;
use crate::state::{ModeRegistry, Registry, Session, SessionId, StatsManager};
use crate::telemetry::spans;
use serde::Deserialize;
use tracing::{info, warn};

/// A client introduction as reported by the uplink.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Introduction {
    pub nick: String,
    #[serde(default)]
    pub uid: Option<String>,
    pub ident: String,
    pub host: String,
    /// `*` or empty when the client has none.
    #[serde(default)]
    pub vhost: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub realname: String,
    #[serde(default)]
    pub ts: i64,
    #[serde(default)]
    pub server: String,
    /// Initial user modes, parameters space-separated after the letters.
    #[serde(default)]
    pub modes: String,
}

/// One inbound protocol event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Introduce(Introduction),
    Nick {
        old: String,
        new: String,
        #[serde(default)]
        ts: i64,
    },
    Mode {
        nick: String,
        modes: String,
        #[serde(default)]
        params: Vec<String>,
    },
    Quit {
        nick: String,
        #[serde(default)]
        reason: String,
    },
    Kill {
        nick: String,
        #[serde(default)]
        reason: String,
    },
    Join {
        nick: String,
        channel: String,
    },
    Part {
        nick: String,
        channel: String,
    },
    ChangeHost {
        nick: String,
        host: String,
    },
    ChangeIdent {
        nick: String,
        ident: String,
    },
    ChangeRealname {
        nick: String,
        realname: String,
    },
    Identify {
        nick: String,
        account: String,
    },
    Logout {
        nick: String,
    },
    BadPassword {
        nick: String,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Introduce(_) => "introduce",
            Self::Nick { .. } => "nick",
            Self::Mode { .. } => "mode",
            Self::Quit { .. } => "quit",
            Self::Kill { .. } => "kill",
            Self::Join { .. } => "join",
            Self::Part { .. } => "part",
            Self::ChangeHost { .. } => "change_host",
            Self::ChangeIdent { .. } => "change_ident",
            Self::ChangeRealname { .. } => "change_realname",
            Self::Identify { .. } => "identify",
            Self::Logout { .. } => "logout",
            Self::BadPassword { .. } => "bad_password",
        }
    }

    /// The nickname the event is about.
    pub fn nick(&self) -> &str {
        match self {
            Self::Introduce(intro) => &intro.nick,
            Self::Nick { old, .. } => old,
            Self::Mode { nick, .. }
            | Self::Quit { nick, .. }
            | Self::Kill { nick, .. }
            | Self::Join { nick, .. }
            | Self::Part { nick, .. }
            | Self::ChangeHost { nick, .. }
            | Self::ChangeIdent { nick, .. }
            | Self::ChangeRealname { nick, .. }
            | Self::Identify { nick, .. }
            | Self::Logout { nick }
            | Self::BadPassword { nick } => nick,
        }
    }
}

/// Client state for one services instance.
pub struct Services<D: AccountDirectory = MemoryDirectory, C: ChannelMembership = ChannelTable> {
    pub(crate) config: Config,
    pub(crate) registry: Registry,
    pub(crate) modes: ModeRegistry,
    pub(crate) directory: D,
    pub(crate) channels: C,
    pub(crate) enforcer: Enforcer,
    clock: Box<dyn Clock>,
    outbox: Vec<Directive>,
}

impl<D: AccountDirectory, C: ChannelMembership> Services<D, C> {
    pub fn new(config: Config, directory: D, channels: C, clock: impl Clock + 'static) -> Self {
        info!(
            server = %config.server.name,
            svsnick = config.network.svsnick,
            svshold = config.network.svshold,
            "Services core starting"
        );
        Self {
            registry: Registry::new(config.logging.log_max_users),
            modes: ModeRegistry::new(config.network.max_modes),
            enforcer: Enforcer::default(),
            config,
            directory,
            channels,
            clock: Box::new(clock),
            outbox: Vec::new(),
        }
    }

    /// Process one inbound event to completion.
    pub fn handle(&mut self, event: Event) {
        let span = spans::event(event.kind(), event.nick());
        let _enter = span.enter();

        if let Err(e) = self.dispatch(event) {
            warn!(error = %e, code = e.error_code(), "Event dropped");
        }
        self.flush_modes();
    }

    fn dispatch(&mut self, event: Event) -> CoreResult<()> {
        match event {
            Event::Introduce(intro) => self.introduce_client(intro).map(|_| ()),
            Event::Nick { old, new, ts } => match self.target(&old, "NICK") {
                Some(id) => self.rename(id, &new, ts),
                None => Ok(()),
            },
            Event::Mode {
                nick,
                modes,
                params,
            } => {
                if let Some(id) = self.target(&nick, "MODE") {
                    self.apply_network_modes(id, &modes, &params);
                }
                Ok(())
            }
            Event::Quit { nick, reason } => match self.target(&nick, "QUIT") {
                Some(id) => self.quit(id, &reason),
                None => Ok(()),
            },
            Event::Kill { nick, reason } => match self.target(&nick, "KILL") {
                Some(id) => self.kill(id, &reason),
                None => Ok(()),
            },
            Event::Join { nick, channel } => match self.target(&nick, "JOIN") {
                Some(id) => self.join(id, &channel),
                None => Ok(()),
            },
            Event::Part { nick, channel } => match self.target(&nick, "PART") {
                Some(id) => self.part(id, &channel),
                None => Ok(()),
            },
            Event::ChangeHost { nick, host } => match self.target(&nick, "CHGHOST") {
                Some(id) => self.set_displayed_host(id, &host),
                None => Ok(()),
            },
            Event::ChangeIdent { nick, ident } => match self.target(&nick, "CHGIDENT") {
                Some(id) => self.set_vident(id, &ident),
                None => Ok(()),
            },
            Event::ChangeRealname { nick, realname } => match self.target(&nick, "CHGNAME") {
                Some(id) => self.set_realname(id, &realname),
                None => Ok(()),
            },
            Event::Identify { nick, account } => match self.target(&nick, "IDENTIFY") {
                Some(id) => self.identify(id, &account),
                None => Ok(()),
            },
            // the event may name a UID; directives always address the current nick
            Event::Logout { nick } => {
                if let Some(id) = self.target(&nick, "LOGOUT") {
                    self.logout(id)?;
                    if self.remove_mode(id, crate::state::UserModeName::Registered)
                        && let Some(current) = self.current_nick(id)
                    {
                        self.emit(Directive::UnregisteredNick { target: current });
                    }
                }
                Ok(())
            }
            Event::BadPassword { nick } => {
                if let Some(id) = self.target(&nick, "bad password")
                    && self.bad_password(id)? == GuardVerdict::Terminate
                    && let Some(current) = self.current_nick(id)
                {
                    self.kill_user("", &current, guard::BAD_PASSWORD_REASON);
                }
                Ok(())
            }
        }
    }

    /// Resolve an event's subject, logging the miss.
    fn target(&self, nick: &str, what: &'static str) -> Option<SessionId> {
        let found = self.registry.find(nick);
        if found.is_none() {
            warn!(nick = %nick, event = what, "Event for nonexistent nick");
        }
        found
    }

    fn current_nick(&self, id: SessionId) -> Option<String> {
        self.registry.get(id).map(|s| s.nick.clone())
    }

    /// Fire every timer that is due. Returns how many fired.
    pub fn run_timers(&mut self) -> usize {
        let now = self.now();
        let mut fired = 0;
        while let Some((deadline, kind)) = self.enforcer.pop_due(now) {
            self.fire_timer(deadline, kind);
            fired += 1;
        }
        self.flush_modes();
        fired
    }

    /// Deadline of the earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<i64> {
        self.enforcer.next_deadline()
    }

    /// Drain the queued directives, oldest first.
    pub fn take_directives(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.outbox)
    }

    /// Log every session out and drop all client state. Cleanup hooks do
    /// not run; nothing is sent to the network.
    pub fn shutdown(&mut self) {
        for id in self.registry.ids() {
            if let Err(e) = self.logout(id) {
                warn!(error = %e, "Logout during shutdown failed");
            }
        }
        let users = self.registry.len();
        self.registry.clear();
        self.enforcer.clear();
        self.modes.flush();
        info!(users, "Services core shut down");
    }

    // === Accessors ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.registry.get(id)
    }

    /// Look a client up by nickname or UID.
    pub fn find(&self, name: &str) -> Option<SessionId> {
        self.registry.find(name)
    }

    pub fn stats(&self) -> &StatsManager {
        self.registry.stats()
    }

    pub fn directory(&self) -> &D {
        &self.directory
    }

    pub fn directory_mut(&mut self) -> &mut D {
        &mut self.directory
    }

    pub fn channels(&self) -> &C {
        &self.channels
    }

    pub fn enforcer(&self) -> &Enforcer {
        &self.enforcer
    }

    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    // === Internal helpers ===

    pub(crate) fn emit(&mut self, directive: Directive) {
        self.outbox.push(directive);
    }

    pub(crate) fn notice(&mut self, target: &str, text: String) {
        let source = self.config.server.services_nick.clone();
        self.emit(Directive::Notice {
            source,
            target: target.to_string(),
            text,
        });
    }

    fn join(&mut self, id: SessionId, channel: &str) -> CoreResult<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(crate::error::CoreError::UnknownSession)?;
        session.channels.insert(irc_to_lower(channel));
        self.channels.join(channel, id);
        Ok(())
    }

    fn part(&mut self, id: SessionId, channel: &str) -> CoreResult<()> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(crate::error::CoreError::UnknownSession)?;
        session.channels.remove(&irc_to_lower(channel));
        self.channels.part(channel, id);
        Ok(())
    }
}
