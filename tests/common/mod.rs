//! Integration test common infrastructure.
//!
//! [`TestNet`] wraps a services core with a manual clock and helpers that
//! feed it events the way the uplink would. The recording collaborators
//! write to a shared log so tests can check the order in which the core
//! calls out during destruction.

#![allow(dead_code)]

use slircd_services::services::{
    Account, AccountDirectory, ChannelMembership, ChannelTable, Directive, Event, Introduction,
    MemoryDirectory, NickRecord, Services,
};
use slircd_services::{Config, ManualClock, SessionId};
use std::cell::RefCell;
use std::rc::Rc;

pub const START: i64 = 1_000_000;

pub type CallLog = Rc<RefCell<Vec<String>>>;

/// Account directory that logs every cleanup-hook call.
pub struct RecordingDirectory {
    pub inner: MemoryDirectory,
    pub log: CallLog,
}

impl AccountDirectory for RecordingDirectory {
    fn nick(&self, nick: &str) -> Option<&NickRecord> {
        self.inner.nick(nick)
    }

    fn nick_mut(&mut self, nick: &str) -> Option<&mut NickRecord> {
        self.inner.nick_mut(nick)
    }

    fn account(&self, name: &str) -> Option<&Account> {
        self.inner.account(name)
    }

    fn account_mut(&mut self, name: &str) -> Option<&mut Account> {
        self.inner.account_mut(name)
    }

    fn on_cancel(&mut self, nick: &str, holder: Option<SessionId>) {
        self.log.borrow_mut().push(format!("cancel {nick}"));
        self.inner.on_cancel(nick, holder);
    }
}

/// Channel table that logs every leave-all call.
pub struct RecordingChannels {
    pub inner: ChannelTable,
    pub log: CallLog,
}

impl ChannelMembership for RecordingChannels {
    fn join(&mut self, channel: &str, session: SessionId) {
        self.inner.join(channel, session);
    }

    fn part(&mut self, channel: &str, session: SessionId) {
        self.inner.part(channel, session);
    }

    fn leave_all_channels(&mut self, session: SessionId, nick: &str, channels: &[String]) {
        self.log.borrow_mut().push(format!("leave {nick}"));
        self.inner.leave_all_channels(session, nick, channels);
    }
}

pub struct TestNet {
    pub svc: Services<RecordingDirectory, RecordingChannels>,
    pub clock: ManualClock,
    pub log: CallLog,
}

impl TestNet {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = ManualClock::new(START);
        let log = CallLog::default();
        let svc = Services::new(
            config,
            RecordingDirectory {
                inner: MemoryDirectory::new(),
                log: log.clone(),
            },
            RecordingChannels {
                inner: ChannelTable::new(),
                log: log.clone(),
            },
            clock.clone(),
        );
        Self { svc, clock, log }
    }

    /// Register `nick` to a new account of the same name and return the
    /// account for further setup.
    pub fn register(&mut self, nick: &str) -> &mut Account {
        let dir = &mut self.svc.directory_mut().inner;
        dir.add_nick(nick, nick);
        dir.add_account(nick)
    }

    /// Register an extra nickname to an existing account.
    pub fn group(&mut self, nick: &str, account: &str) {
        self.svc.directory_mut().inner.add_nick(nick, account);
    }

    pub fn record(&self, nick: &str) -> &NickRecord {
        self.svc.directory().nick(nick).expect("nick is registered")
    }

    pub fn account(&self, name: &str) -> &Account {
        self.svc.directory().account(name).expect("account exists")
    }

    pub fn connect(&mut self, nick: &str, ident: &str, host: &str) -> SessionId {
        self.connect_with(Introduction {
            nick: nick.into(),
            ident: ident.into(),
            host: host.into(),
            realname: format!("{nick} realname"),
            ts: self.clock_now(),
            server: "irc.example.net".into(),
            ..Default::default()
        })
    }

    /// Introduce a client. The returned id may already be dead if the
    /// client was killed on the spot.
    pub fn connect_with(&mut self, intro: Introduction) -> SessionId {
        let id = self
            .svc
            .introduce_client(intro)
            .expect("introduction is valid");
        self.svc.flush_modes();
        id
    }

    pub fn nick(&mut self, old: &str, new: &str) {
        let ts = self.clock_now();
        self.svc.handle(Event::Nick {
            old: old.into(),
            new: new.into(),
            ts,
        });
    }

    pub fn quit(&mut self, nick: &str) {
        self.svc.handle(Event::Quit {
            nick: nick.into(),
            reason: "Quit: bye".into(),
        });
    }

    pub fn identify(&mut self, nick: &str, account: &str) {
        self.svc.handle(Event::Identify {
            nick: nick.into(),
            account: account.into(),
        });
    }

    pub fn advance(&mut self, secs: i64) -> usize {
        self.clock.advance(secs);
        self.svc.run_timers()
    }

    pub fn drain(&mut self) -> Vec<Directive> {
        self.svc.take_directives()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn clock_now(&self) -> i64 {
        self.svc.now()
    }

    /// Every live session is reachable through its nick and UID, and
    /// nothing else is.
    pub fn assert_indices_consistent(&self) {
        let registry = self.svc.registry();
        let mut seen = 0;
        for session in registry.iter() {
            assert_eq!(registry.lookup_by_nick(session.nick()), Some(session.id()));
            if let Some(uid) = session.uid() {
                assert_eq!(registry.lookup_by_uid(uid), Some(session.id()));
            }
            seen += 1;
        }
        assert_eq!(seen, registry.len());
        assert_eq!(registry.stats().users(), registry.len());
    }
}

/// Forced nick changes in a batch of directives.
pub fn force_nicks(directives: &[Directive]) -> Vec<(String, String)> {
    directives
        .iter()
        .filter_map(|d| match d {
            Directive::ForceNick {
                target, new_nick, ..
            } => Some((target.clone(), new_nick.clone())),
            _ => None,
        })
        .collect()
}

pub fn count<F: Fn(&Directive) -> bool>(directives: &[Directive], pred: F) -> usize {
    directives.iter().filter(|d| pred(d)).count()
}
