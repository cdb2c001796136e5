//! User mode application.
//!
//! Two entry points change a session's modes. [`Services::set_mode`] and
//! [`Services::remove_mode`] are services' own changes: they are staged on
//! the stacker for the network and applied locally at once.
//! [`Services::apply_network_modes`] records changes the network has
//! already made. Both go through `apply_mode`, which keeps the operator
//! counter.

use super::{AccountDirectory, ChannelMembership, Directive, Services};
use crate::state::{ModeKind, SessionId, UserModeName};
use tracing::{debug, warn};

impl<D: AccountDirectory, C: ChannelMembership> Services<D, C> {
    /// Set a mode on a session. Returns whether anything changed.
    pub fn set_mode(&mut self, id: SessionId, name: UserModeName, param: Option<&str>) -> bool {
        let Some(desc) = self.modes.by_name(name) else {
            debug!(mode = ?name, "Mode not supported by the network");
            return false;
        };
        let Some(session) = self.registry.get(id) else {
            return false;
        };
        let param = match desc.kind {
            ModeKind::Regular if param.is_some() => {
                warn!(mode = ?name, "Dropping parameter given to a plain mode");
                None
            }
            _ => param,
        };
        let was_set = session.has_mode(name);
        if was_set
            && (desc.kind == ModeKind::Regular || session.mode_param(name) == param)
        {
            return false;
        }
        if desc.kind == ModeKind::Param && param.is_none() {
            warn!(mode = ?name, "Parameterised mode set without a parameter");
            return false;
        }
        if name == UserModeName::Registered && !self.is_identified(id, false) {
            debug!(nick = %session.nick, "Refusing +r for an unidentified client");
            return false;
        }

        let param = param.map(str::to_string);
        self.modes.stage(id, desc, true, param.clone(), was_set);
        self.apply_mode(id, name, true, param);
        true
    }

    /// Remove a mode from a session. Returns whether anything changed.
    pub fn remove_mode(&mut self, id: SessionId, name: UserModeName) -> bool {
        let Some(desc) = self.modes.by_name(name) else {
            return false;
        };
        if !self.registry.get(id).is_some_and(|s| s.has_mode(name)) {
            return false;
        }
        self.modes.stage(id, desc, false, None, true);
        self.apply_mode(id, name, false, None);
        true
    }

    /// Record a mode string the network reports, e.g. `+oix-w`.
    /// Parameterised modes take the next parameter in order whichever way
    /// they change. A removal with none left still applies.
    pub fn apply_network_modes(&mut self, id: SessionId, modes: &str, params: &[String]) {
        let Some(nick) = self.registry.get(id).map(|s| s.nick.clone()) else {
            return;
        };
        debug!(nick = %nick, modes = %modes, "Changing user modes");

        let mut params = params.iter();
        let mut adding = None;
        for letter in modes.chars() {
            match letter {
                '+' => adding = Some(true),
                '-' => adding = Some(false),
                _ => {
                    let Some(adding) = adding else {
                        continue;
                    };
                    let Some(desc) = self.modes.by_letter(letter) else {
                        debug!(letter = %letter, "Unknown user mode");
                        continue;
                    };
                    let param = match desc.kind {
                        ModeKind::Param => params.next(),
                        ModeKind::Regular => None,
                    };
                    if desc.kind == ModeKind::Param && adding && param.is_none() {
                        warn!(letter = %letter, "Missing parameter for user mode");
                        continue;
                    }
                    let param = if adding { param.cloned() } else { None };

                    let had = self.registry.get(id).is_some_and(|s| s.has_mode(desc.name));
                    self.apply_mode(id, desc.name, adding, param);

                    match desc.name {
                        UserModeName::Oper if adding && !had && self.config.logging.wall_oper => {
                            let source = self.config.server.operserv_nick.clone();
                            self.emit(Directive::OperAnnounce {
                                source,
                                text: format!("\x02{nick}\x02 is now an IRC operator."),
                            });
                        }
                        UserModeName::Registered if adding && !self.is_identified(id, false) => {
                            self.remove_mode(id, UserModeName::Registered);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn apply_mode(
        &mut self,
        id: SessionId,
        name: UserModeName,
        adding: bool,
        param: Option<String>,
    ) {
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        let had = session.has_mode(name);
        if adding {
            session.insert_mode(name, param);
        } else {
            session.clear_mode(name);
        }

        if name == UserModeName::Oper && had != adding {
            self.track_oper(adding);
        }
        if matches!(name, UserModeName::Cloak | UserModeName::Vhost) {
            if !adding && let Some(session) = self.registry.get_mut(id) {
                session.vhost.clear();
            }
            self.update_host(id);
        }
    }

    /// The only writer of the operator counter.
    pub(crate) fn track_oper(&mut self, opered: bool) {
        if opered {
            self.registry.stats.user_opered();
        } else {
            self.registry.stats.user_deopered();
        }
    }

    /// Turn everything staged so far into mode directives. [`Services::handle`]
    /// and [`Services::run_timers`] do this on their own; callers driving
    /// the core operations directly flush at their event boundaries.
    pub fn flush_modes(&mut self) {
        let source = self.config.server.services_nick.clone();
        for line in self.modes.flush() {
            let Some(session) = self.registry.get(line.target) else {
                continue;
            };
            let target = session.nick.clone();
            self.emit(Directive::Modes {
                source: source.clone(),
                target,
                modes: line.modes,
                params: line.params,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::services::{ChannelTable, Introduction, MemoryDirectory};

    fn with_client() -> (Services, SessionId) {
        let mut svc = Services::new(
            Config::default(),
            MemoryDirectory::new(),
            ChannelTable::new(),
            ManualClock::new(0),
        );
        let id = svc
            .introduce_client(Introduction {
                nick: "alice".into(),
                ident: "al".into(),
                host: "h.example.com".into(),
                ..Default::default()
            })
            .unwrap();
        (svc, id)
    }

    #[test]
    fn set_is_noop_when_already_set() {
        let (mut svc, id) = with_client();
        assert!(svc.set_mode(id, UserModeName::Invisible, None));
        assert!(!svc.set_mode(id, UserModeName::Invisible, None));
        svc.flush_modes();
        let directives = svc.take_directives();
        assert_eq!(
            directives,
            vec![Directive::Modes {
                source: "NickServ".into(),
                target: "alice".into(),
                modes: "+i".into(),
                params: vec![],
            }]
        );
    }

    #[test]
    fn registered_requires_identification() {
        let (mut svc, id) = with_client();
        assert!(!svc.set_mode(id, UserModeName::Registered, None));
        assert!(!svc.session(id).unwrap().has_mode(UserModeName::Registered));
    }

    #[test]
    fn network_registered_mode_is_corrected() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "+r", &[]);
        assert!(!svc.session(id).unwrap().has_mode(UserModeName::Registered));
        svc.flush_modes();
        let directives = svc.take_directives();
        assert!(matches!(
            directives.as_slice(),
            [Directive::Modes { modes, .. }] if modes == "-r"
        ));
    }

    #[test]
    fn network_oper_announces_and_counts() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "+o", &[]);
        svc.apply_network_modes(id, "+o", &[]);
        assert_eq!(svc.stats().opers(), 1);
        let announces = svc
            .take_directives()
            .into_iter()
            .filter(|d| matches!(d, Directive::OperAnnounce { .. }))
            .count();
        assert_eq!(announces, 1);

        svc.apply_network_modes(id, "-o", &[]);
        assert_eq!(svc.stats().opers(), 0);
    }

    #[test]
    fn param_mode_takes_parameter_in_order() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "+is", &["+cF".to_string()]);
        let s = svc.session(id).unwrap();
        assert!(s.has_mode(UserModeName::Invisible));
        assert_eq!(s.mode_param(UserModeName::Snomask), Some("+cF"));

        svc.apply_network_modes(id, "+s", &[]);
        assert_eq!(svc.session(id).unwrap().mode_param(UserModeName::Snomask), Some("+cF"));

        svc.apply_network_modes(id, "-s", &[]);
        assert_eq!(svc.session(id).unwrap().mode_param(UserModeName::Snomask), None);
    }

    #[test]
    fn param_mode_removal_consumes_its_parameter() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "+s", &["+c".to_string()]);
        svc.apply_network_modes(
            id,
            "-s+s",
            &["+c".to_string(), "+k".to_string()],
        );
        assert_eq!(svc.session(id).unwrap().mode_param(UserModeName::Snomask), Some("+k"));

        svc.apply_network_modes(id, "-s+so", &["+k".to_string(), "+F".to_string()]);
        let s = svc.session(id).unwrap();
        assert_eq!(s.mode_param(UserModeName::Snomask), Some("+F"));
        assert!(s.has_mode(UserModeName::Oper));
    }

    #[test]
    fn parameter_for_plain_mode_is_dropped() {
        let (mut svc, id) = with_client();
        assert!(svc.set_mode(id, UserModeName::Invisible, Some("junk")));
        let s = svc.session(id).unwrap();
        assert!(s.has_mode(UserModeName::Invisible));
        assert_eq!(s.mode_param(UserModeName::Invisible), None);
        svc.flush_modes();
        assert_eq!(
            svc.take_directives(),
            vec![Directive::Modes {
                source: "NickServ".into(),
                target: "alice".into(),
                modes: "+i".into(),
                params: vec![],
            }]
        );
    }

    #[test]
    fn reset_then_removed_param_mode_reaches_network() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "+s", &["+a".to_string()]);
        assert!(svc.set_mode(id, UserModeName::Snomask, Some("+b")));
        assert!(svc.remove_mode(id, UserModeName::Snomask));
        assert!(!svc.session(id).unwrap().has_mode(UserModeName::Snomask));
        svc.flush_modes();
        assert_eq!(
            svc.take_directives(),
            vec![Directive::Modes {
                source: "NickServ".into(),
                target: "alice".into(),
                modes: "-s".into(),
                params: vec![],
            }]
        );
    }

    #[test]
    fn removing_cloak_clears_vhost() {
        let (mut svc, id) = with_client();
        svc.set_displayed_host(id, "v.host").unwrap();
        svc.apply_network_modes(id, "+x", &[]);
        assert_eq!(svc.session(id).unwrap().vhost, "v.host");
        svc.apply_network_modes(id, "-x", &[]);
        let s = svc.session(id).unwrap();
        assert_eq!(s.vhost, "");
        assert_eq!(s.displayed_host(&svc.config().network), "h.example.com");
    }

    #[test]
    fn unknown_letters_and_unsigned_letters_are_skipped() {
        let (mut svc, id) = with_client();
        svc.apply_network_modes(id, "i+!w", &[]);
        let s = svc.session(id).unwrap();
        assert!(!s.has_mode(UserModeName::Invisible));
        assert!(s.has_mode(UserModeName::Wallops));
    }
}
