//! Integration tests for mode application, counters and the password guard.

mod common;

use common::{START, TestNet, count};
use slircd_services::services::Directive;
use slircd_services::{Config, Event, UserModeName};

fn mode(nick: &str, modes: &str) -> Event {
    Event::Mode {
        nick: nick.into(),
        modes: modes.into(),
        params: vec![],
    }
}

fn bad_password(nick: &str) -> Event {
    Event::BadPassword { nick: nick.into() }
}

#[test]
fn test_set_then_remove_nets_to_nothing() {
    let mut net = TestNet::new();
    let id = net.connect("alice", "al", "home.example.com");
    net.drain();

    assert!(net.svc.set_mode(id, UserModeName::Oper, None));
    assert_eq!(net.svc.stats().opers(), 1);
    assert!(net.svc.remove_mode(id, UserModeName::Oper));
    net.svc.flush_modes();

    assert!(net.drain().is_empty());
    assert_eq!(net.svc.stats().opers(), 0);
    assert!(!net.svc.session(id).unwrap().has_mode(UserModeName::Oper));
}

#[test]
fn test_oper_counter_follows_sessions() {
    let mut net = TestNet::new();
    net.connect("alice", "al", "a.example.com");
    net.connect("bob", "b", "b.example.com");
    net.svc.handle(mode("alice", "+o"));
    net.svc.handle(mode("bob", "+oi"));
    assert_eq!(net.svc.stats().opers(), 2);

    let announces = net.drain();
    assert_eq!(
        count(&announces, |d| matches!(d, Directive::OperAnnounce { .. })),
        2
    );
    assert!(announces.contains(&Directive::OperAnnounce {
        source: "OperServ".into(),
        text: "\x02alice\x02 is now an IRC operator.".into(),
    }));

    // an oper leaving takes the count down with them
    net.quit("bob");
    assert_eq!(net.svc.stats().opers(), 1);
    net.svc.handle(mode("alice", "-o"));
    assert_eq!(net.svc.stats().opers(), 0);
}

#[test]
fn test_oper_announce_respects_config() {
    let mut config = Config::default();
    config.logging.wall_oper = false;
    let mut net = TestNet::with_config(config);
    net.connect("alice", "al", "a.example.com");
    net.svc.handle(mode("alice", "+o"));

    assert_eq!(net.svc.stats().opers(), 1);
    assert!(net.drain().is_empty());
}

#[test]
fn test_introduced_modes_are_counted() {
    let mut net = TestNet::new();
    let id = net.connect_with(slircd_services::Introduction {
        nick: "root".into(),
        ident: "r".into(),
        host: "staff.example.net".into(),
        modes: "+ois +cF".into(),
        ..Default::default()
    });

    let session = net.svc.session(id).unwrap();
    assert!(session.has_mode(UserModeName::Oper));
    assert_eq!(session.mode_param(UserModeName::Snomask), Some("+cF"));
    assert_eq!(net.svc.stats().opers(), 1);
    // the announce fires for the first +o the network reports
    assert_eq!(
        count(&net.drain(), |d| matches!(d, Directive::OperAnnounce { .. })),
        1
    );
}

#[test]
fn test_network_registered_mode_needs_identification() {
    let mut net = TestNet::new();
    net.register("alice");
    let id = net.connect("alice", "al", "home.example.com");
    net.drain();

    net.svc.handle(mode("alice", "+r"));
    assert!(!net.svc.session(id).unwrap().has_mode(UserModeName::Registered));
    assert_eq!(
        net.drain(),
        vec![Directive::Modes {
            source: "NickServ".into(),
            target: "alice".into(),
            modes: "-r".into(),
            params: vec![],
        }]
    );

    net.identify("alice", "alice");
    net.drain();
    net.svc.handle(mode("alice", "-r"));
    net.svc.handle(mode("alice", "+r"));
    assert!(net.svc.session(id).unwrap().has_mode(UserModeName::Registered));
    assert!(net.drain().is_empty());
}

#[test]
fn test_vhost_mode_changes_displayed_host() {
    let mut config = Config::default();
    config.network.vhost = true;
    let mut net = TestNet::with_config(config);
    let id = net.connect_with(slircd_services::Introduction {
        nick: "alice".into(),
        ident: "al".into(),
        host: "home.example.com".into(),
        vhost: Some("alice.users.example.net".into()),
        modes: "+x".into(),
        ..Default::default()
    });
    net.svc.handle(Event::ChangeHost {
        nick: "alice".into(),
        host: "cool.vhost".into(),
    });
    net.svc.handle(mode("alice", "+t"));

    let network = net.svc.config().network.clone();
    let session = net.svc.session(id).unwrap();
    assert_eq!(session.displayed_host(&network), "cool.vhost");

    net.svc.handle(mode("alice", "-t"));
    let session = net.svc.session(id).unwrap();
    assert_eq!(session.vhost, "");
    assert_eq!(session.displayed_host(&network), "alice.users.example.net");
}

#[test]
fn test_bad_password_limit_kills_from_server() {
    let mut config = Config::default();
    config.security.bad_pass_limit = 3;
    config.security.bad_pass_timeout = 60;
    let mut net = TestNet::with_config(config);
    let id = net.connect("alice", "al", "home.example.com");
    net.drain();

    net.svc.handle(bad_password("alice"));
    net.clock.advance(10);
    net.svc.handle(bad_password("alice"));
    assert!(net.drain().is_empty());

    net.clock.advance(10);
    net.svc.handle(bad_password("alice"));
    assert_eq!(
        net.drain(),
        vec![Directive::Kill {
            source: "services.straylight.net".into(),
            target: "alice".into(),
            reason: "services.straylight.net (Too many invalid passwords)".into(),
        }]
    );
    // the daemon echoes the removal back; until then the session stays
    assert!(net.svc.session(id).is_some());
    assert_eq!(net.svc.session(id).unwrap().bad_pass_count(), 3);
}

#[test]
fn test_bad_password_window_resets_after_idle_gap() {
    let mut config = Config::default();
    config.security.bad_pass_limit = 3;
    config.security.bad_pass_timeout = 60;
    let mut net = TestNet::with_config(config);
    let id = net.connect("alice", "al", "home.example.com");

    net.svc.handle(bad_password("alice"));
    net.svc.handle(bad_password("alice"));
    net.clock.advance(61);
    net.svc.handle(bad_password("alice"));

    assert_eq!(net.svc.session(id).unwrap().bad_pass_count(), 1);
    assert_eq!(
        count(&net.drain(), |d| matches!(d, Directive::Kill { .. })),
        0
    );
}

#[test]
fn test_bad_password_kill_without_echo_destroys() {
    let mut config = Config::default();
    config.security.bad_pass_limit = 1;
    config.network.quit_on_kill = false;
    let mut net = TestNet::with_config(config);
    net.connect("mallory", "m", "evil.example.net");

    net.svc.handle(bad_password("mallory"));
    assert!(net.svc.find("mallory").is_none());
    assert_eq!(net.calls(), vec!["leave mallory"]);
    net.assert_indices_consistent();
}

#[test]
fn test_peak_users_tracks_high_water_mark() {
    let mut net = TestNet::new();
    net.connect("a", "a", "a.example.com");
    net.clock.advance(5);
    net.connect("b", "b", "b.example.com");
    net.quit("a");
    net.clock.advance(5);
    net.connect("c", "c", "c.example.com");

    let stats = net.svc.stats();
    assert_eq!(stats.users(), 2);
    assert_eq!(stats.peak_users(), 2);
    assert_eq!(stats.peak_at(), Some(START + 5));
    assert_eq!(stats.connections_total(), 3);
}

#[test]
fn test_bad_password_by_uid_kills_current_nick() {
    let mut config = Config::default();
    config.security.bad_pass_limit = 1;
    config.network.quit_on_kill = false;
    let mut net = TestNet::with_config(config);
    let id = net.connect_with(slircd_services::Introduction {
        nick: "mallory".into(),
        uid: Some("001AAAAAA".into()),
        ident: "m".into(),
        host: "evil.example.net".into(),
        ..Default::default()
    });
    net.drain();

    net.svc.handle(bad_password("001AAAAAA"));
    assert_eq!(
        net.drain(),
        vec![Directive::Kill {
            source: "services.straylight.net".into(),
            target: "mallory".into(),
            reason: "services.straylight.net (Too many invalid passwords)".into(),
        }]
    );
    assert!(net.svc.session(id).is_none());
    assert!(net.svc.find("mallory").is_none());
    assert!(net.svc.find("001AAAAAA").is_none());
    net.assert_indices_consistent();
}

#[test]
fn test_logout_by_uid_addresses_current_nick() {
    let mut net = TestNet::new();
    net.register("alice");
    let id = net.connect_with(slircd_services::Introduction {
        nick: "alice".into(),
        uid: Some("001AAAAAB".into()),
        ident: "al".into(),
        host: "home.example.com".into(),
        ..Default::default()
    });
    net.identify("alice", "alice");
    net.drain();

    net.svc.handle(Event::Logout {
        nick: "001AAAAAB".into(),
    });
    let out = net.drain();
    assert!(out.contains(&Directive::UnregisteredNick {
        target: "alice".into()
    }));
    assert!(!out.iter().any(|d| matches!(
        d,
        Directive::UnregisteredNick { target } if target == "001AAAAAB"
    )));
    assert!(!net.svc.session(id).unwrap().has_mode(UserModeName::Registered));
}
