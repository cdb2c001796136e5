//! Outbound directives.
//!
//! The core never touches the network. Every action it wants the uplink
//! to take is a [`Directive`]; the driver hands them to a
//! [`NetworkOutput`], which turns them into protocol lines.

use serde::Serialize;
use std::io::Write;
use tracing::{info, warn};

/// An action for the uplink to carry out. Targets are nicknames as they
/// were at the time the directive was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    /// Remove a client from the network.
    Kill {
        source: String,
        target: String,
        reason: String,
    },

    /// Force a nick change (SVSNICK).
    ForceNick {
        target: String,
        new_nick: String,
        ts: i64,
    },

    /// A stacked user mode change.
    Modes {
        source: String,
        target: String,
        modes: String,
        params: Vec<String>,
    },

    /// Services notice to a client.
    Notice {
        source: String,
        target: String,
        text: String,
    },

    /// Tell the daemon the client is no longer on a registered nickname.
    UnregisteredNick { target: String },

    /// Tell the daemon the client is identified for its nickname.
    AutoIdentify { target: String, account: String },

    /// Network-wide operator notice.
    OperAnnounce { source: String, text: String },

    /// Introduce an enforcer client sitting on a collided nickname.
    IntroducePlaceholder {
        nick: String,
        ident: String,
        host: String,
        realname: String,
    },

    /// Quit the enforcer client holding `nick`.
    ReleasePlaceholder { nick: String },

    /// Ask the daemon to hold a nickname for `duration` seconds (SVSHOLD).
    Hold { nick: String, duration: u64 },

    /// Deliver anything waiting for an account (memos, notifications).
    DeliverNotifications { account: String, target: String },
}

impl Directive {
    /// Static label for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kill { .. } => "kill",
            Self::ForceNick { .. } => "force_nick",
            Self::Modes { .. } => "modes",
            Self::Notice { .. } => "notice",
            Self::UnregisteredNick { .. } => "unregistered_nick",
            Self::AutoIdentify { .. } => "auto_identify",
            Self::OperAnnounce { .. } => "oper_announce",
            Self::IntroducePlaceholder { .. } => "introduce_placeholder",
            Self::ReleasePlaceholder { .. } => "release_placeholder",
            Self::Hold { .. } => "hold",
            Self::DeliverNotifications { .. } => "deliver_notifications",
        }
    }
}

/// Sink for directives. Fire-and-forget: failures are the sink's problem.
pub trait NetworkOutput {
    fn dispatch(&mut self, directive: &Directive);
}

/// Writes each directive to the log.
#[derive(Debug, Default)]
pub struct LogOutput;

impl NetworkOutput for LogOutput {
    fn dispatch(&mut self, directive: &Directive) {
        info!(kind = directive.kind(), directive = ?directive, "Directive");
    }
}

/// Writes each directive as one JSON line.
#[derive(Debug)]
pub struct JsonOutput<W: Write> {
    writer: W,
}

impl<W: Write> JsonOutput<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> NetworkOutput for JsonOutput<W> {
    fn dispatch(&mut self, directive: &Directive) {
        let result = serde_json::to_writer(&mut self.writer, directive)
            .map_err(std::io::Error::from)
            .and_then(|()| self.writer.write_all(b"\n"));
        if let Err(e) = result {
            warn!(kind = directive.kind(), error = %e, "Failed to write directive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_output_one_line_per_directive() {
        let mut out = JsonOutput::new(Vec::new());
        out.dispatch(&Directive::ReleasePlaceholder {
            nick: "alice".into(),
        });
        out.dispatch(&Directive::Hold {
            nick: "bob".into(),
            duration: 60,
        });

        let text = String::from_utf8(out.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"type":"release_placeholder","nick":"alice"}"#);
        assert_eq!(lines[1], r#"{"type":"hold","nick":"bob","duration":60}"#);
    }

    #[test]
    fn outputs_are_interchangeable() {
        let mut sinks: Vec<Box<dyn NetworkOutput>> =
            vec![Box::new(LogOutput), Box::new(JsonOutput::new(std::io::sink()))];
        for sink in &mut sinks {
            sink.dispatch(&Directive::Kill {
                source: "NickServ".into(),
                target: "mallory".into(),
                reason: "NickServ (test)".into(),
            });
        }
    }

    #[test]
    fn kind_labels() {
        let d = Directive::UnregisteredNick {
            target: "x".into(),
        };
        assert_eq!(d.kind(), "unregistered_nick");
    }
}
