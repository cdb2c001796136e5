//! Tracing span constructors for the services core.

/// Standardized spans so log lines carry the event or timer they came from.
pub mod spans {
    use tracing::{Span, debug_span, info_span};

    /// Span for one inbound protocol event.
    pub fn event(kind: &str, nick: &str) -> Span {
        info_span!("event", kind = %kind, nick = %nick)
    }

    /// Span for a timer firing.
    pub fn timer(kind: &str, nick: &str) -> Span {
        debug_span!("timer", kind = %kind, nick = %nick)
    }
}
