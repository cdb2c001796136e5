//! Bad-password guard.

use super::{AccountDirectory, ChannelMembership, Services};
use crate::error::{CoreError, CoreResult};
use crate::state::{Session, SessionId};
use tracing::info;

pub(crate) const BAD_PASSWORD_REASON: &str = "Too many invalid passwords";

/// Outcome of a failed authentication attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Allow,
    /// The limit was reached; the session should be removed.
    Terminate,
}

impl<D: AccountDirectory, C: ChannelMembership> Services<D, C> {
    /// Count a failed password attempt against a session.
    pub fn bad_password(&mut self, id: SessionId) -> CoreResult<GuardVerdict> {
        let limit = self.config.security.bad_pass_limit;
        let timeout = self.config.security.bad_pass_timeout;
        let now = self.now();
        let session = self
            .registry
            .get_mut(id)
            .ok_or(CoreError::UnknownSession)?;

        let verdict = record_failure(session, limit, timeout, now);
        if verdict == GuardVerdict::Terminate {
            info!(nick = %session.nick, attempts = session.bad_pass_count, "Bad password limit reached");
        }
        Ok(verdict)
    }
}

fn record_failure(session: &mut Session, limit: u32, timeout: u64, now: i64) -> GuardVerdict {
    if limit == 0 {
        return GuardVerdict::Allow;
    }
    if timeout > 0
        && session.bad_pass_time > 0
        && now - session.bad_pass_time > timeout as i64
    {
        session.bad_pass_count = 0;
    }
    session.bad_pass_count += 1;
    session.bad_pass_time = now;

    if session.bad_pass_count >= limit {
        GuardVerdict::Terminate
    } else {
        GuardVerdict::Allow
    }
}
