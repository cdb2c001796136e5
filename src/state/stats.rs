//! Runtime statistics.
//!
//! Live and peak session counts plus the global operator count. The
//! registry is the only writer of the session counters and the mode
//! application layer the only writer of the operator counter.

/// Session and operator counters.
#[derive(Debug, Default)]
pub struct StatsManager {
    /// Sessions currently live.
    users: usize,
    /// Highest `users` ever observed.
    peak_users: usize,
    /// Unix time the current peak was reached.
    peak_at: Option<i64>,
    /// Sessions created since startup.
    connections_total: usize,
    /// Sessions with the operator mode.
    opers: usize,
}

impl StatsManager {
    pub fn new() -> Self {
        Self::default()
    }

    // === User Counters ===

    /// Count a new session. Returns the new peak if this is one.
    pub(crate) fn user_connected(&mut self, now: i64) -> Option<usize> {
        self.users += 1;
        self.connections_total += 1;

        if self.users > self.peak_users {
            self.peak_users = self.users;
            self.peak_at = Some(now);
            return Some(self.peak_users);
        }
        None
    }

    pub(crate) fn user_disconnected(&mut self) {
        self.users = self.users.saturating_sub(1);
    }

    // === Operator Counter ===

    pub(crate) fn user_opered(&mut self) {
        self.opers += 1;
    }

    pub(crate) fn user_deopered(&mut self) {
        self.opers = self.opers.saturating_sub(1);
    }

    // === Getters ===

    pub fn users(&self) -> usize {
        self.users
    }

    pub fn peak_users(&self) -> usize {
        self.peak_users
    }

    pub fn peak_at(&self) -> Option<i64> {
        self.peak_at
    }

    pub fn connections_total(&self) -> usize {
        self.connections_total
    }

    pub fn opers(&self) -> usize {
        self.opers
    }
}
