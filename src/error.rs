//! Error types for the services core.
//!
//! Only genuinely invalid input surfaces as an error. Lookup misses are
//! `None`, policy violations are corrected in place, and the bad-password
//! guard reports a verdict instead of failing.

use thiserror::Error;

/// Errors returned by mutating core operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Empty nickname/host/realname passed to a mutating call.
    /// The caller must not retry with the same input.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The session handle no longer refers to a live session.
    #[error("unknown session")]
    UnknownSession,

    /// Login to an account the directory does not know.
    #[error("unknown account: {0}")]
    UnknownAccount(String),

    /// Rename onto a nickname another live session holds.
    #[error("nickname in use: {0}")]
    NickInUse(String),
}

impl CoreError {
    /// Static label for log fields.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::UnknownSession => "unknown_session",
            Self::UnknownAccount(_) => "unknown_account",
            Self::NickInUse(_) => "nick_in_use",
        }
    }
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
