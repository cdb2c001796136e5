//! Session state owned by the services core.
//!
//! Contains the registry, the session records it owns, mode descriptors
//! and the runtime counters.

pub mod modes;
mod registry;
mod session;
mod stats;

pub use modes::{ModeDescriptor, ModeKind, ModeLine, ModeRegistry, UserModeName};
pub use registry::Registry;
pub use session::{Session, SessionId};
pub use stats::StatsManager;
