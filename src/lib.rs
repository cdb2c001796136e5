//! slircd-services - client registry, identity state and nickname
//! enforcement for an IRC services daemon.
//!
//! The core is single-threaded and never touches the network: the driver
//! feeds it [`services::Event`]s and timer ticks, and collects the
//! [`services::Directive`]s it produces.

pub mod casemap;
pub mod clock;
pub mod config;
pub mod error;
pub mod services;
pub mod state;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use services::{
    AccountDirectory, ChannelMembership, ChannelTable, Directive, Event, GuardVerdict,
    Introduction, MemoryDirectory, NetworkOutput, Services,
};
pub use state::{Session, SessionId, UserModeName};
