//! Core configuration types and loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Services configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub nickserv: NickServConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Capabilities of the linked IRC daemon.
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Services server identity.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Our server name, used as the source of server-generated kills.
    #[serde(default = "default_server_name")]
    pub name: String,
    /// Pseudoclient that sends nick enforcement notices and kills.
    #[serde(default = "default_services_nick")]
    pub services_nick: String,
    /// Pseudoclient that sends operator announcements.
    #[serde(default = "default_operserv_nick")]
    pub operserv_nick: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            services_nick: default_services_nick(),
            operserv_nick: default_operserv_nick(),
        }
    }
}

/// Nickname protection and enforcement.
#[derive(Debug, Clone, Deserialize)]
pub struct NickServConfig {
    /// Prefix for forced-rename nicknames (`Guest12345`).
    #[serde(default = "default_guest_prefix")]
    pub guest_prefix: String,
    /// Ident of the placeholder client holding a collided nickname.
    #[serde(default = "default_enforcer_user")]
    pub enforcer_user: String,
    /// Host of the placeholder client holding a collided nickname.
    #[serde(default = "default_enforcer_host")]
    pub enforcer_host: String,
    /// Seconds a collided nickname stays held (default: 60).
    #[serde(default = "default_release_timeout")]
    pub release_timeout: u64,
    /// Seconds a user gets to identify on a protected nickname (default: 60).
    #[serde(default = "default_protect_delay")]
    pub protect_delay: u64,
    /// Same as `protect_delay` for accounts with quick protection (default: 20).
    #[serde(default = "default_protect_quick_delay")]
    pub protect_quick_delay: u64,
}

impl Default for NickServConfig {
    fn default() -> Self {
        Self {
            guest_prefix: default_guest_prefix(),
            enforcer_user: default_enforcer_user(),
            enforcer_host: default_enforcer_host(),
            release_timeout: default_release_timeout(),
            protect_delay: default_protect_delay(),
            protect_quick_delay: default_protect_quick_delay(),
        }
    }
}

/// Authentication abuse limits.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Failed password attempts before the session is killed. 0 disables.
    #[serde(default = "default_bad_pass_limit")]
    pub bad_pass_limit: u32,
    /// Seconds of quiet after which the failure counter resets. 0 never resets.
    #[serde(default = "default_bad_pass_timeout")]
    pub bad_pass_timeout: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            bad_pass_limit: default_bad_pass_limit(),
            bad_pass_timeout: default_bad_pass_timeout(),
        }
    }
}

/// What the uplink IRC daemon supports.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Forced nick changes (SVSNICK). Without it collisions kill.
    #[serde(default = "default_true")]
    pub svsnick: bool,
    /// Server-side nickname holds (SVSHOLD). Without it an enforcer client is used.
    #[serde(default)]
    pub svshold: bool,
    /// Virtual hosts.
    #[serde(default = "default_true")]
    pub vhost: bool,
    /// Virtual idents.
    #[serde(default)]
    pub vident: bool,
    /// The daemon sends a QUIT back for kills we issue.
    #[serde(default = "default_true")]
    pub quit_on_kill: bool,
    /// Mode changes per outgoing MODE line.
    #[serde(default = "default_max_modes")]
    pub max_modes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            svsnick: true,
            svshold: false,
            vhost: true,
            vident: false,
            quit_on_kill: true,
            max_modes: default_max_modes(),
        }
    }
}

/// Logging toggles.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log every connect, nick change and quit.
    #[serde(default)]
    pub log_users: bool,
    /// Log each new peak user count.
    #[serde(default = "default_true")]
    pub log_max_users: bool,
    /// Announce new IRC operators network-wide.
    #[serde(default = "default_true")]
    pub wall_oper: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_users: false,
            log_max_users: true,
            wall_oper: true,
        }
    }
}
