//! Default value functions for configuration.

pub fn default_true() -> bool {
    true
}

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "services.straylight.net".to_string()
}

pub fn default_services_nick() -> String {
    "NickServ".to_string()
}

pub fn default_operserv_nick() -> String {
    "OperServ".to_string()
}

// =============================================================================
// NickServ Defaults
// =============================================================================

pub fn default_guest_prefix() -> String {
    "Guest".to_string()
}

pub fn default_enforcer_user() -> String {
    "enforcer".to_string()
}

pub fn default_enforcer_host() -> String {
    "services.enforcer".to_string()
}

pub fn default_release_timeout() -> u64 {
    60
}

pub fn default_protect_delay() -> u64 {
    60
}

pub fn default_protect_quick_delay() -> u64 {
    20
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_bad_pass_limit() -> u32 {
    5
}

pub fn default_bad_pass_timeout() -> u64 {
    3600
}

// =============================================================================
// Network Defaults
// =============================================================================

pub fn default_max_modes() -> usize {
    6
}
