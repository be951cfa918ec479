//! Environment variable names used by this crate for convenient
//! configuration of backends from services.
//!
//! These are purely helpers; the backend types remain decoupled from
//! environment access unless a `from_env` constructor is used.

/// Datadog API key used by the HTTP and buffered backends.
pub const DD_API_KEY_ENV: &str = "DD_API_KEY";

/// Optional Datadog application key.
pub const DD_APP_KEY_ENV: &str = "DD_APP_KEY";

/// Datadog site, e.g. `datadoghq.eu`. The API host is `api.<site>`.
pub const DD_SITE_ENV: &str = "DD_SITE";

/// Host of the local agent receiving DogStatsD datagrams.
pub const DD_AGENT_HOST_ENV: &str = "DD_AGENT_HOST";

/// DogStatsD port of the local agent.
pub const DD_DOGSTATSD_PORT_ENV: &str = "DD_DOGSTATSD_PORT";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
