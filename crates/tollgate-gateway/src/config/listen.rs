//! Listener and upstream connection pool configuration.

use serde::{Deserialize, Serialize};

/// Gateway and monitor listeners. TLS is enabled when both certificate paths are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_monitor_port")]
    pub monitor_port: u16,
    /// Path to TLS certificate file (PEM format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// Path to TLS private key file (PEM format)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_key: Option<String>,
}

impl ListenConfig {
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.certificate, &self.certificate_key) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls_paths().is_some() {
            "https"
        } else {
            "http"
        }
    }
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            monitor_port: default_monitor_port(),
            certificate: None,
            certificate_key: None,
        }
    }
}

fn default_port() -> u16 {
    9090
}

fn default_monitor_port() -> u16 {
    9091
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionPoolConfig {
    #[serde(default = "default_pool_max_idle_per_host")]
    pub max_idle_per_host: usize,

    #[serde(default = "default_pool_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_keepalive_timeout")]
    pub keepalive_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: default_pool_max_idle_per_host(),
            idle_timeout_secs: default_pool_idle_timeout(),
            keepalive_timeout_secs: default_keepalive_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_pool_max_idle_per_host() -> usize {
    20
}

fn default_pool_idle_timeout() -> u64 {
    30
}

fn default_keepalive_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    5
}
