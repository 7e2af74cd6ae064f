//! Configuration types for the Tollgate gateway.

mod delay;
mod listen;
mod ordered;
mod paths;
mod variables;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use delay::DelayHandle;
pub use listen::{ConnectionPoolConfig, ListenConfig};
pub use ordered::OrderedMap;
pub use paths::{HeaderConfig, IgnoreRewriteConfig, PathRuleConfig};
pub use variables::{CompiledVariable, VariableTable};

/// Errors raised while loading or compiling configuration. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid glob '{pattern}' in '{key}': {reason}")]
    InvalidGlob {
        key: String,
        pattern: String,
        reason: String,
    },
    #[error("invalid regex '{pattern}' in '{key}': {source}")]
    InvalidRegex {
        key: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid variable name '{0}' in 'variables'")]
    InvalidVariable(String),
    #[error("'redirectHost' is required unless 'mockMode' is enabled")]
    MissingRedirectHost,
    #[error("unsupported 'redirectProtocol' '{0}', expected 'http' or 'https'")]
    UnsupportedProtocol(String),
    #[error("incomplete TLS configuration: 'listen.certificate' and 'listen.certificateKey' must both be set")]
    IncompleteTls,
    #[error("'transactionLimit' must be greater than zero")]
    ZeroTransactionLimit,
    #[error("failed to load contract '{path}': {reason}")]
    Contract { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    #[serde(default = "default_redirect_protocol")]
    pub redirect_protocol: String,
    #[serde(default)]
    pub redirect_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_port: Option<u16>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub redirect_base_path: String,

    /// Global header policy, applied before any path rule's.
    #[serde(default)]
    pub headers: HeaderConfig,

    /// Milliseconds added before every response. Mutable at runtime through controls.
    #[serde(default, rename = "globalAPIDelay")]
    pub global_api_delay: u64,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variables: HashMap<String, String>,

    /// Path rules keyed by glob, evaluated in declaration order.
    #[serde(default)]
    pub paths: OrderedMap<PathRuleConfig>,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub path_delays: OrderedMap<u64>,

    #[serde(default)]
    pub mock_mode: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mock_mode_list: Vec<String>,
    #[serde(default)]
    pub mock_mode_pretty: bool,
    /// Mocked requests that fail contract validation are rejected instead of answered.
    #[serde(default = "default_true")]
    pub mock_hard_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_mock_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_redirects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redirect_allow_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_validation: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation_allow_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_path_rewrite: Vec<IgnoreRewriteConfig>,

    /// OpenAPI contract files. The first one is the fallback when no contract claims a path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contracts: Vec<PathBuf>,

    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default = "default_transaction_limit")]
    pub transaction_limit: usize,
}

fn default_redirect_protocol() -> String {
    "http".to_string()
}

fn default_true() -> bool {
    true
}

fn default_transaction_limit() -> usize {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            redirect_protocol: default_redirect_protocol(),
            redirect_host: String::new(),
            redirect_port: None,
            redirect_base_path: String::new(),
            headers: HeaderConfig::default(),
            global_api_delay: 0,
            variables: HashMap::new(),
            paths: OrderedMap::new(),
            path_delays: OrderedMap::new(),
            mock_mode: false,
            mock_mode_list: Vec::new(),
            mock_mode_pretty: false,
            mock_hard_validation: true,
            static_mock_dir: None,
            ignore_redirects: Vec::new(),
            redirect_allow_list: Vec::new(),
            ignore_validation: Vec::new(),
            validation_allow_list: Vec::new(),
            ignore_path_rewrite: Vec::new(),
            contracts: Vec::new(),
            listen: ListenConfig::default(),
            connection_pool: ConnectionPoolConfig::default(),
            transaction_limit: default_transaction_limit(),
        }
    }
}

impl GatewayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse without validating, so command-line overrides can be applied first.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: GatewayConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration that does not need compiling.
    ///
    /// Globs, regexes and variables are checked when the router is compiled.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.redirect_protocol.as_str(), "http" | "https") {
            return Err(ConfigError::UnsupportedProtocol(
                self.redirect_protocol.clone(),
            ));
        }

        if self.redirect_host.is_empty() && !self.mock_mode {
            return Err(ConfigError::MissingRedirectHost);
        }

        if self.listen.certificate.is_some() != self.listen.certificate_key.is_some() {
            return Err(ConfigError::IncompleteTls);
        }

        if self.transaction_limit == 0 {
            return Err(ConfigError::ZeroTransactionLimit);
        }

        Ok(())
    }

    /// The configured redirect target, e.g. `http://backend:8080/base`.
    pub fn redirect_target(&self) -> String {
        let mut url = format!("{}://{}", self.redirect_protocol, self.redirect_host);
        if let Some(port) = self.redirect_port {
            url.push_str(&format!(":{port}"));
        }
        url.push_str(&self.redirect_base_path);
        url
    }
}
