//! State shared by every request the gateway serves.

use super::client::{create_http_client, CookieJarClient, Transport};
use super::tls::TlsError;
use crate::config::{ConfigError, DelayHandle, GatewayConfig, VariableTable};
use crate::contract::{ContractSet, SchemaExampleGenerator};
use crate::mock::MockEngine;
use crate::routing::PathRouter;
use crate::static_mock::StaticMockService;
use crate::transaction::{Broadcaster, TransactionStore};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to configure TLS: {0}")]
    Tls(#[from] TlsError),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

pub struct GatewayState {
    pub config: Arc<GatewayConfig>,
    pub router: Arc<PathRouter>,
    /// Global delay; adjustable at runtime through the controls.
    pub delay: DelayHandle,
    pub store: Arc<TransactionStore>,
    pub broadcaster: Broadcaster,
    pub contracts: ContractSet,
    pub mock: Arc<MockEngine>,
    pub static_mocks: Option<Arc<StaticMockService>>,
    pub client: CookieJarClient,
    pub redirect_target: String,
}

impl GatewayState {
    /// Compile the configuration and load contracts and static mocks.
    pub fn from_config(config: GatewayConfig) -> Result<Self, StartupError> {
        config.validate()?;
        let variables = Arc::new(VariableTable::compile(&config.variables)?);
        let router = Arc::new(PathRouter::compile(&config, variables)?);
        let contracts = ContractSet::load(&config.contracts)?;
        let client = CookieJarClient::new(Arc::new(create_http_client(&config.connection_pool)?));

        let static_mocks = config
            .static_mock_dir
            .as_ref()
            .map(|dir| Arc::new(StaticMockService::load(dir)));

        let mock = Arc::new(
            MockEngine::new(
                contracts.clone(),
                Arc::new(SchemaExampleGenerator),
                config.mock_mode_pretty,
            )
            .with_hard_validation(config.mock_hard_validation),
        );

        info!(
            redirect = %config.redirect_target(),
            contracts = contracts.len(),
            rules = router.rules().len(),
            mock_mode = config.mock_mode,
            static_mocks = static_mocks.is_some(),
            "Gateway state initialized"
        );

        Ok(Self {
            redirect_target: config.redirect_target(),
            delay: DelayHandle::new(config.global_api_delay),
            store: Arc::new(TransactionStore::new(config.transaction_limit)),
            broadcaster: Broadcaster::default(),
            router,
            contracts,
            mock,
            static_mocks,
            client,
            config: Arc::new(config),
        })
    }

    /// Replace the network transport, e.g. with a scripted one.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.client = CookieJarClient::new(transport);
        self
    }

    /// Per-path delay when one is configured, else the global delay.
    pub fn delay_for(&self, path: &str) -> std::time::Duration {
        match self.router.find_path_delay(path) {
            0 => self.delay.as_duration(),
            ms => std::time::Duration::from_millis(ms),
        }
    }

    pub fn in_mock_mode(&self, path: &str) -> bool {
        self.config.mock_mode || self.router.in_mock_mode_list(path)
    }

    /// Scheme the gateway itself is reached on.
    pub fn scheme(&self) -> &'static str {
        self.config.listen.scheme()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(yaml: &str) -> GatewayState {
        GatewayState::from_config(GatewayConfig::from_yaml(yaml).unwrap()).unwrap()
    }

    #[test]
    fn test_from_config() {
        let state = state(
            r#"
redirectHost: localhost
redirectPort: 8080
globalAPIDelay: 40
transactionLimit: 5
pathDelays:
  /slow/**: 250
mockModeList: [/mocked/**]
"#,
        );
        assert_eq!(state.redirect_target, "http://localhost:8080");
        assert_eq!(state.delay.get(), 40);
        assert_eq!(state.store.limit(), 5);
        assert!(state.static_mocks.is_none());
        assert_eq!(state.delay_for("/slow/x").as_millis(), 250);
        assert_eq!(state.delay_for("/fast").as_millis(), 40);
        assert!(state.in_mock_mode("/mocked/a"));
        assert!(!state.in_mock_mode("/real/a"));
    }

    #[test]
    fn test_delay_for_follows_runtime_changes() {
        let state = state("redirectHost: localhost\n");
        state.delay.set(75);
        assert_eq!(state.delay_for("/any").as_millis(), 75);
    }

    #[test]
    fn test_invalid_glob_is_fatal() {
        let config =
            GatewayConfig::from_yaml("redirectHost: localhost\nmockModeList: ['']\n").unwrap();
        let err = GatewayState::from_config(config).err().unwrap();
        assert!(matches!(err, StartupError::Config(ConfigError::InvalidGlob { .. })));
        assert!(err.to_string().contains("mockModeList"));
    }
}
