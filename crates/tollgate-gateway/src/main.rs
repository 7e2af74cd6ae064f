use anyhow::Context;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tollgate_gateway::config::GatewayConfig;
use tollgate_gateway::monitor::{MonitorServer, MonitorState};
use tollgate_gateway::proxy::{GatewayServer, GatewayState};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "Intercepting API gateway")]
struct Args {
    /// Configuration file (YAML)
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Gateway port, overrides `listen.port`
    #[arg(short, long, env = "TOLLGATE_PORT")]
    port: Option<u16>,

    /// Monitor API port, overrides `listen.monitorPort`
    #[arg(long, env = "TOLLGATE_MONITOR_PORT")]
    monitor_port: Option<u16>,

    /// Answer every request from the API contracts
    #[arg(long, env = "TOLLGATE_MOCK_MODE")]
    mock_mode: bool,

    /// Directory holding `mock-definitions/` and `body-jsons/`
    #[arg(long, env = "TOLLGATE_STATIC_MOCK_DIR")]
    static_mock_dir: Option<PathBuf>,
}

impl Args {
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(port) = self.port {
            config.listen.port = port;
        }
        if let Some(port) = self.monitor_port {
            config.listen.monitor_port = port;
        }
        if self.mock_mode {
            config.mock_mode = true;
        }
        if let Some(dir) = &self.static_mock_dir {
            config.static_mock_dir = Some(dir.clone());
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tollgate_gateway=info,tollgate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("tollgate v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => GatewayConfig::parse_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => GatewayConfig::default(),
    };
    args.apply(&mut config);

    let gateway_addr = SocketAddr::from(([0, 0, 0, 0], config.listen.port));
    let monitor_addr = SocketAddr::from(([0, 0, 0, 0], config.listen.monitor_port));

    let state = Arc::new(GatewayState::from_config(config)?);
    let _event_log = state.broadcaster.spawn_event_log();

    // reloads stop when the watcher is dropped
    let _watcher = match &state.static_mocks {
        Some(service) => match service.watch(state.broadcaster.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "Static mock hot reload disabled");
                None
            }
        },
        None => None,
    };

    let gateway = GatewayServer::bind(Arc::clone(&state), gateway_addr).await?;
    let monitor = MonitorServer::bind(monitor_addr, Arc::new(MonitorState::for_gateway(&state)))
        .await
        .with_context(|| format!("binding monitor API on {monitor_addr}"))?;

    tokio::select! {
        result = gateway.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Gateway stopped");
            }
            result?;
        }
        result = monitor.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Monitor API stopped");
            }
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
