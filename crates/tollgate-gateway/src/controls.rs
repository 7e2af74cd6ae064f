//! Runtime controls: commands that adjust a running gateway.

use crate::config::{DelayHandle, GatewayConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum ControlCommand {
    #[serde(rename_all = "camelCase")]
    ChangeDelay { delay_ms: i64 },
    GetConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    ChangeDelay,
    GetConfig,
}

impl ControlCommand {
    pub fn kind(&self) -> ControlKind {
        match self {
            ControlCommand::ChangeDelay { .. } => ControlKind::ChangeDelay,
            ControlCommand::GetConfig => ControlKind::GetConfig,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("invalid delay value {0}: the delay cannot be negative")]
    NegativeDelay(i64),
    #[error("no handler registered for {0:?}")]
    Unhandled(ControlKind),
}

/// The configuration as currently in effect.
#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub config: GatewayConfig,
}

type Handler = fn(&ControlService, &ControlCommand) -> Result<ControlResponse, ControlError>;

pub struct ControlService {
    config: Arc<GatewayConfig>,
    delay: DelayHandle,
    handlers: HashMap<ControlKind, Handler>,
}

impl ControlService {
    pub fn new(config: Arc<GatewayConfig>, delay: DelayHandle) -> Self {
        let mut handlers: HashMap<ControlKind, Handler> = HashMap::new();
        handlers.insert(ControlKind::ChangeDelay, ControlService::change_delay);
        handlers.insert(ControlKind::GetConfig, ControlService::get_config);
        Self {
            config,
            delay,
            handlers,
        }
    }

    pub fn handle(&self, command: ControlCommand) -> Result<ControlResponse, ControlError> {
        let kind = command.kind();
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(ControlError::Unhandled(kind))?;
        handler(self, &command)
    }

    pub fn snapshot(&self) -> ControlResponse {
        let mut config = GatewayConfig::clone(&self.config);
        config.global_api_delay = self.delay.get();
        ControlResponse { config }
    }

    fn get_config(&self, _: &ControlCommand) -> Result<ControlResponse, ControlError> {
        Ok(self.snapshot())
    }

    fn change_delay(&self, command: &ControlCommand) -> Result<ControlResponse, ControlError> {
        let ControlCommand::ChangeDelay { delay_ms } = *command else {
            return Err(ControlError::Unhandled(command.kind()));
        };
        let millis = u64::try_from(delay_ms).map_err(|_| ControlError::NegativeDelay(delay_ms))?;
        let previous = self.delay.get();
        self.delay.set(millis);
        info!(previous_ms = previous, delay_ms = millis, "Global API delay changed");
        Ok(self.snapshot())
    }
}
