//! Monitor REST API: health, metrics, recorded transactions and runtime controls.
//!
//! Listens on `listen.monitorPort`.

mod handlers;
mod router;
mod server;
mod types;

use crate::controls::ControlService;
use crate::transaction::TransactionStore;
use std::sync::Arc;

pub use router::route_request;
pub use server::MonitorServer;

pub struct MonitorState {
    pub store: Arc<TransactionStore>,
    pub controls: ControlService,
}

impl MonitorState {
    pub fn for_gateway(gateway: &crate::proxy::GatewayState) -> Self {
        Self {
            store: Arc::clone(&gateway.store),
            controls: ControlService::new(Arc::clone(&gateway.config), gateway.delay.clone()),
        }
    }
}
