//! Monitor API handlers: health, metrics, transactions and controls.

use super::types::*;
use super::MonitorState;
use crate::controls::{ControlCommand, ControlError};
use crate::metrics::collect_metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::{info, warn};

/// GET /health
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /metrics - Prometheus text format
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        collect_metrics(),
    )
}

/// GET /transactions
pub fn handle_transaction_count(state: &MonitorState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &TransactionCount {
            count: state.store.len(),
            limit: state.store.limit(),
        },
    )
}

/// GET /transactions/report
pub fn handle_transaction_report(state: &MonitorState) -> Response<Full<Bytes>> {
    let transactions = state.store.all();
    info!(count = transactions.len(), "Transaction report generated");
    json_response(
        StatusCode::OK,
        &TransactionReport {
            count: transactions.len(),
            limit: state.store.limit(),
            transactions,
        },
    )
}

/// GET /transactions/{id}
pub fn handle_transaction(state: &MonitorState, id: &str) -> Response<Full<Bytes>> {
    match state.store.get(id) {
        Some(transaction) => json_response(StatusCode::OK, &transaction),
        None => error_response(
            StatusCode::NOT_FOUND,
            &format!("Transaction '{id}' not found"),
        ),
    }
}

/// GET /controls
pub fn handle_get_controls(state: &MonitorState) -> Response<Full<Bytes>> {
    match state.controls.handle(ControlCommand::GetConfig) {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

/// POST /controls/delay with `{"delay": n}`
pub fn handle_change_delay(state: &MonitorState, body: &[u8]) -> Response<Full<Bytes>> {
    let request: ChangeDelayRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, &format!("Invalid delay value: {e}"))
        }
    };
    match state.controls.handle(ControlCommand::ChangeDelay {
        delay_ms: request.delay,
    }) {
        Ok(response) => json_response(StatusCode::OK, &response),
        Err(e @ ControlError::NegativeDelay(_)) => {
            warn!(delay = request.delay, "Rejected delay change");
            error_response(StatusCode::BAD_REQUEST, &e.to_string())
        }
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
