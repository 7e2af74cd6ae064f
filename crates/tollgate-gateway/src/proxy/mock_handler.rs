//! Answering requests from the contract mock engine.

use super::context::GatewayState;
use super::dispatch::{spawn_request_record, spawn_response_record, RecordOptions};
use super::headers::GatewayHeadersExt;
use super::response_ext::{GatewayBody, ResponseExt};
use crate::metrics;
use crate::problem::ProblemDetails;
use crate::transform::{HeaderPolicy, InboundRequest, ResponseSnapshot};
use bytes::Bytes;
use hyper::{HeaderMap, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const MODE_MOCK: &str = "mock";

/// Pause between composing a mock and publishing its response half.
const SETTLE: Duration = Duration::from_millis(5);

pub(super) async fn handle_mock(
    state: &Arc<GatewayState>,
    inbound: InboundRequest,
) -> Response<GatewayBody> {
    let inbound = Arc::new(inbound);
    let validate = !state.router.validation_ignored(inbound.path());
    let request_task = spawn_request_record(
        state,
        Arc::clone(&inbound),
        None,
        HeaderPolicy::default(),
        validate,
    );

    let outcome = state.mock.generate(&inbound);

    let delay = state.delay_for(inbound.path());
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut headers = HeaderMap::new();
    headers.set_json_cors();
    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let (client_status, body) = match &outcome.error {
        Some(e) if outcome.body.is_empty() => {
            error!(id = %inbound.id, uri = %inbound.uri, code = 404, error = %e, "Mock mode request error");
            let problem =
                ProblemDetails::new("[mock error] unable to generate mock for request", 404, e.to_string());
            (StatusCode::NOT_FOUND, problem.to_bytes(state.config.mock_mode_pretty))
        }
        Some(e) => {
            warn!(id = %inbound.id, uri = %inbound.uri, code = outcome.status, violation = %e, "Mock mode request problem");
            let problem = ProblemDetails::new("unable to serve mocked response", outcome.status, e.to_string())
                .with_payload(payload(&outcome.body));
            (status, problem.to_bytes(state.config.mock_mode_pretty))
        }
        None => {
            info!(id = %inbound.id, uri = %inbound.uri, code = outcome.status, "Mock response served");
            (status, outcome.body.clone())
        }
    };

    metrics::record_mock_response(outcome.status, outcome.error.is_some());
    metrics::record_request(MODE_MOCK, inbound.method.as_str(), client_status.as_u16());

    // observers see what the engine produced
    let observed = ResponseSnapshot::capture(status, headers.clone(), outcome.body);
    spawn_response_record(
        state,
        inbound,
        observed,
        request_task,
        RecordOptions {
            settle: SETTLE,
            ..Default::default()
        },
    );

    ResponseSnapshot::capture(client_status, headers, body).into_boxed()
}

/// The engine's body as JSON, or as a string when it is not JSON.
fn payload(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()))
}
