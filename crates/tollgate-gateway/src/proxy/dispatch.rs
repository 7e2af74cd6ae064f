//! The request pipeline.
//!
//! Every request is admitted with a fresh transaction id and a buffered body,
//! then served from a static mock definition, from the contract mock engine, or
//! by calling the upstream. Recording and validation always run on spawned
//! tasks so they never delay the client.

use super::client::ClientError;
use super::context::GatewayState;
use super::headers::{set_cors_headers, GatewayHeadersExt, REWRITE_ID};
use super::mock_handler::handle_mock;
use super::response_ext::{GatewayBody, ResponseExt};
use crate::contract::{validate_request, validate_response, ContractSet, ValidationFinding};
use crate::metrics;
use crate::problem::ProblemDetails;
use crate::static_mock::{StaticMockDefinition, StaticMockService};
use crate::transaction::GatewayEvent;
use crate::transform::{
    build_outbound, record_request, HeaderPolicy, InboundRequest, OutboundRequest,
    ResponseSnapshot,
};
use bytes::Bytes;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::header::{CONNECTION, TRANSFER_ENCODING};
use hyper::{HeaderMap, Request, Response, StatusCode};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MODE_PROXY: &str = "proxy";
const MODE_STATIC_MOCK: &str = "static_mock";

/// Admit a request and run it through the pipeline.
pub async fn handle_request<B>(
    state: Arc<GatewayState>,
    req: Request<B>,
) -> Result<Response<GatewayBody>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(uri = %parts.uri, error = %e, "Failed to read request body");
            let problem = ProblemDetails::new("Unable to read request body", 400, e.to_string());
            return Ok(problem_response(&problem, false));
        }
    };

    let inbound = InboundRequest {
        id: Uuid::new_v4().to_string(),
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    };
    Ok(dispatch(&state, inbound).await)
}

/// Serve an admitted request.
pub async fn dispatch(state: &Arc<GatewayState>, inbound: InboundRequest) -> Response<GatewayBody> {
    info!(id = %inbound.id, method = %inbound.method, uri = %inbound.uri, "Handling API request");

    if let Some(service) = &state.static_mocks {
        if let Some(definition) = service.find_match(&inbound) {
            return serve_static_mock(state, service, &definition, inbound).await;
        }
    }

    if state.in_mock_mode(inbound.path()) {
        return handle_mock(state, inbound).await;
    }

    proxy_request(state, inbound).await
}

/// Problem-details response with CORS headers.
pub(super) fn problem_response(problem: &ProblemDetails, pretty: bool) -> Response<GatewayBody> {
    let mut headers = HeaderMap::new();
    headers.set_json_cors();
    let status = StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    ResponseSnapshot::capture(status, headers, problem.to_bytes(pretty)).into_boxed()
}

async fn serve_static_mock(
    state: &GatewayState,
    service: &StaticMockService,
    definition: &StaticMockDefinition,
    inbound: InboundRequest,
) -> Response<GatewayBody> {
    let snapshot = service.respond(definition, &inbound).await;
    info!(id = %inbound.id, code = snapshot.status.as_u16(), "Serving static mock");
    metrics::record_static_mock_hit(inbound.method.as_str());
    metrics::record_request(MODE_STATIC_MOCK, inbound.method.as_str(), snapshot.status.as_u16());

    let inbound = Arc::new(inbound);
    let request_task = spawn_request_record(state, Arc::clone(&inbound), None, HeaderPolicy::default(), false);
    spawn_response_record(
        state,
        inbound,
        snapshot.clone(),
        request_task,
        RecordOptions::default(),
    );
    snapshot.into_boxed()
}

/// Which side of the upstream call reported first.
enum CallResult {
    Response(ResponseSnapshot),
    Failed(ClientError),
    /// The call task ended without reporting.
    Lost,
}

async fn proxy_request(state: &Arc<GatewayState>, inbound: InboundRequest) -> Response<GatewayBody> {
    let started = Instant::now();
    let inbound = Arc::new(inbound);
    let path = inbound.path().to_string();
    let method = inbound.method.to_string();

    let rewrite_ids: Vec<&str> = inbound
        .header_values(REWRITE_ID.as_str())
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect();
    let rewrite = state.router.rewrite(&path, inbound.query(), &rewrite_ids);
    let upstream_url = rewrite.upstream_url(&state.redirect_target);
    let policy = HeaderPolicy::for_path(&state.config.headers, &state.router, &path);
    let validate = !state.router.validation_ignored(&path);

    let outbound = match build_outbound(&inbound, &policy, &upstream_url, &state.redirect_target) {
        Ok(outbound) => outbound,
        Err(e) => {
            let request_task = spawn_request_record(state, Arc::clone(&inbound), None, policy, validate);
            return upstream_failure(state, inbound, request_task, e.to_string());
        }
    };
    debug!(id = %inbound.id, from = %path, to = %outbound.uri, "Request rewritten");

    let request_task = spawn_request_record(
        state,
        Arc::clone(&inbound),
        Some(outbound.clone()),
        policy,
        validate,
    );

    let follow_redirects = !state.router.redirects_ignored(&path);
    let (response_tx, mut response_rx) = oneshot::channel();
    let (error_tx, mut error_rx) = oneshot::channel();
    let client = state.client.clone();
    tokio::spawn(async move {
        match client.execute(outbound, follow_redirects).await {
            Ok(response) => {
                let _ = response_tx.send(response);
            }
            Err(e) => {
                let _ = error_tx.send(e);
            }
        }
    });

    let call = tokio::select! {
        Ok(response) = &mut response_rx => CallResult::Response(response),
        Ok(error) = &mut error_rx => CallResult::Failed(error),
        else => CallResult::Lost,
    };
    match &call {
        CallResult::Response(_) => {
            tokio::spawn(async move {
                let _ = error_rx.await;
            });
        }
        CallResult::Failed(_) => {
            tokio::spawn(async move {
                let _ = response_rx.await;
            });
        }
        CallResult::Lost => {}
    }

    let snapshot = match call {
        CallResult::Response(snapshot) => snapshot,
        CallResult::Failed(e) => {
            metrics::record_upstream_duration(&method, "error", started.elapsed());
            error!(id = %inbound.id, url = %upstream_url, code = 500, error = %e, "Request failed");
            return upstream_failure(state, inbound, request_task, e.to_string());
        }
        CallResult::Lost => {
            error!(id = %inbound.id, url = %upstream_url, "Upstream call ended without a result");
            return upstream_failure(
                state,
                inbound,
                request_task,
                "the upstream call was aborted".to_string(),
            );
        }
    };
    let status = snapshot.status.as_u16();
    metrics::record_upstream_duration(&method, &status.to_string(), started.elapsed());

    let delay = state.delay_for(&path);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    spawn_response_record(
        state,
        Arc::clone(&inbound),
        snapshot.clone(),
        request_task,
        RecordOptions {
            validate,
            ..Default::default()
        },
    );

    if snapshot.is_error() {
        warn!(id = %inbound.id, url = %upstream_url, code = status, "Upstream returned an error");
    } else {
        info!(id = %inbound.id, url = %upstream_url, code = status, "Request completed");
    }
    metrics::record_request(MODE_PROXY, &method, status);

    let mut snapshot = snapshot;
    snapshot.headers.remove(TRANSFER_ENCODING);
    snapshot.headers.remove(CONNECTION);
    set_cors_headers(&mut snapshot.headers);
    snapshot.into_boxed()
}

/// 500 for the client; the same body is recorded as the response half.
fn upstream_failure(
    state: &GatewayState,
    inbound: Arc<InboundRequest>,
    request_task: JoinHandle<()>,
    detail: String,
) -> Response<GatewayBody> {
    let problem = ProblemDetails::new("Unable to call API", 500, detail);
    let mut headers = HeaderMap::new();
    headers.set_json_cors();
    let snapshot = ResponseSnapshot::capture(
        StatusCode::INTERNAL_SERVER_ERROR,
        headers,
        problem.to_bytes(false),
    );
    metrics::record_request(MODE_PROXY, inbound.method.as_str(), 500);
    spawn_response_record(
        state,
        inbound,
        snapshot.clone(),
        request_task,
        RecordOptions {
            failed: true,
            ..Default::default()
        },
    );
    snapshot.into_boxed()
}

fn request_findings(contracts: &ContractSet, inbound: &InboundRequest) -> Vec<ValidationFinding> {
    let Some(contract) = contracts.select(inbound.path()) else {
        return Vec::new();
    };
    let findings = validate_request(contract.as_ref(), inbound);
    for finding in &findings {
        metrics::record_validation_finding("request", &finding.validation_type);
    }
    if !findings.is_empty() {
        warn!(id = %inbound.id, findings = findings.len(), "Request violates the contract");
    }
    findings
}

fn response_findings(
    contracts: &ContractSet,
    inbound: &InboundRequest,
    response: &ResponseSnapshot,
) -> Vec<ValidationFinding> {
    let Some(contract) = contracts.select(inbound.path()) else {
        return Vec::new();
    };
    let findings = validate_response(contract.as_ref(), inbound, response);
    for finding in &findings {
        metrics::record_validation_finding("response", &finding.validation_type);
    }
    if !findings.is_empty() {
        warn!(id = %inbound.id, findings = findings.len(), "Response violates the contract");
    }
    findings
}

/// Validate and record the request half, then broadcast it.
///
/// Without an outbound request the request is recorded as received.
pub(super) fn spawn_request_record(
    state: &GatewayState,
    inbound: Arc<InboundRequest>,
    outbound: Option<OutboundRequest>,
    policy: HeaderPolicy,
    validate: bool,
) -> JoinHandle<()> {
    let contracts = state.contracts.clone();
    let store = Arc::clone(&state.store);
    let broadcaster = state.broadcaster.clone();
    let scheme = state.scheme();

    tokio::spawn(async move {
        let findings = if validate {
            request_findings(&contracts, &inbound)
        } else {
            Vec::new()
        };
        let outbound = outbound.unwrap_or_else(|| inbound.as_received(scheme));
        let record = record_request(&inbound, &outbound, &policy).await;
        let transaction = store.record_request(&inbound.id, record, findings);
        broadcaster.publish(GatewayEvent::RequestRecorded(transaction));
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub(super) struct RecordOptions {
    pub validate: bool,
    /// Wait before recording, after the request half is in.
    pub settle: Duration,
    /// Broadcast as a failed call.
    pub failed: bool,
}

/// Record the response half once the request half is in, then broadcast it.
pub(super) fn spawn_response_record(
    state: &GatewayState,
    inbound: Arc<InboundRequest>,
    response: ResponseSnapshot,
    request_task: JoinHandle<()>,
    options: RecordOptions,
) {
    let contracts = state.contracts.clone();
    let store = Arc::clone(&state.store);
    let broadcaster = state.broadcaster.clone();

    tokio::spawn(async move {
        if let Err(e) = request_task.await {
            error!(id = %inbound.id, error = %e, "Request recording task failed");
        }
        if !options.settle.is_zero() {
            tokio::time::sleep(options.settle).await;
        }
        let findings = if options.validate {
            response_findings(&contracts, &inbound, &response)
        } else {
            Vec::new()
        };
        let transaction = store.record_response(&inbound.id, response.to_record(), findings);
        let event = if options.failed {
            GatewayEvent::ResponseFailed(transaction)
        } else {
            GatewayEvent::ResponseRecorded(transaction)
        };
        broadcaster.publish(event);
    });
}
