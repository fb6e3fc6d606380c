//! # HTTP Ingress
//!
//! A thin `axum` adapter in front of the relay. It maps relay requests onto
//! [`Event`]s and exposes the read-only diagnostic surface:
//!
//! - `GET /` liveness line.
//! - `GET /status` queue length and uptime.
//! - `GET /queue` bounded, truncated preview of pending deliveries.
//! - `GET /metrics` Prometheus exposition, when enabled.
//! - `POST /relay` submit an alert.

use crate::core::Event;
use crate::error::{RelayError, RouteError, ValidationError};
use crate::formatting::{AlertDetails, AlertFormatter};
use crate::relay::{Relay, SubmitOutcome};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, trace};

/// Shared state for all handlers.
pub struct ServerState {
    pub relay: Arc<Relay>,
    pub formatter: Box<dyn AlertFormatter>,
    pub preview_limit: usize,
    pub started_at: Instant,
    pub prometheus: Option<PrometheusHandle>,
}

/// Body of `POST /relay`.
///
/// The required fields accept any JSON value. Null, `false`, `0` and blank
/// strings count as missing; other non-strings are used as their JSON text.
#[derive(Debug, Deserialize, Default)]
pub struct RelayRequest {
    pub avatar: Option<Value>,
    pub uuid: Option<Value>,
    pub reason: Option<Value>,
    pub time: Option<Value>,
    pub webhook: Option<String>,
    /// `false` (or `"false"`) accepts the request without forwarding it.
    pub log: Option<Value>,
}

impl RelayRequest {
    fn required(field: &Option<Value>) -> Option<String> {
        match field.as_ref()? {
            Value::Null | Value::Bool(false) => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) if n.as_f64() == Some(0.0) => None,
            other => Some(other.to_string()),
        }
    }

    pub fn should_forward(&self) -> bool {
        !matches!(&self.log, Some(Value::Bool(false)))
            && !matches!(&self.log, Some(Value::String(s)) if s == "false")
    }

    /// Builds the pipeline event, or `None` if a required field is missing.
    pub fn to_event(&self, formatter: &dyn AlertFormatter) -> Option<Event> {
        let avatar = Self::required(&self.avatar)?;
        let uuid = Self::required(&self.uuid)?;
        let time = Self::required(&self.time)?;
        let reason = Self::required(&self.reason)?;

        let payload = formatter.format(&AlertDetails {
            avatar: &avatar,
            uuid: &uuid,
            reason: &reason,
            time: &time,
        });
        Some(Event {
            subject_key: uuid,
            signature: reason,
            payload,
            destination_hint: self.webhook.clone(),
            received_at: time,
        })
    }
}

/// Builds the ingress router.
pub fn router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new()
        .route("/", get(root))
        .route("/status", get(status))
        .route("/queue", get(queue))
        .route("/relay", post(relay));

    if let Some(handle) = state.prometheus.clone() {
        router = router.route("/metrics", get(move || async move { handle.render() }));
    }

    router.with_state(state)
}

/// Serves `router` on `listener` until the shutdown signal fires.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown_rx: watch::Receiver<bool>) {
    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            trace!("HTTP server received shutdown signal.");
        })
        .await;
    if let Err(e) = result {
        error!("HTTP server error: {}", e);
    }
    info!("HTTP server finished.");
}

async fn root() -> &'static str {
    "Alert relay is running"
}

async fn status(State(state): State<Arc<ServerState>>) -> Json<Value> {
    let uptime = state.started_at.elapsed().as_secs();
    Json(json!({
        "status": "ok",
        "queueLength": state.relay.queue_length(),
        "uptime": format!("{}m {}s", uptime / 60, uptime % 60),
    }))
}

async fn queue(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({ "queue": state.relay.queue_preview(state.preview_limit) }))
}

async fn relay(State(state): State<Arc<ServerState>>, Json(request): Json<RelayRequest>) -> Response {
    let Some(event) = request.to_event(state.formatter.as_ref()) else {
        return missing_fields();
    };

    // Unforwarded events still count toward the duplicate window.
    let result = if request.should_forward() {
        state.relay.submit(event).await
    } else {
        state.relay.submit_unforwarded(event).await
    };

    match result {
        Ok(SubmitOutcome::Enqueued) => (StatusCode::OK, "Processed").into_response(),
        Ok(SubmitOutcome::Suppressed) => (StatusCode::OK, "Duplicate skipped").into_response(),
        Ok(SubmitOutcome::Recorded) => (StatusCode::OK, "Logging skipped").into_response(),
        Err(e) => error_response(e),
    }
}

fn missing_fields() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Missing required fields" })),
    )
        .into_response()
}

fn error_response(err: RelayError) -> Response {
    match err {
        RelayError::Validation(ValidationError::MissingField(_)) => missing_fields(),
        RelayError::Validation(_) => {
            (StatusCode::BAD_REQUEST, "Invalid message content").into_response()
        }
        RelayError::Route(e @ RouteError::UnknownDestination(_)) => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        RelayError::Route(e @ RouteError::NoDefaultDestination) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
        RelayError::QueueFull(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}
