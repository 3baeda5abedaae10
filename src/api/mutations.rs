use crate::bus::EventBus;
use crate::event::DispatchEvent;
use crate::router::{MutationReceipt, MutationRouter, RouterError};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub mutation_router: MutationRouter,
    pub event_bus: Arc<dyn EventBus>,
    pub body_limit_bytes: usize,
}

impl AppState {
    pub fn new(event_bus: Arc<dyn EventBus>, body_limit_bytes: usize) -> Self {
        Self {
            mutation_router: MutationRouter::new(event_bus.clone()),
            event_bus,
            body_limit_bytes,
        }
    }
}

/// Response for a raw event publish
#[derive(Serialize)]
struct EventResponse {
    #[serde(rename = "eventId")]
    event_id: String,
    #[serde(rename = "detail-type")]
    detail_type: String,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create API router with mutation and event endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mutations/:name", post(run_mutation))
        .route("/api/events", post(publish_event))
        .route("/health", get(health))
        .with_state(Arc::new(state))
}

/// POST /api/mutations/:name - Run a client mutation
///
/// Body is the mutation's argument object. The response confirms the event
/// was accepted by the bus, not that the record was written.
async fn run_mutation(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<MutationReceipt>, AppError> {
    if body.len() > state.body_limit_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    let args: Value = if body.iter().all(u8::is_ascii_whitespace) {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::ValidationError(e.to_string()))?
    };

    let receipt = state.mutation_router.route_named(&name, &args).await?;
    Ok(Json(receipt))
}

/// POST /api/events - Publish a caller-built event
///
/// Lets producers other than the mutation router (e.g. a booking workflow
/// attaching `SnsMessage`) put events on the bus.
async fn publish_event(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<EventResponse>, AppError> {
    if body.len() > state.body_limit_bytes {
        return Err(AppError::PayloadTooLarge);
    }

    let mut event: DispatchEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::ValidationError(e.to_string()))?;

    event
        .validate_and_prepare()
        .map_err(|e| AppError::ValidationError(e.to_string()))?;

    info!(
        event_id = %event.log_id(),
        source = %event.source,
        detail_type = %event.detail_type,
        "Publishing event"
    );

    state.event_bus.publish(&event).await.map_err(|e| {
        error!(error = %e, event_id = %event.log_id(), "Failed to publish event");
        AppError::PublishError(format!("{:#}", e))
    })?;

    Ok(Json(EventResponse {
        event_id: event.log_id().to_string(),
        detail_type: event.detail_type,
    }))
}

/// GET /health - Liveness probe
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Application error types
enum AppError {
    ValidationError(String),
    PublishError(String),
    Internal(String),
    PayloadTooLarge,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::PublishError(msg) | AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
            }
        };
        let body = Json(ErrorResponse {
            error: error_message,
        });
        (status, body).into_response()
    }
}

impl From<RouterError> for AppError {
    fn from(e: RouterError) -> Self {
        match e {
            RouterError::UnknownMutation(_) | RouterError::InvalidArguments { .. } => {
                AppError::ValidationError(e.to_string())
            }
            RouterError::InvalidEvent { .. } => AppError::Internal(e.to_string()),
            RouterError::Publish { .. } => AppError::PublishError(e.to_string()),
        }
    }
}
