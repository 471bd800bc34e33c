//! JSON query endpoint for the booking front-end.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::CalendarError;
use crate::model::AvailableSlot;
use crate::query::QueryRequest;
use crate::service::CalendarService;

/// Error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug)]
pub enum AppError {
    /// The body was not a JSON object of the expected shape.
    Payload(String),
    Calendar(CalendarError),
}

impl From<CalendarError> for AppError {
    fn from(e: CalendarError) -> Self {
        AppError::Calendar(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Payload(message) => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    code: "validation_error".into(),
                    message,
                    field: Some("payload".into()),
                },
            ),
            AppError::Calendar(e) => {
                let status = if e.is_client_error() {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                (
                    status,
                    ApiError {
                        code: e.code().into(),
                        message: e.public_message(),
                        field: e.field().map(String::from),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

pub fn router(service: Arc<CalendarService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/calendar/query", post(query_calendar))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".into() })
}

/// POST /calendar/query
async fn query_calendar(
    State(service): State<Arc<CalendarService>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Vec<AvailableSlot>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Payload(e.body_text()))?;
    let slots = service.available_slots(request).await?;
    Ok(Json(slots))
}
