//! Axum request handlers for all service endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{DocumentBody, ErrorResponse, HealthResponse, QueryBody};
use common::ServiceError;
use fle::{FieldEncryptor, FleError};
use tracing::warn;

use super::state::AppState;

/// Error returned by handlers, rendered as an [`ErrorResponse`] body.
pub struct ApiError(ServiceError);

impl From<FleError> for ApiError {
    fn from(e: FleError) -> Self {
        let err = match &e {
            FleError::Configuration(_) | FleError::KeyName(_) => ServiceError::BadRequest(e.to_string()),
            FleError::KeyService(_)
            | FleError::AlignmentViolation { .. }
            | FleError::MalformedPayload { .. } => ServiceError::KeyService(e.to_string()),
            FleError::Store(_) => ServiceError::Internal(e.to_string()),
        };
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(code = self.0.code(), error = %self.0, "request failed");
        }
        let message = match &self.0 {
            ServiceError::BadRequest(m)
            | ServiceError::NotFound(m)
            | ServiceError::KeyService(m)
            | ServiceError::Unavailable(m)
            | ServiceError::Internal(m) => m.clone(),
        };
        (status, Json(ErrorResponse::new(self.0.code(), message))).into_response()
    }
}

/// Look up the encryptor bound to `collection`.
///
/// Until the first policy load succeeds every collection is unavailable
/// rather than unknown.
fn encryptor(state: &AppState, collection: &str) -> Result<FieldEncryptor, ApiError> {
    if state.registry.is_empty() {
        return Err(ApiError(ServiceError::Unavailable(
            "no collection policies loaded".into(),
        )));
    }
    state
        .registry
        .get(collection)
        .map_err(|e| ApiError(ServiceError::NotFound(e.to_string())))
}

/// `POST /collections/:name/encrypt`: encrypt the collection's fields of a document.
pub async fn encrypt(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<DocumentBody>, ApiError> {
    let encryptor = encryptor(&state, &collection)?;
    let mut document = body.document;
    encryptor.encrypt(&mut document).await?;
    Ok(Json(DocumentBody { document }))
}

/// `POST /collections/:name/decrypt`: restore plaintext fields of a stored document.
pub async fn decrypt(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<DocumentBody>,
) -> Result<Json<DocumentBody>, ApiError> {
    let encryptor = encryptor(&state, &collection)?;
    let mut document = body.document;
    encryptor.decrypt(&mut document).await?;
    Ok(Json(DocumentBody { document }))
}

/// `POST /collections/:name/query`: rewrite a filter so it matches stored ciphertext.
///
/// Only matches documents when the collection key uses convergent encryption.
pub async fn query(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(body): Json<QueryBody>,
) -> Result<Json<QueryBody>, ApiError> {
    let encryptor = encryptor(&state, &collection)?;
    let mut filter = body.filter;
    encryptor.rewrite_query(&mut filter).await?;
    Ok(Json(QueryBody { filter }))
}

/// `GET /health`: liveness and readiness check.
///
/// Returns `200 OK` when at least one collection policy is loaded.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let collections_loaded = state.registry.len();

    let (status_code, status_str) = if collections_loaded > 0 {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        collections_loaded,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}
