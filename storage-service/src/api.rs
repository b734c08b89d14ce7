use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use shared::{ProductAmount, StorageGroup, StorageView};
use tokio::time::Instant;

use crate::error::ServiceError;
use crate::ledger::TransactionalStore;
use crate::models::Id;
use crate::reservation::ReservationService;
use crate::storage::StorageService;

pub struct AppState<S> {
    pub reservations: Arc<ReservationService<S>>,
    pub storages: Arc<StorageService<S>>,
    pub request_timeout: Duration,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            reservations: self.reservations.clone(),
            storages: self.storages.clone(),
            request_timeout: self.request_timeout,
        }
    }
}

impl<S: TransactionalStore + Clone> AppState<S> {
    pub fn new(store: S, request_timeout: Duration) -> Self {
        Self {
            reservations: Arc::new(ReservationService::new(store.clone())),
            storages: Arc::new(StorageService::new(store)),
            request_timeout,
        }
    }
}

/// Deadline used when the configured timeout does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

impl<S> AppState<S> {
    fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.request_timeout)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::ProductNotFound(_) | ServiceError::StorageNotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::InsufficientCapacity { .. }
            | ServiceError::OverRelease { .. }
            | ServiceError::StorageUnavailable(_) => StatusCode::CONFLICT,
            ServiceError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Consistency(_) | ServiceError::Transaction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        } else {
            tracing::warn!("Request rejected: {}", self.0);
        }
        (status, Json(ErrorResponse { error: self.0.to_string() })).into_response()
    }
}

pub fn create_router<S>(state: AppState<S>) -> Router
where
    S: TransactionalStore + 'static,
{
    Router::new()
        .route("/reservations", post(reserve::<S>))
        .route("/reservations/release", post(release::<S>))
        .route("/storages/schema", post(define_schema::<S>))
        .route("/storages/:id/unreserved", get(unreserved_storage::<S>))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn reserve<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    Json(items): Json<Vec<ProductAmount>>,
) -> Result<StatusCode, ApiError> {
    state.reservations.reserve(&items, state.deadline(), None).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn release<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    Json(items): Json<Vec<ProductAmount>>,
) -> Result<StatusCode, ApiError> {
    state.reservations.release(&items, state.deadline(), None).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn define_schema<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    Json(groups): Json<Vec<StorageGroup>>,
) -> Result<(StatusCode, Json<Vec<StorageView>>), ApiError> {
    let views = state.storages.define_schema(&groups, state.deadline(), None).await?;
    Ok((StatusCode::CREATED, Json(views)))
}

pub async fn unreserved_storage<S: TransactionalStore>(
    State(state): State<AppState<S>>,
    Path(id): Path<Id>,
) -> Result<Json<StorageView>, ApiError> {
    let view = state.storages.unreserved_storage(id, state.deadline(), None).await?;
    Ok(Json(view))
}

pub async fn health_check() -> &'static str {
    "OK"
}
