//! HTTP surface: axum REST endpoints next to the WebSocket listener.
//!
//! - `GET /api/presentations`: list `{id, name}` of every deck
//! - `POST /api/presentations`: create a deck from `{name}`
//! - `GET /api/presentations/{id}`: full document
//! - anything else: the front-end bundle, when a static directory is set

use std::path::Path;
use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use uuid::Uuid;

use crate::model::{Document, DocumentSummary};
use crate::registry::SessionRegistry;
use crate::store::StoreError;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    pub success: bool,
    pub presentation_id: Uuid,
}

/// Error body returned by every endpoint.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Internal(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found"),
            ApiError::Internal(e) => {
                log::error!("HTTP request failed: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Build the API router over `registry`.
///
/// With `static_dir`, unmatched paths are served from it and fall back to its
/// `index.html` so client-side routes resolve.
pub fn router(registry: Arc<SessionRegistry>, static_dir: Option<&Path>) -> Router {
    let mut app = Router::new()
        .route("/api/presentations", get(list_presentations).post(create_presentation))
        .route("/api/presentations/{id}", get(get_presentation))
        .layer(CorsLayer::permissive())
        .with_state(registry);

    if let Some(dir) = static_dir {
        if dir.exists() {
            log::info!("Serving front-end from {}", dir.display());
            app = app.fallback_service(
                ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
            );
        } else {
            log::warn!("Static directory {} does not exist, skipping", dir.display());
        }
    }
    app
}

/// Serve `app` on `listener` until the server fails.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app).await
}

async fn list_presentations(
    State(registry): State<Arc<SessionRegistry>>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
    Ok(Json(registry.list().await?))
}

async fn create_presentation(
    State(registry): State<Arc<SessionRegistry>>,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, ApiError> {
    let id = registry.create(&request.name).await?;
    Ok(Json(CreateResponse {
        success: true,
        presentation_id: id,
    }))
}

async fn get_presentation(
    State(registry): State<Arc<SessionRegistry>>,
    UrlPath(id): UrlPath<String>,
) -> Result<Json<Document>, ApiError> {
    // Ids that are not UUIDs cannot name a stored deck.
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    Ok(Json(registry.resolve(id).await?))
}
