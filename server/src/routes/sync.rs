//! Sync endpoint routes.

use axum::{extract::State, routing::post, Json, Router};

use crate::auth::Authorized;
use crate::error::Result;
use crate::handlers::handle_sync;
use crate::sync::{SyncReport, SyncRequest};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/sync", post(sync_handler))
}

/// POST /sync - Run one sync pass.
async fn sync_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>> {
    let report = handle_sync(&state, request).await?;
    Ok(Json(report))
}
