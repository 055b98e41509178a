//! Table read routes.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use tabsync_engine::TableSnapshot;

use crate::auth::Authorized;
use crate::error::Result;
use crate::handlers::handle_get_table;
use crate::AppState;

/// Create table routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/tables/{name}", get(table_handler))
}

/// GET /tables/{name} - Committed contents of one table.
async fn table_handler(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(name): Path<String>,
) -> Result<Json<TableSnapshot>> {
    let snapshot = handle_get_table(&state, &name).await?;
    Ok(Json(snapshot))
}
