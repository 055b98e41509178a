//! Tabsync Server - pulls remote financial transactions into editable tables.
//!
//! The server owns all IO around the `tabsync-engine` reconciliation logic:
//! it fetches records from the remote REST API, keeps tables in PostgreSQL
//! (or in memory) and exposes an HTTP surface that runs sync passes and
//! returns committed tables.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod remote;
pub mod routes;
pub mod store;
pub mod sync;

use crate::config::Config;
use crate::remote::RecordSource;
use crate::store::TableBackend;
use crate::sync::SyncGuard;
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tables: TableBackend,
    pub source: Arc<dyn RecordSource>,
    pub config: Arc<Config>,
    pub guard: SyncGuard,
}

impl AppState {
    pub fn new(config: Config, tables: TableBackend, source: Arc<dyn RecordSource>) -> Self {
        Self {
            tables,
            source,
            config: Arc::new(config),
            guard: SyncGuard::new(),
        }
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
