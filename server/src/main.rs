use std::sync::Arc;
use tabsync_server::config::{Config, StoreConfig};
use tabsync_server::remote::HttpRecordSource;
use tabsync_server::store::TableBackend;
use tabsync_server::{app, db, AppState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tabsync_server=debug,tabsync_engine=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting Tabsync Server on {}:{}", config.host, config.port);

    let tables = match &config.store {
        StoreConfig::Postgres { database_url } => {
            TableBackend::Postgres(db::connect(database_url).await?)
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory table store; tables are lost on restart");
            TableBackend::memory()
        }
    };

    let source = HttpRecordSource::new(config.remote_api_url.clone())?;
    tracing::info!("Remote API at {}", source.base_url());

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config, tables, Arc::new(source));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
