//! Sync handler - runs one pass against the configured transactions table.

use crate::error::{AppError, Result};
use crate::sync::{run_sync, SyncParams, SyncReport, SyncRequest};
use crate::AppState;

/// Run a pass unless one is already in progress.
pub async fn handle_sync(state: &AppState, request: SyncRequest) -> Result<SyncReport> {
    let params = SyncParams::resolve(request, state.config.remote_api_token.as_deref())?;

    let _permit = state.guard.try_acquire().ok_or_else(|| {
        tracing::warn!("rejecting sync request while a pass is running");
        AppError::SyncInProgress
    })?;

    tracing::info!(
        start = %params.query.start,
        end = %params.query.end,
        replace_existing = params.replace_existing,
        "starting sync pass"
    );
    run_sync(
        &state.tables,
        state.source.as_ref(),
        &state.config.transactions_table,
        &params,
    )
    .await
}
