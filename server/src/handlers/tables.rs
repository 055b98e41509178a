//! Table handler - exposes committed table contents.

use crate::error::Result;
use crate::AppState;
use tabsync_engine::TableSnapshot;

/// The last committed state of a table.
pub async fn handle_get_table(state: &AppState, name: &str) -> Result<TableSnapshot> {
    state.tables.snapshot(name).await
}
