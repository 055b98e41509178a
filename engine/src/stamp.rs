//! Sync stamps.

use crate::{CellValue, TableSnapshot};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The version and time of one sync pass.
///
/// The version is written into the reserved version column of every row a
/// pass inserts or updates. Untouched rows keep their prior version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStamp {
    pub version: u64,
    pub utc: DateTime<Utc>,
}

impl SyncStamp {
    pub fn new(version: u64, utc: DateTime<Utc>) -> Self {
        Self { version, utc }
    }

    /// Stamp for the next pass over a table.
    ///
    /// The version is one more than the highest version the table knows of,
    /// either from its recorded sync info or from any row's version cell.
    pub fn next_for(snapshot: &TableSnapshot, version_column: usize, now: DateTime<Utc>) -> Self {
        let recorded = snapshot.last_sync.map(|info| info.stamp.version);
        let in_rows = max_row_version(snapshot, version_column);
        let previous = recorded.max(in_rows).unwrap_or(0);
        Self::new(previous + 1, now)
    }

    /// The version as a cell value.
    pub fn version_cell(&self) -> CellValue {
        CellValue::Number(self.version as f64)
    }
}

/// Highest non-negative integer found in a column.
fn max_row_version(snapshot: &TableSnapshot, column: usize) -> Option<u64> {
    snapshot
        .rows
        .iter()
        .filter_map(|row| row.values.get(column))
        .filter_map(CellValue::as_integer)
        .filter_map(|v| u64::try_from(v).ok())
        .max()
}
