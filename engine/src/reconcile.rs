//! Record reconciliation.
//!
//! Matches received transactions to existing rows by id and decides, per
//! record, whether to insert a new row, leave the row alone, or rewrite it.
//!
//! # Algorithm
//!
//! 1. Index existing non-blank rows by their id cell
//! 2. For each received record, in received order:
//!    - no row with that id: compute a new row stamped with the current version
//!    - a row exists and existing rows are not replaced: skip it
//!    - otherwise compare every column and rewrite the row only if some
//!      column drifted
//! 3. Return the staged updates and the new rows; the caller prepends the new
//!    rows as one batch after the updates
//!
//! Two values are the same if they are equal, if the stored value is a
//! number and the received text parses to that number, or if the cell's
//! formula text equals the received value. In the last case the formula is
//! carried forward into the staged row without making the row dirty.

use crate::{
    error::Result, parse_numeric_literal, CellValue, ColumnLayout, ColumnRegistry, Error,
    IndexedMap, RecordId, RowSnapshot, SyncStamp, TableSnapshot, Transaction, WriteBatch, WriteOp,
    ID_COLUMN,
};
use serde::{Deserialize, Serialize};

/// Counts from one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// Distinct records received
    pub received: usize,
    /// Records with no existing row
    pub inserted: usize,
    /// Existing rows rewritten because a column drifted
    pub updated: usize,
    /// Existing rows left untouched because nothing drifted
    pub unchanged: usize,
    /// Existing rows not compared because replacing was disabled
    pub skipped_by_policy: usize,
}

/// Result of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    pub summary: ReconcileSummary,
    /// One [`WriteOp::UpdateRow`] per dirty row, in received order
    pub updates: WriteBatch,
    /// New rows in received order
    pub new_rows: Vec<Vec<CellValue>>,
}

/// Read existing rows into an index keyed by their id cell.
///
/// Blank rows are skipped. A non-blank row without an integer id is fatal.
/// Rows repeating an earlier id are dropped with a warning.
pub fn read_existing_rows(
    snapshot: &TableSnapshot,
    layout: &ColumnLayout,
) -> Result<IndexedMap<RecordId, RowSnapshot>> {
    let mut existing = IndexedMap::with_capacity(snapshot.rows.len());
    let mut blank = 0;

    for (position, row) in snapshot.rows.iter().enumerate() {
        if row.values.len() != layout.columns.len() {
            return Err(Error::RowWidthMismatch {
                row_id: row.row_id,
                expected: layout.columns.len(),
                actual: row.values.len(),
            });
        }
        if row.is_blank() {
            blank += 1;
            continue;
        }

        let cell = &row.values[layout.id_index];
        let id = cell.as_integer().ok_or_else(|| Error::InvalidRowId {
            column: ID_COLUMN.to_string(),
            row: position + 1,
            value: cell.to_string(),
        })?;

        if !existing.try_add(id, row.clone()) {
            tracing::warn!(id, row = position + 1, "dropping table row with duplicate id");
        }
    }

    tracing::debug!(rows = existing.len(), blank, "indexed existing rows");
    Ok(existing)
}

/// Diffs received records against existing rows.
pub struct RecordReconciler<'a> {
    registry: &'a ColumnRegistry,
    layout: &'a ColumnLayout,
    replace_existing: bool,
    stamp: SyncStamp,
}

impl<'a> RecordReconciler<'a> {
    pub fn new(
        registry: &'a ColumnRegistry,
        layout: &'a ColumnLayout,
        replace_existing: bool,
        stamp: SyncStamp,
    ) -> Self {
        Self {
            registry,
            layout,
            replace_existing,
            stamp,
        }
    }

    /// Reconcile received records against existing rows.
    ///
    /// Rows that get rewritten are updated in `existing` as well, so the
    /// index reflects the staged state afterwards.
    pub fn reconcile(
        &self,
        existing: &mut IndexedMap<RecordId, RowSnapshot>,
        received: &IndexedMap<RecordId, Transaction>,
    ) -> Result<ReconcileOutcome> {
        let mut summary = ReconcileSummary {
            received: received.len(),
            ..Default::default()
        };
        let mut updates = WriteBatch::new();
        let mut new_rows = Vec::new();

        for tx in received {
            match existing.get_mut(&tx.id) {
                None => {
                    new_rows.push(self.new_row(tx)?);
                    summary.inserted += 1;
                }
                Some(_) if !self.replace_existing => summary.skipped_by_policy += 1,
                Some(row) => {
                    if self.stage_row(row, tx)? {
                        updates.push(WriteOp::UpdateRow {
                            row_id: row.row_id,
                            values: row.values.clone(),
                        });
                        summary.updated += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }
        }

        tracing::debug!(
            received = summary.received,
            inserted = summary.inserted,
            updated = summary.updated,
            unchanged = summary.unchanged,
            skipped = summary.skipped_by_policy,
            version = self.stamp.version,
            "reconciled transactions"
        );

        Ok(ReconcileOutcome {
            summary,
            updates,
            new_rows,
        })
    }

    fn new_row(&self, tx: &Transaction) -> Result<Vec<CellValue>> {
        self.layout
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| {
                if i == self.layout.version_index {
                    Ok(self.stamp.version_cell())
                } else {
                    self.registry.column_value(tx, column)
                }
            })
            .collect()
    }

    /// Stage received values into `row`. Returns true if the row is dirty.
    fn stage_row(&self, row: &mut RowSnapshot, tx: &Transaction) -> Result<bool> {
        let mut dirty = false;

        for (i, column) in self.layout.columns.iter().enumerate() {
            if i == self.layout.version_index {
                continue;
            }
            let received = self.registry.column_value(tx, column)?;
            if same_value(&row.values[i], &received) {
                continue;
            }

            let shadowed_by_formula =
                matches!(row.formula(i), Some(f) if received.as_text() == Some(f));
            if !shadowed_by_formula {
                tracing::trace!(id = tx.id, column = %column, "column drifted");
                dirty = true;
            }
            row.values[i] = received;
        }

        if dirty {
            row.values[self.layout.version_index] = self.stamp.version_cell();
        }
        Ok(dirty)
    }
}

/// Equality of a stored literal and a received value.
pub fn same_value(stored: &CellValue, received: &CellValue) -> bool {
    if stored == received {
        return true;
    }
    match (stored, received) {
        (CellValue::Number(n), CellValue::Text(text)) => {
            parse_numeric_literal(text).is_some_and(|parsed| parsed == *n)
        }
        _ => false,
    }
}
