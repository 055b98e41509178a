//! The tabular store abstraction.
//!
//! A store is read only through a [`TableSnapshot`] of its last committed
//! state, and written only by committing a [`WriteBatch`] of staged
//! operations. Nothing staged is visible until the batch is committed.

use crate::{error::Result, CellValue, SyncStamp};
use serde::{Deserialize, Serialize};

/// Stable address of a stored row.
pub type RowId = u64;

/// One persisted row as captured at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSnapshot {
    /// Address of the row in the store
    pub row_id: RowId,
    /// Literal (displayed) values, one per column
    pub values: Vec<CellValue>,
    /// Formula text per column, if the cell holds a formula
    pub formulas: Vec<Option<String>>,
}

impl RowSnapshot {
    /// Check if every cell is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(CellValue::is_blank)
    }

    /// Formula text of one cell.
    pub fn formula(&self, column: usize) -> Option<&str> {
        self.formulas.get(column).and_then(|f| f.as_deref())
    }
}

/// Last completed sync recorded on a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub stamp: SyncStamp,
    /// Number of rows in the table after the sync
    pub row_count: usize,
}

/// The committed state of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    pub name: String,
    /// Header row
    pub columns: Vec<String>,
    /// Rows in table order
    pub rows: Vec<RowSnapshot>,
    /// Message shown in the table's error location, if any
    pub error_marker: Option<String>,
    pub last_sync: Option<SyncInfo>,
}

impl TableSnapshot {
    /// Index of a column, ignoring surrounding whitespace in the header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        let name = name.trim();
        self.columns.iter().position(|c| c.trim() == name)
    }
}

/// Plain contents of a table: a header and literal rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableContents {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl TableContents {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { columns, rows }
    }
}

/// One sort key for [`WriteOp::SortRows`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub column: usize,
    pub ascending: bool,
}

/// A staged store mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum WriteOp {
    /// Insert an empty column before `index` (or append at the end)
    InsertColumn { index: usize, name: String },
    /// Delete rows by address
    DeleteRows { row_ids: Vec<RowId> },
    /// Overwrite every cell of one row
    UpdateRow { row_id: RowId, values: Vec<CellValue> },
    /// Insert rows above the current first row, in the given order
    PrependRows { rows: Vec<Vec<CellValue>> },
    /// Stable sort of all rows
    SortRows { keys: Vec<SortKey> },
    /// Replace header and rows entirely
    ReplaceContents { contents: TableContents },
    /// Set or clear the error marker
    SetErrorMarker { message: Option<String> },
    /// Record the last completed sync
    SetSyncInfo { info: SyncInfo },
}

/// Operations staged for one commit, applied in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an operation.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Stage every operation of another batch after this one's.
    pub fn extend(&mut self, other: WriteBatch) {
        self.ops.extend(other.ops);
    }

    /// Staged operations in order.
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl From<Vec<WriteOp>> for WriteBatch {
    fn from(ops: Vec<WriteOp>) -> Self {
        Self { ops }
    }
}

/// A table the engine reconciles against.
///
/// Implementations must apply a batch's operations in order and make them
/// visible to [`TableStore::snapshot`] only once `commit` returns. A failed
/// commit may leave earlier batches applied.
pub trait TableStore {
    /// Read the last committed state.
    fn snapshot(&self) -> Result<TableSnapshot>;

    /// Apply a staged batch.
    fn commit(&mut self, batch: WriteBatch) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_row_detection() {
        let row = RowSnapshot {
            row_id: 1,
            values: vec![CellValue::empty(), CellValue::text("  ")],
            formulas: vec![None, None],
        };
        assert!(row.is_blank());

        let row = RowSnapshot {
            values: vec![CellValue::empty(), CellValue::Number(0.0)],
            ..row
        };
        assert!(!row.is_blank());
        assert_eq!(row.formula(0), None);
        assert_eq!(row.formula(9), None);
    }

    #[test]
    fn batch_keeps_order() {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetErrorMarker { message: None });
        let mut other = WriteBatch::new();
        other.push(WriteOp::DeleteRows { row_ids: vec![3] });
        batch.extend(other);

        assert_eq!(batch.len(), 2);
        assert!(matches!(batch.ops()[1], WriteOp::DeleteRows { .. }));
    }

    #[test]
    fn write_op_serializes_tagged() {
        let op = WriteOp::InsertColumn {
            index: 2,
            name: "Tags:Trip".into(),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "insertColumn");
        assert_eq!(json["name"], "Tags:Trip");
    }
}
