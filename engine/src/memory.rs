//! In-memory staged table.
//!
//! [`MemoryTable`] behaves like a spreadsheet-backed table: numeric-looking
//! text typed into a cell is stored as a number, and text starting with `=`
//! is stored as a formula whose displayed value is owned by the host. Each
//! commit is applied to a copy and swapped in, so a failing batch leaves the
//! table as it was after the previous commit.

use crate::{
    error::Result, parse_numeric_literal, CellValue, Error, RowId, RowSnapshot, SortKey, SyncInfo,
    TableContents, TableSnapshot, TableStore, WriteBatch, WriteOp,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

/// One stored cell: the displayed literal plus optional formula text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredCell {
    #[serde(rename = "v")]
    pub value: CellValue,
    #[serde(rename = "f", default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl StoredCell {
    /// Write a value the way a user typing into the cell would.
    pub fn write(&mut self, value: CellValue) {
        match value {
            CellValue::Text(text) if text.starts_with('=') => {
                if self.formula.as_deref() != Some(text.as_str()) {
                    self.value = CellValue::empty();
                }
                self.formula = Some(text);
            }
            CellValue::Text(text) => {
                self.formula = None;
                self.value = match parse_numeric_literal(&text) {
                    Some(n) => CellValue::Number(n),
                    None => CellValue::Text(text),
                };
            }
            other => {
                self.formula = None;
                self.value = other;
            }
        }
    }

    fn written(value: CellValue) -> Self {
        let mut cell = Self::default();
        cell.write(value);
        cell
    }
}

/// One stored row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRow {
    pub id: RowId,
    pub cells: Vec<StoredCell>,
}

impl StoredRow {
    fn snapshot(&self) -> RowSnapshot {
        RowSnapshot {
            row_id: self.id,
            values: self.cells.iter().map(|c| c.value.clone()).collect(),
            formulas: self.cells.iter().map(|c| c.formula.clone()).collect(),
        }
    }
}

/// Full persisted state of a table, for loading and saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParts {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<StoredRow>,
    pub error_marker: Option<String>,
    pub last_sync: Option<SyncInfo>,
    pub next_row_id: RowId,
}

/// A table held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryTable {
    parts: TableParts,
}

impl MemoryTable {
    /// Create an empty table with a header.
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            parts: TableParts {
                name: name.into(),
                columns,
                rows: Vec::new(),
                error_marker: None,
                last_sync: None,
                next_row_id: 1,
            },
        }
    }

    /// Restore a table from persisted parts.
    pub fn from_parts(parts: TableParts) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &TableParts {
        &self.parts
    }

    pub fn into_parts(self) -> TableParts {
        self.parts
    }

    pub fn name(&self) -> &str {
        &self.parts.name
    }

    pub fn columns(&self) -> &[String] {
        &self.parts.columns
    }

    pub fn rows(&self) -> &[StoredRow] {
        &self.parts.rows
    }

    /// Append a row directly, bypassing staging.
    pub fn push_row(&mut self, values: Vec<CellValue>) -> Result<RowId> {
        let id = self.parts.allocate_row_id();
        let row = self.parts.build_row(id, values)?;
        self.parts.rows.push(row);
        Ok(id)
    }

    /// Put a formula with a known displayed value into a cell, bypassing
    /// staging.
    pub fn set_formula(
        &mut self,
        row_id: RowId,
        column: usize,
        formula: impl Into<String>,
        display: CellValue,
    ) -> Result<()> {
        let count = self.parts.columns.len();
        let row = self.parts.row_mut(row_id)?;
        let cell = row
            .cells
            .get_mut(column)
            .ok_or(Error::ColumnOutOfRange {
                index: column,
                count,
            })?;
        cell.formula = Some(formula.into());
        cell.value = display;
        Ok(())
    }
}

impl TableParts {
    fn allocate_row_id(&mut self) -> RowId {
        let id = self.next_row_id;
        self.next_row_id += 1;
        id
    }

    fn build_row(&self, id: RowId, values: Vec<CellValue>) -> Result<StoredRow> {
        self.check_width(id, values.len())?;
        Ok(StoredRow {
            id,
            cells: values.into_iter().map(StoredCell::written).collect(),
        })
    }

    fn check_width(&self, row_id: RowId, actual: usize) -> Result<()> {
        if actual == self.columns.len() {
            Ok(())
        } else {
            Err(Error::RowWidthMismatch {
                row_id,
                expected: self.columns.len(),
                actual,
            })
        }
    }

    fn row_mut(&mut self, row_id: RowId) -> Result<&mut StoredRow> {
        self.rows
            .iter_mut()
            .find(|r| r.id == row_id)
            .ok_or(Error::RowNotFound(row_id))
    }

    fn apply(&mut self, op: WriteOp) -> Result<()> {
        match op {
            WriteOp::InsertColumn { index, name } => {
                if index > self.columns.len() {
                    return Err(Error::ColumnOutOfRange {
                        index,
                        count: self.columns.len(),
                    });
                }
                self.columns.insert(index, name);
                for row in &mut self.rows {
                    row.cells.insert(index, StoredCell::default());
                }
            }
            WriteOp::DeleteRows { row_ids } => {
                let doomed: HashSet<RowId> = row_ids.into_iter().collect();
                if let Some(missing) = doomed
                    .iter()
                    .find(|id| !self.rows.iter().any(|r| r.id == **id))
                {
                    return Err(Error::RowNotFound(*missing));
                }
                self.rows.retain(|r| !doomed.contains(&r.id));
            }
            WriteOp::UpdateRow { row_id, values } => {
                self.check_width(row_id, values.len())?;
                let row = self.row_mut(row_id)?;
                for (cell, value) in row.cells.iter_mut().zip(values) {
                    cell.write(value);
                }
            }
            WriteOp::PrependRows { rows } => {
                let mut built = Vec::with_capacity(rows.len() + self.rows.len());
                for values in rows {
                    let id = self.allocate_row_id();
                    built.push(self.build_row(id, values)?);
                }
                built.append(&mut self.rows);
                self.rows = built;
            }
            WriteOp::SortRows { keys } => {
                if let Some(key) = keys.iter().find(|k| k.column >= self.columns.len()) {
                    return Err(Error::ColumnOutOfRange {
                        index: key.column,
                        count: self.columns.len(),
                    });
                }
                self.rows.sort_by(|a, b| compare_rows(a, b, &keys));
            }
            WriteOp::ReplaceContents { contents } => {
                let TableContents { columns, rows } = contents;
                self.columns = columns;
                self.rows.clear();
                for values in rows {
                    let id = self.allocate_row_id();
                    let row = self.build_row(id, values)?;
                    self.rows.push(row);
                }
            }
            WriteOp::SetErrorMarker { message } => self.error_marker = message,
            WriteOp::SetSyncInfo { info } => self.last_sync = Some(info),
        }
        Ok(())
    }
}

impl TableStore for MemoryTable {
    fn snapshot(&self) -> Result<TableSnapshot> {
        Ok(TableSnapshot {
            name: self.parts.name.clone(),
            columns: self.parts.columns.clone(),
            rows: self.parts.rows.iter().map(StoredRow::snapshot).collect(),
            error_marker: self.parts.error_marker.clone(),
            last_sync: self.parts.last_sync,
        })
    }

    fn commit(&mut self, batch: WriteBatch) -> Result<()> {
        let mut staged = self.parts.clone();
        for op in batch.into_ops() {
            staged.apply(op)?;
        }
        self.parts = staged;
        Ok(())
    }
}

fn compare_rows(a: &StoredRow, b: &StoredRow, keys: &[SortKey]) -> Ordering {
    keys.iter()
        .map(|key| {
            compare_cells(
                &a.cells[key.column].value,
                &b.cells[key.column].value,
                key.ascending,
            )
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Spreadsheet ordering: numbers, then text (case-insensitive), then
/// booleans. Blank cells sort last in either direction.
fn compare_cells(a: &CellValue, b: &CellValue, ascending: bool) -> Ordering {
    match (a.is_blank(), b.is_blank()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => {}
    }

    let rank = |v: &CellValue| match v {
        CellValue::Number(_) => 0,
        CellValue::Text(_) => 1,
        CellValue::Bool(_) => 2,
    };
    let ordering = match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.total_cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    };

    if ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> MemoryTable {
        MemoryTable::new("t", vec!["id".into(), "name".into()])
    }

    fn values(t: &MemoryTable, column: usize) -> Vec<CellValue> {
        t.snapshot()
            .unwrap()
            .rows
            .into_iter()
            .map(|r| r.values[column].clone())
            .collect()
    }

    fn numbers(ns: &[f64]) -> Vec<CellValue> {
        ns.iter().copied().map(CellValue::Number).collect()
    }

    #[test]
    fn numeric_text_is_coerced() {
        let mut t = table();
        t.push_row(vec!["42".into(), "2024-01-05".into()]).unwrap();
        let row = &t.snapshot().unwrap().rows[0];
        assert_eq!(row.values[0], CellValue::Number(42.0));
        assert_eq!(row.values[1], CellValue::text("2024-01-05"));
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let mut t = table();
        let id = t.push_row(vec![1.0.into(), "a".into()]).unwrap();

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::UpdateRow {
            row_id: id,
            values: vec![1.0.into(), "b".into()],
        });
        assert_eq!(values(&t, 1), vec![CellValue::text("a")]);

        t.commit(batch).unwrap();
        assert_eq!(values(&t, 1), vec![CellValue::text("b")]);
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let mut t = table();
        t.push_row(vec![1.0.into(), "a".into()]).unwrap();

        let batch = WriteBatch::from(vec![
            WriteOp::SetErrorMarker {
                message: Some("x".into()),
            },
            WriteOp::DeleteRows { row_ids: vec![99] },
        ]);
        assert_eq!(t.commit(batch), Err(Error::RowNotFound(99)));
        assert_eq!(t.snapshot().unwrap().error_marker, None);
    }

    #[test]
    fn formula_write_keeps_display_only_when_unchanged() {
        let mut t = table();
        let id = t.push_row(vec![1.0.into(), "".into()]).unwrap();
        t.set_formula(id, 1, "=A1*2", CellValue::Number(2.0)).unwrap();

        t.commit(WriteBatch::from(vec![WriteOp::UpdateRow {
            row_id: id,
            values: vec![1.0.into(), "=A1*2".into()],
        }]))
        .unwrap();
        let row = &t.snapshot().unwrap().rows[0];
        assert_eq!(row.values[1], CellValue::Number(2.0));
        assert_eq!(row.formula(1), Some("=A1*2"));

        t.commit(WriteBatch::from(vec![WriteOp::UpdateRow {
            row_id: id,
            values: vec![1.0.into(), "=A1*3".into()],
        }]))
        .unwrap();
        let row = &t.snapshot().unwrap().rows[0];
        assert_eq!(row.values[1], CellValue::empty());
        assert_eq!(row.formula(1), Some("=A1*3"));
    }

    #[test]
    fn insert_column_pads_rows() {
        let mut t = table();
        t.push_row(vec![1.0.into(), "a".into()]).unwrap();
        t.commit(WriteBatch::from(vec![WriteOp::InsertColumn {
            index: 1,
            name: "Tags:Trip".into(),
        }]))
        .unwrap();

        let snap = t.snapshot().unwrap();
        assert_eq!(snap.columns, vec!["id", "Tags:Trip", "name"]);
        assert_eq!(snap.rows[0].values[1], CellValue::empty());
        assert_eq!(snap.rows[0].values[2], CellValue::text("a"));

        let err = t
            .commit(WriteBatch::from(vec![WriteOp::InsertColumn {
                index: 9,
                name: "x".into(),
            }]))
            .unwrap_err();
        assert_eq!(err, Error::ColumnOutOfRange { index: 9, count: 3 });
    }

    #[test]
    fn prepend_keeps_given_order_above_existing_rows() {
        let mut t = table();
        t.push_row(vec![1.0.into(), "old".into()]).unwrap();
        t.commit(WriteBatch::from(vec![WriteOp::PrependRows {
            rows: vec![
                vec![2.0.into(), "new1".into()],
                vec![3.0.into(), "new2".into()],
            ],
        }]))
        .unwrap();

        assert_eq!(
            values(&t, 1),
            vec![CellValue::text("new1"), CellValue::text("new2"), CellValue::text("old")]
        );
        let ids: Vec<_> = t.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn row_width_is_checked() {
        let mut t = table();
        let err = t.push_row(vec![1.0.into()]).unwrap_err();
        assert_eq!(
            err,
            Error::RowWidthMismatch {
                row_id: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn sort_puts_blanks_last_both_ways() {
        let mut t = table();
        for (id, name) in [(1.0, "b"), (2.0, ""), (3.0, "A"), (4.0, "c")] {
            t.push_row(vec![id.into(), name.into()]).unwrap();
        }

        t.commit(WriteBatch::from(vec![WriteOp::SortRows {
            keys: vec![SortKey {
                column: 1,
                ascending: true,
            }],
        }]))
        .unwrap();
        assert_eq!(
            values(&t, 0),
            numbers(&[3.0, 1.0, 4.0, 2.0])
        );

        t.commit(WriteBatch::from(vec![WriteOp::SortRows {
            keys: vec![SortKey {
                column: 1,
                ascending: false,
            }],
        }]))
        .unwrap();
        assert_eq!(
            values(&t, 0),
            numbers(&[4.0, 1.0, 3.0, 2.0])
        );
    }

    #[test]
    fn sort_is_stable_and_uses_later_keys() {
        let mut t = table();
        for (id, name) in [(2.0, "x"), (1.0, "x"), (3.0, "a")] {
            t.push_row(vec![id.into(), name.into()]).unwrap();
        }
        t.commit(WriteBatch::from(vec![WriteOp::SortRows {
            keys: vec![
                SortKey {
                    column: 1,
                    ascending: false,
                },
                SortKey {
                    column: 0,
                    ascending: true,
                },
            ],
        }]))
        .unwrap();
        assert_eq!(values(&t, 0), numbers(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn replace_contents_and_metadata() {
        let mut t = table();
        t.push_row(vec![1.0.into(), "a".into()]).unwrap();
        t.commit(WriteBatch::from(vec![
            WriteOp::ReplaceContents {
                contents: TableContents::new(vec!["x".into()], vec![vec!["7".into()]]),
            },
            WriteOp::SetErrorMarker {
                message: Some("ERR: boom".into()),
            },
        ]))
        .unwrap();

        let snap = t.snapshot().unwrap();
        assert_eq!(snap.columns, vec!["x"]);
        assert_eq!(snap.rows.len(), 1);
        assert_eq!(snap.rows[0].values[0], CellValue::Number(7.0));
        assert_eq!(snap.error_marker.as_deref(), Some("ERR: boom"));
    }

    #[test]
    fn parts_round_trip_through_json() {
        let mut t = table();
        let id = t.push_row(vec![1.0.into(), "a".into()]).unwrap();
        t.set_formula(id, 1, "=B1", CellValue::text("a")).unwrap();

        let json = serde_json::to_string(t.parts()).unwrap();
        let parts: TableParts = serde_json::from_str(&json).unwrap();
        assert_eq!(MemoryTable::from_parts(parts), t);
    }
}
