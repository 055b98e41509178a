//! Sync pass planning.
//!
//! A pass runs in two committed steps against the transactions table:
//!
//! 1. [`SyncPass::plan_schema`] clears the error marker, adds missing tag
//!    group columns and removes blank rows.
//! 2. [`SyncPass::plan_records`] validates the header, reads the existing
//!    rows, reconciles the received records and stages updates, new rows,
//!    the sort and the sync info.
//!
//! Each step plans against the snapshot committed by the step before it.
//! Callers that own the IO run the steps themselves; [`run_pass`] drives a
//! synchronous [`TableStore`] end to end.

use crate::{
    error::Result, plan_missing_tag_columns, read_existing_rows, tags::assignable_tags,
    validate_layout, ColumnRegistry, IndexedMap, ReconcileSummary, RecordId, RecordReconciler,
    SortKey, SyncInfo, SyncStamp, Tag, TableSnapshot, TableStore, TagValuesCollection,
    Transaction, WriteBatch, WriteOp, ID_COLUMN,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Display;

/// Prefix of the message written into the error marker of a failed pass.
pub const ERROR_MARKER_PREFIX: &str = "ERR: ";

/// Row order after a pass: column name and ascending flag.
pub const ROW_ORDER: [(&str, bool); 6] = [
    ("date", false),
    ("plaid:authorized_datetime", false),
    ("Account", true),
    ("payee", true),
    ("plaid:datetime", false),
    (ID_COLUMN, true),
];

/// Everything one pass needs besides the store, built once per pass.
#[derive(Debug, Clone)]
pub struct SyncContext {
    pub replace_existing: bool,
    pub now: DateTime<Utc>,
    /// Tag groups and values that get columns in this pass
    pub taxonomy: TagValuesCollection,
    pub registry: ColumnRegistry,
}

impl SyncContext {
    pub fn new(taxonomy: TagValuesCollection, replace_existing: bool, now: DateTime<Utc>) -> Self {
        let registry = ColumnRegistry::build(&taxonomy);
        Self {
            replace_existing,
            now,
            taxonomy,
            registry,
        }
    }
}

/// Outcome of the record step.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPlan {
    pub stamp: SyncStamp,
    pub summary: ReconcileSummary,
    pub batch: WriteBatch,
}

/// Outcome of the schema step.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaPlan {
    pub batch: WriteBatch,
    pub columns_added: usize,
    pub blank_rows_removed: usize,
}

/// Counts reported for a completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub version: u64,
    pub utc: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: ReconcileSummary,
    /// Fetched records dropped for repeating an earlier id
    pub duplicates: usize,
    pub columns_added: usize,
    pub blank_rows_removed: usize,
}

impl PassSummary {
    pub fn new(
        pass: &SyncPass,
        columns_added: usize,
        blank_rows_removed: usize,
        plan: &RecordPlan,
    ) -> Self {
        Self {
            version: plan.stamp.version,
            utc: plan.stamp.utc,
            counts: plan.summary,
            duplicates: pass.duplicates(),
            columns_added,
            blank_rows_removed,
        }
    }
}

/// One sync pass over a fetched page of transactions.
#[derive(Debug, Clone)]
pub struct SyncPass {
    context: SyncContext,
    received: IndexedMap<RecordId, Transaction>,
    duplicates: usize,
}

impl SyncPass {
    /// Parse the fetched page and build the pass context.
    ///
    /// The taxonomy is the tag vocabulary plus every tag seen on a received
    /// record.
    pub fn new(
        page: Vec<Value>,
        vocabulary: &[Tag],
        replace_existing: bool,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (received, duplicates) = crate::index_transactions(page)?;
        let taxonomy = assignable_tags(vocabulary, &received);
        tracing::debug!(
            groups = taxonomy.len(),
            received = received.len(),
            "built pass taxonomy"
        );
        Ok(Self {
            context: SyncContext::new(taxonomy, replace_existing, now),
            received,
            duplicates,
        })
    }

    pub fn context(&self) -> &SyncContext {
        &self.context
    }

    pub fn received(&self) -> &IndexedMap<RecordId, Transaction> {
        &self.received
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Plan the schema step.
    ///
    /// A table without any columns gets the full header.
    pub fn plan_schema(&self, snapshot: &TableSnapshot) -> SchemaPlan {
        let mut batch = WriteBatch::new();
        batch.push(WriteOp::SetErrorMarker { message: None });

        if snapshot.columns.is_empty() {
            tracing::info!(table = %snapshot.name, "writing header into empty table");
            batch.push(WriteOp::ReplaceContents {
                contents: crate::TableContents::new(self.context.registry.column_names(), Vec::new()),
            });
            return SchemaPlan {
                batch,
                columns_added: 0,
                blank_rows_removed: 0,
            };
        }

        let inserts = plan_missing_tag_columns(&self.context.registry, &snapshot.columns);
        let columns_added = inserts.len();
        for op in inserts {
            batch.push(op);
        }

        let blank: Vec<_> = snapshot
            .rows
            .iter()
            .filter(|row| row.is_blank())
            .map(|row| row.row_id)
            .collect();
        let blank_rows_removed = blank.len();
        if !blank.is_empty() {
            tracing::debug!(rows = blank_rows_removed, "removing blank rows");
            batch.push(WriteOp::DeleteRows { row_ids: blank });
        }
        SchemaPlan {
            batch,
            columns_added,
            blank_rows_removed,
        }
    }

    /// Plan the record step.
    pub fn plan_records(&self, snapshot: &TableSnapshot) -> Result<RecordPlan> {
        let layout = validate_layout(snapshot, &self.context.registry)?;
        let stamp = SyncStamp::next_for(snapshot, layout.version_index, self.context.now);

        let mut existing = read_existing_rows(snapshot, &layout)?;
        let outcome = RecordReconciler::new(
            &self.context.registry,
            &layout,
            self.context.replace_existing,
            stamp,
        )
        .reconcile(&mut existing, &self.received)?;

        let mut batch = outcome.updates;
        let row_count = snapshot.rows.len() + outcome.new_rows.len();
        if !outcome.new_rows.is_empty() {
            batch.push(WriteOp::PrependRows {
                rows: outcome.new_rows,
            });
        }

        let keys: Vec<SortKey> = ROW_ORDER
            .iter()
            .filter_map(|(name, ascending)| {
                snapshot.column_index(name).map(|column| SortKey {
                    column,
                    ascending: *ascending,
                })
            })
            .collect();
        batch.push(WriteOp::SortRows { keys });
        batch.push(WriteOp::SetSyncInfo {
            info: SyncInfo { stamp, row_count },
        });

        Ok(RecordPlan {
            stamp,
            summary: outcome.summary,
            batch,
        })
    }
}

/// Batch that records a failed pass in the table.
pub fn error_marker_batch(err: &impl Display) -> WriteBatch {
    WriteBatch::from(vec![WriteOp::SetErrorMarker {
        message: Some(format!("{ERROR_MARKER_PREFIX}{err}")),
    }])
}

/// Run a whole pass against a synchronous store.
///
/// On failure the error marker is written on a best-effort basis and the
/// original error is returned. Batches committed before the failure stay
/// applied.
pub fn run_pass<S: TableStore>(store: &mut S, pass: &SyncPass) -> Result<PassSummary> {
    let result = run_steps(store, pass);
    if let Err(err) = &result {
        tracing::error!(error = %err, "sync pass failed");
        if let Err(marker_err) = store.commit(error_marker_batch(err)) {
            tracing::warn!(error = %marker_err, "could not record error marker");
        }
    }
    result
}

fn run_steps<S: TableStore>(store: &mut S, pass: &SyncPass) -> Result<PassSummary> {
    let before = store.snapshot()?;
    let schema = pass.plan_schema(&before);
    store.commit(schema.batch)?;

    let aligned = store.snapshot()?;
    let plan = pass.plan_records(&aligned)?;
    let summary = PassSummary::new(pass, schema.columns_added, schema.blank_rows_removed, &plan);
    store.commit(plan.batch)?;

    tracing::info!(
        version = summary.version,
        inserted = summary.counts.inserted,
        updated = summary.counts.updated,
        "sync pass completed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CellValue, MemoryTable, LAST_SYNC_VERSION_COLUMN};
    use serde_json::json;

    fn pass(page: Vec<Value>, replace: bool) -> SyncPass {
        SyncPass::new(page, &[], replace, Utc::now()).unwrap()
    }

    #[test]
    fn empty_table_gets_header_then_rows() {
        let mut table = MemoryTable::new("Transactions", Vec::new());
        let p = pass(vec![json!({"id": 1, "payee": "Cafe"})], true);

        let summary = run_pass(&mut table, &p).unwrap();
        assert_eq!(summary.version, 1);
        assert_eq!(summary.counts.inserted, 1);

        let snap = table.snapshot().unwrap();
        assert_eq!(snap.columns, p.context().registry.column_names());
        assert_eq!(snap.rows.len(), 1);
        let version = snap.column_index(LAST_SYNC_VERSION_COLUMN).unwrap();
        assert_eq!(snap.rows[0].values[version], CellValue::Number(1.0));
        assert_eq!(snap.last_sync.unwrap().row_count, 1);
    }

    #[test]
    fn schema_step_clears_marker_and_blank_rows() {
        let p = pass(Vec::new(), true);
        let mut table = MemoryTable::new("Transactions", p.context().registry.column_names());
        let width = table.columns().len();
        let blank = table.push_row(vec![CellValue::empty(); width]).unwrap();

        let schema = p.plan_schema(&table.snapshot().unwrap());
        assert_eq!(schema.blank_rows_removed, 1);
        assert_eq!(
            schema.batch.ops(),
            &[
                WriteOp::SetErrorMarker { message: None },
                WriteOp::DeleteRows {
                    row_ids: vec![blank]
                },
            ]
        );
    }

    #[test]
    fn failed_pass_records_error_marker() {
        let mut table = MemoryTable::new("Transactions", vec!["unrelated".into()]);
        let p = pass(vec![json!({"id": 1})], true);

        let err = run_pass(&mut table, &p).unwrap_err();
        let marker = table.snapshot().unwrap().error_marker.unwrap();
        assert_eq!(marker, format!("ERR: {err}"));
        assert!(marker.contains("clear or recreate the table"));
    }

    #[test]
    fn sort_keys_skip_absent_columns() {
        let p = pass(Vec::new(), true);
        let table = MemoryTable::new("Transactions", p.context().registry.column_names());
        let plan = p.plan_records(&table.snapshot().unwrap()).unwrap();

        let keys = plan
            .batch
            .ops()
            .iter()
            .find_map(|op| match op {
                WriteOp::SortRows { keys } => Some(keys.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(keys.len(), ROW_ORDER.len());
        assert!(!keys[0].ascending);
    }
}
