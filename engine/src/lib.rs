//! # Tabsync Engine
//!
//! A deterministic reconciliation engine that syncs remote financial
//! transactions into a user-editable table.
//!
//! This crate holds the pure logic: parsing records, deriving the tag
//! taxonomy, computing column values, aligning the table header and diffing
//! received records against existing rows. It never touches the network or
//! a database; callers fetch records and own the table.
//!
//! ## Design Principles
//!
//! - **No IO**: the table is reached only through the [`TableStore`] trait
//! - **Deterministic**: every keyed collection is an [`IndexedMap`], so
//!   iteration follows arrival order
//! - **Non-destructive**: rows are only rewritten when a column drifted, and
//!   user formulas that produce the received value are kept
//!
//! ## Core Concepts
//!
//! ### Columns
//!
//! The [`ColumnRegistry`] lists how each column is computed from a
//! [`Transaction`]. One placeholder expands into a column per tag group,
//! named `Tags:<group>`.
//!
//! ### Staged writes
//!
//! Reads go through a [`TableSnapshot`] of the last commit; writes are
//! staged in a [`WriteBatch`] and applied by [`TableStore::commit`].
//!
//! ### Passes
//!
//! A [`SyncPass`] plans the schema step and the record step. Each step is
//! planned against the snapshot committed by the one before.
//!
//! ## Quick Start
//!
//! ```rust
//! use tabsync_engine::{run_pass, CellValue, MemoryTable, SyncPass, TableStore};
//! use chrono::Utc;
//! use serde_json::json;
//!
//! // 1. An empty table gets the full header on its first pass
//! let mut table = MemoryTable::new("Transactions", Vec::new());
//!
//! // 2. Plan a pass over one fetched page
//! let page = vec![json!({"id": 7, "payee": "Cafe", "to_base": 10.0,
//!                        "tags": [{"id": 1, "name": "Trip:Paris"}]})];
//! let pass = SyncPass::new(page, &[], true, Utc::now()).unwrap();
//!
//! // 3. Run it
//! let summary = run_pass(&mut table, &pass).unwrap();
//! assert_eq!(summary.counts.inserted, 1);
//!
//! let snapshot = table.snapshot().unwrap();
//! let trip = snapshot.column_index("Tags:Trip").unwrap();
//! assert_eq!(snapshot.rows[0].values[trip], CellValue::text("Paris"));
//! ```

pub mod categories;
pub mod cell;
pub mod columns;
pub mod error;
pub mod indexed_map;
pub mod memory;
pub mod pass;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod stamp;
pub mod table;
pub mod tags;

// Re-export main types at crate root
pub use categories::{
    category_table, flatten_categories, Category, CategoryList, FlatCategory,
    CATEGORY_TABLE_COLUMNS,
};
pub use cell::{parse_numeric_literal, CellValue};
pub use columns::{
    static_column_specs, tag_column_name, ColumnKind, ColumnRegistry, ColumnSpec, Source,
    ID_COLUMN, LAST_SYNC_VERSION_COLUMN, TAG_COLUMNS_PLACEHOLDER, TAG_COLUMN_PREFIX,
};
pub use error::Error;
pub use indexed_map::IndexedMap;
pub use memory::{MemoryTable, StoredCell, StoredRow, TableParts};
pub use pass::{
    error_marker_batch, run_pass, PassSummary, RecordPlan, SchemaPlan, SyncContext, SyncPass,
};
pub use reconcile::{read_existing_rows, ReconcileOutcome, ReconcileSummary, RecordReconciler};
pub use record::{index_transactions, Transaction, TransactionPage};
pub use schema::{
    is_column_naming_equivalent, plan_missing_tag_columns, validate_layout, ColumnLayout,
};
pub use stamp::SyncStamp;
pub use table::{
    RowId, RowSnapshot, SortKey, SyncInfo, TableContents, TableSnapshot, TableStore, WriteBatch,
    WriteOp,
};
pub use tags::{
    parse_tag, tag_table, Tag, TagInfo, TagValuesCollection, TAG_GROUP_SEPARATOR,
    UNGROUPED_TAG_MONIKER,
};

/// Primary key of a remote record.
pub type RecordId = i64;
