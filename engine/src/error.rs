//! Error types for the tabsync engine.

use crate::{RecordId, RowId};
use thiserror::Error;

/// All possible errors from the tabsync engine.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    // Payload errors
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("cannot parse id of fetched transaction #{index}: integer id expected, got '{value}'")]
    InvalidRecordId { index: usize, value: String },

    #[error("invalid {column} value ('{value}') for table row {row}")]
    InvalidRowId {
        column: String,
        row: usize,
        value: String,
    },

    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("category {0} has a cyclic parent chain")]
    CategoryCycle(RecordId),

    // Schema errors
    #[error(
        "table '{table}' does not contain the expected column '{column}'; \
         clear or recreate the table and sync again"
    )]
    MissingColumn { table: String, column: String },

    #[error(
        "columns in table '{table}' do not match the expected transaction header \
         structure; clear or recreate the table and sync again"
    )]
    SchemaMismatch { table: String },

    #[error("cannot find specification for column '{0}'")]
    UnknownColumn(String),

    // Store errors
    #[error("row not found: {0}")]
    RowNotFound(RowId),

    #[error("column index {index} out of range for table with {count} columns")]
    ColumnOutOfRange { index: usize, count: usize },

    #[error("row {row_id} has {actual} cells, table has {expected} columns")]
    RowWidthMismatch {
        row_id: RowId,
        expected: usize,
        actual: usize,
    },
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
