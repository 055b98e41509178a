//! Async table storage shared by the sync driver and the HTTP handlers.
//!
//! Both backends apply batches through the engine's [`MemoryTable`], so the
//! staging and formula rules are the same whichever one is configured.

use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tabsync_engine::{
    MemoryTable, TableContents, TableSnapshot, TableStore, WriteBatch, WriteOp,
};
use tokio::sync::Mutex;

/// Where synced tables live.
#[derive(Clone)]
pub enum TableBackend {
    Postgres(Pool),
    Memory(Arc<Mutex<HashMap<String, MemoryTable>>>),
}

impl TableBackend {
    /// A fresh in-memory backend with no tables.
    pub fn memory() -> Self {
        TableBackend::Memory(Arc::new(Mutex::new(HashMap::new())))
    }

    /// Create an empty table unless it exists.
    pub async fn ensure_table(&self, name: &str) -> Result<()> {
        match self {
            TableBackend::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                db::ensure_table(&mut conn, name).await?;
            }
            TableBackend::Memory(tables) => {
                tables
                    .lock()
                    .await
                    .entry(name.to_string())
                    .or_insert_with(|| MemoryTable::new(name, Vec::new()));
            }
        }
        Ok(())
    }

    /// The last committed state of a table.
    pub async fn snapshot(&self, name: &str) -> Result<TableSnapshot> {
        match self {
            TableBackend::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                let parts = db::load_table(&mut conn, name, false)
                    .await?
                    .ok_or_else(|| missing(name))?;
                Ok(MemoryTable::from_parts(parts).snapshot()?)
            }
            TableBackend::Memory(tables) => {
                let tables = tables.lock().await;
                let table = tables.get(name).ok_or_else(|| missing(name))?;
                Ok(table.snapshot()?)
            }
        }
    }

    /// Apply a batch atomically.
    ///
    /// With PostgreSQL the table row is locked for the whole load, apply and
    /// save, so concurrent commits to one table serialize.
    pub async fn commit(&self, name: &str, batch: WriteBatch) -> Result<()> {
        let ops = batch.len();
        match self {
            TableBackend::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                let before = db::load_table(&mut tx, name, true)
                    .await?
                    .ok_or_else(|| missing(name))?;
                let mut table = MemoryTable::from_parts(before.clone());
                table.commit(batch)?;
                db::save_table(&mut tx, &before, table.parts()).await?;
                tx.commit().await?;
            }
            TableBackend::Memory(tables) => {
                let mut tables = tables.lock().await;
                let table = tables.get_mut(name).ok_or_else(|| missing(name))?;
                table.commit(batch)?;
            }
        }
        tracing::debug!(table = name, ops, "committed batch");
        Ok(())
    }

    /// Replace a table's header and rows, creating the table if needed.
    pub async fn replace_contents(&self, name: &str, contents: TableContents) -> Result<()> {
        self.ensure_table(name).await?;
        self.commit(
            name,
            WriteBatch::from(vec![
                WriteOp::SetErrorMarker { message: None },
                WriteOp::ReplaceContents { contents },
            ]),
        )
        .await
    }
}

fn missing(name: &str) -> AppError {
    AppError::NotFound(format!("table '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabsync_engine::CellValue;

    #[tokio::test]
    async fn memory_backend_round_trip() {
        let backend = TableBackend::memory();
        assert!(matches!(
            backend.snapshot("Tags").await,
            Err(AppError::NotFound(_))
        ));

        backend
            .replace_contents(
                "Tags",
                TableContents::new(
                    vec!["id".into(), "name".into()],
                    vec![vec![CellValue::Number(1.0), CellValue::text("Trip:Paris")]],
                ),
            )
            .await
            .unwrap();

        let snapshot = backend.snapshot("Tags").await.unwrap();
        assert_eq!(snapshot.columns, vec!["id", "name"]);
        assert_eq!(snapshot.rows.len(), 1);
    }

    #[tokio::test]
    async fn ensure_table_keeps_existing_contents() {
        let backend = TableBackend::memory();
        backend
            .replace_contents("T", TableContents::new(vec!["a".into()], Vec::new()))
            .await
            .unwrap();
        backend.ensure_table("T").await.unwrap();
        assert_eq!(backend.snapshot("T").await.unwrap().columns, vec!["a"]);
    }

    #[tokio::test]
    async fn failed_batch_leaves_table_unchanged() {
        let backend = TableBackend::memory();
        backend
            .replace_contents("T", TableContents::new(vec!["a".into()], Vec::new()))
            .await
            .unwrap();

        let err = backend
            .commit(
                "T",
                WriteBatch::from(vec![
                    WriteOp::SetErrorMarker {
                        message: Some("x".into()),
                    },
                    WriteOp::DeleteRows { row_ids: vec![99] },
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Engine(_)));
        assert_eq!(backend.snapshot("T").await.unwrap().error_marker, None);
    }
}
