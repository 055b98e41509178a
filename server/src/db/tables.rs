//! Database operations for synced tables.
//!
//! A table is stored as one `sheet_tables` row holding the header and
//! metadata plus one `sheet_rows` row per table row. Loading rebuilds the
//! engine's [`TableParts`]; saving writes back only what changed.

use sqlx::types::Json;
use sqlx::{PgConnection, Row};
use std::collections::{HashMap, HashSet};
use tabsync_engine::{StoredCell, StoredRow, SyncInfo, SyncStamp, TableParts};

struct TableHeader {
    columns: Vec<String>,
    error_marker: Option<String>,
    last_sync: Option<SyncInfo>,
    next_row_id: u64,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for TableHeader {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let Json(columns): Json<Vec<String>> = row.try_get("columns")?;
        let sync_version: Option<i64> = row.try_get("sync_version")?;
        let sync_utc: Option<chrono::DateTime<chrono::Utc>> = row.try_get("sync_utc")?;
        let row_count: Option<i64> = row.try_get("row_count")?;
        let next_row_id: i64 = row.try_get("next_row_id")?;

        let last_sync = match (sync_version, sync_utc) {
            (Some(version), Some(utc)) => Some(SyncInfo {
                stamp: SyncStamp::new(version as u64, utc),
                row_count: row_count.unwrap_or_default() as usize,
            }),
            _ => None,
        };

        Ok(TableHeader {
            columns,
            error_marker: row.try_get("error_marker")?,
            last_sync,
            next_row_id: next_row_id as u64,
        })
    }
}

/// Create an empty table unless one with this name exists.
pub async fn ensure_table(conn: &mut PgConnection, name: &str) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO sheet_tables (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(conn)
        .await?;
    Ok(())
}

/// Load a table, optionally locking it for the rest of the transaction.
pub async fn load_table(
    conn: &mut PgConnection,
    name: &str,
    for_update: bool,
) -> Result<Option<TableParts>, sqlx::Error> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let sql = format!(
        r#"
        SELECT columns, error_marker, sync_version, sync_utc, row_count, next_row_id
        FROM sheet_tables
        WHERE name = $1{lock}
        "#
    );
    let header = sqlx::query_as::<_, TableHeader>(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(header) = header else {
        return Ok(None);
    };

    let rows = sqlx::query(
        r#"
        SELECT row_id, cells
        FROM sheet_rows
        WHERE table_name = $1
        ORDER BY position
        "#,
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|row| {
        let id: i64 = row.try_get("row_id")?;
        let Json(cells): Json<Vec<StoredCell>> = row.try_get("cells")?;
        Ok(StoredRow {
            id: id as u64,
            cells,
        })
    })
    .collect::<Result<Vec<_>, sqlx::Error>>()?;

    Ok(Some(TableParts {
        name: name.to_string(),
        columns: header.columns,
        rows,
        error_marker: header.error_marker,
        last_sync: header.last_sync,
        next_row_id: header.next_row_id,
    }))
}

/// Write `after` over `before`, touching only changed rows.
pub async fn save_table(
    conn: &mut PgConnection,
    before: &TableParts,
    after: &TableParts,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE sheet_tables SET
            columns = $2,
            error_marker = $3,
            sync_version = $4,
            sync_utc = $5,
            row_count = $6,
            next_row_id = $7,
            updated_at = now()
        WHERE name = $1
        "#,
    )
    .bind(&after.name)
    .bind(Json(&after.columns))
    .bind(&after.error_marker)
    .bind(after.last_sync.map(|info| info.stamp.version as i64))
    .bind(after.last_sync.map(|info| info.stamp.utc))
    .bind(after.last_sync.map(|info| info.row_count as i64))
    .bind(after.next_row_id as i64)
    .execute(&mut *conn)
    .await?;

    let previous: HashMap<u64, (usize, &Vec<StoredCell>)> = before
        .rows
        .iter()
        .enumerate()
        .map(|(position, row)| (row.id, (position, &row.cells)))
        .collect();
    let kept: HashSet<u64> = after.rows.iter().map(|row| row.id).collect();

    let removed: Vec<i64> = before
        .rows
        .iter()
        .filter(|row| !kept.contains(&row.id))
        .map(|row| row.id as i64)
        .collect();
    if !removed.is_empty() {
        sqlx::query("DELETE FROM sheet_rows WHERE table_name = $1 AND row_id = ANY($2)")
            .bind(&after.name)
            .bind(&removed)
            .execute(&mut *conn)
            .await?;
    }

    let mut written = 0usize;
    for (position, row) in after.rows.iter().enumerate() {
        if previous.get(&row.id) == Some(&(position, &row.cells)) {
            continue;
        }
        sqlx::query(
            r#"
            INSERT INTO sheet_rows (table_name, row_id, position, cells)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (table_name, row_id) DO UPDATE SET
                position = EXCLUDED.position,
                cells = EXCLUDED.cells
            "#,
        )
        .bind(&after.name)
        .bind(row.id as i64)
        .bind(position as i64)
        .bind(Json(&row.cells))
        .execute(&mut *conn)
        .await?;
        written += 1;
    }

    tracing::debug!(
        table = %after.name,
        removed = removed.len(),
        written,
        "saved table"
    );
    Ok(())
}
