//! Async sync pass driver.
//!
//! One pass fetches the tag vocabulary, the category tree and a page of
//! transactions, rewrites the `Tags` and `Categories` tables, then runs the
//! engine's schema and record steps against the transactions table. Each
//! step plans against the snapshot committed by the step before.

use crate::error::{AppError, Result};
use crate::remote::{RecordSource, TransactionQuery};
use crate::store::TableBackend;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tabsync_engine::{
    category_table, error_marker_batch, flatten_categories, tag_table, PassSummary, SyncPass,
};
use tracing::{debug, error, info, warn};

/// Name of the table holding the tag vocabulary.
pub const TAGS_TABLE: &str = "Tags";

/// Name of the table holding the flattened categories.
pub const CATEGORIES_TABLE: &str = "Categories";

/// Body of `POST /sync`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default)]
    pub replace_existing: bool,
    /// Overrides the configured remote token
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Validated parameters of one pass.
#[derive(Debug, Clone)]
pub struct SyncParams {
    pub token: String,
    pub query: TransactionQuery,
    pub replace_existing: bool,
}

impl SyncParams {
    /// Resolve the token and check the date range. Nothing is fetched when
    /// this fails.
    pub fn resolve(request: SyncRequest, default_token: Option<&str>) -> Result<Self> {
        let token = request
            .api_token
            .as_deref()
            .or(default_token)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::BadRequest("cannot sync, because no API token is set".to_string())
            })?
            .to_string();

        if request.end < request.start {
            return Err(AppError::BadRequest(format!(
                "end date {} is before start date {}",
                request.end, request.start
            )));
        }

        Ok(Self {
            token,
            query: TransactionQuery::new(request.start, request.end),
            replace_existing: request.replace_existing,
        })
    }
}

/// Result of a completed pass.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub table: String,
    #[serde(flatten)]
    pub pass: PassSummary,
    pub tags: usize,
    pub categories: usize,
    /// The remote holds more transactions than this pass fetched
    pub has_more: bool,
}

/// Run one pass into `table`.
///
/// Any failure is written into the table's error marker before the error is
/// returned; batches committed before the failure stay applied.
pub async fn run_sync(
    backend: &TableBackend,
    source: &dyn RecordSource,
    table: &str,
    params: &SyncParams,
) -> Result<SyncReport> {
    let started = Instant::now();
    backend.ensure_table(table).await?;

    let result = sync_steps(backend, source, table, params).await;
    match &result {
        Ok(report) => info!(
            table,
            version = report.pass.version,
            inserted = report.pass.counts.inserted,
            updated = report.pass.counts.updated,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync pass completed"
        ),
        Err(err) => {
            error!(table, error = %err, "sync pass failed");
            if let Err(marker_err) = backend.commit(table, error_marker_batch(err)).await {
                warn!(table, error = %marker_err, "could not record error marker");
            }
        }
    }
    result
}

async fn sync_steps(
    backend: &TableBackend,
    source: &dyn RecordSource,
    table: &str,
    params: &SyncParams,
) -> Result<SyncReport> {
    let step = Instant::now();
    let tags = source.fetch_tags(&params.token).await?;
    backend.replace_contents(TAGS_TABLE, tag_table(&tags)).await?;
    debug!(tags = tags.len(), elapsed_ms = step.elapsed().as_millis() as u64, "tags synced");

    let step = Instant::now();
    let categories = flatten_categories(&source.fetch_categories(&params.token).await?)?;
    backend
        .replace_contents(CATEGORIES_TABLE, category_table(&categories))
        .await?;
    debug!(
        categories = categories.len(),
        elapsed_ms = step.elapsed().as_millis() as u64,
        "categories synced"
    );

    let step = Instant::now();
    let page = source
        .fetch_transactions(&params.token, &params.query)
        .await?;
    debug!(
        transactions = page.transactions.len(),
        has_more = page.has_more,
        elapsed_ms = step.elapsed().as_millis() as u64,
        "transactions fetched"
    );
    if page.has_more {
        warn!(
            offset = params.query.offset,
            "remote holds more transactions than one page; only the first page is synced"
        );
    }

    let pass = SyncPass::new(page.transactions, &tags, params.replace_existing, Utc::now())?;

    let before = backend.snapshot(table).await?;
    let schema = pass.plan_schema(&before);
    backend.commit(table, schema.batch).await?;

    let aligned = backend.snapshot(table).await?;
    let plan = pass.plan_records(&aligned)?;
    let summary = PassSummary::new(&pass, schema.columns_added, schema.blank_rows_removed, &plan);
    backend.commit(table, plan.batch).await?;

    Ok(SyncReport {
        table: table.to_string(),
        pass: summary,
        tags: tags.len(),
        categories: categories.len(),
        has_more: page.has_more,
    })
}
