//! Remote record source.
//!
//! The sync driver reads transactions, the tag vocabulary and the category
//! tree through [`RecordSource`]. [`HttpRecordSource`] talks to the REST
//! API; tests plug in fixtures.

mod http;

pub use http::HttpRecordSource;

use async_trait::async_trait;
use chrono::NaiveDate;
use tabsync_engine::{Category, Tag, TransactionPage};

/// Date range and paging position of a transaction fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Records to skip; only the first page is fetched today
    pub offset: usize,
}

impl TransactionQuery {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            offset: 0,
        }
    }
}

/// Errors from the remote source.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bad response ({status}) during '{purpose}': {body}")]
    BadStatus {
        status: u16,
        purpose: String,
        body: String,
    },

    #[error("cannot parse response of '{purpose}': {source}")]
    Decode {
        purpose: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where fetched records come from.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch one page of transactions in the query's date range.
    async fn fetch_transactions(
        &self,
        token: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, RemoteError>;

    /// Fetch the full tag vocabulary.
    async fn fetch_tags(&self, token: &str) -> Result<Vec<Tag>, RemoteError>;

    /// Fetch every category, flattened.
    async fn fetch_categories(&self, token: &str) -> Result<Vec<Category>, RemoteError>;
}
