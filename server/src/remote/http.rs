//! REST client for the remote transaction API.

use super::{RecordSource, RemoteError, TransactionQuery};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tabsync_engine::{Category, CategoryList, Tag, TransactionPage};
use tracing::{debug, error};

/// Fetches records over HTTP with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: Client,
    base_url: String,
}

impl HttpRecordSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
        purpose: &str,
    ) -> Result<T, RemoteError> {
        let url = format!("{}/{path}", self.base_url);
        debug!(%url, purpose, "fetching from remote");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("response text not available ({e})"));
            error!(status = status.as_u16(), purpose, %body, "remote request failed");
            return Err(RemoteError::BadStatus {
                status: status.as_u16(),
                purpose: purpose.to_string(),
                body,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|source| RemoteError::Decode {
            purpose: purpose.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_transactions(
        &self,
        token: &str,
        query: &TransactionQuery,
    ) -> Result<TransactionPage, RemoteError> {
        let start = query.start.format("%Y-%m-%d").to_string();
        let end = query.end.format("%Y-%m-%d").to_string();
        let purpose = format!("get all transactions between {start} and {end} UTC");

        let mut params = vec![("start_date", start), ("end_date", end)];
        if query.offset > 0 {
            params.push(("offset", query.offset.to_string()));
        }
        self.get(token, "transactions", &params, &purpose).await
    }

    async fn fetch_tags(&self, token: &str) -> Result<Vec<Tag>, RemoteError> {
        self.get(token, "tags", &[], "get all tags").await
    }

    async fn fetch_categories(&self, token: &str) -> Result<Vec<Category>, RemoteError> {
        let list: CategoryList = self
            .get(
                token,
                "categories",
                &[("format", "flattened".to_string())],
                "get all categories",
            )
            .await?;
        Ok(list.categories)
    }
}
