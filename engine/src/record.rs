//! Remote transaction records.
//!
//! Records are created fresh from every fetch and never persisted as objects;
//! only their projected column values end up in the table.

use crate::{error::Result, parse_tag, Error, IndexedMap, RecordId, TagValuesCollection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the field holding the payment-processor metadata as a JSON string.
pub const METADATA_FIELD: &str = "plaid_metadata";

/// One page of the remote transaction listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<Value>,
    /// Set when the remote holds more records than it returned
    #[serde(default)]
    pub has_more: bool,
}

/// A remote financial transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Primary key
    pub id: RecordId,
    /// Raw scalar fields as received
    pub fields: Map<String, Value>,
    /// Parsed payment-processor metadata, when the record carries any
    pub metadata: Option<Value>,
    /// Tag values on this record, by group
    pub tags: TagValuesCollection,
}

impl Transaction {
    /// Build a transaction from one element of the fetched array.
    ///
    /// `index` is the element's position, used in error messages.
    pub fn from_json(index: usize, raw: Value) -> Result<Self> {
        let Value::Object(fields) = raw else {
            return Err(Error::MalformedPayload(format!(
                "fetched transaction #{index} is not an object"
            )));
        };

        let id = fields
            .get("id")
            .and_then(integer_id)
            .ok_or_else(|| Error::InvalidRecordId {
                index,
                value: fields
                    .get("id")
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "undefined".to_string()),
            })?;

        let metadata = match fields.get(METADATA_FIELD) {
            Some(Value::String(text)) => {
                Some(serde_json::from_str::<Value>(text).map_err(|e| {
                    Error::MalformedPayload(format!(
                        "cannot parse {METADATA_FIELD} for fetched transaction #{index} (id={id}): {e}"
                    ))
                })?)
            }
            Some(Value::Object(obj)) => Some(Value::Object(obj.clone())),
            _ => None,
        };

        let mut tags = TagValuesCollection::new();
        if let Some(Value::Array(list)) = fields.get("tags") {
            for tag in list {
                if let Some(name) = tag.get("name").and_then(Value::as_str) {
                    tags.add(&parse_tag(name));
                }
            }
        }

        Ok(Self {
            id,
            fields,
            metadata,
            tags,
        })
    }

    /// A non-null field value.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }

    /// A non-null value inside the metadata, addressed by a dot path.
    ///
    /// Numeric segments index into arrays, e.g. `counterparties.0.name`.
    pub fn metadata_path(&self, path: &str) -> Option<&Value> {
        let mut current = self.metadata.as_ref()?;
        for segment in path.split('.') {
            current = match current {
                Value::Object(obj) => obj.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        (!current.is_null()).then_some(current)
    }

    /// Raw names of the tags on this record, in received order.
    pub fn tag_names(&self) -> Vec<&str> {
        match self.fields.get("tags") {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(|t| t.get("name").and_then(Value::as_str))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// True if the remote reported a tags list (possibly empty).
    pub fn has_tag_list(&self) -> bool {
        matches!(self.fields.get("tags"), Some(Value::Array(_)))
    }
}

fn integer_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as RecordId)
        }),
        _ => None,
    }
}

/// Parse a fetched page into transactions keyed by id, in received order.
///
/// Returns the index and the number of duplicate ids that were dropped.
pub fn index_transactions(
    page: Vec<Value>,
) -> Result<(IndexedMap<RecordId, Transaction>, usize)> {
    let mut received = IndexedMap::with_capacity(page.len());
    let mut duplicates = 0;
    let mut with_metadata = 0;

    for (index, raw) in page.into_iter().enumerate() {
        let transaction = Transaction::from_json(index, raw)?;
        if transaction.metadata.is_some() {
            with_metadata += 1;
        }
        let id = transaction.id;
        if !received.try_add(id, transaction) {
            duplicates += 1;
            tracing::warn!(id, index, "dropping fetched transaction with duplicate id");
        }
    }

    tracing::debug!(
        received = received.len(),
        with_metadata,
        duplicates,
        "parsed fetched transactions"
    );
    Ok((received, duplicates))
}
