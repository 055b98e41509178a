//! Column specifications.
//!
//! A column spec says how to compute one table column from a transaction.
//! Extractors are plain data ([`ColumnKind`]) interpreted by
//! [`ColumnSpec::extract`], so the catalogue can be inspected, compared and
//! extended without closures.
//!
//! The static catalogue holds one placeholder. Building a
//! [`ColumnRegistry`] replaces it with one column per known tag group, named
//! by prefixing the group with [`TAG_COLUMN_PREFIX`].

use crate::{error::Result, CellValue, Error, IndexedMap, TagValuesCollection, Transaction};
use serde_json::Value;

/// Reserved column holding the primary key.
pub const ID_COLUMN: &str = "TransactionId";

/// Reserved column holding the version of the last sync that wrote the row.
pub const LAST_SYNC_VERSION_COLUMN: &str = "LastSyncVersion";

/// Static spec that expands into the tag group columns.
pub const TAG_COLUMNS_PLACEHOLDER: &str = "<Tag Groups Columns>";

/// Marker prefixed to a tag group name to form its column name.
pub const TAG_COLUMN_PREFIX: &str = "Tags:";

/// Separator between the levels of a joined value.
pub const STRUCTURE_LEVEL_SEPARATOR: &str = " / ";

/// Separator between the items of a tag list.
pub const TAG_LIST_SEPARATOR: &str = ", ";

/// Where a projected value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A top-level transaction field
    Field(&'static str),
    /// A dot path into the payment-processor metadata
    Meta(&'static str),
}

impl Source {
    fn resolve<'a>(&self, tx: &'a Transaction) -> Option<&'a Value> {
        match self {
            Source::Field(name) => tx.field(name),
            Source::Meta(path) => tx.metadata_path(path),
        }
    }
}

/// How a column value is computed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnKind {
    /// The primary key
    Id,
    /// Filled with the current sync version when a row is written
    SyncVersion,
    /// A scalar taken as-is
    Value(Source),
    /// Two values joined as `a / b`, or whichever one is present
    Pair(Source, Source),
    /// A metadata list joined with `" / "`; `depth` keeps only the first levels
    MetaList {
        path: &'static str,
        depth: Option<usize>,
    },
    /// Length of a metadata list
    MetaCount(&'static str),
    /// Personal-finance category as `primary / detail`
    TransactionCategory,
    /// All raw tag names, comma separated
    OriginalTags,
    /// Replaced by the tag group columns when a registry is built
    TagPlaceholder,
    /// Values of one tag group, sorted and comma separated
    TagGroup(String),
}

/// How to compute one named column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    /// Create a spec. The name is trimmed.
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.trim().to_string(),
            kind,
        }
    }

    /// Spec for one tag group column.
    pub fn tag_group(group: &str) -> Self {
        Self::new(&tag_column_name(group), ColumnKind::TagGroup(group.to_string()))
    }

    /// Compute this column's value for a transaction.
    pub fn extract(&self, tx: &Transaction) -> CellValue {
        match &self.kind {
            ColumnKind::Id => CellValue::Number(tx.id as f64),
            ColumnKind::SyncVersion | ColumnKind::TagPlaceholder => CellValue::empty(),
            ColumnKind::Value(source) => source
                .resolve(tx)
                .map(CellValue::from_json)
                .unwrap_or_default(),
            ColumnKind::Pair(a, b) => CellValue::Text(join_pair(
                &a.resolve(tx).map(value_text).unwrap_or_default(),
                &b.resolve(tx).map(value_text).unwrap_or_default(),
            )),
            ColumnKind::MetaList { path, depth } => meta_list(tx, path, *depth),
            ColumnKind::MetaCount(path) => match tx.metadata_path(path) {
                Some(Value::Array(items)) => CellValue::Number(items.len() as f64),
                _ => CellValue::empty(),
            },
            ColumnKind::TransactionCategory => transaction_category(tx),
            ColumnKind::OriginalTags => {
                if tx.has_tag_list() {
                    CellValue::Text(join_list(tx.tag_names(), TAG_LIST_SEPARATOR))
                } else {
                    CellValue::empty()
                }
            }
            ColumnKind::TagGroup(group) => tag_group_value(tx, group),
        }
    }
}

/// Column name for a tag group.
pub fn tag_column_name(group: &str) -> String {
    format!("{TAG_COLUMN_PREFIX}{group}").trim().to_string()
}

/// The tag group a column stands for, if it is a tag group column.
pub fn tag_group_from_column(column: &str) -> Option<&str> {
    column.trim().strip_prefix(TAG_COLUMN_PREFIX)
}

fn tag_group_value(tx: &Transaction, group: &str) -> CellValue {
    CellValue::Text(join_list(tx.tags.values(group), TAG_LIST_SEPARATOR))
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => CellValue::from_json(other).to_string(),
    }
}

fn join_pair(a: &str, b: &str) -> String {
    if !a.is_empty() && !b.is_empty() {
        format!("{a}{STRUCTURE_LEVEL_SEPARATOR}{b}")
    } else {
        format!("{a}{b}")
    }
}

/// Join list items; missing or blank items render as `*`.
fn join_list<'a>(items: impl IntoIterator<Item = &'a str>, separator: &str) -> String {
    items
        .into_iter()
        .map(|item| if item.trim().is_empty() { "*" } else { item })
        .collect::<Vec<_>>()
        .join(separator)
}

fn meta_list(tx: &Transaction, path: &str, depth: Option<usize>) -> CellValue {
    let Some(Value::Array(items)) = tx.metadata_path(path) else {
        return CellValue::empty();
    };
    let count = depth.unwrap_or(items.len());
    let texts: Vec<String> = (0..count)
        .map(|i| match items.get(i) {
            Some(Value::Null) | None => String::new(),
            Some(v) => value_text(v),
        })
        .collect();
    CellValue::Text(join_list(
        texts.iter().map(String::as_str),
        STRUCTURE_LEVEL_SEPARATOR,
    ))
}

fn transaction_category(tx: &Transaction) -> CellValue {
    let text_at = |path: &str| {
        tx.metadata_path(path)
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
    };
    let primary = text_at("personal_finance_category.primary");
    let detailed = text_at("personal_finance_category.detailed");

    let detail = detailed
        .strip_prefix(primary)
        .unwrap_or(detailed)
        .trim_start_matches('_');
    CellValue::Text(join_pair(primary, detail))
}

/// The static column catalogue, in table order.
pub fn static_column_specs() -> Vec<ColumnSpec> {
    use ColumnKind as K;
    use Source::{Field as F, Meta as M};

    let field = |name: &'static str| ColumnSpec::new(name, K::Value(F(name)));
    let meta = |name: &str, path: &'static str| ColumnSpec::new(name, K::Value(M(path)));

    vec![
        ColumnSpec::new(ID_COLUMN, K::Id),
        ColumnSpec::new(LAST_SYNC_VERSION_COLUMN, K::SyncVersion),
        ColumnSpec::new("date", K::Value(F("date"))),
        ColumnSpec::new("Account", K::Pair(F("account_display_name"), M("account_owner"))),
        field("payee"),
        ColumnSpec::new("amount", K::Value(F("to_base"))),
        ColumnSpec::new("Category", K::Pair(F("category_group_name"), F("category_name"))),
        ColumnSpec::new(
            "Plaid:MerchantCategory",
            K::MetaList {
                path: "category",
                depth: None,
            },
        ),
        ColumnSpec::new("Plaid:TransactionCategory", K::TransactionCategory),
        ColumnSpec::new(TAG_COLUMNS_PLACEHOLDER, K::TagPlaceholder),
        field("status"),
        field("recurring_description"),
        field("is_income"),
        field("exclude_from_budget"),
        field("exclude_from_totals"),
        field("has_children"),
        field("is_group"),
        field("is_pending"),
        field("display_notes"),
        field("currency"),
        ColumnSpec::new("to_base", K::Value(F("to_base"))),
        field("category_id"),
        field("category_name"),
        field("category_group_id"),
        field("category_group_name"),
        field("created_at"),
        field("updated_at"),
        field("notes"),
        field("original_name"),
        field("recurring_id"),
        field("recurring_payee"),
        field("recurring_cadence"),
        field("recurring_granularity"),
        field("recurring_quantity"),
        field("recurring_type"),
        field("recurring_amount"),
        field("recurring_currency"),
        field("parent_id"),
        field("group_id"),
        field("asset_id"),
        field("asset_institution_name"),
        field("asset_name"),
        field("asset_display_name"),
        field("asset_status"),
        field("plaid_account_id"),
        field("plaid_account_name"),
        field("plaid_account_mask"),
        field("institution_name"),
        field("plaid_account_display_name"),
        field("plaid_category"),
        field("source"),
        field("display_name"),
        field("account_display_name"),
        ColumnSpec::new("original_tags", K::OriginalTags),
        field("external_id"),
        meta("plaid:account_id", "account_id"),
        meta("plaid:account_owner", "account_owner"),
        meta("plaid:amount", "amount"),
        meta("plaid:authorized_date", "authorized_date"),
        meta("plaid:authorized_datetime", "authorized_datetime"),
        meta("plaid:category,l1", "category.0"),
        ColumnSpec::new(
            "plaid:category,l2",
            K::MetaList {
                path: "category",
                depth: Some(2),
            },
        ),
        ColumnSpec::new(
            "plaid:category,l3",
            K::MetaList {
                path: "category",
                depth: Some(3),
            },
        ),
        meta("plaid:category_id", "category_id"),
        meta("plaid:check_number", "check_number"),
        ColumnSpec::new("plaid:counterparties.count", K::MetaCount("counterparties")),
        meta(
            "plaid:counterparty#01.confidence_level",
            "counterparties.0.confidence_level",
        ),
        meta("plaid:counterparty#01.entity_id", "counterparties.0.entity_id"),
        meta("plaid:counterparty#01.logo_url", "counterparties.0.logo_url"),
        meta("plaid:counterparty#01.name", "counterparties.0.name"),
        meta("plaid:counterparty#01.phone_number", "counterparties.0.phone_number"),
        meta("plaid:counterparty#01.type", "counterparties.0.type"),
        meta("plaid:counterparty#01.website", "counterparties.0.website"),
        meta("plaid:date", "date"),
        meta("plaid:datetime", "datetime"),
        meta("plaid:iso_currency_code", "iso_currency_code"),
        meta("plaid:location.address", "location.address"),
        meta("plaid:location.city", "location.city"),
        meta("plaid:location.country", "location.country"),
        meta("plaid:location.lat", "location.lat"),
        meta("plaid:location.lon", "location.lon"),
        meta("plaid:location.postal_code", "location.postal_code"),
        meta("plaid:location.region", "location.region"),
        meta("plaid:location.store_number", "location.store_number"),
        meta("plaid:logo_url", "logo_url"),
        meta("plaid:merchant_entity_id", "merchant_entity_id"),
        meta("plaid:merchant_name", "merchant_name"),
        meta("plaid:name", "name"),
        meta("plaid:payment_channel", "payment_channel"),
        meta("plaid:payment_meta.by_order_of", "payment_meta.by_order_of"),
        meta("plaid:payment_meta.payee", "payment_meta.payee"),
        meta("plaid:payment_meta.payer", "payment_meta.payer"),
        meta("plaid:payment_meta.payment_method", "payment_meta.payment_method"),
        meta("plaid:payment_meta.payment_processor", "payment_meta.payment_processor"),
        meta("plaid:payment_meta.ppd_id", "payment_meta.ppd_id"),
        meta("plaid:payment_meta.reason", "payment_meta.reason"),
        meta("plaid:payment_meta.reference_number", "payment_meta.reference_number"),
        meta("plaid:pending", "pending"),
        meta("plaid:pending_transaction_id", "pending_transaction_id"),
        meta(
            "plaid:personal_finance_category.confidence_level",
            "personal_finance_category.confidence_level",
        ),
        meta(
            "plaid:personal_finance_category.detailed",
            "personal_finance_category.detailed",
        ),
        meta(
            "plaid:personal_finance_category.primary",
            "personal_finance_category.primary",
        ),
        meta(
            "plaid:personal_finance_category.version",
            "personal_finance_category.version",
        ),
        meta(
            "plaid:personal_finance_category_icon_url",
            "personal_finance_category_icon_url",
        ),
        meta("plaid:transaction_code", "transaction_code"),
        meta("plaid:transaction_id", "transaction_id"),
        meta("plaid:transaction_type", "transaction_type"),
        meta("plaid:unofficial_currency_code", "unofficial_currency_code"),
        meta("plaid:website", "website"),
    ]
}

/// The ordered, uniquely named column specs for one sync pass.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    specs: IndexedMap<String, ColumnSpec>,
    tag_position: usize,
}

impl ColumnRegistry {
    /// Build the registry from the static catalogue and the known tag groups.
    pub fn build(tags: &TagValuesCollection) -> Self {
        Self::from_specs(static_column_specs(), tags)
    }

    /// Build a registry from an explicit catalogue.
    ///
    /// The placeholder is replaced by one spec per tag group, sorted by group
    /// name. A spec whose name is already taken is dropped with a warning.
    pub fn from_specs(catalogue: Vec<ColumnSpec>, tags: &TagValuesCollection) -> Self {
        let mut specs = IndexedMap::with_capacity(catalogue.len() + tags.len());
        let mut tag_position = None;

        for spec in catalogue {
            if spec.kind == ColumnKind::TagPlaceholder {
                if tag_position.is_none() {
                    tag_position = Some(specs.len());
                }
                for group in tags.groups() {
                    add_spec(&mut specs, ColumnSpec::tag_group(group));
                }
            } else {
                add_spec(&mut specs, spec);
            }
        }

        let tag_position = tag_position.unwrap_or(specs.len());
        Self {
            specs,
            tag_position,
        }
    }

    /// Look up a spec by exact name.
    pub fn get(&self, name: &str) -> Option<&ColumnSpec> {
        self.specs.get(name)
    }

    /// Spec at a position.
    pub fn get_index(&self, index: usize) -> Option<&ColumnSpec> {
        self.specs.get_index(index)
    }

    /// Specs in column order.
    pub fn iter(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.specs.iter()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Check if the registry has no columns.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// All column names in order.
    pub fn column_names(&self) -> Vec<String> {
        self.specs.keys().cloned().collect()
    }

    /// Names of the tag group columns, sorted.
    pub fn tag_column_names(&self) -> Vec<&str> {
        self.specs
            .iter()
            .filter(|spec| matches!(spec.kind, ColumnKind::TagGroup(_)))
            .map(|spec| spec.name.as_str())
            .collect()
    }

    /// Column index where the tag group columns go when a table has none.
    pub fn tag_columns_position(&self) -> usize {
        self.tag_position
    }

    /// Compute the value of a named column for a transaction.
    ///
    /// Store column names are matched trimmed, the same way headers are
    /// validated. Tag group columns the registry does not know about are still
    /// computed from the record's own tags. Any other unknown name is a schema
    /// error.
    pub fn column_value(&self, tx: &Transaction, column: &str) -> Result<CellValue> {
        if let Some(spec) = self.specs.get(column.trim()) {
            return Ok(spec.extract(tx));
        }
        match tag_group_from_column(column) {
            Some(group) => Ok(tag_group_value(tx, group)),
            None => Err(Error::UnknownColumn(column.to_string())),
        }
    }
}

fn add_spec(specs: &mut IndexedMap<String, ColumnSpec>, spec: ColumnSpec) {
    let name = spec.name.clone();
    if !specs.try_add(name.clone(), spec) {
        tracing::warn!(column = %name, "dropping column spec with duplicate name");
    }
}
