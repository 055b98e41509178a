//! Category tree flattening.
//!
//! The remote returns categories as a flat list whose `group_id` links
//! point at parent categories. Each category is labelled by walking those
//! links to the root and joining the names with `/`.

use crate::{error::Result, CellValue, Error, IndexedMap, RecordId, TableContents};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Separator between the levels of a category label.
pub const CATEGORY_LEVEL_SEPARATOR: char = '/';

/// A category as returned by the remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_income: bool,
    #[serde(default)]
    pub exclude_from_budget: bool,
    #[serde(default)]
    pub exclude_from_totals: bool,
    pub updated_at: String,
    pub created_at: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_id: Option<RecordId>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub archived_on: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

/// Body of the remote category listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryList {
    pub categories: Vec<Category>,
}

/// A category with its hierarchical label resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatCategory {
    pub label: String,
    pub description: String,
    pub is_group: bool,
    pub is_income: bool,
    pub exclude_from_budget: bool,
    pub exclude_from_totals: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub archived_on: Option<DateTime<Utc>>,
    pub label_l1: String,
    pub label_l2: String,
    pub id: RecordId,
    pub display_order: i64,
    pub name: String,
}

/// Flatten the category list, sorted by display order.
pub fn flatten_categories(list: &[Category]) -> Result<Vec<FlatCategory>> {
    let mut by_id = IndexedMap::with_capacity(list.len());
    for category in list {
        if !by_id.try_add(category.id, category) {
            tracing::warn!(id = category.id, "dropping category with duplicate id");
        }
    }

    let mut flat = by_id
        .iter()
        .map(|category| {
            let label = category_label(category, &by_id)?;
            Ok(FlatCategory {
                label_l1: level_label(&label, 1).to_string(),
                label_l2: level_label(&label, 2).to_string(),
                label,
                description: category.description.clone().unwrap_or_default(),
                is_group: category.is_group,
                is_income: category.is_income,
                exclude_from_budget: category.exclude_from_budget,
                exclude_from_totals: category.exclude_from_totals,
                archived: category.archived,
                created_at: parse_timestamp(&category.created_at)?,
                updated_at: parse_timestamp(&category.updated_at)?,
                archived_on: category
                    .archived_on
                    .as_deref()
                    .map(parse_timestamp)
                    .transpose()?,
                id: category.id,
                display_order: category.order.unwrap_or_default(),
                name: category.name.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    flat.sort_by_key(|c| c.display_order);
    Ok(flat)
}

fn category_label(category: &Category, by_id: &IndexedMap<RecordId, &Category>) -> Result<String> {
    let mut label = category.name.trim().to_string();
    let mut seen = HashSet::from([category.id]);
    let mut parent = category.group_id.and_then(|id| by_id.get(&id));

    while let Some(p) = parent {
        if !seen.insert(p.id) {
            return Err(Error::CategoryCycle(category.id));
        }
        label = format!("{}{CATEGORY_LEVEL_SEPARATOR}{label}", p.name.trim());
        parent = p.group_id.and_then(|id| by_id.get(&id));
    }
    Ok(label)
}

/// The first `level` levels of a label. Labels with fewer levels are
/// returned whole.
pub fn level_label(label: &str, level: usize) -> &str {
    let label = label.trim();
    label
        .match_indices(CATEGORY_LEVEL_SEPARATOR)
        .nth(level.saturating_sub(1))
        .map_or(label, |(at, _)| &label[..at])
}

/// Parse a remote timestamp into UTC.
///
/// Accepts RFC 3339, a naive date-time (taken as UTC) or a plain date.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| Error::InvalidTimestamp(text.to_string()))
}

/// Render a UTC time the way the category table shows it.
pub fn format_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M").to_string()
}

/// Header of the category table.
pub const CATEGORY_TABLE_COLUMNS: [&str; 15] = [
    "label",
    "description",
    "isGroup",
    "isIncome",
    "excludeFromBudget",
    "excludeFromTotals",
    "archived",
    "createdAtUtc",
    "updatedAtUtc",
    "archivedOnUtc",
    "labelL1",
    "labelL2",
    "id",
    "displayOrder",
    "name",
];

/// Render flattened categories as table contents.
pub fn category_table(categories: &[FlatCategory]) -> TableContents {
    let rows = categories
        .iter()
        .map(|c| {
            vec![
                CellValue::text(&c.label),
                CellValue::text(&c.description),
                CellValue::Bool(c.is_group),
                CellValue::Bool(c.is_income),
                CellValue::Bool(c.exclude_from_budget),
                CellValue::Bool(c.exclude_from_totals),
                CellValue::Bool(c.archived),
                CellValue::text(format_utc(&c.created_at)),
                CellValue::text(format_utc(&c.updated_at)),
                CellValue::text(c.archived_on.as_ref().map(format_utc).unwrap_or_default()),
                CellValue::text(&c.label_l1),
                CellValue::text(&c.label_l2),
                CellValue::Number(c.id as f64),
                CellValue::Number(c.display_order as f64),
                CellValue::text(&c.name),
            ]
        })
        .collect();

    TableContents::new(
        CATEGORY_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        rows,
    )
}
