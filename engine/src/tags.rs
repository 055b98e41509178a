//! Tag taxonomy.
//!
//! Flat tag names such as `"Trip:Paris"` are split at the first group
//! separator into a group (`"Trip"`) and a value (`"Paris"`). Tags without
//! a separator belong to the reserved ungrouped group.

use crate::{CellValue, IndexedMap, RecordId, TableContents, Transaction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Separator between a tag's group and its value.
pub const TAG_GROUP_SEPARATOR: char = ':';

/// Group name used for tags without a separator.
///
/// Starts with the separator, so it can never collide with a parsed group.
pub const UNGROUPED_TAG_MONIKER: &str = ":Ungrouped";

/// A parsed tag name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagInfo {
    pub group: String,
    pub value: String,
    pub is_group: bool,
    /// The raw tag name, trimmed
    pub name: String,
}

/// Parse a raw tag name.
///
/// The name is trimmed, then split at the first separator. The group and the
/// value are trimmed again on their own, so `"Trip :Paris"` and `"Trip:Paris"`
/// land in the same group.
pub fn parse_tag(raw: &str) -> TagInfo {
    let name = raw.trim();
    match name.find(TAG_GROUP_SEPARATOR) {
        None => TagInfo {
            group: UNGROUPED_TAG_MONIKER.to_string(),
            value: name.to_string(),
            is_group: false,
            name: name.to_string(),
        },
        Some(sep) => TagInfo {
            group: name[..sep].trim().to_string(),
            value: name[sep + TAG_GROUP_SEPARATOR.len_utf8()..].trim().to_string(),
            is_group: true,
            name: name.to_string(),
        },
    }
}

/// Mapping from tag group to the distinct values seen for it.
///
/// Backed by ordered collections, so groups and values always come out
/// sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValuesCollection(BTreeMap<String, BTreeSet<String>>);

impl TagValuesCollection {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tag's value under its group.
    pub fn add(&mut self, tag: &TagInfo) {
        self.0
            .entry(tag.group.clone())
            .or_default()
            .insert(tag.value.clone());
    }

    /// Add every group/value of another collection.
    pub fn merge(&mut self, other: &TagValuesCollection) {
        for (group, values) in &other.0 {
            self.0
                .entry(group.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    /// Group names, sorted.
    pub fn groups(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    /// Values of one group, sorted. Empty if the group is unknown.
    pub fn values(&self, group: &str) -> Vec<&str> {
        self.0
            .get(group)
            .map(|values| values.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check if a group is present.
    pub fn has_group(&self, group: &str) -> bool {
        self.0.contains_key(group)
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if there are no groups.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a TagInfo> for TagValuesCollection {
    fn from_iter<I: IntoIterator<Item = &'a TagInfo>>(iter: I) -> Self {
        let mut collection = Self::new();
        for tag in iter {
            collection.add(tag);
        }
        collection
    }
}

/// A tag from the remote tag vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

/// Build the assignable taxonomy for a pass.
///
/// This is the union of the full vocabulary and every tag seen on a received
/// transaction, so a group that only appears on records still gets a column.
pub fn assignable_tags(
    vocabulary: &[Tag],
    received: &IndexedMap<RecordId, Transaction>,
) -> TagValuesCollection {
    let mut assignable = TagValuesCollection::new();
    for tag in vocabulary {
        assignable.add(&parse_tag(&tag.name));
    }
    for transaction in received {
        assignable.merge(&transaction.tags);
    }
    assignable
}

/// Header of the tag vocabulary table.
pub const TAG_TABLE_COLUMNS: [&str; 6] = ["id", "name", "group", "value", "description", "archived"];

/// Render the vocabulary as table contents, sorted by tag name.
pub fn tag_table(vocabulary: &[Tag]) -> TableContents {
    let mut tags: Vec<&Tag> = vocabulary.iter().collect();
    tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    let rows = tags
        .into_iter()
        .map(|tag| {
            let info = parse_tag(&tag.name);
            vec![
                CellValue::Number(tag.id as f64),
                CellValue::text(info.name),
                CellValue::text(info.group),
                CellValue::text(info.value),
                CellValue::text(tag.description.clone().unwrap_or_default()),
                CellValue::Bool(tag.archived),
            ]
        })
        .collect();

    TableContents::new(TAG_TABLE_COLUMNS.iter().map(|c| c.to_string()).collect(), rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_grouped_tag() {
        let info = parse_tag("A:B");
        assert_eq!(info.group, "A");
        assert_eq!(info.value, "B");
        assert!(info.is_group);
        assert_eq!(info.name, "A:B");
    }

    #[test]
    fn parse_ungrouped_tag() {
        let info = parse_tag("  vacation ");
        assert_eq!(info.group, UNGROUPED_TAG_MONIKER);
        assert_eq!(info.value, "vacation");
        assert!(!info.is_group);
        assert_eq!(info.name, "vacation");
    }

    #[test]
    fn parse_splits_at_first_separator_only() {
        let info = parse_tag("Trip:Paris:2024");
        assert_eq!(info.group, "Trip");
        assert_eq!(info.value, "Paris:2024");
    }

    #[test]
    fn parse_trims_group_and_value() {
        let info = parse_tag(" Trip : Paris ");
        assert_eq!(info.name, "Trip : Paris");
        assert_eq!(info.group, "Trip");
        assert_eq!(info.value, "Paris");
    }

    #[test]
    fn padded_group_merges_with_plain_group() {
        let tags: TagValuesCollection = [parse_tag("Trip:Rome"), parse_tag("Trip :Paris")]
            .iter()
            .collect();
        assert_eq!(tags.groups(), vec!["Trip"]);
        assert_eq!(tags.values("Trip"), vec!["Paris", "Rome"]);
    }

    #[test]
    fn collection_sorts_groups_and_values() {
        let mut tags = TagValuesCollection::new();
        for raw in ["Trip:Rome", "Who:Bob", "Trip:Paris", "Trip:Rome", "solo"] {
            tags.add(&parse_tag(raw));
        }

        assert_eq!(tags.groups(), vec![UNGROUPED_TAG_MONIKER, "Trip", "Who"]);
        assert_eq!(tags.values("Trip"), vec!["Paris", "Rome"]);
        assert_eq!(tags.values("Nope"), Vec::<&str>::new());
        assert!(tags.has_group("Who"));
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn merge_unions_values() {
        let mut a: TagValuesCollection = [parse_tag("Trip:Paris")].iter().collect();
        let b: TagValuesCollection = [parse_tag("Trip:Oslo"), parse_tag("Who:Ann")]
            .iter()
            .collect();
        a.merge(&b);
        assert_eq!(a.values("Trip"), vec!["Oslo", "Paris"]);
        assert_eq!(a.groups(), vec!["Trip", "Who"]);
    }

    #[test]
    fn tag_table_sorted_by_name() {
        let vocabulary = vec![
            Tag {
                id: 2,
                name: "Who:Bob".into(),
                description: None,
                archived: false,
            },
            Tag {
                id: 1,
                name: "Trip:Paris".into(),
                description: Some("spring".into()),
                archived: true,
            },
        ];

        let table = tag_table(&vocabulary);
        assert_eq!(table.columns.len(), TAG_TABLE_COLUMNS.len());
        assert_eq!(table.rows[0][1], CellValue::text("Trip:Paris"));
        assert_eq!(table.rows[0][2], CellValue::text("Trip"));
        assert_eq!(table.rows[0][5], CellValue::Bool(true));
        assert_eq!(table.rows[1][0], CellValue::Number(2.0));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_no_separator_is_ungrouped(s in "[^:]{0,24}") {
                let info = parse_tag(&s);
                prop_assert_eq!(info.group, UNGROUPED_TAG_MONIKER);
                prop_assert_eq!(info.value, s.trim());
                prop_assert!(!info.is_group);
            }

            #[test]
            fn prop_grouped_parts_are_trimmed(g in "[^:]{0,12}", v in "[ -~]{0,12}") {
                let raw = format!("{g}:{v}");
                let info = parse_tag(&raw);
                prop_assert!(info.is_group);
                prop_assert_eq!(info.group, g.trim());
                prop_assert_eq!(info.value, v.trim());
                prop_assert_eq!(info.name, raw.trim());
            }
        }
    }
}
