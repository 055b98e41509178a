//! Schema reconciliation.
//!
//! Keeps a table's header in line with the column registry. Tag group
//! columns form a dynamic region whose membership may change between passes;
//! everything else is the static skeleton, which must match the registry
//! exactly.

use crate::{
    columns::{tag_group_from_column, TAG_COLUMNS_PLACEHOLDER},
    error::Result,
    ColumnRegistry, Error, TableSnapshot, WriteOp, ID_COLUMN, LAST_SYNC_VERSION_COLUMN,
};

/// Check if an expected column belongs to the dynamic tag region.
///
/// The placeholder only stands for the region in a registry's column list.
/// A store column carrying the placeholder's name is an ordinary static
/// column, so use [`tag_group_from_column`] for store headers.
pub fn is_tag_region_column(name: &str) -> bool {
    name.trim() == TAG_COLUMNS_PLACEHOLDER || tag_group_from_column(name).is_some()
}

/// Plan the column inserts that add missing tag group columns to a table.
///
/// Missing columns go where the first existing tag column is, or at the
/// registry's tag position if the table has none yet. They are inserted one
/// at a time at that same index in descending name order, so they end up
/// ascending.
pub fn plan_missing_tag_columns(registry: &ColumnRegistry, actual: &[String]) -> Vec<WriteOp> {
    let mut missing: Vec<&str> = registry
        .tag_column_names()
        .into_iter()
        .filter(|name| !actual.iter().any(|a| a.trim() == *name))
        .collect();
    if missing.is_empty() {
        return Vec::new();
    }

    let index = actual
        .iter()
        .position(|a| tag_group_from_column(a).is_some())
        .unwrap_or_else(|| registry.tag_columns_position().min(actual.len()));

    missing.sort_unstable_by(|a, b| b.cmp(a));
    tracing::debug!(?missing, index, "inserting tag group columns");

    missing
        .into_iter()
        .map(|name| WriteOp::InsertColumn {
            index,
            name: name.to_string(),
        })
        .collect()
}

/// Compare two headers, ignoring the tag region on both sides.
///
/// Every static column must appear in the same order, and neither side may
/// have static columns left over.
pub fn is_column_naming_equivalent<E, A>(expected: &[E], actual: &[A]) -> bool
where
    E: AsRef<str>,
    A: AsRef<str>,
{
    let mut e = 0;
    let mut a = 0;
    loop {
        while e < expected.len() && is_tag_region_column(expected[e].as_ref()) {
            e += 1;
        }
        while a < actual.len() && tag_group_from_column(actual[a].as_ref()).is_some() {
            a += 1;
        }

        match (expected.get(e), actual.get(a)) {
            (None, None) => return true,
            (Some(x), Some(y)) if x.as_ref().trim() == y.as_ref().trim() => {
                e += 1;
                a += 1;
            }
            (x, y) => {
                let expected_name: Option<&str> = x.map(|s| s.as_ref());
                let actual_name: Option<&str> = y.map(|s| s.as_ref());
                tracing::error!(
                    expected_index = e,
                    expected = expected_name,
                    actual_index = a,
                    actual = actual_name,
                    "table header does not match the expected columns"
                );
                return false;
            }
        }
    }
}

/// Positions of the reserved columns in a validated header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub columns: Vec<String>,
    pub id_index: usize,
    pub version_index: usize,
}

/// Validate a table header against the registry.
pub fn validate_layout(snapshot: &TableSnapshot, registry: &ColumnRegistry) -> Result<ColumnLayout> {
    let find = |column: &str| {
        snapshot
            .columns
            .iter()
            .position(|c| c.trim() == column)
            .ok_or_else(|| Error::MissingColumn {
                table: snapshot.name.clone(),
                column: column.to_string(),
            })
    };
    let id_index = find(ID_COLUMN)?;
    let version_index = find(LAST_SYNC_VERSION_COLUMN)?;

    if !is_column_naming_equivalent(&registry.column_names(), &snapshot.columns) {
        return Err(Error::SchemaMismatch {
            table: snapshot.name.clone(),
        });
    }

    Ok(ColumnLayout {
        columns: snapshot.columns.clone(),
        id_index,
        version_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_tag, ColumnKind, ColumnSpec, TagValuesCollection};

    fn registry(groups: &[&str]) -> ColumnRegistry {
        let mut tags = TagValuesCollection::new();
        for g in groups {
            tags.add(&parse_tag(&format!("{g}:x")));
        }
        ColumnRegistry::from_specs(
            vec![
                ColumnSpec::new(ID_COLUMN, ColumnKind::Id),
                ColumnSpec::new(LAST_SYNC_VERSION_COLUMN, ColumnKind::SyncVersion),
                ColumnSpec::new(TAG_COLUMNS_PLACEHOLDER, ColumnKind::TagPlaceholder),
                ColumnSpec::new("payee", ColumnKind::OriginalTags),
            ],
            &tags,
        )
    }

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn snapshot(columns: &[&str]) -> TableSnapshot {
        TableSnapshot {
            name: "Transactions".into(),
            columns: names(columns),
            rows: Vec::new(),
            error_marker: None,
            last_sync: None,
        }
    }

    #[test]
    fn equivalence_ignores_tag_region() {
        assert!(is_column_naming_equivalent(
            &["a", TAG_COLUMNS_PLACEHOLDER, "b"],
            &["a", "Tags:X", "Tags:Y", "b"],
        ));
        assert!(!is_column_naming_equivalent(
            &["a", TAG_COLUMNS_PLACEHOLDER, "b"],
            &["a", "Tags:X", "c"],
        ));
    }

    #[test]
    fn placeholder_in_store_header_is_a_static_column() {
        assert!(!is_column_naming_equivalent(
            &["a", TAG_COLUMNS_PLACEHOLDER, "b"],
            &["a", TAG_COLUMNS_PLACEHOLDER, "b"],
        ));

        let reg = registry(&["Trip"]);
        let err = validate_layout(
            &snapshot(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, TAG_COLUMNS_PLACEHOLDER, "payee"]),
            &reg,
        )
        .unwrap_err();
        assert_eq!(
            err,
            Error::SchemaMismatch {
                table: "Transactions".into()
            }
        );
    }

    #[test]
    fn equivalence_rejects_leftover_static_columns() {
        assert!(!is_column_naming_equivalent(&["a", "b"], &["a"]));
        assert!(!is_column_naming_equivalent(&["a"], &["a", "extra"]));
        assert!(is_column_naming_equivalent(&["a", "Tags:Old"], &["a"]));
        assert!(is_column_naming_equivalent::<&str, &str>(&[], &[]));
    }

    #[test]
    fn missing_tag_columns_end_up_ascending() {
        let reg = registry(&["Who", "Trip", "Area"]);
        let actual = names(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "payee"]);
        let ops = plan_missing_tag_columns(&reg, &actual);

        assert_eq!(
            ops,
            vec![
                WriteOp::InsertColumn {
                    index: 2,
                    name: "Tags:Who".into()
                },
                WriteOp::InsertColumn {
                    index: 2,
                    name: "Tags:Trip".into()
                },
                WriteOp::InsertColumn {
                    index: 2,
                    name: "Tags:Area".into()
                },
            ]
        );

        let mut header = actual.clone();
        for op in ops {
            if let WriteOp::InsertColumn { index, name } = op {
                header.insert(index, name);
            }
        }
        assert_eq!(
            header,
            names(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "Tags:Area", "Tags:Trip", "Tags:Who", "payee"])
        );
    }

    #[test]
    fn missing_tag_column_goes_at_first_existing_tag_column() {
        let reg = registry(&["Trip", "Who"]);
        let actual = names(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "payee", "Tags:Who"]);
        let ops = plan_missing_tag_columns(&reg, &actual);
        assert_eq!(
            ops,
            vec![WriteOp::InsertColumn {
                index: 3,
                name: "Tags:Trip".into()
            }]
        );
    }

    #[test]
    fn alignment_is_idempotent() {
        let reg = registry(&["Trip"]);
        let actual = names(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "Tags:Trip", "payee"]);
        assert!(plan_missing_tag_columns(&reg, &actual).is_empty());
    }

    #[test]
    fn validate_finds_reserved_columns() {
        let reg = registry(&["Trip"]);
        let layout =
            validate_layout(&snapshot(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "payee"]), &reg).unwrap();
        assert_eq!(layout.id_index, 0);
        assert_eq!(layout.version_index, 1);
    }

    #[test]
    fn validate_reports_missing_reserved_column() {
        let reg = registry(&[]);
        let err = validate_layout(&snapshot(&[ID_COLUMN, "payee"]), &reg).unwrap_err();
        assert_eq!(
            err,
            Error::MissingColumn {
                table: "Transactions".into(),
                column: LAST_SYNC_VERSION_COLUMN.into()
            }
        );
    }

    #[test]
    fn validate_reports_static_mismatch() {
        let reg = registry(&[]);
        let err = validate_layout(
            &snapshot(&[ID_COLUMN, LAST_SYNC_VERSION_COLUMN, "notes"]),
            &reg,
        )
        .unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { .. }));
    }
}
