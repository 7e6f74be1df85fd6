//! Record classification over a source and a target snapshot.
//!
//! All functions are pure: they read two [`Dataset`]s and return tagged copies of their
//! rows. Column names are compared exactly, so both datasets are expected to carry target
//! column names (see [`crate::schema::ColumnMapping`]).

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, ScdResult};
use crate::types::{ChangeRecord, Classification, Dataset, DatasetRow, NormalizedValue};

/// Ordered, non-empty set of columns identifying a logical record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessKeySet {
    columns: Vec<String>,
}

impl BusinessKeySet {
    /// Fails with [`ErrorKind::InvalidArgument`] when `columns` is empty or repeats a name.
    pub fn new(columns: Vec<String>) -> ScdResult<Self> {
        if columns.is_empty() {
            bail!(
                ErrorKind::InvalidArgument,
                "Business key set is empty",
                "at least one business key column is required to match records"
            );
        }

        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column.to_lowercase()) {
                bail!(
                    ErrorKind::InvalidArgument,
                    "Business key column listed twice",
                    format!("`{column}` appears more than once")
                );
            }
        }

        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns `true` if `column` is a key column, ignoring case.
    pub fn contains(&self, column: &str) -> bool {
        self.columns
            .iter()
            .any(|key| key.eq_ignore_ascii_case(column))
    }
}

/// Decides whether a target row is still current.
///
/// A row is inactive when the text of its status equals the inactive code. Rows with a null
/// status, or targets without the status column, count as active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusFilter {
    column: String,
    inactive_code: String,
}

impl StatusFilter {
    pub fn new(column: impl Into<String>, inactive_code: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            inactive_code: inactive_code.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn inactive_code(&self) -> &str {
        &self.inactive_code
    }

    fn status_index(&self, dataset: &Dataset) -> Option<usize> {
        dataset.column_index(&self.column)
    }

    fn is_active_at(&self, index: Option<usize>, row: &DatasetRow) -> bool {
        match index {
            Some(index) => {
                let status = row.get(index);
                status.is_null() || status.to_string().trim() != self.inactive_code
            }
            None => true,
        }
    }

    /// Returns `true` if `row` of `dataset` is active.
    pub fn is_active(&self, dataset: &Dataset, row: &DatasetRow) -> bool {
        self.is_active_at(self.status_index(dataset), row)
    }
}

/// Every record of a source and target pair, grouped by classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    pub new: Vec<ChangeRecord>,
    pub changed: Vec<ChangeRecord>,
    pub terminated: Vec<ChangeRecord>,
    pub unchanged: Vec<ChangeRecord>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.new.len() + self.changed.len() + self.terminated.len() + self.unchanged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type KeyTuple = Vec<NormalizedValue>;

/// Positions of the key columns inside one dataset.
struct KeyColumns {
    indexes: Vec<usize>,
}

impl KeyColumns {
    fn locate(dataset: &Dataset, keys: &BusinessKeySet, side: &str) -> ScdResult<Self> {
        let mut indexes = Vec::with_capacity(keys.columns().len());
        for key in keys.columns() {
            let Some(index) = dataset.column_index(key) else {
                bail!(
                    ErrorKind::InvalidArgument,
                    "Business key column is missing",
                    format!("the {side} rows have no column `{key}`")
                );
            };
            indexes.push(index);
        }

        Ok(Self { indexes })
    }

    /// Returns the key tuple, or `None` if any key value is null.
    fn tuple(&self, row: &DatasetRow) -> Option<KeyTuple> {
        self.indexes
            .iter()
            .map(|index| row.get(*index).normalized())
            .collect()
    }
}

/// Key tuples of the source, validated to be non-null and unique.
fn source_keys(source: &Dataset, keys: &BusinessKeySet) -> ScdResult<Vec<KeyTuple>> {
    let key_columns = KeyColumns::locate(source, keys, "source")?;

    let mut seen = HashSet::with_capacity(source.len());
    let mut tuples = Vec::with_capacity(source.len());
    for (position, row) in source.rows().iter().enumerate() {
        let Some(tuple) = key_columns.tuple(row) else {
            bail!(
                ErrorKind::InvalidData,
                "Source row has a null business key",
                format!("row {position} has a null value in one of {:?}", keys.columns())
            );
        };

        if !seen.insert(tuple.clone()) {
            bail!(
                ErrorKind::InvalidData,
                "Source business key is not unique",
                format!("key {tuple:?} appears more than once in the source")
            );
        }

        tuples.push(tuple);
    }

    Ok(tuples)
}

/// Target row positions grouped by key tuple. Rows with a null key are left out.
fn target_index(
    target: &Dataset,
    keys: &BusinessKeySet,
    active_only: Option<&StatusFilter>,
) -> ScdResult<HashMap<KeyTuple, Vec<usize>>> {
    let key_columns = KeyColumns::locate(target, keys, "target")?;
    let status_index = active_only.and_then(|status| status.status_index(target));

    let mut index: HashMap<KeyTuple, Vec<usize>> = HashMap::with_capacity(target.len());
    let mut null_keys = 0usize;
    for (position, row) in target.rows().iter().enumerate() {
        let inactive = active_only.is_some_and(|status| !status.is_active_at(status_index, row));
        if inactive {
            continue;
        }

        match key_columns.tuple(row) {
            Some(tuple) => index.entry(tuple).or_default().push(position),
            None => null_keys += 1,
        }
    }

    if null_keys > 0 {
        debug!(rows = null_keys, "target rows with a null business key never match");
    }

    Ok(index)
}

/// Source rows whose key has no match anywhere in the target, active or not.
pub fn classify_new(
    source: &Dataset,
    target: &Dataset,
    keys: &BusinessKeySet,
) -> ScdResult<Vec<ChangeRecord>> {
    let source_keys = source_keys(source, keys)?;
    let target_index = target_index(target, keys, None)?;

    let records = source
        .rows()
        .iter()
        .zip(source_keys)
        .filter(|(_, key)| !target_index.contains_key(key))
        .map(|(row, _)| ChangeRecord::new(Classification::New, row.clone()))
        .collect();

    Ok(records)
}

/// Active target rows whose key has no match in the source.
///
/// Every active version of a vanished key is returned. Target rows with a null key are
/// never terminated.
pub fn classify_terminated(
    source: &Dataset,
    target: &Dataset,
    keys: &BusinessKeySet,
    status: &StatusFilter,
) -> ScdResult<Vec<ChangeRecord>> {
    let source_keys = source_keys(source, keys)?
        .into_iter()
        .collect::<HashSet<_>>();
    let active_index = target_index(target, keys, Some(status))?;

    let mut positions = active_index
        .into_iter()
        .filter(|(key, _)| !source_keys.contains(key))
        .flat_map(|(_, positions)| positions)
        .collect::<Vec<_>>();
    positions.sort_unstable();

    let records = positions
        .into_iter()
        .map(|position| {
            ChangeRecord::new(
                Classification::Terminated,
                target.rows()[position].clone(),
            )
        })
        .collect();

    Ok(records)
}

/// Columns compared between a source row and its active target versions.
///
/// Columns present in both datasets, minus the keys, minus `exclude_fields` (ignoring
/// case), in source order.
pub fn compare_fields(
    source: &Dataset,
    target: &Dataset,
    keys: &BusinessKeySet,
    exclude_fields: &[String],
) -> ScdResult<Vec<String>> {
    if let Some(key) = exclude_fields.iter().find(|field| keys.contains(field)) {
        bail!(
            ErrorKind::InvalidArgument,
            "Business key column cannot be excluded from comparison",
            format!("`{key}` is both a business key and an excluded field")
        );
    }

    let fields = source
        .columns()
        .iter()
        .filter(|column| target.column_index(column).is_some())
        .filter(|column| !keys.contains(column))
        .filter(|column| {
            !exclude_fields
                .iter()
                .any(|field| field.eq_ignore_ascii_case(column))
        })
        .cloned()
        .collect();

    Ok(fields)
}

/// Result of matching one source row against its active target versions.
enum Match {
    /// No active target version shares the key.
    None,
    /// At least one active version is indistinct on every compared field.
    Same,
    /// Every active version differs on at least one compared field.
    Different,
}

fn match_source_row(
    row: &DatasetRow,
    target: &Dataset,
    active_versions: Option<&Vec<usize>>,
    field_indexes: &[(usize, usize)],
) -> Match {
    let Some(versions) = active_versions else {
        return Match::None;
    };

    let identical = versions.iter().any(|position| {
        let target_row = &target.rows()[*position];
        field_indexes.iter().all(|(source_index, target_index)| {
            !row
                .get(*source_index)
                .is_distinct_from(target_row.get(*target_index))
        })
    });

    if identical {
        Match::Same
    } else {
        Match::Different
    }
}

fn field_indexes(source: &Dataset, target: &Dataset, fields: &[String]) -> Vec<(usize, usize)> {
    fields
        .iter()
        .filter_map(|field| Some((source.column_index(field)?, target.column_index(field)?)))
        .collect()
}

/// Source rows with an active target match that differs on at least one compared field.
///
/// Comparison is null-aware: null against null is no difference, null against a value is.
/// When a key has several active versions the row is changed only if none of them is
/// identical to it.
pub fn classify_changed(
    source: &Dataset,
    target: &Dataset,
    keys: &BusinessKeySet,
    status: &StatusFilter,
    exclude_fields: &[String],
) -> ScdResult<Vec<ChangeRecord>> {
    let fields = compare_fields(source, target, keys, exclude_fields)?;
    let source_keys = source_keys(source, keys)?;
    let active_index = target_index(target, keys, Some(status))?;

    if fields.is_empty() {
        debug!("no comparable fields remain, no record can be changed");
        return Ok(Vec::new());
    }

    let field_indexes = field_indexes(source, target, &fields);
    let records = source
        .rows()
        .iter()
        .zip(source_keys)
        .filter(|(row, key)| {
            matches!(
                match_source_row(row, target, active_index.get(key), &field_indexes),
                Match::Different
            )
        })
        .map(|(row, _)| ChangeRecord::new(Classification::Changed, row.clone()))
        .collect();

    Ok(records)
}

/// Classifies every source row and every active target row in one pass.
///
/// Source rows are new, changed or unchanged. Active target rows whose key vanished are
/// terminated. Each key of the source and the active target lands in exactly one group.
pub fn classify_all(
    source: &Dataset,
    target: &Dataset,
    keys: &BusinessKeySet,
    status: &StatusFilter,
    exclude_fields: &[String],
) -> ScdResult<Partition> {
    let fields = compare_fields(source, target, keys, exclude_fields)?;
    let field_indexes = field_indexes(source, target, &fields);
    let source_keys = source_keys(source, keys)?;
    let any_index = target_index(target, keys, None)?;
    let active_index = target_index(target, keys, Some(status))?;

    let mut partition = Partition::default();
    for (row, key) in source.rows().iter().zip(&source_keys) {
        let classification = if !any_index.contains_key(key) {
            Classification::New
        } else if fields.is_empty() {
            Classification::Unchanged
        } else {
            match match_source_row(row, target, active_index.get(key), &field_indexes) {
                Match::Different => Classification::Changed,
                Match::None | Match::Same => Classification::Unchanged,
            }
        };

        let record = ChangeRecord::new(classification, row.clone());
        match classification {
            Classification::New => partition.new.push(record),
            Classification::Changed => partition.changed.push(record),
            _ => partition.unchanged.push(record),
        }
    }

    partition.terminated = classify_terminated(source, target, keys, status)?;

    Ok(partition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Cell;

    fn keys(columns: &[&str]) -> BusinessKeySet {
        BusinessKeySet::new(columns.iter().map(|column| (*column).to_owned()).collect()).unwrap()
    }

    fn status() -> StatusFilter {
        StatusFilter::new("status", "0")
    }

    fn source(rows: &[(i32, Option<&str>)]) -> Dataset {
        Dataset::new(
            vec!["id".into(), "name".into()],
            rows.iter()
                .map(|(id, name)| DatasetRow::new(vec![Cell::I32(*id), (*name).into()]))
                .collect(),
        )
    }

    fn target(rows: &[(i32, Option<&str>, &str)]) -> Dataset {
        Dataset::new(
            vec!["id".into(), "name".into(), "status".into()],
            rows.iter()
                .map(|(id, name, status)| {
                    DatasetRow::new(vec![Cell::I32(*id), (*name).into(), (*status).into()])
                })
                .collect(),
        )
    }

    fn ids(records: &[ChangeRecord]) -> Vec<i32> {
        records
            .iter()
            .map(|record| match record.row.get(0) {
                Cell::I32(id) => *id,
                other => panic!("unexpected key {other:?}"),
            })
            .collect()
    }

    #[test]
    fn scenario_new_changed_and_unchanged() {
        let source = source(&[(1, Some("A")), (2, Some("B")), (3, Some("C"))]);
        let target = target(&[(1, Some("A"), "1"), (2, Some("X"), "1")]);
        let keys = keys(&["id"]);

        let new = classify_new(&source, &target, &keys).unwrap();
        let terminated = classify_terminated(&source, &target, &keys, &status()).unwrap();
        let changed = classify_changed(&source, &target, &keys, &status(), &[]).unwrap();

        assert_eq!(ids(&new), vec![3]);
        assert_eq!(new[0].row.get(1), &Cell::String("C".into()));
        assert!(terminated.is_empty());
        assert_eq!(ids(&changed), vec![2]);
        assert_eq!(changed[0].row.get(1), &Cell::String("B".into()));
        assert_eq!(changed[0].classification, Classification::Changed);
    }

    #[test]
    fn inactive_target_rows_are_not_terminated() {
        let source = source(&[(1, Some("A"))]);
        let target = target(&[(1, Some("A"), "1"), (5, Some("E"), "0"), (6, Some("F"), "1")]);

        let terminated = classify_terminated(&source, &target, &keys(&["id"]), &status()).unwrap();

        assert_eq!(ids(&terminated), vec![6]);
        assert_eq!(terminated[0].classification, Classification::Terminated);
    }

    #[test]
    fn null_comparison_is_three_valued() {
        let keys = keys(&["id"]);
        let source = source(&[(1, None), (2, None), (3, Some("C"))]);
        let target = target(&[(1, None, "1"), (2, Some("B"), "1"), (3, None, "1")]);

        let changed = classify_changed(&source, &target, &keys, &status(), &[]).unwrap();

        assert_eq!(ids(&changed), vec![2, 3]);
    }

    #[test]
    fn new_ignores_status_but_changed_needs_an_active_match() {
        let keys = keys(&["id"]);
        let source = source(&[(5, Some("Z"))]);
        let target = target(&[(5, Some("E"), "0")]);

        assert!(classify_new(&source, &target, &keys).unwrap().is_empty());
        assert!(
            classify_changed(&source, &target, &keys, &status(), &[])
                .unwrap()
                .is_empty()
        );

        let partition = classify_all(&source, &target, &keys, &status(), &[]).unwrap();
        assert_eq!(ids(&partition.unchanged), vec![5]);
    }

    #[test]
    fn excluding_every_field_yields_no_changes() {
        let keys = keys(&["id"]);
        let source = source(&[(1, Some("A"))]);
        let target = target(&[(1, Some("X"), "1")]);

        let changed =
            classify_changed(&source, &target, &keys, &status(), &["NAME".into()]).unwrap();

        assert!(changed.is_empty());
    }

    #[test]
    fn excluding_a_key_is_rejected() {
        let source = source(&[(1, Some("A"))]);
        let target = target(&[(1, Some("A"), "1")]);

        let err = classify_changed(&source, &target, &keys(&["id"]), &status(), &["ID".into()])
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn empty_and_duplicate_keys_are_rejected() {
        assert_eq!(
            BusinessKeySet::new(vec![]).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            BusinessKeySet::new(vec!["id".into(), "Id".into()])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn source_keys_must_be_unique_and_non_null() {
        let keys = keys(&["id"]);
        let target = target(&[]);

        let duplicated = source(&[(1, Some("A")), (1, Some("B"))]);
        let err = classify_new(&duplicated, &target, &keys).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let null_key = Dataset::new(
            vec!["id".into(), "name".into()],
            vec![DatasetRow::new(vec![Cell::Null, "A".into()])],
        );
        let err = classify_new(&null_key, &target, &keys).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }

    #[test]
    fn missing_key_column_is_rejected() {
        let source = source(&[(1, Some("A"))]);
        let target = target(&[]);

        let err = classify_new(&source, &target, &keys(&["customer_id"])).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn composite_keys_match_across_integer_widths() {
        let keys = keys(&["id", "region"]);
        let source = Dataset::new(
            vec!["id".into(), "region".into(), "name".into()],
            vec![
                DatasetRow::new(vec![Cell::I32(1), "eu".into(), "A".into()]),
                DatasetRow::new(vec![Cell::I32(1), "us".into(), "B".into()]),
            ],
        );
        let target = Dataset::new(
            vec!["id".into(), "region".into(), "name".into(), "status".into()],
            vec![DatasetRow::new(vec![
                Cell::I64(1),
                "eu".into(),
                "A".into(),
                "1".into(),
            ])],
        );

        let new = classify_new(&source, &target, &keys).unwrap();

        assert_eq!(new.len(), 1);
        assert_eq!(new[0].row.get(1), &Cell::String("us".into()));
    }

    #[test]
    fn changed_key_with_a_matching_newer_version_is_unchanged() {
        let keys = keys(&["id"]);
        let source = source(&[(1, Some("B"))]);
        let target = target(&[(1, Some("A"), "1"), (1, Some("B"), "1")]);

        let changed = classify_changed(&source, &target, &keys, &status(), &[]).unwrap();

        assert!(changed.is_empty());
    }

    #[test]
    fn vanished_key_terminates_every_active_version() {
        let keys = keys(&["id"]);
        let source = source(&[]);
        let target = target(&[(1, Some("A"), "1"), (1, Some("B"), "1"), (1, Some("C"), "0")]);

        let terminated = classify_terminated(&source, &target, &keys, &status()).unwrap();

        assert_eq!(terminated.len(), 2);
    }

    #[test]
    fn partition_is_complete_disjoint_and_repeatable() {
        let keys = keys(&["id"]);
        let source = source(&[(1, Some("A")), (2, Some("B")), (3, Some("C")), (7, None)]);
        let target = target(&[
            (1, Some("A"), "1"),
            (2, Some("X"), "1"),
            (4, Some("D"), "1"),
            (5, Some("E"), "0"),
            (7, None, "1"),
        ]);

        let partition = classify_all(&source, &target, &keys, &status(), &[]).unwrap();

        assert_eq!(ids(&partition.new), vec![3]);
        assert_eq!(ids(&partition.changed), vec![2]);
        assert_eq!(ids(&partition.terminated), vec![4]);
        assert_eq!(ids(&partition.unchanged), vec![1, 7]);

        let mut all = ids(&partition.new);
        all.extend(ids(&partition.changed));
        all.extend(ids(&partition.terminated));
        all.extend(ids(&partition.unchanged));
        all.sort_unstable();
        assert_eq!(all, vec![1, 2, 3, 4, 7]);

        let again = classify_all(&source, &target, &keys, &status(), &[]).unwrap();
        assert_eq!(partition, again);
        assert_eq!(
            partition.new,
            classify_new(&source, &target, &keys).unwrap()
        );
        assert_eq!(
            partition.changed,
            classify_changed(&source, &target, &keys, &status(), &[]).unwrap()
        );
    }

    #[test]
    fn status_filter_treats_null_and_missing_status_as_active() {
        let filter = status();
        let target = target(&[(1, Some("A"), "0")]);
        let with_null = Dataset::new(
            vec!["id".into(), "status".into()],
            vec![DatasetRow::new(vec![Cell::I32(1), Cell::Null])],
        );
        let without_status = source(&[(1, Some("A"))]);

        assert!(!filter.is_active(&target, &target.rows()[0]));
        assert!(filter.is_active(&with_null, &with_null.rows()[0]));
        assert!(filter.is_active(&without_status, &without_status.rows()[0]));

        let numeric = Dataset::new(
            vec!["status".into()],
            vec![DatasetRow::new(vec![Cell::I32(0)])],
        );
        assert!(!filter.is_active(&numeric, &numeric.rows()[0]));
    }
}
