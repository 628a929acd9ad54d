// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Immutable data parts and the live part set of a table.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::catalog::TableCatalog;
use crate::types::DataValue;

use super::{StorageOptions, StorageResult, TracedStorageError};

/// A half-open interval `[begin, end)` over the marks of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkRange {
    pub begin: usize,
    pub end: usize,
}

impl MarkRange {
    pub fn new(begin: usize, end: usize) -> Self {
        Self { begin, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.begin
    }
}

/// An immutable part of a table.
///
/// `index` is the sparse primary-key index: a flat sequence of
/// `marks_count * key_size` values where entry `m * key_size + k` is the
/// minimum of key column `k` within mark `m`. Each mark covers
/// `index_granularity` consecutive rows (the last one may be shorter; the
/// planner treats marks as uniform).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPart {
    pub name: String,
    pub min_date: u16,
    pub max_date: u16,
    pub index: Vec<DataValue>,
    pub marks_count: usize,
    pub row_count: usize,
}

impl DataPart {
    /// The minimum key of mark `mark`.
    pub fn index_key(&self, mark: usize, key_size: usize) -> &[DataValue] {
        &self.index[mark * key_size..(mark + 1) * key_size]
    }
}

/// The pruned read set of one part: the part handle plus the mark ranges
/// that may satisfy the key condition, in increasing order.
#[derive(Debug, Clone)]
pub struct RangesInDataPart {
    pub data_part: Arc<DataPart>,
    pub ranges: Vec<MarkRange>,
}

impl RangesInDataPart {
    pub fn new(data_part: Arc<DataPart>, ranges: Vec<MarkRange>) -> Self {
        Self { data_part, ranges }
    }

    pub fn sum_marks(&self) -> usize {
        self.ranges.iter().map(MarkRange::len).sum()
    }
}

/// A table with its live set of parts.
///
/// The planner captures a snapshot of the part set at entry; parts merged or
/// dropped afterwards stay alive through their `Arc` handles until every
/// stream referencing them is released.
pub struct TableData {
    catalog: TableCatalog,
    options: Arc<StorageOptions>,
    parts: RwLock<Vec<Arc<DataPart>>>,
}

impl TableData {
    pub fn new(catalog: TableCatalog, options: Arc<StorageOptions>) -> Self {
        Self {
            catalog,
            options,
            parts: RwLock::new(Vec::new()),
        }
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &Arc<StorageOptions> {
        &self.options
    }

    pub fn add_part(&self, part: DataPart) {
        self.parts.write().push(Arc::new(part));
    }

    /// The current live parts.
    pub fn snapshot(&self) -> Vec<Arc<DataPart>> {
        self.parts.read().clone()
    }

    /// Load part descriptors from a JSON manifest and add them to the live
    /// set.
    pub fn load_manifest(&self, manifest: &str) -> StorageResult<()> {
        let parts: Vec<DataPart> = serde_json::from_str(manifest)?;
        let mut live = self.parts.write();
        live.extend(parts.into_iter().map(Arc::new));
        Ok(())
    }

    /// Verify that every name refers to a column of the table.
    pub fn check_columns(&self, names: &[String]) -> StorageResult<()> {
        for name in names {
            if self.catalog.column(name).is_none() {
                return Err(TracedStorageError::unknown_column(name));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ColumnCatalog;
    use crate::types::PhysicalType;

    fn table() -> TableData {
        let catalog = TableCatalog::new(
            vec![
                ColumnCatalog::new("date", PhysicalType::Date),
                ColumnCatalog::new("k", PhysicalType::UInt64),
            ],
            vec!["k".into()],
            "date",
        );
        TableData::new(catalog, Arc::new(StorageOptions::default_for_test()))
    }

    #[test]
    fn snapshot_is_stable_across_later_writes() {
        let table = table();
        table.add_part(DataPart {
            name: "19700101_19700101_1_1_0".into(),
            min_date: 0,
            max_date: 0,
            index: vec![DataValue::UInt64(0)],
            marks_count: 1,
            row_count: 5,
        });
        let snapshot = table.snapshot();
        table.add_part(DataPart {
            name: "19700102_19700102_2_2_0".into(),
            min_date: 1,
            max_date: 1,
            index: vec![DataValue::UInt64(9)],
            marks_count: 1,
            row_count: 5,
        });
        assert_eq!(snapshot.len(), 1);
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn manifest_round_trip() {
        let table = table();
        let manifest = serde_json::to_string(&vec![DataPart {
            name: "p0".into(),
            min_date: 10,
            max_date: 12,
            index: vec![DataValue::UInt64(1), DataValue::UInt64(100)],
            marks_count: 2,
            row_count: 16,
        }])
        .unwrap();
        table.load_manifest(&manifest).unwrap();
        let snapshot = table.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].marks_count, 2);
        assert_eq!(snapshot[0].index_key(1, 1), &[DataValue::UInt64(100)]);
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let table = table();
        assert!(table.check_columns(&["k".into()]).is_ok());
        assert!(table.check_columns(&["missing".into()]).is_err());
    }
}
