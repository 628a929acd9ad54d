// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Table schema: column list, sort description and the special columns the
//! read path cares about.

use serde::{Deserialize, Serialize};

use crate::types::PhysicalType;

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCatalog {
    name: String,
    physical_type: PhysicalType,
}

impl ColumnCatalog {
    pub fn new(name: impl Into<String>, physical_type: PhysicalType) -> Self {
        Self {
            name: name.into(),
            physical_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn physical_type(&self) -> PhysicalType {
        self.physical_type
    }
}

/// Schema of one table.
///
/// `sort_description` lists the primary-key columns in key order; rows inside
/// every part are sorted by this compound key and the sparse mark index is
/// built over it. `date_column` partitions parts into `[min_date, max_date]`
/// envelopes. `sampling_column` and `sign_column` are optional: the former
/// enables SAMPLE queries, the latter enables FINAL collapsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCatalog {
    columns: Vec<ColumnCatalog>,
    sort_description: Vec<String>,
    date_column: String,
    sampling_column: Option<String>,
    sign_column: Option<String>,
}

impl TableCatalog {
    pub fn new(
        columns: Vec<ColumnCatalog>,
        sort_description: Vec<String>,
        date_column: impl Into<String>,
    ) -> Self {
        Self {
            columns,
            sort_description,
            date_column: date_column.into(),
            sampling_column: None,
            sign_column: None,
        }
    }

    pub fn with_sampling_column(mut self, column: impl Into<String>) -> Self {
        self.sampling_column = Some(column.into());
        self
    }

    pub fn with_sign_column(mut self, column: impl Into<String>) -> Self {
        self.sign_column = Some(column.into());
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnCatalog> {
        self.columns.iter().find(|c| c.name() == name)
    }

    pub fn columns(&self) -> &[ColumnCatalog] {
        &self.columns
    }

    pub fn sort_description(&self) -> &[String] {
        &self.sort_description
    }

    /// Arity of the primary key.
    pub fn key_size(&self) -> usize {
        self.sort_description.len()
    }

    pub fn date_column(&self) -> &str {
        &self.date_column
    }

    pub fn sampling_column(&self) -> Option<&str> {
        self.sampling_column.as_deref()
    }

    pub fn sign_column(&self) -> Option<&str> {
        self.sign_column.as_deref()
    }
}
