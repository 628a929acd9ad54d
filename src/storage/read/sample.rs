// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Rewriting a plan for uniform sampling.
//!
//! A sample clause prunes at two levels with the same cutoff: the key
//! condition is tightened so the index skips marks past the cutoff, and a
//! row filter drops the stragglers conservative pruning lets through. Rows
//! are therefore sampled deterministically: re-running the query over the
//! same snapshot selects the same rows.

use std::sync::Arc;

use tracing::debug;

use super::prune::mark_ranges_from_pk_range;
use crate::catalog::TableCatalog;
use crate::expr::Expr;
use crate::storage::{
    DataPart, KeyCondition, Range, StorageError, StorageOptions, StorageResult,
    TracedStorageError,
};
use crate::types::DataValue;

/// The outcome of the sampling rewrite: a tightened key condition plus the
/// row-level filter every output stream gets wrapped with.
#[derive(Debug)]
pub(crate) struct SamplingRewrite {
    pub condition: KeyCondition,
    pub filter: Arc<Expr>,
    pub filter_column: String,
}

/// Rewrite the plan for a `SAMPLE size` clause.
///
/// `size` in `[0, 1]` is a relative share of the sampling coordinate space.
/// `size > 1` asks for an absolute row count: a preliminary index scan
/// estimates how many rows the query would read, and the share is derived
/// from that (an estimate of zero clamps the share to one; the key
/// condition prunes everything anyway). Columns the filter needs are added
/// to `column_names_to_read`.
pub(crate) fn rewrite_for_sampling(
    catalog: &TableCatalog,
    options: &StorageOptions,
    parts: &[Arc<DataPart>],
    condition: &KeyCondition,
    size: f64,
    min_marks_for_seek: usize,
    column_names_to_read: &mut Vec<String>,
) -> StorageResult<SamplingRewrite> {
    if size < 0.0 {
        return Err(TracedStorageError::argument("negative sample size"));
    }

    let mut relative = size;
    if size > 1.0 {
        let requested_count = size as u64;

        // Estimate how many rows would be read without sampling.
        debug!("Preliminary index scan with condition: {}", condition);
        let mut total_count: u64 = 0;
        for part in parts {
            let ranges = mark_ranges_from_pk_range(
                part,
                catalog.key_size(),
                condition,
                min_marks_for_seek,
                options.coarse_index_granularity,
            );
            total_count += ranges.iter().map(|r| r.len() as u64).sum::<u64>();
        }
        total_count *= options.index_granularity as u64;

        relative = if total_count == 0 {
            1.0
        } else {
            (requested_count as f64 / total_count as f64).min(1.0)
        };

        debug!("Selected relative sample size: {}", relative);
    }

    let sampling_column = catalog
        .sampling_column()
        .ok_or(StorageError::NotConfigured("sampling"))?;
    let column = catalog
        .column(sampling_column)
        .ok_or_else(|| TracedStorageError::unknown_column(sampling_column))?;
    let sampling_column_max = column.physical_type().unsigned_max().ok_or_else(|| {
        StorageError::IllegalTypeForFilter(sampling_column.into(), column.physical_type())
    })?;

    // The same cutoff drives index pruning and the row filter.
    let limit = (relative * sampling_column_max as f64) as u64;
    let limit_value = DataValue::from_unsigned(column.physical_type(), limit);

    let condition = condition
        .tighten(
            sampling_column,
            &Range::right_bounded(limit_value.clone(), true),
        )
        .ok_or_else(|| StorageError::IllegalColumn(sampling_column.into()))?;

    let filter = Expr::less_or_equals(
        Expr::column(sampling_column),
        Expr::literal(limit_value),
    );
    let filter_column = filter.name();

    column_names_to_read.extend(filter.required_columns());
    column_names_to_read.sort();
    column_names_to_read.dedup();

    Ok(SamplingRewrite {
        condition,
        filter: Arc::new(filter),
        filter_column,
    })
}
