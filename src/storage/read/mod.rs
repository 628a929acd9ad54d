// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! The read planner.
//!
//! [`ReadExecutor::read`] runs entirely before any stream is pulled: it
//! validates the requested columns, compiles the key and date conditions,
//! selects parts by date envelope, rewrites the plan for sampling, prunes
//! mark ranges through the sparse index, and spreads the surviving marks
//! across worker streams (or builds the single collapsing stream for
//! FINAL). All parallelism is the caller's: each returned stream can be
//! pulled from its own worker.

mod memory;
mod prune;
mod sample;
mod spread;
mod stream;

use std::sync::Arc;

use tracing::debug;

pub use memory::{MemoryPartData, MemoryPartReaderFactory};
pub use prune::mark_ranges_from_pk_range;
pub use stream::{
    BlockStream, BoxBlockStream, CollapsingFinalStream, ConcatStream, ExpressionStream,
    FilterStream, PartReadOptions, PartReaderFactory, PrewhereInfo,
};

use self::sample::rewrite_for_sampling;
use self::spread::{
    spread_mark_ranges_among_streams, spread_mark_ranges_for_final, SpreadThresholds,
};
use crate::expr::Expr;
use crate::storage::{
    ColumnPredicate, KeyCondition, QuerySettings, RangesInDataPart, StorageError,
    StorageResult, TableData, TracedStorageError,
};
use crate::types::DataValue;

/// How far the planner processes the query. This planner only fetches
/// columns; aggregation and projection happen downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessedStage {
    FetchColumns,
}

/// The select-style query the planner consumes. The predicate compiler is
/// external; it hands the planner a conjunction of per-column ranges from
/// which both the key and the date conditions are derived.
#[derive(Debug, Clone, Default)]
pub struct SelectQuery {
    pub predicates: Vec<ColumnPredicate>,
    pub sample_size: Option<f64>,
    pub prewhere: Option<Expr>,
    pub is_final: bool,
}

/// The planner's output: one independently pullable stream per worker.
pub struct ReadOutput {
    pub streams: Vec<BoxBlockStream>,
    pub processed_stage: ProcessedStage,
}

impl std::fmt::Debug for ReadOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOutput")
            .field("streams", &self.streams.len())
            .field("processed_stage", &self.processed_stage)
            .finish()
    }
}

/// Plans reads over one table's parts.
pub struct ReadExecutor {
    table: Arc<TableData>,
    factory: Arc<dyn PartReaderFactory>,
    min_marks_for_seek: usize,
    min_marks_for_concurrent_read: usize,
    max_marks_to_use_cache: usize,
}

impl ReadExecutor {
    pub fn new(table: Arc<TableData>, factory: Arc<dyn PartReaderFactory>) -> Self {
        let options = table.options().clone();
        let granularity = options.index_granularity;
        let to_marks = |rows: usize| (rows + granularity - 1) / granularity;
        Self {
            table,
            factory,
            min_marks_for_seek: to_marks(options.min_rows_for_seek),
            min_marks_for_concurrent_read: to_marks(options.min_rows_for_concurrent_read),
            max_marks_to_use_cache: to_marks(options.max_rows_to_use_cache),
        }
    }

    pub fn read(
        &self,
        column_names_to_return: &[String],
        query: &SelectQuery,
        settings: &QuerySettings,
        max_block_size: usize,
        threads: usize,
    ) -> StorageResult<ReadOutput> {
        if threads == 0 {
            return Err(TracedStorageError::argument("thread count must be at least 1"));
        }
        self.table.check_columns(column_names_to_return)?;
        let processed_stage = ProcessedStage::FetchColumns;

        let catalog = self.table.catalog();
        let options = self.table.options().as_ref();
        let mut key_condition =
            KeyCondition::new(catalog.sort_description(), &query.predicates);
        let date_sort_description = vec![catalog.date_column().to_string()];
        let date_condition = KeyCondition::new(&date_sort_description, &query.predicates);

        // Select the parts whose date envelope may satisfy the condition.
        let parts: Vec<_> = self
            .table
            .snapshot()
            .into_iter()
            .filter(|part| {
                date_condition.may_be_true_in_range(
                    &[DataValue::UInt64(part.min_date as u64)],
                    &[DataValue::UInt64(part.max_date as u64)],
                )
            })
            .collect();
        let selected_by_date = parts.len();

        let mut column_names_to_read = column_names_to_return.to_vec();
        let mut sampling_filter = None;
        if let Some(size) = query.sample_size {
            let rewrite = rewrite_for_sampling(
                catalog,
                options,
                &parts,
                &key_condition,
                size,
                self.min_marks_for_seek,
                &mut column_names_to_read,
            )?;
            key_condition = rewrite.condition;
            sampling_filter = Some((rewrite.filter, rewrite.filter_column));
        }

        debug!("Key condition: {}", key_condition);
        debug!("Date condition: {}", date_condition);

        let prewhere = match &query.prewhere {
            Some(expr) => Some(PrewhereInfo {
                column: expr.name(),
                actions: Arc::new(expr.clone()),
            }),
            None => None,
        };

        // Find what range of marks to read in each part.
        let mut parts_with_ranges: Vec<RangesInDataPart> = Vec::new();
        let mut sum_marks = 0;
        let mut sum_ranges = 0;
        for part in parts {
            let ranges = mark_ranges_from_pk_range(
                &part,
                catalog.key_size(),
                &key_condition,
                self.min_marks_for_seek,
                options.coarse_index_granularity,
            );
            if !ranges.is_empty() {
                sum_ranges += ranges.len();
                sum_marks += ranges.iter().map(|r| r.len()).sum::<usize>();
                parts_with_ranges.push(RangesInDataPart::new(part, ranges));
            }
        }

        debug!(
            "Selected {} parts by date, {} parts by key, {} marks to read from {} ranges",
            selected_by_date,
            parts_with_ranges.len(),
            sum_marks,
            sum_ranges
        );

        let thresholds = SpreadThresholds {
            min_marks_for_concurrent_read: self.min_marks_for_concurrent_read,
            max_marks_to_use_cache: self.max_marks_to_use_cache,
        };

        let mut streams = if query.is_final {
            let sign_column = catalog
                .sign_column()
                .ok_or(StorageError::NotConfigured("sign column"))?;
            spread_mark_ranges_for_final(
                parts_with_ranges,
                &column_names_to_read,
                catalog,
                sign_column,
                max_block_size,
                settings.use_uncompressed_cache,
                prewhere.as_ref(),
                self.factory.as_ref(),
                options,
                thresholds,
            )?
        } else {
            spread_mark_ranges_among_streams(
                parts_with_ranges,
                threads,
                &column_names_to_read,
                max_block_size,
                settings.use_uncompressed_cache,
                prewhere.as_ref(),
                self.factory.as_ref(),
                options,
                thresholds,
            )?
        };

        // Drop the rows past the sampling cutoff that conservative index
        // pruning let through.
        if let Some((filter, filter_column)) = sampling_filter {
            streams = streams
                .into_iter()
                .map(|stream| {
                    Box::new(FilterStream::new(
                        Box::new(ExpressionStream::new(
                            stream,
                            vec![filter.as_ref().clone()],
                        )),
                        filter_column.clone(),
                    )) as BoxBlockStream
                })
                .collect();
        }

        Ok(ReadOutput {
            streams,
            processed_stage,
        })
    }
}
