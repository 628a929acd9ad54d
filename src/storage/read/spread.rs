// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Spreading the pruned mark workload across worker streams.

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::stream::{
    BoxBlockStream, CollapsingFinalStream, ConcatStream, ExpressionStream, FilterStream,
    PartReadOptions, PartReaderFactory, PrewhereInfo,
};
use crate::catalog::TableCatalog;
use crate::expr::Expr;
use crate::storage::{
    MarkRange, RangesInDataPart, StorageOptions, StorageResult, TracedStorageError,
};
use crate::types::DataValue;

/// Thresholds of the spreader, already converted from rows to marks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SpreadThresholds {
    pub min_marks_for_concurrent_read: usize,
    pub max_marks_to_use_cache: usize,
}

fn reader_options(
    storage: &StorageOptions,
    part: &RangesInDataPart,
    ranges: Vec<MarkRange>,
    column_names: &[String],
    max_block_size: usize,
    use_uncompressed_cache: bool,
    prewhere: Option<&PrewhereInfo>,
) -> PartReadOptions {
    PartReadOptions {
        path: storage.path.join(&part.data_part.name),
        part: part.data_part.clone(),
        ranges,
        column_names: column_names.to_vec(),
        max_block_size,
        use_uncompressed_cache,
        prewhere: prewhere.cloned(),
    }
}

/// Partition the total mark workload into up to `threads` streams, each a
/// part reader or a concatenation of several.
///
/// Parts are shuffled to spread size skew, then consumed from the back with
/// their range lists reversed so the leftmost work unit pops in O(1). Every
/// worker aims for `(sum_marks - 1) / threads + 1` marks, quantized so no
/// slice and no leftover stub falls below `min_marks_for_concurrent_read`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spread_mark_ranges_among_streams(
    mut parts: Vec<RangesInDataPart>,
    threads: usize,
    column_names: &[String],
    max_block_size: usize,
    mut use_uncompressed_cache: bool,
    prewhere: Option<&PrewhereInfo>,
    factory: &dyn PartReaderFactory,
    storage: &StorageOptions,
    thresholds: SpreadThresholds,
) -> StorageResult<Vec<BoxBlockStream>> {
    let mut rng = SmallRng::seed_from_u64(storage.shuffle_seed);
    parts.shuffle(&mut rng);

    // Per-part mark totals, with ranges reversed so the leftmost range sits
    // at the back.
    let mut sum_marks_in_parts: Vec<usize> = Vec::with_capacity(parts.len());
    let mut sum_marks = 0;
    for part in &mut parts {
        part.ranges.reverse();
        let marks: usize = part.ranges.iter().map(MarkRange::len).sum();
        sum_marks_in_parts.push(marks);
        sum_marks += marks;
    }

    if sum_marks > thresholds.max_marks_to_use_cache {
        use_uncompressed_cache = false;
    }

    let mut res: Vec<BoxBlockStream> = Vec::new();

    if sum_marks > 0 {
        let min_marks_per_thread = (sum_marks - 1) / threads + 1;

        for _ in 0..threads {
            if parts.is_empty() {
                break;
            }
            let mut need_marks = min_marks_per_thread;
            let mut streams: Vec<BoxBlockStream> = Vec::new();

            while need_marks > 0 && !parts.is_empty() {
                let part_idx = parts.len() - 1;
                let marks_in_part = sum_marks_in_parts[part_idx];

                // Do not take too few marks out of a part.
                if marks_in_part >= thresholds.min_marks_for_concurrent_read
                    && need_marks < thresholds.min_marks_for_concurrent_read
                {
                    need_marks = thresholds.min_marks_for_concurrent_read;
                }

                // Do not leave too few marks in a part either.
                if marks_in_part > need_marks
                    && marks_in_part - need_marks < thresholds.min_marks_for_concurrent_read
                {
                    need_marks = marks_in_part;
                }

                if marks_in_part <= need_marks {
                    // Take the whole part, restoring the range order.
                    let mut part = parts.pop().unwrap();
                    sum_marks_in_parts.pop();
                    part.ranges.reverse();
                    let ranges = std::mem::take(&mut part.ranges);
                    streams.push(factory.create_reader(reader_options(
                        storage,
                        &part,
                        ranges,
                        column_names,
                        max_block_size,
                        use_uncompressed_cache,
                        prewhere,
                    )));
                    need_marks -= marks_in_part;
                    continue;
                }

                // Take the leftmost `need_marks` marks, splitting the last
                // consumed range at the boundary.
                let mut ranges_to_get_from_part: Vec<MarkRange> = Vec::new();
                while need_marks > 0 {
                    let part = parts.last_mut().unwrap();
                    let Some(range) = part.ranges.last_mut() else {
                        return Err(TracedStorageError::logical(
                            "unexpected end of ranges while spreading marks among streams",
                        ));
                    };
                    let marks_to_get_from_range = range.len().min(need_marks);
                    ranges_to_get_from_part.push(MarkRange::new(
                        range.begin,
                        range.begin + marks_to_get_from_range,
                    ));
                    range.begin += marks_to_get_from_range;
                    sum_marks_in_parts[part_idx] -= marks_to_get_from_range;
                    need_marks -= marks_to_get_from_range;
                    if range.is_empty() {
                        part.ranges.pop();
                    }
                }
                let part = parts.last().unwrap();
                streams.push(factory.create_reader(reader_options(
                    storage,
                    part,
                    ranges_to_get_from_part,
                    column_names,
                    max_block_size,
                    use_uncompressed_cache,
                    prewhere,
                )));
            }

            if streams.len() == 1 {
                res.push(streams.pop().unwrap());
            } else {
                res.push(Box::new(ConcatStream::new(streams)));
            }
        }

        if !parts.is_empty() {
            return Err(TracedStorageError::logical(
                "couldn't spread marks among streams",
            ));
        }
    }

    Ok(res)
}

/// Build the FINAL plan: one primary-key-ordered stream per part, collapsed
/// across parts by net sign.
///
/// The read set is widened with the sort-key columns and the sign column so
/// every row downstream carries its full key. A single surviving part needs
/// no cross-part merge; dropping its deleted rows with a positive-sign
/// filter is enough.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spread_mark_ranges_for_final(
    parts: Vec<RangesInDataPart>,
    column_names: &[String],
    catalog: &TableCatalog,
    sign_column: &str,
    max_block_size: usize,
    mut use_uncompressed_cache: bool,
    prewhere: Option<&PrewhereInfo>,
    factory: &dyn PartReaderFactory,
    storage: &StorageOptions,
    thresholds: SpreadThresholds,
) -> StorageResult<Vec<BoxBlockStream>> {
    let mut column_names = column_names.to_vec();
    column_names.extend(catalog.sort_description().iter().cloned());
    column_names.push(sign_column.to_string());
    column_names.sort();
    column_names.dedup();

    let sum_marks: usize = parts.iter().map(RangesInDataPart::sum_marks).sum();
    if sum_marks > thresholds.max_marks_to_use_cache {
        use_uncompressed_cache = false;
    }

    let sign_filter = Expr::equals(
        Expr::column(sign_column),
        Expr::literal(DataValue::Int8(1)),
    );
    let sign_filter_column = sign_filter.name();

    let mut to_collapse: Vec<BoxBlockStream> = Vec::new();
    for part in &parts {
        let source = factory.create_reader(reader_options(
            storage,
            part,
            part.ranges.clone(),
            &column_names,
            max_block_size,
            use_uncompressed_cache,
            prewhere,
        ));
        let key_projection = catalog
            .sort_description()
            .iter()
            .map(|name| Expr::column(name.clone()))
            .collect();
        to_collapse.push(Box::new(ExpressionStream::new(source, key_projection)));
    }

    let mut res: Vec<BoxBlockStream> = Vec::new();
    if to_collapse.len() == 1 {
        let only = to_collapse.pop().unwrap();
        res.push(Box::new(FilterStream::new(
            Box::new(ExpressionStream::new(only, vec![sign_filter])),
            sign_filter_column,
        )));
    } else if to_collapse.len() > 1 {
        res.push(Box::new(CollapsingFinalStream::new(
            to_collapse,
            catalog.sort_description().to_vec(),
            sign_column,
            max_block_size,
        )));
    }

    Ok(res)
}
