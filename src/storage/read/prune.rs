// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Sparse-index range pruning.

use crate::storage::{DataPart, KeyCondition, MarkRange};

/// Find the mark ranges of `part` that may hold keys satisfying the
/// condition, coalescing ranges separated by `min_marks_for_seek` marks or
/// fewer.
///
/// The descent keeps a stack of disjoint suspicious intervals with the
/// leftmost on top. Each popped interval is probed against the index keys at
/// its ends; a surviving interval is either emitted (single mark) or split
/// into `coarse_index_granularity` chunks pushed right-to-left, so the
/// leftmost chunk is probed next and output stays in increasing order. The
/// chunks tile the interval from the right with `step = (len - 1) / g + 1`;
/// the leftmost chunk absorbs the remainder.
pub fn mark_ranges_from_pk_range(
    part: &DataPart,
    key_size: usize,
    condition: &KeyCondition,
    min_marks_for_seek: usize,
    coarse_index_granularity: usize,
) -> Vec<MarkRange> {
    let marks_count = part.marks_count;
    debug_assert!(coarse_index_granularity >= 1);
    debug_assert_eq!(part.index.len(), marks_count * key_size);

    let mut res: Vec<MarkRange> = Vec::new();
    if marks_count == 0 {
        return res;
    }

    if condition.always_true() {
        res.push(MarkRange::new(0, marks_count));
        return res;
    }

    let mut ranges_stack = vec![MarkRange::new(0, marks_count)];
    while let Some(range) = ranges_stack.pop() {
        let may_be_true = if range.end == marks_count {
            condition.may_be_true_after(part.index_key(range.begin, key_size))
        } else {
            condition.may_be_true_in_range(
                part.index_key(range.begin, key_size),
                part.index_key(range.end, key_size),
            )
        };

        if !may_be_true {
            continue;
        }

        if range.end == range.begin + 1 {
            push_coalesced(&mut res, range, min_marks_for_seek);
        } else {
            let step = (range.end - range.begin - 1) / coarse_index_granularity + 1;
            let mut end = range.end;
            while end > range.begin + step {
                ranges_stack.push(MarkRange::new(end - step, end));
                end -= step;
            }
            ranges_stack.push(MarkRange::new(range.begin, end));
        }
    }

    res
}

/// Append a single-mark hit: extend the last output range when the gap to
/// it is within the seek threshold, otherwise start a new range.
fn push_coalesced(res: &mut Vec<MarkRange>, range: MarkRange, min_marks_for_seek: usize) {
    match res.last_mut() {
        Some(last) if range.begin - last.end <= min_marks_for_seek => {
            last.end = range.end;
        }
        _ => res.push(range),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ColumnPredicate, Range};
    use crate::types::DataValue;

    /// A part whose single-column index holds `2 * mark + 7`, so the value
    /// 42 falls strictly inside mark 17.
    fn part(marks_count: usize) -> DataPart {
        DataPart {
            name: "all_1_1_0".into(),
            min_date: 0,
            max_date: 0,
            index: (0..marks_count)
                .map(|m| DataValue::UInt64(2 * m as u64 + 7))
                .collect(),
            marks_count,
            row_count: marks_count * 10,
        }
    }

    fn condition(range: Range) -> KeyCondition {
        KeyCondition::new(
            &["k".to_string()],
            &[ColumnPredicate::new("k", range)],
        )
    }

    #[test]
    fn always_true_emits_the_whole_part() {
        let part = part(256);
        let cond = KeyCondition::new(&["k".to_string()], &[]);
        let ranges = mark_ranges_from_pk_range(&part, 1, &cond, 0, 8);
        assert_eq!(ranges, vec![MarkRange::new(0, 256)]);
    }

    #[test]
    fn empty_part_yields_no_ranges() {
        let part = part(0);
        let cond = KeyCondition::new(&["k".to_string()], &[]);
        assert!(mark_ranges_from_pk_range(&part, 1, &cond, 0, 8).is_empty());
    }

    #[test]
    fn point_lookup_hits_a_single_mark() {
        let part = part(256);
        let cond = condition(Range::point(DataValue::UInt64(42)));
        let ranges = mark_ranges_from_pk_range(&part, 1, &cond, 0, 8);
        assert_eq!(ranges, vec![MarkRange::new(17, 18)]);
    }

    #[test]
    fn contiguous_hits_merge_into_one_range() {
        // Index value of mark m is 2m + 7: [17, 23] covers marks 5 through 8.
        let part = part(64);
        let cond = condition(Range::bounded(
            DataValue::UInt64(17),
            true,
            DataValue::UInt64(23),
            true,
        ));
        let ranges = mark_ranges_from_pk_range(&part, 1, &cond, 0, 8);
        assert_eq!(ranges, vec![MarkRange::new(5, 9)]);
    }

    #[test]
    fn gapped_hits_coalesce_only_within_the_seek_threshold() {
        // Hits [5, 6) and [7, 8) with a one-mark gap: a threshold of 2
        // bridges the gap, a threshold of 0 keeps the seek.
        let mut res = vec![MarkRange::new(5, 6)];
        push_coalesced(&mut res, MarkRange::new(7, 8), 2);
        assert_eq!(res, vec![MarkRange::new(5, 8)]);

        let mut res = vec![MarkRange::new(5, 6)];
        push_coalesced(&mut res, MarkRange::new(7, 8), 0);
        assert_eq!(res, vec![MarkRange::new(5, 6), MarkRange::new(7, 8)]);

        // Idempotence: re-appending the tail mark of the merged range's gap
        // region never splits or reorders what is already merged.
        let mut res = vec![MarkRange::new(5, 8)];
        push_coalesced(&mut res, MarkRange::new(8, 9), 2);
        assert_eq!(res, vec![MarkRange::new(5, 9)]);
    }

    #[test]
    fn output_is_sorted_disjoint_and_gapped() {
        let part = part(256);
        let cond = condition(Range::left_bounded(DataValue::UInt64(100), true));
        for min_marks_for_seek in [0, 2, 5] {
            let ranges =
                mark_ranges_from_pk_range(&part, 1, &cond, min_marks_for_seek, 8);
            for window in ranges.windows(2) {
                assert!(window[0].end < window[1].begin);
                assert!(window[1].begin - window[0].end > min_marks_for_seek);
            }
            for range in &ranges {
                assert!(range.end > range.begin);
            }
        }
    }

    #[test]
    fn every_matching_mark_is_covered() {
        let part = part(256);
        // Rows with k = 101 live in mark 47 ((2 * 47 + 7) = 101); the mark
        // before may share the boundary value and must also be covered by a
        // conservative index.
        let cond = condition(Range::point(DataValue::UInt64(101)));
        let ranges = mark_ranges_from_pk_range(&part, 1, &cond, 0, 8);
        assert!(ranges.iter().any(|r| r.begin <= 46 && 48 <= r.end));
    }
}
