// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Conservative key-interval predicates.
//!
//! A [`KeyCondition`] is a conjunction of per-column [`Range`]s over the
//! sort description. It answers "may any key in this interval satisfy the
//! predicate": false positives are allowed (they cost I/O), false negatives
//! are forbidden (they would drop rows). Incomparable values therefore keep
//! an interval suspicious instead of pruning it.

use std::cmp::Ordering;

use crate::types::DataValue;

/// An interval of values of one column, with optionally open ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    left: Option<DataValue>,
    left_included: bool,
    right: Option<DataValue>,
    right_included: bool,
}

impl Range {
    /// The whole value domain.
    pub fn all() -> Self {
        Self {
            left: None,
            left_included: false,
            right: None,
            right_included: false,
        }
    }

    /// A single value.
    pub fn point(value: DataValue) -> Self {
        Self {
            left: Some(value.clone()),
            left_included: true,
            right: Some(value),
            right_included: true,
        }
    }

    pub fn left_bounded(value: DataValue, included: bool) -> Self {
        Self {
            left: Some(value),
            left_included: included,
            right: None,
            right_included: false,
        }
    }

    pub fn right_bounded(value: DataValue, included: bool) -> Self {
        Self {
            left: None,
            left_included: false,
            right: Some(value),
            right_included: included,
        }
    }

    pub fn bounded(
        left: DataValue,
        left_included: bool,
        right: DataValue,
        right_included: bool,
    ) -> Self {
        Self {
            left: Some(left),
            left_included,
            right: Some(right),
            right_included,
        }
    }

    pub fn is_all(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// Whether `right` end falls strictly before `left` end. Unbounded or
    /// incomparable ends never separate.
    fn ends_before(
        right: &Option<DataValue>,
        right_included: bool,
        left: &Option<DataValue>,
        left_included: bool,
    ) -> bool {
        match (right, left) {
            (Some(r), Some(l)) => match r.partial_cmp(l) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => !(right_included && left_included),
                Some(Ordering::Greater) | None => false,
            },
            _ => false,
        }
    }

    /// Whether the two ranges share at least one value.
    pub fn intersects(&self, other: &Range) -> bool {
        !Self::ends_before(
            &self.right,
            self.right_included,
            &other.left,
            other.left_included,
        ) && !Self::ends_before(
            &other.right,
            other.right_included,
            &self.left,
            self.left_included,
        )
    }

    /// Intersection of two ranges: the tighter bound wins on each end.
    /// On incomparable bounds the left operand's end is kept, which widens
    /// the result and stays conservative.
    pub fn intersect(&self, other: &Range) -> Range {
        let (left, left_included) = Self::tighter_end(
            (&self.left, self.left_included),
            (&other.left, other.left_included),
            Ordering::Greater,
        );
        let (right, right_included) = Self::tighter_end(
            (&self.right, self.right_included),
            (&other.right, other.right_included),
            Ordering::Less,
        );
        Range {
            left,
            left_included,
            right,
            right_included,
        }
    }

    fn tighter_end(
        (a, a_included): (&Option<DataValue>, bool),
        (b, b_included): (&Option<DataValue>, bool),
        wins: Ordering,
    ) -> (Option<DataValue>, bool) {
        match (a, b) {
            (None, _) => (b.clone(), b_included),
            (_, None) => (a.clone(), a_included),
            (Some(av), Some(bv)) => match av.partial_cmp(bv) {
                Some(o) if o == wins => (a.clone(), a_included),
                Some(Ordering::Equal) => (a.clone(), a_included && b_included),
                Some(_) => (b.clone(), b_included),
                None => (a.clone(), a_included),
            },
        }
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.left {
            Some(v) => write!(f, "{}{}", if self.left_included { '[' } else { '(' }, v)?,
            None => write!(f, "(-inf")?,
        }
        write!(f, ", ")?;
        match &self.right {
            Some(v) => write!(f, "{}{}", v, if self.right_included { ']' } else { ')' }),
            None => write!(f, "+inf)"),
        }
    }
}

/// One conjunct of a query predicate: a column restricted to a range.
#[derive(Debug, Clone)]
pub struct ColumnPredicate {
    pub column: String,
    pub range: Range,
}

impl ColumnPredicate {
    pub fn new(column: impl Into<String>, range: Range) -> Self {
        Self {
            column: column.into(),
            range,
        }
    }
}

/// A compiled predicate over a sort description.
///
/// Predicates on columns outside the sort description are dropped here; they
/// are still applied row-wise downstream, the index just cannot help them.
#[derive(Debug, Clone)]
pub struct KeyCondition {
    key_columns: Vec<String>,
    ranges: Vec<Range>,
}

impl KeyCondition {
    pub fn new(sort_description: &[String], predicates: &[ColumnPredicate]) -> Self {
        let mut ranges = vec![Range::all(); sort_description.len()];
        for predicate in predicates {
            if let Some(idx) = sort_description.iter().position(|c| *c == predicate.column) {
                let tightened = ranges[idx].intersect(&predicate.range);
                ranges[idx] = tightened;
            }
        }
        Self {
            key_columns: sort_description.to_vec(),
            ranges,
        }
    }

    /// Arity of the key this condition is built over.
    pub fn key_size(&self) -> usize {
        self.key_columns.len()
    }

    /// Whether the condition restricts nothing and the index is useless.
    pub fn always_true(&self) -> bool {
        self.ranges.iter().all(Range::is_all)
    }

    /// Whether a key in `[left, right]` may satisfy the condition. Both
    /// bounds are inclusive: adjacent marks can share boundary key values.
    ///
    /// Column `k` only varies freely once some earlier column differs
    /// between the two bounds, so deeper columns are checked only while the
    /// bound prefixes stay equal.
    pub fn may_be_true_in_range(&self, left: &[DataValue], right: &[DataValue]) -> bool {
        debug_assert_eq!(left.len(), self.key_size());
        debug_assert_eq!(right.len(), self.key_size());
        for i in 0..self.key_size() {
            let values = Range::bounded(left[i].clone(), true, right[i].clone(), true);
            if !self.ranges[i].intersects(&values) {
                return false;
            }
            if left[i] != right[i] {
                break;
            }
        }
        true
    }

    /// Whether a key at or beyond `left` may satisfy the condition. Used for
    /// the rightmost mark interval, which has no upper bound. Only the first
    /// key column is constrained; deeper columns vary freely past `left`.
    pub fn may_be_true_after(&self, left: &[DataValue]) -> bool {
        debug_assert_eq!(left.len(), self.key_size());
        if self.key_size() == 0 {
            return true;
        }
        let values = Range::left_bounded(left[0].clone(), true);
        self.ranges[0].intersects(&values)
    }

    /// Return a copy of the condition with `range` added on `column`, or
    /// `None` when the column is not part of the key and the index cannot
    /// enforce the new conjunct.
    pub fn tighten(&self, column: &str, range: &Range) -> Option<KeyCondition> {
        let idx = self.key_columns.iter().position(|c| c == column)?;
        let mut tightened = self.clone();
        tightened.ranges[idx] = tightened.ranges[idx].intersect(range);
        Some(tightened)
    }
}

impl std::fmt::Display for KeyCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.always_true() {
            return write!(f, "true");
        }
        let mut first = true;
        for (column, range) in self.key_columns.iter().zip(&self.ranges) {
            if range.is_all() {
                continue;
            }
            if !first {
                write!(f, " and ")?;
            }
            write!(f, "{column} in {range}")?;
            first = false;
        }
        Ok(())
    }
}
