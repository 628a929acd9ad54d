// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::sync::Arc;

use bitvec::prelude::BitVec;
use smallvec::SmallVec;

use crate::array::ArrayImpl;

pub type PackedVec<T> = SmallVec<[T; 16]>;

/// A batch of named columns flowing through the read pipeline, with an
/// optional visibility map. Filter stages mask rows by clearing visibility
/// bits instead of copying the arrays; [`Block::compact`] materializes the
/// surviving rows.
#[derive(Debug, Clone)]
pub struct Block {
    names: PackedVec<String>,

    arrays: PackedVec<Arc<ArrayImpl>>,

    /// If a row is visible in this block. `None` means all rows are.
    visibility: Option<BitVec>,

    /// Number of visible rows.
    cardinality: usize,
}

impl Block {
    pub fn new(columns: impl IntoIterator<Item = (String, Arc<ArrayImpl>)>) -> Self {
        let (names, arrays): (PackedVec<_>, PackedVec<_>) = columns.into_iter().unzip();
        assert!(!arrays.is_empty());
        let first_length = arrays[0].len();
        for array in &arrays {
            assert_eq!(first_length, array.len());
        }
        Self {
            names,
            arrays,
            visibility: None,
            cardinality: first_length,
        }
    }

    /// Number of physical rows, visible or not.
    pub fn row_count(&self) -> usize {
        self.arrays[0].len()
    }

    /// Number of visible rows.
    pub fn cardinality(&self) -> usize {
        self.cardinality
    }

    pub fn column_count(&self) -> usize {
        self.arrays.len()
    }

    pub fn array_at(&self, idx: usize) -> &Arc<ArrayImpl> {
        &self.arrays[idx]
    }

    pub fn name_at(&self, idx: usize) -> &str {
        &self.names[idx]
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column_by_name(&self, name: &str) -> Option<&Arc<ArrayImpl>> {
        self.column_index(name).map(|idx| &self.arrays[idx])
    }

    pub fn visibility(&self) -> Option<&BitVec> {
        self.visibility.as_ref()
    }

    pub fn is_row_visible(&self, idx: usize) -> bool {
        match &self.visibility {
            Some(visibility) => visibility[idx],
            None => true,
        }
    }

    /// Append a column. Panics on length mismatch with the existing columns.
    pub fn push_column(&mut self, name: String, array: Arc<ArrayImpl>) {
        assert_eq!(array.len(), self.row_count());
        self.names.push(name);
        self.arrays.push(array);
    }

    /// Intersect the visibility map with `mask`.
    pub fn mask_rows(&mut self, mask: BitVec) {
        assert_eq!(mask.len(), self.row_count());
        let visibility: BitVec = match self.visibility.take() {
            Some(previous) => previous
                .iter()
                .by_vals()
                .zip(mask.iter().by_vals())
                .map(|(a, b)| a && b)
                .collect(),
            None => mask,
        };
        self.cardinality = visibility.count_ones();
        self.visibility = Some(visibility);
    }

    /// Materialize the visible rows into a block without a visibility map.
    pub fn compact(&self) -> Block {
        match &self.visibility {
            Some(visibility) => Block::new(
                self.names.iter().cloned().zip(
                    self.arrays
                        .iter()
                        .map(|a| Arc::new(a.filter(visibility.iter().by_vals()))),
                ),
            ),
            None => self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use bitvec::prelude::*;

    use super::*;
    use crate::array::ArrayImpl;

    fn block() -> Block {
        Block::new([
            ("k".to_string(), Arc::new(ArrayImpl::from(vec![1u64, 2, 3]))),
            ("sign".to_string(), Arc::new(ArrayImpl::from(vec![1i8, -1, 1]))),
        ])
    }

    #[test]
    fn masking_reduces_cardinality() {
        let mut block = block();
        assert_eq!(block.cardinality(), 3);
        block.mask_rows(bitvec![1, 0, 1]);
        assert_eq!(block.cardinality(), 2);
        assert_eq!(block.row_count(), 3);
        block.mask_rows(bitvec![1, 1, 0]);
        assert_eq!(block.cardinality(), 1);
    }

    #[test]
    fn compact_drops_hidden_rows() {
        let mut block = block();
        block.mask_rows(bitvec![0, 1, 1]);
        let compacted = block.compact();
        assert_eq!(compacted.row_count(), 2);
        assert_eq!(
            **compacted.column_by_name("k").unwrap(),
            ArrayImpl::from(vec![2u64, 3])
        );
    }
}
