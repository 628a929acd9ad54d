// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use async_trait::async_trait;

use super::{BlockStream, BoxBlockStream};
use crate::array::ArrayBuilderImpl;
use crate::storage::{Block, StorageResult, TracedStorageError};
use crate::types::DataValue;

/// One pending row of one input stream. Entries carry their sort key so the
/// heap can order rows without borrowing the chunk buffers.
struct HeapEntry {
    key: Vec<DataValue>,
    stream: usize,
    row: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        for (left, right) in self.key.iter().zip(&other.key) {
            match left.partial_cmp(right) {
                Some(Ordering::Equal) => continue,
                Some(ordering) => return ordering,
                None => panic!("sort key columns disagree on type across streams"),
            }
        }
        // Equal keys pop in stream order, so the newest part's row is seen
        // last and supplies the surviving representative.
        (self.stream, self.row).cmp(&(other.stream, other.row))
    }
}

/// [`CollapsingFinalStream`] merges per-part streams ordered by the sort
/// key and collapses each run of rows sharing a key tuple into at most one
/// row: the last positive-sign row of the run, kept only when the run's net
/// sign is positive.
///
/// Every input must carry the full sort key and the sign column; one block
/// per input is buffered at a time and rows hidden by a visibility map are
/// skipped.
pub struct CollapsingFinalStream {
    inputs: Vec<BoxBlockStream>,
    buffers: Vec<Option<Block>>,
    finished: Vec<bool>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
    sort_columns: Vec<String>,
    sign_column: String,
    max_block_size: usize,

    /// Sort key of the run being folded, with its running net sign and the
    /// last positive-sign row seen.
    current_key: Option<Vec<DataValue>>,
    sign_sum: i64,
    candidate: Option<Vec<DataValue>>,

    /// First block seen, kept as the schema template for output building.
    template: Option<Block>,
}

impl CollapsingFinalStream {
    pub fn new(
        inputs: Vec<BoxBlockStream>,
        sort_columns: Vec<String>,
        sign_column: impl Into<String>,
        max_block_size: usize,
    ) -> Self {
        let n = inputs.len();
        Self {
            inputs,
            buffers: (0..n).map(|_| None).collect(),
            finished: vec![false; n],
            heap: BinaryHeap::new(),
            sort_columns,
            sign_column: sign_column.into(),
            max_block_size,
            current_key: None,
            sign_sum: 0,
            candidate: None,
            template: None,
        }
    }

    fn key_of(&self, block: &Block, row: usize) -> StorageResult<Vec<DataValue>> {
        self.sort_columns
            .iter()
            .map(|name| {
                block
                    .column_by_name(name)
                    .map(|array| array.get(row))
                    .ok_or_else(|| TracedStorageError::unknown_column(name))
            })
            .collect()
    }

    fn sign_of(&self, block: &Block, row: usize) -> StorageResult<i64> {
        let column = block
            .column_by_name(&self.sign_column)
            .ok_or_else(|| TracedStorageError::unknown_column(&self.sign_column))?;
        match column.get(row) {
            DataValue::Int8(sign) => Ok(sign as i64),
            other => Err(TracedStorageError::logical(format!(
                "sign column {} holds {other:?}, expected Int8",
                self.sign_column
            ))),
        }
    }

    fn next_visible_row(block: &Block, from: usize) -> Option<usize> {
        (from..block.row_count()).find(|idx| block.is_row_visible(*idx))
    }

    /// Pull blocks from input `idx` until one with a visible row arrives,
    /// buffer it and enqueue its first visible row.
    async fn refill(&mut self, idx: usize) -> StorageResult<()> {
        if self.finished[idx] {
            return Ok(());
        }
        loop {
            match self.inputs[idx].next_block().await? {
                Some(block) => {
                    let Some(row) = Self::next_visible_row(&block, 0) else {
                        continue;
                    };
                    let key = self.key_of(&block, row)?;
                    if self.template.is_none() {
                        self.template = Some(block.clone());
                    }
                    self.buffers[idx] = Some(block);
                    self.heap.push(Reverse(HeapEntry {
                        key,
                        stream: idx,
                        row,
                    }));
                    return Ok(());
                }
                None => {
                    self.finished[idx] = true;
                    return Ok(());
                }
            }
        }
    }

    /// Finish the current run: the collapsed row, if its net sign is
    /// positive.
    fn close_run(&mut self) -> Option<Vec<DataValue>> {
        let candidate = self.candidate.take();
        let emit = if self.sign_sum > 0 { candidate } else { None };
        self.sign_sum = 0;
        emit
    }

    fn build_block(&self, rows: Vec<Vec<DataValue>>) -> Block {
        let template = self.template.as_ref().expect("rows imply a template");
        let columns = (0..template.column_count()).map(|col| {
            let mut builder =
                ArrayBuilderImpl::from_type_of_array(template.array_at(col), rows.len());
            for row in &rows {
                builder.push(&row[col]);
            }
            (
                template.name_at(col).to_string(),
                Arc::new(builder.finish()),
            )
        });
        Block::new(columns.collect::<Vec<_>>())
    }
}

#[async_trait]
impl BlockStream for CollapsingFinalStream {
    async fn next_block(&mut self) -> StorageResult<Option<Block>> {
        for idx in 0..self.inputs.len() {
            if self.buffers[idx].is_none() {
                self.refill(idx).await?;
            }
        }

        let mut rows: Vec<Vec<DataValue>> = Vec::new();
        loop {
            let Some(Reverse(entry)) = self.heap.pop() else {
                if let Some(row) = self.close_run() {
                    rows.push(row);
                }
                self.current_key = None;
                break;
            };

            if self.current_key.as_ref() != Some(&entry.key) {
                if let Some(row) = self.close_run() {
                    rows.push(row);
                }
                self.current_key = Some(entry.key.clone());
            }

            let next_entry = {
                let block = self.buffers[entry.stream]
                    .as_ref()
                    .ok_or_else(|| TracedStorageError::logical("heap entry without a buffer"))?;
                let sign = self.sign_of(block, entry.row)?;
                self.sign_sum += sign;
                if sign > 0 {
                    self.candidate = Some(
                        (0..block.column_count())
                            .map(|col| block.array_at(col).get(entry.row))
                            .collect(),
                    );
                }
                Self::next_visible_row(block, entry.row + 1).map(|row| {
                    self.key_of(block, row).map(|key| HeapEntry {
                        key,
                        stream: entry.stream,
                        row,
                    })
                })
            };

            match next_entry {
                Some(next) => self.heap.push(Reverse(next?)),
                None => {
                    self.buffers[entry.stream] = None;
                    self.refill(entry.stream).await?;
                }
            }

            if rows.len() >= self.max_block_size {
                break;
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.build_block(rows)))
    }
}
