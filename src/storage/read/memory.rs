// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! An in-memory part reader.
//!
//! Parts are registered as full-length columns; the reader serves mark
//! ranges in block-sized windows, evaluates PREWHERE before touching any
//! non-PREWHERE column, and routes column slices through the uncompressed
//! block cache when the plan allows it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bitvec::prelude::BitVec;
use moka::future::Cache;
use parking_lot::RwLock;

use super::stream::{BlockStream, BoxBlockStream, PartReadOptions, PartReaderFactory};
use crate::array::{Array, ArrayImpl};
use crate::storage::{Block, StorageResult, TracedStorageError};

/// Full-length columns of one registered part.
pub struct MemoryPartData {
    columns: Vec<(String, Arc<ArrayImpl>)>,
}

impl MemoryPartData {
    pub fn new(columns: impl IntoIterator<Item = (String, ArrayImpl)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, array)| (name, Arc::new(array)))
                .collect(),
        }
    }

    fn column(&self, name: &str) -> Option<&Arc<ArrayImpl>> {
        self.columns
            .iter()
            .find_map(|(n, array)| (n == name).then_some(array))
    }
}

type SliceCacheKey = (String, String, usize, usize);

/// Registry of in-memory parts and constructor of their readers.
pub struct MemoryPartReaderFactory {
    parts: RwLock<HashMap<String, Arc<MemoryPartData>>>,
    cache: Cache<SliceCacheKey, Arc<ArrayImpl>>,
    index_granularity: usize,
}

impl MemoryPartReaderFactory {
    pub fn new(index_granularity: usize, cache_size: u64) -> Self {
        Self {
            parts: RwLock::new(HashMap::new()),
            cache: Cache::new(cache_size),
            index_granularity,
        }
    }

    pub fn add_part(&self, name: impl Into<String>, data: MemoryPartData) {
        self.parts.write().insert(name.into(), Arc::new(data));
    }
}

impl PartReaderFactory for MemoryPartReaderFactory {
    fn create_reader(&self, options: PartReadOptions) -> BoxBlockStream {
        let data = self.parts.read().get(&options.part.name).cloned();
        Box::new(MemoryPartReader {
            data,
            cache: self.cache.clone(),
            index_granularity: self.index_granularity,
            row: options.ranges.first().map_or(0, |r| r.begin) * self.index_granularity,
            range_idx: 0,
            options,
        })
    }
}

struct MemoryPartReader {
    data: Option<Arc<MemoryPartData>>,
    cache: Cache<SliceCacheKey, Arc<ArrayImpl>>,
    index_granularity: usize,
    options: PartReadOptions,
    /// Next row to serve, in part coordinates; valid within the current
    /// range.
    row: usize,
    range_idx: usize,
}

impl MemoryPartReader {
    async fn fetch(
        &self,
        data: &MemoryPartData,
        name: &str,
        begin: usize,
        end: usize,
    ) -> StorageResult<Arc<ArrayImpl>> {
        let source = data
            .column(name)
            .ok_or_else(|| TracedStorageError::unknown_column(name))?
            .clone();
        if !self.options.use_uncompressed_cache {
            return Ok(Arc::new(source.slice(begin..end)));
        }
        let key = (self.options.part.name.clone(), name.to_string(), begin, end);
        Ok(self
            .cache
            .get_with(key, async move { Arc::new(source.slice(begin..end)) })
            .await)
    }
}

#[async_trait]
impl BlockStream for MemoryPartReader {
    async fn next_block(&mut self) -> StorageResult<Option<Block>> {
        let data = self
            .data
            .clone()
            .ok_or_else(|| TracedStorageError::not_found("part", &self.options.part.name))?;

        loop {
            let Some(range) = self.options.ranges.get(self.range_idx).copied() else {
                return Ok(None);
            };
            let range_end = (range.end * self.index_granularity).min(self.options.part.row_count);
            if self.row >= range_end {
                self.range_idx += 1;
                if let Some(next) = self.options.ranges.get(self.range_idx) {
                    self.row = next.begin * self.index_granularity;
                }
                continue;
            }

            let begin = self.row;
            let end = (begin + self.options.max_block_size).min(range_end);
            self.row = end;

            // PREWHERE first: its columns decide which rows survive before
            // the rest of the read set is materialized.
            let mut columns: Vec<(String, Arc<ArrayImpl>)> = Vec::new();
            let mask = if let Some(prewhere) = self.options.prewhere.clone() {
                for name in prewhere.actions.required_columns() {
                    columns.push((name.clone(), self.fetch(&data, &name, begin, end).await?));
                }
                let probe = Block::new(columns.clone());
                let flags = prewhere.actions.eval(&probe)?;
                let ArrayImpl::Bool(flags) = flags.as_ref() else {
                    return Err(TracedStorageError::logical(
                        "PREWHERE expression is not boolean",
                    ));
                };
                let mask: BitVec = flags.iter().collect();
                if mask.count_ones() == 0 {
                    continue;
                }
                Some((mask, prewhere.column, Arc::new(ArrayImpl::Bool(flags.clone()))))
            } else {
                None
            };

            for name in &self.options.column_names {
                if columns.iter().any(|(n, _)| n == name) {
                    continue;
                }
                columns.push((name.clone(), self.fetch(&data, name, begin, end).await?));
            }

            let mut block = Block::new(columns);
            if let Some((mask, prewhere_column, flags)) = mask {
                if block.column_by_name(&prewhere_column).is_none() {
                    block.push_column(prewhere_column, flags);
                }
                block.mask_rows(mask);
            }
            return Ok(Some(block));
        }
    }
}
