// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use async_trait::async_trait;
use bitvec::prelude::BitVec;

use super::{BlockStream, BoxBlockStream};
use crate::array::{Array, ArrayImpl};
use crate::storage::{Block, StorageResult, TracedStorageError};

/// [`FilterStream`] masks out the rows whose value in the named boolean
/// column is false. The mask goes into the block's visibility map; rows are
/// not copied. Blocks left with no visible rows are skipped.
pub struct FilterStream {
    input: BoxBlockStream,
    filter_column: String,
}

impl FilterStream {
    pub fn new(input: BoxBlockStream, filter_column: impl Into<String>) -> Self {
        Self {
            input,
            filter_column: filter_column.into(),
        }
    }
}

#[async_trait]
impl BlockStream for FilterStream {
    async fn next_block(&mut self) -> StorageResult<Option<Block>> {
        loop {
            let Some(mut block) = self.input.next_block().await? else {
                return Ok(None);
            };
            let column = block
                .column_by_name(&self.filter_column)
                .ok_or_else(|| TracedStorageError::unknown_column(&self.filter_column))?;
            let ArrayImpl::Bool(flags) = column.as_ref() else {
                return Err(TracedStorageError::logical(format!(
                    "filter column {} is not boolean",
                    self.filter_column
                )));
            };
            let mask: BitVec = flags.iter().collect();
            block.mask_rows(mask);
            if block.cardinality() > 0 {
                return Ok(Some(block));
            }
        }
    }
}
