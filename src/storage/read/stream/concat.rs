// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use async_trait::async_trait;

use super::{BlockStream, BoxBlockStream};
use crate::storage::{Block, StorageResult};

/// [`ConcatStream`] drains its children one after another. It is used for
/// the slices a worker reads sequentially; the children never overlap.
pub struct ConcatStream {
    streams: Vec<BoxBlockStream>,
    current: usize,
}

impl ConcatStream {
    pub fn new(streams: Vec<BoxBlockStream>) -> Self {
        Self {
            streams,
            current: 0,
        }
    }
}

#[async_trait]
impl BlockStream for ConcatStream {
    async fn next_block(&mut self) -> StorageResult<Option<Block>> {
        loop {
            if self.current >= self.streams.len() {
                return Ok(None);
            }
            if let Some(block) = self.streams[self.current].next_block().await? {
                return Ok(Some(block));
            }
            self.current += 1;
        }
    }
}
