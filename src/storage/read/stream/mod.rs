// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Block streams and their composers.
//!
//! A plan is a vector of [`BoxBlockStream`]s the caller pulls independently;
//! each stream is a rooted tree of composers over part readers. Part readers
//! themselves live behind [`PartReaderFactory`]: the planner only decides
//! what to read, not how.

mod collapsing;
mod concat;
mod expression;
mod filter;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

pub use collapsing::CollapsingFinalStream;
pub use concat::ConcatStream;
pub use expression::ExpressionStream;
pub use filter::FilterStream;

use crate::expr::Expr;
use crate::storage::{Block, DataPart, MarkRange, StorageResult};

/// A pull-based stream of blocks.
#[async_trait]
pub trait BlockStream: Send {
    /// Fetch the next block, or `None` when the stream is exhausted.
    async fn next_block(&mut self) -> StorageResult<Option<Block>>;
}

pub type BoxBlockStream = Box<dyn BlockStream>;

/// A compiled PREWHERE clause: the expression evaluated by the part reader
/// before any non-PREWHERE column is fetched, and the name of the boolean
/// column it produces.
#[derive(Debug, Clone)]
pub struct PrewhereInfo {
    pub actions: Arc<Expr>,
    pub column: String,
}

/// Everything a part reader needs to read one slice of one part.
#[derive(Debug, Clone)]
pub struct PartReadOptions {
    /// Directory of the part on disk.
    pub path: PathBuf,
    /// Handle keeping the part alive for the lifetime of the reader.
    pub part: Arc<DataPart>,
    /// Mark ranges to read, in increasing order.
    pub ranges: Vec<MarkRange>,
    /// Columns to materialize, in output order.
    pub column_names: Vec<String>,
    /// Target block row count.
    pub max_block_size: usize,
    /// Whether reads may go through the uncompressed block cache.
    pub use_uncompressed_cache: bool,
    pub prewhere: Option<PrewhereInfo>,
}

/// Constructor of part readers, implemented by the block reader subsystem.
pub trait PartReaderFactory: Send + Sync {
    fn create_reader(&self, options: PartReadOptions) -> BoxBlockStream;
}
