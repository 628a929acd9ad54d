// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Engine-level options of a table's storage.
///
/// The `*_rows_*` thresholds are expressed in rows and converted to marks
/// once per planner with `(rows + index_granularity - 1) / index_granularity`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageOptions {
    /// Root directory holding the part directories.
    pub path: PathBuf,

    /// Capacity of the uncompressed block cache, in blocks.
    pub cache_size: u64,

    /// Rows covered by one mark of the sparse index.
    pub index_granularity: usize,

    /// Ranges closer than this many rows are read through rather than
    /// seeked over.
    pub min_rows_for_seek: usize,

    /// Floor on the slice of rows one worker stream takes from a part.
    pub min_rows_for_concurrent_read: usize,

    /// Scans larger than this bypass the uncompressed cache.
    pub max_rows_to_use_cache: usize,

    /// Fan-out of the coarse index descent.
    pub coarse_index_granularity: usize,

    /// Seed for the part shuffle of the workload spreader. Fixed so plans
    /// are reproducible in tests; not part of the external contract.
    pub shuffle_seed: u64,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            path: PathBuf::from("marktree.db"),
            cache_size: 10240,
            index_granularity: 8192,
            min_rows_for_seek: 5 * 8192,
            min_rows_for_concurrent_read: 20 * 8192,
            max_rows_to_use_cache: 1024 * 8192,
            coarse_index_granularity: 8,
            shuffle_seed: 0x6d61726b74726565,
        }
    }
}

impl StorageOptions {
    pub fn default_for_test() -> Self {
        Self {
            path: PathBuf::from("marktree.test.db"),
            cache_size: 1024,
            index_granularity: 10,
            min_rows_for_seek: 0,
            min_rows_for_concurrent_read: 0,
            max_rows_to_use_cache: 1024 * 10,
            coarse_index_granularity: 8,
            shuffle_seed: 42,
        }
    }
}

/// Per-query settings the caller hands to the planner.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QuerySettings {
    pub use_uncompressed_cache: bool,
}
