// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Read planner for a mark-granular, date-partitioned, primary-key-sorted
//! columnar storage engine.
//!
//! Tables are stored as immutable, date-partitioned *parts*, each sorted by
//! a compound primary key and covered by a sparse in-memory mark index. The
//! [`storage::read::ReadExecutor`] turns a select-style query into a set of block
//! streams: it prunes parts by date envelope, turns the key predicate into
//! mark ranges through the sparse index, rewrites the plan for uniform
//! sampling, spreads the mark workload across worker streams, and wires the
//! FINAL sign-collapsing path when asked for a deduplicated view.

#![deny(unused_must_use)]

pub mod array;
pub mod catalog;
pub mod expr;
pub mod storage;
pub mod types;
