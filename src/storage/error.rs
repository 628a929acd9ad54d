// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use std::backtrace::Backtrace;

use thiserror::Error;

use crate::types::PhysicalType;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),
    #[error("argument out of bound: {0}")]
    ArgumentOutOfBound(String),
    #[error("illegal column type for sampling filter: {1:?} ({0}), must be an unsigned integer type")]
    IllegalTypeForFilter(String, PhysicalType),
    #[error("sampling column {0} is not part of the primary key")]
    IllegalColumn(String),
    #[error("{0}({1}) not found")]
    NotFound(&'static str, String),
    #[error("{0} is not configured for this table")]
    NotConfigured(&'static str),
    #[error("logical error: {0}")]
    Logical(String),
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),
}

/// [`StorageError`] with backtrace.
pub struct TracedStorageError {
    source: StorageError,
    backtrace: Backtrace,
}

impl std::fmt::Display for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for TracedStorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl From<StorageError> for TracedStorageError {
    #[inline]
    fn from(source: StorageError) -> Self {
        Self {
            source,
            backtrace: Backtrace::capture(),
        }
    }
}

impl From<serde_json::Error> for TracedStorageError {
    #[inline]
    fn from(e: serde_json::Error) -> Self {
        StorageError::JsonDecode(e).into()
    }
}

impl std::fmt::Debug for TracedStorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\n{}", self.source, self.backtrace)
    }
}

impl TracedStorageError {
    pub fn unknown_column(name: impl ToString) -> Self {
        StorageError::UnknownColumn(name.to_string()).into()
    }

    pub fn argument(message: impl ToString) -> Self {
        StorageError::ArgumentOutOfBound(message.to_string()).into()
    }

    pub fn not_found(ty: &'static str, item: impl ToString) -> Self {
        StorageError::NotFound(ty, item.to_string()).into()
    }

    pub fn logical(message: impl ToString) -> Self {
        StorageError::Logical(message.to_string()).into()
    }

    /// The underlying error variant, for callers that match on the taxonomy.
    pub fn kind(&self) -> &StorageError {
        &self.source
    }
}

pub type StorageResult<T> = std::result::Result<T, TracedStorageError>;
