// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

//! Executable expression actions.
//!
//! The read path only ever builds two shapes itself: `column <= literal`
//! for the sampling filter and `column = literal` for the positive-sign
//! filter. PREWHERE additionally hands arbitrary trees of the same three
//! node kinds through the planner into the part readers.

use std::sync::Arc;

use crate::array::{ArrayBuilderImpl, ArrayImpl};
use crate::storage::{Block, StorageError, StorageResult, TracedStorageError};
use crate::types::DataValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    LtEq,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::LtEq => "<=",
        }
    }

    fn apply(self, left: &DataValue, right: &DataValue) -> StorageResult<bool> {
        let ordering = left
            .partial_cmp(right)
            .ok_or_else(|| TracedStorageError::from(StorageError::Logical(format!(
                "cannot compare {left:?} with {right:?}"
            ))))?;
        Ok(match self {
            Self::Eq => ordering.is_eq(),
            Self::LtEq => ordering.is_le(),
        })
    }
}

/// An executable expression over the columns of a [`Block`].
#[derive(Debug, Clone)]
pub enum Expr {
    ColumnRef(String),
    Literal(DataValue),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::ColumnRef(name.into())
    }

    pub fn literal(value: DataValue) -> Expr {
        Expr::Literal(value)
    }

    pub fn less_or_equals(left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op: BinaryOp::LtEq,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn equals(left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op: BinaryOp::Eq,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// The rendered name of the expression, which is also the name of the
    /// column it evaluates into.
    pub fn name(&self) -> String {
        match self {
            Expr::ColumnRef(name) => name.clone(),
            Expr::Literal(value) => value.to_string(),
            Expr::Binary { op, left, right } => {
                format!("{} {} {}", left.name(), op.symbol(), right.name())
            }
        }
    }

    /// Names of the columns the expression reads, sorted and deduplicated.
    pub fn required_columns(&self) -> Vec<String> {
        fn collect(expr: &Expr, out: &mut Vec<String>) {
            match expr {
                Expr::ColumnRef(name) => out.push(name.clone()),
                Expr::Literal(_) => {}
                Expr::Binary { left, right, .. } => {
                    collect(left, out);
                    collect(right, out);
                }
            }
        }
        let mut columns = Vec::new();
        collect(self, &mut columns);
        columns.sort();
        columns.dedup();
        columns
    }

    /// Evaluate the expression over every physical row of the block.
    pub fn eval(&self, block: &Block) -> StorageResult<Arc<ArrayImpl>> {
        match self {
            Expr::ColumnRef(name) => block
                .column_by_name(name)
                .cloned()
                .ok_or_else(|| TracedStorageError::unknown_column(name)),
            Expr::Literal(value) => {
                let mut builder = ArrayBuilderImpl::for_value(value, block.row_count());
                for _ in 0..block.row_count() {
                    builder.push(value);
                }
                Ok(Arc::new(builder.finish()))
            }
            Expr::Binary { op, left, right } => {
                let left = left.eval(block)?;
                let right = right.eval(block)?;
                let mut result = Vec::with_capacity(block.row_count());
                for idx in 0..block.row_count() {
                    result.push(op.apply(&left.get(idx), &right.get(idx))?);
                }
                Ok(Arc::new(ArrayImpl::Bool(result.into())))
            }
        }
    }
}
