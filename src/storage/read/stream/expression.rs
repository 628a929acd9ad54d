// Copyright 2024 RisingLight Project Authors. Licensed under Apache-2.0.

use async_trait::async_trait;

use super::{BlockStream, BoxBlockStream};
use crate::expr::Expr;
use crate::storage::{Block, StorageResult};

/// [`ExpressionStream`] appends the result column of each expression to
/// every block flowing through it. A column that already exists, such as a
/// plain column reference in a sort-key projection, is left as is.
pub struct ExpressionStream {
    input: BoxBlockStream,
    exprs: Vec<Expr>,
}

impl ExpressionStream {
    pub fn new(input: BoxBlockStream, exprs: Vec<Expr>) -> Self {
        Self { input, exprs }
    }
}

#[async_trait]
impl BlockStream for ExpressionStream {
    async fn next_block(&mut self) -> StorageResult<Option<Block>> {
        let Some(mut block) = self.input.next_block().await? else {
            return Ok(None);
        };
        for expr in &self.exprs {
            let name = expr.name();
            if block.column_by_name(&name).is_none() {
                let array = expr.eval(&block)?;
                block.push_column(name, array);
            }
        }
        Ok(Some(block))
    }
}
