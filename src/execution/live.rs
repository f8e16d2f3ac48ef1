use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::execution::batch_submitter::BatchSubmitter;
use crate::execution::executor::{ExecutorError, OrderExecutor};
use crate::models::market::Side;
use crate::models::order::{OrderIntent, OrderRef, OrderSide, OrderType};

/// Live execution against the venue's CLOB. Builds a single-order batch
/// and submits it through `BatchSubmitter`, which owns the signing and
/// network round-trip — kept unchanged from the teacher's execution
/// layer, since the EIP-712 signing and CLOB auth details are out of this
/// core's scope per spec.md §1 ("the core sees only an OrderExecutor
/// capability").
pub struct LiveExecutor {
    submitter: BatchSubmitter,
}

impl LiveExecutor {
    pub fn new(submitter: BatchSubmitter) -> Self {
        Self { submitter }
    }

    async fn submit_one(
        &self,
        market_side: Side,
        order_side: OrderSide,
        token_id: &str,
        limit_price: Decimal,
        size: Decimal,
    ) -> Result<OrderRef, ExecutorError> {
        let intent = OrderIntent {
            token_id: token_id.to_string(),
            market_side,
            order_side,
            price: limit_price,
            size,
            order_type: OrderType::FAK,
            post_only: false,
            expiration: None,
            strategy_tag: String::new(),
        };

        let results = self
            .submitter
            .submit(&[intent])
            .await
            .map_err(ExecutorError::Transport)?;

        let result = results
            .into_iter()
            .next()
            .ok_or_else(|| ExecutorError::Rejected("no result returned from batch".into()))?;

        if !result.is_success() {
            let msg = result.error_msg.clone().unwrap_or_else(|| "rejected".into());
            return Err(ExecutorError::Rejected(msg));
        }

        Ok(OrderRef::from(result))
    }
}

#[async_trait]
impl OrderExecutor for LiveExecutor {
    async fn buy(
        &self,
        side: Side,
        token_id: &str,
        limit_price: Decimal,
        size: Decimal,
    ) -> Result<OrderRef, ExecutorError> {
        self.submit_one(side, OrderSide::Buy, token_id, limit_price, size)
            .await
    }

    async fn sell(
        &self,
        side: Side,
        token_id: &str,
        limit_price: Decimal,
        size: Decimal,
    ) -> Result<OrderRef, ExecutorError> {
        self.submit_one(side, OrderSide::Sell, token_id, limit_price, size)
            .await
    }

    async fn cancel(&self, order_ref: &OrderRef) -> Result<(), ExecutorError> {
        self.submitter
            .cancel_order(&order_ref.0)
            .await
            .map_err(ExecutorError::Transport)
    }

    async fn open_orders(&self) -> Result<Vec<OrderRef>, ExecutorError> {
        let ids = self
            .submitter
            .open_orders()
            .await
            .map_err(ExecutorError::Transport)?;
        Ok(ids.into_iter().map(OrderRef).collect())
    }
}
