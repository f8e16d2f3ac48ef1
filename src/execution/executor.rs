use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::market::Side;
use crate::models::order::OrderRef;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("venue rejected order: {0}")]
    Rejected(String),
    #[error("venue call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// The boundary capability between the core and a venue, per §4.6.
/// Polymorphic over paper and live variants — the core only ever holds a
/// `dyn OrderExecutor`. Exit failures are logged by the caller and the
/// position is persisted anyway (the core records its closing intent; a
/// reconciler outside this core resolves any residual venue-side state).
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn buy(
        &self,
        side: Side,
        token_id: &str,
        limit_price: Decimal,
        size: Decimal,
    ) -> Result<OrderRef, ExecutorError>;

    async fn sell(
        &self,
        side: Side,
        token_id: &str,
        limit_price: Decimal,
        size: Decimal,
    ) -> Result<OrderRef, ExecutorError>;

    async fn cancel(&self, order_ref: &OrderRef) -> Result<(), ExecutorError>;

    /// Resting order ids currently open at the venue, if the adapter tracks
    /// any. Optional per spec.md §4.6 — the default is an empty list rather
    /// than an error, since most adapters (the paper one included) have
    /// nothing meaningful to report here.
    async fn open_orders(&self) -> Result<Vec<OrderRef>, ExecutorError> {
        Ok(Vec::new())
    }
}
