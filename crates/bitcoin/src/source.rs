use async_trait::async_trait;
use satshop_core::AppError;

use crate::decoder::{ReceivedPayment, decode_receive};
use crate::rpc::NodeClient;

/// Payments reported since a cursor, plus the cursor for the next call.
#[derive(Debug, Clone, Default)]
pub struct PaymentBatch {
    pub payments: Vec<ReceivedPayment>,
    pub next_cursor: String,
}

/// Where the chain observer learns about incoming payments.
#[async_trait]
pub trait PaymentSource: Send + Sync {
    /// Payments since `cursor`. Anything with fewer than `target_confirmations`
    /// must be reported again when called with the returned cursor.
    async fn payments_since(
        &self,
        cursor: Option<&str>,
        target_confirmations: u32,
    ) -> Result<PaymentBatch, AppError>;

    /// Start tracking payments to `address`, including those made since `since`
    /// (unix seconds). Repeating the call is harmless.
    async fn watch_address(&self, address: &str, label: &str, since: i64) -> Result<(), AppError>;
}

#[async_trait]
impl PaymentSource for NodeClient {
    async fn payments_since(
        &self,
        cursor: Option<&str>,
        target_confirmations: u32,
    ) -> Result<PaymentBatch, AppError> {
        let listed = self.list_since_block(cursor, target_confirmations).await?;
        let payments = listed
            .transactions
            .iter()
            .filter_map(decode_receive)
            .collect();

        Ok(PaymentBatch {
            payments,
            next_cursor: listed.lastblock,
        })
    }

    async fn watch_address(&self, address: &str, label: &str, since: i64) -> Result<(), AppError> {
        self.import_address(address, label, since).await
    }
}
