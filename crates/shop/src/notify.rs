use async_trait::async_trait;
use rust_decimal::Decimal;
use satshop_core::AppError;

/// A deposit that has just been credited.
#[derive(Debug, Clone, PartialEq)]
pub struct CreditNotice {
    pub user_id: i64,
    pub txid: String,
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Outbound channel for user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deposit_credited(&self, notice: &CreditNotice) -> Result<(), AppError>;
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deposit_credited(&self, notice: &CreditNotice) -> Result<(), AppError> {
        tracing::info!(
            user_id = notice.user_id,
            txid = %notice.txid,
            amount = %notice.amount,
            balance = %notice.balance,
            "Deposit credited"
        );
        Ok(())
    }
}
