use async_trait::async_trait;
use satshop_core::AppError;
use satshop_shop::{CreditNotice, Notifier};

use crate::api::BotApi;
use crate::handler::btc;

/// Tells users about credited deposits over Telegram. Private chat ids equal user ids.
pub struct TelegramNotifier {
    api: BotApi,
}

impl TelegramNotifier {
    pub fn new(api: BotApi) -> Self {
        Self { api }
    }
}

pub fn credit_message(notice: &CreditNotice) -> String {
    format!(
        "Deposit of {} BTC confirmed.\nTransaction: {}\nYour balance: {} BTC",
        btc(notice.amount),
        notice.txid,
        btc(notice.balance)
    )
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deposit_credited(&self, notice: &CreditNotice) -> Result<(), AppError> {
        self.api
            .send_message(notice.user_id, &credit_message(notice))
            .await
    }
}
