use std::time::Duration;

use satshop_core::Backoff;
use tokio::sync::watch;

use crate::api::BotApi;
use crate::handler::Handler;

/// How long one `getUpdates` call waits for new messages.
pub const LONG_POLL: Duration = Duration::from_secs(25);

/// Long-poll for messages and answer them until `shutdown` flips to `true`.
///
/// Messages are answered one at a time, in the order Telegram delivered them.
pub async fn run_polling(api: &BotApi, handler: &Handler, mut shutdown: watch::Receiver<bool>) {
    let mut offset: Option<i64> = None;
    let mut backoff = Backoff::default();

    tracing::info!("Bot polling started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let updates = tokio::select! {
            res = api.get_updates(offset, LONG_POLL) => res,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
        };

        let updates = match updates {
            Ok(updates) => {
                backoff.reset();
                updates
            }
            Err(e) => {
                let delay = backoff.next_delay();
                if e.is_transient() {
                    tracing::warn!(error = %e, retry_in_secs = delay.as_secs(), "Telegram unavailable");
                } else {
                    tracing::error!(error = %e, retry_in_secs = delay.as_secs(), "getUpdates failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let (Some(from), Some(text)) = (message.from.as_ref(), message.text.as_deref()) else {
                continue;
            };
            if from.is_bot {
                continue;
            }

            tracing::debug!(user_id = from.id, chat_id = message.chat.id, "Incoming message");

            if let Some(reply) = handler.handle(from.id, text).await {
                if let Err(e) = api.send_message(message.chat.id, &reply).await {
                    tracing::warn!(chat_id = message.chat.id, error = %e, "Reply not delivered");
                }
            }
        }
    }

    tracing::info!("Bot polling stopped");
}
