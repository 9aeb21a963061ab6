use std::time::Duration;

use satshop_core::{AppError, Settings};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::types::{ApiResponse, Message, Update};

/// Longest text the Bot API accepts in one message.
pub const MAX_MESSAGE_CHARS: usize = 4096;

/// Minimal Telegram Bot API client.
#[derive(Clone)]
pub struct BotApi {
    http: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl std::fmt::Debug for BotApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The base URL embeds the bot token.
        f.debug_struct("BotApi")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BotApi {
    pub fn new(api_url: &str, token: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base: format!("{}/bot{token}", api_url.trim_end_matches('/')),
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        Self::new(
            &settings.telegram_api_url,
            settings.require_telegram_token()?,
            settings.rpc_timeout(),
        )
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn call<P, T>(&self, method: &str, params: &P, extra_wait: Duration) -> Result<T, AppError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let limit = self.timeout + extra_wait;
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(limit)
            .json(params)
            .send()
            .await
            .map_err(|e| transport_error(e, limit))?;

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| transport_error(e, limit))?;

        if !body.ok {
            let description = body.description.unwrap_or_default();
            return match body.error_code {
                Some(401) | Some(404) => Err(AppError::Config(format!(
                    "telegram rejected the bot token: {description}"
                ))),
                Some(429) | Some(500..=599) => Err(AppError::Network(format!(
                    "telegram {method}: {description}"
                ))),
                code => Err(AppError::Rpc(format!(
                    "telegram {method}: {description} (code {})",
                    code.unwrap_or_default()
                ))),
            };
        }

        body.result
            .ok_or_else(|| AppError::Decode(format!("telegram {method}: missing result")))
    }

    /// Long-poll for updates after `offset`, waiting up to `wait` for one to arrive.
    pub async fn get_updates(&self, offset: Option<i64>, wait: Duration) -> Result<Vec<Update>, AppError> {
        let params = json!({
            "offset": offset,
            "timeout": wait.as_secs(),
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", &params, wait).await
    }

    /// Send `text` to `chat_id`, split over several messages when too long.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), AppError> {
        for chunk in split_message(text, MAX_MESSAGE_CHARS) {
            let params = json!({
                "chat_id": chat_id,
                "text": chunk,
                "disable_web_page_preview": true,
            });
            let _: Message = self.call("sendMessage", &params, Duration::ZERO).await?;
        }
        Ok(())
    }
}

fn transport_error(e: reqwest::Error, limit: Duration) -> AppError {
    // reqwest errors carry the request URL, which contains the token.
    let e = e.without_url();
    if e.is_timeout() {
        AppError::Timeout(limit.as_secs())
    } else if e.is_decode() {
        AppError::Decode(e.to_string())
    } else {
        AppError::Network(e.to_string())
    }
}

/// Split on line boundaries so that no chunk exceeds `max` characters.
pub fn split_message(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let mut line: Vec<char> = line.chars().collect();
        while line.len() > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            chunks.push(line.drain(..max).collect());
        }
        let line: String = line.into_iter().collect();

        let needed = current.chars().count() + line.chars().count() + usize::from(!current.is_empty());
        if needed > max && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}
