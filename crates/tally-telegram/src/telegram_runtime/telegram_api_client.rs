//! Telegram Bot API client used by the polling loop and the reminder sweep.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramUpdate {
    pub(super) update_id: u64,
    #[serde(default)]
    pub(super) message: Option<TelegramMessage>,
    #[serde(default)]
    pub(super) callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramMessage {
    pub(super) message_id: i64,
    pub(super) chat: TelegramChat,
    #[serde(default)]
    pub(super) text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramChat {
    pub(super) id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramCallbackQuery {
    pub(super) id: String,
    #[serde(default)]
    pub(super) data: Option<String>,
    #[serde(default)]
    pub(super) message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct TelegramApiEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(super) struct TelegramSentMessage {
    #[allow(dead_code)]
    pub(super) message_id: i64,
}

#[derive(Clone)]
pub(super) struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl TelegramApiClient {
    pub(super) fn new(
        api_base: String,
        bot_token: String,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let bot_token = bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("telegram bot token cannot be empty");
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("tally-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token,
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Long-polls for the next batch of updates. The HTTP timeout is
    /// stretched past the server-side poll timeout so a quiet poll is not
    /// misread as a transport failure.
    pub(super) async fn get_updates(
        &self,
        offset: u64,
        poll_timeout_seconds: u64,
    ) -> Result<Vec<TelegramUpdate>> {
        let payload = json!({
            "offset": offset,
            "timeout": poll_timeout_seconds,
            "allowed_updates": ["message", "callback_query"],
        });
        let request_timeout = Duration::from_secs(poll_timeout_seconds.saturating_add(10));
        let updates = self
            .call::<Vec<TelegramUpdate>>("getUpdates", &payload, Some(request_timeout))
            .await?;
        Ok(updates)
    }

    pub(super) async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<Value>,
    ) -> Result<TelegramSentMessage> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_markup) = reply_markup {
            payload["reply_markup"] = reply_markup;
        }
        self.call("sendMessage", &payload, None).await
    }

    pub(super) async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });
        // Telegram returns the edited message object; only success matters.
        let _: Value = self.call("editMessageText", &payload, None).await?;
        Ok(())
    }

    pub(super) async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let payload = json!({ "callback_query_id": callback_query_id });
        let _: Value = self.call("answerCallbackQuery", &payload, None).await?;
        Ok(())
    }

    async fn call<T>(
        &self,
        method: &str,
        payload: &Value,
        request_timeout: Option<Duration>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let url = self.method_url(method);
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let mut request = self.http.post(&url).json(payload);
            if let Some(request_timeout) = request_timeout {
                request = request.timeout(request_timeout);
            }
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope = response
                            .json::<TelegramApiEnvelope<T>>()
                            .await
                            .with_context(|| format!("failed to decode telegram {method}"))?;
                        if !envelope.ok {
                            bail!(
                                "telegram {method} failed: {}",
                                envelope
                                    .description
                                    .unwrap_or_else(|| "unknown error".to_string())
                            );
                        }
                        return envelope
                            .result
                            .ok_or_else(|| anyhow!("telegram {method} response missing result"));
                    }

                    if attempt < self.retry_max_attempts && is_retryable_status(status.as_u16()) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt)).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    bail!(
                        "telegram api {method} failed with status {}: {}",
                        status.as_u16(),
                        truncate_for_error(&body, 320)
                    );
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt)).await;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("telegram api {method} request failed"));
                }
            }
        }
    }
}

pub(super) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

pub(super) fn retry_delay(base_delay_ms: u64, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    Duration::from_millis(base_delay_ms.saturating_mul(1_u64 << exponent))
}

pub(super) fn truncate_for_error(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    let truncated = raw.chars().take(max_chars).collect::<String>();
    format!("{truncated}…")
}
