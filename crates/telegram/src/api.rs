use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use sliceline_core::errors::PortError;
use sliceline_core::outbound::{InlineKeyboard, OutboundMessage};
use sliceline_core::ports::OutboundGateway;

use crate::wire::Update;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bot api transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bot api rejected `{method}`: {description}")]
    Rejected { method: String, description: String },
}

impl From<ApiError> for PortError {
    fn from(error: ApiError) -> Self {
        PortError::transient("telegram", error.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API client. One instance serves both directions: long-poll
/// `getUpdates` for the poller and the outbound gateway for the flow.
/// Every request carries a bounded timeout; expiry reads as a transport
/// failure like any other.
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    provider_token: SecretString,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(
        base_url: impl Into<String>,
        bot_token: SecretString,
        provider_token: SecretString,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            bot_token,
            provider_token,
            request_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.bot_token.expose_secret())
    }

    async fn call<T: DeserializeOwned + Default>(
        &self,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<T, ApiError> {
        let response = self
            .http
            .post(self.method_url(method))
            .timeout(timeout)
            .json(payload)
            .send()
            .await?;
        let body: ApiResponse<T> = response.json().await?;
        unwrap_response(method, body)
    }

    /// Long-poll fetch of pending updates. The HTTP timeout is stretched
    /// past the poll window so the server side, not the client, closes the
    /// poll.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        poll_timeout_secs: u64,
    ) -> Result<Vec<Update>, ApiError> {
        let mut payload = json!({ "timeout": poll_timeout_secs });
        if let Some(offset) = offset {
            payload["offset"] = json!(offset);
        }
        let timeout = Duration::from_secs(poll_timeout_secs) + self.request_timeout;
        self.call("getUpdates", &payload, timeout).await
    }

    async fn send_photo(
        &self,
        chat: i64,
        image: &[u8],
        caption: &str,
        keyboard: Option<&InlineKeyboard>,
    ) -> Result<(), ApiError> {
        let mut form = multipart::Form::new()
            .text("chat_id", chat.to_string())
            .text("caption", caption.to_owned())
            .part("photo", multipart::Part::bytes(image.to_vec()).file_name("photo.jpg"));
        if let Some(keyboard) = keyboard {
            form = form.text("reply_markup", reply_markup(keyboard).to_string());
        }

        let response = self
            .http
            .post(self.method_url("sendPhoto"))
            .timeout(self.request_timeout)
            .multipart(form)
            .send()
            .await?;
        let body: ApiResponse<Value> = response.json().await?;
        unwrap_response("sendPhoto", body).map(|_| ())
    }
}

fn unwrap_response<T>(method: &str, body: ApiResponse<T>) -> Result<T, ApiError> {
    if !body.ok {
        return Err(ApiError::Rejected {
            method: method.to_owned(),
            description: body.description.unwrap_or_else(|| "no description".to_owned()),
        });
    }
    body.result.ok_or_else(|| ApiError::Rejected {
        method: method.to_owned(),
        description: "ok response without a result".to_owned(),
    })
}

/// Inline-keyboard rows in the shape the Bot API expects.
fn reply_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.token }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

#[async_trait]
impl OutboundGateway for TelegramClient {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), PortError> {
        match message {
            OutboundMessage::Text { chat, text, keyboard } => {
                let mut payload = json!({ "chat_id": chat.0, "text": text });
                if let Some(keyboard) = keyboard {
                    payload["reply_markup"] = reply_markup(keyboard);
                }
                self.call::<Value>("sendMessage", &payload, self.request_timeout).await?;
            }
            OutboundMessage::Photo { chat, image, caption, keyboard } => {
                self.send_photo(chat.0, image, caption, keyboard.as_ref()).await?;
            }
            OutboundMessage::Location { chat, point } => {
                let payload = json!({
                    "chat_id": chat.0,
                    "latitude": point.latitude,
                    "longitude": point.longitude,
                });
                self.call::<Value>("sendLocation", &payload, self.request_timeout).await?;
            }
            OutboundMessage::Invoice {
                chat,
                title,
                description,
                payload,
                currency,
                amount_minor,
            } => {
                let body = json!({
                    "chat_id": chat.0,
                    "title": title,
                    "description": description,
                    "payload": payload,
                    "provider_token": self.provider_token.expose_secret(),
                    "currency": currency,
                    "prices": [{ "label": "Total", "amount": amount_minor }],
                });
                self.call::<Value>("sendInvoice", &body, self.request_timeout).await?;
            }
            OutboundMessage::AnswerCallback { callback_id, text } => {
                let mut payload = json!({ "callback_query_id": callback_id });
                if let Some(text) = text {
                    payload["text"] = json!(text);
                }
                self.call::<bool>("answerCallbackQuery", &payload, self.request_timeout).await?;
            }
            OutboundMessage::AnswerPreCheckout { query_id, ok, error_message } => {
                let mut payload = json!({ "pre_checkout_query_id": query_id, "ok": ok });
                if let Some(error_message) = error_message {
                    payload["error_message"] = json!(error_message);
                }
                self.call::<bool>("answerPreCheckoutQuery", &payload, self.request_timeout)
                    .await?;
            }
            OutboundMessage::Delete { chat, message_id } => {
                let payload = json!({ "chat_id": chat.0, "message_id": message_id });
                self.call::<bool>("deleteMessage", &payload, self.request_timeout).await?;
            }
        }
        Ok(())
    }
}
