//! Telegram Bot API transport
//!
//! Only the two calls the notifier needs: `getUpdates` to discover who has
//! written to the bot and `sendMessage` to reach them.

use crate::config::TelegramEndpoint;
use crate::error::{OverseerError, Result};
use crate::store::ChatId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GET_UPDATES: &str = "getUpdates";
const SEND_MESSAGE: &str = "sendMessage";

/// One entry of a `getUpdates` page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Message {
    pub chat: Chat,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: ChatId,
}

impl Update {
    pub fn chat_id(&self) -> Option<ChatId> {
        self.message.as_ref().map(|m| m.chat.id)
    }
}

/// Response envelope shared by every Bot API method
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: ChatId,
    text: &'a str,
    parse_mode: &'static str,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Updates with an id of at least `offset`, oldest first.
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>>;

    /// Send `text` (HTML parse mode) to one chat.
    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

/// HTTP client for a Bot API server
pub struct TelegramTransport {
    client: reqwest::Client,
    endpoint: TelegramEndpoint,
}

impl TelegramTransport {
    pub fn new(endpoint: TelegramEndpoint) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .user_agent(concat!("overseer/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OverseerError::configuration(format!("HTTP client: {}", e)))?;

        Ok(Self { client, endpoint })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.endpoint.base_url, self.endpoint.token, method)
    }

    async fn unwrap_response<T>(operation: &'static str, response: reqwest::Response) -> Result<Option<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            return Err(OverseerError::transport(operation, format!("HTTP {}", status)));
        }

        let body: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| OverseerError::transport(operation, without_url(e)))?;
        if !body.ok {
            return Err(OverseerError::transport(
                operation,
                body.description.unwrap_or_else(|| "request rejected".to_string()),
            ));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(self.method_url(GET_UPDATES))
            .query(&[("offset", offset)])
            .send()
            .await
            .map_err(|e| OverseerError::transport(GET_UPDATES, without_url(e)))?;

        let updates: Vec<Update> = Self::unwrap_response(GET_UPDATES, response)
            .await?
            .unwrap_or_default();
        debug!("getUpdates(offset={}) returned {} update(s)", offset, updates.len());
        Ok(updates)
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
        };
        let response = self
            .client
            .post(self.method_url(SEND_MESSAGE))
            .json(&request)
            .send()
            .await
            .map_err(|e| OverseerError::transport(SEND_MESSAGE, without_url(e)))?;

        Self::unwrap_response::<serde_json::Value>(SEND_MESSAGE, response).await?;
        Ok(())
    }
}

/// reqwest errors embed the request URL, which carries the bot token.
fn without_url(error: reqwest::Error) -> reqwest::Error {
    error.without_url()
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_updates_page() {
        let body = r#"{
            "ok": true,
            "result": [
                {"update_id": 10, "message": {"message_id": 1, "chat": {"id": 555, "type": "private"}, "text": "/start"}},
                {"update_id": 11, "edited_message": {"chat": {"id": 777}}},
                {"update_id": 12, "message": {"chat": {"id": -100123, "type": "group"}}}
            ]
        }"#;
        let page: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        assert!(page.ok);

        let updates = page.result.unwrap();
        let chats: Vec<Option<ChatId>> = updates.iter().map(Update::chat_id).collect();
        assert_eq!(chats, vec![Some(ChatId(555)), None, Some(ChatId(-100123))]);
    }

    #[test]
    fn test_parse_error_envelope() {
        let body = r#"{"ok": false, "error_code": 401, "description": "Unauthorized"}"#;
        let page: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        assert!(!page.ok);
        assert!(page.result.is_none());
        assert_eq!(page.description.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_send_request_shape() {
        let request = SendMessageRequest {
            chat_id: ChatId(42),
            text: "<b>hi</b>",
            parse_mode: "HTML",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"chat_id": 42, "text": "<b>hi</b>", "parse_mode": "HTML"})
        );
    }

    #[test]
    fn test_method_url() {
        let transport = TelegramTransport::new(TelegramEndpoint {
            base_url: "https://api.telegram.org".to_string(),
            token: "123:abc".to_string(),
            timeout: Duration::from_secs(10),
        })
        .unwrap();
        assert_eq!(
            transport.method_url(GET_UPDATES),
            "https://api.telegram.org/bot123:abc/getUpdates"
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let transport = TelegramTransport::new(TelegramEndpoint {
            base_url: "http://127.0.0.1:9".to_string(),
            token: "secret-token".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = transport.get_updates(0).await.unwrap_err();
        assert!(matches!(err, OverseerError::Transport { .. }));
        assert!(!err.to_string().contains("secret-token"));
    }
}
