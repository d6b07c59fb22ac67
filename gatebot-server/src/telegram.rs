//! Telegram Bot API client.
//!
//! Implements `Messenger` and `MembershipOracle` over the HTTPS Bot API. Only
//! the handful of methods the bot needs are covered.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use gatebot_core::UserId;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::render::{render, InlineButton, Keyboard, OutgoingMessage};
use crate::state_machine::effect::Reply;
use crate::transport::{Membership, MembershipOracle, Messenger, TransportError};

const API_BASE: &str = "https://api.telegram.org";

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<u16>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, http_status: u16) -> Result<T, TransportError> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(TransportError::Api {
                status: self.error_code.unwrap_or(http_status),
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotUser {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    /// Only sent for `restricted` members.
    is_member: Option<bool>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<ReplyMarkup>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetChatMemberRequest<'a> {
    chat_id: &'a str,
    user_id: i64,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryRequest<'a> {
    callback_query_id: &'a str,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum ReplyMarkup {
    Inline {
        inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
    },
    Keyboard {
        keyboard: Vec<Vec<KeyboardButton>>,
        resize_keyboard: bool,
    },
}

#[derive(Debug, Serialize, PartialEq)]
struct InlineKeyboardButton {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_data: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
struct KeyboardButton {
    text: String,
}

fn reply_markup(keyboard: &Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::None => None,
        Keyboard::Inline(rows) => Some(ReplyMarkup::Inline {
            inline_keyboard: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|button| match button {
                            InlineButton::Url { text, url } => InlineKeyboardButton {
                                text: text.clone(),
                                url: Some(url.clone()),
                                callback_data: None,
                            },
                            InlineButton::Callback { text, data } => InlineKeyboardButton {
                                text: text.clone(),
                                url: None,
                                callback_data: Some(data.clone()),
                            },
                        })
                        .collect()
                })
                .collect(),
        }),
        Keyboard::Menu(rows) => Some(ReplyMarkup::Keyboard {
            keyboard: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| KeyboardButton {
                            text: label.clone(),
                        })
                        .collect()
                })
                .collect(),
            resize_keyboard: true,
        }),
    }
}

/// Map a `getChatMember` status to a membership answer.
fn membership_for(member: &ChatMember) -> Membership {
    match member.status.as_str() {
        "left" | "kicked" => Membership::NotJoined,
        "restricted" if member.is_member == Some(false) => Membership::NotJoined,
        "" => Membership::Unknown,
        _ => Membership::Joined,
    }
}

#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    pub fn new(token: &str, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: format!("{}/bot{}", API_BASE, token),
        })
    }

    async fn call<P: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<R, TransportError> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self
            .client
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status().as_u16();
        let body: ApiResponse<R> = response.json().await.map_err(request_error)?;
        body.into_result(status)
    }

    /// Fetch the bot's own account. Used at startup to learn its username.
    pub async fn get_me(&self) -> Result<BotUser> {
        let me: BotUser = self
            .call("getMe", &serde_json::json!({}))
            .await
            .map_err(|e| anyhow!("getMe failed: {}", e))?;
        info!("Authenticated as bot {} ({:?})", me.id, me.username);
        Ok(me)
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let request = SendMessageRequest {
            chat_id,
            text: &message.text,
            parse_mode: message.markdown.then_some("Markdown"),
            reply_markup: reply_markup(&message.keyboard),
            disable_web_page_preview: true,
        };
        let _: serde_json::Value = self.call("sendMessage", &request).await?;
        debug!("Sent message to {}", chat_id);
        Ok(())
    }

    pub async fn get_chat_member(
        &self,
        chat_id: &str,
        user_id: i64,
    ) -> Result<Membership, TransportError> {
        let member: ChatMember = self
            .call("getChatMember", &GetChatMemberRequest { chat_id, user_id })
            .await?;
        Ok(membership_for(&member))
    }

    /// Stop the spinner on a pressed inline button.
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TransportError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQueryRequest { callback_query_id },
            )
            .await?;
        Ok(())
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn deliver(&self, user: UserId, reply: &Reply) -> Result<(), TransportError> {
        self.send_message(user.0, &render(reply)).await
    }

    async fn acknowledge_callback(&self, callback_id: &str) -> Result<(), TransportError> {
        self.answer_callback_query(callback_id).await
    }
}

#[async_trait]
impl MembershipOracle for TelegramClient {
    async fn is_member(
        &self,
        channel_id: &str,
        user: UserId,
    ) -> Result<Membership, TransportError> {
        self.get_chat_member(channel_id, user.0).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn member(status: &str, is_member: Option<bool>) -> ChatMember {
        ChatMember {
            status: status.to_string(),
            is_member,
        }
    }

    #[test]
    fn test_membership_statuses() {
        assert_eq!(membership_for(&member("member", None)), Membership::Joined);
        assert_eq!(membership_for(&member("creator", None)), Membership::Joined);
        assert_eq!(membership_for(&member("administrator", None)), Membership::Joined);
        assert_eq!(membership_for(&member("left", None)), Membership::NotJoined);
        assert_eq!(membership_for(&member("kicked", None)), Membership::NotJoined);
        assert_eq!(
            membership_for(&member("restricted", Some(true))),
            Membership::Joined
        );
        assert_eq!(
            membership_for(&member("restricted", Some(false))),
            Membership::NotJoined
        );
        assert_eq!(membership_for(&member("", None)), Membership::Unknown);
    }

    #[test]
    fn test_api_error_envelope() {
        let body: ApiResponse<serde_json::Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .unwrap();
        assert_eq!(
            body.into_result(200),
            Err(TransportError::Api {
                status: 403,
                description: "Forbidden: bot was blocked by the user".to_string()
            })
        );
    }

    #[test]
    fn test_api_ok_envelope() {
        let body: ApiResponse<BotUser> = serde_json::from_value(json!({
            "ok": true,
            "result": { "id": 42, "is_bot": true, "first_name": "Gate", "username": "gate_bot" }
        }))
        .unwrap();
        let me = body.into_result(200).unwrap();
        assert_eq!(me.id, 42);
        assert_eq!(me.username.as_deref(), Some("gate_bot"));
    }

    #[test]
    fn test_inline_markup_shape() {
        let markup = reply_markup(&Keyboard::Inline(vec![vec![
            InlineButton::Url {
                text: "Join".into(),
                url: "https://t.me/chan".into(),
            },
            InlineButton::Callback {
                text: "Done".into(),
                data: "check_join".into(),
            },
        ]]));
        assert_eq!(
            serde_json::to_value(markup).unwrap(),
            json!({
                "inline_keyboard": [[
                    { "text": "Join", "url": "https://t.me/chan" },
                    { "text": "Done", "callback_data": "check_join" }
                ]]
            })
        );
    }

    #[test]
    fn test_menu_markup_shape() {
        let markup = reply_markup(&Keyboard::Menu(vec![vec!["A".into()]]));
        assert_eq!(
            serde_json::to_value(markup).unwrap(),
            json!({ "keyboard": [[{ "text": "A" }]], "resize_keyboard": true })
        );
        assert_eq!(reply_markup(&Keyboard::None), None);
    }

    #[test]
    fn test_send_message_omits_parse_mode_for_plain_text() {
        let request = SendMessageRequest {
            chat_id: 7,
            text: "hi",
            parse_mode: None,
            reply_markup: None,
            disable_web_page_preview: true,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({ "chat_id": 7, "text": "hi", "disable_web_page_preview": true })
        );
    }
}
