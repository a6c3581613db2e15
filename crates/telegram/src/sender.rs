use std::time::Duration;

use async_trait::async_trait;
use teloxide::adaptors::throttle::{Limits, Throttle};
use teloxide::prelude::*;
use tracing::debug;

use common::{DirectSender, Error, Recipient, Result};

/// Sends alerts to Telegram chats. Recipients are chat ids.
///
/// Requests go through teloxide's throttle adaptor to stay under the Bot API
/// rate limits. Must be constructed inside a Tokio runtime.
pub struct TelegramSender {
    bot: Throttle<Bot>,
}

impl TelegramSender {
    pub fn new(token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Telegram(e.to_string()))?;
        Ok(Self {
            bot: Bot::with_client(token, client).throttle(Limits::default()),
        })
    }
}

pub(crate) fn chat_id(recipient: &Recipient) -> Result<ChatId> {
    recipient
        .as_str()
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| Error::notification("telegram", format!("'{recipient}' is not a chat id")))
}

#[async_trait]
impl DirectSender for TelegramSender {
    async fn send_direct(&self, recipient: &Recipient, text: &str) -> Result<()> {
        let chat = chat_id(recipient)?;
        self.bot
            .send_message(chat, text)
            .await
            .map_err(|e| Error::notification("telegram", e))?;
        debug!(chat_id = chat.0, "Telegram message sent");
        Ok(())
    }
}
