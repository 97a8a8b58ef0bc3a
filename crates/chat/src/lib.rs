//! Stateless wrapper over the Telegram REST surface.
//!
//! Sends are fire-and-forget: the pipeline never fails because a chat
//! message could not be delivered, so transport errors are logged and
//! swallowed. File retrieval is the exception; the caller needs the bytes
//! and gets the error.

use std::time::Duration;

use anyhow::Result;
use teloxide::Bot;
use teloxide::payloads::{EditMessageReplyMarkupSetters, EditMessageTextSetters, SendMessageSetters};
use teloxide::prelude::Requester;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId};
use tracing::warn;

const FILE_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ChatGateway {
    bot: Bot,
    downloader: reqwest::Client,
}

impl ChatGateway {
    pub fn new(token: &str) -> Result<Self> {
        let downloader = reqwest::Client::builder()
            .timeout(FILE_FETCH_TIMEOUT)
            .build()?;
        Ok(Self {
            bot: Bot::new(token),
            downloader,
        })
    }

    pub fn from_env() -> Result<Self> {
        let token = std::env::var("BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("BOT_TOKEN environment variable is required"))?;
        Self::new(&token)
    }

    pub async fn send_text(&self, chat: i64, text: &str) {
        if let Err(err) = self.bot.send_message(ChatId(chat), text).await {
            warn!(chat, error = %err, "send_message failed");
        }
    }

    pub async fn send_text_with_buttons(
        &self,
        chat: i64,
        text: &str,
        keyboard: InlineKeyboardMarkup,
    ) {
        if let Err(err) = self
            .bot
            .send_message(ChatId(chat), text)
            .reply_markup(keyboard)
            .await
        {
            warn!(chat, error = %err, "send_message with keyboard failed");
        }
    }

    /// Rewrites the tapped message and strips its inline keyboard.
    pub async fn edit_text_and_clear_buttons(&self, chat: i64, message_id: i32, text: &str) {
        if let Err(err) = self
            .bot
            .edit_message_text(ChatId(chat), MessageId(message_id), text)
            .reply_markup(InlineKeyboardMarkup::default())
            .await
        {
            warn!(chat, message_id, error = %err, "edit_message_text failed");
        }
    }

    /// Strips the keyboard without touching the text. Done first thing on a
    /// button tap so a second tap has nothing to press.
    pub async fn clear_buttons_immediately(&self, chat: i64, message_id: i32) {
        if let Err(err) = self
            .bot
            .edit_message_reply_markup(ChatId(chat), MessageId(message_id))
            .reply_markup(InlineKeyboardMarkup::default())
            .await
        {
            warn!(chat, message_id, error = %err, "edit_message_reply_markup failed");
        }
    }

    /// Stops the client-side loading spinner on the tapped button.
    pub async fn ack_callback(&self, callback_id: &str) {
        if let Err(err) = self.bot.answer_callback_query(callback_id.to_string()).await {
            warn!(callback_id, error = %err, "answer_callback_query failed");
        }
    }

    /// Resolves a `file_id` and downloads its bytes. Fails loudly; the
    /// document pipeline cannot proceed without them.
    pub async fn fetch_file_bytes(&self, file_id: &str) -> Result<Vec<u8>> {
        let file = self.bot.get_file(file_id.to_string()).await?;
        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        );

        let response = self
            .downloader
            .get(&url)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}
