//! Telegram bot command loop
//!
//! Long-polls `getUpdates` and answers `/start`, `/help` and `/alerts`.
//! Alerts are created through the REST API; the bot is the read side, plus
//! the channel where price-drop notifications arrive.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::alerts::AlertRepository;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::models::{Alert, AlertFilter, AlertStatus};

/// Commands the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/alerts`
    Alerts,
    /// Anything else
    Unknown,
}

/// Parse the leading command out of a message text
pub fn parse_command(text: &str) -> BotCommand {
    let command = text.trim().split_whitespace().next().unwrap_or("");
    // commands may carry a bot mention suffix, e.g. /start@farewatch_bot
    let command = command.split('@').next().unwrap_or(command);
    match command {
        "/start" => BotCommand::Start,
        "/help" => BotCommand::Help,
        "/alerts" | "/list" => BotCommand::Alerts,
        _ => BotCommand::Unknown,
    }
}

/// Telegram bot runner
pub struct TelegramBot {
    client: Client,
    api_base: String,
    token: String,
    poll_timeout_secs: u64,
    alerts: AlertRepository,
}

impl TelegramBot {
    /// Create a new bot runner
    pub fn new(config: &TelegramConfig, alerts: AlertRepository) -> Result<Self> {
        let client = Client::builder()
            // long poll plus headroom
            .timeout(Duration::from_secs(config.poll_timeout_secs + 10))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
            poll_timeout_secs: config.poll_timeout_secs,
            alerts,
        })
    }

    /// Run the polling loop until the task is dropped
    pub async fn run(&self) {
        if self.token.is_empty() {
            warn!("Telegram bot token not configured, bot will not start");
            return;
        }

        info!("Starting Telegram bot");
        let mut offset: i64 = 0;

        loop {
            match self.poll_updates(offset).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(message) = update.message {
                            if let Err(e) = self.handle_message(&message).await {
                                warn!(chat_id = message.chat.id, error = %e, "Failed to handle message");
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn poll_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let response = self
            .client
            .get(format!("{}/bot{}/getUpdates", self.api_base, self.token))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.poll_timeout_secs.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::telegram(format!("getUpdates returned {status}")));
        }

        let body: UpdatesResponse = response.json().await?;
        if !body.ok {
            return Err(Error::telegram(
                body.description.unwrap_or_else(|| "getUpdates not ok".to_string()),
            ));
        }
        Ok(body.result)
    }

    async fn handle_message(&self, message: &Message) -> Result<()> {
        let Some(text) = &message.text else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        debug!(chat_id, text = %text, "Bot message received");

        let reply = match parse_command(text) {
            BotCommand::Start => self.start_text(message),
            BotCommand::Help => help_text(),
            BotCommand::Alerts => self.alerts_text(chat_id).await?,
            BotCommand::Unknown => "I didn't catch that. Use /help to see what I can do.".to_string(),
        };

        self.send_message(chat_id, reply).await
    }

    fn start_text(&self, message: &Message) -> String {
        let name = message
            .from
            .as_ref()
            .map(|u| u.first_name.as_str())
            .unwrap_or("there");
        format!(
            "👋 Welcome {name}!\n\n\
             I'm your flight price tracker. I'll notify you here when a fare \
             drops to your target.\n\n\
             📍 Create alerts through the REST API using your chat id as the \
             user id.\n\
             🔔 Price-drop notifications arrive in this chat.\n\n\
             Use /help to see all commands."
        )
    }

    async fn alerts_text(&self, chat_id: i64) -> Result<String> {
        let filter = AlertFilter {
            user_id: Some(chat_id.to_string()),
            ..Default::default()
        };
        let alerts = self.alerts.list(&filter).await?;

        if alerts.is_empty() {
            return Ok(format!(
                "📋 You have no alerts yet.\n\n\
                 Create one through the API with user id `{chat_id}`."
            ));
        }

        let mut text = String::from("📋 *Your Alerts*\n\n");
        for alert in &alerts {
            text.push_str(&format_alert_line(alert));
        }
        text.push_str("\nManage alerts through the API; this chat gets the notifications.");
        Ok(text)
    }

    async fn send_message(&self, chat_id: i64, text: String) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::telegram(format!("sendMessage returned {status}")));
        }
        Ok(())
    }
}

/// One line of the `/alerts` listing
fn format_alert_line(alert: &Alert) -> String {
    let icon = match alert.status {
        AlertStatus::Active => "🟢",
        AlertStatus::Paused => "⏸️",
        AlertStatus::Triggered => "🎯",
        AlertStatus::Expired => "⌛",
    };
    let last = alert
        .last_price
        .map(|p| format!(", last {p:.2} {}", alert.currency))
        .unwrap_or_default();
    format!(
        "{icon} #{} {} → {}: target {:.2} {}{}\n",
        alert.id, alert.origin, alert.destination, alert.target_price, alert.currency, last
    )
}

fn help_text() -> String {
    "📖 *Flight Price Tracker - Help*\n\n\
     Commands:\n\
     /start - welcome message and your chat id\n\
     /help - this message\n\
     /alerts - list your alerts\n\n\
     Creating alerts:\n\
     POST /api/v1/alerts with your chat id as `user_id`.\n\n\
     You'll be notified here when:\n\
     ✈️ a tracked fare drops\n\
     💰 the fare reaches your target"
        .to_string()
}

// Telegram update types

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    from: Option<User>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct User {
    first_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("/start", BotCommand::Start)]
    #[case("  /start  ", BotCommand::Start)]
    #[case("/start@farewatch_bot", BotCommand::Start)]
    #[case("/help", BotCommand::Help)]
    #[case("/alerts", BotCommand::Alerts)]
    #[case("/list", BotCommand::Alerts)]
    #[case("/unknown", BotCommand::Unknown)]
    #[case("hello", BotCommand::Unknown)]
    #[case("", BotCommand::Unknown)]
    fn commands_parse(#[case] text: &str, #[case] expected: BotCommand) {
        assert_eq!(parse_command(text), expected);
    }

    #[test]
    fn updates_deserialize() {
        let body: UpdatesResponse = serde_json::from_value(serde_json::json!({
            "ok": true,
            "result": [{
                "update_id": 42,
                "message": {
                    "message_id": 7,
                    "chat": {"id": 123456789, "type": "private"},
                    "from": {"id": 123456789, "is_bot": false, "first_name": "Ada"},
                    "text": "/alerts"
                }
            }]
        }))
        .unwrap();
        assert!(body.ok);
        assert_eq!(body.result[0].update_id, 42);
        let message = body.result[0].message.as_ref().unwrap();
        assert_eq!(message.chat.id, 123456789);
        assert_eq!(message.text.as_deref(), Some("/alerts"));
    }
}
