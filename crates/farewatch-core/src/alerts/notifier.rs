//! Telegram notification delivery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::models::Alert;

/// Result of a notification attempt
#[derive(Debug, Clone)]
pub struct NotificationOutcome {
    /// Whether delivery succeeded
    pub success: bool,
    /// Error message if delivery failed
    pub error: Option<String>,
    /// When the attempt was made
    pub sent_at: DateTime<Utc>,
}

impl NotificationOutcome {
    fn from_result(result: Result<()>) -> Self {
        Self {
            success: result.is_ok(),
            error: result.err().map(|e| e.to_string()),
            sent_at: Utc::now(),
        }
    }
}

/// Notification seam used by the price checker
#[async_trait]
pub trait Notify: Send + Sync {
    /// Tell the user their route got cheaper
    async fn price_drop(
        &self,
        alert: &Alert,
        old_price: f64,
        new_price: f64,
        booking_url: Option<&str>,
    ) -> NotificationOutcome;

    /// Confirm a freshly created alert
    async fn alert_created(&self, alert: &Alert) -> NotificationOutcome;

    /// Warn that an alert is about to expire
    async fn expiring_soon(&self, alert: &Alert, days_left: i64) -> NotificationOutcome;
}

/// Sends notifications through the Telegram Bot API
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    /// Create a new notifier from configuration
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    /// Send a Markdown message to a chat
    pub async fn send_message(
        &self,
        chat_id: &str,
        text: String,
        reply_markup: Option<InlineKeyboardMarkup>,
    ) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::telegram("bot token not configured"));
        }

        let payload = SendMessagePayload {
            chat_id: chat_id.to_string(),
            text,
            parse_mode: "Markdown".to_string(),
            reply_markup,
        };

        let response = self
            .client
            .post(format!("{}/bot{}/sendMessage", self.api_base, self.token))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body: TelegramResponse = response.json().await.unwrap_or(TelegramResponse {
            ok: status.is_success(),
            description: None,
        });

        if !status.is_success() || !body.ok {
            return Err(Error::telegram(format!(
                "sendMessage returned {status}: {}",
                body.description.unwrap_or_default()
            )));
        }

        Ok(())
    }

    fn price_drop_keyboard(alert: &Alert, booking_url: Option<&str>) -> InlineKeyboardMarkup {
        let mut keyboard = Vec::new();

        if let Some(url) = booking_url {
            keyboard.push(vec![InlineKeyboardButton::url("🎫 Book Now", url)]);
        }

        keyboard.push(vec![
            InlineKeyboardButton::callback("📋 View Alerts", "back_to_list"),
            InlineKeyboardButton::callback("⏸️ Pause Alert", format!("pause_{}", alert.id)),
        ]);

        InlineKeyboardMarkup {
            inline_keyboard: keyboard,
        }
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn price_drop(
        &self,
        alert: &Alert,
        old_price: f64,
        new_price: f64,
        booking_url: Option<&str>,
    ) -> NotificationOutcome {
        let text = price_drop_message(alert, old_price, new_price);
        let markup = Self::price_drop_keyboard(alert, booking_url);

        let result = self
            .send_message(&alert.user_id, text, Some(markup))
            .await;
        match &result {
            Ok(()) => info!(alert_id = alert.id, route = %alert.route(), "price drop notification sent"),
            Err(e) => warn!(alert_id = alert.id, error = %e, "price drop notification failed"),
        }
        NotificationOutcome::from_result(result)
    }

    async fn alert_created(&self, alert: &Alert) -> NotificationOutcome {
        let text = alert_created_message(alert);
        let result = self.send_message(&alert.user_id, text, None).await;
        if let Err(e) = &result {
            warn!(alert_id = alert.id, error = %e, "creation confirmation failed");
        }
        NotificationOutcome::from_result(result)
    }

    async fn expiring_soon(&self, alert: &Alert, days_left: i64) -> NotificationOutcome {
        let text = expiring_soon_message(alert, days_left);
        let result = self.send_message(&alert.user_id, text, None).await;
        if let Err(e) = &result {
            warn!(alert_id = alert.id, error = %e, "expiry warning failed");
        }
        NotificationOutcome::from_result(result)
    }
}

/// Format a fare with its currency
fn format_money(price: f64, currency: &str) -> String {
    if currency == "USD" {
        format!("${price:.2}")
    } else {
        format!("{price:.2} {currency}")
    }
}

/// Body of the price-drop message
pub fn price_drop_message(alert: &Alert, old_price: f64, new_price: f64) -> String {
    let savings = old_price - new_price;
    let savings_percent = if old_price > 0.0 {
        savings / old_price * 100.0
    } else {
        0.0
    };

    let mut message = format!(
        "🎉 *Price Drop Alert!*\n\n\
         🛫 *{}* → *{}*\n\n\
         💰 *New Price:* {}\n\
         📉 *Was:* {}\n\
         ✅ *You Save:* {} ({savings_percent:.1}%)\n\n",
        alert.origin,
        alert.destination,
        format_money(new_price, &alert.currency),
        format_money(old_price, &alert.currency),
        format_money(savings, &alert.currency),
    );

    if let Some(departure) = alert.departure_date {
        message.push_str(&format!(
            "📅 *Departure:* {}\n",
            departure.format("%B %d, %Y")
        ));
    }
    if let Some(ret) = alert.return_date {
        message.push_str(&format!("📅 *Return:* {}\n", ret.format("%B %d, %Y")));
    }
    if let Some(lowest) = alert.lowest_price {
        message.push_str(&format!(
            "\n🏆 *Lowest Ever:* {}\n",
            format_money(lowest, &alert.currency)
        ));
    }

    message.push_str(&format!(
        "\n🎯 *Your Target:* {}",
        format_money(alert.target_price, &alert.currency)
    ));
    if new_price <= alert.target_price {
        message.push_str(" ✅ *TARGET REACHED!*");
    }

    message
}

/// Body of the creation confirmation
pub fn alert_created_message(alert: &Alert) -> String {
    let mut message = format!(
        "✅ *Alert Created Successfully!*\n\n\
         🛫 *{}* → *{}*\n\
         🎯 *Target Price:* {}\n\n",
        alert.origin,
        alert.destination,
        format_money(alert.target_price, &alert.currency),
    );

    if let Some(departure) = alert.departure_date {
        message.push_str(&format!("📅 *Departure:* {}\n", departure.format("%Y-%m-%d")));
    }
    if let Some(ret) = alert.return_date {
        message.push_str(&format!("📅 *Return:* {}\n", ret.format("%Y-%m-%d")));
    }

    message.push_str(
        "\nI'll monitor prices and notify you when they drop!\n\n\
         Use /alerts to review your alerts.",
    );
    message
}

/// Body of the expiry warning
pub fn expiring_soon_message(alert: &Alert, days_left: i64) -> String {
    let current = alert
        .last_price
        .map(|p| format_money(p, &alert.currency))
        .unwrap_or_else(|| "N/A".to_string());

    format!(
        "⏰ *Alert Expiring Soon*\n\n\
         Your alert for {} → {} will expire in {} day{}.\n\n\
         🎯 Target: {}\n\
         💰 Current: {current}\n\n\
         Use /alerts to review your alerts.",
        alert.origin,
        alert.destination,
        days_left,
        if days_left == 1 { "" } else { "s" },
        format_money(alert.target_price, &alert.currency),
    )
}

// Telegram payload types

/// Inline keyboard attached to a message
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Button rows
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// One inline keyboard button
#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    /// Button label
    pub text: String,
    /// Link opened on tap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Callback payload sent on tap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

impl InlineKeyboardButton {
    fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: Some(url.into()),
            callback_data: None,
        }
    }

    fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            url: None,
            callback_data: Some(data.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct SendMessagePayload {
    chat_id: String,
    text: String,
    parse_mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertStatus;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> Alert {
        Alert {
            id: 7,
            user_id: "123456789".to_string(),
            origin: "JFK".to_string(),
            destination: "LHR".to_string(),
            departure_date: None,
            return_date: None,
            target_price: 450.0,
            currency: "USD".to_string(),
            status: AlertStatus::Active,
            check_frequency_hours: 6,
            last_checked_at: None,
            last_price: Some(480.0),
            lowest_price: Some(399.0),
            last_notified_at: None,
            triggered_at: None,
            triggered_price: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn notifier_for(server: &MockServer) -> TelegramNotifier {
        TelegramNotifier::new(&TelegramConfig {
            bot_token: "test-token".to_string(),
            api_base: server.uri(),
            poll_timeout_secs: 30,
        })
        .unwrap()
    }

    #[test]
    fn price_drop_message_reports_savings_and_target() {
        let message = price_drop_message(&alert(), 480.0, 412.0);
        assert!(message.contains("*JFK* → *LHR*"));
        assert!(message.contains("$412.00"));
        assert!(message.contains("$68.00 (14.2%)"));
        assert!(message.contains("🏆 *Lowest Ever:* $399.00"));
        assert!(message.contains("TARGET REACHED"));
    }

    #[test]
    fn price_drop_above_target_has_no_reached_marker() {
        let message = price_drop_message(&alert(), 480.0, 460.0);
        assert!(!message.contains("TARGET REACHED"));
    }

    #[test]
    fn non_usd_prices_carry_the_currency_code() {
        let mut alert = alert();
        alert.currency = "EUR".to_string();
        let message = price_drop_message(&alert, 480.0, 412.0);
        assert!(message.contains("412.00 EUR"));
    }

    #[test]
    fn expiring_soon_pluralizes_days() {
        assert!(expiring_soon_message(&alert(), 1).contains("in 1 day."));
        assert!(expiring_soon_message(&alert(), 3).contains("in 3 days."));
    }

    #[tokio::test]
    async fn send_message_posts_markdown_to_the_chat() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .and(body_partial_json(serde_json::json!({
                "chat_id": "123456789",
                "parse_mode": "Markdown"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = notifier_for(&server)
            .price_drop(&alert(), 480.0, 412.0, Some("https://kiwi.com/x"))
            .await;
        assert!(outcome.success, "{:?}", outcome.error);
    }

    #[tokio::test]
    async fn telegram_level_failure_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bottest-token/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let outcome = notifier_for(&server).alert_created(&alert()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("chat not found"));
    }

    #[test]
    fn unconfigured_token_refuses_to_send() {
        let notifier = TelegramNotifier::new(&TelegramConfig::default()).unwrap();
        let result = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(notifier.send_message("1", "hi".to_string(), None));
        assert!(matches!(result, Err(Error::Telegram(_))));
        assert_eq!(
            result.unwrap_err().to_string(),
            "Telegram error: bot token not configured"
        );
    }
}
