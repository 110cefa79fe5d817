//! Periodic price checking for alerts
//!
//! The checker sweeps on a fixed interval: it expires alerts past their
//! expiry date, warns on alerts about to expire, then checks every due
//! alert against the flight-search API and notifies on a drop through the
//! target price.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::CheckerConfig;
use crate::db::{AlertEvent, PriceCache};
use crate::error::{Error, Result};
use crate::flights::TequilaClient;
use crate::models::{Alert, AlertStatus, SearchQuery};

use super::notifier::Notify;
use super::repository::{AlertRepository, PriceHistoryRepository};

/// What a fare observation means for an alert
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PriceSignal {
    /// No previous fare, or the fare did not drop
    None,
    /// The fare dropped but stays above the target
    Drop {
        /// Drop size relative to the previous fare, in percent
        percent: f64,
    },
    /// The fare dropped to or below the target
    TargetHit {
        /// Drop size relative to the previous fare, in percent
        percent: f64,
    },
}

/// Decide what a new fare means given the previous fare and the target.
///
/// A notification-worthy signal requires a previous observation and a drop;
/// a first-ever fare below the target stays silent until the next sweep
/// confirms it.
pub fn evaluate(previous: Option<f64>, current: f64, target: f64) -> PriceSignal {
    let Some(previous) = previous else {
        return PriceSignal::None;
    };
    if current >= previous {
        return PriceSignal::None;
    }

    let percent = (previous - current) / previous * 100.0;
    if current <= target {
        PriceSignal::TargetHit { percent }
    } else {
        PriceSignal::Drop { percent }
    }
}

/// Exponential backoff delay for a retry attempt (0-based), with jitter
fn backoff_delay(attempt: u32, base: Duration) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..1000);
    base * 2u32.saturating_pow(attempt) + Duration::from_millis(jitter)
}

/// How a single alert check concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    /// A fare was fetched and recorded
    Checked,
    /// The search returned no offers
    NoData,
    /// The alert was not in a checkable state
    Skipped,
}

/// Result of checking one alert
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    /// Alert that was checked
    pub alert_id: i64,
    /// Route label
    pub route: String,
    /// How the check concluded
    pub status: CheckStatus,
    /// Fare observed in this check
    pub current_price: Option<f64>,
    /// Fare observed in the previous check
    pub previous_price: Option<f64>,
    /// Whether the fare dropped since the previous check
    pub price_dropped: bool,
    /// Drop size in percent, when the fare dropped
    pub drop_percentage: Option<f64>,
    /// Whether a notification went out
    pub notified: bool,
}

impl CheckOutcome {
    fn empty(alert: &Alert, status: CheckStatus) -> Self {
        Self {
            alert_id: alert.id,
            route: alert.route(),
            status,
            current_price: None,
            previous_price: alert.last_price,
            price_dropped: false,
            drop_percentage: None,
            notified: false,
        }
    }
}

/// Periodically checks alerts and dispatches notifications
pub struct PriceChecker {
    alerts: AlertRepository,
    history: PriceHistoryRepository,
    flights: TequilaClient,
    notifier: Arc<dyn Notify>,
    cache: PriceCache,
    config: CheckerConfig,
}

impl PriceChecker {
    /// Create a new price checker
    pub fn new(
        alerts: AlertRepository,
        history: PriceHistoryRepository,
        flights: TequilaClient,
        notifier: Arc<dyn Notify>,
        cache: PriceCache,
        config: CheckerConfig,
    ) -> Self {
        Self {
            alerts,
            history,
            flights,
            notifier,
            cache,
            config,
        }
    }

    /// Run the sweep loop until the task is dropped
    pub async fn start(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting price checker"
        );

        let mut ticker = interval(self.config.interval);

        loop {
            ticker.tick().await;

            match self.sweep().await {
                Ok(outcomes) => {
                    let notified = outcomes.iter().filter(|o| o.notified).count();
                    info!(checked = outcomes.len(), notified, "Sweep finished");
                }
                Err(e) => error!(error = %e, "Sweep failed"),
            }
        }
    }

    /// Run one full sweep: expiry pass, then every due alert
    pub async fn sweep(&self) -> Result<Vec<CheckOutcome>> {
        let now = Utc::now();

        self.expiry_pass(now).await?;

        let due = self.alerts.list_due(now).await?;
        debug!(count = due.len(), "Checking due alerts");

        let mut outcomes = Vec::with_capacity(due.len());
        for alert in due {
            match self.check_with_retry(&alert).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => error!(alert_id = alert.id, error = %e, "Alert check failed"),
            }
        }

        Ok(outcomes)
    }

    /// Expire overdue alerts and warn on soon-to-expire ones
    async fn expiry_pass(&self, now: chrono::DateTime<Utc>) -> Result<()> {
        let expired = self.alerts.expire_overdue(now).await?;
        for alert in &expired {
            info!(alert_id = alert.id, route = %alert.route(), "Alert expired");
        }

        let warn_until = now
            + chrono::Duration::from_std(self.config.expiry_warn_window)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        for alert in self.alerts.list_expiring(now, warn_until).await? {
            if !alert.cooldown_elapsed(now, self.config.notification_cooldown) {
                continue;
            }
            let Some(expires_at) = alert.expires_at else {
                continue;
            };
            let days_left = ((expires_at - now).num_hours().max(0) + 23) / 24;
            let outcome = self.notifier.expiring_soon(&alert, days_left.max(1)).await;
            if outcome.success {
                self.alerts.mark_notified(alert.id, now).await?;
            }
        }

        Ok(())
    }

    /// Check one alert, retrying transient failures with backoff
    pub async fn check_with_retry(&self, alert: &Alert) -> Result<CheckOutcome> {
        let mut attempt = 0;
        loop {
            match self.check_alert(alert).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if attempt + 1 < self.config.max_retries => {
                    let delay = backoff_delay(attempt, self.config.retry_base_delay);
                    warn!(
                        alert_id = alert.id,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Check failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Check a single alert once
    pub async fn check_alert(&self, alert: &Alert) -> Result<CheckOutcome> {
        if alert.status != AlertStatus::Active {
            return Ok(CheckOutcome::empty(alert, CheckStatus::Skipped));
        }

        let query = SearchQuery {
            origin: alert.origin.clone(),
            destination: alert.destination.clone(),
            departure_date: alert.departure_date,
            return_date: alert.return_date,
            currency: Some(alert.currency.clone()),
            limit: None,
        };

        let Some(offer) = self.flights.cheapest(&query).await? else {
            debug!(alert_id = alert.id, route = %alert.route(), "No offers found");
            return Ok(CheckOutcome::empty(alert, CheckStatus::NoData));
        };

        let now = Utc::now();
        let current = offer.price;
        let previous = alert.last_price;

        let snapshot = serde_json::to_value(&offer)?;
        self.history
            .insert(alert.id, current, &alert.currency, Some(&snapshot))
            .await?;
        self.alerts.record_check(alert.id, current, now).await?;

        if let Err(e) = self
            .cache
            .set_route_price(&alert.origin, &alert.destination, current)
            .await
        {
            warn!(alert_id = alert.id, error = %e, "Failed to refresh route cache");
        }

        let signal = evaluate(previous, current, alert.target_price);
        debug!(
            alert_id = alert.id,
            current,
            previous = ?previous,
            target = alert.target_price,
            signal = ?signal,
            "Evaluated fare"
        );

        let mut notified = false;
        if let PriceSignal::TargetHit { .. } = signal {
            if alert.cooldown_elapsed(now, self.config.notification_cooldown) {
                notified = self.dispatch_target_hit(alert, &offer, previous, now).await?;
            } else {
                debug!(alert_id = alert.id, "Target hit inside cooldown, holding");
            }
        }

        let drop_percentage = match signal {
            PriceSignal::Drop { percent } | PriceSignal::TargetHit { percent } => Some(percent),
            PriceSignal::None => None,
        };

        Ok(CheckOutcome {
            alert_id: alert.id,
            route: alert.route(),
            status: CheckStatus::Checked,
            current_price: Some(current),
            previous_price: previous,
            price_dropped: drop_percentage.is_some(),
            drop_percentage,
            notified,
        })
    }

    /// Notify the user and move the alert to `triggered`.
    ///
    /// A failed send leaves the alert active so the next sweep retries.
    async fn dispatch_target_hit(
        &self,
        alert: &Alert,
        offer: &crate::models::FlightOffer,
        previous: Option<f64>,
        now: chrono::DateTime<Utc>,
    ) -> Result<bool> {
        let old_price = previous.unwrap_or(alert.target_price);
        let outcome = self
            .notifier
            .price_drop(alert, old_price, offer.price, offer.deep_link.as_deref())
            .await;

        if !outcome.success {
            warn!(
                alert_id = alert.id,
                error = ?outcome.error,
                "Notification failed, alert stays active"
            );
            return Ok(false);
        }

        self.alerts.mark_triggered(alert.id, offer.price, now).await?;
        self.alerts.mark_notified(alert.id, now).await?;

        let event = AlertEvent {
            alert_id: alert.id,
            user_id: alert.user_id.clone(),
            route: alert.route(),
            price: offer.price,
            target_price: alert.target_price,
            currency: alert.currency.clone(),
        };
        if let Err(e) = self.cache.publish_alert_event(&event).await {
            warn!(alert_id = alert.id, error = %e, "Failed to publish alert event");
        }

        info!(
            alert_id = alert.id,
            route = %alert.route(),
            price = offer.price,
            target = alert.target_price,
            "Alert triggered"
        );
        Ok(true)
    }

    /// Check a single alert by id, regardless of due time
    pub async fn check_one(&self, alert_id: i64) -> Result<CheckOutcome> {
        let alert = self
            .alerts
            .get(alert_id)
            .await?
            .ok_or_else(|| Error::not_found("alert", alert_id))?;
        self.check_with_retry(&alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn first_observation_never_signals() {
        assert_eq!(evaluate(None, 100.0, 500.0), PriceSignal::None);
    }

    #[test]
    fn rising_fares_never_signal() {
        assert_eq!(evaluate(Some(400.0), 450.0, 500.0), PriceSignal::None);
        assert_eq!(evaluate(Some(400.0), 400.0, 500.0), PriceSignal::None);
    }

    #[test]
    fn drop_above_target_is_a_plain_drop() {
        match evaluate(Some(600.0), 540.0, 500.0) {
            PriceSignal::Drop { percent } => assert!((percent - 10.0).abs() < 1e-9),
            other => panic!("expected Drop, got {other:?}"),
        }
    }

    #[rstest]
    #[case(500.0, 450.0, 500.0)] // drops through the target
    #[case(600.0, 500.0, 500.0)] // lands exactly on the target
    fn drop_through_target_signals_a_hit(
        #[case] previous: f64,
        #[case] current: f64,
        #[case] target: f64,
    ) {
        assert!(matches!(
            evaluate(Some(previous), current, target),
            PriceSignal::TargetHit { .. }
        ));
    }

    #[test]
    fn backoff_grows_exponentially() {
        let base = Duration::from_secs(60);
        let d0 = backoff_delay(0, base);
        let d1 = backoff_delay(1, base);
        let d2 = backoff_delay(2, base);
        assert!(d0 >= Duration::from_secs(60) && d0 < Duration::from_secs(61));
        assert!(d1 >= Duration::from_secs(120) && d1 < Duration::from_secs(121));
        assert!(d2 >= Duration::from_secs(240) && d2 < Duration::from_secs(241));
    }
}
