//! Alert data models

use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

static IATA_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]{3}$").expect("valid regex"));

/// Whether a string looks like a 3-letter IATA airport code
pub(crate) fn is_iata_code(s: &str) -> bool {
    IATA_CODE.is_match(s)
}

/// Lifecycle state of a price alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Alert is being checked
    #[default]
    Active,
    /// Alert is suspended by the user
    Paused,
    /// Target price was hit and the user was notified
    Triggered,
    /// Alert passed its expiry date
    Expired,
}

impl AlertStatus {
    /// Database/string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Paused => "paused",
            AlertStatus::Triggered => "triggered",
            AlertStatus::Expired => "expired",
        }
    }

    /// Parse the database representation, rejecting unknown values
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "paused" => Ok(AlertStatus::Paused),
            "triggered" => Ok(AlertStatus::Triggered),
            "expired" => Ok(AlertStatus::Expired),
            other => Err(Error::validation(format!("unknown alert status: {other}"))),
        }
    }
}

/// A flight-price alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique identifier
    pub id: i64,

    /// Owning user: Telegram chat id or an external id
    pub user_id: String,

    /// Origin airport IATA code (uppercase)
    pub origin: String,

    /// Destination airport IATA code (uppercase)
    pub destination: String,

    /// Preferred departure date
    pub departure_date: Option<DateTime<Utc>>,

    /// Return date for round trips
    pub return_date: Option<DateTime<Utc>>,

    /// Price threshold that triggers a notification
    pub target_price: f64,

    /// Currency code for the threshold
    pub currency: String,

    /// Lifecycle state
    pub status: AlertStatus,

    /// Hours between price checks
    pub check_frequency_hours: i32,

    /// When the route was last checked
    pub last_checked_at: Option<DateTime<Utc>>,

    /// Fare observed at the last check
    pub last_price: Option<f64>,

    /// Lowest fare ever observed
    pub lowest_price: Option<f64>,

    /// When the user was last notified about this alert
    pub last_notified_at: Option<DateTime<Utc>>,

    /// When the target price was hit
    pub triggered_at: Option<DateTime<Utc>>,

    /// Fare that hit the target
    pub triggered_price: Option<f64>,

    /// When the alert stops being checked
    pub expires_at: Option<DateTime<Utc>>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Route label, e.g. `JFK-LHR`
    pub fn route(&self) -> String {
        format!("{}-{}", self.origin, self.destination)
    }

    /// Whether the alert is in the `active` state
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// Whether this alert is due for a price check
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        if self.status != AlertStatus::Active {
            return false;
        }
        match self.last_checked_at {
            None => true,
            Some(checked) => checked + Duration::hours(i64::from(self.check_frequency_hours)) <= now,
        }
    }

    /// Whether the last observed fare is lower than the one before it
    pub fn is_price_drop(&self, current: f64) -> bool {
        match self.last_price {
            Some(previous) => current < previous,
            None => false,
        }
    }

    /// Whether a fare is at or below the target
    pub fn hits_target(&self, price: f64) -> bool {
        price <= self.target_price
    }

    /// Whether enough time passed since the last notification
    pub fn cooldown_elapsed(&self, now: DateTime<Utc>, cooldown: std::time::Duration) -> bool {
        match self.last_notified_at {
            None => true,
            Some(notified) => {
                let cooldown = Duration::from_std(cooldown).unwrap_or(Duration::hours(6));
                notified + cooldown <= now
            }
        }
    }
}

/// Input for creating a new alert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInput {
    /// Owning user id
    pub user_id: String,
    /// Origin airport IATA code
    pub origin: String,
    /// Destination airport IATA code
    pub destination: String,
    /// Preferred departure date
    #[serde(default)]
    pub departure_date: Option<DateTime<Utc>>,
    /// Return date for round trips
    #[serde(default)]
    pub return_date: Option<DateTime<Utc>>,
    /// Price threshold
    pub target_price: f64,
    /// Currency code
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Hours between checks (1..=168)
    #[serde(default = "default_frequency")]
    pub check_frequency_hours: i32,
    /// Optional expiry date
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_frequency() -> i32 {
    6
}

impl AlertInput {
    /// Validate and normalize the input in place.
    ///
    /// IATA codes are uppercased; all other fields are checked as-is.
    pub fn validate(&mut self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::validation("user_id must not be empty"));
        }
        if !IATA_CODE.is_match(&self.origin) {
            return Err(Error::validation(format!(
                "origin must be a 3-letter IATA code, got '{}'",
                self.origin
            )));
        }
        if !IATA_CODE.is_match(&self.destination) {
            return Err(Error::validation(format!(
                "destination must be a 3-letter IATA code, got '{}'",
                self.destination
            )));
        }
        self.origin = self.origin.to_ascii_uppercase();
        self.destination = self.destination.to_ascii_uppercase();
        if self.origin == self.destination {
            return Err(Error::validation("origin and destination must differ"));
        }
        if !self.target_price.is_finite() || self.target_price <= 0.0 {
            return Err(Error::validation("target_price must be positive"));
        }
        if !(1..=168).contains(&self.check_frequency_hours) {
            return Err(Error::validation(
                "check_frequency_hours must be between 1 and 168",
            ));
        }
        if let (Some(dep), Some(ret)) = (self.departure_date, self.return_date) {
            if ret < dep {
                return Err(Error::validation(
                    "return_date must not be before departure_date",
                ));
            }
        }
        Ok(())
    }
}

/// Patch applied to an existing alert
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertUpdate {
    /// New price threshold
    pub target_price: Option<f64>,
    /// Convenience status switch: true resumes, false pauses
    pub is_active: Option<bool>,
    /// New check frequency
    pub check_frequency_hours: Option<i32>,
    /// New departure date
    pub departure_date: Option<DateTime<Utc>>,
    /// New return date
    pub return_date: Option<DateTime<Utc>>,
    /// New expiry date
    pub expires_at: Option<DateTime<Utc>>,
}

impl AlertUpdate {
    /// Validate the patch
    pub fn validate(&self) -> Result<()> {
        if let Some(price) = self.target_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::validation("target_price must be positive"));
            }
        }
        if let Some(freq) = self.check_frequency_hours {
            if !(1..=168).contains(&freq) {
                return Err(Error::validation(
                    "check_frequency_hours must be between 1 and 168",
                ));
            }
        }
        Ok(())
    }

    /// Status implied by the `is_active` switch, if any
    pub fn status(&self) -> Option<AlertStatus> {
        self.is_active.map(|active| {
            if active {
                AlertStatus::Active
            } else {
                AlertStatus::Paused
            }
        })
    }
}

/// Filter for listing alerts
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlertFilter {
    /// Only alerts owned by this user
    pub user_id: Option<String>,
    /// Only alerts in this state
    pub status: Option<AlertStatus>,
    /// Page size (clamped to 1..=100, default 50)
    pub limit: Option<i64>,
    /// Page offset
    pub offset: Option<i64>,
}

impl AlertFilter {
    /// Effective page size
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 100)
    }

    /// Effective page offset
    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn input(origin: &str, destination: &str, price: f64) -> AlertInput {
        AlertInput {
            user_id: "123456789".to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date: None,
            return_date: None,
            target_price: price,
            currency: "USD".to_string(),
            check_frequency_hours: 6,
            expires_at: None,
        }
    }

    fn alert() -> Alert {
        Alert {
            id: 1,
            user_id: "123456789".to_string(),
            origin: "JFK".to_string(),
            destination: "LHR".to_string(),
            departure_date: None,
            return_date: None,
            target_price: 500.0,
            currency: "USD".to_string(),
            status: AlertStatus::Active,
            check_frequency_hours: 6,
            last_checked_at: None,
            last_price: None,
            lowest_price: None,
            last_notified_at: None,
            triggered_at: None,
            triggered_price: None,
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_input_normalizes_iata() {
        let mut input = input("jfk", "lhr", 500.0);
        input.validate().unwrap();
        assert_eq!(input.origin, "JFK");
        assert_eq!(input.destination, "LHR");
    }

    #[rstest]
    #[case("INVALID", "LHR")]
    #[case("J1K", "LHR")]
    #[case("JFK", "")]
    #[case("JFK", "LHRX")]
    fn bad_iata_codes_are_rejected(#[case] origin: &str, #[case] destination: &str) {
        let mut input = input(origin, destination, 500.0);
        assert!(matches!(input.validate(), Err(Error::Validation(_))));
    }

    #[rstest]
    #[case(0.0)]
    #[case(-10.0)]
    #[case(f64::NAN)]
    #[case(f64::INFINITY)]
    fn bad_prices_are_rejected(#[case] price: f64) {
        let mut input = input("JFK", "LHR", price);
        assert!(matches!(input.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn same_route_endpoints_are_rejected() {
        let mut input = input("jfk", "JFK", 500.0);
        assert!(matches!(input.validate(), Err(Error::Validation(_))));
    }

    #[rstest]
    #[case(0)]
    #[case(169)]
    fn out_of_range_frequency_is_rejected(#[case] hours: i32) {
        let mut input = input("JFK", "LHR", 500.0);
        input.check_frequency_hours = hours;
        assert!(matches!(input.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn return_before_departure_is_rejected() {
        let mut input = input("JFK", "LHR", 500.0);
        input.departure_date = Some(Utc::now() + Duration::days(10));
        input.return_date = Some(Utc::now() + Duration::days(5));
        assert!(matches!(input.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn never_checked_alert_is_due() {
        let alert = alert();
        assert!(alert.is_due(Utc::now()));
    }

    #[test]
    fn recently_checked_alert_is_not_due() {
        let mut alert = alert();
        let now = Utc::now();
        alert.last_checked_at = Some(now - Duration::hours(1));
        assert!(!alert.is_due(now));
        alert.last_checked_at = Some(now - Duration::hours(7));
        assert!(alert.is_due(now));
    }

    #[test]
    fn paused_alert_is_never_due() {
        let mut alert = alert();
        alert.status = AlertStatus::Paused;
        assert!(!alert.is_due(Utc::now()));
    }

    #[test]
    fn price_drop_requires_a_previous_price() {
        let mut alert = alert();
        assert!(!alert.is_price_drop(100.0));
        alert.last_price = Some(450.0);
        assert!(alert.is_price_drop(400.0));
        assert!(!alert.is_price_drop(450.0));
    }

    #[test]
    fn update_status_switch_maps_to_states() {
        let update = AlertUpdate {
            is_active: Some(false),
            ..Default::default()
        };
        assert_eq!(update.status(), Some(AlertStatus::Paused));
        let update = AlertUpdate {
            is_active: Some(true),
            ..Default::default()
        };
        assert_eq!(update.status(), Some(AlertStatus::Active));
    }

    #[test]
    fn filter_limits_are_clamped() {
        let filter = AlertFilter {
            limit: Some(1000),
            offset: Some(-5),
            ..Default::default()
        };
        assert_eq!(filter.limit(), 100);
        assert_eq!(filter.offset(), 0);
        assert_eq!(AlertFilter::default().limit(), 50);
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            AlertStatus::Active,
            AlertStatus::Paused,
            AlertStatus::Triggered,
            AlertStatus::Expired,
        ] {
            assert_eq!(AlertStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(AlertStatus::parse("cancelled").is_err());
    }
}
