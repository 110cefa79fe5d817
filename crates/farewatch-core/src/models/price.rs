//! Price and flight-offer data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::alert::is_iata_code;

/// One observed fare for an alert's route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unique identifier
    pub id: i64,
    /// Alert this observation belongs to
    pub alert_id: i64,
    /// Observed fare
    pub price: f64,
    /// Currency code
    pub currency: String,
    /// Raw offer snapshot from the flight-search API
    pub flight_data: Option<serde_json::Value>,
    /// When the fare was observed
    pub found_at: DateTime<Utc>,
}

/// Aggregated price history for a route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStats {
    /// Route label, e.g. `JFK-LHR`
    pub route: String,
    /// Lowest fare in the window
    pub min_price: f64,
    /// Highest fare in the window
    pub max_price: f64,
    /// Mean fare in the window
    pub avg_price: f64,
    /// Most recent fare in the window
    pub latest_price: Option<f64>,
    /// Number of observations
    pub samples: i64,
    /// Trailing window size in days
    pub window_days: i64,
}

/// One result from a Tequila flight search.
///
/// Only the fields the service consumes; the full payload is kept verbatim
/// in `PricePoint::flight_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightOffer {
    /// Fare in the requested currency
    pub price: f64,
    /// Origin city name
    #[serde(rename = "cityFrom", default)]
    pub city_from: Option<String>,
    /// Destination city name
    #[serde(rename = "cityTo", default)]
    pub city_to: Option<String>,
    /// Operating airline codes
    #[serde(default)]
    pub airlines: Vec<String>,
    /// Departure time in local time, RFC 3339
    #[serde(default)]
    pub local_departure: Option<String>,
    /// Booking link
    #[serde(default)]
    pub deep_link: Option<String>,
}

/// Parameters for a flight search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Origin airport IATA code
    pub origin: String,
    /// Destination airport IATA code
    pub destination: String,
    /// Departure date; the client defaults this to tomorrow
    #[serde(default)]
    pub departure_date: Option<DateTime<Utc>>,
    /// Return date for round trips
    #[serde(default)]
    pub return_date: Option<DateTime<Utc>>,
    /// Currency override
    #[serde(default)]
    pub currency: Option<String>,
    /// Result limit override
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SearchQuery {
    /// Build a one-way query for a route
    pub fn route(origin: &str, destination: &str) -> Self {
        Self {
            origin: origin.to_ascii_uppercase(),
            destination: destination.to_ascii_uppercase(),
            departure_date: None,
            return_date: None,
            currency: None,
            limit: None,
        }
    }

    /// Validate and normalize the query in place
    pub fn validate(&mut self) -> Result<()> {
        if !is_iata_code(&self.origin) {
            return Err(Error::validation(format!(
                "origin must be a 3-letter IATA code, got '{}'",
                self.origin
            )));
        }
        if !is_iata_code(&self.destination) {
            return Err(Error::validation(format!(
                "destination must be a 3-letter IATA code, got '{}'",
                self.destination
            )));
        }
        self.origin = self.origin.to_ascii_uppercase();
        self.destination = self.destination.to_ascii_uppercase();
        Ok(())
    }
}

/// Parse a `ORG-DST` route label into its endpoints
pub fn parse_route(route: &str) -> Result<(String, String)> {
    let Some((origin, destination)) = route.split_once('-') else {
        return Err(Error::validation(format!(
            "route must look like 'JFK-LHR', got '{route}'"
        )));
    };
    if !is_iata_code(origin) || !is_iata_code(destination) {
        return Err(Error::validation(format!(
            "route must pair two 3-letter IATA codes, got '{route}'"
        )));
    }
    Ok((
        origin.to_ascii_uppercase(),
        destination.to_ascii_uppercase(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn route_labels_parse() {
        let (origin, destination) = parse_route("jfk-LHR").unwrap();
        assert_eq!(origin, "JFK");
        assert_eq!(destination, "LHR");
    }

    #[test]
    fn bad_route_labels_are_rejected() {
        for route in ["JFKLHR", "JFK->LHR", "J-L", "JFK-", "-LHR", ""] {
            assert!(parse_route(route).is_err(), "accepted {route:?}");
        }
    }

    #[test]
    fn offer_deserializes_from_tequila_payload() {
        let offer: FlightOffer = serde_json::from_value(serde_json::json!({
            "price": 423.0,
            "cityFrom": "New York",
            "cityTo": "London",
            "airlines": ["BA"],
            "local_departure": "2026-09-14T08:30:00.000Z",
            "deep_link": "https://www.kiwi.com/deep?from=JFK",
            "flyFrom": "JFK",
            "quality": 731.4
        }))
        .unwrap();
        assert_eq!(offer.price, 423.0);
        assert_eq!(offer.city_to.as_deref(), Some("London"));
        assert_eq!(offer.airlines, vec!["BA".to_string()]);
        assert!(offer.deep_link.is_some());
    }
}
