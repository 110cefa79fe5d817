//! Kiwi Tequila flight-search API client

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::TequilaConfig;
use crate::error::{Error, Result};
use crate::models::{FlightOffer, SearchQuery};

/// Dates on the Tequila wire are day-first
const TEQUILA_DATE_FORMAT: &str = "%d/%m/%Y";

/// Client for the Kiwi Tequila flight-search API
#[derive(Clone)]
pub struct TequilaClient {
    client: Client,
    base_url: String,
    api_key: String,
    currency: String,
    search_limit: u32,
}

/// An airport returned by the locations endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    /// IATA code
    pub id: String,
    /// Airport name
    pub name: String,
    /// City the airport belongs to
    #[serde(default)]
    pub city: Option<LocationCity>,
}

/// City part of a location result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationCity {
    /// City name
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<FlightOffer>,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    locations: Vec<Location>,
}

impl TequilaClient {
    /// Create a new client from configuration
    pub fn new(config: &TequilaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            currency: config.currency.clone(),
            search_limit: config.search_limit,
        })
    }

    /// Search for flights on a route, cheapest first.
    ///
    /// When the query has no departure date the search defaults to tomorrow,
    /// mirroring how alerts without fixed dates are tracked.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>> {
        let departure = query
            .departure_date
            .unwrap_or_else(|| Utc::now() + Duration::days(1));

        let mut params: Vec<(&str, String)> = vec![
            ("fly_from", query.origin.clone()),
            ("fly_to", query.destination.clone()),
            ("date_from", format_date(departure)),
            ("date_to", format_date(departure)),
            ("adults", "1".to_string()),
            (
                "curr",
                query.currency.clone().unwrap_or_else(|| self.currency.clone()),
            ),
            (
                "limit",
                query.limit.unwrap_or(self.search_limit).to_string(),
            ),
            ("sort", "price".to_string()),
        ];

        if let Some(return_date) = query.return_date {
            params.push(("return_from", format_date(return_date)));
            params.push(("return_to", format_date(return_date)));
        }

        let mut request = self
            .client
            .get(format!("{}/v2/search", self.base_url))
            .query(&params);
        if !self.api_key.is_empty() {
            request = request.header("apikey", &self.api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::flight_api(format!(
                "search returned {status}: {body}"
            )));
        }

        let parsed: SearchResponse = response.json().await?;
        Ok(parsed.data)
    }

    /// Cheapest current offer for a query, if any
    pub async fn cheapest(&self, query: &SearchQuery) -> Result<Option<FlightOffer>> {
        let offers = self.search(query).await?;
        Ok(offers.into_iter().next())
    }

    /// Look up an airport by IATA code or name
    pub async fn locations(&self, term: &str) -> Result<Option<Location>> {
        let mut request = self
            .client
            .get(format!("{}/locations", self.base_url))
            .query(&[("term", term), ("location_types", "airport")]);
        if !self.api_key.is_empty() {
            request = request.header("apikey", &self.api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::flight_api(format!("locations returned {status}")));
        }

        let parsed: LocationsResponse = response.json().await?;
        Ok(parsed.locations.into_iter().next())
    }
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format(TEQUILA_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> TequilaClient {
        TequilaClient::new(&TequilaConfig {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            currency: "USD".to_string(),
            search_limit: 10,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn search_sends_route_dates_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .and(header("apikey", "test-key"))
            .and(query_param("fly_from", "JFK"))
            .and(query_param("fly_to", "LHR"))
            .and(query_param("date_from", "14/09/2026"))
            .and(query_param("date_to", "14/09/2026"))
            .and(query_param("sort", "price"))
            .and(query_param("curr", "USD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"price": 423.0, "cityFrom": "New York", "cityTo": "London",
                     "airlines": ["BA"], "deep_link": "https://kiwi.com/x"},
                    {"price": 512.0, "cityFrom": "New York", "cityTo": "London"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut query = SearchQuery::route("JFK", "LHR");
        query.departure_date = Some(Utc.with_ymd_and_hms(2026, 9, 14, 12, 0, 0).unwrap());

        let offers = client_for(&server).search(&query).await.unwrap();
        assert_eq!(offers.len(), 2);
        assert_eq!(offers[0].price, 423.0);
    }

    #[tokio::test]
    async fn round_trip_queries_carry_return_dates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .and(query_param("return_from", "21/09/2026"))
            .and(query_param("return_to", "21/09/2026"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let mut query = SearchQuery::route("JFK", "LHR");
        query.departure_date = Some(Utc.with_ymd_and_hms(2026, 9, 14, 12, 0, 0).unwrap());
        query.return_date = Some(Utc.with_ymd_and_hms(2026, 9, 21, 12, 0, 0).unwrap());

        let offers = client_for(&server).search(&query).await.unwrap();
        assert!(offers.is_empty());
    }

    #[tokio::test]
    async fn cheapest_takes_the_first_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"price": 199.0}, {"price": 350.0}]
            })))
            .mount(&server)
            .await;

        let offer = client_for(&server)
            .cheapest(&SearchQuery::route("JFK", "LHR"))
            .await
            .unwrap();
        assert_eq!(offer.unwrap().price, 199.0);
    }

    #[tokio::test]
    async fn upstream_errors_surface_as_flight_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/search"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .search(&SearchQuery::route("JFK", "LHR"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FlightApi(_)));
    }

    #[tokio::test]
    async fn locations_returns_the_first_airport() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/locations"))
            .and(query_param("term", "JFK"))
            .and(query_param("location_types", "airport"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "locations": [
                    {"id": "JFK", "name": "John F. Kennedy International",
                     "city": {"name": "New York"}}
                ]
            })))
            .mount(&server)
            .await;

        let location = client_for(&server).locations("JFK").await.unwrap().unwrap();
        assert_eq!(location.id, "JFK");
        assert_eq!(location.city.unwrap().name, "New York");
    }
}
