//! API handlers for the HTTP REST API

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::alerts::{AlertRepository, Notify, PriceHistoryRepository};
use crate::db::{Database, PriceCache};
use crate::error::Error;
use crate::flights::TequilaClient;
use crate::models::{
    parse_route, Alert, AlertFilter, AlertInput, AlertStatus, AlertUpdate, FlightOffer,
    PricePoint, RouteStats, SearchQuery,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connections, for health checks
    pub db: Database,
    /// Alert repository
    pub alerts: AlertRepository,
    /// Price-history repository
    pub history: PriceHistoryRepository,
    /// Flight-search client
    pub flights: TequilaClient,
    /// Route-fare cache
    pub cache: PriceCache,
    /// Notification sender, for creation confirmations
    pub notifier: Arc<dyn Notify>,
}

/// Error wrapper that maps domain errors onto HTTP statuses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, self.0.to_string()),
            Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()),
            Error::FlightApi(_) => (StatusCode::BAD_GATEWAY, self.0.to_string()),
            other => {
                error!(error = %other, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Alert representation on the wire
#[derive(Debug, Serialize)]
pub struct AlertResponse {
    /// Alert id
    pub id: i64,
    /// Owning user id
    pub user_id: String,
    /// Origin IATA code
    pub origin: String,
    /// Destination IATA code
    pub destination: String,
    /// Preferred departure date
    pub departure_date: Option<DateTime<Utc>>,
    /// Return date
    pub return_date: Option<DateTime<Utc>>,
    /// Price threshold
    pub target_price: f64,
    /// Currency code
    pub currency: String,
    /// Lifecycle state
    pub status: AlertStatus,
    /// Whether the alert is currently checked
    pub is_active: bool,
    /// Hours between checks
    pub check_frequency_hours: i32,
    /// Last check time
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Last observed fare
    pub last_price: Option<f64>,
    /// Lowest fare ever observed
    pub lowest_price: Option<f64>,
    /// Expiry date
    pub expires_at: Option<DateTime<Utc>>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl From<Alert> for AlertResponse {
    fn from(alert: Alert) -> Self {
        let is_active = alert.is_active();
        Self {
            id: alert.id,
            user_id: alert.user_id,
            origin: alert.origin,
            destination: alert.destination,
            departure_date: alert.departure_date,
            return_date: alert.return_date,
            target_price: alert.target_price,
            currency: alert.currency,
            status: alert.status,
            is_active,
            check_frequency_hours: alert.check_frequency_hours,
            last_checked_at: alert.last_checked_at,
            last_price: alert.last_price,
            lowest_price: alert.lowest_price,
            expires_at: alert.expires_at,
            created_at: alert.created_at,
        }
    }
}

// --- Service banner and health ---

/// Service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Farewatch - flight price tracker",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/api/v1",
    }))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,
    /// Response time
    pub timestamp: DateTime<Utc>,
    /// Service version
    pub version: String,
}

/// Basic health check
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness response with dependency status
#[derive(Serialize)]
pub struct ReadinessResponse {
    /// Overall status: healthy or degraded
    pub status: String,
    /// Response time
    pub timestamp: DateTime<Utc>,
    /// Service version
    pub version: String,
    /// Postgres status
    pub database: String,
    /// Redis status
    pub redis: String,
}

/// Readiness check with dependency probes
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.db.postgres.health_check().await {
        Ok(()) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    };
    let redis = match state.db.redis.health_check().await {
        Ok(()) => "healthy".to_string(),
        Err(e) => format!("unhealthy: {e}"),
    };

    let healthy = database == "healthy" && redis == "healthy";
    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: if healthy { "healthy" } else { "degraded" }.to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
            redis,
        }),
    )
}

/// Liveness check for orchestrators
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "alive"}))
}

// --- Alerts ---

/// Create a new alert
pub async fn create_alert(
    State(state): State<AppState>,
    Json(input): Json<AlertInput>,
) -> ApiResult<(StatusCode, Json<AlertResponse>)> {
    let alert = state.alerts.create(input).await?;

    // confirmation only reaches users whose id is a Telegram chat id;
    // best effort, the alert exists either way
    if alert.user_id.parse::<i64>().is_ok() {
        let notifier = state.notifier.clone();
        let created = alert.clone();
        tokio::spawn(async move {
            notifier.alert_created(&created).await;
        });
    }

    Ok((StatusCode::CREATED, Json(alert.into())))
}

/// List alerts with optional filtering
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(filter): Query<AlertFilter>,
) -> ApiResult<Json<Vec<AlertResponse>>> {
    let alerts = state.alerts.list(&filter).await?;
    Ok(Json(alerts.into_iter().map(Into::into).collect()))
}

/// Get a single alert
pub async fn get_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertResponse>> {
    let alert = state
        .alerts
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found("alert", id))?;
    Ok(Json(alert.into()))
}

/// Update an alert
pub async fn update_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<AlertUpdate>,
) -> ApiResult<Json<AlertResponse>> {
    let alert = state
        .alerts
        .update(id, &update)
        .await?
        .ok_or_else(|| Error::not_found("alert", id))?;
    Ok(Json(alert.into()))
}

/// Delete an alert
pub async fn delete_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.alerts.delete(id).await? {
        return Err(Error::not_found("alert", id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Pause an alert
pub async fn pause_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertResponse>> {
    let alert = state
        .alerts
        .set_status(id, AlertStatus::Paused)
        .await?
        .ok_or_else(|| Error::not_found("alert", id))?;
    Ok(Json(alert.into()))
}

/// Resume a paused or triggered alert
pub async fn resume_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AlertResponse>> {
    let alert = state
        .alerts
        .set_status(id, AlertStatus::Active)
        .await?
        .ok_or_else(|| Error::not_found("alert", id))?;
    Ok(Json(alert.into()))
}

/// Query parameters for an alert's history
#[derive(Debug, Deserialize)]
pub struct AlertHistoryQuery {
    /// Maximum number of points (default 100)
    pub limit: Option<i64>,
}

/// Price history for an alert
pub async fn alert_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<AlertHistoryQuery>,
) -> ApiResult<Json<Vec<PricePoint>>> {
    if state.alerts.get(id).await?.is_none() {
        return Err(Error::not_found("alert", id).into());
    }
    let points = state
        .history
        .for_alert(id, query.limit.unwrap_or(100))
        .await?;
    Ok(Json(points))
}

// --- Prices ---

/// Live flight-price search
pub async fn search_prices(
    State(state): State<AppState>,
    Json(mut query): Json<SearchQuery>,
) -> ApiResult<Json<Vec<FlightOffer>>> {
    query.validate()?;
    let offers = state.flights.search(&query).await?;
    Ok(Json(offers))
}

/// Query parameters for route history
#[derive(Debug, Deserialize)]
pub struct RouteHistoryQuery {
    /// Trailing window in days (1..=365, default 30)
    pub days: Option<i64>,
}

/// Route history response: aggregates plus recent points
#[derive(Serialize)]
pub struct RouteHistoryResponse {
    /// Route label
    pub route: String,
    /// Window size in days
    pub days: i64,
    /// Aggregates; absent when the route has no observations
    pub stats: Option<RouteStats>,
    /// Recent observations, newest first
    pub points: Vec<PricePoint>,
}

/// Price history for a route
pub async fn route_history(
    State(state): State<AppState>,
    Path(route): Path<String>,
    Query(query): Query<RouteHistoryQuery>,
) -> ApiResult<Json<RouteHistoryResponse>> {
    let (origin, destination) = parse_route(&route)?;
    let days = query.days.unwrap_or(30).clamp(1, 365);

    let stats = state.history.route_stats(&origin, &destination, days).await?;
    let points = state
        .history
        .for_route(&origin, &destination, days, 100)
        .await?;

    Ok(Json(RouteHistoryResponse {
        route: format!("{origin}-{destination}"),
        days,
        stats,
        points,
    }))
}

/// Current fare for a route
#[derive(Serialize)]
pub struct RoutePriceResponse {
    /// Route label
    pub route: String,
    /// Cheapest known fare, if any
    pub price: Option<f64>,
    /// Where the fare came from: cache or live
    pub source: String,
}

/// Current cheapest fare for a route, cache first
pub async fn route_price(
    State(state): State<AppState>,
    Path(route): Path<String>,
) -> ApiResult<Json<RoutePriceResponse>> {
    let (origin, destination) = parse_route(&route)?;

    if let Ok(Some(price)) = state.cache.get_route_price(&origin, &destination).await {
        return Ok(Json(RoutePriceResponse {
            route: format!("{origin}-{destination}"),
            price: Some(price),
            source: "cache".to_string(),
        }));
    }

    let offer = state
        .flights
        .cheapest(&SearchQuery::route(&origin, &destination))
        .await?;
    if let Some(offer) = &offer {
        // best effort: a cold cache is not an error
        let _ = state
            .cache
            .set_route_price(&origin, &destination, offer.price)
            .await;
    }

    Ok(Json(RoutePriceResponse {
        route: format!("{origin}-{destination}"),
        price: offer.map(|o| o.price),
        source: "live".to_string(),
    }))
}
