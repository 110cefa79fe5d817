//! Repositories for alerts and price history

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::db::PostgresPool;
use crate::error::{Error, Result};
use crate::models::{
    Alert, AlertFilter, AlertInput, AlertStatus, AlertUpdate, PricePoint, RouteStats,
};

/// Repository for alert rows
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

const ALERT_COLUMNS: &str = r#"
    id, user_id, origin, destination, departure_date, return_date,
    target_price, currency, status, check_frequency_hours,
    last_checked_at, last_price, lowest_price, last_notified_at,
    triggered_at, triggered_price, expires_at, created_at, updated_at
"#;

impl AlertRepository {
    /// Create a new alert repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Create a new alert from validated input
    pub async fn create(&self, mut input: AlertInput) -> Result<Alert> {
        input.validate()?;

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            INSERT INTO alerts (
                user_id, origin, destination, departure_date, return_date,
                target_price, currency, check_frequency_hours, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(&input.user_id)
        .bind(&input.origin)
        .bind(&input.destination)
        .bind(input.departure_date)
        .bind(input.return_date)
        .bind(input.target_price)
        .bind(&input.currency)
        .bind(input.check_frequency_hours)
        .bind(input.expires_at)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    /// Get an alert by ID
    pub async fn get(&self, id: i64) -> Result<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List alerts matching a filter, newest first
    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE ($1::text IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        ))
        .bind(&filter.user_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.limit())
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Apply a patch to an alert
    pub async fn update(&self, id: i64, update: &AlertUpdate) -> Result<Option<Alert>> {
        update.validate()?;

        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE alerts SET
                target_price = COALESCE($2, target_price),
                status = COALESCE($3, status),
                check_frequency_hours = COALESCE($4, check_frequency_hours),
                departure_date = COALESCE($5, departure_date),
                return_date = COALESCE($6, return_date),
                expires_at = COALESCE($7, expires_at),
                updated_at = $8
            WHERE id = $1
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(update.target_price)
        .bind(update.status().map(|s| s.as_str()))
        .bind(update.check_frequency_hours)
        .bind(update.departure_date)
        .bind(update.return_date)
        .bind(update.expires_at)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Delete an alert
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Move an alert into a new lifecycle state
    pub async fn set_status(&self, id: i64, status: AlertStatus) -> Result<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE alerts SET status = $2, updated_at = $3
            WHERE id = $1
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(id)
        .bind(status.as_str())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// List active alerts that are due for a price check
    pub async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE status = 'active'
              AND (last_checked_at IS NULL
                   OR last_checked_at + make_interval(hours => check_frequency_hours) <= $1)
            ORDER BY last_checked_at ASC NULLS FIRST
            "#,
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Expire alerts past their expiry date; returns the expired rows
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            UPDATE alerts SET status = 'expired', updated_at = $1
            WHERE status IN ('active', 'paused')
              AND expires_at IS NOT NULL
              AND expires_at <= $1
            RETURNING {ALERT_COLUMNS}
            "#,
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// List alerts whose expiry falls inside `(now, until]`
    pub async fn list_expiring(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {ALERT_COLUMNS} FROM alerts
            WHERE status IN ('active', 'paused')
              AND expires_at IS NOT NULL
              AND expires_at > $1
              AND expires_at <= $2
            ORDER BY expires_at ASC
            "#,
        ))
        .bind(now)
        .bind(until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Record a completed price check
    pub async fn record_check(&self, id: i64, price: f64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts SET
                last_price = $2,
                last_checked_at = $3,
                lowest_price = LEAST(COALESCE(lowest_price, $2), $2),
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a target hit
    pub async fn mark_triggered(&self, id: i64, price: f64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE alerts SET
                status = 'triggered',
                triggered_at = $3,
                triggered_price = $2,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(price)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a sent notification
    pub async fn mark_notified(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE alerts SET last_notified_at = $2, updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

/// Repository for price-history rows
#[derive(Clone)]
pub struct PriceHistoryRepository {
    pool: PgPool,
}

impl PriceHistoryRepository {
    /// Create a new price-history repository
    pub fn new(pool: &PostgresPool) -> Self {
        Self {
            pool: pool.pool().clone(),
        }
    }

    /// Insert an observed fare
    pub async fn insert(
        &self,
        alert_id: i64,
        price: f64,
        currency: &str,
        flight_data: Option<&serde_json::Value>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_history (alert_id, price, currency, flight_data)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(alert_id)
        .bind(price)
        .bind(currency)
        .bind(flight_data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Observed fares for an alert, newest first
    pub async fn for_alert(&self, alert_id: i64, limit: i64) -> Result<Vec<PricePoint>> {
        let rows = sqlx::query_as::<_, PricePointRow>(
            r#"
            SELECT id, alert_id, price, currency, flight_data, found_at
            FROM price_history
            WHERE alert_id = $1
            ORDER BY found_at DESC
            LIMIT $2
            "#,
        )
        .bind(alert_id)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Observed fares on a route over a trailing window of days, newest first
    pub async fn for_route(
        &self,
        origin: &str,
        destination: &str,
        days: i64,
        limit: i64,
    ) -> Result<Vec<PricePoint>> {
        let since = Utc::now() - chrono::Duration::days(days.clamp(1, 365));

        let rows = sqlx::query_as::<_, PricePointRow>(
            r#"
            SELECT ph.id, ph.alert_id, ph.price, ph.currency, ph.flight_data, ph.found_at
            FROM price_history ph
            JOIN alerts a ON a.id = ph.alert_id
            WHERE a.origin = $1 AND a.destination = $2 AND ph.found_at >= $3
            ORDER BY ph.found_at DESC
            LIMIT $4
            "#,
        )
        .bind(origin)
        .bind(destination)
        .bind(since)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Aggregate fares on a route over a trailing window of days
    pub async fn route_stats(
        &self,
        origin: &str,
        destination: &str,
        days: i64,
    ) -> Result<Option<RouteStats>> {
        let days = days.clamp(1, 365);
        let since = Utc::now() - chrono::Duration::days(days);

        let (min_price, max_price, avg_price, samples) = sqlx::query_as::<
            _,
            (Option<f64>, Option<f64>, Option<f64>, i64),
        >(
            r#"
            SELECT MIN(ph.price), MAX(ph.price), AVG(ph.price), COUNT(*)
            FROM price_history ph
            JOIN alerts a ON a.id = ph.alert_id
            WHERE a.origin = $1 AND a.destination = $2 AND ph.found_at >= $3
            "#,
        )
        .bind(origin)
        .bind(destination)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        if samples == 0 {
            return Ok(None);
        }

        let latest_price = sqlx::query_as::<_, (f64,)>(
            r#"
            SELECT ph.price
            FROM price_history ph
            JOIN alerts a ON a.id = ph.alert_id
            WHERE a.origin = $1 AND a.destination = $2 AND ph.found_at >= $3
            ORDER BY ph.found_at DESC
            LIMIT 1
            "#,
        )
        .bind(origin)
        .bind(destination)
        .bind(since)
        .fetch_optional(&self.pool)
        .await?
        .map(|(price,)| price);

        Ok(Some(RouteStats {
            route: format!("{origin}-{destination}"),
            min_price: min_price.unwrap_or_default(),
            max_price: max_price.unwrap_or_default(),
            avg_price: avg_price.unwrap_or_default(),
            latest_price,
            samples,
            window_days: days,
        }))
    }
}

// Database row types for mapping

#[derive(sqlx::FromRow)]
struct AlertRow {
    id: i64,
    user_id: String,
    origin: String,
    destination: String,
    departure_date: Option<DateTime<Utc>>,
    return_date: Option<DateTime<Utc>>,
    target_price: f64,
    currency: String,
    status: String,
    check_frequency_hours: i32,
    last_checked_at: Option<DateTime<Utc>>,
    last_price: Option<f64>,
    lowest_price: Option<f64>,
    last_notified_at: Option<DateTime<Utc>>,
    triggered_at: Option<DateTime<Utc>>,
    triggered_price: Option<f64>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = Error;

    fn try_from(row: AlertRow) -> Result<Self> {
        Ok(Alert {
            id: row.id,
            user_id: row.user_id,
            origin: row.origin.trim_end().to_string(),
            destination: row.destination.trim_end().to_string(),
            departure_date: row.departure_date,
            return_date: row.return_date,
            target_price: row.target_price,
            currency: row.currency.trim_end().to_string(),
            status: AlertStatus::parse(&row.status)?,
            check_frequency_hours: row.check_frequency_hours,
            last_checked_at: row.last_checked_at,
            last_price: row.last_price,
            lowest_price: row.lowest_price,
            last_notified_at: row.last_notified_at,
            triggered_at: row.triggered_at,
            triggered_price: row.triggered_price,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PricePointRow {
    id: i64,
    alert_id: i64,
    price: f64,
    currency: String,
    flight_data: Option<serde_json::Value>,
    found_at: DateTime<Utc>,
}

impl From<PricePointRow> for PricePoint {
    fn from(row: PricePointRow) -> Self {
        PricePoint {
            id: row.id,
            alert_id: row.alert_id,
            price: row.price,
            currency: row.currency.trim_end().to_string(),
            flight_data: row.flight_data,
            found_at: row.found_at,
        }
    }
}
