//! Redis connection, route-fare cache and alert event publishing

use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Create a new Redis connection pool
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let cfg = PoolConfig::from_url(&config.url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Pool(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

/// Event published when an alert's target price is hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Alert that fired
    pub alert_id: i64,
    /// Owning user id
    pub user_id: String,
    /// Route label
    pub route: String,
    /// Fare that hit the target
    pub price: f64,
    /// The alert's target price
    pub target_price: f64,
    /// Currency code
    pub currency: String,
}

/// Cache of the latest observed fare per route, plus alert event pub/sub
#[derive(Clone)]
pub struct PriceCache {
    pool: Pool,
    ttl_seconds: u64,
}

impl PriceCache {
    /// Create a new price cache on top of a Redis pool
    pub fn new(pool: &RedisPool, ttl: std::time::Duration) -> Self {
        Self {
            pool: pool.pool.clone(),
            ttl_seconds: ttl.as_secs().max(1),
        }
    }

    fn route_key(origin: &str, destination: &str) -> String {
        format!("farewatch:route:{origin}-{destination}")
    }

    /// Store the latest fare observed for a route
    pub async fn set_route_price(&self, origin: &str, destination: &str, price: f64) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        let _: () = conn
            .set_ex(Self::route_key(origin, destination), price, self.ttl_seconds)
            .await?;
        Ok(())
    }

    /// Fetch the cached fare for a route, if fresh
    pub async fn get_route_price(&self, origin: &str, destination: &str) -> Result<Option<f64>> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        let value: Option<f64> = conn.get(Self::route_key(origin, destination)).await?;
        Ok(value)
    }

    /// Publish a triggered-alert event to the `farewatch:alerts` channel
    pub async fn publish_alert_event(&self, event: &AlertEvent) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| Error::Pool(e.to_string()))?;
        let payload = serde_json::to_string(event)?;
        let _: () = conn.publish("farewatch:alerts", payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_keys_are_namespaced() {
        assert_eq!(
            PriceCache::route_key("JFK", "LHR"),
            "farewatch:route:JFK-LHR"
        );
    }
}
