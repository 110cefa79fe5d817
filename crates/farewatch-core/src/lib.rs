//! # Farewatch
//!
//! Flight-price tracking and alerting service.
//!
//! Farewatch lets users register price alerts for flight routes, polls the
//! Kiwi Tequila flight-search API for the current cheapest fare on each
//! route, records price history, and notifies users over Telegram when a
//! fare drops to their target.
//!
//! ## Architecture
//!
//! - **API**: REST API (axum) for alert CRUD, price history and live search
//! - **Checker**: background sweep that polls due alerts and dispatches
//!   notifications
//! - **Bot**: Telegram long-polling loop for `/start`, `/help`, `/alerts`
//! - **Storage**: Postgres for alerts and price history, Redis for the
//!   route-fare cache and alert event pub/sub
//!
//! ## Quick Start
//!
//! ```bash
//! # Run migrations, then the API + checker + bot
//! farewatch serve
//!
//! # One-shot price sweep
//! farewatch check
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod alerts;
pub mod api;
pub mod bot;
pub mod config;
pub mod db;
pub mod error;
pub mod flights;
pub mod models;

pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerts::{AlertRepository, PriceChecker, PriceHistoryRepository};
    pub use crate::config::Config;
    pub use crate::db::Database;
    pub use crate::error::{Error, Result};
    pub use crate::flights::TequilaClient;
    pub use crate::models::*;
}
