//! Data models for Farewatch

pub mod alert;
pub mod price;

pub use alert::{Alert, AlertFilter, AlertInput, AlertStatus, AlertUpdate};
pub use price::{parse_route, FlightOffer, PricePoint, RouteStats, SearchQuery};
