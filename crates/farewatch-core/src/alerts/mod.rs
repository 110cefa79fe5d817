//! Alert storage, checking and notification

pub mod checker;
pub mod notifier;
pub mod repository;

pub use checker::{evaluate, CheckOutcome, CheckStatus, PriceChecker, PriceSignal};
pub use notifier::{NotificationOutcome, Notify, TelegramNotifier};
pub use repository::{AlertRepository, PriceHistoryRepository};
