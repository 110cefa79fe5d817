//! Flight-search integration

mod tequila;

pub use tequila::{Location, LocationCity, TequilaClient};
