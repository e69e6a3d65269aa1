//! REST API for on-chain oracle prices
//!
//! Thin HTTP boundary over `pricefeed-aggregator`: routing, JSON payloads,
//! status mapping and settings loading.

pub mod conversions;
pub mod handlers;
pub mod server;
pub mod settings;

pub use handlers::{create_router, AppState};
pub use server::ApiServer;
