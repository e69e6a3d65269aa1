//! Core types and utilities for the price feed service
//!
//! This crate provides shared types used across all components:
//! - Currency, pair and price definitions
//! - The asset registry (symbol -> feed contract)
//! - Service configuration types
//! - Error taxonomy

pub mod types;
pub mod registry;
pub mod config;
pub mod errors;

pub use types::*;
pub use registry::*;
pub use config::*;
pub use errors::*;
