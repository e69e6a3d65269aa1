//! Error types

use std::time::Duration;
use thiserror::Error;

/// Registry and configuration errors
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid asset symbol: {0:?}")]
    InvalidAsset(String),

    #[error("Invalid feed address for {asset}: {reason}")]
    InvalidAddress { asset: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Oracle read failures (transport, node, decoding)
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Invalid oracle answer: {0}")]
    InvalidAnswer(String),
}

/// Exchange rate source failures
#[derive(Debug, Clone, Error)]
pub enum RateError {
    #[error("Rate source transport error: {0}")]
    Transport(String),

    #[error("Rate source timed out after {0:?}")]
    Timeout(Duration),

    #[error("Rate source returned status {0}")]
    Status(u16),

    #[error("Failed to decode rate response: {0}")]
    Decode(String),

    #[error("Rate for {0} not found in response")]
    MissingRate(String),
}

/// Errors surfaced by price queries
#[derive(Debug, Clone, Error)]
pub enum PriceError {
    #[error("Asset '{0}' is not supported")]
    UnsupportedAsset(String),

    #[error("Currency '{0}' is not supported")]
    UnsupportedCurrency(String),

    #[error("Failed to read feed for {asset}: {source}")]
    FeedRead {
        asset: String,
        #[source]
        source: FeedError,
    },

    #[error("Exchange rate unavailable: {0}")]
    RateUnavailable(#[from] RateError),

    #[error("Failed to fetch price for {asset}: {source}")]
    BatchPartialFailure {
        asset: String,
        #[source]
        source: Box<PriceError>,
    },

    #[error("Price worker failed: {0}")]
    Worker(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),
}

impl PriceError {
    pub fn feed(asset: impl Into<String>, source: FeedError) -> Self {
        PriceError::FeedRead { asset: asset.into(), source }
    }

    /// Caller-facing "not found" class (unknown asset or currency)
    pub fn is_not_found(&self) -> bool {
        matches!(self, PriceError::UnsupportedAsset(_) | PriceError::UnsupportedCurrency(_))
    }

    /// Asset the error is attributed to, if any
    pub fn asset(&self) -> Option<&str> {
        match self {
            PriceError::UnsupportedAsset(a) => Some(a),
            PriceError::FeedRead { asset, .. } => Some(asset),
            PriceError::BatchPartialFailure { asset, .. } => Some(asset),
            _ => None,
        }
    }
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
pub type PriceResult<T> = Result<T, PriceError>;
