//! On-chain price feed aggregation
//!
//! Features:
//! - Chainlink `AggregatorV3Interface` reads over JSON-RPC
//! - Exact decimal normalization of fixed-point answers
//! - USD -> BRL conversion through an FX source
//! - Concurrent fan-out across the asset registry with per-worker timeouts
//! - Optional TTL caching decorators

pub mod aggregator;
pub mod cache;
pub mod oracle;
pub mod rates;
pub mod rpc;

pub use aggregator::{AggregatorConfig, BatchOutcome, PriceAggregator};
pub use cache::{CachedOracle, CachedRates};
pub use oracle::{ChainlinkReader, FeedReading, OracleReader};
pub use rates::{FrankfurterRates, RateConverter};
pub use rpc::{ContractCaller, JsonRpcClient};
