//! Chainlink-style oracle reads
//!
//! Each read issues two `eth_call`s (`decimals()` and `latestRoundData()`)
//! and keeps the raw fixed-point answer; normalization to a decimal price is
//! done with `rust_decimal`, never through `f64`.

use alloy_primitives::{Bytes, I256, U256};
use alloy_sol_types::{sol, SolCall};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::debug;

use pricefeed_core::{AssetRegistry, Currency, FeedError, Pair, PriceData, PriceError, PriceResult};
use crate::rpc::ContractCaller;

sol! {
    interface AggregatorV3Interface {
        function decimals() external view returns (uint8);
        function latestRoundData() external view returns (
            uint80 roundId,
            int256 answer,
            uint256 startedAt,
            uint256 updatedAt,
            uint80 answeredInRound
        );
    }
}

use AggregatorV3Interface::{decimalsCall, latestRoundDataCall};

/// Largest scale `Decimal` can represent
const MAX_DECIMALS: u32 = 28;

/// Largest `Decimal` mantissa (96 bits)
const MAX_MANTISSA: u128 = (1u128 << 96) - 1;

/// Raw round data for one asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedReading {
    pub asset: String,
    pub raw_answer: I256,
    pub decimals: u8,
    /// Oracle last-update time (unix seconds)
    pub updated_at: i64,
}

impl FeedReading {
    /// `raw_answer / 10^decimals`
    pub fn price(&self) -> PriceResult<Decimal> {
        normalize_answer(self.raw_answer, self.decimals).map_err(|e| PriceError::feed(&self.asset, e))
    }

    /// Price in the oracle's native currency
    pub fn to_price_data(&self) -> PriceResult<PriceData> {
        let pair = Pair::new(&self.asset, Currency::Usd)?;
        PriceData::new(pair, self.price()?, self.updated_at)
    }

    /// Seconds since the oracle last updated
    pub fn age_secs(&self, now: i64) -> i64 {
        now.saturating_sub(self.updated_at)
    }
}

/// Divide the integer answer by `10^decimals` in decimal arithmetic
///
/// Trailing zeros are cancelled against the scale first, so wide answers
/// with many decimals still normalize exactly. Digits beyond what a
/// `Decimal` can hold are rounded half-up; an answer that is still too
/// wide with no decimals left, or a non-zero answer that rounds to zero,
/// is rejected.
pub fn normalize_answer(raw: I256, decimals: u8) -> Result<Decimal, FeedError> {
    if raw.is_negative() {
        return Err(FeedError::InvalidAnswer(format!("negative answer {raw}")));
    }

    let ten = U256::from(10u8);
    let max_mantissa = U256::from(MAX_MANTISSA);
    let mut mantissa = raw.into_raw();
    let mut scale = u32::from(decimals);

    while scale > 0 && !mantissa.is_zero() && (mantissa % ten).is_zero() {
        mantissa /= ten;
        scale -= 1;
    }

    while scale > 0 && (scale > MAX_DECIMALS || mantissa > max_mantissa) {
        let digit = mantissa % ten;
        mantissa /= ten;
        if digit >= U256::from(5u8) {
            mantissa += U256::from(1u8);
        }
        scale -= 1;
    }

    if mantissa > max_mantissa {
        return Err(FeedError::InvalidAnswer(format!("answer {raw} out of range")));
    }
    if mantissa.is_zero() && !raw.is_zero() {
        return Err(FeedError::InvalidAnswer(format!(
            "answer {raw} with {decimals} decimals underflows"
        )));
    }

    let mantissa: i128 = mantissa
        .to_string()
        .parse()
        .map_err(|_| FeedError::InvalidAnswer(format!("answer {raw} out of range")))?;

    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map_err(|e| FeedError::InvalidAnswer(format!("answer {raw}: {e}")))
}

/// Source of raw oracle readings
#[async_trait::async_trait]
pub trait OracleReader: Send + Sync {
    async fn fetch_feed(&self, asset: &str) -> PriceResult<FeedReading>;
}

#[async_trait::async_trait]
impl<T: OracleReader + ?Sized> OracleReader for Arc<T> {
    async fn fetch_feed(&self, asset: &str) -> PriceResult<FeedReading> {
        (**self).fetch_feed(asset).await
    }
}

/// Reads `AggregatorV3Interface` feeds through a shared node handle
pub struct ChainlinkReader {
    caller: Arc<dyn ContractCaller>,
    registry: Arc<AssetRegistry>,
}

impl ChainlinkReader {
    pub fn new(caller: Arc<dyn ContractCaller>, registry: Arc<AssetRegistry>) -> Self {
        Self { caller, registry }
    }
}

#[async_trait::async_trait]
impl OracleReader for ChainlinkReader {
    async fn fetch_feed(&self, asset: &str) -> PriceResult<FeedReading> {
        let asset = asset.trim().to_ascii_lowercase();
        let feed = self.registry.resolve(&asset)?;

        let decimals_call = self
            .caller
            .call(feed, Bytes::from(decimalsCall {}.abi_encode()));
        let round_call = self
            .caller
            .call(feed, Bytes::from(latestRoundDataCall {}.abi_encode()));

        let (decimals_out, round_out) = tokio::try_join!(decimals_call, round_call)
            .map_err(|e| PriceError::feed(&asset, e))?;

        let decimals = decimalsCall::abi_decode_returns(&decimals_out, true)
            .map_err(|e| PriceError::feed(&asset, FeedError::Decode(format!("decimals(): {e}"))))?
            ._0;

        let round = latestRoundDataCall::abi_decode_returns(&round_out, true).map_err(|e| {
            PriceError::feed(&asset, FeedError::Decode(format!("latestRoundData(): {e}")))
        })?;

        let updated_at = timestamp_from(round.updatedAt).map_err(|e| PriceError::feed(&asset, e))?;

        debug!(
            "Read {} feed {}: answer={} decimals={} updated_at={}",
            asset, feed, round.answer, decimals, updated_at
        );

        Ok(FeedReading {
            asset,
            raw_answer: round.answer,
            decimals,
            updated_at,
        })
    }
}

fn timestamp_from(value: U256) -> Result<i64, FeedError> {
    value
        .to_string()
        .parse()
        .map_err(|_| FeedError::Decode(format!("updatedAt {value} out of range")))
}
