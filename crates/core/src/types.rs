//! Core type definitions

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::{PriceError, PriceResult};

/// Quote currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// What the oracles report in
    Usd,
    /// Derived from USD through the FX source
    Brl,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Brl => "BRL",
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, Currency::Usd)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Currency {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Currency::Usd),
            "brl" => Ok(Currency::Brl),
            _ => Err(PriceError::UnsupportedCurrency(s.to_string())),
        }
    }
}

/// Trading pair in canonical `ASSET/CURRENCY` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pair {
    base: String,
    quote: Currency,
}

impl Pair {
    pub fn new(asset: &str, quote: Currency) -> PriceResult<Self> {
        let base = asset.trim();
        if base.is_empty() || base.contains('/') {
            return Err(PriceError::UnsupportedAsset(asset.to_string()));
        }
        Ok(Self {
            base: base.to_ascii_uppercase(),
            quote,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> Currency {
        self.quote
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl Serialize for Pair {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Normalized oracle price in a quote currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceData {
    pair: Pair,
    price: Decimal,
    /// Oracle last-update time (unix seconds), not the fetch time
    timestamp: i64,
}

impl PriceData {
    pub fn new(pair: Pair, price: Decimal, timestamp: i64) -> PriceResult<Self> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(PriceError::InvalidPrice(format!("{pair} price {price} is negative")));
        }
        Ok(Self { pair, price, timestamp })
    }

    pub fn pair(&self) -> &Pair {
        &self.pair
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Re-quote in another currency by multiplying with `rate`.
    /// Keeps the oracle timestamp.
    pub fn convert(&self, quote: Currency, rate: Decimal) -> PriceResult<Self> {
        let price = self
            .price
            .checked_mul(rate)
            .ok_or_else(|| PriceError::InvalidPrice(format!("{} * {rate} overflows", self.price)))?;
        let pair = Pair::new(self.pair.base(), quote)?;
        Self::new(pair, price, self.timestamp)
    }

    /// Price rounded to 2 decimal places (banker's rounding), e.g. "3012.46"
    pub fn display_price(&self) -> String {
        format!("{:.2}", self.price.round_dp(2))
    }
}
