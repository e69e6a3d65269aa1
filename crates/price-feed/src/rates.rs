//! Fiat exchange rates (USD -> BRL)

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pricefeed_core::{Currency, RateError, RatesConfig};

/// Source of `base -> quote` conversion rates
#[async_trait::async_trait]
pub trait RateConverter: Send + Sync {
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<Decimal, RateError>;
}

#[async_trait::async_trait]
impl<T: RateConverter + ?Sized> RateConverter for Arc<T> {
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<Decimal, RateError> {
        (**self).fetch_rate(base, quote).await
    }
}

#[derive(Debug, Deserialize)]
struct RatesResponse {
    rates: HashMap<String, serde_json::Number>,
}

/// Frankfurter-compatible rate source: `GET /latest?from=USD&to=BRL`
#[derive(Debug, Clone)]
pub struct FrankfurterRates {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl FrankfurterRates {
    pub fn new(config: &RatesConfig) -> Result<Self, RateError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RateError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout(),
        })
    }
}

#[async_trait::async_trait]
impl RateConverter for FrankfurterRates {
    async fn fetch_rate(&self, base: Currency, quote: Currency) -> Result<Decimal, RateError> {
        let url = format!("{}/latest", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("from", base.code()), ("to", quote.code())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RateError::Timeout(self.timeout)
                } else {
                    RateError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RateError::Status(status.as_u16()));
        }

        let body: RatesResponse = response
            .json()
            .await
            .map_err(|e| RateError::Decode(e.to_string()))?;

        let number = body
            .rates
            .get(quote.code())
            .ok_or_else(|| RateError::MissingRate(quote.code().to_string()))?;

        // Parse the JSON text so 5.3 stays 5.3
        let rate = Decimal::from_str(&number.to_string())
            .or_else(|_| Decimal::from_scientific(&number.to_string()))
            .map_err(|e| RateError::Decode(format!("rate {number}: {e}")))?;

        if rate.is_sign_negative() || rate.is_zero() {
            return Err(RateError::Decode(format!("non-positive rate {rate}")));
        }

        debug!("Fetched {}->{} rate {}", base, quote, rate);
        Ok(rate)
    }
}
