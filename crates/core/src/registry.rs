//! Asset registry: lowercase symbol -> price feed contract
//!
//! Built once at startup and shared read-only (`Arc<AssetRegistry>`), so no
//! locking is needed anywhere it is read.

use alloy_primitives::Address;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::{CoreError, CoreResult, PriceError, PriceResult};

/// Path segment meaning "every registered asset"; never a symbol
pub const ALL_ASSETS: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetRegistry {
    feeds: BTreeMap<String, Address>,
}

impl AssetRegistry {
    pub fn new<I, S>(entries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (S, Address)>,
        S: AsRef<str>,
    {
        let mut feeds = BTreeMap::new();

        for (symbol, address) in entries {
            let symbol = normalize_symbol(symbol.as_ref())?;
            if address.is_zero() {
                return Err(CoreError::InvalidAddress {
                    asset: symbol,
                    reason: "zero address".to_string(),
                });
            }
            if feeds.insert(symbol.clone(), address).is_some() {
                return Err(CoreError::InvalidConfig(format!("duplicate feed for {symbol}")));
            }
        }

        Ok(Self { feeds })
    }

    /// Build from `symbol -> "0x..."` strings, as found in configuration
    pub fn from_hex<'a, I>(entries: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let parsed = entries
            .into_iter()
            .map(|(symbol, hex)| {
                let hex = hex.trim();
                if hex.is_empty() {
                    return Err(CoreError::InvalidAddress {
                        asset: symbol.to_string(),
                        reason: "empty address".to_string(),
                    });
                }
                Address::from_str(hex)
                    .map(|address| (symbol, address))
                    .map_err(|e| CoreError::InvalidAddress {
                        asset: symbol.to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Self::new(parsed)
    }

    /// Feed address for `symbol` (case-insensitive)
    pub fn resolve(&self, symbol: &str) -> PriceResult<Address> {
        self.feeds
            .get(&symbol.trim().to_ascii_lowercase())
            .copied()
            .ok_or_else(|| PriceError::UnsupportedAsset(symbol.to_string()))
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.feeds.contains_key(&symbol.trim().to_ascii_lowercase())
    }

    /// Registered symbols in sorted order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.feeds.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}

fn normalize_symbol(symbol: &str) -> CoreResult<String> {
    let symbol = symbol.trim().to_ascii_lowercase();
    if symbol.is_empty()
        || symbol == ALL_ASSETS
        || symbol.contains('/')
        || symbol.chars().any(char::is_whitespace)
    {
        return Err(CoreError::InvalidAsset(symbol));
    }
    Ok(symbol)
}
