//! Price aggregator - fans oracle reads out across the registry

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};
use tracing::{debug, info, warn};

use pricefeed_core::{AggregatorSettings, AssetRegistry, Currency, FeedError, PriceData, PriceError, PriceResult, RateError};
use crate::oracle::OracleReader;
use crate::rates::RateConverter;

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Bound on each worker's network work (oracle read, rate fetch)
    pub worker_timeout: Duration,
    /// Max in-flight workers per batch; `None` means one task per asset
    pub max_concurrency: Option<usize>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            worker_timeout: Duration::from_secs(10),
            max_concurrency: None,
        }
    }
}

impl From<&AggregatorSettings> for AggregatorConfig {
    fn from(settings: &AggregatorSettings) -> Self {
        Self {
            worker_timeout: settings.worker_timeout(),
            max_concurrency: settings.max_concurrency,
        }
    }
}

/// Successes and per-asset failures of a best-effort batch
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub prices: Vec<PriceData>,
    pub failures: Vec<(String, PriceError)>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Main price aggregator
#[derive(Clone)]
pub struct PriceAggregator {
    config: AggregatorConfig,
    registry: Arc<AssetRegistry>,
    oracle: Arc<dyn OracleReader>,
    rates: Arc<dyn RateConverter>,
}

impl PriceAggregator {
    pub fn new(
        config: AggregatorConfig,
        registry: Arc<AssetRegistry>,
        oracle: Arc<dyn OracleReader>,
        rates: Arc<dyn RateConverter>,
    ) -> Self {
        Self { config, registry, oracle, rates }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Price of one asset in `currency`.
    ///
    /// BRL prices are the USD oracle price times the current USD->BRL rate;
    /// the timestamp is always the oracle's.
    pub async fn get_price(&self, asset: &str, currency: Currency) -> PriceResult<PriceData> {
        let asset = asset.trim().to_ascii_lowercase();
        if !self.registry.contains(&asset) {
            return Err(PriceError::UnsupportedAsset(asset));
        }

        let native = read_native(self.oracle.as_ref(), &asset, self.config.worker_timeout).await?;
        if currency.is_native() {
            return Ok(native);
        }

        let rate = self.fetch_rate(currency).await?;
        native.convert(currency, rate)
    }

    /// Prices for every registered asset, all-or-nothing.
    ///
    /// The first failing asset aborts the remaining workers and fails the
    /// whole call with `BatchPartialFailure`. Results come back in registry
    /// order, but callers should key them by pair.
    pub async fn get_all_prices(&self, currency: Currency) -> PriceResult<Vec<PriceData>> {
        let rate = self.batch_rate(currency).await?;
        let mut workers = self.spawn_workers(currency, rate);
        let mut slots: Vec<Option<PriceData>> = vec![None; workers.len];

        while let Some(joined) = workers.set.join_next_with_id().await {
            let (slot, asset, result) = match joined {
                Ok((_, done)) => done,
                Err(e) => {
                    let (asset, err) = workers.failed(e);
                    warn!("Price worker for {} died: {}", asset, err);
                    workers.set.abort_all();
                    return Err(PriceError::BatchPartialFailure {
                        asset,
                        source: Box::new(err),
                    });
                }
            };
            match result {
                Ok(price) => slots[slot] = Some(price),
                Err(e) => {
                    warn!("Price batch aborted by {}: {}", asset, e);
                    workers.set.abort_all();
                    return Err(PriceError::BatchPartialFailure {
                        asset,
                        source: Box::new(e),
                    });
                }
            }
        }

        let prices = slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| PriceError::Worker("price worker exited without a result".to_string()))?;

        info!("Fetched {} {} prices", prices.len(), currency);
        Ok(prices)
    }

    /// Prices for every registered asset, keeping whatever succeeded.
    ///
    /// Only a failed exchange-rate fetch (which no asset can recover from)
    /// fails the call as a whole.
    pub async fn get_all_prices_best_effort(&self, currency: Currency) -> PriceResult<BatchOutcome> {
        let rate = self.batch_rate(currency).await?;
        let mut workers = self.spawn_workers(currency, rate);
        let mut slots: Vec<Option<PriceResult<PriceData>>> = vec![None; workers.len];
        let mut outcome = BatchOutcome::default();

        while let Some(joined) = workers.set.join_next_with_id().await {
            match joined {
                Ok((_, (slot, _, result))) => slots[slot] = Some(result),
                Err(e) => {
                    let (asset, err) = workers.failed(e);
                    warn!("Price worker for {} died: {}", asset, err);
                    outcome.failures.push((asset, err));
                }
            }
        }

        for (asset, slot) in self.registry.symbols().zip(slots) {
            match slot {
                Some(Ok(price)) => outcome.prices.push(price),
                Some(Err(e)) => {
                    warn!("Skipping {}: {}", asset, e);
                    outcome.failures.push((asset.to_string(), e));
                }
                None => {}
            }
        }

        info!(
            "Fetched {}/{} {} prices",
            outcome.prices.len(),
            self.registry.len(),
            currency
        );
        Ok(outcome)
    }

    /// Rate for a whole batch, fetched once before fan-out
    async fn batch_rate(&self, currency: Currency) -> PriceResult<Option<Decimal>> {
        if currency.is_native() {
            Ok(None)
        } else {
            self.fetch_rate(currency).await.map(Some)
        }
    }

    async fn fetch_rate(&self, currency: Currency) -> PriceResult<Decimal> {
        let timeout = self.config.worker_timeout;
        let rate = tokio::time::timeout(timeout, self.rates.fetch_rate(Currency::Usd, currency))
            .await
            .map_err(|_| RateError::Timeout(timeout))??;
        debug!("USD->{} rate {}", currency, rate);
        Ok(rate)
    }

    fn spawn_workers(&self, currency: Currency, rate: Option<Decimal>) -> Workers {
        let limiter = self.config.max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut set = JoinSet::new();
        let mut assets = HashMap::new();

        for (slot, asset) in self.registry.symbols().enumerate() {
            let asset = asset.to_string();
            let name = asset.clone();
            let oracle = Arc::clone(&self.oracle);
            let limiter = limiter.clone();
            let timeout = self.config.worker_timeout;

            let handle = set.spawn(async move {
                let _permit = match limiter {
                    Some(sem) => match sem.acquire_owned().await {
                        Ok(permit) => Some(permit),
                        Err(e) => return (slot, asset, Err(PriceError::Worker(e.to_string()))),
                    },
                    None => None,
                };

                let result = read_native(oracle.as_ref(), &asset, timeout)
                    .await
                    .and_then(|native| match rate {
                        Some(rate) => native.convert(currency, rate),
                        None => Ok(native),
                    });

                (slot, asset, result)
            });
            assets.insert(handle.id(), name);
        }

        Workers {
            len: assets.len(),
            set,
            assets,
        }
    }
}

/// In-flight batch; dropping it aborts every worker
struct Workers {
    set: JoinSet<(usize, String, PriceResult<PriceData>)>,
    len: usize,
    /// Task id -> asset, for workers that panic or are cancelled
    assets: HashMap<Id, String>,
}

impl Workers {
    fn failed(&self, e: JoinError) -> (String, PriceError) {
        let asset = self
            .assets
            .get(&e.id())
            .cloned()
            .unwrap_or_else(|| format!("task {}", e.id()));
        (asset, PriceError::Worker(e.to_string()))
    }
}

/// Read and normalize one feed within `timeout`
async fn read_native(oracle: &dyn OracleReader, asset: &str, timeout: Duration) -> PriceResult<PriceData> {
    let reading = tokio::time::timeout(timeout, oracle.fetch_feed(asset))
        .await
        .map_err(|_| PriceError::feed(asset, FeedError::Timeout(timeout)))??;

    let now = chrono::Utc::now().timestamp();
    debug!("{} feed updated {}s ago", asset, reading.age_secs(now));

    reading.to_price_data()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::FeedReading;
    use alloy_primitives::{Address, I256};
    use std::collections::{HashMap, HashSet};
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[derive(Clone)]
    enum Feed {
        Answer { raw: i128, decimals: u8, updated_at: i64 },
        Down,
        Hang,
        Crash,
    }

    #[derive(Default)]
    struct FakeOracle {
        feeds: HashMap<String, Feed>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeOracle {
        fn with(feeds: &[(&str, Feed)]) -> Arc<Self> {
            Arc::new(Self {
                feeds: feeds.iter().map(|(a, f)| (a.to_string(), f.clone())).collect(),
                ..Default::default()
            })
        }
    }

    #[async_trait::async_trait]
    impl OracleReader for FakeOracle {
        async fn fetch_feed(&self, asset: &str) -> PriceResult<FeedReading> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;

            let feed = self.feeds.get(asset).cloned();
            let result = match feed {
                Some(Feed::Answer { raw, decimals, updated_at }) => Ok(FeedReading {
                    asset: asset.to_string(),
                    raw_answer: I256::try_from(raw).unwrap(),
                    decimals,
                    updated_at,
                }),
                Some(Feed::Down) => Err(PriceError::feed(asset, FeedError::Transport("connection reset".into()))),
                Some(Feed::Hang) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
                Some(Feed::Crash) => panic!("oracle for {asset} crashed"),
                None => Err(PriceError::UnsupportedAsset(asset.to_string())),
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    struct HangingRate;

    #[async_trait::async_trait]
    impl RateConverter for HangingRate {
        async fn fetch_rate(&self, _base: Currency, _quote: Currency) -> Result<Decimal, RateError> {
            std::future::pending().await
        }
    }

    struct FixedRate {
        rate: Option<Decimal>,
        calls: AtomicUsize,
    }

    impl FixedRate {
        fn new(rate: &str) -> Arc<Self> {
            Arc::new(Self { rate: Some(dec(rate)), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { rate: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait::async_trait]
    impl RateConverter for FixedRate {
        async fn fetch_rate(&self, _base: Currency, _quote: Currency) -> Result<Decimal, RateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rate.ok_or(RateError::Status(500))
        }
    }

    fn answer(raw: i128) -> Feed {
        Feed::Answer { raw, decimals: 8, updated_at: 1_700_000_000 }
    }

    fn registry(symbols: &[&str]) -> Arc<AssetRegistry> {
        Arc::new(
            AssetRegistry::new(
                symbols
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (*s, Address::repeat_byte(i as u8 + 1))),
            )
            .unwrap(),
        )
    }

    fn aggregator(
        symbols: &[&str],
        oracle: Arc<FakeOracle>,
        rates: Arc<FixedRate>,
        config: AggregatorConfig,
    ) -> PriceAggregator {
        PriceAggregator::new(config, registry(symbols), oracle, rates)
    }

    fn abc_oracle() -> Arc<FakeOracle> {
        FakeOracle::with(&[
            ("a", answer(100_000_000)),
            ("b", answer(250_050_000_000)),
            ("c", answer(123_456_789)),
        ])
    }

    #[tokio::test]
    async fn test_usd_pair_is_uppercase_asset() {
        let oracle = abc_oracle();
        let agg = aggregator(&["a", "b", "c"], oracle, FixedRate::new("5.3"), AggregatorConfig::default());

        for asset in ["a", "b", "c"] {
            let price = agg.get_price(asset, Currency::Usd).await.unwrap();
            assert_eq!(price.pair().to_string(), format!("{}/USD", asset.to_uppercase()));
        }

        let price = agg.get_price("C", Currency::Usd).await.unwrap();
        assert_eq!(price.price(), dec("1.23456789"));
        assert_eq!(price.timestamp(), 1_700_000_000);
    }

    #[tokio::test]
    async fn test_brl_is_native_times_rate() {
        let rates = FixedRate::new("5.3");
        let agg = aggregator(&["a", "b", "c"], abc_oracle(), rates.clone(), AggregatorConfig::default());

        for asset in ["a", "b", "c"] {
            let usd = agg.get_price(asset, Currency::Usd).await.unwrap();
            let brl = agg.get_price(asset, Currency::Brl).await.unwrap();

            assert_eq!(brl.price(), usd.price() * dec("5.3"));
            assert_eq!(brl.pair().to_string(), format!("{}/BRL", asset.to_uppercase()));
            assert_eq!(brl.timestamp(), usd.timestamp());
        }
        assert_eq!(rates.calls.load(Ordering::SeqCst), 3);

        let brl = agg.get_price("b", Currency::Brl).await.unwrap();
        assert_eq!(brl.price(), dec("13252.65"));
    }

    #[tokio::test]
    async fn test_unknown_asset_makes_no_calls() {
        let oracle = abc_oracle();
        let rates = FixedRate::new("5.3");
        let agg = aggregator(&["a", "b", "c"], oracle.clone(), rates.clone(), AggregatorConfig::default());

        for currency in [Currency::Usd, Currency::Brl] {
            let err = agg.get_price("unknown", currency).await.unwrap_err();
            assert!(matches!(err, PriceError::UnsupportedAsset(ref a) if a == "unknown"));
        }
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
        assert_eq!(rates.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rate_failure_surfaces() {
        let agg = aggregator(&["a"], abc_oracle(), FixedRate::failing(), AggregatorConfig::default());

        let err = agg.get_price("a", Currency::Brl).await.unwrap_err();
        assert!(matches!(err, PriceError::RateUnavailable(RateError::Status(500))));

        let err = agg.get_all_prices(Currency::Brl).await.unwrap_err();
        assert!(matches!(err, PriceError::RateUnavailable(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_rate_source_times_out() {
        let oracle = abc_oracle();
        let config = AggregatorConfig {
            worker_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let agg = PriceAggregator::new(config, registry(&["a", "b", "c"]), oracle.clone(), Arc::new(HangingRate));

        let err = agg.get_price("a", Currency::Brl).await.unwrap_err();
        assert!(matches!(err, PriceError::RateUnavailable(RateError::Timeout(t)) if t == Duration::from_secs(10)));

        let err = agg.get_all_prices(Currency::Brl).await.unwrap_err();
        assert!(matches!(err, PriceError::RateUnavailable(RateError::Timeout(_))));

        // the batch rate is fetched before any worker starts
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_prices_returns_every_asset() {
        let agg = aggregator(&["a", "b", "c"], abc_oracle(), FixedRate::new("5.3"), AggregatorConfig::default());

        let prices = agg.get_all_prices(Currency::Usd).await.unwrap();
        assert_eq!(prices.len(), 3);

        let pairs: HashSet<String> = prices.iter().map(|p| p.pair().to_string()).collect();
        assert_eq!(
            pairs,
            HashSet::from(["A/USD".to_string(), "B/USD".to_string(), "C/USD".to_string()])
        );
    }

    #[tokio::test]
    async fn test_one_failing_feed_fails_the_batch() {
        let oracle = FakeOracle::with(&[
            ("a", answer(100_000_000)),
            ("b", Feed::Down),
            ("c", answer(123_456_789)),
        ]);
        let agg = aggregator(&["a", "b", "c"], oracle, FixedRate::new("5.3"), AggregatorConfig::default());

        let err = agg.get_all_prices(Currency::Usd).await.unwrap_err();
        match err {
            PriceError::BatchPartialFailure { asset, source } => {
                assert_eq!(asset, "b");
                assert!(matches!(*source, PriceError::FeedRead { source: FeedError::Transport(_), .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_brl_batch_fetches_rate_once() {
        let rates = FixedRate::new("5.3");
        let agg = aggregator(&["a", "b", "c"], abc_oracle(), rates.clone(), AggregatorConfig::default());

        let prices = agg.get_all_prices(Currency::Brl).await.unwrap();
        assert_eq!(prices.len(), 3);
        assert!(prices.iter().all(|p| p.pair().quote() == Currency::Brl));
        assert_eq!(rates.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_feed_times_out_and_fails_batch() {
        let oracle = FakeOracle::with(&[("a", answer(100_000_000)), ("b", Feed::Hang)]);
        let config = AggregatorConfig {
            worker_timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let agg = aggregator(&["a", "b"], oracle, FixedRate::new("5.3"), config);

        let err = agg.get_all_prices(Currency::Usd).await.unwrap_err();
        match err {
            PriceError::BatchPartialFailure { asset, source } => {
                assert_eq!(asset, "b");
                assert!(matches!(*source, PriceError::FeedRead { source: FeedError::Timeout(_), .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_best_effort_keeps_successes() {
        let oracle = FakeOracle::with(&[
            ("a", answer(100_000_000)),
            ("b", Feed::Down),
            ("c", answer(123_456_789)),
        ]);
        let agg = aggregator(&["a", "b", "c"], oracle, FixedRate::new("5.3"), AggregatorConfig::default());

        let outcome = agg.get_all_prices_best_effort(Currency::Usd).await.unwrap();
        assert!(!outcome.is_complete());
        assert_eq!(outcome.prices.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "b");
    }

    #[tokio::test]
    async fn test_crashed_worker_is_reported_by_asset() {
        let oracle = FakeOracle::with(&[
            ("a", answer(100_000_000)),
            ("b", Feed::Crash),
            ("c", answer(123_456_789)),
        ]);
        let agg = aggregator(&["a", "b", "c"], oracle, FixedRate::new("5.3"), AggregatorConfig::default());

        let outcome = agg.get_all_prices_best_effort(Currency::Usd).await.unwrap();
        assert_eq!(outcome.prices.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, "b");
        assert!(matches!(outcome.failures[0].1, PriceError::Worker(_)));

        let err = agg.get_all_prices(Currency::Usd).await.unwrap_err();
        match err {
            PriceError::BatchPartialFailure { asset, source } => {
                assert_eq!(asset, "b");
                assert!(matches!(*source, PriceError::Worker(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bounded_fan_out() {
        let oracle = FakeOracle::with(&[
            ("a", answer(1)),
            ("b", answer(2)),
            ("c", answer(3)),
            ("d", answer(4)),
            ("e", answer(5)),
        ]);
        let config = AggregatorConfig {
            max_concurrency: Some(2),
            ..Default::default()
        };
        let agg = aggregator(&["a", "b", "c", "d", "e"], oracle.clone(), FixedRate::new("5.3"), config);

        let prices = agg.get_all_prices(Currency::Usd).await.unwrap();
        assert_eq!(prices.len(), 5);
        assert!(oracle.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_batches_do_not_race() {
        let symbols = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let feeds: Vec<(&str, Feed)> = symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (*s, answer(100_000_000 * (i as i128 + 1))))
            .collect();
        let agg = Arc::new(aggregator(
            &symbols,
            FakeOracle::with(&feeds),
            FixedRate::new("5.3"),
            AggregatorConfig::default(),
        ));

        let mut handles = Vec::new();
        for i in 0..16 {
            let agg = Arc::clone(&agg);
            let currency = if i % 2 == 0 { Currency::Usd } else { Currency::Brl };
            handles.push(tokio::spawn(async move { agg.get_all_prices(currency).await }));
        }

        for handle in handles {
            let prices = handle.await.unwrap().unwrap();
            assert_eq!(prices.len(), symbols.len());
            let pairs: HashSet<String> = prices.iter().map(|p| p.pair().to_string()).collect();
            assert_eq!(pairs.len(), symbols.len());
        }
    }
}
