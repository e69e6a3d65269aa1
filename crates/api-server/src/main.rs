//! Price feed API - oracle prices over REST
//!
//! Main entry point for the HTTP server

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pricefeed_aggregator::{
    AggregatorConfig, CachedOracle, CachedRates, ChainlinkReader, FrankfurterRates, JsonRpcClient,
    OracleReader, PriceAggregator, RateConverter,
};
use pricefeed_api::{settings, ApiServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    init_logging();

    info!("Starting price feed API v{}", env!("CARGO_PKG_VERSION"));

    let config = settings::load()?;
    let registry = Arc::new(config.registry()?);
    info!(
        "Loaded {} price feeds: {}",
        registry.len(),
        registry.symbols().collect::<Vec<_>>().join(", ")
    );

    // Shared node handle for every oracle read
    let node = Arc::new(JsonRpcClient::new(&config.rpc_url, config.aggregator.worker_timeout())?);
    let chainlink = ChainlinkReader::new(node, Arc::clone(&registry));
    let frankfurter = FrankfurterRates::new(&config.rates)?;

    let (oracle, rates): (Arc<dyn OracleReader>, Arc<dyn RateConverter>) = if config.cache.enabled {
        let oracle = Arc::new(CachedOracle::new(
            chainlink,
            Duration::from_secs(config.cache.oracle_ttl_secs),
        ));
        let rates = Arc::new(CachedRates::new(
            frankfurter,
            Duration::from_secs(config.cache.rate_ttl_secs),
        ));
        info!(
            "Caching enabled (oracle ttl {}s, rate ttl {}s)",
            config.cache.oracle_ttl_secs, config.cache.rate_ttl_secs
        );

        // Cleanup task
        let purge_oracle = Arc::clone(&oracle);
        let purge_rates = Arc::clone(&rates);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                purge_oracle.purge_expired();
                purge_rates.purge_expired();
                let stats = purge_oracle.stats();
                info!(
                    "Oracle cache: {} entries, {} hits, {} misses",
                    stats.entries, stats.hits, stats.misses
                );
            }
        });

        let oracle: Arc<dyn OracleReader> = oracle;
        let rates: Arc<dyn RateConverter> = rates;
        (oracle, rates)
    } else {
        let oracle: Arc<dyn OracleReader> = Arc::new(chainlink);
        let rates: Arc<dyn RateConverter> = Arc::new(frankfurter);
        (oracle, rates)
    };

    let aggregator = PriceAggregator::new(
        AggregatorConfig::from(&config.aggregator),
        registry,
        oracle,
        rates,
    );

    let server = ApiServer::new(config.server.clone(), Arc::new(aggregator));

    // Setup shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received Ctrl+C");
            }
            _ = terminate => {
                info!("Received termination signal");
            }
        }

        let _ = shutdown_tx.send(());
    });

    info!("HTTP server listening on {}", server.address());
    info!("Press Ctrl+C to shutdown");

    if let Err(e) = server.start_with_shutdown(shutdown_rx).await {
        error!("Server error: {}", e);
        return Err(e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// `RUST_LOG` filter (default `info`); `LOG_FORMAT=json` for JSON lines
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    if env::var("LOG_FORMAT").map(|f| f.eq_ignore_ascii_case("json")).unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }
}
