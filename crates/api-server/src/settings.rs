//! Settings loading
//!
//! Layers, lowest priority first:
//! 1. `config/default.toml` (optional)
//! 2. the file named by `PRICEFEED_CONFIG` (optional)
//! 3. `PRICEFEED_*` environment variables (`__` separates nested keys,
//!    e.g. `PRICEFEED_SERVER__PORT`, `PRICEFEED_FEEDS__ETH`)
//! 4. `SEPOLIA_RPC_URL` and `SERVER_PORT`

use anyhow::Context;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::env;

use pricefeed_core::ServiceConfig;

const DEFAULT_CONFIG_PATH: &str = "config/default";

pub fn load() -> anyhow::Result<ServiceConfig> {
    let mut builder = Config::builder().add_source(File::with_name(DEFAULT_CONFIG_PATH).required(false));

    if let Ok(path) = env::var("PRICEFEED_CONFIG") {
        builder = builder.add_source(File::with_name(&path));
    }

    builder = builder.add_source(environment());

    if let Ok(url) = env::var("SEPOLIA_RPC_URL") {
        builder = builder.set_override("rpc_url", url)?;
    }
    if let Ok(port) = env::var("SERVER_PORT") {
        builder = builder.set_override("server.port", port)?;
    }

    finish(builder)
}

/// `PRICEFEED_RPC_URL`, `PRICEFEED_SERVER__PORT`, ...
fn environment() -> Environment {
    Environment::with_prefix("PRICEFEED")
        .prefix_separator("_")
        .separator("__")
}

/// Parse settings from a TOML document
pub fn from_toml(source: &str) -> anyhow::Result<ServiceConfig> {
    finish(Config::builder().add_source(File::from_str(source, FileFormat::Toml)))
}

fn finish(builder: ConfigBuilder<DefaultState>) -> anyhow::Result<ServiceConfig> {
    let config: ServiceConfig = builder
        .build()
        .context("failed to read settings")?
        .try_deserialize()
        .context("invalid settings")?;

    config.validate()?;
    Ok(config)
}
