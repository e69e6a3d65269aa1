//! HTTP handlers

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::debug;

use pricefeed_aggregator::PriceAggregator;
use pricefeed_core::{Currency, ALL_ASSETS};

use crate::conversions::{prices_to_response, ApiError, PriceResponse};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<PriceAggregator>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/price/:asset/:currency", get(get_price))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "feeds": state.aggregator.registry().len(),
    }))
}

/// Either one price or the full list, depending on the asset segment
#[derive(serde::Serialize)]
#[serde(untagged)]
pub enum PriceBody {
    One(PriceResponse),
    All(Vec<PriceResponse>),
}

/// GET /api/price/{asset}/{currency}, GET /api/price/all/{currency}
async fn get_price(
    State(state): State<AppState>,
    Path((asset, currency)): Path<(String, String)>,
) -> Result<Json<PriceBody>, ApiError> {
    let currency: Currency = currency.parse()?;
    let asset = asset.to_ascii_lowercase();

    if asset == ALL_ASSETS {
        let prices = state.aggregator.get_all_prices(currency).await?;
        debug!("Serving {} {} prices", prices.len(), currency);
        return Ok(Json(PriceBody::All(prices_to_response(&prices))));
    }

    let price = state.aggregator.get_price(&asset, currency).await?;
    Ok(Json(PriceBody::One(PriceResponse::from(&price))))
}
