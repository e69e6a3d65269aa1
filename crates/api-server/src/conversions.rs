//! Conversions between core types and HTTP payloads

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use pricefeed_core::{PriceData, PriceError};

/// JSON body for one price
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceResponse {
    pub pair: String,
    /// Fixed 2-decimal string, e.g. "3012.46"
    pub price: String,
    pub timestamp: i64,
}

impl From<&PriceData> for PriceResponse {
    fn from(data: &PriceData) -> Self {
        Self {
            pair: data.pair().to_string(),
            price: data.display_price(),
            timestamp: data.timestamp(),
        }
    }
}

pub fn prices_to_response(prices: &[PriceData]) -> Vec<PriceResponse> {
    prices.iter().map(PriceResponse::from).collect()
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps price errors onto HTTP statuses
#[derive(Debug)]
pub struct ApiError(pub PriceError);

impl From<PriceError> for ApiError {
    fn from(err: PriceError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Price request failed: {}", self.0);
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}
