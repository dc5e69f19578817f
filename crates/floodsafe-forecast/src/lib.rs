//! Client for the external flood-prediction service.
//!
//! The service answers `GET /predict?lat=..&lon=..` with
//! `{"prediction": "Flooded" | "Not Flooded"}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use floodsafe_core::config::PredictionConfig;
use floodsafe_core::types::{Coordinates, FloodStatus};

/// Errors from the flood-prediction service.
#[derive(Debug, thiserror::Error)]
pub enum PredictionError {
    #[error("prediction request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("prediction service returned HTTP {0}")]
    Status(u16),
}

/// Something that can classify a location as flooded or not.
#[async_trait]
pub trait FloodPredictor: Send + Sync {
    async fn predict(&self, coordinates: Coordinates) -> Result<FloodStatus, PredictionError>;
}

#[derive(Debug, Deserialize)]
struct PredictionResponse {
    prediction: String,
}

/// HTTP client for the prediction service.
pub struct PredictionClient {
    client: Client,
    base_url: String,
}

impl PredictionClient {
    pub fn new(config: &PredictionConfig) -> Result<Self, PredictionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FloodPredictor for PredictionClient {
    async fn predict(&self, coordinates: Coordinates) -> Result<FloodStatus, PredictionError> {
        let url = format!("{}/predict", self.base_url);
        tracing::debug!(
            %url,
            latitude = coordinates.latitude,
            longitude = coordinates.longitude,
            "Requesting flood prediction"
        );

        let response = self
            .client
            .get(&url)
            .query(&[("lat", coordinates.latitude), ("lon", coordinates.longitude)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Prediction service error");
            return Err(PredictionError::Status(status.as_u16()));
        }

        let body: PredictionResponse = response.json().await?;
        let status = FloodStatus::from_label(&body.prediction);
        if let FloodStatus::Unknown(ref label) = status {
            tracing::warn!(%label, "Unrecognized prediction label");
        }
        Ok(status)
    }
}

/// Predictor with a fixed answer.
#[derive(Debug, Clone)]
pub struct StaticPredictor {
    pub status: FloodStatus,
}

impl StaticPredictor {
    pub fn new(status: FloodStatus) -> Self {
        Self { status }
    }
}

#[async_trait]
impl FloodPredictor for StaticPredictor {
    async fn predict(&self, _coordinates: Coordinates) -> Result<FloodStatus, PredictionError> {
        Ok(self.status.clone())
    }
}
