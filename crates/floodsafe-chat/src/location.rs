//! Reverse geocoding of the user's coordinates into a [`LocationContext`].
//!
//! Location is best-effort: a failed lookup is logged and the session keeps
//! working with the generic directive.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use floodsafe_core::config::GeocodingConfig;
use floodsafe_core::types::{Coordinates, LocationContext};

use crate::error::ChatError;

/// Turns coordinates into a named place.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    async fn reverse(&self, coordinates: Coordinates) -> Result<LocationContext, ChatError>;
}

/// Resolve a location once, swallowing failures.
///
/// Returns `None` when the lookup fails; the caller keeps the session
/// unlocated.
pub async fn locate_once(
    geocoder: &dyn ReverseGeocoder,
    coordinates: Coordinates,
) -> Option<LocationContext> {
    match geocoder.reverse(coordinates).await {
        Ok(ctx) => {
            tracing::info!(place = %ctx.place(), "Resolved user location");
            Some(ctx)
        }
        Err(e) => {
            tracing::warn!(
                latitude = coordinates.latitude,
                longitude = coordinates.longitude,
                "Reverse geocoding failed: {}",
                e
            );
            None
        }
    }
}

// =============================================================================
// Nominatim
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    municipality: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    address: Option<NominatimAddress>,
    #[serde(default)]
    error: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl NominatimResponse {
    fn into_context(self, coordinates: Coordinates) -> Result<LocationContext, ChatError> {
        if let Some(error) = self.error {
            return Err(ChatError::Geocoding(error));
        }
        let address = self.address.unwrap_or_default();
        let locality = [
            address.city,
            address.town,
            address.village,
            address.hamlet,
            address.municipality,
        ]
        .into_iter()
        .find_map(non_blank);

        Ok(LocationContext {
            city: locality,
            state: non_blank(address.state),
            country: non_blank(address.country),
            coordinates,
        })
    }
}

/// Reverse geocoder backed by an OpenStreetMap Nominatim endpoint.
pub struct NominatimGeocoder {
    client: Client,
    endpoint: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocodingConfig) -> Result<Self, ChatError> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<LocationContext, ChatError> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("format", "json".to_string()),
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response.text().await?.chars().take(500).collect();
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: NominatimResponse = response.json().await?;
        parsed.into_context(coordinates)
    }
}

// =============================================================================
// Static
// =============================================================================

/// Geocoder with a fixed answer. `None` makes every lookup fail.
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    pub result: Option<LocationContext>,
}

impl StaticGeocoder {
    pub fn new(result: Option<LocationContext>) -> Self {
        Self { result }
    }
}

#[async_trait]
impl ReverseGeocoder for StaticGeocoder {
    async fn reverse(&self, coordinates: Coordinates) -> Result<LocationContext, ChatError> {
        match self.result {
            Some(ref ctx) => Ok(LocationContext {
                coordinates,
                ..ctx.clone()
            }),
            None => Err(ChatError::Geocoding("location unavailable".to_string())),
        }
    }
}
