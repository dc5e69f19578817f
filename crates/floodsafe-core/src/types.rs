use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FloodSafeError, Result};

// =============================================================================
// Conversation
// =============================================================================

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Sent by the person using the widget.
    User,
    /// Produced by the chat-completion service (or the local fallback).
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single exchanged message.
///
/// Assistant content is marked-up text in a constrained HTML subset and
/// never contains the follow-up block once post-processed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Location
// =============================================================================

/// WGS84 coordinates in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Build coordinates, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(FloodSafeError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Where the user is, as resolved by a one-shot reverse-geocode lookup.
///
/// Any of the locality parts may be missing; a lookup that yields none of
/// them still carries the coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationContext {
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub coordinates: Coordinates,
}

impl LocationContext {
    /// Human-readable place: known parts joined by ", ", or the raw
    /// coordinates when no part is known.
    pub fn place(&self) -> String {
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        if parts.is_empty() {
            format!(
                "{:.4}, {:.4}",
                self.coordinates.latitude, self.coordinates.longitude
            )
        } else {
            parts.join(", ")
        }
    }
}

// =============================================================================
// Flood prediction
// =============================================================================

/// Categorical result of the flood-prediction service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodStatus {
    Flooded,
    NotFlooded,
    /// Any label the service returns that is not one of the two known ones.
    Unknown(String),
}

impl FloodStatus {
    /// Interpret the service's label ("Flooded" / "Not Flooded").
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "Flooded" => FloodStatus::Flooded,
            "Not Flooded" => FloodStatus::NotFlooded,
            other => FloodStatus::Unknown(other.to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FloodStatus::Flooded => "Flooded",
            FloodStatus::NotFlooded => "Not Flooded",
            FloodStatus::Unknown(label) => label,
        }
    }
}
