use std::fmt;

use shared::error::ErrorCode;
use thiserror::Error;

use crate::image::ImageError;

pub const CONNECTIVITY_MESSAGE: &str =
    "Unable to connect to the server. Please check if the backend is running.";

/// Remote call a [`ClientError`] originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Predict,
    PredictBatch,
    Explain,
    ListPlants,
    GetPlant,
    MedicinalProperties,
    SearchPlants,
    History,
    Feedback,
    SimilarPlants,
    PlantsForAilment,
    LocationRecommendations,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Predict => "predict",
            Self::PredictBatch => "predict_batch",
            Self::Explain => "explain",
            Self::ListPlants => "list_plants",
            Self::GetPlant => "get_plant",
            Self::MedicinalProperties => "medicinal_properties",
            Self::SearchPlants => "search_plants",
            Self::History => "history",
            Self::Feedback => "feedback",
            Self::SimilarPlants => "similar_plants",
            Self::PlantsForAilment => "plants_for_ailment",
            Self::LocationRecommendations => "location_recommendations",
        }
    }

    /// Shown when the service rejects a call without saying why.
    pub fn fallback_message(self) -> &'static str {
        match self {
            Self::Predict => "Prediction failed",
            Self::PredictBatch => "Batch prediction failed",
            Self::Explain => "Explanation failed",
            Self::ListPlants => "Failed to list plants",
            Self::GetPlant => "Failed to get plant",
            Self::MedicinalProperties => "Failed to get medicinal properties",
            Self::SearchPlants => "Search failed",
            Self::History => "Failed to retrieve history",
            Self::Feedback => "Failed to submit feedback",
            Self::SimilarPlants => "Failed to get recommendations",
            Self::PlantsForAilment => "Failed to get plants for ailment",
            Self::LocationRecommendations => "Failed to get location-based recommendations",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("{0}")]
    Validation(String),
    #[error("invalid API base url {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("failed to build HTTP client: {0}")]
    HttpSetup(#[source] reqwest::Error),
    #[error("{operation} request to {url} could not reach the service: {source}")]
    Connectivity {
        operation: Operation,
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{operation} rejected by service with status {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Service {
        operation: Operation,
        status: u16,
        code: ErrorCode,
        detail: Option<String>,
    },
    #[error("{operation} returned an unreadable response: {reason}")]
    InvalidResponse { operation: Operation, reason: String },
}

impl ClientError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }

    /// Message suitable for showing to the user. Never empty.
    pub fn user_message(&self) -> String {
        match self {
            Self::Image(err) => err.to_string(),
            Self::Validation(message) => message.clone(),
            Self::InvalidEndpoint { .. } | Self::HttpSetup(_) => self.to_string(),
            Self::Connectivity { .. } => CONNECTIVITY_MESSAGE.to_string(),
            Self::Service {
                operation, detail, ..
            } => detail
                .clone()
                .filter(|detail| !detail.trim().is_empty())
                .unwrap_or_else(|| operation.fallback_message().to_string()),
            Self::InvalidResponse { operation, .. } => format!(
                "{}: the server returned an unexpected response",
                operation.fallback_message()
            ),
        }
    }
}
