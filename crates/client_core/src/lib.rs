use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Client, RequestBuilder,
};
use serde::de::DeserializeOwned;
use shared::{
    domain::{PlantId, PredictionId},
    error::{ErrorBody, ErrorCode},
    protocol::{
        AilmentPlantsResponse, BatchPredictResponse, ExplainResponse, FeedbackResponse,
        HistoryResponse, LocationRecommendationsResponse, MedicinalPropertiesResponse,
        PlantListResponse, PlantRecord, PlantSearchResponse, PredictResponse,
        SimilarPlantsResponse,
    },
};
use tracing::{debug, info, warn};

pub mod display;
pub mod endpoint;
pub mod error;
pub mod image;
pub mod model;
pub mod workflow;

pub use endpoint::{ApiEndpoint, Deployment};
pub use error::{ClientError, Operation};
pub use image::{ImageSource, SelectedImage, DEFAULT_MAX_UPLOAD_BYTES};
pub use model::{ExplanationResult, ImageRef, PredictionResult, RankedLabel};
pub use workflow::{WorkflowController, WorkflowError, WorkflowState};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_FIELD: &str = "file";
const BATCH_UPLOAD_FIELD: &str = "files";
pub const MAX_BATCH_IMAGES: usize = 10;
pub const MIN_SEARCH_QUERY_CHARS: usize = 2;
pub const DEFAULT_SIMILAR_LIMIT: u64 = 5;

/// Remote calls the prediction workflow depends on.
#[async_trait]
pub trait PlantService: Send + Sync {
    async fn predict(&self, image: &SelectedImage) -> Result<PredictionResult, ClientError>;
    async fn explain(&self, image: &SelectedImage) -> Result<ExplanationResult, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Whole-request bound; expiry surfaces as a connectivity failure.
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlantListQuery {
    pub skip: u64,
    pub limit: Option<u64>,
    pub search: Option<String>,
}

pub struct PlantApiClient {
    http: Client,
    endpoint: ApiEndpoint,
    options: ClientOptions,
}

impl PlantApiClient {
    pub fn new(endpoint: ApiEndpoint) -> Result<Self, ClientError> {
        Self::with_options(endpoint, ClientOptions::default())
    }

    pub fn with_options(endpoint: ApiEndpoint, options: ClientOptions) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(ClientError::HttpSetup)?;
        Ok(Self {
            http,
            endpoint,
            options,
        })
    }

    pub fn endpoint(&self) -> &ApiEndpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn predict_image(
        &self,
        image: &SelectedImage,
    ) -> Result<PredictionResult, ClientError> {
        let url = self.endpoint.predict();
        let form = Form::new().part(UPLOAD_FIELD, self.image_part(image)?);
        let response: PredictResponse = self
            .execute(Operation::Predict, &url, self.http.post(&url).multipart(form))
            .await?;
        let result = PredictionResult::from_response(response).map_err(|reason| {
            ClientError::InvalidResponse {
                operation: Operation::Predict,
                reason,
            }
        })?;
        info!(
            label = %result.label,
            confidence = result.confidence,
            recognized = result.is_recognized(),
            model_version = %result.model_version,
            "prediction received"
        );
        Ok(result)
    }

    pub async fn explain_image(
        &self,
        image: &SelectedImage,
    ) -> Result<ExplanationResult, ClientError> {
        let url = self.endpoint.explain_combined();
        let form = Form::new().part(UPLOAD_FIELD, self.image_part(image)?);
        let response: ExplainResponse = self
            .execute(Operation::Explain, &url, self.http.post(&url).multipart(form))
            .await?;
        Ok(ExplanationResult::from(response))
    }

    pub async fn predict_batch(
        &self,
        images: &[SelectedImage],
    ) -> Result<BatchPredictResponse, ClientError> {
        if images.is_empty() {
            return Err(ClientError::Validation(
                "Select at least one image for batch prediction".to_string(),
            ));
        }
        if images.len() > MAX_BATCH_IMAGES {
            return Err(ClientError::Validation(format!(
                "Maximum {MAX_BATCH_IMAGES} images allowed per batch"
            )));
        }

        let mut form = Form::new();
        for image in images {
            form = form.part(BATCH_UPLOAD_FIELD, self.image_part(image)?);
        }
        let url = self.endpoint.predict_batch();
        self.execute(
            Operation::PredictBatch,
            &url,
            self.http.post(&url).multipart(form),
        )
        .await
    }

    pub async fn list_plants(&self, query: &PlantListQuery) -> Result<PlantListResponse, ClientError> {
        let url = self.endpoint.plants();
        let mut params = vec![("skip", query.skip.to_string())];
        if let Some(limit) = query.limit {
            params.push(("limit", limit.to_string()));
        }
        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("search", search.to_string()));
        }
        self.execute(Operation::ListPlants, &url, self.http.get(&url).query(&params))
            .await
    }

    pub async fn get_plant(&self, plant_id: PlantId) -> Result<PlantRecord, ClientError> {
        let url = self.endpoint.plant(plant_id);
        self.execute(Operation::GetPlant, &url, self.http.get(&url))
            .await
    }

    pub async fn medicinal_properties(
        &self,
        plant_id: PlantId,
    ) -> Result<MedicinalPropertiesResponse, ClientError> {
        let url = self.endpoint.medicinal_properties(plant_id);
        self.execute(Operation::MedicinalProperties, &url, self.http.get(&url))
            .await
    }

    pub async fn search_plants(&self, query: &str) -> Result<PlantSearchResponse, ClientError> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_QUERY_CHARS {
            return Err(ClientError::Validation(format!(
                "Search query must be at least {MIN_SEARCH_QUERY_CHARS} characters"
            )));
        }
        let url = self.endpoint.search_by_name();
        self.execute(
            Operation::SearchPlants,
            &url,
            self.http.get(&url).query(&[("q", query)]),
        )
        .await
    }

    pub async fn similar_plants(
        &self,
        plant_id: PlantId,
        limit: u64,
    ) -> Result<SimilarPlantsResponse, ClientError> {
        let url = self.endpoint.similar_plants(plant_id);
        self.execute(
            Operation::SimilarPlants,
            &url,
            self.http.get(&url).query(&[("limit", limit.max(1))]),
        )
        .await
    }

    pub async fn plants_for_ailment(
        &self,
        ailment: &str,
    ) -> Result<AilmentPlantsResponse, ClientError> {
        let ailment = ailment.trim();
        if ailment.chars().count() < MIN_SEARCH_QUERY_CHARS {
            return Err(ClientError::Validation(format!(
                "Ailment must be at least {MIN_SEARCH_QUERY_CHARS} characters"
            )));
        }
        let url = self.endpoint.plants_for_ailment();
        self.execute(
            Operation::PlantsForAilment,
            &url,
            self.http.post(&url).query(&[("ailment", ailment)]),
        )
        .await
    }

    pub async fn location_recommendations(
        &self,
        lat: f64,
        lng: f64,
    ) -> Result<LocationRecommendationsResponse, ClientError> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return Err(ClientError::Validation(format!(
                "Coordinates out of range: {lat}, {lng}"
            )));
        }
        let url = self.endpoint.location_recommendations();
        self.execute(
            Operation::LocationRecommendations,
            &url,
            self.http.get(&url).query(&[("lat", lat), ("lng", lng)]),
        )
        .await
    }

    pub async fn prediction_history(
        &self,
        skip: u64,
        limit: u64,
    ) -> Result<HistoryResponse, ClientError> {
        let url = self.endpoint.history();
        self.execute(
            Operation::History,
            &url,
            self.http
                .get(&url)
                .query(&[("skip", skip), ("limit", limit)]),
        )
        .await
    }

    pub async fn submit_feedback(
        &self,
        prediction_id: PredictionId,
        correct: bool,
        comment: Option<&str>,
    ) -> Result<FeedbackResponse, ClientError> {
        let url = self.endpoint.feedback(prediction_id);
        let mut params = vec![("correct", correct.to_string())];
        if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
            params.push(("comment", comment.to_string()));
        }
        self.execute(Operation::Feedback, &url, self.http.post(&url).query(&params))
            .await
    }

    fn image_part(&self, image: &SelectedImage) -> Result<Part, ClientError> {
        image.validate(self.options.max_upload_bytes)?;
        Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name().to_string())
            .mime_str(image.content_type())
            .map_err(|_| {
                ClientError::Validation(format!(
                    "File must be an image (got {})",
                    image.content_type()
                ))
            })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: Operation,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, ClientError> {
        let started = Instant::now();
        debug!(%operation, %url, "sending request");

        let connectivity = |source: reqwest::Error| ClientError::Connectivity {
            operation,
            url: url.to_string(),
            source,
        };

        let response = request.send().await.map_err(|source| {
            warn!(%operation, %url, timeout = source.is_timeout(), "request failed: {source}");
            connectivity(source)
        })?;
        let status = response.status();
        let body = response.bytes().await.map_err(connectivity)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !status.is_success() {
            let detail = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|body| body.message());
            warn!(
                %operation,
                status = status.as_u16(),
                elapsed_ms,
                detail = detail.as_deref().unwrap_or(""),
                "service rejected request"
            );
            return Err(ClientError::Service {
                operation,
                status: status.as_u16(),
                code: ErrorCode::from_status(status.as_u16()),
                detail,
            });
        }

        info!(%operation, status = status.as_u16(), elapsed_ms, "request completed");
        serde_json::from_slice(&body).map_err(|err| ClientError::InvalidResponse {
            operation,
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl PlantService for PlantApiClient {
    async fn predict(&self, image: &SelectedImage) -> Result<PredictionResult, ClientError> {
        self.predict_image(image).await
    }

    async fn explain(&self, image: &SelectedImage) -> Result<ExplanationResult, ClientError> {
        self.explain_image(image).await
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
