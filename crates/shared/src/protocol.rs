use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{PlantId, PredictionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<PredictionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_plant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_class: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_predictions: Option<Vec<TopPrediction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_details: Option<PlantDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

impl PredictResponse {
    /// Older service builds name the label `predicted_class`.
    pub fn label(&self) -> Option<&str> {
        self.predicted_plant
            .as_deref()
            .or(self.predicted_class.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPrediction {
    pub class_name: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantDetails {
    pub id: PlantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub species_name: Option<String>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Body of `POST /explain/combined`.
///
/// Deployed services nest the Grad-CAM and LIME payloads; the flat shape is
/// what lightweight gateways in front of the service return.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExplainResponse {
    Flat(FlatExplanation),
    Combined(CombinedExplanation),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatExplanation {
    pub gradcam_overlay: String,
    pub lime_visualization: String,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_features: Option<Vec<FeatureImportance>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedExplanation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<ExplainedPrediction>,
    pub gradcam: GradCamPayload,
    pub lime: LimePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplainedPrediction {
    pub predicted_class: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_predictions: Option<Vec<TopPrediction>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradCamPayload {
    pub gradcam_overlay: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heatmap: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimePayload {
    pub lime_visualization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_features: Option<Vec<FeatureImportance>>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
    #[serde(default = "default_positive")]
    pub positive: bool,
}

fn default_positive() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantSummary {
    pub id: PlantId,
    pub species_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name_hi: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantListResponse {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub plants: Vec<PlantSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonNames {
    #[serde(default)]
    pub en: Option<String>,
    #[serde(default)]
    pub hi: Option<String>,
    #[serde(default)]
    pub ta: Option<String>,
    #[serde(default)]
    pub te: Option<String>,
    #[serde(default)]
    pub bn: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantRecord {
    pub id: PlantId,
    pub species_name: String,
    #[serde(default)]
    pub common_names: CommonNames,
    #[serde(default)]
    pub scientific_classification: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub medicinal_properties: Vec<MedicinalUse>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Medicinal use as embedded in a plant record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicinalUse {
    #[serde(default)]
    pub ailment: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub preparation: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub precautions: Option<String>,
    #[serde(default)]
    pub efficacy_rating: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicinalPropertiesResponse {
    pub plant_id: PlantId,
    pub plant_name: String,
    pub properties: Vec<MedicinalProperty>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicinalProperty {
    pub id: i64,
    #[serde(default)]
    pub ailment: Option<String>,
    #[serde(default)]
    pub usage_description: Option<String>,
    #[serde(default)]
    pub preparation_method: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub precautions: Option<String>,
    #[serde(default)]
    pub efficacy_rating: Option<i64>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantSearchResponse {
    pub query: String,
    pub count: u64,
    pub results: Vec<PlantSearchHit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantSearchHit {
    pub id: PlantId,
    pub species_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Plant suggested by similarity or region.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendedPlant {
    pub id: PlantId,
    pub species_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regional_note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarPlantsResponse {
    pub plant_id: PlantId,
    pub count: u64,
    pub recommendations: Vec<RecommendedPlant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AilmentRemedy {
    pub id: PlantId,
    pub species_name: String,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub ailment: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub preparation: Option<String>,
    #[serde(default)]
    pub dosage: Option<String>,
    #[serde(default)]
    pub precautions: Option<String>,
    #[serde(default)]
    pub efficacy_rating: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AilmentPlantsResponse {
    pub ailment: String,
    pub count: u64,
    pub plants: Vec<AilmentRemedy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationRecommendationsResponse {
    pub location: GeoPoint,
    pub count: u64,
    pub recommendations: Vec<RecommendedPlant>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
    pub predictions: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: PredictionId,
    #[serde(default)]
    pub image_url: Option<String>,
    pub predicted_plant: String,
    #[serde(default)]
    pub common_name: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub feedback_correct: Option<bool>,
}

impl HistoryEntry {
    /// Timestamps come back either offset-qualified or naive (UTC).
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.created_at.as_deref()?.trim();
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Some(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub message: String,
    pub prediction_id: PredictionId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPredictResponse {
    pub total: u64,
    pub successful: u64,
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub predicted_plant: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BatchItem {
    pub fn succeeded(&self) -> bool {
        self.success.unwrap_or(false) && self.error.is_none()
    }
}
