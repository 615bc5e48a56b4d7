//! Normalized prediction and explanation results.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::{Outcome, PredictionId},
    protocol::{ExplainResponse, FeatureImportance, PlantDetails, PredictResponse, TopPrediction},
};

use crate::display::{display_label, format_confidence, ConfidenceView};

#[derive(Debug, Clone, PartialEq)]
pub struct RankedLabel {
    pub label: String,
    pub confidence: f64,
}

impl RankedLabel {
    pub fn display_label(&self) -> String {
        display_label(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    pub prediction_id: Option<PredictionId>,
    /// Raw service label; may use `_` in place of spaces.
    pub label: String,
    pub confidence: f64,
    /// Ranked candidates, highest confidence first. Usually led by the top-1 class.
    pub top_predictions: Vec<RankedLabel>,
    pub plant: Option<PlantDetails>,
    pub processing_time_ms: f64,
    pub model_version: String,
}

impl PredictionResult {
    pub fn from_response(response: PredictResponse) -> Result<Self, String> {
        let label = response
            .label()
            .map(str::to_string)
            .ok_or_else(|| "missing predicted_plant/predicted_class".to_string())?;
        check_confidence(&label, response.confidence)?;

        let processing_time_ms = response.processing_time_ms.unwrap_or(0.0);
        if !processing_time_ms.is_finite() || processing_time_ms < 0.0 {
            return Err(format!(
                "processing_time_ms must be a non-negative number, got {processing_time_ms}"
            ));
        }

        let mut top_predictions = response
            .top_predictions
            .unwrap_or_default()
            .into_iter()
            .map(|TopPrediction { class_name, confidence }| {
                check_confidence(&class_name, confidence)?;
                Ok(RankedLabel {
                    label: class_name,
                    confidence,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        top_predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        Ok(Self {
            prediction_id: response.prediction_id,
            label,
            confidence: response.confidence,
            top_predictions,
            plant: response.plant_details,
            processing_time_ms,
            model_version: response.model_version.unwrap_or_default(),
        })
    }

    pub fn outcome(&self) -> Outcome {
        if self.plant.is_some() {
            Outcome::Recognized
        } else {
            Outcome::Rejected
        }
    }

    pub fn is_recognized(&self) -> bool {
        self.outcome() == Outcome::Recognized
    }

    pub fn display_label(&self) -> String {
        display_label(&self.label)
    }

    pub fn confidence_percent(&self, view: ConfidenceView) -> String {
        format_confidence(self.confidence, view)
    }

    /// Runners-up after the leading candidate, at most `limit` of them.
    pub fn alternatives(&self, limit: usize) -> &[RankedLabel] {
        let rest = self.top_predictions.get(1..).unwrap_or_default();
        &rest[..rest.len().min(limit)]
    }
}

fn check_confidence(label: &str, confidence: f64) -> Result<(), String> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(format!(
            "confidence for '{label}' must be within [0, 1], got {confidence}"
        ))
    }
}

/// Reference to a rendered visualization: an inline `data:` URL or a fetchable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    pub fn extension(&self) -> &str {
        match self.mime_type.as_str() {
            "image/png" => "png",
            "image/jpeg" | "image/jpg" => "jpg",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "bin",
        }
    }
}

impl ImageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_inline(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Decodes `data:<mime>;base64,<payload>`; `None` for plain URLs or bad payloads.
    pub fn decode_inline(&self) -> Option<InlineImage> {
        let rest = self.0.strip_prefix("data:")?;
        let (meta, payload) = rest.split_once(',')?;
        let mime_type = meta.strip_suffix(";base64")?;
        let bytes = STANDARD.decode(payload.trim()).ok()?;
        Some(InlineImage {
            mime_type: if mime_type.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime_type.to_string()
            },
            bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplanationResult {
    /// Grad-CAM attention heatmap overlaid on the leaf.
    pub heatmap_overlay: ImageRef,
    /// LIME segment-importance visualization.
    pub segment_visualization: ImageRef,
    pub rationale: String,
    pub top_features: Vec<FeatureImportance>,
}

impl From<ExplainResponse> for ExplanationResult {
    fn from(response: ExplainResponse) -> Self {
        match response {
            ExplainResponse::Flat(flat) => Self {
                heatmap_overlay: ImageRef::new(flat.gradcam_overlay),
                segment_visualization: ImageRef::new(flat.lime_visualization),
                rationale: flat.explanation.unwrap_or_default().trim().to_string(),
                top_features: flat.top_features.unwrap_or_default(),
            },
            ExplainResponse::Combined(combined) => {
                let rationale = [combined.gradcam.explanation, combined.lime.explanation]
                    .into_iter()
                    .flatten()
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                Self {
                    heatmap_overlay: ImageRef::new(combined.gradcam.gradcam_overlay),
                    segment_visualization: ImageRef::new(combined.lime.lime_visualization),
                    rationale,
                    top_features: combined.lime.top_features.unwrap_or_default(),
                }
            }
        }
    }
}
