//! Plain-text rendering of workflow state and knowledge-base records.

use std::fmt::Write as _;

use client_core::{
    display::{display_label, format_confidence, format_latency_ms, ConfidenceView},
    workflow::{ExplanationStatus, WorkflowController, WorkflowError, WorkflowState},
    ExplanationResult, ImageRef, PredictionResult, SelectedImage,
};
use shared::protocol::{
    AilmentPlantsResponse, BatchPredictResponse, FeedbackResponse, HistoryResponse,
    LocationRecommendationsResponse, MedicinalPropertiesResponse, PlantListResponse, PlantRecord,
    PlantSearchResponse, RecommendedPlant, SimilarPlantsResponse,
};

const MAX_ALTERNATIVES: usize = 3;
const MAX_FEATURES: usize = 5;

pub fn render_selection(image: &SelectedImage) -> String {
    format!(
        "Selected {} ({}, {})",
        image.file_name(),
        image.content_type(),
        human_readable_bytes(image.len() as u64)
    )
}

pub fn render_error(error: &WorkflowError) -> String {
    format!("Error: {}", error.message())
}

pub fn render_status(controller: &WorkflowController) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Status: {}", controller.status_label());
    if let Some(image) = controller.image() {
        let _ = writeln!(out, "  {}", render_selection(image));
    }
    if let Some(rejection) = controller.last_rejection() {
        let _ = writeln!(out, "  Last selection refused: {}", rejection.message());
    }

    match controller.state() {
        WorkflowState::Predicted {
            prediction,
            explanation,
            ..
        } => {
            let _ = writeln!(out, "  {}", render_summary(prediction));
            match explanation {
                ExplanationStatus::NotRequested => {
                    let _ = writeln!(out, "  Explanation: not requested (type 'explain')");
                }
                ExplanationStatus::Available(_) => {
                    let _ = writeln!(out, "  Explanation: available (type 'save')");
                }
                ExplanationStatus::Failed(error) => {
                    let _ = writeln!(out, "  Explanation failed: {}", error.message());
                }
            }
        }
        WorkflowState::Explaining { prediction, .. } => {
            let _ = writeln!(out, "  {}", render_summary(prediction));
        }
        WorkflowState::Error { error, .. } => {
            let _ = writeln!(out, "  {} (type 'predict' to retry)", render_error(error));
        }
        WorkflowState::Idle | WorkflowState::Ready { .. } | WorkflowState::Predicting { .. } => {}
    }
    out.trim_end().to_string()
}

/// One-line condensed view.
pub fn render_summary(prediction: &PredictionResult) -> String {
    let verdict = if prediction.is_recognized() {
        "recognized"
    } else {
        "not recognized"
    };
    format!(
        "{} {} ({verdict})",
        prediction.display_label(),
        prediction.confidence_percent(ConfidenceView::Condensed)
    )
}

pub fn render_prediction(prediction: &PredictionResult) -> String {
    let mut out = String::new();

    match &prediction.plant {
        Some(plant) => {
            let _ = writeln!(out, "Best match: {}", prediction.display_label());
            if let Some(common_name) = plant.common_name.as_deref().filter(|n| !n.is_empty()) {
                let _ = writeln!(out, "  {common_name}");
            }
            let _ = writeln!(
                out,
                "Confidence: {}",
                prediction.confidence_percent(ConfidenceView::Simple)
            );
            if let Some(description) = plant.description.as_deref().filter(|d| !d.is_empty()) {
                let _ = writeln!(out, "\nAbout this plant:\n  {description}");
            }
            let _ = writeln!(out, "  Full details: plant {}", plant.id);
        }
        None => {
            let _ = writeln!(out, "Not recognized as a known medicinal plant.");
            let _ = writeln!(
                out,
                "Closest class: {} ({})",
                prediction.display_label(),
                prediction.confidence_percent(ConfidenceView::Simple)
            );
            let _ = writeln!(
                out,
                "Try a clearer photo of a single leaf against a plain background."
            );
        }
    }

    let alternatives = prediction.alternatives(MAX_ALTERNATIVES);
    if !alternatives.is_empty() {
        let _ = writeln!(out, "\nAlternative predictions:");
        for alternative in alternatives {
            let _ = writeln!(
                out,
                "  {:<28} {:>6}",
                alternative.display_label(),
                format_confidence(alternative.confidence, ConfidenceView::Simple)
            );
        }
    }

    let _ = writeln!(
        out,
        "\nProcessing time: {}",
        format_latency_ms(prediction.processing_time_ms)
    );
    if !prediction.model_version.is_empty() {
        let _ = writeln!(out, "Model version: {}", prediction.model_version);
    }
    if let Some(prediction_id) = prediction.prediction_id {
        let _ = writeln!(out, "Prediction id: {prediction_id}");
    }
    out.trim_end().to_string()
}

pub fn render_explanation(explanation: &ExplanationResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Why this prediction:");
    if explanation.rationale.is_empty() {
        let _ = writeln!(out, "  (no rationale provided)");
    } else {
        let _ = writeln!(out, "  {}", explanation.rationale);
    }
    let _ = writeln!(
        out,
        "  Attention heatmap: {}",
        describe_image_ref(&explanation.heatmap_overlay)
    );
    let _ = writeln!(
        out,
        "  Segment importance: {}",
        describe_image_ref(&explanation.segment_visualization)
    );

    if !explanation.top_features.is_empty() {
        let _ = writeln!(out, "  Most influential regions:");
        for feature in explanation.top_features.iter().take(MAX_FEATURES) {
            let sign = if feature.positive { '+' } else { '-' };
            let _ = writeln!(
                out,
                "    {sign} {} ({:.3})",
                feature.feature, feature.importance
            );
        }
    }
    out.trim_end().to_string()
}

fn describe_image_ref(image: &ImageRef) -> String {
    if image.as_str().is_empty() {
        return "not provided".to_string();
    }
    match image.decode_inline() {
        Some(inline) => format!(
            "inline {} ({})",
            inline.mime_type,
            human_readable_bytes(inline.bytes.len() as u64)
        ),
        None if image.is_inline() => "inline (undecodable)".to_string(),
        None => image.as_str().to_string(),
    }
}

pub fn render_plant(record: &PlantRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} (id {})", record.species_name, record.id);

    let names = [
        ("English", &record.common_names.en),
        ("Hindi", &record.common_names.hi),
        ("Tamil", &record.common_names.ta),
        ("Telugu", &record.common_names.te),
        ("Bengali", &record.common_names.bn),
    ];
    for (language, name) in names {
        if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
            let _ = writeln!(out, "  {language}: {name}");
        }
    }
    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(out, "\n{description}");
    }

    if !record.medicinal_properties.is_empty() {
        let _ = writeln!(out, "\nMedicinal uses:");
        for usage in &record.medicinal_properties {
            let ailment = usage.ailment.as_deref().unwrap_or("general");
            match usage.usage.as_deref() {
                Some(text) => {
                    let _ = writeln!(out, "  - {ailment}: {text}");
                }
                None => {
                    let _ = writeln!(out, "  - {ailment}");
                }
            }
        }
    }
    out.trim_end().to_string()
}

pub fn render_medicinal(response: &MedicinalPropertiesResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Medicinal properties of {} (id {}):",
        response.plant_name, response.plant_id
    );
    if response.properties.is_empty() {
        let _ = writeln!(out, "  none recorded");
    }
    for property in &response.properties {
        let _ = writeln!(
            out,
            "  - {}",
            property.ailment.as_deref().unwrap_or("general")
        );
        let details = [
            ("Usage", &property.usage_description),
            ("Preparation", &property.preparation_method),
            ("Dosage", &property.dosage),
            ("Precautions", &property.precautions),
            ("Source", &property.source),
        ];
        for (label, value) in details {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                let _ = writeln!(out, "      {label}: {value}");
            }
        }
        if let Some(rating) = property.efficacy_rating {
            let _ = writeln!(out, "      Efficacy: {rating}/5");
        }
    }
    out.trim_end().to_string()
}

pub fn render_search(response: &PlantSearchResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} result(s) for \"{}\":",
        response.count, response.query
    );
    for hit in &response.results {
        let _ = writeln!(
            out,
            "  {:>4}  {}{}",
            hit.id,
            hit.species_name,
            hit.common_name
                .as_deref()
                .map(|name| format!(" ({name})"))
                .unwrap_or_default()
        );
    }
    out.trim_end().to_string()
}

pub fn render_similar(response: &SimilarPlantsResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Plants similar to plant {}:", response.plant_id);
    write_recommendations(&mut out, &response.recommendations);
    out.trim_end().to_string()
}

pub fn render_location(response: &LocationRecommendationsResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Plants near {:.4}, {:.4}:",
        response.location.lat, response.location.lng
    );
    write_recommendations(&mut out, &response.recommendations);
    out.trim_end().to_string()
}

fn write_recommendations(out: &mut String, plants: &[RecommendedPlant]) {
    if plants.is_empty() {
        let _ = writeln!(out, "  no recommendations");
    }
    for plant in plants {
        let score = plant
            .similarity_score
            .map(|score| format!(" [{}]", format_confidence(score, ConfidenceView::Condensed)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:>4}  {}{}{score}",
            plant.id,
            display_label(&plant.species_name),
            plant
                .common_name
                .as_deref()
                .map(|name| format!(" ({name})"))
                .unwrap_or_default()
        );
        if let Some(note) = plant.reason.as_deref().or(plant.regional_note.as_deref()) {
            let _ = writeln!(out, "        {note}");
        }
    }
}

pub fn render_ailment(response: &AilmentPlantsResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} plant(s) used for \"{}\":",
        response.count, response.ailment
    );
    for remedy in &response.plants {
        let rating = remedy
            .efficacy_rating
            .map(|rating| format!(" [efficacy {rating}/5]"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {:>4}  {}{rating}",
            remedy.id,
            display_label(&remedy.species_name)
        );
        let details = [
            ("Ailment", &remedy.ailment),
            ("Usage", &remedy.usage),
            ("Preparation", &remedy.preparation),
            ("Dosage", &remedy.dosage),
            ("Precautions", &remedy.precautions),
        ];
        for (label, value) in details {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                let _ = writeln!(out, "        {label}: {value}");
            }
        }
    }
    out.trim_end().to_string()
}

pub fn render_plant_list(response: &PlantListResponse) -> String {
    let mut out = String::new();
    let shown_to = response.skip + response.plants.len() as u64;
    let _ = writeln!(
        out,
        "Plants {}-{} of {}:",
        if response.plants.is_empty() {
            response.skip
        } else {
            response.skip + 1
        },
        shown_to,
        response.total
    );
    for plant in &response.plants {
        let _ = writeln!(
            out,
            "  {:>4}  {}{}",
            plant.id,
            plant.species_name,
            plant
                .common_name
                .as_deref()
                .map(|name| format!(" ({name})"))
                .unwrap_or_default()
        );
    }
    out.trim_end().to_string()
}

pub fn render_history(response: &HistoryResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Showing {} of {} prediction(s):",
        response.predictions.len(),
        response.total
    );
    for entry in &response.predictions {
        let when = entry
            .created_at_utc()
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        let feedback = match entry.feedback_correct {
            Some(true) => "confirmed",
            Some(false) => "disputed",
            None => "no feedback",
        };
        let _ = writeln!(
            out,
            "  #{:<5} {when}  {:<24} {:>4}  {feedback}",
            entry.id,
            display_label(&entry.predicted_plant),
            format_confidence(entry.confidence, ConfidenceView::Condensed)
        );
    }
    out.trim_end().to_string()
}

pub fn render_feedback(response: &FeedbackResponse) -> String {
    format!("{} (prediction #{})", response.message, response.prediction_id)
}

pub fn render_batch(response: &BatchPredictResponse) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} of {} image(s) identified:",
        response.successful, response.total
    );
    for item in &response.results {
        let name = item.filename.as_deref().unwrap_or("(unnamed)");
        if item.succeeded() {
            let label = item
                .predicted_plant
                .as_deref()
                .map(display_label)
                .unwrap_or_default();
            let confidence = item
                .confidence
                .map(|c| format_confidence(c, ConfidenceView::Condensed))
                .unwrap_or_default();
            let _ = writeln!(out, "  {name}: {label} {confidence}");
        } else {
            let _ = writeln!(
                out,
                "  {name}: failed ({})",
                item.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    out.trim_end().to_string()
}

pub fn human_readable_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes < KB {
        return format!("{bytes} B");
    }
    if bytes < MB {
        return format_scaled_unit(bytes, KB, "KB");
    }
    format_scaled_unit(bytes, MB, "MB")
}

fn format_scaled_unit(bytes: u64, unit_size: u64, unit_label: &str) -> String {
    let value = bytes as f64 / unit_size as f64;
    let value_text = format!("{value:.1}");
    let compact_value = value_text.strip_suffix(".0").unwrap_or(&value_text);
    format!("{compact_value} {unit_label}")
}

#[cfg(test)]
#[path = "../tests/render_tests.rs"]
mod tests;
