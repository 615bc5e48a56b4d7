use super::*;
use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::Outcome;
use std::{collections::HashMap, sync::Arc};
use tokio::{net::TcpListener, sync::Mutex};

use crate::{error::CONNECTIVITY_MESSAGE, workflow::ErrorCategory};

#[derive(Debug, Clone)]
struct CapturedUpload {
    path: &'static str,
    field: Option<String>,
    file_name: Option<String>,
    content_type: Option<String>,
    size: usize,
}

#[derive(Clone)]
struct MockState {
    uploads: Arc<Mutex<Vec<CapturedUpload>>>,
    queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    predict_reply: Arc<Mutex<(StatusCode, String)>>,
    explain_reply: Arc<Mutex<(StatusCode, String)>>,
    delay_ms: u64,
}

impl MockState {
    fn new() -> Self {
        Self {
            uploads: Arc::new(Mutex::new(Vec::new())),
            queries: Arc::new(Mutex::new(Vec::new())),
            predict_reply: Arc::new(Mutex::new((
                StatusCode::OK,
                json!({
                    "prediction_id": 11,
                    "predicted_plant": "Tulsi",
                    "confidence": 0.93,
                    "top_predictions": [
                        {"class_name": "Neem", "confidence": 0.04},
                        {"class_name": "Tulsi", "confidence": 0.93}
                    ],
                    "processing_time_ms": 41.2,
                    "model_version": "ensemble-v2",
                    "plant_details": {"id": 7, "species_name": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "description": "Sacred basil.", "image_url": null}
                })
                .to_string(),
            ))),
            explain_reply: Arc::new(Mutex::new((
                StatusCode::OK,
                json!({
                    "gradcam_overlay": "data:image/png;base64,iVBORw0KGgo=",
                    "lime_visualization": "https://cdn.example.org/lime/1.png",
                    "explanation": "Leaf margin and venation drove the decision."
                })
                .to_string(),
            ))),
            delay_ms: 0,
        }
    }

    async fn reply_predict(&self, status: StatusCode, body: impl Into<String>) {
        *self.predict_reply.lock().await = (status, body.into());
    }

    async fn reply_explain(&self, status: StatusCode, body: impl Into<String>) {
        *self.explain_reply.lock().await = (status, body.into());
    }
}

async fn capture(state: &MockState, path: &'static str, mut multipart: Multipart) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().map(str::to_string);
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let size = field.bytes().await.map(|bytes| bytes.len()).unwrap_or(0);
        state.uploads.lock().await.push(CapturedUpload {
            path,
            field: name,
            file_name,
            content_type,
            size,
        });
    }
}

fn json_reply((status, body): (StatusCode, String)) -> impl IntoResponse {
    (status, [("content-type", "application/json")], body)
}

async fn handle_predict(State(state): State<MockState>, multipart: Multipart) -> impl IntoResponse {
    if state.delay_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(state.delay_ms)).await;
    }
    capture(&state, "predict", multipart).await;
    json_reply(state.predict_reply.lock().await.clone())
}

async fn handle_batch(State(state): State<MockState>, multipart: Multipart) -> Json<Value> {
    capture(&state, "batch", multipart).await;
    let count = state.uploads.lock().await.len();
    Json(json!({
        "total": count,
        "successful": count,
        "results": (0..count).map(|i| json!({
            "filename": format!("leaf-{i}.jpg"),
            "predicted_plant": "Neem",
            "confidence": 0.8,
            "success": true
        })).collect::<Vec<_>>()
    }))
}

async fn handle_explain(State(state): State<MockState>, multipart: Multipart) -> impl IntoResponse {
    capture(&state, "explain", multipart).await;
    json_reply(state.explain_reply.lock().await.clone())
}

async fn handle_list_plants(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!({
        "total": 1,
        "skip": 0,
        "limit": 50,
        "plants": [{"id": 7, "species_name": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "description": "Sacred basil.", "image_url": null}]
    }))
}

async fn handle_get_plant(Path(plant_id): Path<i64>) -> impl IntoResponse {
    if plant_id != 7 {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "Plant not found"})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "id": 7,
            "species_name": "Ocimum_tenuiflorum",
            "common_names": {"en": "Holy Basil", "hi": "Tulsi", "ta": null, "te": null, "bn": null},
            "scientific_classification": {"family": "Lamiaceae"},
            "description": "Sacred basil.",
            "image_url": null,
            "medicinal_properties": [{"ailment": "Cough", "usage": "Leaf tea", "preparation": "Boil leaves", "dosage": "Twice daily", "precautions": null}],
            "created_at": "2025-01-02T03:04:05+00:00"
        })),
    )
}

async fn handle_medicinal(Path(plant_id): Path<i64>) -> Json<Value> {
    Json(json!({
        "plant_id": plant_id,
        "plant_name": "Ocimum_tenuiflorum",
        "properties": [{"id": 1, "ailment": "Cough", "usage_description": "Leaf tea", "efficacy_rating": 4}]
    }))
}

async fn handle_search(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let q = query.get("q").cloned().unwrap_or_default();
    state.queries.lock().await.push(query);
    Json(json!({
        "query": q,
        "count": 1,
        "results": [{"id": 7, "species_name": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "image_url": null}]
    }))
}

async fn handle_history(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!({
        "total": 1,
        "skip": 0,
        "limit": 5,
        "predictions": [{"id": 11, "image_url": "./uploads/leaf.jpg", "predicted_plant": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "confidence": 0.93, "created_at": "2025-01-02T03:04:05", "feedback_correct": null}]
    }))
}

async fn handle_feedback(
    State(state): State<MockState>,
    Path(prediction_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!({"message": "Feedback submitted successfully", "prediction_id": prediction_id}))
}

async fn handle_similar(
    State(state): State<MockState>,
    Path(plant_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.queries.lock().await.push(query);
    Json(json!({
        "plant_id": plant_id,
        "count": 1,
        "recommendations": [{"id": 12, "species_name": "Azadirachta indica", "common_name": "Neem", "description": null, "similarity_score": 0.42, "reason": "Similar medicinal properties"}]
    }))
}

async fn handle_ailment(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    let ailment = query.get("ailment").cloned().unwrap_or_default();
    state.queries.lock().await.push(query);
    Json(json!({
        "ailment": ailment,
        "count": 1,
        "plants": [{"id": 7, "species_name": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "ailment": "Cough", "usage": "Leaf tea", "preparation": null, "dosage": null, "precautions": null, "efficacy_rating": 4}]
    }))
}

async fn handle_location(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let lat: f64 = query.get("lat").and_then(|v| v.parse().ok()).unwrap_or(f64::NAN);
    let lng: f64 = query.get("lng").and_then(|v| v.parse().ok()).unwrap_or(f64::NAN);
    state.queries.lock().await.push(query);
    if lat.is_nan() || lng.is_nan() {
        return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({"detail": [{"loc": ["query", "lat"], "msg": "field required"}]})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "location": {"lat": lat, "lng": lng},
            "count": 1,
            "recommendations": [{"id": 7, "species_name": "Ocimum_tenuiflorum", "common_name": "Holy Basil", "description": "Sacred basil.", "regional_note": "Commonly found in this region"}]
        })),
    )
}

async fn spawn_mock_service(state: MockState) -> anyhow::Result<String> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = Router::new()
        .route("/api/v1/predict/", post(handle_predict))
        .route("/api/v1/predict/batch", post(handle_batch))
        .route("/api/v1/predict/history", get(handle_history))
        .route("/api/v1/predict/:id/feedback", post(handle_feedback))
        .route("/api/v1/explain/combined", post(handle_explain))
        .route("/api/v1/plants", get(handle_list_plants))
        .route("/api/v1/plants/search/by-name", get(handle_search))
        .route("/api/v1/plants/:id", get(handle_get_plant))
        .route("/api/v1/plants/:id/medicinal", get(handle_medicinal))
        .route("/api/v1/recommend/similar/:id", get(handle_similar))
        .route("/api/v1/recommend/ailment", post(handle_ailment))
        .route("/api/v1/recommend/location", get(handle_location))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

async fn client_for(state: MockState) -> PlantApiClient {
    let base = spawn_mock_service(state).await.expect("spawn mock service");
    PlantApiClient::new(ApiEndpoint::parse(&base).expect("endpoint")).expect("client")
}

async fn unreachable_endpoint() -> ApiEndpoint {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    ApiEndpoint::parse(&format!("http://{addr}")).expect("endpoint")
}

fn leaf() -> SelectedImage {
    SelectedImage::new(
        "tulsi.jpg",
        "image/jpeg",
        vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10],
        ImageSource::Picker,
    )
}

#[tokio::test]
async fn predict_uploads_image_as_file_field() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let result = client.predict_image(&leaf()).await.expect("prediction");

    let uploads = state.uploads.lock().await.clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].path, "predict");
    assert_eq!(uploads[0].field.as_deref(), Some("file"));
    assert_eq!(uploads[0].file_name.as_deref(), Some("tulsi.jpg"));
    assert_eq!(uploads[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(uploads[0].size, 6);

    assert_eq!(result.label, "Tulsi");
    assert_eq!(result.outcome(), Outcome::Recognized);
    assert_eq!(result.prediction_id, Some(PredictionId(11)));
    assert_eq!(result.top_predictions[0].label, "Tulsi");
    assert_eq!(result.alternatives(3)[0].label, "Neem");
    assert_eq!(result.model_version, "ensemble-v2");
}

#[tokio::test]
async fn predict_accepts_legacy_label_without_details() {
    let state = MockState::new();
    state
        .reply_predict(
            StatusCode::OK,
            r#"{"predicted_class":"Unknown_Species","confidence":0.41}"#,
        )
        .await;
    let client = client_for(state).await;

    let result = client.predict_image(&leaf()).await.expect("prediction");
    assert_eq!(result.outcome(), Outcome::Rejected);
    assert_eq!(result.display_label(), "Unknown Species");
}

#[tokio::test]
async fn service_detail_becomes_user_message() {
    let state = MockState::new();
    state
        .reply_predict(StatusCode::BAD_REQUEST, r#"{"detail":"File must be an image"}"#)
        .await;
    let client = client_for(state).await;

    let err = client.predict_image(&leaf()).await.expect_err("service error");
    let ClientError::Service {
        status, code, ref detail, ..
    } = err
    else {
        panic!("expected service error, got {err:?}");
    };
    assert_eq!(status, 400);
    assert_eq!(code, ErrorCode::Validation);
    assert_eq!(detail.as_deref(), Some("File must be an image"));
    assert_eq!(err.user_message(), "File must be an image");
}

#[tokio::test]
async fn service_error_without_detail_uses_fallback() {
    let state = MockState::new();
    state
        .reply_predict(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        .await;
    let client = client_for(state.clone()).await;

    let err = client.predict_image(&leaf()).await.expect_err("service error");
    assert!(matches!(err, ClientError::Service { detail: None, .. }));
    assert_eq!(err.user_message(), "Prediction failed");
    assert_eq!(WorkflowError::from(&err).category(), ErrorCategory::Service);

    state.reply_explain(StatusCode::BAD_GATEWAY, "{}").await;
    let err = client.explain_image(&leaf()).await.expect_err("service error");
    assert_eq!(err.user_message(), "Explanation failed");
}

#[tokio::test]
async fn unreachable_service_is_a_connectivity_error() {
    let client = PlantApiClient::new(unreachable_endpoint().await).expect("client");

    let err = client.predict_image(&leaf()).await.expect_err("connectivity");
    assert!(err.is_connectivity(), "unexpected error: {err:?}");
    assert_eq!(err.user_message(), CONNECTIVITY_MESSAGE);
    assert_eq!(
        WorkflowError::from(&err).category(),
        ErrorCategory::Connectivity
    );
}

#[tokio::test]
async fn timeout_is_reported_as_connectivity() {
    let mut state = MockState::new();
    state.delay_ms = 1_500;
    let base = spawn_mock_service(state).await.expect("spawn");
    let client = PlantApiClient::with_options(
        ApiEndpoint::parse(&base).expect("endpoint"),
        ClientOptions {
            request_timeout: Duration::from_millis(200),
            ..ClientOptions::default()
        },
    )
    .expect("client");

    let err = client.predict_image(&leaf()).await.expect_err("timeout");
    let ClientError::Connectivity { ref source, .. } = err else {
        panic!("expected connectivity error, got {err:?}");
    };
    assert!(source.is_timeout());
}

#[tokio::test]
async fn malformed_success_body_is_invalid_response() {
    let state = MockState::new();
    state.reply_predict(StatusCode::OK, "<html>ok</html>").await;
    let client = client_for(state.clone()).await;
    let err = client.predict_image(&leaf()).await.expect_err("invalid");
    assert!(matches!(
        err,
        ClientError::InvalidResponse {
            operation: Operation::Predict,
            ..
        }
    ));
    assert!(!err.user_message().is_empty());

    state
        .reply_predict(StatusCode::OK, r#"{"predicted_plant":"Neem","confidence":7.5}"#)
        .await;
    let err = client.predict_image(&leaf()).await.expect_err("out of range");
    assert!(matches!(err, ClientError::InvalidResponse { .. }));
}

#[tokio::test]
async fn non_image_is_rejected_before_network() {
    let client = PlantApiClient::new(unreachable_endpoint().await).expect("client");
    let notes = SelectedImage::new("notes.txt", "text/plain", b"hi".to_vec(), ImageSource::Picker);

    let err = client.predict_image(&notes).await.expect_err("validation");
    assert!(matches!(err, ClientError::Image(_)));
    assert_eq!(
        WorkflowError::from(&err).category(),
        ErrorCategory::Validation
    );
}

#[tokio::test]
async fn explain_normalizes_flat_and_combined_shapes() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let flat = client.explain_image(&leaf()).await.expect("flat explanation");
    assert!(flat.heatmap_overlay.is_inline());
    assert_eq!(
        flat.segment_visualization.as_str(),
        "https://cdn.example.org/lime/1.png"
    );
    assert_eq!(flat.rationale, "Leaf margin and venation drove the decision.");

    state
        .reply_explain(
            StatusCode::OK,
            json!({
                "prediction": {"predicted_class": "Tulsi", "confidence": 0.93, "top_predictions": []},
                "gradcam": {"gradcam_overlay": "data:image/png;base64,AA==", "heatmap": "data:image/png;base64,AA==", "explanation": "Bright areas mattered.", "method": "Grad-CAM"},
                "lime": {"lime_visualization": "data:image/png;base64,AQ==", "top_features": [{"feature": "Leaf shape", "importance": 0.25, "positive": true}], "explanation": "Green regions support it.", "method": "LIME"}
            })
            .to_string(),
        )
        .await;
    let combined = client.explain_image(&leaf()).await.expect("combined explanation");
    assert_eq!(
        combined.rationale,
        "Bright areas mattered. Green regions support it."
    );
    assert_eq!(combined.top_features[0].feature, "Leaf shape");

    let uploads = state.uploads.lock().await.clone();
    assert!(uploads
        .iter()
        .all(|upload| upload.path == "explain" && upload.field.as_deref() == Some("file")));
}

#[tokio::test]
async fn knowledge_base_lookups_round_trip() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let listing = client
        .list_plants(&PlantListQuery {
            skip: 10,
            limit: Some(5),
            search: Some("  basil ".into()),
        })
        .await
        .expect("list");
    assert_eq!(listing.plants[0].id, PlantId(7));

    let record = client.get_plant(PlantId(7)).await.expect("plant");
    assert_eq!(record.common_names.hi.as_deref(), Some("Tulsi"));
    assert_eq!(record.medicinal_properties.len(), 1);

    let missing = client.get_plant(PlantId(99)).await.expect_err("missing");
    assert_eq!(missing.user_message(), "Plant not found");
    assert!(matches!(
        missing,
        ClientError::Service {
            code: ErrorCode::NotFound,
            ..
        }
    ));

    let properties = client.medicinal_properties(PlantId(7)).await.expect("medicinal");
    assert_eq!(properties.properties[0].efficacy_rating, Some(4));

    let hits = client.search_plants("holy basil").await.expect("search");
    assert_eq!(hits.query, "holy basil");
    assert_eq!(hits.count, 1);

    let queries = state.queries.lock().await.clone();
    assert_eq!(queries[0].get("skip").map(String::as_str), Some("10"));
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("5"));
    assert_eq!(queries[0].get("search").map(String::as_str), Some("basil"));
    assert_eq!(queries[1].get("q").map(String::as_str), Some("holy basil"));
}

#[tokio::test]
async fn recommendations_send_expected_parameters() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let similar = client.similar_plants(PlantId(7), 3).await.expect("similar");
    assert_eq!(similar.plant_id, PlantId(7));
    assert_eq!(similar.recommendations[0].similarity_score, Some(0.42));

    let remedies = client.plants_for_ailment("  cough ").await.expect("ailment");
    assert_eq!(remedies.ailment, "cough");
    assert_eq!(remedies.plants[0].efficacy_rating, Some(4));

    let nearby = client
        .location_recommendations(12.5, 77.25)
        .await
        .expect("location");
    assert_eq!(nearby.location.lat, 12.5);
    assert_eq!(
        nearby.recommendations[0].regional_note.as_deref(),
        Some("Commonly found in this region")
    );

    let queries = state.queries.lock().await.clone();
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("3"));
    assert_eq!(queries[1].get("ailment").map(String::as_str), Some("cough"));
    assert_eq!(queries[2].get("lng").map(String::as_str), Some("77.25"));
}

#[tokio::test]
async fn recommendation_inputs_are_checked_locally() {
    let client = PlantApiClient::new(unreachable_endpoint().await).expect("client");
    assert!(matches!(
        client.plants_for_ailment("x").await,
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        client.location_recommendations(91.0, 0.0).await,
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        client.location_recommendations(f64::NAN, 0.0).await,
        Err(ClientError::Validation(_))
    ));
}

#[tokio::test]
async fn short_search_is_rejected_locally() {
    let client = PlantApiClient::new(unreachable_endpoint().await).expect("client");
    let err = client.search_plants(" a ").await.expect_err("too short");
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn history_and_feedback_use_query_parameters() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let history = client.prediction_history(0, 5).await.expect("history");
    assert_eq!(history.predictions[0].id, PredictionId(11));
    assert!(history.predictions[0].created_at_utc().is_some());

    let feedback = client
        .submit_feedback(PredictionId(11), false, Some("It was neem"))
        .await
        .expect("feedback");
    assert_eq!(feedback.prediction_id, PredictionId(11));

    let queries = state.queries.lock().await.clone();
    assert_eq!(queries[0].get("limit").map(String::as_str), Some("5"));
    assert_eq!(queries[1].get("correct").map(String::as_str), Some("false"));
    assert_eq!(
        queries[1].get("comment").map(String::as_str),
        Some("It was neem")
    );
}

#[tokio::test]
async fn batch_prediction_repeats_files_field() {
    let state = MockState::new();
    let client = client_for(state.clone()).await;

    let images = vec![leaf(), leaf(), leaf()];
    let response = client.predict_batch(&images).await.expect("batch");
    assert_eq!(response.total, 3);
    assert!(response.results.iter().all(|item| item.succeeded()));

    let uploads = state.uploads.lock().await.clone();
    assert!(uploads
        .iter()
        .all(|upload| upload.path == "batch" && upload.field.as_deref() == Some("files")));

    let too_many = vec![leaf(); MAX_BATCH_IMAGES + 1];
    assert!(matches!(
        client.predict_batch(&too_many).await,
        Err(ClientError::Validation(_))
    ));
    assert!(matches!(
        client.predict_batch(&[]).await,
        Err(ClientError::Validation(_))
    ));
}
