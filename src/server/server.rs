use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::metrics::metrics_handler;
use super::{log_requests, state::*, ApiError, ServerConfig};
use crate::analysis_store::AnalysisRecord;
use crate::recommend::{AnalysisService, Preferences, RecommendedTrack, SceneAnalysis};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime: String,
    captioning_models: Vec<String>,
    reasoner_model: String,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

#[derive(Deserialize, Debug)]
struct AnalyzeBody {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub preferences: String,
    #[serde(default)]
    pub language_preferences: Vec<String>,
    #[serde(default)]
    pub genre_hints: Option<String>,
}

impl AnalyzeBody {
    fn into_preferences(self) -> Preferences {
        let description = [self.description, self.preferences]
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        Preferences {
            description,
            preferred_languages: self.language_preferences,
            genre_hints: self.genre_hints.filter(|h| !h.trim().is_empty()),
        }
    }
}

#[derive(Deserialize, Debug)]
struct RefineBody {
    pub analysis_id: String,
    #[serde(default)]
    pub additional_preferences: Preferences,
}

#[derive(Serialize)]
struct AnalyzeResponse {
    analysis_id: String,
    caption: String,
    scene: SceneAnalysis,
    results: Vec<RecommendedTrack>,
}

#[derive(Serialize)]
struct RefineResponse {
    results: Vec<RecommendedTrack>,
}

/// Decode and validate the image payload. Accepts plain base64 or a
/// `data:image/...;base64,` URL.
fn decode_image(raw: &str, max_bytes: usize) -> Result<Vec<u8>, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput("image is required".to_string()));
    }

    let encoded = match trimmed.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };

    // Reject obviously oversized payloads before decoding.
    if encoded.len() / 4 * 3 > max_bytes {
        return Err(ApiError::InvalidInput(format!(
            "image exceeds the {} byte limit",
            max_bytes
        )));
    }

    let bytes = BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| ApiError::InvalidInput("image is not valid base64".to_string()))?;

    if bytes.len() > max_bytes {
        return Err(ApiError::InvalidInput(format!(
            "image exceeds the {} byte limit",
            max_bytes
        )));
    }

    match infer::get(&bytes) {
        Some(kind) if kind.mime_type().starts_with("image/") => Ok(bytes),
        _ => Err(ApiError::InvalidInput(
            "payload is not a recognized image format".to_string(),
        )),
    }
}

async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime: format_uptime(state.start_time.elapsed()),
        captioning_models: state
            .service
            .captioner_models()
            .iter()
            .map(|m| m.to_string())
            .collect(),
        reasoner_model: state.service.reasoner_model().to_string(),
    })
}

async fn analyze(
    State(state): State<ServerState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let image = decode_image(&body.image, state.config.max_image_bytes)?;
    let preferences = body.into_preferences();

    let outcome = state.service.analyze(&image, preferences).await?;

    Ok(Json(AnalyzeResponse {
        analysis_id: outcome.analysis_id,
        caption: outcome.caption.text,
        scene: outcome.scene,
        results: outcome.results,
    }))
}

async fn refine_recommendations(
    State(service): State<GuardedAnalysisService>,
    Json(body): Json<RefineBody>,
) -> Result<Json<RefineResponse>, ApiError> {
    let outcome = service
        .refine(&body.analysis_id, body.additional_preferences)
        .await?;

    Ok(Json(RefineResponse {
        results: outcome.results,
    }))
}

async fn get_results(
    State(service): State<GuardedAnalysisService>,
    Path(analysis_id): Path<String>,
) -> Result<Json<AnalysisRecord>, ApiError> {
    let record = service.results(&analysis_id).await?;
    Ok(Json(record))
}

pub fn make_app(config: ServerConfig, service: Arc<AnalysisService>) -> Router {
    let state = ServerState {
        config,
        start_time: Instant::now(),
        service,
    };

    Router::new()
        .route("/analyze", post(analyze))
        .route("/refine_recommendations", post(refine_recommendations))
        .route("/results/{analysis_id}", get(get_results))
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state)
}

pub async fn run_server(config: ServerConfig, service: Arc<AnalysisService>) -> Result<()> {
    let port = config.port;
    let app = make_app(config, service);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    tracing::info!("Listening on 127.0.0.1:{}", port);

    Ok(axum::serve(listener, app).await?)
}
