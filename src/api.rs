//! HTTP boundary: the prediction route, a health probe, and the mapping
//! from core errors to transport status codes.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::classifier::Prediction;
use crate::error::{Error, Severity};
use crate::features::Strategy;
use crate::preprocessing;
use crate::state::AppState;

/// Strategy applied when the request omits the `model_type` field. A field
/// that is present but unrecognized does NOT fall back to this; it is
/// rejected as an unknown model.
pub const DEFAULT_STRATEGY: Strategy = Strategy::Pixel;

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    digit: usize,
    probabilities: Vec<f32>,
    model_used: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict", post(predict))
        .with_state(state)
        // Enable CORS for the browser frontend
        .layer(CorsLayer::permissive())
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "models": state.registry.loaded_names(),
    }))
}

/// Run one uploaded image through the full pipeline:
/// decode -> normalize -> extract features -> classify.
///
/// Multipart fields: `file` (required) holds the image; `model_type`
/// (optional) selects the strategy by wire name.
async fn predict(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, Error> {
    let (file, model_type) = read_upload(multipart).await?;

    let strategy = match model_type.as_deref() {
        None => DEFAULT_STRATEGY,
        Some(name) => {
            Strategy::from_name(name).ok_or_else(|| Error::ModelNotFound(name.to_string()))?
        }
    };
    let model = state.registry.get(strategy)?;

    let image = preprocessing::decode(&file)?;
    let normalized = preprocessing::normalize(&image);
    let features = strategy.extract(&normalized);
    let prediction = model.predict(&features)?;

    info!(
        "predicted digit {} with model '{}'",
        prediction.class_index,
        strategy.name()
    );

    Ok(Json(PredictResponse::new(prediction, strategy)))
}

async fn read_upload(mut multipart: Multipart) -> Result<(Bytes, Option<String>), Error> {
    let mut file = None;
    let mut model_type = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidRequest(format!("malformed multipart request: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                file = Some(field.bytes().await.map_err(|e| {
                    Error::InvalidRequest(format!("could not read uploaded file: {e}"))
                })?);
            }
            "model_type" => {
                model_type = Some(field.text().await.map_err(|e| {
                    Error::InvalidRequest(format!("could not read model_type field: {e}"))
                })?);
            }
            _ => {}
        }
    }

    let file = file.ok_or_else(|| Error::InvalidRequest("no file uploaded".to_string()))?;
    Ok((file, model_type))
}

impl PredictResponse {
    fn new(prediction: Prediction, strategy: Strategy) -> PredictResponse {
        PredictResponse {
            digit: prediction.class_index,
            probabilities: prediction.probabilities.to_vec(),
            model_used: strategy.name(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self.severity() {
            Severity::Client => StatusCode::BAD_REQUEST,
            Severity::Server => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("request failed: {}", self);
        }
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
