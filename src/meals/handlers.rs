use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::dto::{
    AnalysisRequest, AnalyzeMealRequest, AnalyzeMealResponse, ErrorResponse, MealCategory,
    UserProfile,
};
use super::services::{analyze_meal, decode_image, image_payload, DEFAULT_IMAGE_TYPE};
use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/meals/analyze", post(analyze_meal_json))
        .route("/meals/analyze/upload", post(analyze_meal_multipart)) // multipart image + meal_type
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB
}

/// POST /meals/analyze { image_base64, meal_type, user_profile?, content_type? }
#[instrument(skip(state, body))]
pub async fn analyze_meal_json(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeMealRequest>,
) -> Result<Json<AnalyzeMealResponse>, ApiError> {
    let category = body.meal_type.parse::<MealCategory>().map_err(bad_request)?;
    let image =
        decode_image(&body.image_base64, body.content_type.as_deref()).map_err(bad_request)?;

    run_analysis(
        &state,
        AnalysisRequest {
            image,
            category,
            profile: body.user_profile,
        },
    )
    .await
}

/// POST /meals/analyze/upload
/// Fields: image (file), meal_type (text), user_profile (optional JSON text)
#[instrument(skip(state, mp))]
pub async fn analyze_meal_multipart(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<AnalyzeMealResponse>, ApiError> {
    let mut image = None;
    let mut meal_type = None;
    let mut profile = None;

    while let Some(field) = mp.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("image") | Some("file") => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_IMAGE_TYPE)
                    .to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                image = Some(image_payload(data, &content_type).map_err(bad_request)?);
            }
            Some("meal_type") => {
                meal_type = Some(field.text().await.map_err(multipart_error)?);
            }
            Some("user_profile") => {
                let raw = field.text().await.map_err(multipart_error)?;
                if !raw.trim().is_empty() {
                    let parsed = serde_json::from_str::<UserProfile>(&raw)
                        .map_err(|e| bad_request(format!("invalid user_profile: {e}")))?;
                    profile = Some(parsed);
                }
            }
            other => warn!(field = ?other, "ignoring unknown multipart field"),
        }
    }

    let image = image.ok_or_else(|| bad_request("image is required"))?;
    let category = meal_type
        .ok_or_else(|| bad_request("meal_type is required"))?
        .parse::<MealCategory>()
        .map_err(bad_request)?;

    run_analysis(
        &state,
        AnalysisRequest {
            image,
            category,
            profile,
        },
    )
    .await
}

async fn run_analysis(
    state: &AppState,
    req: AnalysisRequest,
) -> Result<Json<AnalyzeMealResponse>, ApiError> {
    info!(meal_type = %req.category, bytes = req.image.body.len(), "analyzing meal");

    match analyze_meal(state.vision.as_ref(), &req).await {
        Ok(parsed) => Ok(Json(AnalyzeMealResponse {
            success: true,
            meal_type: req.category,
            analysis: parsed.into_record(),
            timestamp: OffsetDateTime::now_utc(),
        })),
        Err(e) => {
            error!(error = %e, "meal analysis failed");
            Err((
                e.status(),
                Json(ErrorResponse {
                    success: false,
                    detail: format!("Failed to analyze meal: {e}"),
                }),
            ))
        }
    }
}

/// Keeps the status axum picked, so an oversized upload is 413 rather than 400.
fn multipart_error(e: MultipartError) -> ApiError {
    warn!(error = %e, "multipart read failed");
    (
        e.status(),
        Json(ErrorResponse {
            success: false,
            detail: e.body_text(),
        }),
    )
}

fn bad_request(msg: impl ToString) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            success: false,
            detail: msg.to_string(),
        }),
    )
}
