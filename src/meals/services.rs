use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::{info, instrument};

use super::dto::{AnalysisRequest, CorrelationId, ImagePayload};
use super::parser::{parse_model_response, ParsedAnalysis};
use super::prompt::build_prompt;
use crate::errors::AnalysisError;
use crate::vision::VisionClient;

pub const DEFAULT_IMAGE_TYPE: &str = "image/jpeg";

/// Prompt, call the model once, read its answer.
///
/// Only a missing credential or a failed model call is an error; an answer
/// that cannot be read comes back as `ParsedAnalysis::Fallback`.
#[instrument(skip(vision, req), fields(category = %req.category))]
pub async fn analyze_meal(
    vision: &dyn VisionClient,
    req: &AnalysisRequest,
) -> Result<ParsedAnalysis, AnalysisError> {
    if !vision.is_configured() {
        return Err(AnalysisError::Configuration(
            "GEMINI_API_KEY is not set".into(),
        ));
    }

    let prompt = build_prompt(req.category, req.profile.as_ref());
    let correlation_id = CorrelationId::new();
    let raw = vision.generate(&prompt, &req.image, &correlation_id).await?;

    let parsed = parse_model_response(&raw);
    info!(
        %correlation_id,
        fallback = parsed.is_fallback(),
        calories = parsed.record().total_calories,
        rating = parsed.record().rating,
        "meal analyzed"
    );
    Ok(parsed)
}

/// Decodes a bare base64 string or a `data:<mime>;base64,` URL.
/// An explicit `content_type` wins over the one in the data URL.
pub fn decode_image(encoded: &str, content_type: Option<&str>) -> Result<ImagePayload, String> {
    let (declared, data) = match encoded.trim().strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| "malformed data URL".to_string())?;
            let mut params = meta.split(';').map(str::trim);
            let mime = params.next().unwrap_or_default();
            if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
                return Err("data URL must be base64 encoded".into());
            }
            (Some(mime), data)
        }
        None => (None, encoded),
    };

    let ct = content_type
        .filter(|c| !c.trim().is_empty())
        .or(declared.filter(|m| !m.is_empty()))
        .unwrap_or(DEFAULT_IMAGE_TYPE);

    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.is_empty() {
        return Err("image_base64 is empty".into());
    }
    let body = STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| "invalid base64".to_string())?;

    image_payload(Bytes::from(body), ct)
}

pub fn image_payload(body: Bytes, content_type: &str) -> Result<ImagePayload, String> {
    if body.is_empty() {
        return Err("image is empty".into());
    }
    let content_type = normalize_image_type(content_type)
        .ok_or_else(|| format!("unsupported image type: {content_type}"))?;
    Ok(ImagePayload {
        body,
        content_type: content_type.to_string(),
    })
}

fn normalize_image_type(ct: &str) -> Option<&'static str> {
    match ct.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("image/jpeg"),
        "image/png" => Some("image/png"),
        "image/webp" => Some("image/webp"),
        "image/heic" => Some("image/heic"),
        "image/heif" => Some("image/heif"),
        _ => None,
    }
}
