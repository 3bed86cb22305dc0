use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::TimeDelta;

use taggate_core::CoreError;
use taggate_types::api::{Claims, GenerateTagRequest, GenerateTagResponse, VerifyTagResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/tags/{organization}/generate
pub async fn generate_tag(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GenerateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let expiration = req
        .expiration_ms
        .map(|ms| {
            TimeDelta::try_milliseconds(ms)
                .ok_or_else(|| CoreError::invalid("expiration", "out of range"))
        })
        .transpose()?;

    let tag = state
        .service
        .generate_tag(
            &claims.username,
            &organization,
            &req.description,
            expiration,
            req.captcha_response.as_deref(),
        )
        .await?;

    Ok(Json(GenerateTagResponse { tag }))
}

/// POST /api/tags/{organization}/verify/{tag}
pub async fn verify_tag(
    State(state): State<AppState>,
    Path((organization, tag)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let is_valid = state
        .service
        .verify_tag(&claims.username, &organization, &tag)?;
    Ok(Json(VerifyTagResponse { is_valid }))
}

/// POST /api/tags/{organization}/verifyweb/{tag}, no authentication.
pub async fn verify_tag_web(
    State(state): State<AppState>,
    Path((organization, tag)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let is_valid = state.service.verify_tag_public(&organization, &tag)?;
    Ok(Json(VerifyTagResponse { is_valid }))
}
