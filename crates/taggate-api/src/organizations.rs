use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use taggate_core::organizations::{InstagramVerification, OrganizationSummary};
use taggate_types::api::{
    Claims, CreateOrganizationRequest, InstagramRequest, InstagramResponse, OrganizationResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;

fn to_response(summary: OrganizationSummary) -> OrganizationResponse {
    let org = summary.organization;
    OrganizationResponse {
        name: org.name,
        owner: org.owner,
        member_count: summary.member_count,
        instagram: org.instagram,
        subscription: org.subscription,
        tag_count: org.tag_window.count,
        total_redemptions: summary.total_redemptions,
        created_at: org.created_at,
    }
}

/// POST /api/groups
pub async fn create_organization(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateOrganizationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let organization = state
        .service
        .create_organization(
            &claims.username,
            &req.organization,
            req.captcha_response.as_deref(),
        )
        .await?;

    let summary = OrganizationSummary {
        organization,
        member_count: 0,
        total_redemptions: 0,
    };
    Ok((StatusCode::CREATED, Json(to_response(summary))))
}

/// GET /api/groups
pub async fn list_organizations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let organizations: Vec<OrganizationResponse> = state
        .service
        .list_organizations(&claims.username)?
        .into_iter()
        .map(to_response)
        .collect();
    Ok(Json(organizations))
}

/// GET /api/groups/{organization}
pub async fn read_organization(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = state
        .service
        .read_organization(&claims.username, &organization)?;
    Ok(Json(to_response(summary)))
}

/// DELETE /api/groups/{organization}
pub async fn delete_organization(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .delete_organization(&claims.username, &organization)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/groups/{organization}/instagram
pub async fn verify_instagram(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<InstagramRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state
        .service
        .verify_instagram(&claims.username, &organization, &req.instagram)
        .await?;

    let response = match outcome {
        InstagramVerification::Verified => InstagramResponse {
            verified: true,
            verification_code: None,
            instructions: None,
        },
        InstagramVerification::Pending { code, expires_at } => InstagramResponse {
            verified: false,
            instructions: Some(format!(
                "Add {} to the biography of @{} and submit again before {}",
                code,
                req.instagram,
                expires_at.format("%H:%M UTC")
            )),
            verification_code: Some(code),
        },
    };
    Ok(Json(response))
}
