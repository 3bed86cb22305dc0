use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use taggate_core::members::MemberSettings;
use taggate_types::api::{AddMemberRequest, Claims, ListQuery, MemberResponse, UpdateMemberRequest};

use crate::auth::AppState;
use crate::error::ApiError;

/// POST /api/groups/{organization}/members
pub async fn add_member(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = MemberSettings {
        permissions: req.permissions,
        tag_description: req.tag_description,
        tag_expiration_ms: req.tag_expiration_ms,
        tag_generation_limit: req.tag_generation_limit,
    };
    let member = state
        .service
        .add_member(&claims.username, &organization, &req.username, settings)?;
    Ok((StatusCode::CREATED, Json(MemberResponse::from(member))))
}

/// GET /api/groups/{organization}/members
pub async fn list_members(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Query(query): Query<ListQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let members: Vec<MemberResponse> = state
        .service
        .list_members(
            &claims.username,
            &organization,
            &query.filter,
            query.offset,
            query.limit,
        )?
        .into_iter()
        .map(MemberResponse::from)
        .collect();
    Ok(Json(members))
}

/// PUT /api/groups/{organization}/members/{member}
pub async fn update_member(
    State(state): State<AppState>,
    Path((organization, member)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let settings = MemberSettings {
        permissions: req.permissions,
        tag_description: req.tag_description,
        tag_expiration_ms: req.tag_expiration_ms,
        tag_generation_limit: req.tag_generation_limit,
    };
    let member = state
        .service
        .update_member(&claims.username, &organization, &member, settings)?;
    Ok(Json(MemberResponse::from(member)))
}

/// DELETE /api/groups/{organization}/members/{member}
pub async fn delete_member(
    State(state): State<AppState>,
    Path((organization, member)): Path<(String, String)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .delete_member(&claims.username, &organization, &member)?;
    Ok(StatusCode::NO_CONTENT)
}
