use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};

use taggate_types::api::{Claims, RedemptionResponse, RedemptionsQuery, RedemptionsResponse};

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/groups/{organization}/redemptions
pub async fn list_redemptions(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Query(query): Query<RedemptionsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.service.list_redemptions(
        &claims.username,
        &organization,
        query.months_ago,
        &query.filter,
        query.offset,
        query.limit,
    )?;
    Ok(Json(RedemptionsResponse {
        redemptions: report
            .redemptions
            .into_iter()
            .map(RedemptionResponse::from)
            .collect(),
        total_redemptions: report.total_redemptions,
    }))
}

/// GET /api/groups/{organization}/redemptions/{member}
pub async fn read_redemption(
    State(state): State<AppState>,
    Path((organization, member)): Path<(String, String)>,
    Query(query): Query<RedemptionsQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let redemption =
        state
            .service
            .read_redemption(&claims.username, &organization, &member, query.months_ago)?;
    Ok(Json(RedemptionResponse::from(redemption)))
}
