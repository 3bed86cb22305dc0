use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use taggate_types::api::{DealsResponse, PremiumRequest, PremiumResponse};
use taggate_types::time::Deal;

use crate::auth::AppState;
use crate::error::ApiError;

/// GET /api/deals, total price of each deal in cents.
pub async fn deals(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let costs = state.service.deal_costs()?;
    Ok(Json(DealsResponse {
        silver: costs.total(Deal::Silver),
        gold: costs.total(Deal::Gold),
        platinum: costs.total(Deal::Platinum),
        diamond: costs.total(Deal::Diamond),
    }))
}

/// POST /api/groups/{organization}/premium
pub async fn upgrade(
    State(state): State<AppState>,
    Path(organization): Path<String>,
    Json(req): Json<PremiumRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let subscription = state
        .service
        .upgrade_to_premium(&organization, req.duration, &req.card_details)
        .await?;
    Ok(Json(PremiumResponse { subscription }))
}
