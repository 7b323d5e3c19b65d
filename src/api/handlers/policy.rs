use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::UpsertTierRequest;
use crate::domain::models::cancellation::CancellationPolicyTier;
use crate::error::AppError;
use std::sync::Arc;

pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(_actor): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let tiers = state.policy.list_tiers(&facility_id).await?;
    Ok(Json(tiers))
}

pub async fn upsert_tier(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<UpsertTierRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_staff_of(&facility_id) {
        return Err(AppError::Forbidden("Only facility staff can edit the cancellation policy".into()));
    }
    let tier = CancellationPolicyTier::new(facility_id, payload.reservation_type, payload.min_hours_before, payload.refund_percentage);
    let saved = state.policy.upsert_tier(&tier).await?;
    Ok(Json(saved))
}

pub async fn delete_tier(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, tier_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_staff_of(&facility_id) {
        return Err(AppError::Forbidden("Only facility staff can edit the cancellation policy".into()));
    }
    state.policy.delete_tier(&facility_id, &tier_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
