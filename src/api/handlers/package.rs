use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::IssuePackageRequest;
use crate::domain::services::redemption_ledger::IssuePackage;
use crate::error::AppError;
use std::sync::Arc;

pub async fn issue_package(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<IssuePackageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let package = state.ledger.issue(&actor, &facility_id, IssuePackage {
        user_id: payload.user_id,
        kind: payload.kind,
        count: payload.count,
        expires_at: payload.expires_at,
    }).await?;
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn get_package(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, package_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.ledger.get(&actor, &facility_id, &package_id).await?))
}

pub async fn redeem_package(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, package_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let facility = state.facility_repo.find_by_id(&facility_id).await?
        .ok_or(AppError::NotFound("Facility not found".into()))?;
    let redemption = state.ledger.redeem_visit(&actor, &facility, &package_id).await?;
    Ok((StatusCode::CREATED, Json(redemption)))
}
