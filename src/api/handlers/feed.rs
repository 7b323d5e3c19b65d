use axum::{extract::{Query, State}, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::FeedQuery;
use crate::error::AppError;
use std::sync::Arc;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

fn limit(query: &FeedQuery) -> i64 {
    query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_staff_of(&facility_id) {
        return Err(AppError::Forbidden("Staff only".into()));
    }
    Ok(Json(state.audit_repo.list_notifications(&facility_id, limit(&query)).await?))
}

pub async fn list_audit_log(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_staff_of(&facility_id) {
        return Err(AppError::Forbidden("Staff only".into()));
    }
    Ok(Json(state.audit_repo.list_audit(&facility_id, limit(&query)).await?))
}
