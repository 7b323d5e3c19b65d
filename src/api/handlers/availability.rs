use axum::{extract::{Query, State}, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::AvailabilityQuery;
use crate::api::dtos::responses::AvailabilityResponse;
use crate::error::AppError;
use std::sync::Arc;

pub async fn check_availability(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(_actor): AuthUser,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let court_ids = query.court_list();
    let conflicting_court_ids = state.availability
        .check_available(&facility_id, &court_ids, query.start, query.end, query.exclude.as_deref())
        .await?;
    let free_court_ids = state.availability.free_courts(&facility_id, query.start, query.end).await?;

    Ok(Json(AvailabilityResponse {
        available: conflicting_court_ids.is_empty() && (!court_ids.is_empty() || !free_court_ids.is_empty()),
        conflicting_court_ids,
        free_court_ids,
    }))
}
