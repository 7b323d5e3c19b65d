use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::{CancelReservationRequest, CreateReservationRequest};
use crate::api::dtos::responses::ReversalResponse;
use crate::domain::services::reservation_service::{CancelReservation, CreateReservation};
use crate::error::AppError;
use std::sync::Arc;

pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<CreateReservationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.reservations.create(&actor, &facility_id, CreateReservation {
        court_ids: payload.court_ids,
        start: payload.start,
        end: payload.end,
        reservation_type: payload.reservation_type,
        primary_user_id: payload.primary_user_id,
        participant_ids: payload.participant_ids,
        pro_id: payload.pro_id,
        package_id: payload.package_id,
        notes: payload.notes,
    }).await?;

    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, reservation_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.reservations.get(&actor, &facility_id, &reservation_id).await?;
    Ok(Json(detail))
}

/// First call without a confirmation returns 409 `confirmation_required` with the quote when
/// a refund is partial; echoing the quote's `calculated_at` and `hours_before_start` commits.
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, reservation_id)): Path<(String, String)>,
    Json(payload): Json<CancelReservationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.reservations.cancel(&actor, &facility_id, &reservation_id, CancelReservation {
        waive_fee: payload.waive_fee,
        confirmation: payload.confirmation,
    }).await?;
    Ok(Json(outcome))
}

pub async fn reverse_redemptions(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, reservation_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let reversed = state.reservations.reverse_redemptions(&actor, &facility_id, &reservation_id).await?;
    Ok(Json(ReversalResponse { reservation_id, reversed }))
}
