use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::{AcceptOfferRequest, JoinWaitlistRequest, WaitlistConfigRequest};
use crate::domain::services::waitlist_service::{ConfigureWaitlist, JoinWaitlist};
use crate::error::AppError;
use std::sync::Arc;

pub async fn join_waitlist(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<JoinWaitlistRequest>,
) -> Result<impl IntoResponse, AppError> {
    let entry = state.waitlist.join(&actor, &facility_id, JoinWaitlist {
        start: payload.start,
        end: payload.end,
        court_id: payload.court_id,
        user_id: payload.user_id,
    }).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn leave_waitlist(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, entry_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    state.waitlist.leave(&actor, &facility_id, &entry_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(_actor): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.waitlist.config(&facility_id).await?))
}

pub async fn update_config(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<WaitlistConfigRequest>,
) -> Result<impl IntoResponse, AppError> {
    let config = state.waitlist.configure(&actor, &facility_id, ConfigureWaitlist {
        enabled: payload.enabled,
        mode: payload.mode,
        offer_expiry_minutes: payload.offer_expiry_minutes,
        notification_window_hours: payload.notification_window_hours,
    }).await?;
    Ok(Json(config))
}

pub async fn accept_offer(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, offer_id)): Path<(String, String)>,
    Json(payload): Json<AcceptOfferRequest>,
) -> Result<impl IntoResponse, AppError> {
    let detail = state.reservations.accept_offer(&actor, &facility_id, &offer_id, payload.package_id).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}
