use axum::{extract::{Path, State}, http::StatusCode, response::IntoResponse, Json};
use crate::state::AppState;
use crate::api::extractors::{auth::AuthUser, facility::FacilityId};
use crate::api::dtos::requests::{CreateRuleRequest, RuleAutoScaleRequest, ScheduleSessionRequest, SessionOverrideRequest};
use crate::domain::models::open_play::KIND_OPEN_PLAY;
use crate::domain::services::open_play_service::{CreateRule, ScheduleSession};
use crate::error::AppError;
use std::sync::Arc;

pub async fn create_rule(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<CreateRuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.open_play.create_rule(&actor, &facility_id, CreateRule {
        name: payload.name,
        kind: payload.kind.unwrap_or_else(|| KIND_OPEN_PLAY.to_string()),
        min_participants: payload.min_participants,
        max_participants_per_court: payload.max_participants_per_court,
        cancellation_cutoff_minutes: payload.cancellation_cutoff_minutes,
        auto_scale_enabled: payload.auto_scale_enabled,
        min_courts: payload.min_courts,
        max_courts: payload.max_courts,
    }).await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn set_rule_auto_scale(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, rule_id)): Path<(String, String)>,
    Json(payload): Json<RuleAutoScaleRequest>,
) -> Result<impl IntoResponse, AppError> {
    let rule = state.open_play.set_rule_auto_scale(&actor, &facility_id, &rule_id, payload.enabled).await?;
    Ok(Json(rule))
}

pub async fn schedule_session(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Json(payload): Json<ScheduleSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.open_play.schedule_session(&actor, &facility_id, ScheduleSession {
        rule_id: payload.rule_id,
        start: payload.start,
        end: payload.end,
        court_ids: payload.court_ids,
    }).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(_actor): AuthUser,
    Path((_, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.open_play.get_session(&facility_id, &session_id).await?))
}

pub async fn join_session(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.open_play.join(&actor, &facility_id, &session_id).await?;
    Ok(Json(enrollment))
}

pub async fn leave_session(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, session_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.open_play.leave(&actor, &facility_id, &session_id).await?;
    Ok(Json(enrollment))
}

pub async fn set_session_override(
    State(state): State<Arc<AppState>>,
    FacilityId(facility_id): FacilityId,
    AuthUser(actor): AuthUser,
    Path((_, session_id)): Path<(String, String)>,
    Json(payload): Json<SessionOverrideRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.open_play.set_session_override(&actor, &facility_id, &session_id, payload.auto_scale).await?;
    Ok(Json(session))
}
