use axum::{
    extract::{FromRequestParts, Path},
    http::{request::Parts, StatusCode},
};
use std::collections::HashMap;
use crate::state::AppState;
use std::sync::Arc;
use tracing::Span;

/// The `{facility_id}` path segment, checked against the facility roster.
pub struct FacilityId(pub String);

impl FromRequestParts<Arc<AppState>> for FacilityId {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let params: Path<HashMap<String, String>> = Path::from_request_parts(parts, state)
            .await
            .map_err(|_| StatusCode::BAD_REQUEST)?;

        let facility_id = params.get("facility_id").ok_or(StatusCode::BAD_REQUEST)?;

        match state.facility_repo.find_by_id(facility_id).await {
            Ok(Some(_)) => {
                Span::current().record("facility_id", facility_id.as_str());
                Ok(FacilityId(facility_id.clone()))
            }
            Ok(None) => Err(StatusCode::NOT_FOUND),
            Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        }
    }
}
