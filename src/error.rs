use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use crate::domain::models::cancellation::PenaltyQuote;

/// Business-rule conflicts. Each variant carries what the caller needs to react.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum ConflictDetail {
    SlotUnavailable { conflicting_court_ids: Vec<String> },
    CourtUnavailable { court_ids: Vec<String> },
    ReservationLimit { limit: i64, current: i64 },
    ConfirmationRequired { quote: PenaltyQuote },
    EnrollmentClosed { session_id: String },
    SessionFull { capacity: i64, current: i64 },
    PackageUnavailable { package_id: String },
    OfferUnavailable { offer_id: String },
    AlreadyWaitlisted,
    AlreadyCancelled { reservation_id: String },
    StaleDecision { entity_id: String },
    Duplicate,
}

impl ConflictDetail {
    pub fn message(&self) -> String {
        match self {
            ConflictDetail::SlotUnavailable { conflicting_court_ids } => {
                format!("Courts already booked for this time: {}", conflicting_court_ids.join(", "))
            }
            ConflictDetail::CourtUnavailable { court_ids } => {
                format!("Courts not available for booking: {}", court_ids.join(", "))
            }
            ConflictDetail::ReservationLimit { limit, current } => {
                format!("Reservation limit reached ({} of {})", current, limit)
            }
            ConflictDetail::ConfirmationRequired { quote } => {
                format!("Cancellation refunds {}%. Confirm to proceed", quote.refund_percentage)
            }
            ConflictDetail::EnrollmentClosed { .. } => "Enrollment is closed for this session".to_string(),
            ConflictDetail::SessionFull { capacity, .. } => format!("Session is full ({} players)", capacity),
            ConflictDetail::PackageUnavailable { .. } => "Package has no redeemable units".to_string(),
            ConflictDetail::OfferUnavailable { .. } => "Waitlist offer is no longer available".to_string(),
            ConflictDetail::AlreadyWaitlisted => "Already on the waitlist for this slot".to_string(),
            ConflictDetail::AlreadyCancelled { .. } => "Reservation is already cancelled".to_string(),
            ConflictDetail::StaleDecision { .. } => "State changed while the decision was being applied".to_string(),
            ConflictDetail::Duplicate => "Resource already exists (duplicate entry)".to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Conflict: {}", .0.message())]
    Conflict(ConflictDetail),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal,
    #[error("Internal server error: {0}")]
    InternalWithMsg(String),
}

impl AppError {
    pub fn conflict_detail(&self) -> Option<&ConflictDetail> {
        match self {
            AppError::Conflict(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }
}

/// 2067 = SQLite unique constraint, 23505 = PostgreSQL unique violation.
pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db_err| db_err.code())
        .is_some_and(|code| code == "2067" || code == "23505")
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message, conflict) = match &self {
            AppError::Database(e) => {
                if is_unique_violation(e) {
                    let detail = ConflictDetail::Duplicate;
                    (StatusCode::CONFLICT, detail.message(), Some(detail))
                } else {
                    error!("Database error: {:?}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string(), None)
                }
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone(), None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string(), None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone(), None),
            AppError::Conflict(detail) => (StatusCode::CONFLICT, detail.message(), Some(detail.clone())),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            AppError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None),
            AppError::InternalWithMsg(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error".to_string(), None)
            }
        };

        let body = match conflict {
            Some(detail) => Json(json!({ "error": message, "conflict": detail })),
            None => Json(json!({ "error": message })),
        };

        (status, body).into_response()
    }
}
