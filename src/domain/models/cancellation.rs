use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct CancellationPolicyTier {
    pub id: String,
    pub facility_id: String,
    pub reservation_type: Option<String>,
    pub min_hours_before: i32,
    pub refund_percentage: i32,
    pub created_at: DateTime<Utc>,
}

impl CancellationPolicyTier {
    pub fn new(facility_id: String, reservation_type: Option<String>, min_hours_before: i32, refund_percentage: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id,
            reservation_type,
            min_hours_before,
            refund_percentage,
            created_at: Utc::now(),
        }
    }
}

/// Append-only record written exactly once per cancelled reservation.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct ReservationCancellation {
    pub id: String,
    pub reservation_id: String,
    pub cancelled_by_user_id: String,
    pub cancelled_at: DateTime<Utc>,
    pub refund_percentage: i32,
    pub fee_waived: bool,
    pub hours_before_start: f64,
}

impl ReservationCancellation {
    pub fn new(
        reservation_id: String,
        cancelled_by_user_id: String,
        cancelled_at: DateTime<Utc>,
        refund_percentage: i32,
        fee_waived: bool,
        hours_before_start: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            reservation_id,
            cancelled_by_user_id,
            cancelled_at,
            refund_percentage,
            fee_waived,
            hours_before_start,
        }
    }
}

/// Penalty shown to a member before a partially refunded cancellation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PenaltyQuote {
    pub reservation_id: String,
    pub refund_percentage: i32,
    pub penalty_percentage: i32,
    pub hours_before_start: f64,
    pub calculated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Values echoed back by the client when confirming a quoted penalty.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CancellationConfirmation {
    pub calculated_at: DateTime<Utc>,
    pub hours_before_start: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct CancellationOutcome {
    pub cancellation: ReservationCancellation,
    pub released_court_ids: Vec<String>,
    pub reversed_redemptions: u32,
}
