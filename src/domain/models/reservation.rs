use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::FromRow;

pub const RESERVATION_ACTIVE: &str = "ACTIVE";
pub const RESERVATION_CANCELLED: &str = "CANCELLED";
pub const TYPE_COURT: &str = "COURT";
pub const TYPE_OPEN_PLAY: &str = "OPEN_PLAY";

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Reservation {
    pub id: String,
    pub facility_id: String,
    pub reservation_type: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub primary_user_id: String,
    pub created_by_user_id: String,
    pub pro_id: Option<String>,
    pub open_play_rule_id: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub struct NewReservationParams {
    pub facility_id: String,
    pub reservation_type: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub primary_user_id: String,
    pub created_by_user_id: String,
    pub pro_id: Option<String>,
    pub open_play_rule_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    pub fn new(params: NewReservationParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id: params.facility_id,
            reservation_type: params.reservation_type,
            start_time: params.start.trunc_subsecs(0),
            end_time: params.end.trunc_subsecs(0),
            primary_user_id: params.primary_user_id,
            created_by_user_id: params.created_by_user_id,
            pro_id: params.pro_id,
            open_play_rule_id: params.open_play_rule_id,
            status: RESERVATION_ACTIVE.to_string(),
            notes: params.notes,
            created_at: params.created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RESERVATION_ACTIVE
    }

    pub fn is_lesson(&self) -> bool {
        self.pro_id.is_some()
    }

    /// Hours from `now` until the reservation starts. Negative once started.
    pub fn hours_until_start(&self, now: DateTime<Utc>) -> f64 {
        (self.start_time - now).num_seconds() as f64 / 3600.0
    }
}

/// One (reservation, court) occupancy used by conflict detection.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone, PartialEq)]
pub struct CourtBooking {
    pub reservation_id: String,
    pub court_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// Everything a reservation insert writes in its transaction.
#[derive(Debug, Clone)]
pub struct ReservationDraft {
    pub reservation: Reservation,
    pub court_ids: Vec<String>,
    pub participant_ids: Vec<String>,
    pub package_id: Option<String>,
    pub waitlist_offer_id: Option<String>,
    /// Member quota enforced inside the insert transaction. None for staff bookings.
    pub quota_limit: Option<i64>,
}

impl ReservationDraft {
    pub fn new(reservation: Reservation, court_ids: Vec<String>, participant_ids: Vec<String>) -> Self {
        Self {
            reservation,
            court_ids,
            participant_ids,
            package_id: None,
            waitlist_offer_id: None,
            quota_limit: None,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ReservationDetail {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub court_ids: Vec<String>,
    pub participant_ids: Vec<String>,
}
