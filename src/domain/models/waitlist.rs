use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use sqlx::FromRow;

pub const MODE_BROADCAST: &str = "BROADCAST";
pub const MODE_SEQUENTIAL: &str = "SEQUENTIAL";

pub const ENTRY_PENDING: &str = "PENDING";
pub const ENTRY_NOTIFIED: &str = "NOTIFIED";
pub const ENTRY_EXPIRED: &str = "EXPIRED";
pub const ENTRY_FULFILLED: &str = "FULFILLED";

pub const OFFER_PENDING: &str = "PENDING";
pub const OFFER_ACCEPTED: &str = "ACCEPTED";
pub const OFFER_EXPIRED: &str = "EXPIRED";

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct WaitlistConfig {
    pub facility_id: String,
    pub enabled: bool,
    pub mode: String,
    pub offer_expiry_minutes: i32,
    pub notification_window_hours: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

impl WaitlistConfig {
    pub fn default_for(facility_id: &str) -> Self {
        Self {
            facility_id: facility_id.to_string(),
            enabled: true,
            mode: MODE_SEQUENTIAL.to_string(),
            offer_expiry_minutes: 30,
            notification_window_hours: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.mode == MODE_SEQUENTIAL
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct WaitlistEntry {
    pub id: String,
    pub facility_id: String,
    pub target_date: NaiveDate,
    pub target_start: DateTime<Utc>,
    pub target_end: DateTime<Utc>,
    pub target_court_id: Option<String>,
    pub user_id: String,
    pub position: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewWaitlistEntryParams {
    pub facility_id: String,
    pub target_date: NaiveDate,
    pub target_start: DateTime<Utc>,
    pub target_end: DateTime<Utc>,
    pub target_court_id: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl WaitlistEntry {
    /// Position is assigned by the repository when the entry is inserted.
    pub fn new(params: NewWaitlistEntryParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id: params.facility_id,
            target_date: params.target_date,
            target_start: params.target_start.trunc_subsecs(0),
            target_end: params.target_end.trunc_subsecs(0),
            target_court_id: params.target_court_id,
            user_id: params.user_id,
            position: 0,
            status: ENTRY_PENDING.to_string(),
            created_at: params.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct WaitlistOffer {
    pub id: String,
    pub entry_id: String,
    pub court_id: Option<String>,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl WaitlistOffer {
    pub fn new(entry_id: String, court_id: Option<String>, created_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            entry_id,
            court_id,
            status: OFFER_PENDING.to_string(),
            expires_at,
            created_at,
        }
    }
}

/// Result of expiring one sequential offer: the expired offer and, if the queue
/// still had someone waiting, the offer made to the next position.
#[derive(Debug, Serialize, Clone)]
pub struct OfferExpiry {
    pub expired: WaitlistOffer,
    pub next: Option<WaitlistOffer>,
}
