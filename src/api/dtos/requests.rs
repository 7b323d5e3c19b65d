use crate::domain::models::cancellation::CancellationConfirmation;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    /// Comma separated. Omitted means "which courts are free".
    pub court_ids: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub exclude: Option<String>,
}

impl AvailabilityQuery {
    pub fn court_list(&self) -> Vec<String> {
        self.court_ids.as_deref()
            .map(|ids| ids.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Deserialize)]
pub struct CreateReservationRequest {
    pub court_ids: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reservation_type: Option<String>,
    pub primary_user_id: Option<String>,
    #[serde(default)]
    pub participant_ids: Vec<String>,
    pub pro_id: Option<String>,
    pub package_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CancelReservationRequest {
    #[serde(default)]
    pub waive_fee: bool,
    pub confirmation: Option<CancellationConfirmation>,
}

#[derive(Deserialize)]
pub struct UpsertTierRequest {
    pub reservation_type: Option<String>,
    pub min_hours_before: i32,
    pub refund_percentage: i32,
}

#[derive(Deserialize)]
pub struct JoinWaitlistRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub court_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Deserialize)]
pub struct WaitlistConfigRequest {
    pub enabled: bool,
    pub mode: String,
    pub offer_expiry_minutes: i32,
    pub notification_window_hours: Option<i32>,
}

#[derive(Deserialize, Default)]
pub struct AcceptOfferRequest {
    pub package_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateRuleRequest {
    pub name: String,
    pub kind: Option<String>,
    pub min_participants: i32,
    pub max_participants_per_court: i32,
    pub cancellation_cutoff_minutes: i32,
    #[serde(default = "default_true")]
    pub auto_scale_enabled: bool,
    pub min_courts: i32,
    pub max_courts: i32,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
pub struct RuleAutoScaleRequest {
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct ScheduleSessionRequest {
    pub rule_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub court_ids: Option<Vec<String>>,
}

/// `null` clears the override and the rule's setting applies again.
#[derive(Deserialize)]
pub struct SessionOverrideRequest {
    pub auto_scale: Option<bool>,
}

#[derive(Deserialize)]
pub struct IssuePackageRequest {
    pub user_id: String,
    pub kind: String,
    pub count: i32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct FeedQuery {
    pub limit: Option<i64>,
}
