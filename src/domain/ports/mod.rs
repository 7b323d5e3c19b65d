use crate::domain::models::{
    facility::{Facility, Court},
    reservation::{Reservation, ReservationDraft, CourtBooking},
    cancellation::{CancellationPolicyTier, ReservationCancellation},
    open_play::{OpenPlayRule, OpenPlaySession},
    waitlist::{WaitlistConfig, WaitlistEntry, WaitlistOffer, OfferExpiry},
    package::{Package, Redemption},
    audit::{AuditLogEntry, StaffNotification},
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Read access to facility configuration and the court roster.
#[async_trait]
pub trait FacilityRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Facility>, AppError>;
    async fn list_courts(&self, facility_id: &str) -> Result<Vec<Court>, AppError>;
}

/// What a committed cancellation changed.
#[derive(Debug, Clone, Default)]
pub struct CancelEffects {
    pub released_court_ids: Vec<String>,
    pub reversed_redemptions: u32,
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Locks the draft's courts, checks conflicts, inserts the reservation with its links,
    /// redeems the package and claims the waitlist offer, all in one transaction.
    async fn create(&self, draft: &ReservationDraft, now: DateTime<Utc>) -> Result<Reservation, AppError>;
    async fn find_by_id(&self, facility_id: &str, id: &str) -> Result<Option<Reservation>, AppError>;
    async fn court_ids(&self, reservation_id: &str) -> Result<Vec<String>, AppError>;
    async fn participant_ids(&self, reservation_id: &str) -> Result<Vec<String>, AppError>;
    async fn list_court_bookings(&self, facility_id: &str, court_ids: &[String], start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CourtBooking>, AppError>;
    async fn list_free_courts(&self, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<String>, AppError>;
    /// Marks the reservation cancelled, writes the log entry, drops its links and reverses redemptions.
    async fn cancel(&self, reservation: &Reservation, cancellation: &ReservationCancellation, notification: Option<&StaffNotification>, now: DateTime<Utc>) -> Result<CancelEffects, AppError>;
    async fn add_participant(&self, reservation_id: &str, user_id: &str, capacity: i64, now: DateTime<Utc>) -> Result<i64, AppError>;
    async fn remove_participant(&self, reservation_id: &str, user_id: &str) -> Result<bool, AppError>;
    async fn count_participants(&self, reservation_id: &str) -> Result<i64, AppError>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn list_tiers(&self, facility_id: &str) -> Result<Vec<CancellationPolicyTier>, AppError>;
    async fn upsert_tier(&self, tier: &CancellationPolicyTier) -> Result<CancellationPolicyTier, AppError>;
    async fn delete_tier(&self, facility_id: &str, id: &str) -> Result<(), AppError>;
}

/// Court changes applied to an open play session in one transaction.
#[derive(Debug, Clone)]
pub struct ScaleChange {
    pub expected_court_count: i32,
    pub add_court_ids: Vec<String>,
    pub remove_court_ids: Vec<String>,
}

#[async_trait]
pub trait OpenPlayRepository: Send + Sync {
    async fn create_rule(&self, rule: &OpenPlayRule) -> Result<OpenPlayRule, AppError>;
    async fn find_rule(&self, id: &str) -> Result<Option<OpenPlayRule>, AppError>;
    async fn set_rule_auto_scale(&self, rule_id: &str, enabled: bool, audit: &AuditLogEntry) -> Result<OpenPlayRule, AppError>;
    /// Inserts the backing reservation (with conflict check) and the session atomically.
    async fn create_session(&self, draft: &ReservationDraft, session: &OpenPlaySession, now: DateTime<Utc>) -> Result<OpenPlaySession, AppError>;
    async fn find_session(&self, id: &str) -> Result<Option<OpenPlaySession>, AppError>;
    async fn list_upcoming_sessions(&self, now: DateTime<Utc>) -> Result<Vec<OpenPlaySession>, AppError>;
    async fn set_session_override(&self, session_id: &str, auto_scale: Option<bool>, audit: &AuditLogEntry) -> Result<OpenPlaySession, AppError>;
    /// Returns the released courts, or None if the session was no longer scheduled.
    async fn cancel_session(&self, session_id: &str, audit: &AuditLogEntry, notification: &StaffNotification) -> Result<Option<Vec<String>>, AppError>;
    async fn apply_scale(&self, session_id: &str, change: &ScaleChange, audit: &AuditLogEntry, notification: &StaffNotification) -> Result<OpenPlaySession, AppError>;
}

/// The (facility, start, end) triple that waitlist queues and offers are keyed on.
#[derive(Debug, Clone)]
pub struct WaitlistSlot {
    pub facility_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[async_trait]
pub trait WaitlistRepository: Send + Sync {
    async fn get_config(&self, facility_id: &str) -> Result<Option<WaitlistConfig>, AppError>;
    async fn upsert_config(&self, config: &WaitlistConfig) -> Result<WaitlistConfig, AppError>;
    /// Inserts the entry at the back of its slot's queue.
    async fn join(&self, entry: &WaitlistEntry) -> Result<WaitlistEntry, AppError>;
    async fn find_entry(&self, id: &str) -> Result<Option<WaitlistEntry>, AppError>;
    async fn delete_entry(&self, id: &str) -> Result<(), AppError>;
    async fn list_matching_entries(&self, slot: &WaitlistSlot, court_ids: &[String]) -> Result<Vec<WaitlistEntry>, AppError>;
    /// Creates offers for one time window and flags their entries NOTIFIED. With `exclusive`, an
    /// offer is skipped while another offer for the same court is still pending.
    async fn create_offers(&self, slot: &WaitlistSlot, offers: &[WaitlistOffer], exclusive: bool, audit: &AuditLogEntry) -> Result<Vec<WaitlistOffer>, AppError>;
    async fn find_offer(&self, id: &str) -> Result<Option<WaitlistOffer>, AppError>;
    async fn list_expired_offers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WaitlistOffer>, AppError>;
    /// Expires one offer and, when `next_expires_at` is set, offers the slot to the next position.
    async fn expire_offer(&self, offer_id: &str, now: DateTime<Utc>, next_expires_at: Option<DateTime<Utc>>) -> Result<Option<OfferExpiry>, AppError>;
    async fn list_past_entry_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, AppError>;
}

#[async_trait]
pub trait PackageRepository: Send + Sync {
    async fn create(&self, package: &Package) -> Result<Package, AppError>;
    async fn find_by_id(&self, id: &str) -> Result<Option<Package>, AppError>;
    async fn redeem(&self, package_id: &str, facility_id: &str, reservation_id: Option<&str>, now: DateTime<Utc>) -> Result<Redemption, AppError>;
    async fn reverse(&self, reservation_id: &str, now: DateTime<Utc>) -> Result<u32, AppError>;
    async fn list_redemptions(&self, package_id: &str) -> Result<Vec<Redemption>, AppError>;
    async fn expire_packages(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}

#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn list_audit(&self, facility_id: &str, limit: i64) -> Result<Vec<AuditLogEntry>, AppError>;
    async fn list_notifications(&self, facility_id: &str, limit: i64) -> Result<Vec<StaffNotification>, AppError>;
}
