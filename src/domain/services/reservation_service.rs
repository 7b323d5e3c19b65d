use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};
use crate::domain::models::audit::{NotificationType, StaffNotification};
use crate::domain::models::auth::Actor;
use crate::domain::models::cancellation::{CancellationConfirmation, CancellationOutcome, ReservationCancellation};
use crate::domain::models::facility::Facility;
use crate::domain::models::reservation::{
    NewReservationParams, Reservation, ReservationDetail, ReservationDraft, TYPE_COURT, TYPE_OPEN_PLAY,
};
use crate::domain::models::waitlist::OFFER_PENDING;
use crate::domain::ports::{FacilityRepository, ReservationRepository};
use crate::domain::services::cancellation_policy::{CancellationPolicyResolver, CONFIRMATION_WINDOW_MINUTES};
use crate::domain::services::clock::Clock;
use crate::domain::services::redemption_ledger::{check_eligibility, RedemptionLedger};
use crate::domain::services::waitlist_service::WaitlistService;
use crate::error::{AppError, ConflictDetail};

pub struct CreateReservation {
    pub court_ids: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub reservation_type: Option<String>,
    pub primary_user_id: Option<String>,
    pub participant_ids: Vec<String>,
    pub pro_id: Option<String>,
    pub package_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Default)]
pub struct CancelReservation {
    pub waive_fee: bool,
    pub confirmation: Option<CancellationConfirmation>,
}

/// Owns the reservation state machine: none -> ACTIVE -> CANCELLED.
pub struct ReservationService {
    facility_repo: Arc<dyn FacilityRepository>,
    reservation_repo: Arc<dyn ReservationRepository>,
    policy: Arc<CancellationPolicyResolver>,
    ledger: Arc<RedemptionLedger>,
    waitlist: Arc<WaitlistService>,
    clock: Arc<dyn Clock>,
}

impl ReservationService {
    pub fn new(
        facility_repo: Arc<dyn FacilityRepository>,
        reservation_repo: Arc<dyn ReservationRepository>,
        policy: Arc<CancellationPolicyResolver>,
        ledger: Arc<RedemptionLedger>,
        waitlist: Arc<WaitlistService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { facility_repo, reservation_repo, policy, ledger, waitlist, clock }
    }

    pub async fn create(&self, actor: &Actor, facility_id: &str, req: CreateReservation) -> Result<ReservationDetail, AppError> {
        self.create_inner(actor, facility_id, req, None).await
    }

    async fn create_inner(
        &self,
        actor: &Actor,
        facility_id: &str,
        req: CreateReservation,
        waitlist_offer_id: Option<String>,
    ) -> Result<ReservationDetail, AppError> {
        let facility = self.load_facility(facility_id).await?;
        let now = self.clock.now();
        let is_staff = actor.is_staff_of(facility_id);

        let mut court_ids = req.court_ids.clone();
        court_ids.sort();
        court_ids.dedup();
        if court_ids.is_empty() {
            return Err(AppError::Validation("At least one court is required".into()));
        }
        if req.start >= req.end {
            return Err(AppError::Validation("start must be before end".into()));
        }
        if req.end - req.start < Duration::minutes(facility.min_reservation_minutes as i64) {
            return Err(AppError::Validation(format!(
                "Reservations must last at least {} minutes", facility.min_reservation_minutes
            )));
        }

        let reservation_type = req.reservation_type.clone().unwrap_or_else(|| TYPE_COURT.to_string());
        if reservation_type == TYPE_OPEN_PLAY {
            return Err(AppError::Validation("Open play reservations are created by scheduling a session".into()));
        }

        self.check_courts(&facility, &court_ids).await?;

        let primary_user_id = match req.primary_user_id {
            Some(uid) if uid != actor.user_id => {
                if !is_staff {
                    return Err(AppError::Forbidden("Members can only book for themselves".into()));
                }
                uid
            }
            _ => actor.user_id.clone(),
        };

        if !is_staff {
            validate_member_window(&facility, req.start, req.end, req.pro_id.is_some(), now)?;
        }

        let mut participant_ids = vec![primary_user_id.clone()];
        for pid in req.participant_ids {
            if !participant_ids.contains(&pid) {
                participant_ids.push(pid);
            }
        }

        if let Some(package_id) = &req.package_id {
            let package = self.ledger.find_redeemable(package_id).await?;
            check_eligibility(&package, &primary_user_id, &facility, req.pro_id.is_some(), now)?;
        }

        let reservation = Reservation::new(NewReservationParams {
            facility_id: facility_id.to_string(),
            reservation_type,
            start: req.start,
            end: req.end,
            primary_user_id: primary_user_id.clone(),
            created_by_user_id: actor.user_id.clone(),
            pro_id: req.pro_id,
            open_play_rule_id: None,
            notes: req.notes,
            created_at: now,
        });

        let mut draft = ReservationDraft::new(reservation, court_ids.clone(), participant_ids.clone());
        draft.package_id = req.package_id;
        draft.waitlist_offer_id = waitlist_offer_id;
        // Staff bookings for others are exempt from the member ceiling
        if primary_user_id == actor.user_id {
            draft.quota_limit = facility.max_member_reservations.map(|l| l as i64);
        }

        let created = self.reservation_repo.create(&draft, now).await?;
        info!("Reservation {} created on courts {:?}", created.id, court_ids);

        Ok(ReservationDetail {
            reservation: created,
            court_ids,
            participant_ids,
        })
    }

    pub async fn get(&self, actor: &Actor, facility_id: &str, reservation_id: &str) -> Result<ReservationDetail, AppError> {
        let reservation = self.reservation_repo.find_by_id(facility_id, reservation_id).await?
            .ok_or(AppError::NotFound("Reservation not found".into()))?;
        let court_ids = self.reservation_repo.court_ids(&reservation.id).await?;
        let participant_ids = self.reservation_repo.participant_ids(&reservation.id).await?;

        let visible = actor.is_staff_of(facility_id)
            || reservation.primary_user_id == actor.user_id
            || participant_ids.contains(&actor.user_id);
        if !visible {
            return Err(AppError::NotFound("Reservation not found".into()));
        }

        Ok(ReservationDetail { reservation, court_ids, participant_ids })
    }

    /// Cancels a reservation. Members whose refund is below 100% must confirm the quoted
    /// penalty in a second call carrying the quote's `calculated_at` and `hours_before_start`.
    pub async fn cancel(&self, actor: &Actor, facility_id: &str, reservation_id: &str, req: CancelReservation) -> Result<CancellationOutcome, AppError> {
        let reservation = self.reservation_repo.find_by_id(facility_id, reservation_id).await?
            .ok_or(AppError::NotFound("Reservation not found".into()))?;

        let is_staff = actor.is_staff_of(facility_id);
        if reservation.primary_user_id != actor.user_id && !is_staff {
            return Err(AppError::Forbidden("Only the booking member or staff can cancel".into()));
        }
        if !reservation.is_active() {
            return Err(AppError::Conflict(ConflictDetail::AlreadyCancelled { reservation_id: reservation.id.clone() }));
        }
        if reservation.reservation_type == TYPE_OPEN_PLAY {
            return Err(AppError::Validation("Open play reservations are managed through their session".into()));
        }

        let now = self.clock.now();
        if reservation.start_time <= now {
            return Err(AppError::Validation("Reservation has already started".into()));
        }
        if req.waive_fee && !is_staff {
            return Err(AppError::Forbidden("Only staff can waive cancellation fees".into()));
        }

        let hours = reservation.hours_until_start(now);
        let refund = if req.waive_fee {
            100
        } else {
            self.policy.resolve(facility_id, Some(&reservation.reservation_type), hours).await?
        };

        if !is_staff && refund < 100 {
            self.check_confirmation(&reservation, req.confirmation.as_ref(), refund, now).await?;
        }

        let cancellation = ReservationCancellation::new(
            reservation.id.clone(),
            actor.user_id.clone(),
            now,
            refund,
            req.waive_fee,
            hours,
        );

        let notification = reservation.is_lesson().then(|| StaffNotification::new(
            facility_id,
            NotificationType::LessonCancelled,
            format!("Lesson on {} cancelled by {} ({}% refund)", reservation.start_time, actor.user_id, refund),
            Some(reservation.id.clone()),
            now,
        ));

        let effects = self.reservation_repo.cancel(&reservation, &cancellation, notification.as_ref(), now).await?;
        info!(
            "Reservation {} cancelled with {}% refund, {} redemptions reversed",
            reservation.id, refund, effects.reversed_redemptions
        );

        // Committed: waitlist failures only get logged
        if let Err(e) = self.waitlist.on_slot_released(facility_id, &effects.released_court_ids, reservation.start_time, reservation.end_time).await {
            error!("Waitlist trigger failed after cancelling {}: {}", reservation.id, e);
        }

        Ok(CancellationOutcome {
            cancellation,
            released_court_ids: effects.released_court_ids,
            reversed_redemptions: effects.reversed_redemptions,
        })
    }

    async fn check_confirmation(
        &self,
        reservation: &Reservation,
        confirmation: Option<&CancellationConfirmation>,
        refund: i32,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let hours = reservation.hours_until_start(now);
        let confirmed = match confirmation {
            Some(c) => {
                let age = now - c.calculated_at;
                let fresh = c.calculated_at <= now && age <= Duration::minutes(CONFIRMATION_WINDOW_MINUTES);
                let quoted_refund = self.policy
                    .resolve(&reservation.facility_id, Some(&reservation.reservation_type), c.hours_before_start)
                    .await?;
                if !fresh || quoted_refund != refund {
                    warn!("Stale cancellation confirmation for {} (age {}s)", reservation.id, age.num_seconds());
                }
                fresh && quoted_refund == refund
            }
            None => false,
        };

        if confirmed {
            return Ok(());
        }

        let quote = self.policy
            .quote(&reservation.facility_id, &reservation.id, &reservation.reservation_type, hours, now)
            .await?;
        Err(AppError::Conflict(ConflictDetail::ConfirmationRequired { quote }))
    }

    /// Books the slot behind a waitlist offer through the ordinary create path.
    pub async fn accept_offer(&self, actor: &Actor, facility_id: &str, offer_id: &str, package_id: Option<String>) -> Result<ReservationDetail, AppError> {
        let offer = self.waitlist.find_offer(offer_id).await?
            .ok_or(AppError::NotFound("Offer not found".into()))?;
        let entry = self.waitlist.find_entry(&offer.entry_id).await?
            .filter(|e| e.facility_id == facility_id)
            .ok_or(AppError::NotFound("Offer not found".into()))?;

        if entry.user_id != actor.user_id {
            return Err(AppError::Forbidden("Offer belongs to another member".into()));
        }
        if offer.status != OFFER_PENDING || offer.expires_at <= self.clock.now() {
            return Err(AppError::Conflict(ConflictDetail::OfferUnavailable { offer_id: offer.id.clone() }));
        }

        let court_id = match offer.court_id.clone().or(entry.target_court_id.clone()) {
            Some(id) => id,
            None => self.reservation_repo.list_free_courts(facility_id, entry.target_start, entry.target_end).await?
                .into_iter()
                .next()
                .ok_or(AppError::Conflict(ConflictDetail::SlotUnavailable { conflicting_court_ids: Vec::new() }))?,
        };

        let req = CreateReservation {
            court_ids: vec![court_id],
            start: entry.target_start,
            end: entry.target_end,
            reservation_type: None,
            primary_user_id: Some(entry.user_id.clone()),
            participant_ids: Vec::new(),
            pro_id: None,
            package_id,
            notes: None,
        };

        let detail = self.create_inner(actor, facility_id, req, Some(offer.id.clone())).await?;
        info!("Waitlist offer {} accepted as reservation {}", offer.id, detail.reservation.id);
        Ok(detail)
    }

    /// Staff correction: hands back the package units consumed by a reservation.
    pub async fn reverse_redemptions(&self, actor: &Actor, facility_id: &str, reservation_id: &str) -> Result<u32, AppError> {
        if !actor.is_staff_of(facility_id) {
            return Err(AppError::Forbidden("Only facility staff can reverse redemptions".into()));
        }
        let reservation = self.reservation_repo.find_by_id(facility_id, reservation_id).await?
            .ok_or(AppError::NotFound("Reservation not found".into()))?;
        self.ledger.reverse(&reservation.id).await
    }

    async fn load_facility(&self, facility_id: &str) -> Result<Facility, AppError> {
        self.facility_repo.find_by_id(facility_id).await?
            .ok_or(AppError::NotFound("Facility not found".into()))
    }

    async fn check_courts(&self, facility: &Facility, court_ids: &[String]) -> Result<(), AppError> {
        let courts = self.facility_repo.list_courts(&facility.id).await?;

        let mut inactive = Vec::new();
        for id in court_ids {
            match courts.iter().find(|c| &c.id == id) {
                None => return Err(AppError::NotFound(format!("Court {} not found", id))),
                Some(c) if !c.is_active() => inactive.push(id.clone()),
                Some(_) => {}
            }
        }

        if !inactive.is_empty() {
            return Err(AppError::Conflict(ConflictDetail::CourtUnavailable { court_ids: inactive }));
        }
        Ok(())
    }
}

/// Member-only booking window rules, evaluated in the facility's local time.
fn validate_member_window(facility: &Facility, start: DateTime<Utc>, end: DateTime<Utc>, is_lesson: bool, now: DateTime<Utc>) -> Result<(), AppError> {
    if start <= now {
        return Err(AppError::Validation("Cannot book in the past".into()));
    }
    if start > now + Duration::days(facility.max_advance_booking_days as i64) {
        return Err(AppError::Validation(format!(
            "Reservations open {} days in advance", facility.max_advance_booking_days
        )));
    }
    if !facility.within_operating_hours(start, end) {
        return Err(AppError::Validation("Reservation is outside operating hours".into()));
    }
    if is_lesson && start < now + Duration::hours(facility.lesson_min_notice_hours as i64) {
        return Err(AppError::Validation(format!(
            "Lessons require {} hours notice", facility.lesson_min_notice_hours
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn facility() -> Facility {
        Facility {
            id: "f1".into(),
            name: "Club".into(),
            timezone: "UTC".into(),
            open_time: "08:00".into(),
            close_time: "22:00".into(),
            max_advance_booking_days: 7,
            max_member_reservations: Some(2),
            min_reservation_minutes: 30,
            lesson_min_notice_hours: 24,
            cross_facility_redemption: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_member_window_rules() {
        let now = Utc.with_ymd_and_hms(2030, 5, 1, 9, 0, 0).unwrap();
        let f = facility();
        let slot = |days: u32, hour: u32| {
            let start = Utc.with_ymd_and_hms(2030, 5, 1 + days, hour, 0, 0).unwrap();
            (start, start + Duration::hours(1))
        };

        let (s, e) = slot(1, 10);
        assert!(validate_member_window(&f, s, e, false, now).is_ok());

        let (s, e) = slot(0, 8);
        assert!(validate_member_window(&f, s, e, false, now).is_err(), "past start");

        let (s, e) = slot(8, 10);
        assert!(validate_member_window(&f, s, e, false, now).is_err(), "beyond advance window");

        let (s, e) = slot(1, 22);
        assert!(validate_member_window(&f, s, e, false, now).is_err(), "after closing");

        let (s, e) = slot(0, 15);
        assert!(validate_member_window(&f, s, e, false, now).is_ok());
        assert!(validate_member_window(&f, s, e, true, now).is_err(), "lesson notice");
    }
}
