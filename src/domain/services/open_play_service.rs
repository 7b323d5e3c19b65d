use std::collections::HashMap;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, info_span, warn, Instrument};
use crate::domain::models::audit::{AuditLogEntry, NotificationType, StaffNotification, ACTOR_OPEN_PLAY};
use crate::domain::models::auth::Actor;
use crate::domain::models::open_play::{NewOpenPlayRuleParams, OpenPlayRule, OpenPlaySession};
use crate::domain::models::reservation::{NewReservationParams, Reservation, ReservationDraft, TYPE_OPEN_PLAY};
use crate::domain::ports::{FacilityRepository, OpenPlayRepository, ReservationRepository, ScaleChange};
use crate::domain::services::clock::Clock;
use crate::domain::services::waitlist_service::WaitlistService;
use crate::error::{AppError, ConflictDetail};

/// Courts needed for `participants` players, kept within the rule's bounds.
pub fn desired_court_count(participants: i64, max_per_court: i32, min_courts: i32, max_courts: i32) -> i32 {
    let per_court = max_per_court.max(1) as i64;
    let needed = (participants + per_court - 1) / per_court;
    needed.clamp(min_courts as i64, max_courts as i64) as i32
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalePlan {
    pub from: i32,
    pub to: i32,
    pub desired: i32,
    pub available: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Cancel { participants: i64, minimum: i32 },
    Scale(ScalePlan),
    Keep,
}

/// Go/no-go decision for a session at its cutoff. `available` is the number of courts the
/// session could hold right now: its own plus the free ones.
pub fn decide(rule: &OpenPlayRule, session: &OpenPlaySession, participants: i64, available: i32) -> Decision {
    if participants < rule.min_participants as i64 {
        return Decision::Cancel { participants, minimum: rule.min_participants };
    }
    if !session.auto_scale_effective(rule) {
        return Decision::Keep;
    }

    let desired = desired_court_count(participants, rule.max_participants_per_court, rule.min_courts, rule.max_courts);
    let target = desired.min(available.max(session.court_count));
    if target == session.court_count {
        Decision::Keep
    } else {
        Decision::Scale(ScalePlan { from: session.court_count, to: target, desired, available })
    }
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct EnforcementReport {
    pub evaluated: u32,
    pub cancelled: u32,
    pub scaled: u32,
    pub failed: u32,
}

#[derive(Debug, Serialize, Clone)]
pub struct SessionEnrollment {
    pub session_id: String,
    pub user_id: String,
    pub participants: i64,
}

pub struct CreateRule {
    pub name: String,
    pub kind: String,
    pub min_participants: i32,
    pub max_participants_per_court: i32,
    pub cancellation_cutoff_minutes: i32,
    pub auto_scale_enabled: bool,
    pub min_courts: i32,
    pub max_courts: i32,
}

pub struct ScheduleSession {
    pub rule_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub court_ids: Option<Vec<String>>,
}

pub struct OpenPlayService {
    repo: Arc<dyn OpenPlayRepository>,
    reservation_repo: Arc<dyn ReservationRepository>,
    facility_repo: Arc<dyn FacilityRepository>,
    waitlist: Arc<WaitlistService>,
    clock: Arc<dyn Clock>,
}

impl OpenPlayService {
    pub fn new(
        repo: Arc<dyn OpenPlayRepository>,
        reservation_repo: Arc<dyn ReservationRepository>,
        facility_repo: Arc<dyn FacilityRepository>,
        waitlist: Arc<WaitlistService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, reservation_repo, facility_repo, waitlist, clock }
    }

    pub async fn create_rule(&self, actor: &Actor, facility_id: &str, req: CreateRule) -> Result<OpenPlayRule, AppError> {
        require_staff(actor, facility_id)?;
        self.facility_repo.find_by_id(facility_id).await?
            .ok_or(AppError::NotFound("Facility not found".into()))?;

        let mut rule = OpenPlayRule::new(NewOpenPlayRuleParams {
            facility_id: facility_id.to_string(),
            name: req.name,
            kind: req.kind,
            min_participants: req.min_participants,
            max_participants_per_court: req.max_participants_per_court,
            cancellation_cutoff_minutes: req.cancellation_cutoff_minutes,
            auto_scale_enabled: req.auto_scale_enabled,
            min_courts: req.min_courts,
            max_courts: req.max_courts,
        });
        rule.created_at = self.clock.now();
        rule.validate().map_err(AppError::Validation)?;

        self.repo.create_rule(&rule).await
    }

    pub async fn set_rule_auto_scale(&self, actor: &Actor, facility_id: &str, rule_id: &str, enabled: bool) -> Result<OpenPlayRule, AppError> {
        require_staff(actor, facility_id)?;
        let rule = self.load_rule(facility_id, rule_id).await?;

        let audit = AuditLogEntry::new(
            facility_id,
            &actor.user_id,
            "rule_auto_scale_set",
            "open_play_rule",
            &rule.id,
            json!({ "before": rule.auto_scale_enabled, "after": enabled }),
            self.clock.now(),
        );
        let updated = self.repo.set_rule_auto_scale(&rule.id, enabled, &audit).await?;
        info!("Auto-scale for rule {} set to {}", rule.id, enabled);
        Ok(updated)
    }

    /// Books the session's courts as one OPEN_PLAY reservation and registers the session.
    pub async fn schedule_session(&self, actor: &Actor, facility_id: &str, req: ScheduleSession) -> Result<OpenPlaySession, AppError> {
        require_staff(actor, facility_id)?;
        let rule = self.load_rule(facility_id, &req.rule_id).await?;
        let now = self.clock.now();

        if req.start >= req.end {
            return Err(AppError::Validation("start must be before end".into()));
        }
        if req.start <= now {
            return Err(AppError::Validation("Cannot schedule a session in the past".into()));
        }

        let explicit = req.court_ids.is_some();
        let mut court_ids = match req.court_ids {
            Some(ids) => {
                let courts = self.facility_repo.list_courts(facility_id).await?;
                for id in &ids {
                    if !courts.iter().any(|c| &c.id == id) {
                        return Err(AppError::NotFound(format!("Court {} not found", id)));
                    }
                }
                ids
            }
            None => {
                let free = self.reservation_repo.list_free_courts(facility_id, req.start, req.end).await?;
                free.into_iter().take(rule.min_courts as usize).collect()
            }
        };
        court_ids.sort();
        court_ids.dedup();

        let count = court_ids.len() as i32;
        if count < rule.min_courts && explicit {
            return Err(AppError::Validation(format!("Rule needs at least {} courts", rule.min_courts)));
        }
        if count < rule.min_courts {
            return Err(AppError::Conflict(ConflictDetail::SlotUnavailable { conflicting_court_ids: Vec::new() }));
        }
        if count > rule.max_courts {
            return Err(AppError::Validation(format!("Rule allows at most {} courts", rule.max_courts)));
        }

        let reservation = Reservation::new(NewReservationParams {
            facility_id: facility_id.to_string(),
            reservation_type: TYPE_OPEN_PLAY.to_string(),
            start: req.start,
            end: req.end,
            primary_user_id: actor.user_id.clone(),
            created_by_user_id: actor.user_id.clone(),
            pro_id: None,
            open_play_rule_id: Some(rule.id.clone()),
            notes: Some(rule.name.clone()),
            created_at: now,
        });
        let mut session = OpenPlaySession::new(&rule, reservation.id.clone(), req.start, req.end, count);
        session.created_at = now;
        let draft = ReservationDraft::new(reservation, court_ids, Vec::new());

        let created = self.repo.create_session(&draft, &session, now).await?;
        info!("Scheduled open play session {} for rule {} on {} courts", created.id, rule.id, count);
        Ok(created)
    }

    pub async fn set_session_override(&self, actor: &Actor, facility_id: &str, session_id: &str, auto_scale: Option<bool>) -> Result<OpenPlaySession, AppError> {
        require_staff(actor, facility_id)?;
        let session = self.load_session(facility_id, session_id).await?;

        let audit = AuditLogEntry::new(
            facility_id,
            &actor.user_id,
            "session_auto_scale_override",
            "open_play_session",
            &session.id,
            json!({ "before": session.auto_scale_override, "after": auto_scale }),
            self.clock.now(),
        );
        self.repo.set_session_override(&session.id, auto_scale, &audit).await
    }

    pub async fn join(&self, actor: &Actor, facility_id: &str, session_id: &str) -> Result<SessionEnrollment, AppError> {
        let session = self.load_session(facility_id, session_id).await?;
        self.ensure_open(&session)?;

        let rule = self.load_rule(facility_id, &session.rule_id).await?;
        let max_courts = if session.auto_scale_effective(&rule) { rule.max_courts } else { session.court_count };
        let capacity = max_courts as i64 * rule.max_participants_per_court as i64;

        let participants = self.reservation_repo
            .add_participant(&session.reservation_id, &actor.user_id, capacity, self.clock.now())
            .await?;
        info!("User {} joined session {} ({} of {})", actor.user_id, session.id, participants, capacity);

        Ok(SessionEnrollment { session_id: session.id, user_id: actor.user_id.clone(), participants })
    }

    pub async fn leave(&self, actor: &Actor, facility_id: &str, session_id: &str) -> Result<SessionEnrollment, AppError> {
        let session = self.load_session(facility_id, session_id).await?;
        self.ensure_open(&session)?;

        if !self.reservation_repo.remove_participant(&session.reservation_id, &actor.user_id).await? {
            return Err(AppError::NotFound("Not signed up for this session".into()));
        }
        let participants = self.reservation_repo.count_participants(&session.reservation_id).await?;

        Ok(SessionEnrollment { session_id: session.id, user_id: actor.user_id.clone(), participants })
    }

    pub async fn get_session(&self, facility_id: &str, session_id: &str) -> Result<OpenPlaySession, AppError> {
        self.load_session(facility_id, session_id).await
    }

    /// One enforcement pass over every scheduled session that has reached its cutoff.
    /// Each session is evaluated on its own; a failure is logged and counted.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<EnforcementReport, AppError> {
        let sessions = self.repo.list_upcoming_sessions(now).await?;
        let mut rules: HashMap<String, OpenPlayRule> = HashMap::new();
        let mut report = EnforcementReport::default();

        for session in sessions {
            if !rules.contains_key(&session.rule_id) {
                match self.repo.find_rule(&session.rule_id).await {
                    Ok(Some(rule)) => { rules.insert(rule.id.clone(), rule); }
                    Ok(None) => {
                        warn!("Session {} references missing rule {}", session.id, session.rule_id);
                        report.failed += 1;
                        continue;
                    }
                    Err(e) => {
                        error!("Failed to load rule {}: {}", session.rule_id, e);
                        report.failed += 1;
                        continue;
                    }
                }
            }
            let Some(rule) = rules.get(&session.rule_id) else { continue };

            if !session.is_due(rule, now) {
                continue;
            }
            report.evaluated += 1;

            let span = info_span!(
                "open_play_evaluation",
                session_id = %session.id,
                rule_id = %rule.id,
                facility_id = %session.facility_id
            );

            match self.evaluate(rule, &session, now).instrument(span).await {
                Ok(Decision::Cancel { .. }) => report.cancelled += 1,
                Ok(Decision::Scale(_)) => report.scaled += 1,
                Ok(Decision::Keep) => {}
                Err(e) => {
                    error!("Enforcement failed for session {}: {}", session.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn evaluate(&self, rule: &OpenPlayRule, session: &OpenPlaySession, now: DateTime<Utc>) -> Result<Decision, AppError> {
        let participants = self.reservation_repo.count_participants(&session.reservation_id).await?;
        let free = if session.auto_scale_effective(rule) {
            self.reservation_repo.list_free_courts(&session.facility_id, session.start_time, session.end_time).await?
        } else {
            Vec::new()
        };
        let available = session.court_count + free.len() as i32;

        let decision = decide(rule, session, participants, available);
        debug!("Session {} with {} participants: {:?}", session.id, participants, decision);

        match &decision {
            Decision::Keep => {}
            Decision::Cancel { participants, minimum } => {
                self.cancel_session(rule, session, *participants, *minimum, now).await?;
            }
            Decision::Scale(plan) => {
                self.scale_session(rule, session, participants, &free, plan, now).await?;
            }
        }

        Ok(decision)
    }

    async fn cancel_session(&self, rule: &OpenPlayRule, session: &OpenPlaySession, participants: i64, minimum: i32, now: DateTime<Utc>) -> Result<(), AppError> {
        let audit = AuditLogEntry::new(
            &session.facility_id,
            ACTOR_OPEN_PLAY,
            "session_cancelled",
            "open_play_session",
            &session.id,
            json!({ "participants": participants, "minimum": minimum, "court_count": session.court_count }),
            now,
        );
        let notification_type = if rule.is_clinic() {
            NotificationType::ClinicEnrollmentBelowMinimum
        } else {
            NotificationType::Cancelled
        };
        let notification = StaffNotification::new(
            &session.facility_id,
            notification_type,
            format!("{} on {} cancelled: {} signups, minimum {}", rule.name, session.start_time, participants, minimum),
            Some(session.id.clone()),
            now,
        );

        match self.repo.cancel_session(&session.id, &audit, &notification).await? {
            Some(released) => {
                info!("Session {} cancelled with {} of {} participants", session.id, participants, minimum);
                self.offer_released(session, &released).await;
            }
            None => debug!("Session {} was no longer scheduled", session.id),
        }
        Ok(())
    }

    async fn scale_session(
        &self,
        rule: &OpenPlayRule,
        session: &OpenPlaySession,
        participants: i64,
        free: &[String],
        plan: &ScalePlan,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let (from, to) = (plan.from, plan.to);
        let (add_court_ids, remove_court_ids) = if to > from {
            (free.iter().take((to - from) as usize).cloned().collect(), Vec::new())
        } else {
            let mut current = self.reservation_repo.court_ids(&session.reservation_id).await?;
            current.sort();
            let remove: Vec<String> = current.into_iter().rev().take((from - to) as usize).collect();
            (Vec::new(), remove)
        };

        let audit = AuditLogEntry::new(
            &session.facility_id,
            ACTOR_OPEN_PLAY,
            if to > from { "session_scaled_up" } else { "session_scaled_down" },
            "open_play_session",
            &session.id,
            json!({
                "participants": participants,
                "before": from,
                "after": to,
                "desired": plan.desired,
                "available": plan.available,
                "constrained_by_availability": plan.desired != to,
                "added": add_court_ids,
                "removed": remove_court_ids,
            }),
            now,
        );
        let notification = StaffNotification::new(
            &session.facility_id,
            if to > from { NotificationType::ScaleUp } else { NotificationType::ScaleDown },
            format!("{} on {} scaled from {} to {} courts ({} signups)", rule.name, session.start_time, from, to, participants),
            Some(session.id.clone()),
            now,
        );

        let change = ScaleChange { expected_court_count: from, add_court_ids, remove_court_ids };
        self.repo.apply_scale(&session.id, &change, &audit, &notification).await?;
        info!("Session {} scaled from {} to {} courts", session.id, from, to);

        if !change.remove_court_ids.is_empty() {
            self.offer_released(session, &change.remove_court_ids).await;
        }
        Ok(())
    }

    async fn offer_released(&self, session: &OpenPlaySession, court_ids: &[String]) {
        if let Err(e) = self.waitlist.on_slot_released(&session.facility_id, court_ids, session.start_time, session.end_time).await {
            error!("Waitlist trigger failed for session {}: {}", session.id, e);
        }
    }

    fn ensure_open(&self, session: &OpenPlaySession) -> Result<(), AppError> {
        if !session.is_scheduled() || session.start_time <= self.clock.now() {
            return Err(AppError::Conflict(ConflictDetail::EnrollmentClosed { session_id: session.id.clone() }));
        }
        Ok(())
    }

    async fn load_rule(&self, facility_id: &str, rule_id: &str) -> Result<OpenPlayRule, AppError> {
        self.repo.find_rule(rule_id).await?
            .filter(|r| r.facility_id == facility_id)
            .ok_or(AppError::NotFound("Open play rule not found".into()))
    }

    async fn load_session(&self, facility_id: &str, session_id: &str) -> Result<OpenPlaySession, AppError> {
        self.repo.find_session(session_id).await?
            .filter(|s| s.facility_id == facility_id)
            .ok_or(AppError::NotFound("Open play session not found".into()))
    }
}

fn require_staff(actor: &Actor, facility_id: &str) -> Result<(), AppError> {
    if !actor.is_staff_of(facility_id) {
        return Err(AppError::Forbidden("Staff only".into()));
    }
    Ok(())
}
