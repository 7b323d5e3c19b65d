use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use sqlx::FromRow;

pub const KIND_OPEN_PLAY: &str = "OPEN_PLAY";
pub const KIND_CLINIC: &str = "CLINIC";

pub const SESSION_SCHEDULED: &str = "SCHEDULED";
pub const SESSION_CANCELLED: &str = "CANCELLED";

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct OpenPlayRule {
    pub id: String,
    pub facility_id: String,
    pub name: String,
    pub kind: String,
    pub min_participants: i32,
    pub max_participants_per_court: i32,
    pub cancellation_cutoff_minutes: i32,
    pub auto_scale_enabled: bool,
    pub min_courts: i32,
    pub max_courts: i32,
    pub created_at: DateTime<Utc>,
}

pub struct NewOpenPlayRuleParams {
    pub facility_id: String,
    pub name: String,
    pub kind: String,
    pub min_participants: i32,
    pub max_participants_per_court: i32,
    pub cancellation_cutoff_minutes: i32,
    pub auto_scale_enabled: bool,
    pub min_courts: i32,
    pub max_courts: i32,
}

impl OpenPlayRule {
    pub fn new(params: NewOpenPlayRuleParams) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id: params.facility_id,
            name: params.name,
            kind: params.kind,
            min_participants: params.min_participants,
            max_participants_per_court: params.max_participants_per_court,
            cancellation_cutoff_minutes: params.cancellation_cutoff_minutes,
            auto_scale_enabled: params.auto_scale_enabled,
            min_courts: params.min_courts,
            max_courts: params.max_courts,
            created_at: Utc::now(),
        }
    }

    /// Checks the structural invariants of a rule. Returns the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind != KIND_OPEN_PLAY && self.kind != KIND_CLINIC {
            return Err(format!("Unknown open play kind {}", self.kind));
        }
        if self.min_participants < 1 || self.max_participants_per_court < 1 {
            return Err("Participant limits must be at least 1".into());
        }
        if self.min_courts < 1 {
            return Err("min_courts must be at least 1".into());
        }
        if self.min_courts > self.max_courts {
            return Err("min_courts must not exceed max_courts".into());
        }
        if self.cancellation_cutoff_minutes < 0 {
            return Err("cancellation_cutoff_minutes must not be negative".into());
        }
        if self.min_participants > self.max_participants_per_court * self.min_courts {
            return Err("min_participants cannot exceed max_participants_per_court * min_courts".into());
        }
        Ok(())
    }

    pub fn is_clinic(&self) -> bool {
        self.kind == KIND_CLINIC
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct OpenPlaySession {
    pub id: String,
    pub rule_id: String,
    pub facility_id: String,
    pub reservation_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub court_count: i32,
    pub status: String,
    pub auto_scale_override: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl OpenPlaySession {
    pub fn new(rule: &OpenPlayRule, reservation_id: String, start: DateTime<Utc>, end: DateTime<Utc>, court_count: i32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            rule_id: rule.id.clone(),
            facility_id: rule.facility_id.clone(),
            reservation_id,
            start_time: start.trunc_subsecs(0),
            end_time: end.trunc_subsecs(0),
            court_count,
            status: SESSION_SCHEDULED.to_string(),
            auto_scale_override: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.status == SESSION_SCHEDULED
    }

    pub fn cutoff_at(&self, rule: &OpenPlayRule) -> DateTime<Utc> {
        self.start_time - Duration::minutes(rule.cancellation_cutoff_minutes as i64)
    }

    /// A session is due for go/no-go evaluation once its cutoff has passed and it has not started.
    pub fn is_due(&self, rule: &OpenPlayRule, now: DateTime<Utc>) -> bool {
        self.is_scheduled() && self.cutoff_at(rule) <= now && now < self.start_time
    }

    /// Session override wins over the rule flag.
    pub fn auto_scale_effective(&self, rule: &OpenPlayRule) -> bool {
        self.auto_scale_override.unwrap_or(rule.auto_scale_enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> OpenPlayRule {
        OpenPlayRule::new(NewOpenPlayRuleParams {
            facility_id: "f1".into(),
            name: "Drop-in".into(),
            kind: KIND_OPEN_PLAY.into(),
            min_participants: 4,
            max_participants_per_court: 8,
            cancellation_cutoff_minutes: 120,
            auto_scale_enabled: true,
            min_courts: 1,
            max_courts: 4,
        })
    }

    #[test]
    fn test_rule_invariants() {
        assert!(rule().validate().is_ok());

        let mut inverted = rule();
        inverted.min_courts = 5;
        assert!(inverted.validate().is_err());

        let mut too_many = rule();
        too_many.min_participants = 9;
        assert!(too_many.validate().is_err());

        let mut bad_kind = rule();
        bad_kind.kind = "LEAGUE".into();
        assert!(bad_kind.validate().is_err());
    }

    #[test]
    fn test_session_due_window() {
        let r = rule();
        let start = Utc::now() + Duration::hours(5);
        let session = OpenPlaySession::new(&r, "res".into(), start, start + Duration::hours(2), 1);

        assert!(!session.is_due(&r, session.start_time - Duration::hours(3)));
        assert!(session.is_due(&r, session.start_time - Duration::hours(2)));
        assert!(session.is_due(&r, session.start_time - Duration::minutes(1)));
        assert!(!session.is_due(&r, session.start_time));

        let mut cancelled = session.clone();
        cancelled.status = SESSION_CANCELLED.into();
        assert!(!cancelled.is_due(&r, session.start_time - Duration::minutes(1)));
    }

    #[test]
    fn test_override_beats_rule_flag() {
        let r = rule();
        let start = Utc::now() + Duration::hours(5);
        let mut session = OpenPlaySession::new(&r, "res".into(), start, start + Duration::hours(1), 1);
        assert!(session.auto_scale_effective(&r));
        session.auto_scale_override = Some(false);
        assert!(!session.auto_scale_effective(&r));
    }
}
