use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, info_span, Instrument};
use crate::domain::models::audit::{AuditLogEntry, ACTOR_WAITLIST};
use crate::domain::models::auth::Actor;
use crate::domain::models::waitlist::{
    NewWaitlistEntryParams, OfferExpiry, WaitlistConfig, WaitlistEntry, WaitlistOffer, MODE_BROADCAST, MODE_SEQUENTIAL,
};
use crate::domain::ports::{FacilityRepository, WaitlistRepository, WaitlistSlot};
use crate::domain::services::clock::Clock;
use crate::error::AppError;

pub struct JoinWaitlist {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub court_id: Option<String>,
    pub user_id: Option<String>,
}

pub struct ConfigureWaitlist {
    pub enabled: bool,
    pub mode: String,
    pub offer_expiry_minutes: i32,
    pub notification_window_hours: Option<i32>,
}

#[derive(Debug, Default, Serialize, Clone, PartialEq)]
pub struct SweepReport {
    pub expired: u32,
    pub advanced: u32,
    pub failed: u32,
}

/// Pairs each freed court with the lowest-position entry that can take it. Entries are
/// expected in position order; each entry gets at most one court.
pub fn assign_courts<'a>(entries: &'a [WaitlistEntry], court_ids: &'a [String]) -> Vec<(&'a WaitlistEntry, &'a str)> {
    let mut taken = vec![false; entries.len()];
    let mut assigned = Vec::new();
    for court in court_ids {
        let next = entries.iter().enumerate().find(|(i, e)| {
            !taken[*i] && e.target_court_id.as_deref().is_none_or(|t| t == court.as_str())
        });
        if let Some((i, entry)) = next {
            taken[i] = true;
            assigned.push((entry, court.as_str()));
        }
    }
    assigned
}

/// Sequences offers for freed court time to the members waiting for it.
pub struct WaitlistService {
    repo: Arc<dyn WaitlistRepository>,
    facility_repo: Arc<dyn FacilityRepository>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
}

impl WaitlistService {
    pub fn new(repo: Arc<dyn WaitlistRepository>, facility_repo: Arc<dyn FacilityRepository>, clock: Arc<dyn Clock>, batch_size: i64) -> Self {
        Self { repo, facility_repo, clock, batch_size }
    }

    pub async fn config(&self, facility_id: &str) -> Result<WaitlistConfig, AppError> {
        Ok(self.repo.get_config(facility_id).await?
            .unwrap_or_else(|| WaitlistConfig::default_for(facility_id)))
    }

    pub async fn configure(&self, actor: &Actor, facility_id: &str, req: ConfigureWaitlist) -> Result<WaitlistConfig, AppError> {
        if !actor.is_staff_of(facility_id) {
            return Err(AppError::Forbidden("Only facility staff can configure the waitlist".into()));
        }
        if req.mode != MODE_BROADCAST && req.mode != MODE_SEQUENTIAL {
            return Err(AppError::Validation(format!("Unknown waitlist mode {}", req.mode)));
        }
        if req.offer_expiry_minutes < 1 {
            return Err(AppError::Validation("offer_expiry_minutes must be at least 1".into()));
        }
        if req.notification_window_hours.is_some_and(|h| h < 0) {
            return Err(AppError::Validation("notification_window_hours must not be negative".into()));
        }

        let config = WaitlistConfig {
            facility_id: facility_id.to_string(),
            enabled: req.enabled,
            mode: req.mode,
            offer_expiry_minutes: req.offer_expiry_minutes,
            notification_window_hours: req.notification_window_hours,
            updated_at: self.clock.now(),
        };
        self.repo.upsert_config(&config).await
    }

    pub async fn join(&self, actor: &Actor, facility_id: &str, req: JoinWaitlist) -> Result<WaitlistEntry, AppError> {
        let facility = self.facility_repo.find_by_id(facility_id).await?
            .ok_or(AppError::NotFound("Facility not found".into()))?;

        let config = self.config(facility_id).await?;
        if !config.enabled {
            return Err(AppError::Forbidden("Waitlist is disabled for this facility".into()));
        }

        let now = self.clock.now();
        if req.start >= req.end {
            return Err(AppError::Validation("start must be before end".into()));
        }
        if req.start <= now {
            return Err(AppError::Validation("Cannot join the waitlist for a slot in the past".into()));
        }

        let user_id = match req.user_id {
            Some(uid) if uid != actor.user_id => {
                if !actor.is_staff_of(facility_id) {
                    return Err(AppError::Forbidden("Members can only join the waitlist for themselves".into()));
                }
                uid
            }
            _ => actor.user_id.clone(),
        };

        if let Some(court_id) = &req.court_id {
            let courts = self.facility_repo.list_courts(facility_id).await?;
            if !courts.iter().any(|c| &c.id == court_id) {
                return Err(AppError::NotFound(format!("Court {} not found", court_id)));
            }
        }

        let entry = WaitlistEntry::new(NewWaitlistEntryParams {
            facility_id: facility_id.to_string(),
            target_date: req.start.with_timezone(&facility.tz()).date_naive(),
            target_start: req.start,
            target_end: req.end,
            target_court_id: req.court_id,
            user_id,
            created_at: now,
        });

        let created = self.repo.join(&entry).await?;
        info!("User {} joined waitlist at position {}", created.user_id, created.position);
        Ok(created)
    }

    pub async fn leave(&self, actor: &Actor, facility_id: &str, entry_id: &str) -> Result<(), AppError> {
        let entry = self.repo.find_entry(entry_id).await?
            .filter(|e| e.facility_id == facility_id)
            .ok_or(AppError::NotFound("Waitlist entry not found".into()))?;

        if entry.user_id != actor.user_id && !actor.is_staff_of(facility_id) {
            return Err(AppError::Forbidden("Cannot remove another member's waitlist entry".into()));
        }

        self.repo.delete_entry(&entry.id).await
    }

    /// Offers freed court time to matching waitlist entries. Returns the offers created.
    pub async fn on_slot_released(
        &self,
        facility_id: &str,
        court_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaitlistOffer>, AppError> {
        if court_ids.is_empty() {
            return Ok(Vec::new());
        }

        let config = self.config(facility_id).await?;
        if !config.enabled {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        if start <= now {
            return Ok(Vec::new());
        }
        if let Some(window) = config.notification_window_hours
            && start > now + Duration::hours(window as i64) {
            debug!("Slot {} is outside the {}h notification window", start, window);
            return Ok(Vec::new());
        }

        let slot = WaitlistSlot { facility_id: facility_id.to_string(), start, end };
        let entries = self.repo.list_matching_entries(&slot, court_ids).await?;
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let expires_at = now + Duration::minutes(config.offer_expiry_minutes as i64);
        let offers: Vec<WaitlistOffer> = if config.is_sequential() {
            assign_courts(&entries, court_ids)
                .into_iter()
                .map(|(entry, court)| WaitlistOffer::new(entry.id.clone(), Some(court.to_string()), now, expires_at))
                .collect()
        } else {
            // Broadcast offers only name a court when the member asked for one
            entries.iter()
                .map(|e| WaitlistOffer::new(e.id.clone(), e.target_court_id.clone(), now, expires_at))
                .collect()
        };
        if offers.is_empty() {
            return Ok(Vec::new());
        }

        let audit = AuditLogEntry::new(
            facility_id,
            ACTOR_WAITLIST,
            "offers_created",
            "waitlist_entry",
            &offers[0].entry_id,
            json!({
                "mode": config.mode,
                "start": start,
                "end": end,
                "court_ids": court_ids,
                "entry_ids": offers.iter().map(|o| o.entry_id.clone()).collect::<Vec<_>>(),
                "expires_at": expires_at,
            }),
            now,
        );

        let created = self.repo.create_offers(&slot, &offers, config.is_sequential(), &audit).await?;
        info!("Created {} waitlist offers for {} - {}", created.len(), start, end);
        Ok(created)
    }

    /// Expires offers past their deadline, one transaction each. In sequential mode the
    /// slot moves on to the next position in the same transaction.
    pub async fn sweep_expired_offers(&self) -> Result<SweepReport, AppError> {
        let now = self.clock.now();
        let offers = self.repo.list_expired_offers(now, self.batch_size).await?;
        let mut report = SweepReport::default();

        for offer in offers {
            let span = info_span!("waitlist_offer_expiry", offer_id = %offer.id, entry_id = %offer.entry_id);
            match self.expire_one(&offer, now).instrument(span).await {
                Ok(Some(outcome)) => {
                    report.expired += 1;
                    if outcome.next.is_some() {
                        report.advanced += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("Failed to expire waitlist offer {}: {}", offer.id, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn expire_one(&self, offer: &WaitlistOffer, now: DateTime<Utc>) -> Result<Option<OfferExpiry>, AppError> {
        let next_expires_at = match self.repo.find_entry(&offer.entry_id).await? {
            Some(entry) => {
                let config = self.config(&entry.facility_id).await?;
                (config.enabled && config.is_sequential())
                    .then(|| now + Duration::minutes(config.offer_expiry_minutes as i64))
            }
            None => None,
        };

        let outcome = self.repo.expire_offer(&offer.id, now, next_expires_at).await?;
        if let Some(o) = &outcome {
            match &o.next {
                Some(next) => info!("Offer expired, slot offered to entry {}", next.entry_id),
                None => info!("Offer expired, no one left to advance to"),
            }
        }
        Ok(outcome)
    }

    /// Removes entries whose slot is in the past, regardless of status.
    pub async fn purge_past_entries(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let ids = self.repo.list_past_entry_ids(now, self.batch_size).await?;
        let mut purged = 0;
        for id in ids {
            match self.repo.delete_entry(&id).await {
                Ok(()) => purged += 1,
                Err(e) => error!("Failed to purge waitlist entry {}: {}", id, e),
            }
        }
        if purged > 0 {
            info!("Purged {} past waitlist entries", purged);
        }
        Ok(purged)
    }

    pub async fn find_offer(&self, offer_id: &str) -> Result<Option<WaitlistOffer>, AppError> {
        self.repo.find_offer(offer_id).await
    }

    pub async fn find_entry(&self, entry_id: &str) -> Result<Option<WaitlistEntry>, AppError> {
        self.repo.find_entry(entry_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(user: &str, position: i32, court: Option<&str>) -> WaitlistEntry {
        let start = Utc.with_ymd_and_hms(2030, 6, 4, 10, 0, 0).unwrap();
        let mut e = WaitlistEntry::new(NewWaitlistEntryParams {
            facility_id: "club".into(),
            target_date: start.date_naive(),
            target_start: start,
            target_end: start + Duration::hours(1),
            target_court_id: court.map(String::from),
            user_id: user.into(),
            created_at: start,
        });
        e.position = position;
        e
    }

    fn courts(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_each_freed_court_goes_to_the_next_position() {
        let entries = vec![entry("alice", 1, None), entry("bob", 2, None), entry("carol", 3, None)];
        let freed = courts(&["c1", "c2"]);
        let assigned: Vec<(&str, &str)> = assign_courts(&entries, &freed)
            .into_iter()
            .map(|(e, c)| (e.user_id.as_str(), c))
            .collect();
        assert_eq!(assigned, vec![("alice", "c1"), ("bob", "c2")]);
    }

    #[test]
    fn test_court_preference_is_respected() {
        let entries = vec![entry("alice", 1, Some("c2")), entry("bob", 2, None)];
        let freed = courts(&["c1", "c2"]);
        let assigned: Vec<(&str, &str)> = assign_courts(&entries, &freed)
            .into_iter()
            .map(|(e, c)| (e.user_id.as_str(), c))
            .collect();
        assert_eq!(assigned, vec![("bob", "c1"), ("alice", "c2")]);
    }

    #[test]
    fn test_courts_without_a_taker_stay_unassigned() {
        let entries = vec![entry("alice", 1, Some("c3"))];
        assert!(assign_courts(&entries, &courts(&["c1", "c2"])).is_empty());
        assert!(assign_courts(&[], &courts(&["c1"])).is_empty());
    }
}
