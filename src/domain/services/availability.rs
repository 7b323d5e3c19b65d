use std::collections::BTreeSet;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use crate::domain::models::facility::Court;
use crate::domain::models::reservation::CourtBooking;
use crate::domain::ports::ReservationRepository;
use crate::error::AppError;

/// Half-open interval overlap: touching windows do not conflict.
pub fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && a_end > b_start
}

/// Returns the sorted, deduplicated ids of requested courts that already carry an
/// overlapping active booking. Bookings of `exclude` never count.
pub fn find_conflicts(
    bookings: &[CourtBooking],
    court_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<&str>,
) -> Vec<String> {
    let requested: BTreeSet<&str> = court_ids.iter().map(String::as_str).collect();

    let conflicting: BTreeSet<&str> = bookings.iter()
        .filter(|b| exclude != Some(b.reservation_id.as_str()))
        .filter(|b| requested.contains(b.court_id.as_str()))
        .filter(|b| overlaps(b.start_time, b.end_time, start, end))
        .map(|b| b.court_id.as_str())
        .collect();

    conflicting.into_iter().map(str::to_string).collect()
}

/// Active courts with no booking overlapping `[start, end)`, sorted by id.
pub fn free_courts(courts: &[Court], bookings: &[CourtBooking], start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<String> {
    let busy: BTreeSet<&str> = bookings.iter()
        .filter(|b| overlaps(b.start_time, b.end_time, start, end))
        .map(|b| b.court_id.as_str())
        .collect();

    let mut free: Vec<String> = courts.iter()
        .filter(|c| c.is_active() && !busy.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect();
    free.sort();
    free
}

pub struct AvailabilityEngine {
    reservation_repo: Arc<dyn ReservationRepository>,
}

impl AvailabilityEngine {
    pub fn new(reservation_repo: Arc<dyn ReservationRepository>) -> Self {
        Self { reservation_repo }
    }

    /// Read-only check. Returns the conflicting court ids; empty means the slot is free.
    pub async fn check_available(
        &self,
        facility_id: &str,
        court_ids: &[String],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_reservation_id: Option<&str>,
    ) -> Result<Vec<String>, AppError> {
        if start >= end {
            return Err(AppError::Validation("start must be before end".into()));
        }
        if court_ids.is_empty() {
            return Ok(Vec::new());
        }

        let bookings = self.reservation_repo.list_court_bookings(facility_id, court_ids, start, end).await?;
        Ok(find_conflicts(&bookings, court_ids, start, end, exclude_reservation_id))
    }

    /// Active courts with no booking overlapping the window, sorted by id.
    pub async fn free_courts(&self, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        if start >= end {
            return Err(AppError::Validation("start must be before end".into()));
        }
        self.reservation_repo.list_free_courts(facility_id, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, hour, minute, 0).unwrap()
    }

    fn booking(reservation: &str, court: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> CourtBooking {
        CourtBooking {
            reservation_id: reservation.into(),
            court_id: court.into(),
            start_time: start,
            end_time: end,
        }
    }

    fn court(id: &str, status: &str) -> Court {
        Court {
            id: id.into(),
            facility_id: "f1".into(),
            name: id.to_uppercase(),
            status: status.into(),
            created_at: at(0, 0),
        }
    }

    #[test]
    fn test_touching_windows_do_not_conflict() {
        let existing = vec![booking("r1", "c1", at(10, 0), at(11, 0))];
        let courts = vec!["c1".to_string()];

        assert!(find_conflicts(&existing, &courts, at(11, 0), at(12, 0), None).is_empty());
        assert!(find_conflicts(&existing, &courts, at(9, 0), at(10, 0), None).is_empty());
        assert_eq!(find_conflicts(&existing, &courts, at(10, 59), at(12, 0), None), vec!["c1"]);
    }

    #[test]
    fn test_conflicts_are_sorted_and_limited_to_requested_courts() {
        let existing = vec![
            booking("r1", "c3", at(10, 0), at(12, 0)),
            booking("r2", "c1", at(9, 0), at(10, 30)),
            booking("r3", "c1", at(11, 0), at(11, 30)),
            booking("r4", "c9", at(10, 0), at(12, 0)),
        ];
        let requested = vec!["c3".to_string(), "c1".to_string(), "c2".to_string()];

        let conflicts = find_conflicts(&existing, &requested, at(10, 0), at(11, 15), None);
        assert_eq!(conflicts, vec!["c1", "c3"]);
    }

    #[test]
    fn test_excluded_reservation_does_not_conflict_with_itself() {
        let existing = vec![booking("r1", "c1", at(10, 0), at(11, 0))];
        let courts = vec!["c1".to_string()];

        assert!(find_conflicts(&existing, &courts, at(10, 0), at(11, 0), Some("r1")).is_empty());
        assert_eq!(find_conflicts(&existing, &courts, at(10, 0), at(11, 0), Some("r2")), vec!["c1"]);
    }

    #[test]
    fn test_free_courts_skip_busy_and_inactive() {
        let courts = vec![court("c2", "ACTIVE"), court("c1", "ACTIVE"), court("c3", "MAINTENANCE"), court("c4", "ACTIVE")];
        let existing = vec![booking("r1", "c4", at(10, 0), at(10, 0) + Duration::hours(2))];

        assert_eq!(free_courts(&courts, &existing, at(11, 0), at(12, 0)), vec!["c1", "c2"]);
        assert_eq!(free_courts(&courts, &existing, at(12, 0), at(13, 0)), vec!["c1", "c2", "c4"]);
    }
}
