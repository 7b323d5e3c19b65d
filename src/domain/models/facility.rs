use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use sqlx::FromRow;

pub const COURT_ACTIVE: &str = "ACTIVE";

/// Facility configuration as maintained by facility administration.
/// The booking core only reads it.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub timezone: String,
    pub open_time: String,
    pub close_time: String,
    pub max_advance_booking_days: i32,
    pub max_member_reservations: Option<i32>,
    pub min_reservation_minutes: i32,
    pub lesson_min_notice_hours: i32,
    pub cross_facility_redemption: bool,
    pub created_at: DateTime<Utc>,
}

impl Facility {
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(chrono_tz::UTC)
    }

    /// Returns true when `[start, end)` lies inside the local opening hours of a single day.
    pub fn within_operating_hours(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        let (Ok(open), Ok(close)) = (
            NaiveTime::parse_from_str(&self.open_time, "%H:%M"),
            NaiveTime::parse_from_str(&self.close_time, "%H:%M"),
        ) else {
            return true;
        };

        let tz = self.tz();
        let local_start = start.with_timezone(&tz);
        let local_end = end.with_timezone(&tz);

        local_start.date_naive() == local_end.date_naive()
            && local_start.time() >= open
            && local_end.time() <= close
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Court {
    pub id: String,
    pub facility_id: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Court {
    pub fn is_active(&self) -> bool {
        self.status == COURT_ACTIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn facility(tz: &str) -> Facility {
        Facility {
            id: "f1".into(),
            name: "Club".into(),
            timezone: tz.into(),
            open_time: "08:00".into(),
            close_time: "22:00".into(),
            max_advance_booking_days: 14,
            max_member_reservations: None,
            min_reservation_minutes: 30,
            lesson_min_notice_hours: 24,
            cross_facility_redemption: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_operating_hours_in_local_time() {
        let f = facility("Europe/Berlin");
        // 09:00-10:00 Berlin in winter is 08:00-09:00 UTC
        let start = Utc.with_ymd_and_hms(2030, 1, 15, 8, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2030, 1, 15, 9, 0, 0).unwrap();
        assert!(f.within_operating_hours(start, end));

        // 07:30 Berlin is before opening
        let early = Utc.with_ymd_and_hms(2030, 1, 15, 6, 30, 0).unwrap();
        assert!(!f.within_operating_hours(early, start));

        // 21:30-22:30 Berlin runs past closing
        let late_start = Utc.with_ymd_and_hms(2030, 1, 15, 20, 30, 0).unwrap();
        let late_end = Utc.with_ymd_and_hms(2030, 1, 15, 21, 30, 0).unwrap();
        assert!(!f.within_operating_hours(late_start, late_end));
    }
}
