use std::sync::Arc;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use crate::domain::models::auth::Actor;
use crate::domain::models::facility::Facility;
use crate::domain::models::package::{Package, PackageDetail, Redemption, KIND_LESSON, KIND_VISIT};
use crate::domain::ports::PackageRepository;
use crate::domain::services::clock::Clock;
use crate::error::{AppError, ConflictDetail};

pub struct IssuePackage {
    pub user_id: String,
    pub kind: String,
    pub count: i32,
    pub expires_at: DateTime<Utc>,
}

/// Checks that `package` may pay for a booking by `user_id` at `facility`.
/// Lesson packages pay for lessons only, visit packs for everything else.
pub fn check_eligibility(package: &Package, user_id: &str, facility: &Facility, is_lesson: bool, now: DateTime<Utc>) -> Result<(), AppError> {
    if package.user_id != user_id {
        return Err(AppError::Forbidden("Package belongs to another member".into()));
    }
    let expected_kind = if is_lesson { KIND_LESSON } else { KIND_VISIT };
    if package.kind != expected_kind {
        return Err(AppError::Validation(format!("A {} package cannot pay for this reservation", package.kind)));
    }
    if package.facility_id != facility.id && !facility.cross_facility_redemption {
        return Err(AppError::Validation("Package is not valid at this facility".into()));
    }
    if !package.is_redeemable(now) {
        return Err(AppError::Conflict(ConflictDetail::PackageUnavailable { package_id: package.id.clone() }));
    }
    Ok(())
}

pub struct RedemptionLedger {
    repo: Arc<dyn PackageRepository>,
    clock: Arc<dyn Clock>,
}

impl RedemptionLedger {
    pub fn new(repo: Arc<dyn PackageRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    pub async fn issue(&self, actor: &Actor, facility_id: &str, req: IssuePackage) -> Result<Package, AppError> {
        if !actor.is_staff_of(facility_id) {
            return Err(AppError::Forbidden("Only facility staff can issue packages".into()));
        }
        if req.kind != KIND_VISIT && req.kind != KIND_LESSON {
            return Err(AppError::Validation(format!("Unknown package kind {}", req.kind)));
        }
        if req.count < 1 {
            return Err(AppError::Validation("A package holds at least one unit".into()));
        }
        let now = self.clock.now();
        if req.expires_at <= now {
            return Err(AppError::Validation("expires_at must be in the future".into()));
        }

        let package = Package::new(req.user_id, facility_id.to_string(), req.kind, req.count, req.expires_at, now);
        let created = self.repo.create(&package).await?;
        info!("Issued {} package {} with {} units", created.kind, created.id, created.original_count);
        Ok(created)
    }

    pub async fn get(&self, actor: &Actor, facility_id: &str, package_id: &str) -> Result<PackageDetail, AppError> {
        let package = self.find_visible(actor, facility_id, package_id).await?;
        let redemptions = self.repo.list_redemptions(&package.id).await?;
        Ok(PackageDetail { package, redemptions })
    }

    /// Redeems one unit outside any reservation, e.g. a walk-in visit.
    pub async fn redeem_visit(&self, actor: &Actor, facility: &Facility, package_id: &str) -> Result<Redemption, AppError> {
        let package = self.repo.find_by_id(package_id).await?
            .ok_or(AppError::NotFound("Package not found".into()))?;

        if package.user_id != actor.user_id && !actor.is_staff_of(&facility.id) {
            return Err(AppError::Forbidden("Package belongs to another member".into()));
        }
        check_eligibility(&package, &package.user_id, facility, false, self.clock.now())?;

        self.redeem(package_id, &facility.id, None).await
    }

    pub async fn redeem(&self, package_id: &str, facility_id: &str, reservation_id: Option<&str>) -> Result<Redemption, AppError> {
        let redemption = self.repo.redeem(package_id, facility_id, reservation_id, self.clock.now()).await?;
        info!("Redeemed one unit of package {}", package_id);
        Ok(redemption)
    }

    /// Returns units consumed by `reservation_id`. Redemptions whose package expired or is
    /// already full are left alone.
    pub async fn reverse(&self, reservation_id: &str) -> Result<u32, AppError> {
        let reversed = self.repo.reverse(reservation_id, self.clock.now()).await
            .map_err(|e| AppError::InternalWithMsg(format!("Failed to reverse redemptions for {}: {}", reservation_id, e)))?;
        info!("Reversed {} redemptions for reservation {}", reversed, reservation_id);
        Ok(reversed)
    }

    pub async fn expire_packages(&self) -> Result<u64, AppError> {
        let expired = self.repo.expire_packages(self.clock.now()).await?;
        if expired > 0 {
            info!("Marked {} packages as expired", expired);
        }
        Ok(expired)
    }

    pub async fn find_redeemable(&self, package_id: &str) -> Result<Package, AppError> {
        self.repo.find_by_id(package_id).await?
            .ok_or_else(|| {
                warn!("Package {} referenced by a booking does not exist", package_id);
                AppError::NotFound("Package not found".into())
            })
    }

    async fn find_visible(&self, actor: &Actor, facility_id: &str, package_id: &str) -> Result<Package, AppError> {
        let package = self.repo.find_by_id(package_id).await?
            .ok_or(AppError::NotFound("Package not found".into()))?;
        if package.user_id != actor.user_id && !actor.is_staff_of(facility_id) {
            return Err(AppError::NotFound("Package not found".into()));
        }
        Ok(package)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn facility(id: &str, cross: bool) -> Facility {
        Facility {
            id: id.into(),
            name: "Club".into(),
            timezone: "UTC".into(),
            open_time: "06:00".into(),
            close_time: "23:00".into(),
            max_advance_booking_days: 14,
            max_member_reservations: None,
            min_reservation_minutes: 30,
            lesson_min_notice_hours: 24,
            cross_facility_redemption: cross,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_eligibility_rules() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let pack = Package::new("u1".into(), "f1".into(), KIND_VISIT.into(), 3, now + Duration::days(30), now);

        assert!(check_eligibility(&pack, "u1", &facility("f1", false), false, now).is_ok());
        assert!(matches!(check_eligibility(&pack, "u2", &facility("f1", false), false, now), Err(AppError::Forbidden(_))));
        assert!(matches!(check_eligibility(&pack, "u1", &facility("f1", false), true, now), Err(AppError::Validation(_))));
        assert!(matches!(check_eligibility(&pack, "u1", &facility("f2", false), false, now), Err(AppError::Validation(_))));
        assert!(check_eligibility(&pack, "u1", &facility("f2", true), false, now).is_ok());

        let later = now + Duration::days(31);
        assert!(matches!(
            check_eligibility(&pack, "u1", &facility("f1", false), false, later),
            Err(AppError::Conflict(ConflictDetail::PackageUnavailable { .. }))
        ));
    }
}
