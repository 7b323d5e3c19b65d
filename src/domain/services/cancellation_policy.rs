use std::sync::Arc;
use chrono::{DateTime, Duration, Utc};
use crate::domain::models::cancellation::{CancellationPolicyTier, PenaltyQuote};
use crate::domain::ports::PolicyRepository;
use crate::error::AppError;

/// How long a penalty quote may be confirmed before it must be recalculated.
pub const CONFIRMATION_WINDOW_MINUTES: i64 = 10;

/// Picks the refund for a cancellation `hours_until_start` ahead of the reservation.
///
/// Type-specific tiers are searched first (highest threshold first), then type-agnostic
/// tiers. No matching tier means a full refund. The result is always within 0..=100.
pub fn resolve_refund(tiers: &[CancellationPolicyTier], reservation_type: Option<&str>, hours_until_start: f64) -> i32 {
    let specific = reservation_type.and_then(|rt| {
        best_tier(tiers.iter().filter(|t| t.reservation_type.as_deref() == Some(rt)), hours_until_start)
    });
    let refund = specific
        .or_else(|| best_tier(tiers.iter().filter(|t| t.reservation_type.is_none()), hours_until_start))
        .unwrap_or(100);

    refund.clamp(0, 100)
}

fn best_tier<'a>(candidates: impl Iterator<Item = &'a CancellationPolicyTier>, hours_until_start: f64) -> Option<i32> {
    let mut candidates: Vec<&CancellationPolicyTier> = candidates.collect();
    candidates.sort_by(|a, b| b.min_hours_before.cmp(&a.min_hours_before));
    candidates.into_iter()
        .find(|t| t.min_hours_before as f64 <= hours_until_start)
        .map(|t| t.refund_percentage)
}

pub fn validate_tier(tier: &CancellationPolicyTier) -> Result<(), AppError> {
    if !(0..=100).contains(&tier.refund_percentage) {
        return Err(AppError::Validation("refund_percentage must be between 0 and 100".into()));
    }
    if tier.min_hours_before < 0 {
        return Err(AppError::Validation("min_hours_before must not be negative".into()));
    }
    Ok(())
}

pub struct CancellationPolicyResolver {
    repo: Arc<dyn PolicyRepository>,
}

impl CancellationPolicyResolver {
    pub fn new(repo: Arc<dyn PolicyRepository>) -> Self {
        Self { repo }
    }

    pub async fn resolve(&self, facility_id: &str, reservation_type: Option<&str>, hours_until_start: f64) -> Result<i32, AppError> {
        let tiers = self.repo.list_tiers(facility_id).await?;
        Ok(resolve_refund(&tiers, reservation_type, hours_until_start))
    }

    /// Builds the quote a member must confirm before a partially refunded cancellation.
    pub async fn quote(
        &self,
        facility_id: &str,
        reservation_id: &str,
        reservation_type: &str,
        hours_until_start: f64,
        now: DateTime<Utc>,
    ) -> Result<PenaltyQuote, AppError> {
        let refund = self.resolve(facility_id, Some(reservation_type), hours_until_start).await?;
        Ok(PenaltyQuote {
            reservation_id: reservation_id.to_string(),
            refund_percentage: refund,
            penalty_percentage: 100 - refund,
            hours_before_start: hours_until_start,
            calculated_at: now,
            expires_at: now + Duration::minutes(CONFIRMATION_WINDOW_MINUTES),
        })
    }

    pub async fn list_tiers(&self, facility_id: &str) -> Result<Vec<CancellationPolicyTier>, AppError> {
        self.repo.list_tiers(facility_id).await
    }

    pub async fn upsert_tier(&self, tier: &CancellationPolicyTier) -> Result<CancellationPolicyTier, AppError> {
        validate_tier(tier)?;
        self.repo.upsert_tier(tier).await
    }

    pub async fn delete_tier(&self, facility_id: &str, tier_id: &str) -> Result<(), AppError> {
        self.repo.delete_tier(facility_id, tier_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(reservation_type: Option<&str>, hours: i32, refund: i32) -> CancellationPolicyTier {
        CancellationPolicyTier::new("f1".into(), reservation_type.map(str::to_string), hours, refund)
    }

    #[test]
    fn test_no_tiers_means_full_refund() {
        assert_eq!(resolve_refund(&[], Some("COURT"), 1.0), 100);
        assert_eq!(resolve_refund(&[], None, -3.0), 100);
    }

    #[test]
    fn test_type_specific_tier_beats_generic() {
        let tiers = vec![tier(None, 24, 80), tier(Some("PRO_SESSION"), 24, 50)];
        assert_eq!(resolve_refund(&tiers, Some("PRO_SESSION"), 30.0), 50);
        assert_eq!(resolve_refund(&tiers, Some("COURT"), 30.0), 80);
    }

    #[test]
    fn test_highest_matching_threshold_wins() {
        let tiers = vec![tier(None, 0, 0), tier(None, 48, 100), tier(None, 24, 50)];
        assert_eq!(resolve_refund(&tiers, None, 72.0), 100);
        assert_eq!(resolve_refund(&tiers, None, 30.0), 50);
        assert_eq!(resolve_refund(&tiers, None, 2.0), 0);
    }

    #[test]
    fn test_falls_back_to_generic_when_specific_tiers_do_not_reach() {
        let tiers = vec![tier(Some("LESSON"), 48, 90), tier(None, 12, 40)];
        assert_eq!(resolve_refund(&tiers, Some("LESSON"), 20.0), 40);
        // Below every threshold
        assert_eq!(resolve_refund(&tiers, Some("LESSON"), 2.0), 100);
    }

    #[test]
    fn test_refund_is_clamped() {
        let tiers = vec![tier(None, 0, 140), tier(Some("COURT"), 0, -20)];
        assert_eq!(resolve_refund(&tiers, None, 5.0), 100);
        assert_eq!(resolve_refund(&tiers, Some("COURT"), 5.0), 0);
    }

    #[test]
    fn test_tier_validation() {
        assert!(validate_tier(&tier(None, 24, 50)).is_ok());
        assert!(validate_tier(&tier(None, 24, 101)).is_err());
        assert!(validate_tier(&tier(None, -1, 50)).is_err());
    }
}
