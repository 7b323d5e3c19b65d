use crate::domain::{models::cancellation::CancellationPolicyTier, ports::PolicyRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqlitePolicyRepo {
    pool: SqlitePool,
}

impl SqlitePolicyRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyRepository for SqlitePolicyRepo {
    async fn list_tiers(&self, facility_id: &str) -> Result<Vec<CancellationPolicyTier>, AppError> {
        sqlx::query_as::<_, CancellationPolicyTier>("SELECT * FROM cancellation_policy_tiers WHERE facility_id = ? ORDER BY reservation_type, min_hours_before DESC").bind(facility_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn upsert_tier(&self, tier: &CancellationPolicyTier) -> Result<CancellationPolicyTier, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        // Tiers are keyed on (facility, type, threshold); a matching row keeps its id.
        let updated = sqlx::query_as::<_, CancellationPolicyTier>(
            "UPDATE cancellation_policy_tiers SET refund_percentage = ?
             WHERE facility_id = ? AND COALESCE(reservation_type, '') = COALESCE(?, '') AND min_hours_before = ?
             RETURNING *"
        )
            .bind(tier.refund_percentage).bind(&tier.facility_id).bind(&tier.reservation_type).bind(tier.min_hours_before)
            .fetch_optional(&mut *tx).await.map_err(AppError::Database)?;

        let saved = match updated {
            Some(t) => t,
            None => sqlx::query_as::<_, CancellationPolicyTier>(
                "INSERT INTO cancellation_policy_tiers (id, facility_id, reservation_type, min_hours_before, refund_percentage, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING *"
            )
                .bind(&tier.id).bind(&tier.facility_id).bind(&tier.reservation_type).bind(tier.min_hours_before).bind(tier.refund_percentage).bind(tier.created_at)
                .fetch_one(&mut *tx).await.map_err(AppError::Database)?,
        };
        tx.commit().await.map_err(AppError::Database)?;
        Ok(saved)
    }
    async fn delete_tier(&self, facility_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM cancellation_policy_tiers WHERE id = ? AND facility_id = ?").bind(id).bind(facility_id).execute(&self.pool).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Err(AppError::NotFound("Policy tier not found".into())); }
        Ok(())
    }
}
