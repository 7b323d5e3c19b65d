use crate::domain::{models::cancellation::CancellationPolicyTier, ports::PolicyRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresPolicyRepo {
    pool: PgPool,
}

impl PostgresPolicyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyRepository for PostgresPolicyRepo {
    async fn list_tiers(&self, facility_id: &str) -> Result<Vec<CancellationPolicyTier>, AppError> {
        sqlx::query_as::<_, CancellationPolicyTier>("SELECT * FROM cancellation_policy_tiers WHERE facility_id = $1 ORDER BY reservation_type, min_hours_before DESC").bind(facility_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn upsert_tier(&self, tier: &CancellationPolicyTier) -> Result<CancellationPolicyTier, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        // Tiers are keyed on (facility, type, threshold); a matching row keeps its id.
        let updated = sqlx::query_as::<_, CancellationPolicyTier>(
            "UPDATE cancellation_policy_tiers SET refund_percentage = $1
             WHERE facility_id = $2 AND COALESCE(reservation_type, '') = COALESCE($3, '') AND min_hours_before = $4
             RETURNING *"
        )
            .bind(tier.refund_percentage).bind(&tier.facility_id).bind(&tier.reservation_type).bind(tier.min_hours_before)
            .fetch_optional(&mut *tx).await.map_err(AppError::Database)?;

        let saved = match updated {
            Some(t) => t,
            None => sqlx::query_as::<_, CancellationPolicyTier>(
                "INSERT INTO cancellation_policy_tiers (id, facility_id, reservation_type, min_hours_before, refund_percentage, created_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING *"
            )
                .bind(&tier.id).bind(&tier.facility_id).bind(&tier.reservation_type).bind(tier.min_hours_before).bind(tier.refund_percentage).bind(tier.created_at)
                .fetch_one(&mut *tx).await.map_err(AppError::Database)?,
        };
        tx.commit().await.map_err(AppError::Database)?;
        Ok(saved)
    }
    async fn delete_tier(&self, facility_id: &str, id: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM cancellation_policy_tiers WHERE id = $1 AND facility_id = $2").bind(id).bind(facility_id).execute(&self.pool).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Err(AppError::NotFound("Policy tier not found".into())); }
        Ok(())
    }
}
