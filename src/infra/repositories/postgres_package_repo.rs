use crate::domain::{models::package::{Package, Redemption}, ports::PackageRepository};
use crate::error::AppError;
use crate::infra::repositories::postgres_tx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

pub struct PostgresPackageRepo {
    pool: PgPool,
}

impl PostgresPackageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PackageRepository for PostgresPackageRepo {
    async fn create(&self, package: &Package) -> Result<Package, AppError> {
        sqlx::query_as::<_, Package>(
            "INSERT INTO packages (id, user_id, facility_id, kind, original_count, remaining, expires_at, status, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING *"
        )
            .bind(&package.id).bind(&package.user_id).bind(&package.facility_id).bind(&package.kind)
            .bind(package.original_count).bind(package.remaining).bind(package.expires_at).bind(&package.status).bind(package.created_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }
    async fn find_by_id(&self, id: &str) -> Result<Option<Package>, AppError> {
        sqlx::query_as::<_, Package>("SELECT * FROM packages WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn redeem(&self, package_id: &str, facility_id: &str, reservation_id: Option<&str>, now: DateTime<Utc>) -> Result<Redemption, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let redemption = postgres_tx::redeem(&mut tx, package_id, facility_id, reservation_id, now).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(redemption)
    }
    async fn reverse(&self, reservation_id: &str, now: DateTime<Utc>) -> Result<u32, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let reversed = postgres_tx::reverse(&mut tx, reservation_id, now).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(reversed)
    }
    async fn list_redemptions(&self, package_id: &str) -> Result<Vec<Redemption>, AppError> {
        sqlx::query_as::<_, Redemption>("SELECT * FROM redemptions WHERE package_id = $1 ORDER BY redeemed_at").bind(package_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn expire_packages(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("UPDATE packages SET status = 'EXPIRED' WHERE status != 'EXPIRED' AND expires_at <= $1").bind(now).execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }
}
