use crate::domain::{models::audit::{AuditLogEntry, StaffNotification}, ports::AuditRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresAuditRepo {
    pool: PgPool,
}

impl PostgresAuditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepo {
    async fn list_audit(&self, facility_id: &str, limit: i64) -> Result<Vec<AuditLogEntry>, AppError> {
        sqlx::query_as::<_, AuditLogEntry>("SELECT * FROM audit_log WHERE facility_id = $1 ORDER BY created_at DESC, id LIMIT $2").bind(facility_id).bind(limit).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_notifications(&self, facility_id: &str, limit: i64) -> Result<Vec<StaffNotification>, AppError> {
        sqlx::query_as::<_, StaffNotification>("SELECT * FROM staff_notifications WHERE facility_id = $1 ORDER BY created_at DESC, id LIMIT $2").bind(facility_id).bind(limit).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
}
