use crate::domain::{models::facility::{Court, Facility}, ports::FacilityRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::SqlitePool;

pub struct SqliteFacilityRepo {
    pool: SqlitePool,
}

impl SqliteFacilityRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FacilityRepository for SqliteFacilityRepo {
    async fn find_by_id(&self, id: &str) -> Result<Option<Facility>, AppError> {
        sqlx::query_as::<_, Facility>("SELECT * FROM facilities WHERE id = ?").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_courts(&self, facility_id: &str) -> Result<Vec<Court>, AppError> {
        sqlx::query_as::<_, Court>("SELECT id, facility_id, name, status, created_at FROM courts WHERE facility_id = ? ORDER BY id").bind(facility_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
}
