use crate::domain::{models::facility::{Court, Facility}, ports::FacilityRepository};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresFacilityRepo {
    pool: PgPool,
}

impl PostgresFacilityRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FacilityRepository for PostgresFacilityRepo {
    async fn find_by_id(&self, id: &str) -> Result<Option<Facility>, AppError> {
        sqlx::query_as::<_, Facility>("SELECT * FROM facilities WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_courts(&self, facility_id: &str) -> Result<Vec<Court>, AppError> {
        sqlx::query_as::<_, Court>("SELECT id, facility_id, name, status, created_at FROM courts WHERE facility_id = $1 ORDER BY id").bind(facility_id).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
}
