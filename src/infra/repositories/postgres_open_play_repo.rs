use crate::domain::models::{
    audit::{AuditLogEntry, StaffNotification},
    open_play::{OpenPlayRule, OpenPlaySession},
    reservation::ReservationDraft,
};
use crate::domain::ports::{OpenPlayRepository, ScaleChange};
use crate::error::{AppError, ConflictDetail};
use crate::infra::repositories::postgres_tx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

pub struct PostgresOpenPlayRepo {
    pool: PgPool,
}

impl PostgresOpenPlayRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OpenPlayRepository for PostgresOpenPlayRepo {
    async fn create_rule(&self, rule: &OpenPlayRule) -> Result<OpenPlayRule, AppError> {
        sqlx::query_as::<_, OpenPlayRule>(
            "INSERT INTO open_play_rules (id, facility_id, name, kind, min_participants, max_participants_per_court, cancellation_cutoff_minutes, auto_scale_enabled, min_courts, max_courts, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING *"
        )
            .bind(&rule.id).bind(&rule.facility_id).bind(&rule.name).bind(&rule.kind)
            .bind(rule.min_participants).bind(rule.max_participants_per_court).bind(rule.cancellation_cutoff_minutes)
            .bind(rule.auto_scale_enabled).bind(rule.min_courts).bind(rule.max_courts).bind(rule.created_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }
    async fn find_rule(&self, id: &str) -> Result<Option<OpenPlayRule>, AppError> {
        sqlx::query_as::<_, OpenPlayRule>("SELECT * FROM open_play_rules WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn set_rule_auto_scale(&self, rule_id: &str, enabled: bool, audit: &AuditLogEntry) -> Result<OpenPlayRule, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let updated = sqlx::query_as::<_, OpenPlayRule>("UPDATE open_play_rules SET auto_scale_enabled = $1 WHERE id = $2 RETURNING *").bind(enabled).bind(rule_id).fetch_optional(&mut *tx).await.map_err(AppError::Database)?
            .ok_or(AppError::NotFound("Open play rule not found".into()))?;
        postgres_tx::insert_audit(&mut tx, audit).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(updated)
    }
    async fn create_session(&self, draft: &ReservationDraft, session: &OpenPlaySession, now: DateTime<Utc>) -> Result<OpenPlaySession, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        postgres_tx::insert_reservation(&mut tx, draft, now).await?;
        let created = sqlx::query_as::<_, OpenPlaySession>(
            "INSERT INTO open_play_sessions (id, rule_id, facility_id, reservation_id, start_time, end_time, court_count, status, auto_scale_override, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING *"
        )
            .bind(&session.id).bind(&session.rule_id).bind(&session.facility_id).bind(&session.reservation_id)
            .bind(session.start_time).bind(session.end_time).bind(session.court_count).bind(&session.status)
            .bind(session.auto_scale_override).bind(session.created_at)
            .fetch_one(&mut *tx).await.map_err(AppError::Database)?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }
    async fn find_session(&self, id: &str) -> Result<Option<OpenPlaySession>, AppError> {
        sqlx::query_as::<_, OpenPlaySession>("SELECT * FROM open_play_sessions WHERE id = $1").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_upcoming_sessions(&self, now: DateTime<Utc>) -> Result<Vec<OpenPlaySession>, AppError> {
        sqlx::query_as::<_, OpenPlaySession>("SELECT * FROM open_play_sessions WHERE status = 'SCHEDULED' AND start_time > $1 ORDER BY start_time, id").bind(now).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn set_session_override(&self, session_id: &str, auto_scale: Option<bool>, audit: &AuditLogEntry) -> Result<OpenPlaySession, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let updated = sqlx::query_as::<_, OpenPlaySession>("UPDATE open_play_sessions SET auto_scale_override = $1 WHERE id = $2 RETURNING *").bind(auto_scale).bind(session_id).fetch_optional(&mut *tx).await.map_err(AppError::Database)?
            .ok_or(AppError::NotFound("Open play session not found".into()))?;
        postgres_tx::insert_audit(&mut tx, audit).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(updated)
    }
    async fn cancel_session(&self, session_id: &str, audit: &AuditLogEntry, notification: &StaffNotification) -> Result<Option<Vec<String>>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let Some(row) = sqlx::query("UPDATE open_play_sessions SET status = 'CANCELLED' WHERE id = $1 AND status = 'SCHEDULED' RETURNING reservation_id").bind(session_id).fetch_optional(&mut *tx).await.map_err(AppError::Database)? else {
            return Ok(None);
        };
        let reservation_id: String = row.get("reservation_id");

        sqlx::query("UPDATE reservations SET status = 'CANCELLED' WHERE id = $1").bind(&reservation_id).execute(&mut *tx).await.map_err(AppError::Database)?;
        let released = postgres_tx::court_ids(&mut tx, &reservation_id).await?;
        postgres_tx::delete_court_links(&mut tx, &reservation_id, &released).await?;
        postgres_tx::insert_audit(&mut tx, audit).await?;
        postgres_tx::insert_notification(&mut tx, notification).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(Some(released))
    }
    async fn apply_scale(&self, session_id: &str, change: &ScaleChange, audit: &AuditLogEntry, notification: &StaffNotification) -> Result<OpenPlaySession, AppError> {
        let target = change.expected_court_count + change.add_court_ids.len() as i32 - change.remove_court_ids.len() as i32;
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        // Guarded on the count the decision was computed from.
        let session = sqlx::query_as::<_, OpenPlaySession>(
            "UPDATE open_play_sessions SET court_count = $1 WHERE id = $2 AND court_count = $3 AND status = 'SCHEDULED' RETURNING *"
        )
            .bind(target).bind(session_id).bind(change.expected_court_count)
            .fetch_optional(&mut *tx).await.map_err(AppError::Database)?
            .ok_or_else(|| AppError::Conflict(ConflictDetail::StaleDecision { entity_id: session_id.to_string() }))?;

        if !change.add_court_ids.is_empty() {
            postgres_tx::lock_courts(&mut tx, &session.facility_id, &change.add_court_ids).await?;
            postgres_tx::ensure_free(&mut tx, &session.facility_id, &change.add_court_ids, session.start_time, session.end_time, None).await?;
            postgres_tx::insert_court_links(&mut tx, &session.reservation_id, &change.add_court_ids).await?;
        }
        postgres_tx::delete_court_links(&mut tx, &session.reservation_id, &change.remove_court_ids).await?;
        postgres_tx::insert_audit(&mut tx, audit).await?;
        postgres_tx::insert_notification(&mut tx, notification).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(session)
    }
}
