use crate::domain::models::{
    audit::{AuditLogEntry, ACTOR_WAITLIST},
    waitlist::{OfferExpiry, WaitlistConfig, WaitlistEntry, WaitlistOffer},
};
use crate::domain::ports::{WaitlistRepository, WaitlistSlot};
use crate::error::{is_unique_violation, AppError, ConflictDetail};
use crate::infra::repositories::sqlite_tx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};

pub struct SqliteWaitlistRepo {
    pool: SqlitePool,
}

impl SqliteWaitlistRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

async fn insert_offer(conn: &mut SqliteConnection, offer: &WaitlistOffer) -> Result<Option<WaitlistOffer>, AppError> {
    let notified = sqlx::query("UPDATE waitlist_entries SET status = 'NOTIFIED' WHERE id = ? AND status = 'PENDING'").bind(&offer.entry_id).execute(&mut *conn).await.map_err(AppError::Database)?;
    if notified.rows_affected() == 0 {
        return Ok(None);
    }
    let created = sqlx::query_as::<_, WaitlistOffer>("INSERT INTO waitlist_offers (id, entry_id, court_id, status, expires_at, created_at) VALUES (?, ?, ?, ?, ?, ?) RETURNING *")
        .bind(&offer.id).bind(&offer.entry_id).bind(&offer.court_id).bind(&offer.status).bind(offer.expires_at).bind(offer.created_at)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)?;
    Ok(Some(created))
}

#[async_trait]
impl WaitlistRepository for SqliteWaitlistRepo {
    async fn get_config(&self, facility_id: &str) -> Result<Option<WaitlistConfig>, AppError> {
        sqlx::query_as::<_, WaitlistConfig>("SELECT * FROM waitlist_configs WHERE facility_id = ?").bind(facility_id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn upsert_config(&self, config: &WaitlistConfig) -> Result<WaitlistConfig, AppError> {
        sqlx::query_as::<_, WaitlistConfig>(
            "INSERT INTO waitlist_configs (facility_id, enabled, mode, offer_expiry_minutes, notification_window_hours, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(facility_id) DO UPDATE SET enabled = excluded.enabled, mode = excluded.mode, offer_expiry_minutes = excluded.offer_expiry_minutes,
                notification_window_hours = excluded.notification_window_hours, updated_at = excluded.updated_at
             RETURNING *"
        )
            .bind(&config.facility_id).bind(config.enabled).bind(&config.mode).bind(config.offer_expiry_minutes)
            .bind(config.notification_window_hours).bind(config.updated_at)
            .fetch_one(&self.pool).await.map_err(AppError::Database)
    }
    async fn join(&self, entry: &WaitlistEntry) -> Result<WaitlistEntry, AppError> {
        let slot = WaitlistSlot { facility_id: entry.facility_id.clone(), start: entry.target_start, end: entry.target_end };
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        sqlite_tx::lock_slot(&mut tx, &slot).await?;

        let position: i32 = sqlx::query("SELECT COALESCE(MAX(position), 0) + 1 as next FROM waitlist_entries WHERE facility_id = ? AND target_start = ? AND target_end = ?")
            .bind(&slot.facility_id).bind(slot.start).bind(slot.end)
            .fetch_one(&mut *tx).await.map_err(AppError::Database)?.get("next");

        let created = sqlx::query_as::<_, WaitlistEntry>(
            "INSERT INTO waitlist_entries (id, facility_id, target_date, target_start, target_end, target_court_id, user_id, position, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *"
        )
            .bind(&entry.id).bind(&entry.facility_id).bind(entry.target_date).bind(entry.target_start).bind(entry.target_end)
            .bind(&entry.target_court_id).bind(&entry.user_id).bind(position).bind(&entry.status).bind(entry.created_at)
            .fetch_one(&mut *tx).await
            .map_err(|e| if is_unique_violation(&e) { AppError::Conflict(ConflictDetail::AlreadyWaitlisted) } else { AppError::Database(e) })?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }
    async fn find_entry(&self, id: &str) -> Result<Option<WaitlistEntry>, AppError> {
        sqlx::query_as::<_, WaitlistEntry>("SELECT * FROM waitlist_entries WHERE id = ?").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn delete_entry(&self, id: &str) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        sqlx::query("DELETE FROM waitlist_offers WHERE entry_id = ?").bind(id).execute(&mut *tx).await.map_err(AppError::Database)?;
        let result = sqlx::query("DELETE FROM waitlist_entries WHERE id = ?").bind(id).execute(&mut *tx).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 { return Err(AppError::NotFound("Waitlist entry not found".into())); }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(())
    }
    async fn list_matching_entries(&self, slot: &WaitlistSlot, court_ids: &[String]) -> Result<Vec<WaitlistEntry>, AppError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM waitlist_entries WHERE status = 'PENDING' AND facility_id = ");
        qb.push_bind(&slot.facility_id)
            .push(" AND target_start = ").push_bind(slot.start)
            .push(" AND target_end = ").push_bind(slot.end)
            .push(" AND (target_court_id IS NULL OR target_court_id IN (");
        let mut ids = qb.separated(", ");
        for id in court_ids {
            ids.push_bind(id);
        }
        ids.push_unseparated(")) ORDER BY position, created_at");
        qb.build_query_as::<WaitlistEntry>().fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn create_offers(&self, slot: &WaitlistSlot, offers: &[WaitlistOffer], exclusive: bool, audit: &AuditLogEntry) -> Result<Vec<WaitlistOffer>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        sqlite_tx::lock_slot(&mut tx, slot).await?;
        let mut created = Vec::with_capacity(offers.len());
        for offer in offers {
            if exclusive && sqlite_tx::pending_offers_for_court(&mut tx, slot, offer.court_id.as_deref()).await? > 0 {
                continue;
            }
            if let Some(o) = insert_offer(&mut tx, offer).await? {
                created.push(o);
            }
        }
        if !created.is_empty() {
            sqlite_tx::insert_audit(&mut tx, audit).await?;
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }
    async fn find_offer(&self, id: &str) -> Result<Option<WaitlistOffer>, AppError> {
        sqlx::query_as::<_, WaitlistOffer>("SELECT * FROM waitlist_offers WHERE id = ?").bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn list_expired_offers(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WaitlistOffer>, AppError> {
        sqlx::query_as::<_, WaitlistOffer>("SELECT * FROM waitlist_offers WHERE status = 'PENDING' AND expires_at <= ? ORDER BY expires_at, id LIMIT ?").bind(now).bind(limit).fetch_all(&self.pool).await.map_err(AppError::Database)
    }
    async fn expire_offer(&self, offer_id: &str, now: DateTime<Utc>, next_expires_at: Option<DateTime<Utc>>) -> Result<Option<OfferExpiry>, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let Some(expired) = sqlx::query_as::<_, WaitlistOffer>("UPDATE waitlist_offers SET status = 'EXPIRED' WHERE id = ? AND status = 'PENDING' AND expires_at <= ? RETURNING *").bind(offer_id).bind(now).fetch_optional(&mut *tx).await.map_err(AppError::Database)? else {
            return Ok(None);
        };

        let entry = sqlx::query_as::<_, WaitlistEntry>("UPDATE waitlist_entries SET status = CASE WHEN status = 'NOTIFIED' THEN 'EXPIRED' ELSE status END WHERE id = ? RETURNING *").bind(&expired.entry_id).fetch_one(&mut *tx).await.map_err(AppError::Database)?;
        sqlite_tx::insert_audit(&mut tx, &AuditLogEntry::new(
            &entry.facility_id, ACTOR_WAITLIST, "offer_expired", "waitlist_offer", &expired.id,
            json!({ "entry_id": entry.id, "position": entry.position, "expires_at": expired.expires_at }),
            now,
        )).await?;

        let slot = WaitlistSlot { facility_id: entry.facility_id.clone(), start: entry.target_start, end: entry.target_end };
        let mut next = None;
        if let Some(expires_at) = next_expires_at
            && entry.target_start > now
            && sqlite_tx::pending_offers_for_court(&mut tx, &slot, expired.court_id.as_deref()).await? == 0 {
            let candidate = sqlx::query_as::<_, WaitlistEntry>(
                "SELECT * FROM waitlist_entries
                 WHERE facility_id = ? AND target_start = ? AND target_end = ? AND status = 'PENDING'
                   AND (? IS NULL OR target_court_id IS NULL OR target_court_id = ?)
                 ORDER BY position, created_at LIMIT 1"
            )
                .bind(&slot.facility_id).bind(slot.start).bind(slot.end).bind(&expired.court_id).bind(&expired.court_id)
                .fetch_optional(&mut *tx).await.map_err(AppError::Database)?;

            if let Some(candidate) = candidate {
                let court_id = candidate.target_court_id.clone().or_else(|| expired.court_id.clone());
                let offer = WaitlistOffer::new(candidate.id.clone(), court_id, now, expires_at);
                if let Some(created) = insert_offer(&mut tx, &offer).await? {
                    sqlite_tx::insert_audit(&mut tx, &AuditLogEntry::new(
                        &entry.facility_id, ACTOR_WAITLIST, "offer_advanced", "waitlist_entry", &candidate.id,
                        json!({ "from_entry_id": entry.id, "position": candidate.position, "offer_id": created.id, "expires_at": expires_at }),
                        now,
                    )).await?;
                    next = Some(created);
                }
            }
        }

        tx.commit().await.map_err(AppError::Database)?;
        Ok(Some(OfferExpiry { expired, next }))
    }
    async fn list_past_entry_ids(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT id FROM waitlist_entries WHERE target_start < ? ORDER BY target_start, id LIMIT ?").bind(now).bind(limit).fetch_all(&self.pool).await.map_err(AppError::Database)?;
        Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
    }
}
