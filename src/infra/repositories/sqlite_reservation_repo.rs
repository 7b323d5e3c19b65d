use crate::domain::models::{
    audit::StaffNotification,
    cancellation::ReservationCancellation,
    reservation::{CourtBooking, Reservation, ReservationDraft},
};
use crate::domain::ports::{CancelEffects, ReservationRepository};
use crate::error::{is_unique_violation, AppError, ConflictDetail};
use crate::infra::repositories::sqlite_tx;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

pub struct SqliteReservationRepo {
    pool: SqlitePool,
}

impl SqliteReservationRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReservationRepository for SqliteReservationRepo {
    async fn create(&self, draft: &ReservationDraft, now: DateTime<Utc>) -> Result<Reservation, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let created = sqlite_tx::insert_reservation(&mut tx, draft, now).await?;
        tx.commit().await.map_err(AppError::Database)?;
        Ok(created)
    }
    async fn find_by_id(&self, facility_id: &str, id: &str) -> Result<Option<Reservation>, AppError> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE facility_id = ? AND id = ?").bind(facility_id).bind(id).fetch_optional(&self.pool).await.map_err(AppError::Database)
    }
    async fn court_ids(&self, reservation_id: &str) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        sqlite_tx::court_ids(&mut conn, reservation_id).await
    }
    async fn participant_ids(&self, reservation_id: &str) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT user_id FROM reservation_participants WHERE reservation_id = ? ORDER BY joined_at, user_id").bind(reservation_id).fetch_all(&self.pool).await.map_err(AppError::Database)?;
        Ok(rows.iter().map(|r| r.get::<String, _>("user_id")).collect())
    }
    async fn list_court_bookings(&self, facility_id: &str, court_ids: &[String], start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<CourtBooking>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        sqlite_tx::court_bookings(&mut conn, facility_id, court_ids, start, end).await
    }
    async fn list_free_courts(&self, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await.map_err(AppError::Database)?;
        sqlite_tx::list_free_courts(&mut conn, facility_id, start, end).await
    }
    async fn cancel(&self, reservation: &Reservation, cancellation: &ReservationCancellation, notification: Option<&StaffNotification>, now: DateTime<Utc>) -> Result<CancelEffects, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let result = sqlx::query("UPDATE reservations SET status = 'CANCELLED' WHERE id = ? AND status = 'ACTIVE'").bind(&reservation.id).execute(&mut *tx).await.map_err(AppError::Database)?;
        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(ConflictDetail::AlreadyCancelled { reservation_id: reservation.id.clone() }));
        }

        sqlx::query("INSERT INTO reservation_cancellations (id, reservation_id, cancelled_by_user_id, cancelled_at, refund_percentage, fee_waived, hours_before_start) VALUES (?, ?, ?, ?, ?, ?, ?)")
            .bind(&cancellation.id).bind(&cancellation.reservation_id).bind(&cancellation.cancelled_by_user_id).bind(cancellation.cancelled_at)
            .bind(cancellation.refund_percentage).bind(cancellation.fee_waived).bind(cancellation.hours_before_start)
            .execute(&mut *tx).await.map_err(AppError::Database)?;

        let released_court_ids = sqlite_tx::court_ids(&mut tx, &reservation.id).await?;
        sqlite_tx::delete_court_links(&mut tx, &reservation.id, &released_court_ids).await?;
        sqlx::query("DELETE FROM reservation_participants WHERE reservation_id = ?").bind(&reservation.id).execute(&mut *tx).await.map_err(AppError::Database)?;
        let reversed_redemptions = sqlite_tx::reverse(&mut tx, &reservation.id, now).await?;

        if let Some(n) = notification {
            sqlite_tx::insert_notification(&mut tx, n).await?;
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(CancelEffects { released_court_ids, reversed_redemptions })
    }
    async fn add_participant(&self, reservation_id: &str, user_id: &str, capacity: i64, now: DateTime<Utc>) -> Result<i64, AppError> {
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;
        let locked = sqlx::query("UPDATE reservations SET status = status WHERE id = ? AND status = 'ACTIVE'").bind(reservation_id).execute(&mut *tx).await.map_err(AppError::Database)?;
        if locked.rows_affected() == 0 {
            return Err(AppError::NotFound("Reservation not found".into()));
        }

        let inserted = sqlx::query(
            "INSERT INTO reservation_participants (reservation_id, user_id, joined_at)
             SELECT ?, ?, ? WHERE (SELECT COUNT(*) FROM reservation_participants WHERE reservation_id = ?) < ?"
        )
            .bind(reservation_id).bind(user_id).bind(now).bind(reservation_id).bind(capacity)
            .execute(&mut *tx).await
            .map_err(|e| if is_unique_violation(&e) { AppError::Conflict(ConflictDetail::Duplicate) } else { AppError::Database(e) })?;

        let current: i64 = sqlx::query("SELECT COUNT(*) as count FROM reservation_participants WHERE reservation_id = ?").bind(reservation_id).fetch_one(&mut *tx).await.map_err(AppError::Database)?.get("count");
        if inserted.rows_affected() == 0 {
            return Err(AppError::Conflict(ConflictDetail::SessionFull { capacity, current }));
        }
        tx.commit().await.map_err(AppError::Database)?;
        Ok(current)
    }
    async fn remove_participant(&self, reservation_id: &str, user_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM reservation_participants WHERE reservation_id = ? AND user_id = ?").bind(reservation_id).bind(user_id).execute(&self.pool).await.map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
    async fn count_participants(&self, reservation_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM reservation_participants WHERE reservation_id = ?").bind(reservation_id).fetch_one(&self.pool).await.map_err(AppError::Database)?;
        Ok(row.get("count"))
    }
}
