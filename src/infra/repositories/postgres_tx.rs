//! Statements shared by the PostgreSQL repositories. Every function runs on a connection the
//! caller already holds, usually an open transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder, Row};
use crate::domain::models::audit::{AuditLogEntry, StaffNotification};
use crate::domain::models::facility::Court;
use crate::domain::models::package::Redemption;
use crate::domain::models::reservation::{CourtBooking, Reservation, ReservationDraft, RESERVATION_ACTIVE};
use crate::domain::models::waitlist::ENTRY_FULFILLED;
use crate::domain::ports::WaitlistSlot;
use crate::domain::services::availability::{find_conflicts, free_courts};
use crate::error::{AppError, ConflictDetail};

/// Row-locks the courts in id order so concurrent writers on overlapping sets queue up
/// instead of deadlocking.
pub async fn lock_courts(conn: &mut PgConnection, facility_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    sqlx::query("SELECT id FROM courts WHERE facility_id = $1 AND id = ANY($2) ORDER BY id FOR UPDATE")
        .bind(facility_id).bind(court_ids)
        .fetch_all(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn court_bookings(
    conn: &mut PgConnection,
    facility_id: &str,
    court_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<CourtBooking>, AppError> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT rc.reservation_id, rc.court_id, r.start_time, r.end_time
         FROM reservation_courts rc JOIN reservations r ON r.id = rc.reservation_id
         WHERE r.status = 'ACTIVE' AND r.facility_id = "
    );
    qb.push_bind(facility_id)
        .push(" AND r.start_time < ").push_bind(end)
        .push(" AND r.end_time > ").push_bind(start);
    if !court_ids.is_empty() {
        qb.push(" AND rc.court_id = ANY(").push_bind(court_ids.to_vec()).push(")");
    }
    qb.build_query_as::<CourtBooking>().fetch_all(&mut *conn).await.map_err(AppError::Database)
}

pub async fn ensure_free(
    conn: &mut PgConnection,
    facility_id: &str,
    court_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<&str>,
) -> Result<(), AppError> {
    let bookings = court_bookings(conn, facility_id, court_ids, start, end).await?;
    let conflicting = find_conflicts(&bookings, court_ids, start, end, exclude);
    if !conflicting.is_empty() {
        return Err(AppError::Conflict(ConflictDetail::SlotUnavailable { conflicting_court_ids: conflicting }));
    }
    Ok(())
}

pub async fn list_free_courts(conn: &mut PgConnection, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<String>, AppError> {
    let courts = sqlx::query_as::<_, Court>("SELECT id, facility_id, name, status, created_at FROM courts WHERE facility_id = $1 ORDER BY id")
        .bind(facility_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;
    let bookings = court_bookings(conn, facility_id, &[], start, end).await?;
    Ok(free_courts(&courts, &bookings, start, end))
}

pub async fn court_ids(conn: &mut PgConnection, reservation_id: &str) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query("SELECT court_id FROM reservation_courts WHERE reservation_id = $1 ORDER BY court_id")
        .bind(reservation_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;
    Ok(rows.iter().map(|r| r.get::<String, _>("court_id")).collect())
}

pub async fn insert_court_links(conn: &mut PgConnection, reservation_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    sqlx::query("INSERT INTO reservation_courts (reservation_id, court_id) SELECT $1, UNNEST($2::text[])")
        .bind(reservation_id).bind(court_ids)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn delete_court_links(conn: &mut PgConnection, reservation_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    sqlx::query("DELETE FROM reservation_courts WHERE reservation_id = $1 AND court_id = ANY($2)")
        .bind(reservation_id).bind(court_ids)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn insert_audit(conn: &mut PgConnection, entry: &AuditLogEntry) -> Result<(), AppError> {
    sqlx::query("INSERT INTO audit_log (id, facility_id, actor, action, entity_type, entity_id, details, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
        .bind(&entry.id).bind(&entry.facility_id).bind(&entry.actor).bind(&entry.action)
        .bind(&entry.entity_type).bind(&entry.entity_id).bind(&entry.details).bind(entry.created_at)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn insert_notification(conn: &mut PgConnection, n: &StaffNotification) -> Result<(), AppError> {
    sqlx::query("INSERT INTO staff_notifications (id, facility_id, notification_type, message, entity_id, created_at) VALUES ($1, $2, $3, $4, $5, $6)")
        .bind(&n.id).bind(&n.facility_id).bind(&n.notification_type).bind(&n.message).bind(&n.entity_id).bind(n.created_at)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn redeem(
    conn: &mut PgConnection,
    package_id: &str,
    facility_id: &str,
    reservation_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Redemption, AppError> {
    let result = sqlx::query(
        "UPDATE packages SET remaining = remaining - 1,
                status = CASE WHEN remaining - 1 = 0 THEN 'DEPLETED' ELSE status END
         WHERE id = $1 AND status = 'ACTIVE' AND expires_at > $2 AND remaining > 0"
    )
        .bind(package_id).bind(now)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(ConflictDetail::PackageUnavailable { package_id: package_id.to_string() }));
    }

    let redemption = Redemption::new(package_id.to_string(), facility_id.to_string(), reservation_id.map(str::to_string), now);
    sqlx::query_as::<_, Redemption>("INSERT INTO redemptions (id, package_id, facility_id, reservation_id, redeemed_at) VALUES ($1, $2, $3, $4, $5) RETURNING *")
        .bind(&redemption.id).bind(&redemption.package_id).bind(&redemption.facility_id)
        .bind(&redemption.reservation_id).bind(redemption.redeemed_at)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)
}

pub async fn reverse(conn: &mut PgConnection, reservation_id: &str, now: DateTime<Utc>) -> Result<u32, AppError> {
    let redemptions = sqlx::query_as::<_, Redemption>("SELECT * FROM redemptions WHERE reservation_id = $1 ORDER BY redeemed_at FOR UPDATE")
        .bind(reservation_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;

    let mut reversed = 0;
    for redemption in redemptions {
        let result = sqlx::query(
            "UPDATE packages SET remaining = remaining + 1,
                    status = CASE WHEN status = 'DEPLETED' THEN 'ACTIVE' ELSE status END
             WHERE id = $1 AND status != 'EXPIRED' AND expires_at > $2 AND remaining < original_count"
        )
            .bind(&redemption.package_id).bind(now)
            .execute(&mut *conn).await.map_err(AppError::Database)?;

        if result.rows_affected() == 1 {
            sqlx::query("DELETE FROM redemptions WHERE id = $1")
                .bind(&redemption.id).execute(&mut *conn).await.map_err(AppError::Database)?;
            reversed += 1;
        }
    }
    Ok(reversed)
}

pub async fn insert_reservation(conn: &mut PgConnection, draft: &ReservationDraft, now: DateTime<Utc>) -> Result<Reservation, AppError> {
    let r = &draft.reservation;
    lock_courts(conn, &r.facility_id, &draft.court_ids).await?;
    ensure_free(conn, &r.facility_id, &draft.court_ids, r.start_time, r.end_time, None).await?;

    if let Some(limit) = draft.quota_limit {
        let current: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM reservations
             WHERE facility_id = $1 AND primary_user_id = $2 AND created_by_user_id = primary_user_id
               AND reservation_type = $3 AND status = 'ACTIVE' AND start_time > $4"
        )
            .bind(&r.facility_id).bind(&r.primary_user_id).bind(&r.reservation_type).bind(now)
            .fetch_one(&mut *conn).await.map_err(AppError::Database)?
            .get("count");
        if current >= limit {
            return Err(AppError::Conflict(ConflictDetail::ReservationLimit { limit, current }));
        }
    }

    let created = sqlx::query_as::<_, Reservation>(
        "INSERT INTO reservations (id, facility_id, reservation_type, start_time, end_time, primary_user_id, created_by_user_id, pro_id, open_play_rule_id, status, notes, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         RETURNING *"
    )
        .bind(&r.id).bind(&r.facility_id).bind(&r.reservation_type).bind(r.start_time).bind(r.end_time)
        .bind(&r.primary_user_id).bind(&r.created_by_user_id).bind(&r.pro_id).bind(&r.open_play_rule_id)
        .bind(RESERVATION_ACTIVE).bind(&r.notes).bind(r.created_at)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)?;

    insert_court_links(conn, &created.id, &draft.court_ids).await?;
    if !draft.participant_ids.is_empty() {
        sqlx::query("INSERT INTO reservation_participants (reservation_id, user_id, joined_at) SELECT $1, UNNEST($2::text[]), $3")
            .bind(&created.id).bind(&draft.participant_ids).bind(now)
            .execute(&mut *conn).await.map_err(AppError::Database)?;
    }

    if let Some(package_id) = &draft.package_id {
        redeem(conn, package_id, &created.facility_id, Some(&created.id), now).await?;
    }

    if let Some(offer_id) = &draft.waitlist_offer_id {
        let claimed = sqlx::query("UPDATE waitlist_offers SET status = 'ACCEPTED' WHERE id = $1 AND status = 'PENDING' AND expires_at > $2 RETURNING entry_id")
            .bind(offer_id).bind(now)
            .fetch_optional(&mut *conn).await.map_err(AppError::Database)?
            .ok_or_else(|| AppError::Conflict(ConflictDetail::OfferUnavailable { offer_id: offer_id.clone() }))?;
        let entry_id: String = claimed.get("entry_id");
        sqlx::query("UPDATE waitlist_entries SET status = $1 WHERE id = $2")
            .bind(ENTRY_FULFILLED).bind(&entry_id)
            .execute(&mut *conn).await.map_err(AppError::Database)?;
    }

    ensure_free(conn, &created.facility_id, &draft.court_ids, created.start_time, created.end_time, Some(&created.id)).await?;
    Ok(created)
}

/// Transaction-scoped advisory lock on the slot key, held even while the slot has no entries.
pub async fn lock_slot(conn: &mut PgConnection, slot: &WaitlistSlot) -> Result<(), AppError> {
    let key = format!("waitlist|{}|{}|{}", slot.facility_id, slot.start.timestamp(), slot.end.timestamp());
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(key)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

/// Pending offers holding `court_id` in this window. Offers without a court count against
/// every court; `None` counts the whole window.
pub async fn pending_offers_for_court(conn: &mut PgConnection, slot: &WaitlistSlot, court_id: Option<&str>) -> Result<i64, AppError> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM waitlist_offers o JOIN waitlist_entries e ON e.id = o.entry_id
         WHERE e.facility_id = $1 AND e.target_start = $2 AND e.target_end = $3 AND o.status = 'PENDING'
           AND ($4::text IS NULL OR o.court_id IS NULL OR o.court_id = $5)"
    )
        .bind(&slot.facility_id).bind(slot.start).bind(slot.end).bind(court_id).bind(court_id)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)?;
    Ok(row.get("count"))
}
