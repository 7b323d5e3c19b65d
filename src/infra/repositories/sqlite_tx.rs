//! Statements shared by the SQLite repositories. Every function runs on a connection the
//! caller already holds, usually an open transaction.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use crate::domain::models::audit::{AuditLogEntry, StaffNotification};
use crate::domain::models::facility::Court;
use crate::domain::models::package::Redemption;
use crate::domain::models::reservation::{CourtBooking, Reservation, ReservationDraft, RESERVATION_ACTIVE};
use crate::domain::models::waitlist::ENTRY_FULFILLED;
use crate::domain::ports::WaitlistSlot;
use crate::domain::services::availability::{find_conflicts, free_courts};
use crate::error::{AppError, ConflictDetail};

/// Takes the database write lock and bumps the courts' lock rows before anything is read.
pub async fn lock_courts(conn: &mut SqliteConnection, facility_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE courts SET lock_version = lock_version + 1 WHERE facility_id = ");
    qb.push_bind(facility_id).push(" AND id IN (");
    let mut ids = qb.separated(", ");
    for id in court_ids {
        ids.push_bind(id);
    }
    ids.push_unseparated(")");
    qb.build().execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn court_bookings(
    conn: &mut SqliteConnection,
    facility_id: &str,
    court_ids: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<CourtBooking>, AppError> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT rc.reservation_id, rc.court_id, r.start_time, r.end_time
         FROM reservation_courts rc JOIN reservations r ON r.id = rc.reservation_id
         WHERE r.status = 'ACTIVE' AND r.facility_id = "
    );
    qb.push_bind(facility_id)
        .push(" AND r.start_time < ").push_bind(end)
        .push(" AND r.end_time > ").push_bind(start);
    if !court_ids.is_empty() {
        qb.push(" AND rc.court_id IN (");
        let mut ids = qb.separated(", ");
        for id in court_ids {
            ids.push_bind(id);
        }
        ids.push_unseparated(")");
    }
    qb.build_query_as::<CourtBooking>().fetch_all(&mut *conn).await.map_err(AppError::Database)
}

pub async fn ensure_free(
    conn: &mut SqliteConnection,
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

pub async fn list_free_courts(conn: &mut SqliteConnection, facility_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<String>, AppError> {
    let courts = sqlx::query_as::<_, Court>("SELECT id, facility_id, name, status, created_at FROM courts WHERE facility_id = ? ORDER BY id")
        .bind(facility_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;
    let bookings = court_bookings(conn, facility_id, &[], start, end).await?;
    Ok(free_courts(&courts, &bookings, start, end))
}

pub async fn court_ids(conn: &mut SqliteConnection, reservation_id: &str) -> Result<Vec<String>, AppError> {
    let rows = sqlx::query("SELECT court_id FROM reservation_courts WHERE reservation_id = ? ORDER BY court_id")
        .bind(reservation_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;
    Ok(rows.iter().map(|r| r.get::<String, _>("court_id")).collect())
}

pub async fn insert_court_links(conn: &mut SqliteConnection, reservation_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    for court_id in court_ids {
        sqlx::query("INSERT INTO reservation_courts (reservation_id, court_id) VALUES (?, ?)")
            .bind(reservation_id).bind(court_id).execute(&mut *conn).await.map_err(AppError::Database)?;
    }
    Ok(())
}

pub async fn delete_court_links(conn: &mut SqliteConnection, reservation_id: &str, court_ids: &[String]) -> Result<(), AppError> {
    for court_id in court_ids {
        sqlx::query("DELETE FROM reservation_courts WHERE reservation_id = ? AND court_id = ?")
            .bind(reservation_id).bind(court_id).execute(&mut *conn).await.map_err(AppError::Database)?;
    }
    Ok(())
}

pub async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditLogEntry) -> Result<(), AppError> {
    sqlx::query("INSERT INTO audit_log (id, facility_id, actor, action, entity_type, entity_id, details, created_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)")
        .bind(&entry.id).bind(&entry.facility_id).bind(&entry.actor).bind(&entry.action)
        .bind(&entry.entity_type).bind(&entry.entity_id).bind(&entry.details).bind(entry.created_at)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

pub async fn insert_notification(conn: &mut SqliteConnection, n: &StaffNotification) -> Result<(), AppError> {
    sqlx::query("INSERT INTO staff_notifications (id, facility_id, notification_type, message, entity_id, created_at) VALUES (?, ?, ?, ?, ?, ?)")
        .bind(&n.id).bind(&n.facility_id).bind(&n.notification_type).bind(&n.message).bind(&n.entity_id).bind(n.created_at)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

/// Takes one unit from the package. Fails with `package_unavailable` unless it is ACTIVE,
/// unexpired and not empty.
pub async fn redeem(
    conn: &mut SqliteConnection,
    package_id: &str,
    facility_id: &str,
    reservation_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Redemption, AppError> {
    let result = sqlx::query(
        "UPDATE packages SET remaining = remaining - 1,
                status = CASE WHEN remaining - 1 = 0 THEN 'DEPLETED' ELSE status END
         WHERE id = ? AND status = 'ACTIVE' AND expires_at > ? AND remaining > 0"
    )
        .bind(package_id).bind(now)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    if result.rows_affected() == 0 {
        return Err(AppError::Conflict(ConflictDetail::PackageUnavailable { package_id: package_id.to_string() }));
    }

    let redemption = Redemption::new(package_id.to_string(), facility_id.to_string(), reservation_id.map(str::to_string), now);
    sqlx::query_as::<_, Redemption>("INSERT INTO redemptions (id, package_id, facility_id, reservation_id, redeemed_at) VALUES (?, ?, ?, ?, ?) RETURNING *")
        .bind(&redemption.id).bind(&redemption.package_id).bind(&redemption.facility_id)
        .bind(&redemption.reservation_id).bind(redemption.redeemed_at)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)
}

/// Gives back every unit the reservation consumed whose package is still valid and below
/// its original count. Returns how many were given back.
pub async fn reverse(conn: &mut SqliteConnection, reservation_id: &str, now: DateTime<Utc>) -> Result<u32, AppError> {
    let redemptions = sqlx::query_as::<_, Redemption>("SELECT * FROM redemptions WHERE reservation_id = ? ORDER BY redeemed_at")
        .bind(reservation_id).fetch_all(&mut *conn).await.map_err(AppError::Database)?;

    let mut reversed = 0;
    for redemption in redemptions {
        let result = sqlx::query(
            "UPDATE packages SET remaining = remaining + 1,
                    status = CASE WHEN status = 'DEPLETED' THEN 'ACTIVE' ELSE status END
             WHERE id = ? AND status != 'EXPIRED' AND expires_at > ? AND remaining < original_count"
        )
            .bind(&redemption.package_id).bind(now)
            .execute(&mut *conn).await.map_err(AppError::Database)?;

        if result.rows_affected() == 1 {
            sqlx::query("DELETE FROM redemptions WHERE id = ?")
                .bind(&redemption.id).execute(&mut *conn).await.map_err(AppError::Database)?;
            reversed += 1;
        }
    }
    Ok(reversed)
}

/// The full reservation insert: court lock, conflict check, quota, rows, package and
/// waitlist offer, then a second conflict check that ignores the new row.
pub async fn insert_reservation(conn: &mut SqliteConnection, draft: &ReservationDraft, now: DateTime<Utc>) -> Result<Reservation, AppError> {
    let r = &draft.reservation;
    lock_courts(conn, &r.facility_id, &draft.court_ids).await?;
    ensure_free(conn, &r.facility_id, &draft.court_ids, r.start_time, r.end_time, None).await?;

    if let Some(limit) = draft.quota_limit {
        let current: i64 = sqlx::query(
            "SELECT COUNT(*) as count FROM reservations
             WHERE facility_id = ? AND primary_user_id = ? AND created_by_user_id = primary_user_id
               AND reservation_type = ? AND status = 'ACTIVE' AND start_time > ?"
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
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         RETURNING *"
    )
        .bind(&r.id).bind(&r.facility_id).bind(&r.reservation_type).bind(r.start_time).bind(r.end_time)
        .bind(&r.primary_user_id).bind(&r.created_by_user_id).bind(&r.pro_id).bind(&r.open_play_rule_id)
        .bind(RESERVATION_ACTIVE).bind(&r.notes).bind(r.created_at)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)?;

    insert_court_links(conn, &created.id, &draft.court_ids).await?;
    for user_id in &draft.participant_ids {
        sqlx::query("INSERT INTO reservation_participants (reservation_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(&created.id).bind(user_id).bind(now)
            .execute(&mut *conn).await.map_err(AppError::Database)?;
    }

    if let Some(package_id) = &draft.package_id {
        redeem(conn, package_id, &created.facility_id, Some(&created.id), now).await?;
    }

    if let Some(offer_id) = &draft.waitlist_offer_id {
        let claimed = sqlx::query("UPDATE waitlist_offers SET status = 'ACCEPTED' WHERE id = ? AND status = 'PENDING' AND expires_at > ? RETURNING entry_id")
            .bind(offer_id).bind(now)
            .fetch_optional(&mut *conn).await.map_err(AppError::Database)?
            .ok_or_else(|| AppError::Conflict(ConflictDetail::OfferUnavailable { offer_id: offer_id.clone() }))?;
        let entry_id: String = claimed.get("entry_id");
        sqlx::query("UPDATE waitlist_entries SET status = ? WHERE id = ?")
            .bind(ENTRY_FULFILLED).bind(&entry_id)
            .execute(&mut *conn).await.map_err(AppError::Database)?;
    }

    ensure_free(conn, &created.facility_id, &draft.court_ids, created.start_time, created.end_time, Some(&created.id)).await?;
    Ok(created)
}

/// Serializes work on one waitlist slot.
pub async fn lock_slot(conn: &mut SqliteConnection, slot: &WaitlistSlot) -> Result<(), AppError> {
    sqlx::query("UPDATE waitlist_entries SET position = position WHERE facility_id = ? AND target_start = ? AND target_end = ?")
        .bind(&slot.facility_id).bind(slot.start).bind(slot.end)
        .execute(&mut *conn).await.map_err(AppError::Database)?;
    Ok(())
}

/// Pending offers holding `court_id` in this window. Offers without a court count against
/// every court; `None` counts the whole window.
pub async fn pending_offers_for_court(conn: &mut SqliteConnection, slot: &WaitlistSlot, court_id: Option<&str>) -> Result<i64, AppError> {
    let row = sqlx::query(
        "SELECT COUNT(*) as count FROM waitlist_offers o JOIN waitlist_entries e ON e.id = o.entry_id
         WHERE e.facility_id = ? AND e.target_start = ? AND e.target_end = ? AND o.status = 'PENDING'
           AND (? IS NULL OR o.court_id IS NULL OR o.court_id = ?)"
    )
        .bind(&slot.facility_id).bind(slot.start).bind(slot.end).bind(court_id).bind(court_id)
        .fetch_one(&mut *conn).await.map_err(AppError::Database)?;
    Ok(row.get("count"))
}
