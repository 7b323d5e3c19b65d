mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{at, member, parse_body, staff, TestApp, FACILITY};
use court_booking::background::run_cleanup;
use court_booking::domain::models::auth::{ROLE_MEMBER, ROLE_STAFF};
use court_booking::domain::models::package::Package;
use court_booking::domain::services::redemption_ledger::IssuePackage;
use court_booking::domain::services::reservation_service::{CancelReservation, CreateReservation};
use court_booking::error::{AppError, ConflictDetail};
use serde_json::json;

async fn issue(app: &TestApp, user: &str, kind: &str, count: i32, expires_at: DateTime<Utc>) -> Package {
    app.state.ledger.issue(&staff(), FACILITY, IssuePackage {
        user_id: user.into(),
        kind: kind.into(),
        count,
        expires_at,
    }).await.unwrap()
}

fn paid_booking(court: &str, start: DateTime<Utc>, package_id: &str) -> CreateReservation {
    CreateReservation {
        court_ids: vec![court.into()],
        start,
        end: start + chrono::Duration::hours(1),
        reservation_type: None,
        primary_user_id: None,
        participant_ids: Vec::new(),
        pro_id: None,
        package_id: Some(package_id.into()),
        notes: None,
    }
}

async fn package(app: &TestApp, id: &str) -> Package {
    app.state.ledger.get(&staff(), FACILITY, id).await.unwrap().package
}

#[tokio::test]
async fn test_redeem_and_reverse_on_cancel() {
    let app = TestApp::new().await;
    let pack = issue(&app, "alice", "VISIT", 3, at(30, 0)).await;

    let booked = app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &pack.id)).await.unwrap();
    assert_eq!(package(&app, &pack.id).await.remaining, 2);

    let outcome = app.state.reservations
        .cancel(&member("alice"), FACILITY, &booked.reservation.id, CancelReservation::default())
        .await
        .unwrap();
    assert_eq!(outcome.reversed_redemptions, 1);

    let detail = app.state.ledger.get(&member("alice"), FACILITY, &pack.id).await.unwrap();
    assert_eq!(detail.package.remaining, 3);
    assert!(detail.redemptions.is_empty());
}

#[tokio::test]
async fn test_depleted_package_blocks_the_whole_booking() {
    let app = TestApp::new().await;
    let pack = issue(&app, "alice", "VISIT", 1, at(30, 0)).await;

    app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &pack.id)).await.unwrap();
    let drained = package(&app, &pack.id).await;
    assert_eq!(drained.remaining, 0);
    assert_eq!(drained.status, "DEPLETED");

    let err = app.state.reservations
        .create(&member("alice"), FACILITY, paid_booking("c2", at(1, 12), &pack.id))
        .await
        .unwrap_err();
    assert!(matches!(err.conflict_detail(), Some(ConflictDetail::PackageUnavailable { .. })));

    // Nothing was booked for the failed attempt
    let conflicts = app.state.availability.check_available(FACILITY, &["c2".into()], at(1, 12), at(1, 13), None).await.unwrap();
    assert!(conflicts.is_empty());
}

#[tokio::test]
async fn test_reversal_never_exceeds_original_count() {
    let app = TestApp::new().await;
    let pack = issue(&app, "alice", "VISIT", 2, at(30, 0)).await;
    let booked = app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &pack.id)).await.unwrap();

    // Topped up out of band: the package is already full again
    sqlx::query("UPDATE packages SET remaining = original_count WHERE id = ?")
        .bind(&pack.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let reversed = app.state.reservations.reverse_redemptions(&staff(), FACILITY, &booked.reservation.id).await.unwrap();
    assert_eq!(reversed, 0);
    assert_eq!(package(&app, &pack.id).await.remaining, 2);

    let err = app.state.reservations.reverse_redemptions(&member("alice"), FACILITY, &booked.reservation.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_reversal_is_not_repeated() {
    let app = TestApp::new().await;
    let pack = issue(&app, "alice", "VISIT", 3, at(30, 0)).await;
    let booked = app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &pack.id)).await.unwrap();

    let staff_token = app.token("staff-1", ROLE_STAFF);
    let uri = format!("/api/v1/club/reservations/{}/reverse-redemptions", booked.reservation.id);
    let res = app.send("POST", &uri, &staff_token, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(parse_body(res).await["reversed"], 1);

    let res = app.send("POST", &uri, &staff_token, None).await;
    assert_eq!(parse_body(res).await["reversed"], 0);
    assert_eq!(package(&app, &pack.id).await.remaining, 3);
}

#[tokio::test]
async fn test_expired_package_is_not_resurrected() {
    let app = TestApp::new().await;
    let pack = issue(&app, "alice", "VISIT", 3, at(2, 0)).await;
    let booked = app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &pack.id)).await.unwrap();

    app.clock.set(at(2, 1));
    run_cleanup(&app.state).await;

    let expired = package(&app, &pack.id).await;
    assert_eq!(expired.status, "EXPIRED");

    let reversed = app.state.reservations.reverse_redemptions(&staff(), FACILITY, &booked.reservation.id).await.unwrap();
    assert_eq!(reversed, 0);

    let after = package(&app, &pack.id).await;
    assert_eq!(after.status, "EXPIRED");
    assert_eq!(after.remaining, 2);
}

#[tokio::test]
async fn test_package_eligibility() {
    let app = TestApp::new().await;
    let lessons = issue(&app, "alice", "LESSON", 5, at(30, 0)).await;
    let visits = issue(&app, "alice", "VISIT", 5, at(30, 0)).await;

    let err = app.state.reservations.create(&member("alice"), FACILITY, paid_booking("c1", at(1, 10), &lessons.id)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = app.state.reservations.create(&member("bob"), FACILITY, paid_booking("c1", at(1, 10), &visits.id)).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = app.state.ledger.issue(&member("alice"), FACILITY, IssuePackage {
        user_id: "alice".into(), kind: "VISIT".into(), count: 10, expires_at: at(30, 0),
    }).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = app.state.ledger.issue(&staff(), FACILITY, IssuePackage {
        user_id: "alice".into(), kind: "VISIT".into(), count: 0, expires_at: at(30, 0),
    }).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_walk_in_redemption_over_http() {
    let app = TestApp::new().await;
    let staff_token = app.token("staff-1", ROLE_STAFF);
    let alice = app.token("alice", ROLE_MEMBER);

    let res = app.send("POST", "/api/v1/club/packages", &staff_token, Some(json!({
        "user_id": "alice", "kind": "VISIT", "count": 2, "expires_at": at(30, 0),
    }))).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let id = parse_body(res).await["id"].as_str().unwrap().to_string();

    let res = app.send("POST", &format!("/api/v1/club/packages/{}/redeem", id), &alice, None).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(parse_body(res).await["reservation_id"], serde_json::Value::Null);

    let res = app.send("GET", &format!("/api/v1/club/packages/{}", id), &alice, None).await;
    let body = parse_body(res).await;
    assert_eq!(body["remaining"], 1);
    assert_eq!(body["redemptions"].as_array().unwrap().len(), 1);

    let bob = app.token("bob", ROLE_MEMBER);
    let res = app.send("POST", &format!("/api/v1/club/packages/{}/redeem", id), &bob, None).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    app.send("POST", &format!("/api/v1/club/packages/{}/redeem", id), &alice, None).await;
    let res = app.send("POST", &format!("/api/v1/club/packages/{}/redeem", id), &alice, None).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(parse_body(res).await["conflict"]["code"], "package_unavailable");
}
