mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use common::{at, member, parse_body, staff, TestApp, FACILITY};
use court_booking::domain::models::auth::ROLE_MEMBER;
use court_booking::domain::services::reservation_service::{CancelReservation, CreateReservation};
use court_booking::error::{AppError, ConflictDetail};
use serde_json::json;

fn booking(courts: &[&str], start: DateTime<Utc>, end: DateTime<Utc>) -> CreateReservation {
    CreateReservation {
        court_ids: courts.iter().map(|c| c.to_string()).collect(),
        start,
        end,
        reservation_type: None,
        primary_user_id: None,
        participant_ids: Vec::new(),
        pro_id: None,
        package_id: None,
        notes: None,
    }
}

fn iso(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[tokio::test]
async fn test_create_and_fetch_reservation() {
    let app = TestApp::new().await;
    let alice = app.token("alice", ROLE_MEMBER);

    let res = app.send("POST", "/api/v1/club/reservations", &alice, Some(json!({
        "court_ids": ["c1"],
        "start": at(1, 10),
        "end": at(1, 11),
        "participant_ids": ["bob"],
    }))).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = parse_body(res).await;
    assert_eq!(body["status"], "ACTIVE");
    assert_eq!(body["reservation_type"], "COURT");
    assert_eq!(body["primary_user_id"], "alice");
    assert_eq!(body["court_ids"], json!(["c1"]));
    assert_eq!(body["participant_ids"], json!(["alice", "bob"]));

    let id = body["id"].as_str().unwrap().to_string();

    let res = app.send("GET", &format!("/api/v1/club/reservations/{}", id), &alice, None).await;
    assert_eq!(res.status(), StatusCode::OK);

    // Participants can see it, strangers cannot
    let bob = app.token("bob", ROLE_MEMBER);
    let res = app.send("GET", &format!("/api/v1/club/reservations/{}", id), &bob, None).await;
    assert_eq!(res.status(), StatusCode::OK);

    let carol = app.token("carol", ROLE_MEMBER);
    let res = app.send("GET", &format!("/api/v1/club/reservations/{}", id), &carol, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_overlap_returns_structured_conflict() {
    let app = TestApp::new().await;
    let alice = app.token("alice", ROLE_MEMBER);
    let bob = app.token("bob", ROLE_MEMBER);

    let res = app.send("POST", "/api/v1/club/reservations", &alice, Some(json!({
        "court_ids": ["c1"], "start": at(1, 10), "end": at(1, 11),
    }))).await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = app.send("POST", "/api/v1/club/reservations", &bob, Some(json!({
        "court_ids": ["c2", "c1"],
        "start": at(1, 10) + Duration::minutes(30),
        "end": at(1, 11) + Duration::minutes(30),
    }))).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body = parse_body(res).await;
    assert_eq!(body["conflict"]["code"], "slot_unavailable");
    assert_eq!(body["conflict"]["conflicting_court_ids"], json!(["c1"]));
    assert!(body["error"].as_str().unwrap().contains("c1"));

    // The multi-court request was all-or-nothing: c2 is still free
    let uri = format!(
        "/api/v1/club/availability?court_ids=c1,c2&start={}&end={}",
        iso(at(1, 10) + Duration::minutes(30)),
        iso(at(1, 11) + Duration::minutes(30)),
    );
    let res = app.send("GET", &uri, &bob, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = parse_body(res).await;
    assert_eq!(body["available"], false);
    assert_eq!(body["conflicting_court_ids"], json!(["c1"]));
    assert!(body["free_court_ids"].as_array().unwrap().iter().any(|c| c == "c2"));
}

#[tokio::test]
async fn test_touching_reservations_do_not_conflict() {
    let app = TestApp::new().await;
    let svc = &app.state.reservations;

    svc.create(&member("alice"), FACILITY, booking(&["c1"], at(1, 10), at(1, 11))).await.unwrap();
    svc.create(&member("bob"), FACILITY, booking(&["c1"], at(1, 11), at(1, 12))).await.unwrap();
    svc.create(&member("carol"), FACILITY, booking(&["c1"], at(1, 9), at(1, 10))).await.unwrap();

    let err = svc.create(&member("dave"), FACILITY, booking(&["c1"], at(1, 9), at(1, 12))).await.unwrap_err();
    assert_eq!(
        err.conflict_detail(),
        Some(&ConflictDetail::SlotUnavailable { conflicting_court_ids: vec!["c1".into()] })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_have_exactly_one_winner() {
    let app = TestApp::new().await;

    let mut handles = Vec::new();
    for i in 0..16 {
        let svc = app.state.reservations.clone();
        handles.push(tokio::spawn(async move {
            let mut req = booking(&["c1", "c2"], at(2, 18), at(2, 19));
            req.primary_user_id = Some(format!("player-{}", i));
            svc.create(&staff(), FACILITY, req).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(
                matches!(e.conflict_detail(), Some(ConflictDetail::SlotUnavailable { .. })),
                "unexpected error: {}", e
            ),
        }
    }
    assert_eq!(winners, 1);

    let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reservation_courts")
        .fetch_one(&app.pool).await.unwrap();
    assert_eq!(booked, 2);
}

#[tokio::test]
async fn test_member_reservation_limit() {
    let app = TestApp::new().await;
    app.set_member_limit(Some(1)).await;
    let svc = &app.state.reservations;

    svc.create(&member("alice"), FACILITY, booking(&["c1"], at(1, 10), at(1, 11))).await.unwrap();

    let err = svc.create(&member("alice"), FACILITY, booking(&["c2"], at(2, 10), at(2, 11))).await.unwrap_err();
    assert_eq!(err.conflict_detail(), Some(&ConflictDetail::ReservationLimit { limit: 1, current: 1 }));

    // Staff booking on the member's behalf is not counted against the ceiling
    let mut on_behalf = booking(&["c2"], at(2, 10), at(2, 11));
    on_behalf.primary_user_id = Some("alice".into());
    svc.create(&staff(), FACILITY, on_behalf).await.unwrap();
}

#[tokio::test]
async fn test_court_must_exist_and_be_active() {
    let app = TestApp::new().await;
    app.set_court_status("c3", "MAINTENANCE").await;
    let svc = &app.state.reservations;

    let err = svc.create(&member("alice"), FACILITY, booking(&["c3", "c1"], at(1, 10), at(1, 11))).await.unwrap_err();
    assert_eq!(err.conflict_detail(), Some(&ConflictDetail::CourtUnavailable { court_ids: vec!["c3".into()] }));

    let err = svc.create(&member("alice"), FACILITY, booking(&["c99"], at(1, 10), at(1, 11))).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_member_booking_rules() {
    let app = TestApp::new().await;
    let svc = &app.state.reservations;
    let alice = member("alice");

    let past = svc.create(&alice, FACILITY, booking(&["c1"], at(0, 7), at(0, 8))).await.unwrap_err();
    assert!(matches!(past, AppError::Validation(_)));

    let short = svc.create(&alice, FACILITY, booking(&["c1"], at(1, 10), at(1, 10) + Duration::minutes(15))).await.unwrap_err();
    assert!(matches!(short, AppError::Validation(_)));

    let too_far = svc.create(&alice, FACILITY, booking(&["c1"], at(20, 10), at(20, 11))).await.unwrap_err();
    assert!(matches!(too_far, AppError::Validation(_)));

    let mut open_play = booking(&["c1"], at(1, 10), at(1, 11));
    open_play.reservation_type = Some("OPEN_PLAY".into());
    let err = svc.create(&alice, FACILITY, open_play).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut for_bob = booking(&["c1"], at(1, 10), at(1, 11));
    for_bob.primary_user_id = Some("bob".into());
    let err = svc.create(&alice, FACILITY, for_bob).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Staff skip the member window
    svc.create(&staff(), FACILITY, booking(&["c1"], at(20, 10), at(20, 11))).await.unwrap();
}

#[tokio::test]
async fn test_cancel_releases_courts() {
    let app = TestApp::new().await;
    let svc = &app.state.reservations;

    let created = svc.create(&member("alice"), FACILITY, booking(&["c2", "c1"], at(1, 10), at(1, 11))).await.unwrap();

    let outcome = svc.cancel(&member("alice"), FACILITY, &created.reservation.id, CancelReservation::default()).await.unwrap();
    assert_eq!(outcome.cancellation.refund_percentage, 100);
    assert_eq!(outcome.released_court_ids, vec!["c1", "c2"]);

    let conflicts = app.state.availability.check_available(FACILITY, &["c1".into(), "c2".into()], at(1, 10), at(1, 11), None).await.unwrap();
    assert!(conflicts.is_empty());
    svc.create(&member("bob"), FACILITY, booking(&["c1"], at(1, 10), at(1, 11))).await.unwrap();

    let again = svc.cancel(&member("alice"), FACILITY, &created.reservation.id, CancelReservation::default()).await.unwrap_err();
    assert!(matches!(again.conflict_detail(), Some(ConflictDetail::AlreadyCancelled { .. })));

    let detail = svc.get(&staff(), FACILITY, &created.reservation.id).await.unwrap();
    assert_eq!(detail.reservation.status, "CANCELLED");
    assert!(detail.court_ids.is_empty());
}

#[tokio::test]
async fn test_only_owner_or_staff_can_cancel() {
    let app = TestApp::new().await;
    let svc = &app.state.reservations;

    let created = svc.create(&member("alice"), FACILITY, booking(&["c1"], at(1, 10), at(1, 11))).await.unwrap();

    let err = svc.cancel(&member("bob"), FACILITY, &created.reservation.id, CancelReservation::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    svc.cancel(&staff(), FACILITY, &created.reservation.id, CancelReservation::default()).await.unwrap();
}
