mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use common::{at, member, parse_body, staff, TestApp, FACILITY};
use court_booking::background::run_cleanup;
use court_booking::domain::services::clock::Clock;
use court_booking::domain::models::auth::{ROLE_MEMBER, ROLE_STAFF};
use court_booking::domain::models::waitlist::WaitlistEntry;
use court_booking::domain::services::open_play_service::{CreateRule, ScheduleSession};
use court_booking::domain::services::reservation_service::{CancelReservation, CreateReservation};
use court_booking::domain::services::waitlist_service::JoinWaitlist;
use court_booking::error::{AppError, ConflictDetail};
use serde_json::json;

async fn hold(app: &TestApp, court: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    hold_courts(app, &[court], start, end).await
}

async fn hold_courts(app: &TestApp, courts: &[&str], start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    app.state.reservations.create(&staff(), FACILITY, CreateReservation {
        court_ids: courts.iter().map(|c| c.to_string()).collect(),
        start,
        end,
        reservation_type: None,
        primary_user_id: Some("holder".into()),
        participant_ids: Vec::new(),
        pro_id: None,
        package_id: None,
        notes: None,
    }).await.unwrap().reservation.id
}

async fn release(app: &TestApp, reservation_id: &str) {
    app.state.reservations.cancel(&staff(), FACILITY, reservation_id, CancelReservation::default()).await.unwrap();
}

async fn wait_for(app: &TestApp, user: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> WaitlistEntry {
    app.state.waitlist.join(&member(user), FACILITY, JoinWaitlist {
        start,
        end,
        court_id: None,
        user_id: None,
    }).await.unwrap()
}

async fn pending_offers(app: &TestApp) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM waitlist_offers WHERE status = 'PENDING'")
        .fetch_one(&app.pool).await.unwrap()
}

/// Latest offer made to `user`: (offer id, offer status).
async fn offer_for(app: &TestApp, user: &str) -> Option<(String, String)> {
    sqlx::query_as(
        "SELECT o.id, o.status FROM waitlist_offers o JOIN waitlist_entries e ON e.id = o.entry_id
         WHERE e.user_id = ? ORDER BY o.created_at DESC LIMIT 1"
    )
        .bind(user)
        .fetch_optional(&app.pool).await.unwrap()
}

async fn entry_status(app: &TestApp, user: &str) -> String {
    sqlx::query_scalar("SELECT status FROM waitlist_entries WHERE user_id = ?")
        .bind(user)
        .fetch_one(&app.pool).await.unwrap()
}

#[tokio::test]
async fn test_sequential_offers_advance_one_at_a_time() {
    let app = TestApp::new().await;
    let (start, end) = (at(1, 10), at(1, 11));
    let held = hold(&app, "c1", start, end).await;

    let positions: Vec<i32> = [
        wait_for(&app, "alice", start, end).await,
        wait_for(&app, "bob", start, end).await,
        wait_for(&app, "carol", start, end).await,
    ].iter().map(|e| e.position).collect();
    assert_eq!(positions, vec![1, 2, 3]);

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 1);
    let (alice_offer, _) = offer_for(&app, "alice").await.unwrap();
    assert_eq!(entry_status(&app, "alice").await, "NOTIFIED");
    assert!(offer_for(&app, "bob").await.is_none());

    // Not expired yet: the sweep leaves it alone
    app.clock.advance(Duration::minutes(29));
    let report = app.state.waitlist.sweep_expired_offers().await.unwrap();
    assert_eq!(report.expired, 0);

    app.clock.advance(Duration::minutes(2));
    let report = app.state.waitlist.sweep_expired_offers().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.advanced, 1);
    assert_eq!(pending_offers(&app).await, 1);
    assert_eq!(entry_status(&app, "alice").await, "EXPIRED");
    assert_eq!(entry_status(&app, "bob").await, "NOTIFIED");
    assert_eq!(entry_status(&app, "carol").await, "PENDING");

    let alice_token = app.token("alice", ROLE_MEMBER);
    let res = app.send("POST", &format!("/api/v1/club/waitlist/offers/{}/accept", alice_offer), &alice_token, Some(json!({}))).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    assert_eq!(parse_body(res).await["conflict"]["code"], "offer_unavailable");

    let (bob_offer, _) = offer_for(&app, "bob").await.unwrap();
    let bob_token = app.token("bob", ROLE_MEMBER);
    let res = app.send("POST", &format!("/api/v1/club/waitlist/offers/{}/accept", bob_offer), &bob_token, Some(json!({}))).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body = parse_body(res).await;
    assert_eq!(body["primary_user_id"], "bob");
    assert_eq!(body["court_ids"], json!(["c1"]));

    assert_eq!(offer_for(&app, "bob").await.unwrap().1, "ACCEPTED");
    assert_eq!(entry_status(&app, "bob").await, "FULFILLED");
    assert_eq!(pending_offers(&app).await, 0);

    // Accepted offers are never swept
    app.clock.advance(Duration::hours(1));
    let report = app.state.waitlist.sweep_expired_offers().await.unwrap();
    assert_eq!(report.expired, 0);
    assert_eq!(entry_status(&app, "carol").await, "PENDING");
}

/// (offer id, offered court) of the latest offer made to `user`.
async fn offered_court(app: &TestApp, user: &str) -> (String, Option<String>) {
    sqlx::query_as(
        "SELECT o.id, o.court_id FROM waitlist_offers o JOIN waitlist_entries e ON e.id = o.entry_id
         WHERE e.user_id = ? ORDER BY o.created_at DESC LIMIT 1"
    )
        .bind(user)
        .fetch_one(&app.pool).await.unwrap()
}

#[tokio::test]
async fn test_separate_releases_each_offer_their_own_court() {
    let app = TestApp::new().await;
    let (start, end) = (at(1, 10), at(1, 11));
    let first = hold(&app, "c1", start, end).await;
    let second = hold(&app, "c2", start, end).await;
    wait_for(&app, "alice", start, end).await;
    wait_for(&app, "bob", start, end).await;
    wait_for(&app, "carol", start, end).await;

    release(&app, &first).await;
    assert_eq!(pending_offers(&app).await, 1);
    assert_eq!(offered_court(&app, "alice").await.1.as_deref(), Some("c1"));

    release(&app, &second).await;
    assert_eq!(pending_offers(&app).await, 2);
    assert_eq!(offered_court(&app, "bob").await.1.as_deref(), Some("c2"));
    assert_eq!(entry_status(&app, "carol").await, "PENDING");
}

#[tokio::test]
async fn test_multi_court_release_offers_every_freed_court_in_sequence() {
    let app = TestApp::new().await;
    let (start, end) = (at(1, 10), at(1, 11));
    let held = hold_courts(&app, &["c1", "c2"], start, end).await;
    wait_for(&app, "alice", start, end).await;
    wait_for(&app, "bob", start, end).await;
    wait_for(&app, "carol", start, end).await;

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 2);
    let (alice_offer, alice_court) = offered_court(&app, "alice").await;
    let (_, bob_court) = offered_court(&app, "bob").await;
    assert_eq!(alice_court.as_deref(), Some("c1"));
    assert_eq!(bob_court.as_deref(), Some("c2"));
    assert_eq!(entry_status(&app, "carol").await, "PENDING");

    let booked = app.state.reservations.accept_offer(&member("alice"), FACILITY, &alice_offer, None).await.unwrap();
    assert_eq!(booked.court_ids, vec!["c1".to_string()]);

    // Bob lets c2 lapse: it moves on to carol, c1 stays booked
    app.clock.advance(Duration::minutes(31));
    let report = app.state.waitlist.sweep_expired_offers().await.unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(report.advanced, 1);
    let (carol_offer, carol_court) = offered_court(&app, "carol").await;
    assert_eq!(carol_court.as_deref(), Some("c2"));
    assert_eq!(pending_offers(&app).await, 1);

    let booked = app.state.reservations.accept_offer(&member("carol"), FACILITY, &carol_offer, None).await.unwrap();
    assert_eq!(booked.court_ids, vec!["c2".to_string()]);
    assert_eq!(entry_status(&app, "carol").await, "FULFILLED");
}

#[tokio::test]
async fn test_broadcast_multi_court_release_serves_two_members() {
    let app = TestApp::new().await;
    let staff_token = app.token("staff-1", ROLE_STAFF);
    let res = app.send("PUT", "/api/v1/club/waitlist/config", &staff_token, Some(json!({
        "enabled": true, "mode": "BROADCAST", "offer_expiry_minutes": 15,
    }))).await;
    assert_eq!(res.status(), StatusCode::OK);

    let (start, end) = (at(1, 10), at(1, 11));
    hold_courts(&app, &["c3", "c4", "c5", "c6"], start, end).await;
    let held = hold_courts(&app, &["c1", "c2"], start, end).await;
    wait_for(&app, "alice", start, end).await;
    wait_for(&app, "bob", start, end).await;
    wait_for(&app, "carol", start, end).await;

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 3);
    assert_eq!(offered_court(&app, "alice").await.1, None);

    let (alice_offer, _) = offered_court(&app, "alice").await;
    let (bob_offer, _) = offered_court(&app, "bob").await;
    let (carol_offer, _) = offered_court(&app, "carol").await;

    let alice = app.state.reservations.accept_offer(&member("alice"), FACILITY, &alice_offer, None).await.unwrap();
    let bob = app.state.reservations.accept_offer(&member("bob"), FACILITY, &bob_offer, None).await.unwrap();
    let mut booked = vec![alice.court_ids[0].clone(), bob.court_ids[0].clone()];
    booked.sort();
    assert_eq!(booked, vec!["c1".to_string(), "c2".to_string()]);

    // Both freed courts are gone now
    let err = app.state.reservations.accept_offer(&member("carol"), FACILITY, &carol_offer, None).await.unwrap_err();
    assert!(matches!(err.conflict_detail(), Some(ConflictDetail::SlotUnavailable { .. })));
}

#[tokio::test]
async fn test_broadcast_first_acceptance_wins() {
    let app = TestApp::new().await;
    let staff_token = app.token("staff-1", ROLE_STAFF);
    let res = app.send("PUT", "/api/v1/club/waitlist/config", &staff_token, Some(json!({
        "enabled": true, "mode": "BROADCAST", "offer_expiry_minutes": 15,
    }))).await;
    assert_eq!(res.status(), StatusCode::OK);

    let (start, end) = (at(1, 10), at(1, 11));
    hold_courts(&app, &["c2", "c3", "c4", "c5", "c6"], start, end).await;
    let held = hold(&app, "c1", start, end).await;
    wait_for(&app, "alice", start, end).await;
    wait_for(&app, "bob", start, end).await;

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 2);

    let (alice_offer, _) = offer_for(&app, "alice").await.unwrap();
    let (bob_offer, _) = offer_for(&app, "bob").await.unwrap();

    app.state.reservations.accept_offer(&member("alice"), FACILITY, &alice_offer, None).await.unwrap();
    let err = app.state.reservations.accept_offer(&member("bob"), FACILITY, &bob_offer, None).await.unwrap_err();
    assert!(matches!(err.conflict_detail(), Some(ConflictDetail::SlotUnavailable { .. })));

    // Someone else's offer cannot be taken
    let err = app.state.reservations.accept_offer(&member("alice"), FACILITY, &bob_offer, None).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_only_exact_slot_matches_are_offered() {
    let app = TestApp::new().await;
    let held = hold(&app, "c1", at(1, 10), at(1, 12)).await;
    wait_for(&app, "alice", at(1, 10), at(1, 11)).await;

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 0);
}

#[tokio::test]
async fn test_notification_window_limits_offers() {
    let app = TestApp::new().await;
    let staff_token = app.token("staff-1", ROLE_STAFF);
    let res = app.send("PUT", "/api/v1/club/waitlist/config", &staff_token, Some(json!({
        "enabled": true, "mode": "SEQUENTIAL", "offer_expiry_minutes": 30, "notification_window_hours": 12,
    }))).await;
    assert_eq!(res.status(), StatusCode::OK);

    let (start, end) = (at(1, 10), at(1, 11));
    let held = hold(&app, "c1", start, end).await;
    wait_for(&app, "alice", start, end).await;

    release(&app, &held).await;
    assert_eq!(pending_offers(&app).await, 0);
    assert_eq!(entry_status(&app, "alice").await, "PENDING");
}

#[tokio::test]
async fn test_join_rules() {
    let app = TestApp::new().await;
    let (start, end) = (at(1, 10), at(1, 11));
    let entry = wait_for(&app, "alice", start, end).await;

    let dup = app.state.waitlist.join(&member("alice"), FACILITY, JoinWaitlist {
        start, end, court_id: None, user_id: None,
    }).await.unwrap_err();
    assert_eq!(dup.conflict_detail(), Some(&ConflictDetail::AlreadyWaitlisted));

    let past = app.state.waitlist.join(&member("bob"), FACILITY, JoinWaitlist {
        start: at(0, 6), end: at(0, 7), court_id: None, user_id: None,
    }).await.unwrap_err();
    assert!(matches!(past, AppError::Validation(_)));

    let bob = app.token("bob", ROLE_MEMBER);
    let res = app.send("DELETE", &format!("/api/v1/club/waitlist/{}", entry.id), &bob, None).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let alice = app.token("alice", ROLE_MEMBER);
    let res = app.send("DELETE", &format!("/api/v1/club/waitlist/{}", entry.id), &alice, None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let staff_token = app.token("staff-1", ROLE_STAFF);
    app.send("PUT", "/api/v1/club/waitlist/config", &staff_token, Some(json!({
        "enabled": false, "mode": "SEQUENTIAL", "offer_expiry_minutes": 30,
    }))).await;
    let res = app.send("POST", "/api/v1/club/waitlist", &alice, Some(json!({ "start": start, "end": end }))).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_cancelled_open_play_session_feeds_the_waitlist() {
    let app = TestApp::new().await;
    let rule = app.state.open_play.create_rule(&staff(), FACILITY, CreateRule {
        name: "Drop-in".into(),
        kind: "OPEN_PLAY".into(),
        min_participants: 4,
        max_participants_per_court: 8,
        cancellation_cutoff_minutes: 120,
        auto_scale_enabled: true,
        min_courts: 1,
        max_courts: 2,
    }).await.unwrap();
    app.state.open_play.schedule_session(&staff(), FACILITY, ScheduleSession {
        rule_id: rule.id,
        start: at(1, 18),
        end: at(1, 20),
        court_ids: None,
    }).await.unwrap();
    wait_for(&app, "alice", at(1, 18), at(1, 20)).await;

    app.clock.set(at(1, 16) + Duration::minutes(30));
    let report = app.state.open_play.run_pass(app.clock.now()).await.unwrap();
    assert_eq!(report.cancelled, 1);

    assert_eq!(pending_offers(&app).await, 1);
    assert_eq!(entry_status(&app, "alice").await, "NOTIFIED");
}

#[tokio::test]
async fn test_cleanup_purges_past_entries() {
    let app = TestApp::new().await;
    wait_for(&app, "alice", at(1, 10), at(1, 11)).await;
    wait_for(&app, "bob", at(1, 10), at(1, 11)).await;
    wait_for(&app, "carol", at(2, 10), at(2, 11)).await;

    app.clock.set(at(1, 12));
    run_cleanup(&app.state).await;

    let left: Vec<String> = sqlx::query_scalar("SELECT user_id FROM waitlist_entries")
        .fetch_all(&app.pool).await.unwrap();
    assert_eq!(left, vec!["carol"]);
}
