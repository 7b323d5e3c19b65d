//! Runs only when DATABASE_URL points at PostgreSQL.

mod common;

use chrono::{Duration, Utc};
use common::{ISSUER, AUDIENCE};
use court_booking::{
    config::Config,
    domain::models::auth::{Actor, ROLE_STAFF},
    domain::services::clock::FixedClock,
    domain::services::reservation_service::CreateReservation,
    domain::services::waitlist_service::JoinWaitlist,
    error::ConflictDetail,
    infra::factory::{postgres_repositories, run_postgres_migrations},
    state::AppState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use uuid::Uuid;

async fn setup() -> Option<(Arc<AppState>, String)> {
    let url = std::env::var("DATABASE_URL").ok()?;
    if !url.starts_with("postgres") {
        return None;
    }

    let pool = PgPoolOptions::new().max_connections(10).connect(&url).await.unwrap();
    run_postgres_migrations(&pool).await;

    let facility_id = format!("pg-{}", Uuid::new_v4());
    let now = Utc::now();
    sqlx::query("INSERT INTO facilities (id, name, timezone, created_at) VALUES ($1, 'PG club', 'UTC', $2)")
        .bind(&facility_id).bind(now)
        .execute(&pool).await.unwrap();
    for court in ["a", "b"] {
        sqlx::query("INSERT INTO courts (id, facility_id, name, created_at) VALUES ($1, $2, $3, $4)")
            .bind(format!("{}-{}", facility_id, court)).bind(&facility_id).bind(court).bind(now)
            .execute(&pool).await.unwrap();
    }

    let config = Config {
        database_url: url,
        port: 0,
        jwt_public_key: include_str!("../tests/keys/test_public.pem").to_string(),
        auth_issuer: ISSUER.to_string(),
        auth_audience: AUDIENCE.to_string(),
        enforcement_interval_secs: 300,
        waitlist_sweep_interval_secs: 60,
        cleanup_interval_secs: 3600,
        sweep_batch_size: 50,
        log_dir: "./logs".to_string(),
    };
    let clock = Arc::new(FixedClock::new(now));
    Some((Arc::new(AppState::build(config, postgres_repositories(pool), clock)), facility_id))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_concurrent_creates_have_one_winner() {
    let Some((state, facility_id)) = setup().await else {
        println!("Skipping: DATABASE_URL is not PostgreSQL");
        return;
    };
    let staff = Actor::new("staff-pg", ROLE_STAFF, &facility_id);
    let start = state.clock.now() + Duration::days(3);
    let courts = vec![format!("{}-a", facility_id), format!("{}-b", facility_id)];

    let mut handles = Vec::new();
    for i in 0..24 {
        let svc = state.reservations.clone();
        let staff = staff.clone();
        let facility_id = facility_id.clone();
        let courts = courts.clone();
        handles.push(tokio::spawn(async move {
            svc.create(&staff, &facility_id, CreateReservation {
                court_ids: courts,
                start,
                end: start + Duration::hours(1),
                reservation_type: None,
                primary_user_id: Some(format!("pg-player-{}", i)),
                participant_ids: Vec::new(),
                pro_id: None,
                package_id: None,
                notes: None,
            }).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e.conflict_detail(), Some(ConflictDetail::SlotUnavailable { .. })), "{}", e),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_postgres_waitlist_positions_are_unique() {
    let Some((state, facility_id)) = setup().await else {
        println!("Skipping: DATABASE_URL is not PostgreSQL");
        return;
    };
    let start = state.clock.now() + Duration::days(2);

    let mut handles = Vec::new();
    for i in 0..12 {
        let svc = state.waitlist.clone();
        let facility_id = facility_id.clone();
        handles.push(tokio::spawn(async move {
            let actor = Actor::new(&format!("pg-waiter-{}", i), "MEMBER", &facility_id);
            svc.join(&actor, &facility_id, JoinWaitlist {
                start,
                end: start + Duration::hours(1),
                court_id: None,
                user_id: None,
            }).await
        }));
    }

    let mut positions = Vec::new();
    for handle in handles {
        positions.push(handle.await.unwrap().unwrap().position);
    }
    positions.sort();
    assert_eq!(positions, (1..=12).collect::<Vec<i32>>());
}
