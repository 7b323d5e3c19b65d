#![allow(dead_code)]

use court_booking::{
    api::router::create_router,
    config::Config,
    domain::models::auth::{Actor, Claims, ROLE_MEMBER, ROLE_STAFF},
    domain::services::clock::FixedClock,
    infra::factory::{run_sqlite_migrations, sqlite_repositories},
    state::AppState,
};
use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::Value;
use sqlx::{sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, Pool, Sqlite};
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const FACILITY: &str = "club";
pub const STAFF: &str = "staff-1";
pub const ISSUER: &str = "https://identity.courts.local";
pub const AUDIENCE: &str = "court-booking";

/// Monday 2030-06-03 08:00 UTC. Every test starts its clock here.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 6, 3, 8, 0, 0).unwrap()
}

/// `days` after the base date at `hour`:00 UTC.
pub fn at(days: i64, hour: u32) -> DateTime<Utc> {
    let day = base_time().date_naive() + Duration::days(days);
    Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
}

pub fn staff() -> Actor {
    Actor::new(STAFF, ROLE_STAFF, FACILITY)
}

pub fn member(user_id: &str) -> Actor {
    Actor::new(user_id, ROLE_MEMBER, FACILITY)
}

pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
    pub clock: Arc<FixedClock>,
}

impl TestApp {
    /// Fresh database with facility `club` and courts c1..c6.
    pub async fn new() -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        run_sqlite_migrations(&pool).await;

        let config = Config {
            database_url: db_url.clone(),
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

        let clock = Arc::new(FixedClock::new(base_time()));
        let state = Arc::new(AppState::build(config, sqlite_repositories(pool.clone()), clock.clone()));
        let router = create_router(state.clone());

        let app = Self { router, pool, db_filename, state, clock };
        app.seed_facility(FACILITY, &["c1", "c2", "c3", "c4", "c5", "c6"]).await;
        app
    }

    pub async fn seed_facility(&self, facility_id: &str, courts: &[&str]) {
        sqlx::query("INSERT INTO facilities (id, name, timezone, created_at) VALUES (?, ?, 'UTC', ?)")
            .bind(facility_id)
            .bind(format!("Facility {}", facility_id))
            .bind(base_time())
            .execute(&self.pool)
            .await
            .unwrap();

        for court in courts {
            sqlx::query("INSERT INTO courts (id, facility_id, name, created_at) VALUES (?, ?, ?, ?)")
                .bind(court)
                .bind(facility_id)
                .bind(court.to_uppercase())
                .bind(base_time())
                .execute(&self.pool)
                .await
                .unwrap();
        }
    }

    pub async fn set_member_limit(&self, limit: Option<i32>) {
        sqlx::query("UPDATE facilities SET max_member_reservations = ? WHERE id = ?")
            .bind(limit)
            .bind(FACILITY)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    pub async fn set_court_status(&self, court_id: &str, status: &str) {
        sqlx::query("UPDATE courts SET status = ? WHERE id = ?")
            .bind(status)
            .bind(court_id)
            .execute(&self.pool)
            .await
            .unwrap();
    }

    /// Signs an access token the way the identity service does.
    pub fn token(&self, user_id: &str, role: &str) -> String {
        self.token_for(user_id, role, FACILITY)
    }

    pub fn token_for(&self, user_id: &str, role: &str, facility_id: &str) -> String {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            iss: ISSUER.to_string(),
            sub: user_id.to_string(),
            aud: AUDIENCE.to_string(),
            exp: now + 3600,
            iat: now,
            role: role.to_string(),
            facility_id: facility_id.to_string(),
            csrf_token: Some(format!("csrf-{}", user_id)),
        };
        let key = EncodingKey::from_ed_pem(include_bytes!("../tests/keys/test_private.pem")).unwrap();
        encode(&Header::new(Algorithm::EdDSA), &claims, &key).unwrap()
    }

    pub async fn send(&self, method: &str, uri: &str, token: &str, body: Option<Value>) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn notification_types(&self) -> Vec<String> {
        sqlx::query_scalar("SELECT notification_type FROM staff_notifications WHERE facility_id = ? ORDER BY created_at, id")
            .bind(FACILITY)
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }

    pub async fn audit_actions(&self) -> Vec<String> {
        sqlx::query_scalar("SELECT action FROM audit_log WHERE facility_id = ? ORDER BY created_at, id")
            .bind(FACILITY)
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
        let _ = std::fs::remove_file(format!("{}-wal", self.db_filename));
        let _ = std::fs::remove_file(format!("{}-shm", self.db_filename));
    }
}

pub async fn parse_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
