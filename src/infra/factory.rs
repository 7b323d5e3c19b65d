use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sqlx::{postgres::{PgPoolOptions, PgConnectOptions}, sqlite::{SqlitePoolOptions, SqliteJournalMode, SqliteConnectOptions}};
use sqlx::{PgPool, SqlitePool, ConnectOptions};
use tracing::info;
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::state::{AppState, Repositories};
use crate::domain::services::clock::{Clock, SystemClock};
use crate::infra::repositories::{
    postgres_facility_repo::PostgresFacilityRepo, postgres_reservation_repo::PostgresReservationRepo,
    postgres_policy_repo::PostgresPolicyRepo, postgres_open_play_repo::PostgresOpenPlayRepo,
    postgres_waitlist_repo::PostgresWaitlistRepo, postgres_package_repo::PostgresPackageRepo,
    postgres_audit_repo::PostgresAuditRepo,
    sqlite_facility_repo::SqliteFacilityRepo, sqlite_reservation_repo::SqliteReservationRepo,
    sqlite_policy_repo::SqlitePolicyRepo, sqlite_open_play_repo::SqliteOpenPlayRepo,
    sqlite_waitlist_repo::SqliteWaitlistRepo, sqlite_package_repo::SqlitePackageRepo,
    sqlite_audit_repo::SqliteAuditRepo,
};

const SLOW_QUERY: Duration = Duration::from_millis(500);

fn is_postgres(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

/// Connects to whichever backend `DATABASE_URL` names, migrates it, and wires the services.
pub async fn bootstrap_state(config: &Config) -> AppState {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let repos = if is_postgres(&config.database_url) {
        let pool = connect_postgres(&config.database_url).await;
        run_postgres_migrations(&pool).await;
        postgres_repositories(pool)
    } else {
        let pool = connect_sqlite(&config.database_url).await;
        run_sqlite_migrations(&pool).await;
        sqlite_repositories(pool)
    };

    AppState::build(config.clone(), repos, clock)
}

async fn connect_postgres(url: &str) -> PgPool {
    info!("Opening PostgreSQL pool");
    let opts = url
        .parse::<PgConnectOptions>()
        .expect("DATABASE_URL is not a valid Postgres URL")
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, SLOW_QUERY);

    PgPoolOptions::new()
        .max_connections(10)
        .connect_with(opts)
        .await
        .expect("Could not reach Postgres")
}

// Booking writes take the database lock first, so contending writers queue on busy_timeout.
async fn connect_sqlite(url: &str) -> SqlitePool {
    info!("Opening SQLite pool (WAL)");
    let opts = SqliteConnectOptions::from_str(url)
        .expect("DATABASE_URL is not a valid SQLite URL")
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, SLOW_QUERY);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .expect("Could not open SQLite database")
}

pub fn postgres_repositories(pool: PgPool) -> Repositories {
    Repositories {
        facility_repo: Arc::new(PostgresFacilityRepo::new(pool.clone())),
        reservation_repo: Arc::new(PostgresReservationRepo::new(pool.clone())),
        policy_repo: Arc::new(PostgresPolicyRepo::new(pool.clone())),
        open_play_repo: Arc::new(PostgresOpenPlayRepo::new(pool.clone())),
        waitlist_repo: Arc::new(PostgresWaitlistRepo::new(pool.clone())),
        package_repo: Arc::new(PostgresPackageRepo::new(pool.clone())),
        audit_repo: Arc::new(PostgresAuditRepo::new(pool)),
    }
}

pub fn sqlite_repositories(pool: SqlitePool) -> Repositories {
    Repositories {
        facility_repo: Arc::new(SqliteFacilityRepo::new(pool.clone())),
        reservation_repo: Arc::new(SqliteReservationRepo::new(pool.clone())),
        policy_repo: Arc::new(SqlitePolicyRepo::new(pool.clone())),
        open_play_repo: Arc::new(SqliteOpenPlayRepo::new(pool.clone())),
        waitlist_repo: Arc::new(SqliteWaitlistRepo::new(pool.clone())),
        package_repo: Arc::new(SqlitePackageRepo::new(pool.clone())),
        audit_repo: Arc::new(SqliteAuditRepo::new(pool)),
    }
}

pub async fn run_postgres_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .expect("Postgres migrations failed");
}

pub async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .expect("SQLite migrations failed");
}
