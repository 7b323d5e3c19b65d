pub mod sqlite_tx;
pub mod sqlite_facility_repo;
pub mod sqlite_reservation_repo;
pub mod sqlite_policy_repo;
pub mod sqlite_open_play_repo;
pub mod sqlite_waitlist_repo;
pub mod sqlite_package_repo;
pub mod sqlite_audit_repo;

pub mod postgres_tx;
pub mod postgres_facility_repo;
pub mod postgres_reservation_repo;
pub mod postgres_policy_repo;
pub mod postgres_open_play_repo;
pub mod postgres_waitlist_repo;
pub mod postgres_package_repo;
pub mod postgres_audit_repo;
