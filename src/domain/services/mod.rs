pub mod availability;
pub mod cancellation_policy;
pub mod clock;
pub mod open_play_service;
pub mod redemption_ledger;
pub mod reservation_service;
pub mod waitlist_service;
