pub mod audit;
pub mod auth;
pub mod cancellation;
pub mod facility;
pub mod open_play;
pub mod package;
pub mod reservation;
pub mod waitlist;
