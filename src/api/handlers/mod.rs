pub mod availability;
pub mod feed;
pub mod health;
pub mod open_play;
pub mod package;
pub mod policy;
pub mod reservation;
pub mod waitlist;
