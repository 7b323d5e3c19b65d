pub mod auth;
pub mod facility;
