use std::env;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub jwt_public_key: String, // Public key of the identity service (Ed25519 PEM)
    pub auth_issuer: String,
    pub auth_audience: String,
    pub enforcement_interval_secs: u64,
    pub waitlist_sweep_interval_secs: u64,
    pub cleanup_interval_secs: u64,
    pub sweep_batch_size: i64,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().expect("PORT must be a number"),
            jwt_public_key: env::var("JWT_PUBLIC_KEY").expect("JWT_PUBLIC_KEY must be set (Ed25519 Public Key)"),
            auth_issuer: env::var("AUTH_ISSUER").unwrap_or_else(|_| "https://identity.courts.local".to_string()),
            auth_audience: env::var("AUTH_AUDIENCE").unwrap_or_else(|_| "court-booking".to_string()),
            enforcement_interval_secs: parse_secs("ENFORCEMENT_INTERVAL_SECS", 300),
            waitlist_sweep_interval_secs: parse_secs("WAITLIST_SWEEP_INTERVAL_SECS", 60),
            cleanup_interval_secs: parse_secs("CLEANUP_INTERVAL_SECS", 3600),
            sweep_batch_size: env::var("SWEEP_BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(50),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string()),
        }
    }
}

fn parse_secs(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or_else(|_| panic!("{} must be a number of seconds", key)),
        Err(_) => default,
    }
}
