use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

pub const KIND_VISIT: &str = "VISIT";
pub const KIND_LESSON: &str = "LESSON";

pub const PACKAGE_ACTIVE: &str = "ACTIVE";
pub const PACKAGE_EXPIRED: &str = "EXPIRED";
pub const PACKAGE_DEPLETED: &str = "DEPLETED";

/// A prepaid visit pack or lesson package.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Package {
    pub id: String,
    pub user_id: String,
    pub facility_id: String,
    pub kind: String,
    pub original_count: i32,
    pub remaining: i32,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Package {
    pub fn new(user_id: String, facility_id: String, kind: String, count: i32, expires_at: DateTime<Utc>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            facility_id,
            kind,
            original_count: count,
            remaining: count,
            expires_at,
            status: PACKAGE_ACTIVE.to_string(),
            created_at,
        }
    }

    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.status == PACKAGE_ACTIVE && self.expires_at > now && self.remaining > 0
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Redemption {
    pub id: String,
    pub package_id: String,
    pub facility_id: String,
    pub reservation_id: Option<String>,
    pub redeemed_at: DateTime<Utc>,
}

impl Redemption {
    pub fn new(package_id: String, facility_id: String, reservation_id: Option<String>, redeemed_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            package_id,
            facility_id,
            reservation_id,
            redeemed_at,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct PackageDetail {
    #[serde(flatten)]
    pub package: Package,
    pub redemptions: Vec<Redemption>,
}
