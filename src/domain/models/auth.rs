use serde::{Deserialize, Serialize};

pub const ROLE_MEMBER: &str = "MEMBER";
pub const ROLE_STAFF: &str = "STAFF";
pub const ROLE_ADMIN: &str = "ADMIN";

/// Access token claims issued by the external identity service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: usize,
    pub iat: usize,

    #[serde(rename = "https://courts.example/claims/role")]
    pub role: String,

    #[serde(rename = "https://courts.example/claims/facility_id")]
    pub facility_id: String,

    #[serde(rename = "https://courts.example/claims/csrf", default)]
    pub csrf_token: Option<String>,
}

/// The authenticated caller of a core operation.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub user_id: String,
    pub role: String,
    pub facility_id: String,
}

impl Actor {
    pub fn new(user_id: &str, role: &str, facility_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            role: role.to_string(),
            facility_id: facility_id.to_string(),
        }
    }

    pub fn is_staff(&self) -> bool {
        self.role == ROLE_STAFF || self.role == ROLE_ADMIN
    }

    /// Staff rights only apply inside the staff member's home facility.
    pub fn is_staff_of(&self, facility_id: &str) -> bool {
        self.is_staff() && self.facility_id == facility_id
    }
}
