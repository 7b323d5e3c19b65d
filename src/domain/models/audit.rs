use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::FromRow;

pub const ACTOR_OPEN_PLAY: &str = "system:open_play";
pub const ACTOR_WAITLIST: &str = "system:waitlist";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    ScaleUp,
    ScaleDown,
    Cancelled,
    LessonCancelled,
    ClinicEnrollmentBelowMinimum,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::ScaleUp => "scale_up",
            NotificationType::ScaleDown => "scale_down",
            NotificationType::Cancelled => "cancelled",
            NotificationType::LessonCancelled => "lesson_cancelled",
            NotificationType::ClinicEnrollmentBelowMinimum => "clinic_enrollment_below_minimum",
        }
    }
}

/// Explains one automated decision or staff override. Never updated.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct AuditLogEntry {
    pub id: String,
    pub facility_id: String,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub details: Json<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn new(
        facility_id: &str,
        actor: &str,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        details: serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            actor: actor.to_string(),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            details: Json(details),
            created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct StaffNotification {
    pub id: String,
    pub facility_id: String,
    pub notification_type: String,
    pub message: String,
    pub entity_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StaffNotification {
    pub fn new(facility_id: &str, notification_type: NotificationType, message: String, entity_id: Option<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            facility_id: facility_id.to_string(),
            notification_type: notification_type.as_str().to_string(),
            message,
            entity_id,
            created_at,
        }
    }
}
