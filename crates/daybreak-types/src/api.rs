use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims shared between token issuance (register/login) and the
/// bearer middleware. Canonical definition lives here in daybreak-types
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Alarms --

/// How often an alarm re-fires. Stored in SQLite as its lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Once,
    Daily,
    Weekly,
}

impl RepeatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RepeatMode::Once => "once",
            RepeatMode::Daily => "daily",
            RepeatMode::Weekly => "weekly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "once" => Some(RepeatMode::Once),
            "daily" => Some(RepeatMode::Daily),
            "weekly" => Some(RepeatMode::Weekly),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAlarmRequest {
    pub scheduled_time: DateTime<Utc>,
    pub repeat: RepeatMode,
}

/// Partial update: only provided fields are applied.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAlarmRequest {
    pub scheduled_time: Option<DateTime<Utc>>,
    pub repeat: Option<RepeatMode>,
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlarmResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub scheduled_time: DateTime<Utc>,
    pub repeat: RepeatMode,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Selfie attempts --

#[derive(Debug, Clone, Serialize)]
pub struct SelfieResponse {
    pub id: Uuid,
    pub alarm_id: Uuid,
    pub image_ref: String,
    pub brightness: u8,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Returned from a submission: the recorded attempt plus the analyzer's
/// human-readable explanation. `approved: false` is a successful outcome
/// ("rejected, try again"), distinct from a hard failure.
#[derive(Debug, Serialize)]
pub struct SubmitSelfieResponse {
    #[serde(flatten)]
    pub attempt: SelfieResponse,
    pub message: String,
}
