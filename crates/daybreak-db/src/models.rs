/// Database row types — these map directly to SQLite rows.
/// Timestamps stay as the RFC 3339 strings they were written as;
/// the engine converts them to API types.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct AlarmRow {
    pub id: String,
    pub owner_id: String,
    pub scheduled_time: String,
    pub repeat: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct SelfieRow {
    pub id: String,
    pub alarm_id: String,
    pub image_ref: String,
    pub brightness: i64,
    pub approved: bool,
    pub created_at: String,
}
