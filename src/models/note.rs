use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: Uuid,
    pub lecturer_id: Uuid,
    pub course_id: Uuid,
    pub unit_id: Uuid,
    pub title: String,
    pub description: String,
    pub original_filename: String,
    pub stored_filename: String,
    #[serde(skip_serializing)]
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
