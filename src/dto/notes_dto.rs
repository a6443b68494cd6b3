use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteCreatedResponse {
    pub message: String,
    pub note_id: Uuid,
    pub original_filename: String,
    pub file_size: i64,
}
