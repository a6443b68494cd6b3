use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::note::Note;
use crate::models::user::Role;
use crate::services::course_service::CourseService;
use crate::services::storage_service::StorageService;
use crate::services::user_service::UserService;
use crate::utils::jwt::Claims;

pub struct NoteUpload {
    pub title: String,
    pub description: String,
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Clone)]
pub struct NotesService {
    pool: PgPool,
    storage: StorageService,
}

impl NotesService {
    pub fn new(pool: PgPool, storage: StorageService) -> Self {
        Self { pool, storage }
    }

    fn courses(&self) -> CourseService {
        CourseService::new(self.pool.clone(), self.storage.clone())
    }

    pub async fn upload_note(&self, lecturer_user_id: Uuid, unit_id: Uuid, upload: NoteUpload) -> Result<Note> {
        if upload.title.trim().is_empty() {
            return Err(Error::BadRequest("title is required".into()));
        }
        let unit = self.courses().get_lecturer_unit(lecturer_user_id, unit_id).await?;
        let stored = self
            .storage
            .save_note(unit.course_id, unit.id, &upload.filename, &upload.data)
            .await?;

        let inserted = sqlx::query_as::<_, Note>(
            r#"
            INSERT INTO notes (
                id, lecturer_id, course_id, unit_id, title, description,
                original_filename, stored_filename, file_path, file_size, file_type, mime_type
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(lecturer_user_id)
        .bind(unit.course_id)
        .bind(unit.id)
        .bind(upload.title.trim())
        .bind(upload.description.trim())
        .bind(&stored.original_filename)
        .bind(&stored.stored_filename)
        .bind(stored.path_string())
        .bind(stored.size)
        .bind(&stored.extension)
        .bind(stored.mime_type)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(note) => {
                tracing::info!(note_id = %note.id, unit_id = %unit.id, size = note.file_size, "Note uploaded");
                Ok(note)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.remove(&stored.path).await {
                    tracing::error!(error = %cleanup, "Failed to remove orphaned note file");
                }
                Err(e.into())
            }
        }
    }

    /// Lecturers who teach the unit and enrolled students may read its notes.
    async fn ensure_unit_access(&self, claims: &Claims, unit_id: Uuid) -> Result<()> {
        let courses = self.courses();
        courses.get_unit(unit_id).await?;
        let user_id = claims.user_id()?;
        let allowed = match claims.role {
            Role::Admin => true,
            Role::Lecturer => courses.lecturer_can_access_unit(user_id, unit_id).await?,
            Role::Student => {
                let student = UserService::new(self.pool.clone(), self.storage.clone())
                    .find_student_by_user(user_id)
                    .await?;
                courses.student_is_enrolled(student.id, unit_id).await?
            }
        };
        if !allowed {
            tracing::warn!(unit_id = %unit_id, user_id = %user_id, "Notes listing refused");
            return Err(Error::Forbidden("You do not have access to this unit".into()));
        }
        Ok(())
    }

    pub async fn list_unit_notes(&self, claims: &Claims, unit_id: Uuid) -> Result<Vec<Note>> {
        self.ensure_unit_access(claims, unit_id).await?;
        let notes = sqlx::query_as::<_, Note>(
            "SELECT * FROM notes WHERE unit_id = $1 ORDER BY created_at DESC",
        )
        .bind(unit_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    pub async fn list_lecturer_notes(&self, lecturer_user_id: Uuid) -> Result<Vec<Note>> {
        let notes = sqlx::query_as::<_, Note>(
            "SELECT * FROM notes WHERE lecturer_id = $1 ORDER BY created_at DESC",
        )
        .bind(lecturer_user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(notes)
    }

    pub async fn get_note(&self, id: Uuid) -> Result<Note> {
        sqlx::query_as::<_, Note>("SELECT * FROM notes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Note not found".into()))
    }

    pub async fn note_for_download(&self, claims: &Claims, id: Uuid) -> Result<Note> {
        let note = self.get_note(id).await?;
        let is_owner = claims.role == Role::Lecturer && claims.user_id()? == note.lecturer_id;
        if !is_owner {
            self.ensure_unit_access(claims, note.unit_id).await?;
        }
        Ok(note)
    }

    /// Removes the file first; the row is only deleted once the file is gone.
    pub async fn delete_note(&self, lecturer_user_id: Uuid, id: Uuid) -> Result<()> {
        let note = self.get_note(id).await?;
        if note.lecturer_id != lecturer_user_id {
            tracing::warn!(note_id = %id, user_id = %lecturer_user_id, "Note deletion refused");
            return Err(Error::Forbidden("You can only delete your own notes".into()));
        }
        self.storage.remove(&note.file_path).await?;
        sqlx::query("DELETE FROM notes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        tracing::info!(note_id = %id, "Note deleted");
        Ok(())
    }
}
