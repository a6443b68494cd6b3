use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    dto::notes_dto::NoteCreatedResponse,
    error::{Error, Result},
    services::notes_service::NoteUpload,
    utils::jwt::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/bd/units/{id}/notes",
    params(("id" = Uuid, Path, description = "Unit ID")),
    request_body(content = serde_json::Value, content_type = "multipart/form-data", description = "`title`, optional `description` and a `file` (pdf, doc, docx, ppt, pptx)"),
    responses(
        (status = 201, description = "Note stored", body = NoteCreatedResponse),
        (status = 400, description = "Missing title or unsupported file"),
        (status = 403, description = "Caller does not teach the unit")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn upload_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(unit_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut title = String::new();
    let mut description = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(Error::Multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = field.text().await.map_err(Error::Multipart)?,
            "description" => description = field.text().await.map_err(Error::Multipart)?,
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(Error::Multipart)?;
                file = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let Some((filename, data)) = file.filter(|(name, _)| !name.is_empty()) else {
        return Err(Error::BadRequest("No file selected".into()));
    };
    let note = state
        .notes_service
        .upload_note(
            claims.user_id()?,
            unit_id,
            NoteUpload {
                title,
                description,
                filename,
                data,
            },
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(NoteCreatedResponse {
            message: "Note uploaded successfully".to_string(),
            note_id: note.id,
            original_filename: note.original_filename,
            file_size: note.file_size,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_unit_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(unit_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state.notes_service.list_unit_notes(&claims, unit_id).await?,
    ))
}

#[axum::debug_handler]
pub async fn list_lecturer_notes(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .notes_service
            .list_lecturer_notes(claims.user_id()?)
            .await?,
    ))
}

/// Streams the stored file under its original name.
#[axum::debug_handler]
pub async fn download_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let note = state.notes_service.note_for_download(&claims, id).await?;
    let file = match tokio::fs::File::open(&note.file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(note_id = %id, path = %note.file_path, "Note file missing on disk");
            return Err(Error::NotFound("Note file not found".into()));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let disposition = format!(
        "attachment; filename=\"{}\"",
        note.original_filename
            .replace(|c: char| matches!(c, '"' | '\\') || c.is_control(), "_")
    );
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, note.mime_type.clone()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    ))
}

#[axum::debug_handler]
pub async fn delete_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .notes_service
        .delete_note(claims.user_id()?, id)
        .await?;
    Ok(Json(json!({ "message": "Note deleted successfully" })))
}
