use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::identity_dto::{
        AssignUnitRequest, CreateLecturerRequest, LecturerCreatedResponse, UpdateLecturerRequest,
    },
    error::Result,
    extract::ApiJson,
    AppState,
};

#[axum::debug_handler]
pub async fn create_lecturer(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateLecturerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (account, temporary_password) = state.user_service.create_lecturer(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(LecturerCreatedResponse {
            lecturer: account.lecturer,
            email: account.email,
            temporary_password,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_lecturers(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.user_service.list_lecturers().await?))
}

#[axum::debug_handler]
pub async fn get_lecturer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.user_service.get_lecturer(id).await?))
}

#[axum::debug_handler]
pub async fn update_lecturer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateLecturerRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.user_service.update_lecturer(id, payload).await?))
}

#[axum::debug_handler]
pub async fn delete_lecturer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.user_service.delete_lecturer(id).await?;
    Ok(Json(json!({ "message": "Lecturer deleted" })))
}

#[axum::debug_handler]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.user_service.delete_user(id).await?;
    Ok(Json(json!({ "message": "User deleted" })))
}

#[axum::debug_handler]
pub async fn assign_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<AssignUnitRequest>,
) -> Result<impl IntoResponse> {
    state.user_service.assign_lecturer_unit(id, payload.unit_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Lecturer assigned to unit" })),
    ))
}

#[axum::debug_handler]
pub async fn analytics(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.user_service.analytics().await?))
}
