use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::identity_dto::{
        CreateCourseRequest, CreateStudentRequest, CreateUnitRequest, EnrollStudentRequest,
        UpdateCourseRequest, UpdateStudentRequest, UpdateUnitRequest,
    },
    error::{Error, Result},
    extract::ApiJson,
    utils::jwt::Claims,
    AppState,
};

#[axum::debug_handler]
pub async fn create_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateCourseRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let course = state
        .course_service
        .create_course(claims.user_id()?, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(course)))
}

#[axum::debug_handler]
pub async fn list_courses(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.course_service.list_courses(claims.user_id()?).await?))
}

#[axum::debug_handler]
pub async fn get_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .course_service
            .get_owned_course(claims.user_id()?, id)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn update_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateCourseRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(
        state
            .course_service
            .update_course(claims.user_id()?, id, payload)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn delete_course(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .course_service
        .delete_course(claims.user_id()?, id)
        .await?;
    Ok(Json(json!({ "message": "Course deleted" })))
}

#[axum::debug_handler]
pub async fn create_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateUnitRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let unit = state
        .course_service
        .create_unit(claims.user_id()?, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

#[axum::debug_handler]
pub async fn list_units(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .course_service
            .list_lecturer_units(claims.user_id()?)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn get_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .course_service
            .get_lecturer_unit(claims.user_id()?, id)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn update_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateUnitRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(
        state
            .course_service
            .update_unit(claims.user_id()?, id, payload)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn delete_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .course_service
        .delete_unit(claims.user_id()?, id)
        .await?;
    Ok(Json(json!({ "message": "Unit deleted" })))
}

#[axum::debug_handler]
pub async fn create_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateStudentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let student = state
        .user_service
        .create_student(claims.user_id()?, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(student)))
}

#[axum::debug_handler]
pub async fn list_students(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .user_service
            .list_students_for_lecturer(claims.user_id()?)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.user_service.get_student(id).await?))
}

#[axum::debug_handler]
pub async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<UpdateStudentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.user_service.update_student(id, payload).await?))
}

#[axum::debug_handler]
pub async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state.user_service.delete_student(id).await?;
    Ok(Json(json!({ "message": "Student deleted" })))
}

#[axum::debug_handler]
pub async fn enroll_student(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(unit_id): Path<Uuid>,
    ApiJson(payload): ApiJson<EnrollStudentRequest>,
) -> Result<impl IntoResponse> {
    let unit = state
        .course_service
        .enroll_student(claims.user_id()?, unit_id, payload.student_id)
        .await
        .map_err(|e| match e {
            Error::Conflict(_) => Error::Conflict("Student already registered in this unit".into()),
            other => other,
        })?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Student enrolled",
            "unit_id": unit.id,
            "student_id": payload.student_id,
        })),
    ))
}
