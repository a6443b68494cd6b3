use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use serde_json::json;
use validator::Validate;

use crate::{
    dto::identity_dto::{JoinUnitRequest, UpdateProfileRequest},
    error::Result,
    extract::ApiJson,
    utils::jwt::Claims,
    AppState,
};

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.user_service.profile(&claims).await?))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(state.user_service.update_profile(&claims, payload).await?))
}

#[axum::debug_handler]
pub async fn join_unit(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<JoinUnitRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;
    let unit = state
        .course_service
        .join_unit(student.id, &payload.join_code)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Joined unit successfully",
            "unit": unit,
        })),
    ))
}
