use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Extension, Json,
};
use serde_json::json;
use validator::Validate;

use crate::{
    dto::auth_dto::{
        AccessTokenResponse, LoginRequest, RefreshRequest, RegisterStudentRequest,
        ResetPasswordRequest, TokenResponse, VerifyEmailRequest,
    },
    error::{Error, Result},
    extract::ApiJson,
    middleware::auth::{cookie_value, ACCESS_COOKIE, REFRESH_COOKIE},
    utils::jwt::Claims,
    AppState,
};

fn set_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    )
}

fn clear_cookie(name: &str) -> String {
    set_cookie(name, "", 0)
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued and cookies set", body = TokenResponse),
        (status = 401, description = "Invalid email or password")
    )
)]
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let issued = state
        .auth_service
        .login(&payload.email, &payload.password)
        .await?;
    let config = crate::config::get_config();
    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            set_cookie(
                ACCESS_COOKIE,
                &issued.access_token,
                config.access_token_ttl_minutes * 60,
            ),
        ),
        (
            header::SET_COOKIE,
            set_cookie(
                REFRESH_COOKIE,
                &issued.refresh_token,
                config.refresh_token_ttl_days * 24 * 60 * 60,
            ),
        ),
    ]);
    Ok((StatusCode::OK, cookies, Json(issued.into_token_response())))
}

#[axum::debug_handler]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<RefreshRequest>>,
) -> Result<impl IntoResponse> {
    let token = body
        .and_then(|Json(b)| b.refresh_token)
        .filter(|t| !t.trim().is_empty())
        .or_else(|| cookie_value(&headers, REFRESH_COOKIE))
        .ok_or_else(|| Error::Unauthorized("Missing refresh token".into()))?;
    let access_token = state.auth_service.refresh(&token).await?;
    let ttl = crate::config::get_config().access_token_ttl_minutes * 60;
    Ok((
        AppendHeaders([(header::SET_COOKIE, set_cookie(ACCESS_COOKIE, &access_token, ttl))]),
        Json(AccessTokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
        }),
    ))
}

/// Revokes the presented access token, and the refresh cookie when one is
/// sent along.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
) -> Result<impl IntoResponse> {
    state.auth_service.revoke(&claims).await?;
    if let Some(refresh) = cookie_value(&headers, REFRESH_COOKIE) {
        if let Ok(refresh_claims) = state.auth_service.decode(&refresh) {
            state.auth_service.revoke(&refresh_claims).await?;
        }
    }
    Ok((
        AppendHeaders([
            (header::SET_COOKIE, clear_cookie(ACCESS_COOKIE)),
            (header::SET_COOKIE, clear_cookie(REFRESH_COOKIE)),
        ]),
        Json(json!({ "message": "Successfully logged out" })),
    ))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let profile = state.user_service.profile(&claims).await?;
    Ok(Json(profile))
}

#[axum::debug_handler]
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    state
        .auth_service
        .reset_password(&claims, &payload.email, &payload.new_password)
        .await?;
    Ok(Json(json!({ "message": "Password reset successfully" })))
}

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RegisterStudentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let email = payload.email.trim().to_lowercase();
    state.auth_service.request_registration(payload).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": "Verification code sent. Confirm your email to finish registration",
            "email": email,
        })),
    ))
}

#[axum::debug_handler]
pub async fn verify_email(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let student = state
        .auth_service
        .verify_registration(&payload.email, &payload.code)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Email verified. You can now log in",
            "student_id": student.id,
            "user_id": student.user_id,
        })),
    ))
}
