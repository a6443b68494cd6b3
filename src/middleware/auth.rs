use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::Error;
use crate::models::user::Role;
use crate::utils::jwt::TokenType;
use crate::AppState;

pub const ACCESS_COOKIE: &str = "access_token_cookie";
pub const REFRESH_COOKIE: &str = "refresh_token_cookie";

/// Set on the response of every authenticated request so outer layers can
/// log who made it.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Uuid);

pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// The bearer token when present, otherwise the access cookie.
pub fn presented_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    bearer.or_else(|| cookie_value(headers, ACCESS_COOKIE))
}

async fn authorize(state: &AppState, mut req: Request, next: Next, allowed: &[Role]) -> Response {
    let Some(token) = presented_token(req.headers()) else {
        return Error::Unauthorized("Missing authorization token".into()).into_response();
    };
    let claims = match state.auth_service.decode(&token) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };
    if claims.token_type != TokenType::Access {
        return Error::Unauthorized("An access token is required".into()).into_response();
    }
    if !allowed.is_empty() && !allowed.contains(&claims.role) {
        tracing::warn!(
            sub = %claims.sub,
            role = %claims.role,
            path = %req.uri().path(),
            "Role not allowed for route"
        );
        return Error::Forbidden("You do not have permission to access this resource".into())
            .into_response();
    }
    match state.auth_service.is_revoked(&claims.jti).await {
        Ok(false) => {}
        Ok(true) => return Error::Unauthorized("Token has been revoked".into()).into_response(),
        Err(e) => return e.into_response(),
    }

    let user_id = claims.user_id().ok();
    req.extensions_mut().insert(claims);
    let mut response = next.run(req).await;
    if let Some(id) = user_id {
        response.extensions_mut().insert(AuthenticatedUser(id));
    }
    response
}

pub async fn require_authenticated(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[]).await
}

pub async fn require_admin(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Admin]).await
}

pub async fn require_lecturer(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Lecturer]).await
}

pub async fn require_student(State(state): State<AppState>, req: Request, next: Next) -> Response {
    authorize(&state, req, next, &[Role::Student]).await
}

pub async fn require_lecturer_or_student(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    authorize(&state, req, next, &[Role::Lecturer, Role::Student]).await
}
