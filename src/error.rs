use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("File error: {0}")]
    File(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Question generation failed: {0}")]
    Generation(AiError),

    #[error("Grading failed: {0}")]
    Grading(AiError),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Excel export error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

/// Failures of the external text-generation service, either in transport or
/// in the shape of what it sent back.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AiError {
    #[error("AI service request failed: {0}")]
    Transport(String),

    #[error("AI service did not answer within {0} seconds")]
    Timeout(u64),

    #[error("AI service returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("No response from AI model")]
    NoResponse,

    #[error("No JSON object found in model response")]
    NoJsonObject,

    #[error("Unable to parse JSON from model response: {0}")]
    InvalidJson(String),

    #[error("Model output violates the question schema: {0}")]
    SchemaViolation(String),

    #[error("Score '{0}' is not a valid number")]
    NonNumericScore(String),

    #[error("Score {score} out of bounds (0-{marks})")]
    ScoreOutOfBounds { score: f64, marks: f64 },
}

impl AiError {
    pub fn code(&self) -> &'static str {
        match self {
            AiError::Transport(_) => "upstream_unreachable",
            AiError::Timeout(_) => "timeout",
            AiError::Upstream { .. } => "upstream_error",
            AiError::NoResponse => "no_response",
            AiError::NoJsonObject => "no_json_object",
            AiError::InvalidJson(_) => "invalid_json",
            AiError::SchemaViolation(_) => "schema_violation",
            AiError::NonNumericScore(_) => "non_numeric_score",
            AiError::ScoreOutOfBounds { .. } => "score_out_of_bounds",
        }
    }
}

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        AiError::Transport(err.to_string())
    }
}

impl Error {
    fn code(&self) -> &'static str {
        match self {
            Error::BadRequest(_) | Error::Validation(_) | Error::Json(_) => "validation_error",
            Error::Conflict(_) => "conflict",
            Error::Unauthorized(_) => "unauthorized",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::File(_) | Error::Multipart(_) => "invalid_file",
            Error::Generation(e) | Error::Grading(e) => e.code(),
            _ => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let code = self.code();

        if let Error::Generation(ref err) | Error::Grading(ref err) = self {
            let error_type = match self {
                Error::Generation(_) => "generation_error",
                _ => "grading_error",
            };
            // Generated questions of a disallowed type or shape are a client-visible 400.
            let status = match self {
                Error::Generation(AiError::SchemaViolation(_)) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            };
            tracing::error!(error = %err, error_type, status = status.as_u16(), "AI service error");
            let body = Json(json!({
                "error": code,
                "error_type": error_type,
                "detail": err.to_string(),
                "message": "The AI service could not complete the request",
            }));
            return (status, body).into_response();
        }

        let (status, message) = match self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Conflict(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Error::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Error::File(msg) => (StatusCode::BAD_REQUEST, msg),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            Error::Multipart(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            other => {
                tracing::error!(error = ?other, "Request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": code, "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                Error::Conflict("Resource already exists".to_string())
            }
            other => Error::Database(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_json(err: Error) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn conflict_is_reported_as_bad_request() {
        let (status, body) = body_json(Error::Conflict("already registered".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["message"], "already registered");
    }

    #[tokio::test]
    async fn grading_error_carries_discriminators() {
        let err = Error::Grading(AiError::ScoreOutOfBounds { score: 7.0, marks: 5.0 });
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "score_out_of_bounds");
        assert_eq!(body["error_type"], "grading_error");
        assert!(body["detail"].as_str().unwrap().contains("out of bounds"));
    }

    #[tokio::test]
    async fn generated_schema_violation_is_a_bad_request() {
        let err = Error::Generation(AiError::SchemaViolation("question 2: unknown type".into()));
        let (status, body) = body_json(err).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "schema_violation");
        assert_eq!(body["error_type"], "generation_error");

        let (status, _) = body_json(Error::Generation(AiError::InvalidJson("eof".into()))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(Error::Internal("disk on fire".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "An unexpected error occurred");
    }
}
