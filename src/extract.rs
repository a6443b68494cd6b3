use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;

use crate::error::Error;

/// `axum::Json` whose rejections use the crate's error body, so a missing
/// field is reported as a 400 `validation_error`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(Error))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::BadRequest(rejection.body_text())
    }
}
