use axum::{response::IntoResponse, Json};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::dto::assessment_dto::{
    AnswerGradedResponse, AssessmentCreatedResponse, AssessmentMetadata, CorrectResultRequest,
    CreateAssessmentRequest, QuestionCreatedResponse, QuestionPayload, SubmissionResponse,
};
use crate::dto::auth_dto::{LoginRequest, TokenResponse};
use crate::dto::notes_dto::NoteCreatedResponse;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "IntelliMark API", description = "Assessment authoring, AI grading and course notes"),
    paths(
        crate::routes::auth::login,
        crate::routes::assessment::create_assessment,
        crate::routes::assessment::generate_assessment,
        crate::routes::assessment::generate_assessment_upload,
        crate::routes::assessment::verify_assessment,
        crate::routes::assessment::add_question,
        crate::routes::submission::submit_answer,
        crate::routes::submission::answer_image,
        crate::routes::submission::submit_assessment,
        crate::routes::submission::correct_result,
        crate::routes::notes::upload_note,
    ),
    components(schemas(
        LoginRequest,
        TokenResponse,
        AssessmentMetadata,
        CreateAssessmentRequest,
        QuestionPayload,
        AssessmentCreatedResponse,
        QuestionCreatedResponse,
        AnswerGradedResponse,
        SubmissionResponse,
        CorrectResultRequest,
        NoteCreatedResponse,
    )),
    modifiers(&BearerAuth),
    tags((name = "intellimark", description = "IntelliMark backend"))
)]
pub struct ApiDoc;

#[axum::debug_handler]
pub async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}
