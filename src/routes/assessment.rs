use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::assessment_dto::{
        AssessmentCreatedResponse, AssessmentMetadata, CreateAssessmentRequest, QuestionCreatedResponse,
        QuestionPayload,
    },
    error::{Error, Result},
    extract::ApiJson,
    models::assessment::{Assessment, AssessmentDraft},
    models::question::{NewQuestion, Question},
    services::ai_service::MAX_DOCUMENT_CHARS,
    services::storage_service::extract_document_text,
    utils::jwt::Claims,
    AppState,
};

fn draft_from(metadata: AssessmentMetadata) -> Result<AssessmentDraft> {
    metadata.validate()?;
    metadata.into_draft().map_err(Error::BadRequest)
}

fn created(assessment: &Assessment, questions: &[Question], message: &str) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(AssessmentCreatedResponse {
            message: message.to_string(),
            assessment_id: assessment.id,
            questions: questions.len(),
        }),
    )
}

#[utoipa::path(
    post,
    path = "/api/v1/bd/assessments",
    request_body = CreateAssessmentRequest,
    responses(
        (status = 201, description = "Assessment created with its questions", body = AssessmentCreatedResponse),
        (status = 400, description = "Missing or invalid fields"),
        (status = 403, description = "Caller does not teach the unit"),
        (status = 404, description = "Unit not found")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn create_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<CreateAssessmentRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let draft = draft_from(payload.metadata)?;
    let questions = payload
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, q)| {
            q.into_new_question()
                .map_err(|e| Error::BadRequest(format!("Question {}: {}", i + 1, e)))
        })
        .collect::<Result<Vec<NewQuestion>>>()?;

    let (assessment, questions) = state
        .assessment_service
        .create_assessment(claims.user_id()?, draft, questions)
        .await?;
    Ok(created(&assessment, &questions, "Assessment created successfully"))
}

#[utoipa::path(
    post,
    path = "/api/v1/bd/ai/generate-assessments",
    request_body = AssessmentMetadata,
    responses(
        (status = 201, description = "Questions generated and stored", body = AssessmentCreatedResponse),
        (status = 400, description = "Missing or invalid fields, or generated questions of a disallowed type"),
        (status = 502, description = "The AI service failed or returned unreadable output")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn generate_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(payload): ApiJson<AssessmentMetadata>,
) -> Result<impl IntoResponse> {
    let draft = draft_from(payload)?;
    let (assessment, questions) = state
        .assessment_service
        .generate_assessment(claims.user_id()?, draft, None)
        .await?;
    Ok(created(&assessment, &questions, "Assessment generated successfully"))
}

/// Form fields become JSON values: `15` is read as a number and `["a"]` as a
/// list, anything else stays a string. Repeated fields collect into a list.
fn insert_form_value(fields: &mut Map<String, JsonValue>, name: String, raw: String) {
    let value = serde_json::from_str::<JsonValue>(&raw)
        .ok()
        .filter(|v| v.is_number() || v.is_array() || v.is_boolean())
        .unwrap_or(JsonValue::String(raw));
    match fields.get_mut(&name) {
        Some(JsonValue::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = JsonValue::Array(vec![first, value]);
        }
        None => {
            fields.insert(name, value);
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/bd/ai/generate-assessments/upload",
    request_body(content = serde_json::Value, content_type = "multipart/form-data", description = "Assessment fields plus an optional `document` (.txt, .md or .pdf)"),
    responses(
        (status = 201, description = "Questions generated and stored", body = AssessmentCreatedResponse),
        (status = 400, description = "Missing or invalid fields, or generated questions of a disallowed type"),
        (status = 502, description = "The AI service failed or returned unreadable output")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn generate_assessment_upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut fields = Map::new();
    let mut metadata_json: Option<String> = None;
    let mut document_text: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(Error::Multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "document" | "file" => {
                let filename = field.file_name().unwrap_or("document.txt").to_string();
                let data = field.bytes().await.map_err(Error::Multipart)?;
                if data.is_empty() {
                    continue;
                }
                let text = extract_document_text(&filename, &data).await?;
                let text: String = text.chars().take(MAX_DOCUMENT_CHARS).collect();
                if !text.trim().is_empty() {
                    document_text = Some(text);
                }
            }
            "metadata" => {
                metadata_json = Some(field.text().await.map_err(Error::Multipart)?);
            }
            _ => {
                let raw = field.text().await.map_err(Error::Multipart)?;
                insert_form_value(&mut fields, name, raw);
            }
        }
    }

    let metadata: AssessmentMetadata = match metadata_json {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| Error::BadRequest(format!("Invalid metadata: {}", e)))?,
        None => serde_json::from_value(JsonValue::Object(fields))
            .map_err(|e| Error::BadRequest(format!("Invalid assessment fields: {}", e)))?,
    };
    let draft = draft_from(metadata)?;
    let (assessment, questions) = state
        .assessment_service
        .generate_assessment(claims.user_id()?, draft, document_text)
        .await?;
    Ok(created(&assessment, &questions, "Assessment generated successfully"))
}

#[utoipa::path(
    get,
    path = "/api/v1/bd/assessments/{id}/verify",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses(
        (status = 200, description = "Assessment verified"),
        (status = 400, description = "Already verified"),
        (status = 403, description = "Caller is not the creator")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn verify_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let assessment = state
        .assessment_service
        .verify_assessment(claims.user_id()?, id)
        .await?;
    Ok(Json(json!({
        "message": "Assessment verified successfully",
        "assessment_id": assessment.id,
        "verified": assessment.verified,
    })))
}

#[axum::debug_handler]
pub async fn list_lecturer_assessments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .assessment_service
            .list_lecturer_assessments(claims.user_id()?)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn get_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state
            .assessment_service
            .assessment_with_questions(&claims, id)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn delete_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .assessment_service
        .delete_assessment(claims.user_id()?, id)
        .await?;
    Ok(Json(json!({ "message": "Assessment deleted successfully" })))
}

#[utoipa::path(
    post,
    path = "/api/v1/bd/assessments/{id}/questions",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    request_body = QuestionPayload,
    responses(
        (status = 201, description = "Question added", body = QuestionCreatedResponse),
        (status = 400, description = "Invalid question"),
        (status = 403, description = "Caller is not the creator")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn add_question(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<QuestionPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let question = payload.into_new_question().map_err(Error::BadRequest)?;
    let question = state
        .assessment_service
        .add_question(claims.user_id()?, id, question)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(QuestionCreatedResponse {
            message: "Question added successfully".to_string(),
            question_id: question.id,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_questions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    Ok(Json(
        state.assessment_service.list_questions(&claims, id).await?,
    ))
}

#[axum::debug_handler]
pub async fn list_student_assessments(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;
    Ok(Json(
        state
            .assessment_service
            .list_student_assessments(&student)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_values_are_typed_and_repeated_fields_collect() {
        let mut fields = Map::new();
        insert_form_value(&mut fields, "total_marks".into(), "15".into());
        insert_form_value(&mut fields, "title".into(), "CAT 1".into());
        insert_form_value(&mut fields, "questions_type".into(), "open-ended".into());
        insert_form_value(&mut fields, "questions_type".into(), "close-ended-bool".into());
        assert_eq!(fields["total_marks"], json!(15));
        assert_eq!(fields["title"], json!("CAT 1"));
        assert_eq!(fields["questions_type"], json!(["open-ended", "close-ended-bool"]));
    }
}
