use axum::{
    body::Body,
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::assessment_dto::{AnswerGradedResponse, CorrectResultRequest, SubmissionResponse},
    error::{Error, Result},
    extract::ApiJson,
    services::{answer_service::RawAnswer, export_service::ExportService},
    utils::jwt::Claims,
    AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/bd/questions/{id}/answer",
    params(("id" = Uuid, Path, description = "Question ID")),
    request_body(content = serde_json::Value, content_type = "multipart/form-data", description = "`answer_type` (text or image) with `text_answer` or an `image` file"),
    responses(
        (status = 201, description = "Answer stored and graded", body = AnswerGradedResponse),
        (status = 400, description = "Invalid modality, file, or question already answered"),
        (status = 403, description = "Assessment not verified or student not enrolled"),
        (status = 404, description = "Question not found"),
        (status = 502, description = "Grading failed; the answer is kept without a result")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn submit_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(question_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;

    let mut raw = RawAnswer {
        answer_type: None,
        text_answer: None,
        image: None,
    };
    while let Some(field) = multipart.next_field().await.map_err(Error::Multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "answer_type" => raw.answer_type = Some(field.text().await.map_err(Error::Multipart)?),
            "text_answer" => raw.text_answer = Some(field.text().await.map_err(Error::Multipart)?),
            "image" => {
                let filename = field.file_name().unwrap_or("answer").to_string();
                let data = field.bytes().await.map_err(Error::Multipart)?;
                raw.image = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let graded = state
        .answer_service
        .submit_answer(&student, question_id, raw)
        .await?;
    Ok((StatusCode::CREATED, Json(graded)))
}

#[utoipa::path(
    get,
    path = "/api/v1/bd/answers/{id}/image",
    params(("id" = Uuid, Path, description = "Answer ID")),
    responses(
        (status = 200, description = "The stored answer image"),
        (status = 403, description = "Not the answering student and no access to the unit"),
        (status = 404, description = "Answer not found or it has no image")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn answer_image(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (path, mime) = state.answer_service.answer_image(&claims, id).await?;
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(answer_id = %id, path = %path, "Answer image missing on disk");
            return Err(Error::NotFound("Answer image not found".into()));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, mime)],
        Body::from_stream(ReaderStream::new(file)),
    ))
}

#[utoipa::path(
    post,
    path = "/api/v1/bd/assessments/{id}/submit",
    params(("id" = Uuid, Path, description = "Assessment ID")),
    responses(
        (status = 201, description = "Submission recorded with total marks", body = SubmissionResponse),
        (status = 400, description = "Already submitted"),
        (status = 403, description = "Assessment not available to the student")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn submit_assessment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;
    let submission = state
        .submission_service
        .finalize_submission(&student, id)
        .await?;
    Ok((StatusCode::CREATED, Json(submission)))
}

#[axum::debug_handler]
pub async fn list_student_submissions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse> {
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;
    Ok(Json(
        state
            .submission_service
            .list_student_submissions(&student)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn my_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let student = state
        .user_service
        .find_student_by_user(claims.user_id()?)
        .await?;
    Ok(Json(
        state
            .submission_service
            .get_student_results(&student, id)
            .await?,
    ))
}

#[utoipa::path(
    patch,
    path = "/api/v1/bd/results/{id}",
    params(("id" = Uuid, Path, description = "Result ID")),
    request_body = CorrectResultRequest,
    responses(
        (status = 200, description = "Score corrected and totals recomputed"),
        (status = 400, description = "Score outside 0..marks"),
        (status = 403, description = "Caller is not the creator of the assessment")
    ),
    security(("bearer_auth" = []))
)]
#[axum::debug_handler]
pub async fn correct_result(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
    ApiJson(payload): ApiJson<CorrectResultRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    Ok(Json(
        state
            .submission_service
            .correct_result(claims.user_id()?, id, payload)
            .await?,
    ))
}

#[axum::debug_handler]
pub async fn list_assessment_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (_, rows) = state
        .submission_service
        .list_assessment_results(claims.user_id()?, id)
        .await?;
    Ok(Json(rows))
}

/// Results of one assessment as XLSX
#[axum::debug_handler]
pub async fn export_assessment_results(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let (assessment, rows) = state
        .submission_service
        .list_assessment_results(claims.user_id()?, id)
        .await?;
    let unit = state.course_service.get_unit(assessment.unit_id).await?;

    let buffer = ExportService::generate_results_xlsx(&assessment, &unit.unit_name, &rows)?;
    let filename = format!(
        "results_{}_{}.xlsx",
        assessment.title.replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
        chrono::Utc::now().format("%Y%m%d")
    );
    let disposition = format!("attachment; filename=\"{}\"", filename);

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        buffer,
    ))
}
