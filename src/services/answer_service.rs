use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::assessment_dto::AnswerGradedResponse;
use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerInput};
use crate::models::result::{QuestionResult, ScoreValue};
use crate::models::user::{Role, Student};
use crate::services::ai_service::{AIService, GradedAnswer, GradingContext};
use crate::services::assessment_service::AssessmentService;
use crate::services::storage_service::{image_mime_for, StorageService};
use crate::services::user_service::UserService;
use crate::utils::jwt::Claims;

pub struct RawAnswer {
    pub answer_type: Option<String>,
    pub text_answer: Option<String>,
    pub image: Option<(String, Vec<u8>)>,
}

#[derive(Clone)]
pub struct AnswerService {
    pool: PgPool,
    ai: AIService,
    storage: StorageService,
}

impl AnswerService {
    pub fn new(pool: PgPool, ai: AIService, storage: StorageService) -> Self {
        Self { pool, ai, storage }
    }

    fn assessments(&self) -> AssessmentService {
        AssessmentService::new(self.pool.clone(), self.ai.clone(), self.storage.clone())
    }

    pub async fn get_answer(&self, id: Uuid) -> Result<Answer> {
        sqlx::query_as::<_, Answer>("SELECT * FROM answers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Answer not found".into()))
    }

    /// Path and content type of an answer's image. Students read their own
    /// answers; lecturers need access to the assessment's unit.
    pub async fn answer_image(&self, claims: &Claims, id: Uuid) -> Result<(String, &'static str)> {
        let answer = self.get_answer(id).await?;
        match claims.role {
            Role::Student => {
                let student = UserService::new(self.pool.clone(), self.storage.clone())
                    .find_student_by_user(claims.user_id()?)
                    .await?;
                if answer.student_id != student.id {
                    tracing::warn!(answer_id = %id, student_id = %student.id, "Foreign answer image refused");
                    return Err(Error::Forbidden("You can only view your own answers".into()));
                }
            }
            Role::Lecturer | Role::Admin => {
                self.assessments()
                    .visible_assessment(claims, answer.assessment_id)
                    .await?;
            }
        }
        let path = answer
            .image_path
            .ok_or_else(|| Error::NotFound("This answer has no image".into()))?;
        let mime = image_mime_for(&path);
        Ok((path, mime))
    }

    async fn already_answered(&self, question_id: Uuid, student_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM answers WHERE question_id = $1 AND student_id = $2)",
        )
        .bind(question_id)
        .bind(student_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Stores one answer and grades it. The answer is kept when grading
    /// fails; no result row is written in that case.
    pub async fn submit_answer(
        &self,
        student: &Student,
        question_id: Uuid,
        raw: RawAnswer,
    ) -> Result<AnswerGradedResponse> {
        let assessments = self.assessments();
        let question = assessments.get_question(question_id).await?;
        let assessment = assessments.get_assessment(question.assessment_id).await?;
        assessments.ensure_student_can_view(student, &assessment).await?;

        let input = AnswerInput::from_parts(raw.answer_type.as_deref(), raw.text_answer, raw.image)
            .map_err(Error::BadRequest)?;

        if self.already_answered(question.id, student.id).await? {
            return Err(Error::Conflict("You have already answered this question".into()));
        }

        let (text_answer, stored, graded) = match input {
            AnswerInput::Text(text) => (Some(text.clone()), None, GradedAnswer::Text(text)),
            AnswerInput::Image { filename, data } => {
                let stored = self.storage.save_answer_image(&filename, &data).await?;
                let graded = GradedAnswer::Image {
                    bytes: data,
                    mime_type: stored.mime_type.to_string(),
                };
                (None, Some(stored), graded)
            }
        };

        let inserted = sqlx::query_as::<_, Answer>(
            r#"
            INSERT INTO answers (id, question_id, assessment_id, student_id, text_answer, image_path)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(question.id)
        .bind(assessment.id)
        .bind(student.id)
        .bind(&text_answer)
        .bind(stored.as_ref().map(|s| s.path_string()))
        .fetch_one(&self.pool)
        .await;
        let answer = match inserted {
            Ok(answer) => answer,
            Err(e) => {
                if let Some(file) = &stored {
                    if let Err(cleanup) = self.storage.remove(&file.path).await {
                        tracing::error!(error = %cleanup, "Failed to remove orphaned answer image");
                    }
                }
                return Err(match Error::from(e) {
                    Error::Conflict(_) => {
                        Error::Conflict("You have already answered this question".into())
                    }
                    other => other,
                });
            }
        };
        tracing::info!(answer_id = %answer.id, question_id = %question.id, student_id = %student.id, "Answer saved");

        let ctx = GradingContext {
            answer: graded,
            question_text: question.text.clone(),
            rubric: question.rubric.clone(),
            correct_answer: question.correct_answer.clone(),
            marks: question.marks,
            hobbies: student.hobbies.clone(),
        };
        let grade = self.ai.grade(&ctx).await.map_err(|e| {
            tracing::error!(answer_id = %answer.id, error = %e, "Grading failed, answer kept without result");
            Error::Grading(e)
        })?;

        let result = sqlx::query_as::<_, QuestionResult>(
            r#"
            INSERT INTO results (id, question_id, assessment_id, student_id, score, feedback)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(question.id)
        .bind(assessment.id)
        .bind(student.id)
        .bind(Json(ScoreValue::from(grade.score)))
        .bind(&grade.feedback)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(result_id = %result.id, score = grade.score, marks = question.marks, "Answer graded");

        Ok(AnswerGradedResponse {
            message: "Answer submitted and graded successfully".to_string(),
            answer_id: answer.id,
            question_id: question.id,
            assessment_id: assessment.id,
            score: grade.score,
            feedback: grade.feedback,
        })
    }
}
