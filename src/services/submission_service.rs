use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::dto::assessment_dto::{
    AssessmentResultRow, CorrectResultRequest, QuestionResultView, StudentSubmissionView,
    SubmissionResponse,
};
use crate::error::{Error, Result};
use crate::models::assessment::Assessment;
use crate::models::result::{aggregate_scores, QuestionResult, ScoreValue};
use crate::models::submission::Submission;
use crate::models::user::Student;
use crate::services::ai_service::AIService;
use crate::services::assessment_service::AssessmentService;
use crate::services::storage_service::StorageService;

#[derive(FromRow)]
struct ResultWithQuestion {
    #[sqlx(flatten)]
    result: QuestionResult,
    question_text: String,
    marks: f64,
}

async fn total_for(conn: &mut PgConnection, assessment_id: Uuid, student_id: Uuid) -> Result<f64> {
    let scores: Vec<Json<ScoreValue>> = sqlx::query_scalar(
        "SELECT score FROM results WHERE assessment_id = $1 AND student_id = $2",
    )
    .bind(assessment_id)
    .bind(student_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(aggregate_scores(scores.iter().map(|s| &s.0)))
}

#[derive(Clone)]
pub struct SubmissionService {
    pool: PgPool,
    assessments: AssessmentService,
}

impl SubmissionService {
    pub fn new(pool: PgPool, ai: AIService, storage: StorageService) -> Self {
        Self {
            assessments: AssessmentService::new(pool.clone(), ai, storage),
            pool,
        }
    }

    /// Closes the student's attempt and records the sum of their scores. A
    /// second call for the same pair is rejected.
    pub async fn finalize_submission(
        &self,
        student: &Student,
        assessment_id: Uuid,
    ) -> Result<SubmissionResponse> {
        let assessment = self.assessments.get_assessment(assessment_id).await?;
        self.assessments
            .ensure_student_can_view(student, &assessment)
            .await?;

        let mut tx = self.pool.begin().await?;
        let submission = sqlx::query_as::<_, Submission>(
            r#"
            INSERT INTO submissions (id, assessment_id, student_id, graded)
            VALUES ($1, $2, $3, TRUE)
            ON CONFLICT (assessment_id, student_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assessment.id)
        .bind(student.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::Conflict("You have already submitted this assessment".into()))?;

        let total = total_for(&mut tx, assessment.id, student.id).await?;
        sqlx::query(
            r#"
            INSERT INTO total_marks (id, student_id, assessment_id, submission_id, total_marks)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(student.id)
        .bind(assessment.id)
        .bind(submission.id)
        .bind(total)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(
            submission_id = %submission.id,
            assessment_id = %assessment.id,
            student_id = %student.id,
            total_marks = total,
            "Assessment submitted"
        );
        Ok(SubmissionResponse {
            message: "Assessment submitted successfully".to_string(),
            submission_id: submission.id,
            total_marks: total,
        })
    }

    pub async fn list_student_submissions(&self, student: &Student) -> Result<Vec<StudentSubmissionView>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, DateTime<Utc>, bool, Option<f64>, f64)>(
            r#"
            SELECT s.id, s.assessment_id, a.title, s.submitted_at, s.graded, tm.total_marks, a.total_marks
            FROM submissions s
            JOIN assessments a ON a.id = s.assessment_id
            LEFT JOIN total_marks tm ON tm.submission_id = s.id
            WHERE s.student_id = $1
            ORDER BY s.submitted_at DESC
            "#,
        )
        .bind(student.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(submission_id, assessment_id, assessment_title, submitted_at, graded, total_marks, max_marks)| {
                    StudentSubmissionView {
                        submission_id,
                        assessment_id,
                        assessment_title,
                        submitted_at,
                        graded,
                        total_marks,
                        max_marks,
                    }
                },
            )
            .collect())
    }

    pub async fn get_student_results(
        &self,
        student: &Student,
        assessment_id: Uuid,
    ) -> Result<Vec<QuestionResultView>> {
        self.assessments.get_assessment(assessment_id).await?;
        let rows = sqlx::query_as::<_, ResultWithQuestion>(
            r#"
            SELECT r.*, q.text AS question_text, q.marks
            FROM results r
            JOIN questions q ON q.id = r.question_id
            WHERE r.assessment_id = $1 AND r.student_id = $2
            ORDER BY q.position
            "#,
        )
        .bind(assessment_id)
        .bind(student.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_view).collect())
    }

    /// Overrides a graded score. The stored total is recomputed when the
    /// student has already submitted.
    pub async fn correct_result(
        &self,
        lecturer_user_id: Uuid,
        result_id: Uuid,
        req: CorrectResultRequest,
    ) -> Result<QuestionResultView> {
        let mut tx = self.pool.begin().await?;
        let current = sqlx::query_as::<_, ResultWithQuestion>(
            r#"
            SELECT r.*, q.text AS question_text, q.marks
            FROM results r
            JOIN questions q ON q.id = r.question_id
            WHERE r.id = $1
            FOR UPDATE OF r
            "#,
        )
        .bind(result_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Result not found".into()))?;

        let assessment = sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
            .bind(current.result.assessment_id)
            .fetch_one(&mut *tx)
            .await?;
        if !assessment.is_owned_by(lecturer_user_id) {
            tracing::warn!(result_id = %result_id, user_id = %lecturer_user_id, "Result correction refused");
            return Err(Error::Forbidden(
                "Only the creator of this assessment can correct its results".into(),
            ));
        }
        if !req.score.is_finite() || req.score < 0.0 || req.score > current.marks {
            return Err(Error::BadRequest(format!(
                "Score must be between 0 and {}",
                current.marks
            )));
        }

        let feedback = req.feedback.unwrap_or(current.result.feedback.clone());
        let updated = sqlx::query_as::<_, QuestionResult>(
            r#"
            UPDATE results SET score = $2, feedback = $3, graded_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(result_id)
        .bind(Json(ScoreValue::from(req.score)))
        .bind(&feedback)
        .fetch_one(&mut *tx)
        .await?;

        let student_id = updated.student_id;
        let total = total_for(&mut tx, assessment.id, student_id).await?;
        let recomputed = sqlx::query(
            r#"
            UPDATE total_marks SET total_marks = $3, calculated_at = NOW()
            WHERE assessment_id = $1 AND student_id = $2
            "#,
        )
        .bind(assessment.id)
        .bind(student_id)
        .bind(total)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        tracing::info!(
            result_id = %result_id,
            score = req.score,
            total_updated = recomputed > 0,
            "Result corrected"
        );
        Ok(into_view(ResultWithQuestion {
            result: updated,
            question_text: current.question_text,
            marks: current.marks,
        }))
    }

    pub async fn list_assessment_results(
        &self,
        lecturer_user_id: Uuid,
        assessment_id: Uuid,
    ) -> Result<(Assessment, Vec<AssessmentResultRow>)> {
        let assessment = self
            .assessments
            .get_owned_assessment(lecturer_user_id, assessment_id)
            .await?;
        let rows = sqlx::query_as::<_, (Uuid, String, String, String, Uuid, DateTime<Utc>, Option<f64>)>(
            r#"
            SELECT st.id, st.registration_number, st.firstname, st.surname,
                   s.id, s.submitted_at, tm.total_marks
            FROM submissions s
            JOIN students st ON st.id = s.student_id
            LEFT JOIN total_marks tm ON tm.submission_id = s.id
            WHERE s.assessment_id = $1
            ORDER BY st.registration_number
            "#,
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        let rows = rows
            .into_iter()
            .map(
                |(student_id, registration_number, firstname, surname, submission_id, submitted_at, total_marks)| {
                    AssessmentResultRow {
                        student_id,
                        registration_number,
                        firstname,
                        surname,
                        submission_id,
                        submitted_at,
                        total_marks,
                    }
                },
            )
            .collect();
        Ok((assessment, rows))
    }
}

fn into_view(row: ResultWithQuestion) -> QuestionResultView {
    QuestionResultView {
        score: row.result.score(),
        result_id: row.result.id,
        question_id: row.result.question_id,
        question_text: row.question_text,
        marks: row.marks,
        feedback: row.result.feedback,
        graded_at: row.result.graded_at,
    }
}
