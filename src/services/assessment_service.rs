use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::dto::assessment_dto::{AssessmentWithQuestions, StudentAssessmentView};
use crate::error::{Error, Result};
use crate::models::assessment::{Assessment, AssessmentDraft};
use crate::models::question::{NewQuestion, Question};
use crate::models::submission::attempt_status;
use crate::models::user::{Role, Student};
use crate::services::ai_service::{AIService, GenerationInput};
use crate::services::course_service::CourseService;
use crate::services::storage_service::{FileScope, StorageService};
use crate::services::user_service::UserService;
use crate::utils::jwt::Claims;

#[derive(FromRow)]
struct StudentAssessmentRow {
    #[sqlx(flatten)]
    assessment: Assessment,
    unit_name: String,
    has_submission: bool,
    has_answers: bool,
}

async fn insert_assessment(
    conn: &mut PgConnection,
    creator_id: Uuid,
    course_id: Uuid,
    draft: &AssessmentDraft,
) -> Result<Assessment> {
    let questions_type: Vec<String> = draft
        .questions_type
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();
    let assessment = sqlx::query_as::<_, Assessment>(
        r#"
        INSERT INTO assessments (
            id, creator_id, unit_id, course_id, title, description, topic,
            assessment_type, questions_type, total_marks, number_of_questions,
            difficulty, blooms_level, week, schedule_date, deadline, duration_minutes
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(creator_id)
    .bind(draft.unit_id)
    .bind(course_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(&draft.topic)
    .bind(draft.kind.as_str())
    .bind(questions_type)
    .bind(draft.total_marks)
    .bind(draft.number_of_questions)
    .bind(&draft.difficulty)
    .bind(&draft.blooms_level)
    .bind(draft.week)
    .bind(draft.schedule_date)
    .bind(draft.deadline)
    .bind(draft.duration_minutes)
    .fetch_one(&mut *conn)
    .await?;
    Ok(assessment)
}

async fn insert_questions(
    conn: &mut PgConnection,
    assessment_id: Uuid,
    first_position: i32,
    questions: &[NewQuestion],
) -> Result<Vec<Question>> {
    let mut inserted = Vec::with_capacity(questions.len());
    for (offset, q) in questions.iter().enumerate() {
        let question = sqlx::query_as::<_, Question>(
            r#"
            INSERT INTO questions
                (id, assessment_id, text, marks, question_type, rubric, correct_answer, choices, position)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(assessment_id)
        .bind(&q.text)
        .bind(q.marks)
        .bind(q.format.question_type().as_str())
        .bind(&q.rubric)
        .bind(&q.correct_answer)
        .bind(q.format.choices().map(|c| Json(c.to_vec())))
        .bind(first_position + offset as i32)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(question);
    }
    Ok(inserted)
}

#[derive(Clone)]
pub struct AssessmentService {
    pool: PgPool,
    ai: AIService,
    storage: StorageService,
}

impl AssessmentService {
    pub fn new(pool: PgPool, ai: AIService, storage: StorageService) -> Self {
        Self { pool, ai, storage }
    }

    fn courses(&self) -> CourseService {
        CourseService::new(self.pool.clone(), self.storage.clone())
    }

    /// Persists the assessment and its questions atomically. New assessments
    /// start unverified.
    pub async fn create_assessment(
        &self,
        creator_id: Uuid,
        draft: AssessmentDraft,
        questions: Vec<NewQuestion>,
    ) -> Result<(Assessment, Vec<Question>)> {
        let unit = self.courses().get_lecturer_unit(creator_id, draft.unit_id).await?;

        let mut tx = self.pool.begin().await?;
        let assessment = insert_assessment(&mut tx, creator_id, unit.course_id, &draft).await?;
        let questions = insert_questions(&mut tx, assessment.id, 1, &questions).await?;
        tx.commit().await?;

        tracing::info!(
            assessment_id = %assessment.id,
            unit_id = %unit.id,
            questions = questions.len(),
            "Assessment created"
        );
        Ok((assessment, questions))
    }

    /// Asks the model for questions and stores the result. Nothing is written
    /// when generation fails.
    pub async fn generate_assessment(
        &self,
        creator_id: Uuid,
        draft: AssessmentDraft,
        document_text: Option<String>,
    ) -> Result<(Assessment, Vec<Question>)> {
        let unit = self.courses().get_lecturer_unit(creator_id, draft.unit_id).await?;

        let input = GenerationInput {
            draft: &draft,
            unit_name: &unit.unit_name,
            document_text: document_text.as_deref(),
        };
        let generated = self
            .ai
            .generate_questions(&input)
            .await
            .map_err(Error::Generation)?;
        if generated.len() != draft.number_of_questions as usize {
            tracing::warn!(
                requested = draft.number_of_questions,
                received = generated.len(),
                "Model returned a different number of questions"
            );
        }
        self.create_assessment(creator_id, draft, generated).await
    }

    pub async fn get_assessment(&self, id: Uuid) -> Result<Assessment> {
        sqlx::query_as::<_, Assessment>("SELECT * FROM assessments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Assessment not found".into()))
    }

    pub async fn get_owned_assessment(&self, user_id: Uuid, id: Uuid) -> Result<Assessment> {
        let assessment = self.get_assessment(id).await?;
        if !assessment.is_owned_by(user_id) {
            tracing::warn!(assessment_id = %id, user_id = %user_id, "Access to foreign assessment refused");
            return Err(Error::Forbidden(
                "Only the creator of this assessment can do that".into(),
            ));
        }
        Ok(assessment)
    }

    /// Students see verified assessments in units they are enrolled in.
    pub async fn ensure_student_can_view(&self, student: &Student, assessment: &Assessment) -> Result<()> {
        if !assessment.verified {
            return Err(Error::Forbidden("Assessment is not available yet".into()));
        }
        if !self
            .courses()
            .student_is_enrolled(student.id, assessment.unit_id)
            .await?
        {
            return Err(Error::Forbidden("You are not enrolled in this unit".into()));
        }
        Ok(())
    }

    /// Resolves an assessment for any caller: admins and lecturers with access
    /// to the unit see everything, students only what they may attempt.
    pub async fn visible_assessment(&self, claims: &Claims, id: Uuid) -> Result<Assessment> {
        let assessment = self.get_assessment(id).await?;
        let user_id = claims.user_id()?;
        match claims.role {
            Role::Admin => {}
            Role::Lecturer => {
                if !assessment.is_owned_by(user_id)
                    && !self
                        .courses()
                        .lecturer_can_access_unit(user_id, assessment.unit_id)
                        .await?
                {
                    return Err(Error::Forbidden("You do not teach this unit".into()));
                }
            }
            Role::Student => {
                let student = UserService::new(self.pool.clone(), self.storage.clone())
                    .find_student_by_user(user_id)
                    .await?;
                self.ensure_student_can_view(&student, &assessment).await?;
            }
        }
        Ok(assessment)
    }

    pub async fn verify_assessment(&self, user_id: Uuid, id: Uuid) -> Result<Assessment> {
        let assessment = self.get_owned_assessment(user_id, id).await?;
        if assessment.verified {
            return Err(Error::BadRequest("Assessment is already verified".into()));
        }
        let verified = sqlx::query_as::<_, Assessment>(
            r#"
            UPDATE assessments SET verified = TRUE, updated_at = NOW()
            WHERE id = $1 AND verified = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::BadRequest("Assessment is already verified".into()))?;
        tracing::info!(assessment_id = %id, "Assessment verified");
        Ok(verified)
    }

    pub async fn list_lecturer_assessments(&self, user_id: Uuid) -> Result<Vec<Assessment>> {
        let assessments = sqlx::query_as::<_, Assessment>(
            "SELECT * FROM assessments WHERE creator_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(assessments)
    }

    /// Removes the assessment with its questions, answers, results and
    /// submissions.
    pub async fn delete_assessment(&self, user_id: Uuid, id: Uuid) -> Result<()> {
        self.get_owned_assessment(user_id, id).await?;
        let mut tx = self.pool.begin().await?;
        let files = StorageService::files_within(&mut tx, FileScope::Assessment(id)).await?;
        sqlx::query("DELETE FROM assessments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.storage.discard(&files).await;
        tracing::info!(assessment_id = %id, files = files.len(), "Assessment deleted");
        Ok(())
    }

    pub async fn add_question(&self, user_id: Uuid, assessment_id: Uuid, question: NewQuestion) -> Result<Question> {
        self.get_owned_assessment(user_id, assessment_id).await?;
        let mut tx = self.pool.begin().await?;
        let next: i32 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position), 0) + 1 FROM questions WHERE assessment_id = $1",
        )
        .bind(assessment_id)
        .fetch_one(&mut *tx)
        .await?;
        let mut inserted =
            insert_questions(&mut tx, assessment_id, next, std::slice::from_ref(&question)).await?;
        tx.commit().await?;
        inserted
            .pop()
            .ok_or_else(|| Error::Internal("Question insert returned no row".into()))
    }

    pub async fn get_question(&self, id: Uuid) -> Result<Question> {
        sqlx::query_as::<_, Question>("SELECT * FROM questions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Question not found".into()))
    }

    pub async fn questions_for(&self, assessment_id: Uuid) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            "SELECT * FROM questions WHERE assessment_id = $1 ORDER BY position, created_at",
        )
        .bind(assessment_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(questions)
    }

    /// Answer keys and rubrics are stripped for students.
    pub async fn list_questions(&self, claims: &Claims, assessment_id: Uuid) -> Result<Vec<Question>> {
        self.visible_assessment(claims, assessment_id).await?;
        let questions = self.questions_for(assessment_id).await?;
        if claims.role == Role::Student {
            return Ok(questions.into_iter().map(Question::without_answers).collect());
        }
        Ok(questions)
    }

    pub async fn assessment_with_questions(
        &self,
        claims: &Claims,
        id: Uuid,
    ) -> Result<AssessmentWithQuestions> {
        let assessment = self.visible_assessment(claims, id).await?;
        let questions = self.list_questions(claims, id).await?;
        Ok(AssessmentWithQuestions {
            assessment,
            questions,
        })
    }

    /// Verified assessments in the student's units for their current year and
    /// semester, each with a derived attempt status.
    pub async fn list_student_assessments(&self, student: &Student) -> Result<Vec<StudentAssessmentView>> {
        let unit_ids: Vec<Uuid> = self
            .courses()
            .units_for_student(student.id)
            .await?
            .into_iter()
            .filter(|u| u.matches_student_term(student.year_of_study, student.semester))
            .map(|u| u.id)
            .collect();
        if unit_ids.is_empty() {
            return Err(Error::NotFound("No assessments available for your units".into()));
        }

        let rows = sqlx::query_as::<_, StudentAssessmentRow>(
            r#"
            SELECT a.*, u.unit_name,
                EXISTS(
                    SELECT 1 FROM submissions s
                    WHERE s.assessment_id = a.id AND s.student_id = $2
                ) AS has_submission,
                EXISTS(
                    SELECT 1 FROM answers an
                    WHERE an.assessment_id = a.id AND an.student_id = $2
                ) AS has_answers
            FROM assessments a
            JOIN units u ON u.id = a.unit_id
            WHERE a.verified = TRUE AND a.unit_id = ANY($1)
            ORDER BY a.schedule_date NULLS LAST, a.created_at DESC
            "#,
        )
        .bind(&unit_ids)
        .bind(student.id)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Err(Error::NotFound("No assessments available for your units".into()));
        }

        Ok(rows
            .into_iter()
            .map(|row| StudentAssessmentView {
                status: attempt_status(row.has_submission, row.has_answers),
                assessment: row.assessment,
                unit_name: row.unit_name,
            })
            .collect())
    }
}
