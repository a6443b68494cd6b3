use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::identity_dto::{
    CreateCourseRequest, CreateUnitRequest, UpdateCourseRequest, UpdateUnitRequest,
};
use crate::error::{Error, Result};
use crate::models::course::{Course, Unit};
use crate::services::storage_service::{FileScope, StorageService};
use crate::utils::token::generate_join_code;

const JOIN_CODE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct CourseService {
    pool: PgPool,
    storage: StorageService,
}

impl CourseService {
    pub fn new(pool: PgPool, storage: StorageService) -> Self {
        Self { pool, storage }
    }

    /// Deletes `sql` for `id` and then the files the cascade orphaned.
    async fn delete_with_files(&self, sql: &str, id: Uuid, scope: FileScope) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let files = StorageService::files_within(&mut tx, scope).await?;
        sqlx::query(sql).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        self.storage.discard(&files).await;
        Ok(files.len())
    }

    pub async fn create_course(&self, owner: Uuid, req: CreateCourseRequest) -> Result<Course> {
        let code = req.code.trim().to_uppercase();
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM courses WHERE created_by = $1 AND code = $2)",
        )
        .bind(owner)
        .bind(&code)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Err(Error::Conflict(format!("Course with code {} already exists", code)));
        }

        let course = sqlx::query_as::<_, Course>(
            r#"
            INSERT INTO courses (id, code, name, department, school, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&code)
        .bind(req.name.trim())
        .bind(req.department.trim())
        .bind(req.school.trim())
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(course_id = %course.id, code = %course.code, "Course created");
        Ok(course)
    }

    pub async fn list_courses(&self, owner: Uuid) -> Result<Vec<Course>> {
        let courses = sqlx::query_as::<_, Course>(
            "SELECT * FROM courses WHERE created_by = $1 ORDER BY code",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        Ok(courses)
    }

    pub async fn get_course(&self, id: Uuid) -> Result<Course> {
        sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Course not found".into()))
    }

    pub async fn get_owned_course(&self, owner: Uuid, id: Uuid) -> Result<Course> {
        let course = self.get_course(id).await?;
        if course.created_by != owner {
            tracing::warn!(course_id = %id, user_id = %owner, "Course access denied");
            return Err(Error::Forbidden("You do not own this course".into()));
        }
        Ok(course)
    }

    pub async fn update_course(
        &self,
        owner: Uuid,
        id: Uuid,
        req: UpdateCourseRequest,
    ) -> Result<Course> {
        let current = self.get_owned_course(owner, id).await?;
        let code = req
            .code
            .map(|c| c.trim().to_uppercase())
            .unwrap_or(current.code);
        let course = sqlx::query_as::<_, Course>(
            r#"
            UPDATE courses
            SET code = $2,
                name = COALESCE($3, name),
                department = COALESCE($4, department),
                school = COALESCE($5, school),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(code)
        .bind(req.name)
        .bind(req.department)
        .bind(req.school)
        .fetch_one(&self.pool)
        .await?;
        Ok(course)
    }

    /// Units and everything beneath them go with the course.
    pub async fn delete_course(&self, owner: Uuid, id: Uuid) -> Result<()> {
        self.get_owned_course(owner, id).await?;
        let files = self
            .delete_with_files("DELETE FROM courses WHERE id = $1", id, FileScope::Course(id))
            .await?;
        tracing::info!(course_id = %id, files, "Course deleted");
        Ok(())
    }

    pub async fn create_unit(&self, owner: Uuid, req: CreateUnitRequest) -> Result<Unit> {
        self.get_owned_course(owner, req.course_id).await?;
        let unit_code = req.unit_code.trim().to_uppercase();

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM units WHERE course_id = $1 AND unit_code = $2)",
        )
        .bind(req.course_id)
        .bind(&unit_code)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            return Err(Error::Conflict(format!(
                "Unit {} already exists in this course",
                unit_code
            )));
        }

        for attempt in 1..=JOIN_CODE_ATTEMPTS {
            let join_code = generate_join_code();
            let inserted = sqlx::query_as::<_, Unit>(
                r#"
                INSERT INTO units (id, unit_code, unit_name, level, semester, course_id, unique_join_code)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (unique_join_code) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&unit_code)
            .bind(req.unit_name.trim())
            .bind(req.level)
            .bind(req.semester)
            .bind(req.course_id)
            .bind(&join_code)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(unit) = inserted {
                tracing::info!(unit_id = %unit.id, unit_code = %unit.unit_code, "Unit created");
                return Ok(unit);
            }
            tracing::warn!(attempt, "Join code collision, retrying");
        }
        Err(Error::Internal("Could not allocate a unique join code".into()))
    }

    /// Units in the lecturer's own courses plus units assigned by an admin.
    pub async fn list_lecturer_units(&self, user_id: Uuid) -> Result<Vec<Unit>> {
        let units = sqlx::query_as::<_, Unit>(
            r#"
            SELECT u.* FROM units u
            JOIN courses c ON c.id = u.course_id
            WHERE c.created_by = $1
            UNION
            SELECT u.* FROM units u
            JOIN lecturer_units lu ON lu.unit_id = u.id
            JOIN lecturers l ON l.id = lu.lecturer_id
            WHERE l.user_id = $1
            ORDER BY unit_code
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(units)
    }

    pub async fn get_unit(&self, id: Uuid) -> Result<Unit> {
        sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Unit not found".into()))
    }

    pub async fn lecturer_can_access_unit(&self, user_id: Uuid, unit_id: Uuid) -> Result<bool> {
        let allowed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM units u JOIN courses c ON c.id = u.course_id
                WHERE u.id = $2 AND c.created_by = $1
            ) OR EXISTS(
                SELECT 1 FROM lecturer_units lu JOIN lecturers l ON l.id = lu.lecturer_id
                WHERE lu.unit_id = $2 AND l.user_id = $1
            )
            "#,
        )
        .bind(user_id)
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(allowed)
    }

    /// The unit, provided the lecturer owns or teaches it.
    pub async fn get_lecturer_unit(&self, user_id: Uuid, unit_id: Uuid) -> Result<Unit> {
        let unit = self.get_unit(unit_id).await?;
        if !self.lecturer_can_access_unit(user_id, unit_id).await? {
            tracing::warn!(unit_id = %unit_id, user_id = %user_id, "Unit access denied");
            return Err(Error::Forbidden("You do not teach this unit".into()));
        }
        Ok(unit)
    }

    async fn get_owned_unit(&self, owner: Uuid, unit_id: Uuid) -> Result<Unit> {
        let unit = self.get_unit(unit_id).await?;
        self.get_owned_course(owner, unit.course_id).await?;
        Ok(unit)
    }

    pub async fn update_unit(&self, owner: Uuid, id: Uuid, req: UpdateUnitRequest) -> Result<Unit> {
        let current = self.get_owned_unit(owner, id).await?;
        let unit_code = req
            .unit_code
            .map(|c| c.trim().to_uppercase())
            .unwrap_or(current.unit_code);
        let unit = sqlx::query_as::<_, Unit>(
            r#"
            UPDATE units
            SET unit_code = $2,
                unit_name = COALESCE($3, unit_name),
                level = COALESCE($4, level),
                semester = COALESCE($5, semester),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(unit_code)
        .bind(req.unit_name)
        .bind(req.level)
        .bind(req.semester)
        .fetch_one(&self.pool)
        .await?;
        Ok(unit)
    }

    pub async fn delete_unit(&self, owner: Uuid, id: Uuid) -> Result<()> {
        self.get_owned_unit(owner, id).await?;
        let files = self
            .delete_with_files("DELETE FROM units WHERE id = $1", id, FileScope::Unit(id))
            .await?;
        tracing::info!(unit_id = %id, files, "Unit deleted");
        Ok(())
    }

    pub async fn student_is_enrolled(&self, student_id: Uuid, unit_id: Uuid) -> Result<bool> {
        let enrolled: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM student_units WHERE student_id = $1 AND unit_id = $2)",
        )
        .bind(student_id)
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(enrolled)
    }

    pub async fn units_for_student(&self, student_id: Uuid) -> Result<Vec<Unit>> {
        let units = sqlx::query_as::<_, Unit>(
            r#"
            SELECT u.* FROM units u
            JOIN student_units su ON su.unit_id = u.id
            WHERE su.student_id = $1
            ORDER BY u.unit_code
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(units)
    }

    pub async fn join_unit(&self, student_id: Uuid, join_code: &str) -> Result<Unit> {
        let unit = sqlx::query_as::<_, Unit>("SELECT * FROM units WHERE unique_join_code = $1")
            .bind(join_code.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("No unit matches this join code".into()))?;
        self.enroll(student_id, &unit).await?;
        Ok(unit)
    }

    pub async fn enroll_student(
        &self,
        lecturer_user_id: Uuid,
        unit_id: Uuid,
        student_id: Uuid,
    ) -> Result<Unit> {
        let unit = self.get_lecturer_unit(lecturer_user_id, unit_id).await?;
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM students WHERE id = $1)")
            .bind(student_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(Error::NotFound("Student not found".into()));
        }
        self.enroll(student_id, &unit).await?;
        Ok(unit)
    }

    async fn enroll(&self, student_id: Uuid, unit: &Unit) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO student_units (student_id, unit_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(student_id)
        .bind(unit.id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(Error::Conflict(
                "Student already registered in this unit".into(),
            ));
        }
        tracing::info!(student_id = %student_id, unit_id = %unit.id, "Student enrolled");
        Ok(())
    }
}
