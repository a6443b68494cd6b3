use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::dto::identity_dto::{
    AnalyticsResponse, CreateLecturerRequest, CreateStudentRequest, LecturerProfile, Profile,
    StudentProfile, UpdateLecturerRequest, UpdateProfileRequest, UpdateStudentRequest,
};
use crate::error::{Error, Result};
use crate::models::course::{Course, Unit};
use crate::models::user::{Lecturer, LecturerAccount, Role, Student, StudentAccount, User};
use crate::services::course_service::CourseService;
use crate::services::storage_service::{FileScope, StorageService};
use crate::utils::crypto::hash_password;
use crate::utils::jwt::Claims;
use crate::utils::token::generate_temporary_password;

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash(plain: &str) -> Result<String> {
    hash_password(plain).map_err(|e| Error::Internal(format!("Failed to hash password: {}", e)))
}

pub async fn email_taken(conn: &mut PgConnection, email: &str) -> Result<bool> {
    let taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
        .bind(normalize_email(email))
        .fetch_one(&mut *conn)
        .await?;
    Ok(taken)
}

pub async fn registration_number_taken(conn: &mut PgConnection, reg: &str) -> Result<bool> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM students WHERE registration_number = $1)",
    )
    .bind(reg.trim())
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

pub async fn insert_user(
    conn: &mut PgConnection,
    email: &str,
    password_hash: &str,
    role: Role,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, password_hash, role)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(normalize_email(email))
    .bind(password_hash)
    .bind(role.as_str())
    .fetch_one(&mut *conn)
    .await?;
    Ok(user)
}

pub struct NewStudent<'a> {
    pub registration_number: &'a str,
    pub firstname: &'a str,
    pub surname: &'a str,
    pub othernames: Option<&'a str>,
    pub year_of_study: Option<i32>,
    pub semester: Option<i32>,
}

pub async fn insert_student(
    conn: &mut PgConnection,
    user_id: Uuid,
    new: &NewStudent<'_>,
) -> Result<Student> {
    let student = sqlx::query_as::<_, Student>(
        r#"
        INSERT INTO students
            (id, user_id, registration_number, firstname, surname, othernames, year_of_study, semester)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(new.registration_number.trim())
    .bind(new.firstname.trim())
    .bind(new.surname.trim())
    .bind(new.othernames.map(str::trim))
    .bind(new.year_of_study)
    .bind(new.semester)
    .fetch_one(&mut *conn)
    .await?;
    Ok(student)
}

#[derive(Clone)]
pub struct UserService {
    pool: PgPool,
    storage: StorageService,
}

impl UserService {
    pub fn new(pool: PgPool, storage: StorageService) -> Self {
        Self { pool, storage }
    }

    fn courses(&self) -> CourseService {
        CourseService::new(self.pool.clone(), self.storage.clone())
    }

    pub async fn find_student_by_user(&self, user_id: Uuid) -> Result<Student> {
        sqlx::query_as::<_, Student>("SELECT * FROM students WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Student profile not found".into()))
    }

    pub async fn find_lecturer_by_user(&self, user_id: Uuid) -> Result<Lecturer> {
        sqlx::query_as::<_, Lecturer>("SELECT * FROM lecturers WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("Lecturer profile not found".into()))
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("User not found".into()))
    }

    /// Returns the lecturer and the one-time temporary password.
    pub async fn create_lecturer(&self, req: CreateLecturerRequest) -> Result<(LecturerAccount, String)> {
        let temporary_password = generate_temporary_password();
        let password_hash = hash(&temporary_password)?;

        let mut tx = self.pool.begin().await?;
        if email_taken(&mut tx, &req.email).await? {
            return Err(Error::Conflict("Email already registered".into()));
        }
        let user = insert_user(&mut tx, &req.email, &password_hash, Role::Lecturer).await?;
        let lecturer = sqlx::query_as::<_, Lecturer>(
            r#"
            INSERT INTO lecturers (id, user_id, firstname, surname, othernames)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(req.firstname.trim())
        .bind(req.surname.trim())
        .bind(req.othernames.as_deref().map(str::trim))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::info!(lecturer_id = %lecturer.id, "Lecturer account created");
        Ok((
            LecturerAccount {
                lecturer,
                email: user.email,
            },
            temporary_password,
        ))
    }

    pub async fn list_lecturers(&self) -> Result<Vec<LecturerAccount>> {
        let rows = sqlx::query_as::<_, LecturerAccount>(
            r#"
            SELECT l.*, u.email FROM lecturers l
            JOIN users u ON u.id = l.user_id
            ORDER BY l.surname, l.firstname
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_lecturer(&self, id: Uuid) -> Result<LecturerAccount> {
        sqlx::query_as::<_, LecturerAccount>(
            "SELECT l.*, u.email FROM lecturers l JOIN users u ON u.id = l.user_id WHERE l.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Lecturer not found".into()))
    }

    pub async fn update_lecturer(&self, id: Uuid, req: UpdateLecturerRequest) -> Result<Lecturer> {
        sqlx::query_as::<_, Lecturer>(
            r#"
            UPDATE lecturers
            SET firstname = COALESCE($2, firstname),
                surname = COALESCE($3, surname),
                othernames = COALESCE($4, othernames),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.firstname)
        .bind(req.surname)
        .bind(req.othernames)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Lecturer not found".into()))
    }

    pub async fn delete_lecturer(&self, id: Uuid) -> Result<()> {
        let lecturer = self.get_lecturer(id).await?;
        self.delete_user(lecturer.lecturer.user_id).await
    }

    /// Profiles, enrollments and everything a student produced go with the
    /// account.
    pub async fn delete_user(&self, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let files = StorageService::files_within(&mut tx, FileScope::User(id)).await?;
        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(Error::NotFound("User not found".into()));
        }
        tx.commit().await?;
        self.storage.discard(&files).await;
        tracing::info!(user_id = %id, files = files.len(), "User deleted");
        Ok(())
    }

    pub async fn assign_lecturer_unit(&self, lecturer_id: Uuid, unit_id: Uuid) -> Result<()> {
        self.get_lecturer(lecturer_id).await?;
        self.courses().get_unit(unit_id).await?;
        let inserted = sqlx::query(
            "INSERT INTO lecturer_units (lecturer_id, unit_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(lecturer_id)
        .bind(unit_id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        if inserted == 0 {
            return Err(Error::Conflict("Lecturer is already assigned to this unit".into()));
        }
        tracing::info!(lecturer_id = %lecturer_id, unit_id = %unit_id, "Lecturer assigned to unit");
        Ok(())
    }

    pub async fn analytics(&self) -> Result<AnalyticsResponse> {
        let count = |sql: &'static str| {
            let pool = self.pool.clone();
            async move { sqlx::query_scalar::<_, i64>(sql).fetch_one(&pool).await }
        };
        Ok(AnalyticsResponse {
            students: count("SELECT COUNT(*) FROM students").await?,
            lecturers: count("SELECT COUNT(*) FROM lecturers").await?,
            admins: count("SELECT COUNT(*) FROM users WHERE role = 'admin'").await?,
            courses: count("SELECT COUNT(*) FROM courses").await?,
            units: count("SELECT COUNT(*) FROM units").await?,
            assessments: count("SELECT COUNT(*) FROM assessments").await?,
        })
    }

    /// The initial password is the registration number.
    pub async fn create_student(
        &self,
        lecturer_user_id: Uuid,
        req: CreateStudentRequest,
    ) -> Result<StudentAccount> {
        let courses = self.courses();
        if let Some(unit_id) = req.unit_id {
            courses.get_lecturer_unit(lecturer_user_id, unit_id).await?;
        }
        let password_hash = hash(req.registration_number.trim())?;

        let mut tx = self.pool.begin().await?;
        if email_taken(&mut tx, &req.email).await? {
            return Err(Error::Conflict("Email already registered".into()));
        }
        if registration_number_taken(&mut tx, &req.registration_number).await? {
            return Err(Error::Conflict("Registration number already registered".into()));
        }
        let user = insert_user(&mut tx, &req.email, &password_hash, Role::Student).await?;
        let student = insert_student(
            &mut tx,
            user.id,
            &NewStudent {
                registration_number: &req.registration_number,
                firstname: &req.firstname,
                surname: &req.surname,
                othernames: req.othernames.as_deref(),
                year_of_study: req.year_of_study,
                semester: req.semester,
            },
        )
        .await?;
        if let Some(unit_id) = req.unit_id {
            sqlx::query("INSERT INTO student_units (student_id, unit_id) VALUES ($1, $2)")
                .bind(student.id)
                .bind(unit_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        tracing::info!(student_id = %student.id, "Student account created");
        Ok(StudentAccount {
            student,
            email: user.email,
        })
    }

    /// Students enrolled in any unit the lecturer owns or teaches.
    pub async fn list_students_for_lecturer(&self, user_id: Uuid) -> Result<Vec<StudentAccount>> {
        let rows = sqlx::query_as::<_, StudentAccount>(
            r#"
            SELECT DISTINCT s.*, usr.email FROM students s
            JOIN users usr ON usr.id = s.user_id
            JOIN student_units su ON su.student_id = s.id
            WHERE su.unit_id IN (
                SELECT u.id FROM units u JOIN courses c ON c.id = u.course_id WHERE c.created_by = $1
                UNION
                SELECT lu.unit_id FROM lecturer_units lu JOIN lecturers l ON l.id = lu.lecturer_id
                WHERE l.user_id = $1
            )
            ORDER BY s.registration_number
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_student(&self, id: Uuid) -> Result<StudentAccount> {
        sqlx::query_as::<_, StudentAccount>(
            "SELECT s.*, u.email FROM students s JOIN users u ON u.id = s.user_id WHERE s.id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Student not found".into()))
    }

    pub async fn update_student(&self, id: Uuid, req: UpdateStudentRequest) -> Result<Student> {
        sqlx::query_as::<_, Student>(
            r#"
            UPDATE students
            SET firstname = COALESCE($2, firstname),
                surname = COALESCE($3, surname),
                othernames = COALESCE($4, othernames),
                year_of_study = COALESCE($5, year_of_study),
                semester = COALESCE($6, semester),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(req.firstname)
        .bind(req.surname)
        .bind(req.othernames)
        .bind(req.year_of_study)
        .bind(req.semester)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Student not found".into()))
    }

    pub async fn delete_student(&self, id: Uuid) -> Result<()> {
        let student = self.get_student(id).await?;
        self.delete_user(student.student.user_id).await
    }

    pub async fn profile(&self, claims: &Claims) -> Result<Profile> {
        let user = self.get_user(claims.user_id()?).await?;
        let courses = self.courses();
        match claims.role {
            Role::Admin => Ok(Profile::Admin {
                user_id: user.id,
                email: user.email,
            }),
            Role::Lecturer => {
                let lecturer = self.find_lecturer_by_user(user.id).await?;
                let owned: Vec<Course> = courses.list_courses(user.id).await?;
                let units: Vec<Unit> = courses.list_lecturer_units(user.id).await?;
                Ok(Profile::Lecturer(LecturerProfile {
                    lecturer,
                    email: user.email,
                    courses: owned,
                    units,
                }))
            }
            Role::Student => {
                let student = self.find_student_by_user(user.id).await?;
                let units = courses.units_for_student(student.id).await?;
                Ok(Profile::Student(StudentProfile {
                    student,
                    email: user.email,
                    units,
                }))
            }
        }
    }

    pub async fn update_profile(&self, claims: &Claims, req: UpdateProfileRequest) -> Result<Profile> {
        let user_id = claims.user_id()?;
        match claims.role {
            Role::Admin => {
                return Err(Error::BadRequest("Admin accounts have no editable profile".into()))
            }
            Role::Lecturer => {
                sqlx::query(
                    r#"
                    UPDATE lecturers
                    SET firstname = COALESCE($2, firstname),
                        surname = COALESCE($3, surname),
                        othernames = COALESCE($4, othernames),
                        updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(req.firstname)
                .bind(req.surname)
                .bind(req.othernames)
                .execute(&self.pool)
                .await?;
            }
            Role::Student => {
                let hobbies = req.hobbies.map(|h| {
                    h.into_iter()
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect::<Vec<_>>()
                });
                sqlx::query(
                    r#"
                    UPDATE students
                    SET firstname = COALESCE($2, firstname),
                        surname = COALESCE($3, surname),
                        othernames = COALESCE($4, othernames),
                        year_of_study = COALESCE($5, year_of_study),
                        semester = COALESCE($6, semester),
                        hobbies = COALESCE($7, hobbies),
                        updated_at = NOW()
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .bind(req.firstname)
                .bind(req.surname)
                .bind(req.othernames)
                .bind(req.year_of_study)
                .bind(req.semester)
                .bind(hobbies)
                .execute(&self.pool)
                .await?;
            }
        }
        self.profile(claims).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Jane.Doe@Uni.AC.ke "), "jane.doe@uni.ac.ke");
    }
}
