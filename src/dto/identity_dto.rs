use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::course::{Course, Unit};
use crate::models::user::{Lecturer, Student};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateLecturerRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub firstname: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub surname: String,
    pub othernames: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateLecturerRequest {
    #[validate(length(min = 1))]
    pub firstname: Option<String>,
    #[validate(length(min = 1))]
    pub surname: Option<String>,
    pub othernames: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LecturerCreatedResponse {
    pub lecturer: Lecturer,
    pub email: String,
    /// Shown once; the lecturer should change it after the first login.
    pub temporary_password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignUnitRequest {
    pub unit_id: Uuid,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AnalyticsResponse {
    pub students: i64,
    pub lecturers: i64,
    pub admins: i64,
    pub courses: i64,
    pub units: i64,
    pub assessments: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateCourseRequest {
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub code: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub name: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub department: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub school: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1))]
    pub code: Option<String>,
    #[validate(length(min = 1))]
    pub name: Option<String>,
    #[validate(length(min = 1))]
    pub department: Option<String>,
    #[validate(length(min = 1))]
    pub school: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateUnitRequest {
    pub course_id: Uuid,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub unit_code: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub unit_name: String,
    #[validate(range(min = 1, max = 8, message = "Level must be between 1 and 8"))]
    pub level: i32,
    #[validate(range(min = 1, max = 3, message = "Semester must be between 1 and 3"))]
    pub semester: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateUnitRequest {
    #[validate(length(min = 1))]
    pub unit_code: Option<String>,
    #[validate(length(min = 1))]
    pub unit_name: Option<String>,
    #[validate(range(min = 1, max = 8))]
    pub level: Option<i32>,
    #[validate(range(min = 1, max = 3))]
    pub semester: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateStudentRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub registration_number: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub firstname: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub surname: String,
    pub othernames: Option<String>,
    #[validate(range(min = 1, max = 8))]
    pub year_of_study: Option<i32>,
    #[validate(range(min = 1, max = 3))]
    pub semester: Option<i32>,
    /// Optional unit to enroll the new student into.
    pub unit_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateStudentRequest {
    #[validate(length(min = 1))]
    pub firstname: Option<String>,
    #[validate(length(min = 1))]
    pub surname: Option<String>,
    pub othernames: Option<String>,
    #[validate(range(min = 1, max = 8))]
    pub year_of_study: Option<i32>,
    #[validate(range(min = 1, max = 3))]
    pub semester: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EnrollStudentRequest {
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct JoinUnitRequest {
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub join_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1))]
    pub firstname: Option<String>,
    #[validate(length(min = 1))]
    pub surname: Option<String>,
    pub othernames: Option<String>,
    #[validate(range(min = 1, max = 8))]
    pub year_of_study: Option<i32>,
    #[validate(range(min = 1, max = 3))]
    pub semester: Option<i32>,
    pub hobbies: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitWithCourse {
    #[serde(flatten)]
    pub unit: Unit,
    pub course_code: String,
    pub course_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentProfile {
    #[serde(flatten)]
    pub student: Student,
    pub email: String,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LecturerProfile {
    #[serde(flatten)]
    pub lecturer: Lecturer,
    pub email: String,
    pub courses: Vec<Course>,
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Profile {
    Admin { user_id: Uuid, email: String },
    Lecturer(LecturerProfile),
    Student(StudentProfile),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_level_and_semester_are_bounded() {
        let mut req = CreateUnitRequest {
            course_id: Uuid::new_v4(),
            unit_code: "U1".into(),
            unit_name: "Intro".into(),
            level: 1,
            semester: 1,
        };
        assert!(req.validate().is_ok());
        req.semester = 4;
        assert!(req.validate().is_err());
        req.semester = 1;
        req.unit_code = "".into();
        assert!(req.validate().is_err());
    }
}
