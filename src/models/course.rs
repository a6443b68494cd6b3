use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub department: String,
    pub school: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Unit {
    pub id: Uuid,
    pub unit_code: String,
    pub unit_name: String,
    pub level: i32,
    pub semester: i32,
    pub course_id: Uuid,
    pub unique_join_code: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    /// Whether a student in `year`/`semester` should see this unit's work.
    /// Unset profile fields do not filter.
    pub fn matches_student_term(&self, year: Option<i32>, semester: Option<i32>) -> bool {
        year.map_or(true, |y| y == self.level) && semester.map_or(true, |s| s == self.semester)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(level: i32, semester: i32) -> Unit {
        Unit {
            id: Uuid::new_v4(),
            unit_code: "U1".into(),
            unit_name: "Unit".into(),
            level,
            semester,
            course_id: Uuid::new_v4(),
            unique_join_code: "ABCD1234".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn term_filter_only_applies_set_fields() {
        let u = unit(2, 1);
        assert!(u.matches_student_term(Some(2), Some(1)));
        assert!(u.matches_student_term(None, Some(1)));
        assert!(u.matches_student_term(Some(2), None));
        assert!(u.matches_student_term(None, None));
        assert!(!u.matches_student_term(Some(3), Some(1)));
        assert!(!u.matches_student_term(Some(2), Some(2)));
    }
}
