use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Submission {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub graded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TotalMarks {
    pub id: Uuid,
    pub student_id: Uuid,
    pub assessment_id: Uuid,
    pub submission_id: Uuid,
    pub total_marks: f64,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttemptStatus {
    Completed,
    InProgress,
    Open,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::InProgress => "in-progress",
            AttemptStatus::Open => "open",
        }
    }
}

/// Derived on every read; never stored.
pub fn attempt_status(has_submission: bool, has_answers: bool) -> AttemptStatus {
    if has_submission {
        AttemptStatus::Completed
    } else if has_answers {
        AttemptStatus::InProgress
    } else {
        AttemptStatus::Open
    }
}
