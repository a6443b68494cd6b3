use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssessmentKind {
    #[serde(rename = "CAT")]
    Cat,
    Assignment,
    #[serde(rename = "Case Study")]
    CaseStudy,
}

impl AssessmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentKind::Cat => "CAT",
            AssessmentKind::Assignment => "Assignment",
            AssessmentKind::CaseStudy => "Case Study",
        }
    }
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssessmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "cat" => Ok(AssessmentKind::Cat),
            "assignment" => Ok(AssessmentKind::Assignment),
            "casestudy" => Ok(AssessmentKind::CaseStudy),
            _ => Err(format!(
                "Invalid assessment type '{}'. Allowed: CAT, Assignment, Case Study",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assessment {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub unit_id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub assessment_type: String,
    pub questions_type: Vec<String>,
    pub total_marks: f64,
    pub number_of_questions: i32,
    pub difficulty: String,
    pub blooms_level: Option<String>,
    pub week: Option<i32>,
    pub verified: bool,
    pub schedule_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assessment {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.creator_id == user_id
    }
}

/// Assessment metadata after request validation, shared by manual and
/// generated creation.
#[derive(Debug, Clone)]
pub struct AssessmentDraft {
    pub unit_id: Uuid,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub kind: AssessmentKind,
    pub questions_type: Vec<crate::models::question::QuestionType>,
    pub total_marks: f64,
    pub number_of_questions: i32,
    pub difficulty: String,
    pub blooms_level: Option<String>,
    pub week: Option<i32>,
    pub schedule_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assessment_kind_accepts_loose_spelling() {
        assert_eq!("cat".parse::<AssessmentKind>().unwrap(), AssessmentKind::Cat);
        assert_eq!(
            "case-study".parse::<AssessmentKind>().unwrap(),
            AssessmentKind::CaseStudy
        );
        assert_eq!(
            "Case Study".parse::<AssessmentKind>().unwrap(),
            AssessmentKind::CaseStudy
        );
        assert!("exam".parse::<AssessmentKind>().is_err());
    }
}
