use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::assessment::{Assessment, AssessmentDraft, AssessmentKind};
use crate::models::question::{NewQuestion, Question, QuestionFormat, QuestionType};
use crate::models::submission::AttemptStatus;

/// A field clients may send either as a single string or as a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct QuestionPayload {
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub text: String,
    #[validate(range(min = 0.0, message = "Marks cannot be negative"))]
    pub marks: f64,
    #[serde(rename = "type")]
    pub question_type: String,
    #[serde(default)]
    pub rubric: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Vec<String>>)]
    pub correct_answer: Option<OneOrMany>,
    #[serde(default)]
    pub choices: Option<Vec<String>>,
}

impl QuestionPayload {
    pub fn into_new_question(self) -> Result<NewQuestion, String> {
        let kind: QuestionType = self.question_type.parse()?;
        let format = QuestionFormat::new(kind, self.choices)?;
        if !self.marks.is_finite() || self.marks < 0.0 {
            return Err(format!("Invalid marks {} for question", self.marks));
        }
        Ok(NewQuestion {
            text: self.text.trim().to_string(),
            marks: self.marks,
            format,
            rubric: self.rubric.unwrap_or_default(),
            correct_answer: self
                .correct_answer
                .map(OneOrMany::into_vec)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AssessmentMetadata {
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub title: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub description: String,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub topic: String,
    #[serde(rename = "type")]
    pub assessment_type: String,
    /// Taxonomy values, or the legacy `close-ended` plus `close_ended_type`.
    #[schema(value_type = Vec<String>)]
    pub questions_type: OneOrMany,
    pub close_ended_type: Option<String>,
    pub unit_id: Uuid,
    #[validate(range(min = 0.0, message = "Total marks cannot be negative"))]
    pub total_marks: f64,
    #[validate(range(min = 1, max = 100, message = "Number of questions must be between 1 and 100"))]
    pub number_of_questions: i32,
    #[validate(custom(function = "crate::utils::validation::non_blank"))]
    pub difficulty: String,
    pub blooms_level: Option<String>,
    pub week: Option<i32>,
    pub schedule_date: Option<DateTime<Utc>>,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(alias = "duration")]
    pub duration_minutes: Option<i32>,
}

impl AssessmentMetadata {
    pub fn question_types(&self) -> Result<Vec<QuestionType>, String> {
        let mut types = Vec::new();
        for raw in self.questions_type.clone().into_vec() {
            let raw = raw.trim().to_ascii_lowercase();
            let parsed = if raw == "close-ended" {
                let sub = self
                    .close_ended_type
                    .as_deref()
                    .map(|s| s.trim().to_ascii_lowercase())
                    .ok_or("close_ended_type is required for close-ended questions")?;
                let full = if sub.starts_with("close-ended-") {
                    sub
                } else {
                    format!("close-ended-{}", sub)
                };
                full.parse::<QuestionType>()?
            } else {
                raw.parse::<QuestionType>()?
            };
            if !types.contains(&parsed) {
                types.push(parsed);
            }
        }
        if types.is_empty() {
            return Err("questions_type must name at least one question type".into());
        }
        Ok(types)
    }

    pub fn into_draft(self) -> Result<AssessmentDraft, String> {
        let questions_type = self.question_types()?;
        let kind: AssessmentKind = self.assessment_type.parse()?;
        if let (Some(schedule), Some(deadline)) = (self.schedule_date, self.deadline) {
            if deadline < schedule {
                return Err("deadline cannot be before schedule_date".into());
            }
        }
        if matches!(self.duration_minutes, Some(d) if d <= 0) {
            return Err("duration must be a positive number of minutes".into());
        }
        Ok(AssessmentDraft {
            unit_id: self.unit_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            topic: self.topic.trim().to_string(),
            kind,
            questions_type,
            total_marks: self.total_marks,
            number_of_questions: self.number_of_questions,
            difficulty: self.difficulty.trim().to_string(),
            blooms_level: self.blooms_level,
            week: self.week,
            schedule_date: self.schedule_date,
            deadline: self.deadline,
            duration_minutes: self.duration_minutes,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateAssessmentRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub metadata: AssessmentMetadata,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssessmentCreatedResponse {
    pub message: String,
    pub assessment_id: Uuid,
    pub questions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionCreatedResponse {
    pub message: String,
    pub question_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentWithQuestions {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentAssessmentView {
    #[serde(flatten)]
    pub assessment: Assessment,
    pub unit_name: String,
    pub status: AttemptStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnswerGradedResponse {
    pub message: String,
    pub answer_id: Uuid,
    pub question_id: Uuid,
    pub assessment_id: Uuid,
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmissionResponse {
    pub message: String,
    pub submission_id: Uuid,
    pub total_marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CorrectResultRequest {
    pub score: f64,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StudentSubmissionView {
    pub submission_id: Uuid,
    pub assessment_id: Uuid,
    pub assessment_title: String,
    pub submitted_at: DateTime<Utc>,
    pub graded: bool,
    pub total_marks: Option<f64>,
    pub max_marks: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QuestionResultView {
    pub result_id: Uuid,
    pub question_id: Uuid,
    pub question_text: String,
    pub marks: f64,
    pub score: f64,
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssessmentResultRow {
    pub student_id: Uuid,
    pub registration_number: String,
    pub firstname: String,
    pub surname: String,
    pub submission_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub total_marks: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(questions_type: serde_json::Value) -> AssessmentMetadata {
        serde_json::from_value(json!({
            "title": "CAT 1",
            "description": "First CAT",
            "topic": "Recursion",
            "type": "CAT",
            "questions_type": questions_type,
            "unit_id": Uuid::new_v4(),
            "total_marks": 15,
            "number_of_questions": 3,
            "difficulty": "Intermediate",
            "blooms_level": "Apply"
        }))
        .unwrap()
    }

    #[test]
    fn questions_type_accepts_string_or_list() {
        let m = metadata(json!("open-ended"));
        assert_eq!(m.question_types().unwrap(), vec![QuestionType::OpenEnded]);

        let m = metadata(json!(["close-ended-bool", "open-ended", "close-ended-bool"]));
        assert_eq!(
            m.question_types().unwrap(),
            vec![QuestionType::Bool, QuestionType::OpenEnded]
        );
    }

    #[test]
    fn legacy_close_ended_needs_subtype() {
        let mut m = metadata(json!("close-ended"));
        assert!(m.question_types().is_err());
        m.close_ended_type = Some("multiple-single".into());
        assert_eq!(m.question_types().unwrap(), vec![QuestionType::MultipleSingle]);
    }

    #[test]
    fn missing_required_field_fails_to_deserialize() {
        let res: Result<AssessmentMetadata, _> = serde_json::from_value(json!({
            "title": "CAT 1",
            "type": "CAT"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn manual_question_rules() {
        let bool_q: QuestionPayload = serde_json::from_value(json!({
            "text": "The sky is blue",
            "type": "close-ended-bool",
            "choices": ["True", "False"],
            "marks": 2
        }))
        .unwrap();
        let q = bool_q.into_new_question().unwrap();
        assert!(q.correct_answer.is_empty());
        assert_eq!(q.format.question_type(), QuestionType::Bool);

        let empty_choices: QuestionPayload = serde_json::from_value(json!({
            "text": "Pick one",
            "type": "close-ended-multiple-single",
            "choices": [],
            "marks": 2
        }))
        .unwrap();
        assert!(empty_choices.into_new_question().is_err());
    }

    #[test]
    fn correct_answer_may_be_a_single_string() {
        let q: QuestionPayload = serde_json::from_value(json!({
            "text": "Define recursion",
            "type": "open-ended",
            "correct_answer": "A function calling itself",
            "marks": 5
        }))
        .unwrap();
        assert_eq!(
            q.into_new_question().unwrap().correct_answer,
            vec!["A function calling itself".to_string()]
        );
    }

    #[test]
    fn draft_rejects_unknown_assessment_type() {
        let mut m = metadata(json!("open-ended"));
        m.assessment_type = "Exam".into();
        assert!(m.into_draft().is_err());
    }
}
