use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The fixed question taxonomy. Everything except `OpenEnded` is answered by
/// picking from a finite set of choices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionType {
    #[serde(rename = "open-ended")]
    OpenEnded,
    #[serde(rename = "close-ended-multiple-single")]
    MultipleSingle,
    #[serde(rename = "close-ended-multiple-multiple")]
    MultipleMultiple,
    #[serde(rename = "close-ended-bool")]
    Bool,
    #[serde(rename = "close-ended-matching")]
    Matching,
    #[serde(rename = "close-ended-ordering")]
    Ordering,
    #[serde(rename = "close-ended-drag-drop")]
    DragDrop,
}

impl QuestionType {
    pub const ALL: [QuestionType; 7] = [
        QuestionType::OpenEnded,
        QuestionType::MultipleSingle,
        QuestionType::MultipleMultiple,
        QuestionType::Bool,
        QuestionType::Matching,
        QuestionType::Ordering,
        QuestionType::DragDrop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::OpenEnded => "open-ended",
            QuestionType::MultipleSingle => "close-ended-multiple-single",
            QuestionType::MultipleMultiple => "close-ended-multiple-multiple",
            QuestionType::Bool => "close-ended-bool",
            QuestionType::Matching => "close-ended-matching",
            QuestionType::Ordering => "close-ended-ordering",
            QuestionType::DragDrop => "close-ended-drag-drop",
        }
    }

    pub fn is_close_ended(&self) -> bool {
        !matches!(self, QuestionType::OpenEnded)
    }

    /// Prompt-facing description of how the question is answered.
    pub fn describe(&self) -> &'static str {
        match self {
            QuestionType::OpenEnded => "open-ended (requiring written explanations)",
            QuestionType::MultipleSingle => "multiple choice with exactly one correct answer",
            QuestionType::MultipleMultiple => "multiple choice with one or more correct answers",
            QuestionType::Bool => "true/false",
            QuestionType::Matching => "matching pairs",
            QuestionType::Ordering => "ordering items into the correct sequence",
            QuestionType::DragDrop => "drag-and-drop into the correct slots",
        }
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        QuestionType::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| {
                format!(
                    "Invalid question type '{}'. Allowed: {}",
                    s,
                    QuestionType::ALL.map(|t| t.as_str()).join(", ")
                )
            })
    }
}

/// A question's answer format with the fields each variant requires.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionFormat {
    OpenEnded,
    CloseEnded {
        kind: QuestionType,
        choices: Vec<String>,
    },
}

impl QuestionFormat {
    /// Builds the variant for `question_type`, rejecting close-ended questions
    /// without choices. Choices sent with an open-ended question are dropped.
    pub fn new(question_type: QuestionType, choices: Option<Vec<String>>) -> Result<Self, String> {
        if !question_type.is_close_ended() {
            return Ok(QuestionFormat::OpenEnded);
        }
        let choices: Vec<String> = choices
            .unwrap_or_default()
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if choices.is_empty() {
            return Err(format!(
                "Questions of type '{}' require a non-empty choices list",
                question_type
            ));
        }
        Ok(QuestionFormat::CloseEnded {
            kind: question_type,
            choices,
        })
    }

    pub fn question_type(&self) -> QuestionType {
        match self {
            QuestionFormat::OpenEnded => QuestionType::OpenEnded,
            QuestionFormat::CloseEnded { kind, .. } => *kind,
        }
    }

    pub fn choices(&self) -> Option<&[String]> {
        match self {
            QuestionFormat::OpenEnded => None,
            QuestionFormat::CloseEnded { choices, .. } => Some(choices),
        }
    }
}

/// A question that passed validation and is ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuestion {
    pub text: String,
    pub marks: f64,
    pub format: QuestionFormat,
    pub rubric: String,
    pub correct_answer: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub text: String,
    pub marks: f64,
    pub question_type: String,
    pub rubric: String,
    pub correct_answer: Vec<String>,
    pub choices: Option<Json<Vec<String>>>,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Question {
    pub fn kind(&self) -> Option<QuestionType> {
        self.question_type.parse().ok()
    }

    /// Copy safe to show a student before grading.
    pub fn without_answers(mut self) -> Self {
        self.correct_answer.clear();
        self.rubric.clear();
        self
    }
}
