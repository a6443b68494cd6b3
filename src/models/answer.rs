use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A student's answer as received, before anything is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerInput {
    Text(String),
    Image { filename: String, data: Vec<u8> },
}

impl AnswerInput {
    /// Checks that `answer_type` names the modality that was actually sent.
    pub fn from_parts(
        answer_type: Option<&str>,
        text: Option<String>,
        image: Option<(String, Vec<u8>)>,
    ) -> Result<Self, String> {
        let answer_type = answer_type
            .map(|t| t.trim().to_ascii_lowercase())
            .ok_or("answer_type is required")?;
        match answer_type.as_str() {
            "text" => {
                let text = text
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .ok_or("text_answer is required for text answers")?;
                Ok(AnswerInput::Text(text))
            }
            "image" => {
                let (filename, data) = image
                    .filter(|(_, data)| !data.is_empty())
                    .ok_or("An image file is required for image answers")?;
                Ok(AnswerInput::Image { filename, data })
            }
            other => Err(format!(
                "Invalid answer_type '{}'. Must be 'text' or 'image'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Answer {
    pub id: Uuid,
    pub question_id: Uuid,
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub text_answer: Option<String>,
    pub image_path: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_answers_need_text() {
        assert_eq!(
            AnswerInput::from_parts(Some("text"), Some(" because ".into()), None).unwrap(),
            AnswerInput::Text("because".into())
        );
        assert!(AnswerInput::from_parts(Some("text"), Some("   ".into()), None).is_err());
        assert!(AnswerInput::from_parts(Some("TEXT"), None, None).is_err());
    }

    #[test]
    fn image_answers_need_a_file() {
        let img = AnswerInput::from_parts(Some("image"), None, Some(("a.png".into(), vec![1])));
        assert!(matches!(img, Ok(AnswerInput::Image { .. })));
        assert!(AnswerInput::from_parts(Some("image"), Some("text".into()), None).is_err());
        assert!(AnswerInput::from_parts(Some("image"), None, Some(("a.png".into(), vec![]))).is_err());
    }

    #[test]
    fn unknown_modality_is_rejected() {
        let err = AnswerInput::from_parts(Some("video"), None, None).unwrap_err();
        assert!(err.contains("video"));
        assert!(AnswerInput::from_parts(None, Some("x".into()), None).is_err());
    }
}
