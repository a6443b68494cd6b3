use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// A stored score. Older rows hold a bare number, a numeric string or an
/// object with `marks_awarded`; new rows are always written as a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Number(f64),
    Text(String),
    Awarded { marks_awarded: f64 },
}

impl ScoreValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScoreValue::Number(n) => Some(*n),
            ScoreValue::Text(s) => s.trim().parse::<f64>().ok(),
            ScoreValue::Awarded { marks_awarded } => Some(*marks_awarded),
        }
        .filter(|n| n.is_finite())
    }
}

impl From<f64> for ScoreValue {
    fn from(value: f64) -> Self {
        ScoreValue::Number(value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QuestionResult {
    pub id: Uuid,
    pub question_id: Uuid,
    pub assessment_id: Uuid,
    pub student_id: Uuid,
    pub score: Json<ScoreValue>,
    pub feedback: String,
    pub graded_at: DateTime<Utc>,
}

impl QuestionResult {
    pub fn score(&self) -> f64 {
        self.score.0.as_f64().unwrap_or(0.0)
    }
}

/// Sums stored scores. Values that cannot be read as a number count as zero
/// and are reported through `tracing`.
pub fn aggregate_scores<'a, I>(scores: I) -> f64
where
    I: IntoIterator<Item = &'a ScoreValue>,
{
    scores
        .into_iter()
        .map(|s| match s.as_f64() {
            Some(n) => n,
            None => {
                tracing::warn!(score = ?s, "Ignoring unreadable score during aggregation");
                0.0
            }
        })
        .sum()
}
