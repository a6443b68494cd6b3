use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::error::AiError;
use crate::models::assessment::AssessmentDraft;
use crate::models::question::{NewQuestion, QuestionFormat, QuestionType};
use crate::services::completion_client::{CompletionClient, CompletionRequest, UserContent};

/// Reference documents are cut to this many characters before prompting.
pub const MAX_DOCUMENT_CHARS: usize = 12_000;

pub struct GenerationInput<'a> {
    pub draft: &'a AssessmentDraft,
    pub unit_name: &'a str,
    pub document_text: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum GradedAnswer {
    Text(String),
    Image { bytes: Vec<u8>, mime_type: String },
}

#[derive(Debug, Clone)]
pub struct GradingContext {
    pub answer: GradedAnswer,
    pub question_text: String,
    pub rubric: String,
    pub correct_answer: Vec<String>,
    pub marks: f64,
    pub hobbies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Grade {
    pub score: f64,
    pub feedback: String,
}

#[derive(Clone)]
pub struct AIService {
    client: Arc<dyn CompletionClient>,
}

impl AIService {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    pub async fn generate_questions(
        &self,
        input: &GenerationInput<'_>,
    ) -> Result<Vec<NewQuestion>, AiError> {
        let request = CompletionRequest {
            system: GENERATION_SYSTEM_PROMPT.to_string(),
            user: UserContent::Text(build_generation_prompt(input)),
            max_tokens: 4096,
            temperature: 1.0,
        };
        tracing::info!(
            unit = input.unit_name,
            questions = input.draft.number_of_questions,
            with_document = input.document_text.is_some(),
            "Requesting question generation"
        );
        let raw = self.client.complete(&request).await?;
        let questions = parse_generated_questions(&raw)?;
        tracing::info!(count = questions.len(), "Generated questions parsed");
        Ok(questions)
    }

    pub async fn grade(&self, ctx: &GradingContext) -> Result<Grade, AiError> {
        let prompt = build_grading_prompt(ctx);
        let user = match &ctx.answer {
            GradedAnswer::Text(_) => UserContent::Text(prompt),
            GradedAnswer::Image { bytes, mime_type } => UserContent::TextWithImage {
                text: prompt,
                image_data_url: format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)),
            },
        };
        let request = CompletionRequest {
            system: GRADING_SYSTEM_PROMPT.to_string(),
            user,
            max_tokens: 512,
            temperature: 0.7,
        };
        let raw = self.client.complete(&request).await?;
        parse_grading_response(&raw, ctx.marks)
    }
}

const GENERATION_SYSTEM_PROMPT: &str = "You are an expert in creating university-level assessments. \
Generate a comprehensive assessment based on the provided parameters. \
Ensure the assessment is engaging, challenging, and suitable for the specified unit and topic. \
Respond with JSON only.";

const GRADING_SYSTEM_PROMPT: &str = "You are a university examiner. \
Grade student responses using the rubric provided. \
Give a numerical score and a short, helpful feedback.";

pub fn build_generation_prompt(input: &GenerationInput<'_>) -> String {
    let draft = input.draft;
    let types = draft
        .questions_type
        .iter()
        .map(|t| format!("\"{}\" ({})", t.as_str(), t.describe()))
        .collect::<Vec<_>>()
        .join(", ");
    let allowed = QuestionType::ALL
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = format!(
        "Generate a {difficulty} level {kind} assessment at Bloom's level '{blooms}' for the topic '{topic}' \
in unit '{unit}'.\nDescription: {description}\n\
Create exactly {count} questions totaling {marks} marks using these question types: {types}.\n",
        difficulty = draft.difficulty,
        kind = draft.kind,
        blooms = draft.blooms_level.as_deref().unwrap_or("unspecified"),
        topic = draft.topic,
        unit = input.unit_name,
        description = draft.description,
        count = draft.number_of_questions,
        marks = draft.total_marks,
        types = types,
    );

    if let Some(doc) = input.document_text.map(str::trim).filter(|d| !d.is_empty()) {
        prompt.push_str(
            "\nBase the questions on the following reference material:\n\"\"\"\n",
        );
        prompt.push_str(truncate_chars(doc, MAX_DOCUMENT_CHARS));
        prompt.push_str("\n\"\"\"\n");
    }

    prompt.push_str(&format!(
        "\nReturn a strict JSON array and nothing else. Each element must have this shape:\n\
{{\"text\": \"Question text\", \"marks\": 5, \"type\": \"<one of: {allowed}>\", \
\"rubric\": \"How to award the marks\", \"correct_answer\": [\"Canonical answer\"], \
\"choices\": [\"Choice 1\", \"Choice 2\"]}}\n\
\"choices\" is required and non-empty for every type except \"open-ended\", where it must be omitted.",
        allowed = allowed
    ));
    prompt
}

pub fn build_grading_prompt(ctx: &GradingContext) -> String {
    let mut prompt = match &ctx.answer {
        GradedAnswer::Text(_) => "Grade the following text answer for the question:\n".to_string(),
        GradedAnswer::Image { .. } => {
            "Grade the attached image answer for the question:\n".to_string()
        }
    };
    prompt.push_str(&format!(
        "{}\n\nRubric: {}\nCorrect Answer: {}\nMarks: {}\n\n",
        ctx.question_text,
        ctx.rubric,
        ctx.correct_answer.join("; "),
        ctx.marks
    ));
    if let GradedAnswer::Text(text) = &ctx.answer {
        prompt.push_str(&format!("Answer: {}\n\n", text));
    }
    if !ctx.hobbies.is_empty() {
        prompt.push_str(&format!(
            "The student enjoys {}. Where it helps, relate the feedback to these interests.\n\n",
            ctx.hobbies.join(", ")
        ));
    }
    prompt.push_str(&format!(
        "Award a score between 0 and {} and explain it briefly. \
Return strict JSON: {{\"score\": <score_awarded>, \"feedback\": \"...\"}}",
        ctx.marks
    ));
    prompt
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Removes ```json / ``` fences wherever they appear.
pub fn strip_code_fences(raw: &str) -> String {
    let mut out = raw.replace("```json", "").replace("```JSON", "");
    out = out.replace("```", "");
    out.trim().to_string()
}

/// Greedy span from the first `{` to the last `}`.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

pub fn parse_grading_response(raw: &str, marks: f64) -> Result<Grade, AiError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(AiError::NoResponse);
    }
    let object = extract_json_object(&cleaned).ok_or(AiError::NoJsonObject)?;
    let value: JsonValue =
        serde_json::from_str(object).map_err(|e| AiError::InvalidJson(e.to_string()))?;

    let score = match value.get("score") {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|s| s.is_finite())
    .ok_or_else(|| {
        AiError::NonNumericScore(
            value
                .get("score")
                .map(|v| v.to_string())
                .unwrap_or_else(|| "null".to_string()),
        )
    })?;

    if score < 0.0 || score > marks {
        return Err(AiError::ScoreOutOfBounds { score, marks });
    }

    let feedback = match value.get("feedback") {
        Some(JsonValue::String(s)) => s.trim().to_string(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(Grade { score, feedback })
}

/// Accepts a bare array, a `{"questions": [...]}` wrapper or an object keyed
/// `question_1`, `question_2`, ... and validates every entry.
pub fn parse_generated_questions(raw: &str) -> Result<Vec<NewQuestion>, AiError> {
    let cleaned = strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(AiError::NoResponse);
    }
    let value: JsonValue =
        serde_json::from_str(&cleaned).map_err(|e| AiError::InvalidJson(e.to_string()))?;

    let items: Vec<JsonValue> = match value {
        JsonValue::Array(items) => items,
        JsonValue::Object(mut map) => match map.remove("questions") {
            Some(JsonValue::Array(items)) => items,
            Some(_) => {
                return Err(AiError::SchemaViolation(
                    "\"questions\" must be an array".into(),
                ))
            }
            None => {
                let mut keyed: Vec<(String, JsonValue)> = map.into_iter().collect();
                if keyed.iter().any(|(_, v)| !v.is_object()) {
                    return Err(AiError::SchemaViolation(
                        "expected an array of question objects".into(),
                    ));
                }
                keyed.sort_by_key(|(k, _)| (trailing_number(k), k.clone()));
                keyed.into_iter().map(|(_, v)| v).collect()
            }
        },
        _ => {
            return Err(AiError::SchemaViolation(
                "expected an array of question objects".into(),
            ))
        }
    };

    if items.is_empty() {
        return Err(AiError::SchemaViolation("no questions were generated".into()));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_generated_question(item)
                .map_err(|msg| AiError::SchemaViolation(format!("question {}: {}", i + 1, msg)))
        })
        .collect()
}

fn trailing_number(key: &str) -> u64 {
    let digits: String = key
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(u64::MAX)
}

fn parse_generated_question(item: &JsonValue) -> Result<NewQuestion, String> {
    let obj = item.as_object().ok_or("entry is not an object")?;

    let text = obj
        .get("text")
        .or_else(|| obj.get("question"))
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or("missing question text")?
        .to_string();

    let marks = match obj.get("marks") {
        Some(JsonValue::Number(n)) => n.as_f64(),
        Some(JsonValue::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|m| m.is_finite() && *m >= 0.0)
    .ok_or("marks must be a non-negative number")?;

    let kind: QuestionType = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("missing question type")?
        .parse()?;

    let choices = match obj.get("choices") {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::Array(values)) => Some(values.iter().map(json_to_text).collect()),
        Some(_) => return Err("choices must be an array".into()),
    };
    let format = QuestionFormat::new(kind, choices)?;

    let correct_answer = match obj.get("correct_answer") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(values)) => values.iter().map(json_to_text).collect(),
        Some(other) => vec![json_to_text(other)],
    };

    let rubric = obj
        .get("rubric")
        .map(json_to_text)
        .unwrap_or_default();

    Ok(NewQuestion {
        text,
        marks,
        format,
        rubric,
        correct_answer,
    })
}

fn json_to_text(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
