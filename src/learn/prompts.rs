//! Prompt builders and output parsers for the AI-backed learn features.

use serde::Deserialize;
use serde_json::Value;

use super::error::{LearnError, LearnResult};
use super::quizzes::validate_questions;
use super::types::QuizQuestion;
use crate::core::shared::utils::truncate_chars;
use crate::llm::{extract_json, ChatMessage, GenerationOptions, LlmError};

/// Lecture text beyond this is cut before it goes into a prompt
const MAX_CONTEXT_CHARS: usize = 6000;

pub const DEFAULT_GENERATED_QUESTIONS: usize = 5;
pub const MAX_GENERATED_QUESTIONS: usize = 20;

const QUIZ_SYSTEM_PROMPT: &str = "You are an expert instructional designer. \
You write clear multiple-choice questions that check understanding rather than recall. \
Always answer with valid JSON and nothing else.";

const REMEDIAL_SYSTEM_PROMPT: &str = "You are a patient tutor. \
A student answered some quiz questions incorrectly. For each mistake, explain the \
underlying concept, why the chosen answer is wrong and why the correct answer is right. \
Finish with two short practice questions and their answers. Use Markdown.";

pub fn clamp_question_count(requested: Option<usize>) -> LearnResult<usize> {
    let count = requested.unwrap_or(DEFAULT_GENERATED_QUESTIONS);
    if !(1..=MAX_GENERATED_QUESTIONS).contains(&count) {
        return Err(LearnError::validation(format!(
            "Number of questions must be between 1 and {MAX_GENERATED_QUESTIONS}"
        )));
    }
    Ok(count)
}

pub fn quiz_generation_messages(
    lecture_title: &str,
    lecture_content: Option<&str>,
    num_questions: usize,
) -> Vec<ChatMessage> {
    let content = lecture_content
        .map(|c| truncate_chars(c.trim(), MAX_CONTEXT_CHARS))
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "(no written content; rely on the title)".to_string());

    let user = format!(
        "Create {num_questions} multiple-choice questions for the lecture below.\n\n\
         Lecture title: {lecture_title}\n\
         Lecture content:\n{content}\n\n\
         Respond with a JSON object of the form \
         {{\"questions\": [{{\"question\": \"...\", \"options\": [\"...\", \"...\", \"...\", \"...\"], \
         \"correct_answer_index\": 0, \"explanation\": \"...\"}}]}}. \
         Each question has 4 options and exactly one correct answer; \
         correct_answer_index is zero-based."
    );

    vec![ChatMessage::system(QUIZ_SYSTEM_PROMPT), ChatMessage::user(user)]
}

pub fn quiz_generation_options() -> GenerationOptions {
    GenerationOptions {
        temperature: Some(0.4),
        max_tokens: None,
        json_mode: true,
    }
}

/// Model output is loose about key casing, so accept the common spellings
#[derive(Debug, Deserialize)]
struct GeneratedQuestion {
    question: String,
    options: Vec<String>,
    #[serde(alias = "correctAnswerIndex", alias = "answer_index", alias = "correct_index")]
    correct_answer_index: usize,
    #[serde(default)]
    explanation: Option<String>,
}

impl From<GeneratedQuestion> for QuizQuestion {
    fn from(q: GeneratedQuestion) -> Self {
        Self {
            question: q.question.trim().to_string(),
            options: q.options.into_iter().map(|o| o.trim().to_string()).collect(),
            correct_answer_index: q.correct_answer_index,
            explanation: q
                .explanation
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
        }
    }
}

/// Parse and validate generated questions. Accepts a bare array or an object
/// with a `questions` array, optionally wrapped in code fences or prose.
pub fn parse_generated_questions(raw: &str) -> LearnResult<Vec<QuizQuestion>> {
    let value = extract_json(raw)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("questions") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(LlmError::Parse("expected a \"questions\" array".to_string()).into());
            }
        },
        _ => return Err(LlmError::Parse("expected a JSON array of questions".to_string()).into()),
    };

    let questions: Vec<QuizQuestion> = items
        .into_iter()
        .map(|item| {
            serde_json::from_value::<GeneratedQuestion>(item)
                .map(QuizQuestion::from)
                .map_err(|e| LlmError::Parse(format!("malformed question: {e}")))
        })
        .collect::<Result<_, _>>()?;

    validate_questions(&questions).map_err(|e| match e {
        LearnError::Validation(msg) => LearnError::Llm(LlmError::Parse(msg)),
        other => other,
    })?;
    Ok(questions)
}

/// One wrong answer as presented to the tutor model
#[derive(Debug, Clone, PartialEq)]
pub struct RemedialItem {
    pub question: String,
    pub selected_answer: Option<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
}

pub fn remedial_messages(
    course_title: &str,
    lecture_title: &str,
    lecture_content: Option<&str>,
    items: &[RemedialItem],
) -> Vec<ChatMessage> {
    let mut user = format!("Course: {course_title}\nLecture: {lecture_title}\n");
    if let Some(content) = lecture_content.map(str::trim).filter(|c| !c.is_empty()) {
        user.push_str("\nLecture notes:\n");
        user.push_str(&truncate_chars(content, MAX_CONTEXT_CHARS));
        user.push('\n');
    }

    user.push_str("\nThe student's mistakes:\n");
    for (idx, item) in items.iter().enumerate() {
        user.push_str(&format!(
            "\n{}. Question: {}\n   Student answered: {}\n   Correct answer: {}\n",
            idx + 1,
            item.question,
            item.selected_answer.as_deref().unwrap_or("(no answer)"),
            item.correct_answer,
        ));
        if let Some(explanation) = &item.explanation {
            user.push_str(&format!("   Instructor note: {explanation}\n"));
        }
    }

    vec![ChatMessage::system(REMEDIAL_SYSTEM_PROMPT), ChatMessage::user(user)]
}
