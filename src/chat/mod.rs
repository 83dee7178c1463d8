//! Tutor chat completion proxy.
//!
//! `POST /api/chat` forwards a conversation to the configured LLM with a
//! tutor system prompt in front. With `stream: true` the reply is delivered
//! as Server-Sent Events, one `token` event per content delta, closed by a
//! `done` event.

use axum::{
    extract::State,
    middleware,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::core::rate_limit::{ai_rate_limit, RateLimitState};
use crate::core::shared::state::AppState;
use crate::learn::auth::Identity;
use crate::learn::extract::ApiJson;
use crate::learn::{LearnError, LearnResult};
use crate::llm::{ChatMessage, ChatRole, GenerationOptions};

pub const MAX_MESSAGES: usize = 50;
const MAX_MESSAGE_CHARS: usize = 16_000;

const TUTOR_SYSTEM_PROMPT: &str = "You are a friendly, knowledgeable tutor on an online \
learning platform. Explain concepts step by step, check the student's understanding with \
short questions, and prefer guiding hints over handing out full solutions to exercises.";

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    Token { content: String },
    Error { message: String },
    Done,
}

impl ChatEvent {
    pub fn to_sse_event(&self) -> Result<Event, serde_json::Error> {
        let name = match self {
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
            Self::Done => "done",
        };
        Ok(Event::default().event(name).data(serde_json::to_string(self)?))
    }
}

fn parse_role(role: &str) -> Option<ChatRole> {
    match role.trim().to_ascii_lowercase().as_str() {
        "system" => Some(ChatRole::System),
        "user" => Some(ChatRole::User),
        "assistant" => Some(ChatRole::Assistant),
        _ => None,
    }
}

/// Validate the client conversation and put the tutor prompt in front of it
pub fn build_conversation(messages: Vec<IncomingMessage>) -> LearnResult<Vec<ChatMessage>> {
    if messages.is_empty() || messages.len() > MAX_MESSAGES {
        return Err(LearnError::validation(format!(
            "A conversation needs between 1 and {MAX_MESSAGES} messages"
        )));
    }

    let mut conversation = Vec::with_capacity(messages.len() + 1);
    conversation.push(ChatMessage::system(TUTOR_SYSTEM_PROMPT));

    for (idx, message) in messages.into_iter().enumerate() {
        let role = parse_role(&message.role).ok_or_else(|| {
            LearnError::validation(format!("Message {} has an unsupported role", idx + 1))
        })?;
        if message.content.trim().is_empty() {
            return Err(LearnError::validation(format!("Message {} is empty", idx + 1)));
        }
        if message.content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(LearnError::validation(format!(
                "Message {} exceeds {MAX_MESSAGE_CHARS} characters",
                idx + 1
            )));
        }
        conversation.push(ChatMessage {
            role,
            content: message.content,
        });
    }
    Ok(conversation)
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Identity(user_id): Identity,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Response, LearnError> {
    let conversation = build_conversation(req.messages)?;
    info!(
        "Chat request from {} ({} messages, stream={})",
        user_id,
        conversation.len() - 1,
        req.stream
    );

    if req.stream {
        return Ok(stream_reply(state, conversation).into_response());
    }

    let content = state
        .llm_provider
        .generate(&conversation, &GenerationOptions::default())
        .await
        .inspect_err(|e| warn!("Chat completion for {} failed: {}", user_id, e))?;

    Ok(Json(json!({ "success": true, "data": { "content": content } })).into_response())
}

fn stream_reply(
    state: Arc<AppState>,
    conversation: Vec<ChatMessage>,
) -> Sse<ReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(100);

    tokio::spawn(async move {
        let (delta_tx, mut delta_rx) = mpsc::channel::<String>(64);
        let options = GenerationOptions::default();

        let forward = async {
            while let Some(content) = delta_rx.recv().await {
                let Ok(event) = (ChatEvent::Token { content }).to_sse_event() else {
                    continue;
                };
                // Client went away
                if tx.send(Ok(event)).await.is_err() {
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(
            state
                .llm_provider
                .generate_stream(&conversation, &options, delta_tx),
            forward
        );

        if let Err(e) = result {
            warn!("Chat stream failed: {}", e);
            let event = ChatEvent::Error {
                message: "The AI service is unavailable right now".to_string(),
            };
            if let Ok(event) = event.to_sse_event() {
                let _ = tx.send(Ok(event)).await;
            }
        }

        if let Ok(event) = ChatEvent::Done.to_sse_event() {
            let _ = tx.send(Ok(event)).await;
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

pub fn configure_chat_routes(rate_limits: Arc<RateLimitState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(chat))
        .route_layer(middleware::from_fn_with_state(rate_limits, ai_rate_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            role: role.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_build_conversation_prepends_tutor_prompt() {
        let conversation =
            build_conversation(vec![msg("user", "What is a closure?"), msg("Assistant", "A function...")])
                .unwrap();
        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation[0].role, ChatRole::System);
        assert_eq!(conversation[1].role, ChatRole::User);
        assert_eq!(conversation[2].role, ChatRole::Assistant);
    }

    #[test]
    fn test_build_conversation_rejects_bad_input() {
        assert!(build_conversation(vec![]).is_err());
        assert!(build_conversation(vec![msg("tool", "hi")]).is_err());
        assert!(build_conversation(vec![msg("user", "   ")]).is_err());
        assert!(build_conversation(vec![msg("user", &"x".repeat(MAX_MESSAGE_CHARS + 1))]).is_err());

        let too_many: Vec<_> = (0..=MAX_MESSAGES).map(|_| msg("user", "hi")).collect();
        assert!(matches!(
            build_conversation(too_many),
            Err(LearnError::Validation(_))
        ));
    }

    #[test]
    fn test_chat_event_serialization() {
        let token = serde_json::to_value(ChatEvent::Token {
            content: "Hel".into(),
        })
        .unwrap();
        assert_eq!(token, json!({"type": "token", "data": {"content": "Hel"}}));

        let done = serde_json::to_value(ChatEvent::Done).unwrap();
        assert_eq!(done, json!({"type": "done"}));
    }

    #[test]
    fn test_request_stream_defaults_to_false() {
        let req: ChatRequest =
            serde_json::from_str(r#"{"messages": [{"role": "user", "content": "hi"}]}"#).unwrap();
        assert!(!req.stream);
    }
}
