// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface for the chat pipeline
//
// Responsibilities:
// - POST /api/chat/stream: admission gate (identity, validation, rate
//   limit) in front of the stream producer; responds with an SSE body
// - POST /api/auth/attempt: admission check the external auth screens
//   run before a sign-in attempt (low-throughput, long-window limiter)
// - Heartbeat endpoint
//
// Auth itself is an external collaborator; the user identity arrives in
// the `x-user-id` header set by the session layer in front of us. The
// gate always runs before any generation work begins.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Response, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::config::Config;
use crate::generate::Generator;
use crate::limit::RateLimiter;
use crate::stream::{ProducerConfig, StreamProducer};
use crate::validate::Validator;

/// Header carrying the caller's identity, set by the session layer.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of a chat stream request: the conversation so far. Only the
/// last message's content is consumed for generation.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<IncomingMessage>,
}

/// One conversation turn as sent by the client. Extra fields (ids,
/// timestamps) are accepted and ignored.
#[derive(Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub content: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Admission and request-shape failures, all recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing user identity")]
    Unauthorized,

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("request contains no messages")]
    EmptyConversation,

    #[error("{0}")]
    InvalidMessage(String),

    #[error("too many requests")]
    RateLimited { retry_after_ms: i64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::MalformedBody(_)
            | ApiError::EmptyConversation
            | ApiError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        };

        let message = self.to_string();

        if let ApiError::RateLimited { retry_after_ms } = self {
            let retry_after_secs = (retry_after_ms as f64 / 1000.0).ceil() as i64;
            let body = Json(serde_json::json!({
                "error": message,
                "retry_after_ms": retry_after_ms,
            }));
            return (
                status,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response();
        }

        let body = Json(serde_json::json!({ "error": message }));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into handlers. Everything is constructed up
/// front and injected, with no global singletons, so tests build isolated
/// instances with their own limiter policies.
#[derive(Clone)]
pub struct AppState {
    pub generator: Arc<dyn Generator>,
    pub validator: Arc<Validator>,
    pub chat_limiter: Arc<RateLimiter>,
    pub auth_limiter: Arc<RateLimiter>,
    pub producer_config: ProducerConfig,
}

impl AppState {
    /// Wire the state from config. The chat and auth limiters are
    /// distinct instances with distinct policies and never share state.
    pub fn new(generator: Arc<dyn Generator>, config: &Config) -> Self {
        Self {
            generator,
            validator: Arc::new(Validator::with_max_chars(config.producer.max_message_chars)),
            chat_limiter: Arc::new(RateLimiter::new(
                config.limits.chat.max_requests,
                config.limits.chat.window_ms,
            )),
            auth_limiter: Arc::new(RateLimiter::new(
                config.limits.auth.max_requests,
                config.limits.auth.window_ms,
            )),
            producer_config: ProducerConfig {
                pacing: std::time::Duration::from_millis(config.producer.pacing_ms),
                generation_timeout: std::time::Duration::from_millis(
                    config.producer.generation_timeout_ms,
                ),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

fn identity_of(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

/// Chat stream handler.
///
/// Gate order: identity, body shape, validation, rate limit. Only an
/// admitted request reaches the generator; a rejected one has no side
/// effects beyond the limiter recording admitted calls.
pub async fn chat_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response<Body>, ApiError> {
    let user_id = identity_of(&headers)?;

    let request: ChatRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    let last = request
        .messages
        .last()
        .ok_or(ApiError::EmptyConversation)?;

    let validation = state.validator.validate(&last.content);
    if !validation.is_valid {
        let reason = validation
            .error
            .unwrap_or_else(|| "invalid message".to_string());
        return Err(ApiError::InvalidMessage(reason));
    }

    if !state.chat_limiter.is_allowed(&user_id) {
        return Err(ApiError::RateLimited {
            retry_after_ms: state.chat_limiter.retry_after_ms(&user_id),
        });
    }

    tracing::info!(%user_id, chars = validation.sanitized.len(), "chat stream admitted");

    let producer = StreamProducer::new(state.generator.clone(), state.producer_config.clone());
    let frames = producer
        .produce(validation.sanitized)
        .map(Ok::<Bytes, Infallible>);

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(frames))
        .map_err(|e| ApiError::MalformedBody(e.to_string()))?;

    Ok(response)
}

/// Auth-attempt admission check. The external auth screens call this
/// before submitting credentials; it answers 204 or 429 and does
/// nothing else.
pub async fn auth_attempt(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user_id = identity_of(&headers)?;

    if !state.auth_limiter.is_allowed(&user_id) {
        return Err(ApiError::RateLimited {
            retry_after_ms: state.auth_limiter.retry_after_ms(&user_id),
        });
    }
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the chat pipeline routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat/stream", post(chat_stream))
        .route("/api/auth/attempt", post(auth_attempt))
        .route("/v1/heartbeat", get(heartbeat))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
