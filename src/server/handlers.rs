use axum::Json;
use axum::extract::{Path, State};
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, error, info};

use super::events::{ClientEvent, ClientEventBody};
use super::{ApiError, AppState};
use crate::conversation::{Conversation, ConversationSummary, new_conversation_id};
use crate::ollama::{GenerateRequest, GenerationOptions};
use crate::prompt::ConversationTurn;
use crate::rag::{ComposedPrompt, PromptRequest};
use crate::stream::{CancellationToken, MAX_ATTEMPTS_LIMIT, StreamEvent};

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub persona: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_true")]
    pub use_rag: bool,
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl ChatRequest {
    pub(super) fn validate(&self) -> Result<(), ApiError> {
        if self.message.trim().is_empty() {
            return Err(ApiError::BadRequest("Message cannot be empty".to_string()));
        }
        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ApiError::BadRequest(format!(
                    "Temperature {temperature} is outside 0.0..=2.0"
                )));
            }
        }
        if let Some(attempts) = self.max_attempts {
            if !(1..=MAX_ATTEMPTS_LIMIT).contains(&attempts) {
                return Err(ApiError::BadRequest(format!(
                    "max_attempts {attempts} is outside 1..={MAX_ATTEMPTS_LIMIT}"
                )));
            }
        }
        Ok(())
    }

    fn prompt_request(&self) -> PromptRequest<'_> {
        PromptRequest {
            message: &self.message,
            persona: self.persona.as_deref(),
            system_override: self.system_prompt.as_deref(),
            model_override: self.model.as_deref(),
            temperature_override: self.temperature,
            use_rag: self.use_rag,
        }
    }
}

/// Compose the prompt from history and retrieved context, then record the user turn.
async fn prepare_generation(
    state: &AppState,
    request: &ChatRequest,
    conversation_id: &str,
) -> (ComposedPrompt, GenerateRequest) {
    let history = state.conversations.history(conversation_id).await;
    let composed = state
        .rag
        .compose(&request.prompt_request(), &history)
        .await;

    state
        .conversations
        .append(conversation_id, ConversationTurn::user(request.message.clone()))
        .await;

    let options = GenerationOptions {
        temperature: composed.temperature,
        ..state.generation
    };
    let generate = GenerateRequest::new(composed.model.clone(), composed.prompt.clone(), options)
        .with_keep_alive(state.keep_alive.clone());

    (composed, generate)
}

fn to_sse(event: &ClientEvent) -> Option<Event> {
    match Event::default().json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            error!("Failed to serialize stream event: {}", e);
            None
        }
    }
}

/// POST /api/chat/stream
///
/// Server-sent events: `start`, then `token`, `retry` and `restart` events, ending with
/// exactly one `complete` or `error`.
#[inline]
pub async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    request.validate()?;

    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(new_conversation_id);
    let (composed, generate) = prepare_generation(&state, &request, &conversation_id).await;
    let max_attempts = request.max_attempts.unwrap_or(state.max_attempts);

    info!(
        "Streaming conversation {} with model {} (persona {}, {} context chunks)",
        conversation_id,
        composed.model,
        composed.persona,
        composed.citations.len()
    );

    let cancel = CancellationToken::new();
    let registration = state.registry.register(&conversation_id, cancel.clone());
    let mut events = state
        .relay
        .relay_with_cancel(generate, max_attempts, cancel);

    let stream = async_stream::stream! {
        // Dropped with the stream, which also covers client disconnects.
        let _registration = registration;

        let start = ClientEvent::new(
            conversation_id.clone(),
            ClientEventBody::Start {
                model: composed.model,
                persona: composed.persona,
                citations: composed.citations,
            },
        );
        if let Some(sse) = to_sse(&start) {
            yield Ok(sse);
        }

        while let Some(event) = events.next().await {
            if let StreamEvent::Complete { full_text, .. } = &event {
                state
                    .conversations
                    .append(&conversation_id, ConversationTurn::assistant(full_text.clone()))
                    .await;
            }

            let body = ClientEventBody::from(event);
            let terminal = body.is_terminal();
            if let Some(sse) = to_sse(&ClientEvent::new(conversation_id.clone(), body)) {
                yield Ok(sse);
            }

            if terminal {
                break;
            }
        }

        debug!("Stream for conversation {} closed", conversation_id);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub success: bool,
    pub conversation_id: String,
    pub message: String,
}

/// POST /api/chat/cancel/{conversation_id}
#[inline]
pub async fn cancel_stream(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    if !state.registry.cancel(&conversation_id) {
        return Err(ApiError::NotFound(format!(
            "No active stream for conversation {conversation_id}"
        )));
    }

    info!("Cancellation requested for conversation {}", conversation_id);
    Ok(Json(CancelResponse {
        success: true,
        conversation_id,
        message: "Cancellation requested".to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub conversation_id: String,
    pub response: String,
    pub model_info: Value,
}

/// POST /api/chat/send
#[inline]
pub async fn chat_send(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    request.validate()?;

    let conversation_id = request
        .conversation_id
        .clone()
        .unwrap_or_else(new_conversation_id);
    let (composed, generate) = prepare_generation(&state, &request, &conversation_id).await;

    let generated = state
        .client
        .generate(&generate)
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;

    state
        .conversations
        .append(
            &conversation_id,
            ConversationTurn::assistant(generated.response.clone()),
        )
        .await;

    Ok(Json(ChatResponse {
        success: true,
        conversation_id,
        model_info: json!({
            "model": generated.model,
            "persona": composed.persona,
            "total_duration": generated.total_duration,
            "eval_count": generated.eval_count,
            "citations": composed.citations,
        }),
        response: generated.response,
    }))
}

/// GET /api/chat/conversations
#[inline]
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<&'static str, Vec<ConversationSummary>>> {
    Json(BTreeMap::from([(
        "conversations",
        state.conversations.list().await,
    )]))
}

/// GET /api/chat/conversations/{conversation_id}
#[inline]
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Conversation>, ApiError> {
    state
        .conversations
        .get(&conversation_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Conversation {conversation_id} not found")))
}

/// DELETE /api/chat/conversations/{conversation_id}
#[inline]
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.conversations.delete(&conversation_id).await {
        return Err(ApiError::NotFound(format!(
            "Conversation {conversation_id} not found"
        )));
    }

    Ok(Json(json!({
        "success": true,
        "conversation_id": conversation_id,
    })))
}

fn default_document_type() -> String {
    "text".to_string()
}

fn default_source() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentRequest {
    pub content: String,
    #[serde(default = "default_document_type")]
    pub document_type: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub success: bool,
    pub document_id: String,
    pub chunks_created: usize,
}

/// POST /api/documents
#[inline]
pub async fn add_document(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let ingested = state
        .rag
        .index()
        .ingest(
            &request.content,
            &request.document_type,
            &request.source,
            request.metadata,
        )
        .await?;

    Ok(Json(DocumentResponse {
        success: true,
        document_id: ingested.document_id,
        chunks_created: ingested.chunks_created,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    pub source: String,
    pub relevance_score: f32,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub documents: Vec<SearchHit>,
}

/// POST /api/documents/search
#[inline]
pub async fn search_documents(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("Query cannot be empty".to_string()));
    }

    let config = state.rag.config();
    let limit = request.limit.unwrap_or(config.search_limit);
    let threshold = request
        .similarity_threshold
        .unwrap_or(config.similarity_threshold);

    let documents = state
        .rag
        .index()
        .query(&request.query, limit, threshold)
        .await
        .into_iter()
        .map(|result| SearchHit {
            id: result.chunk.id.clone(),
            content: result.chunk.content.clone(),
            source: result.chunk.source.clone(),
            relevance_score: result.score,
            metadata: result.chunk.metadata.clone(),
        })
        .collect();

    Ok(Json(SearchResponse { documents }))
}

/// GET /health
#[inline]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let upstream_healthy = state.client.health_check().await;

    Json(json!({
        "status": if upstream_healthy { "healthy" } else { "degraded" },
        "ollama_connected": upstream_healthy,
        "indexed_chunks": state.rag.index().len().await,
        "conversations": state.conversations.len().await,
        "active_streams": state.registry.active_count(),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// GET /models
#[inline]
pub async fn models(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let models = state
        .client
        .list_models()
        .await
        .map_err(|e| ApiError::Upstream(format!("{e:#}")))?;

    Ok(Json(json!({
        "models": models,
        "default_model": state.rag.personas().default_persona().model,
    })))
}
