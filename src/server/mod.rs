// HTTP server
// axum routes exposing the relayed event stream, conversations and the document index

pub mod error;
pub mod events;
pub mod handlers;
pub mod registry;


use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use error::ApiError;
pub use events::{ClientEvent, ClientEventBody};
pub use registry::{RegistrationGuard, RequestRegistry};

use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::embeddings::{Embedder, OllamaEmbedder};
use crate::index::VectorIndex;
use crate::ollama::{GenerationOptions, OllamaClient};
use crate::prompt::PromptBuilder;
use crate::rag::RagOrchestrator;
use crate::stream::{StreamRelay, UpstreamTransport};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Everything a request handler needs, built once at start-up.
pub struct AppState {
    pub client: OllamaClient,
    pub relay: StreamRelay,
    pub rag: RagOrchestrator,
    pub conversations: ConversationStore,
    pub registry: RequestRegistry,
    pub generation: GenerationOptions,
    pub keep_alive: String,
    pub max_attempts: u32,
}

impl AppState {
    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = OllamaClient::from_config(config)?;
        let embedder: Arc<dyn Embedder> = Arc::new(OllamaEmbedder::from_config(config)?);
        let personas = config
            .persona_table()
            .context("Invalid persona configuration")?;

        let index = Arc::new(VectorIndex::new(embedder, config.chunking));
        let rag = RagOrchestrator::new(
            index,
            Arc::new(personas),
            PromptBuilder::new(config.conversations.history_turns),
            config.rag.clone(),
        );

        let transport: Arc<dyn UpstreamTransport> = Arc::new(client.clone());
        let relay = StreamRelay::new(transport, config.relay.clone());

        Ok(Self {
            client,
            relay,
            rag,
            conversations: ConversationStore::new(config.conversations.clone()),
            registry: RequestRegistry::default(),
            generation: config.generation,
            keep_alive: config.ollama.keep_alive.clone(),
            max_attempts: config.relay.max_attempts,
        })
    }
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat/stream", post(handlers::chat_stream))
        .route("/api/chat/send", post(handlers::chat_send))
        .route("/api/chat/cancel/{conversation_id}", post(handlers::cancel_stream))
        .route("/api/chat/conversations", get(handlers::list_conversations))
        .route(
            "/api/chat/conversations/{conversation_id}",
            get(handlers::get_conversation).delete(handlers::delete_conversation),
        )
        .route("/api/documents", post(handlers::add_document))
        .route("/api/documents/search", post(handlers::search_documents))
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::models))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until the shutdown future resolves.
#[inline]
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener
        .local_addr()
        .context("Failed to read listener address")?;
    info!("Listening on http://{}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}
