use super::*;
use crate::embeddings::chunking::ChunkingConfig;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::prompt::{DEFAULT_PERSONA, default_personas};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Two-dimensional embedding: mentions of "rust" versus everything else.
struct TopicEmbedder;

#[async_trait]
impl Embedder for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.to_lowercase().contains("rust") {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }
}

async fn orchestrator(config: RagConfig) -> RagOrchestrator {
    let index = Arc::new(VectorIndex::new(
        Arc::new(TopicEmbedder),
        ChunkingConfig::default(),
    ));
    index
        .ingest(
            "Rust guarantees memory safety without a garbage collector.",
            "text",
            "rust-book",
            BTreeMap::new(),
        )
        .await
        .expect("ingestion should succeed");
    index
        .ingest(
            "Bread needs flour, water and time.",
            "text",
            "cookbook",
            BTreeMap::new(),
        )
        .await
        .expect("ingestion should succeed");

    let personas = PersonaTable::new(default_personas(), DEFAULT_PERSONA)
        .expect("default personas should be valid");

    RagOrchestrator::new(index, Arc::new(personas), PromptBuilder::default(), config)
}

#[tokio::test]
async fn retrieved_context_is_formatted_with_sources() {
    let rag = orchestrator(RagConfig::default()).await;

    let (context, citations) = rag
        .retrieve_context("Tell me about Rust")
        .await
        .expect("should find context");

    assert_eq!(
        context,
        "Source: rust-book\nContent: Rust guarantees memory safety without a garbage collector."
    );
    assert_eq!(citations.len(), 1);
    assert_eq!(
        citations.first().map(|citation| citation.source.as_str()),
        Some("rust-book")
    );
}

#[tokio::test]
async fn compose_includes_context_and_persona_settings() {
    let rag = orchestrator(RagConfig::default()).await;
    let request = PromptRequest {
        message: "Is Rust garbage collected?",
        persona: Some("technical"),
        use_rag: true,
        ..PromptRequest::default()
    };

    let composed = rag.compose(&request, &[]).await;

    assert_eq!(composed.persona, "technical");
    assert_eq!(composed.model, "llama2");
    assert!((composed.temperature - 0.3).abs() < f32::EPSILON);
    assert!(composed.prompt.contains("Relevant Information: Source: rust-book"));
    assert!(composed.prompt.ends_with("User: Is Rust garbage collected?\n\nAssistant:"));
    assert_eq!(composed.citations.len(), 1);
}

#[tokio::test]
async fn context_is_skipped_when_disabled() {
    let rag = orchestrator(RagConfig {
        enabled: false,
        ..RagConfig::default()
    })
    .await;
    let request = PromptRequest {
        message: "Is Rust fast?",
        use_rag: true,
        ..PromptRequest::default()
    };

    let composed = rag.compose(&request, &[]).await;

    assert!(!composed.prompt.contains("Relevant Information"));
    assert!(composed.citations.is_empty());
}

#[tokio::test]
async fn context_is_skipped_when_not_requested() {
    let rag = orchestrator(RagConfig::default()).await;
    let request = PromptRequest {
        message: "Is Rust fast?",
        ..PromptRequest::default()
    };

    let composed = rag.compose(&request, &[]).await;

    assert!(!composed.prompt.contains("Relevant Information"));
}

#[tokio::test]
async fn overrides_win_over_persona() {
    let rag = orchestrator(RagConfig::default()).await;
    let request = PromptRequest {
        message: "Hello",
        persona: Some("unknown-persona"),
        system_override: Some("Reply in French."),
        model_override: Some("mistral"),
        temperature_override: Some(0.1),
        use_rag: false,
    };

    let composed = rag.compose(&request, &[ConversationTurn::user("Earlier")]).await;

    assert_eq!(composed.persona, DEFAULT_PERSONA);
    assert_eq!(composed.model, "mistral");
    assert!((composed.temperature - 0.1).abs() < f32::EPSILON);
    assert_eq!(
        composed.prompt,
        "System: Reply in French.\n\nUser: Earlier\n\nUser: Hello\n\nAssistant:"
    );
}
