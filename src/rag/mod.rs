// Retrieval-augmented prompt composition
// Pulls relevant chunks from the vector index and assembles the final prompt for a persona

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::index::{SimilarityResult, VectorIndex};
use crate::prompt::{ConversationTurn, PersonaTable, PromptBuilder};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub enabled: bool,
    /// Chunks folded into a prompt
    pub context_limit: usize,
    /// Default result count for document searches
    pub search_limit: usize,
    pub similarity_threshold: f32,
}

impl Default for RagConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            context_limit: 3,
            search_limit: 5,
            similarity_threshold: 0.7,
        }
    }
}

/// A retrieved chunk that contributed to a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source: String,
    pub score: f32,
}

/// What the caller asked for, before persona resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptRequest<'a> {
    pub message: &'a str,
    pub persona: Option<&'a str>,
    pub system_override: Option<&'a str>,
    pub model_override: Option<&'a str>,
    pub temperature_override: Option<f32>,
    pub use_rag: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComposedPrompt {
    pub prompt: String,
    pub persona: String,
    pub model: String,
    pub temperature: f32,
    pub citations: Vec<Citation>,
}

pub struct RagOrchestrator {
    index: Arc<VectorIndex>,
    personas: Arc<PersonaTable>,
    builder: PromptBuilder,
    config: RagConfig,
}

impl RagOrchestrator {
    #[inline]
    pub fn new(
        index: Arc<VectorIndex>,
        personas: Arc<PersonaTable>,
        builder: PromptBuilder,
        config: RagConfig,
    ) -> Self {
        Self {
            index,
            personas,
            builder,
            config,
        }
    }

    #[inline]
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    #[inline]
    pub fn personas(&self) -> &PersonaTable {
        &self.personas
    }

    #[inline]
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Formatted context and citations for the best matches, or `None` when nothing qualifies.
    #[inline]
    pub async fn retrieve_context(&self, query: &str) -> Option<(String, Vec<Citation>)> {
        let results = self
            .index
            .query(
                query,
                self.config.context_limit,
                self.config.similarity_threshold,
            )
            .await;

        if results.is_empty() {
            debug!("No context above threshold {}", self.config.similarity_threshold);
            return None;
        }

        let citations = results
            .iter()
            .map(|result| Citation {
                chunk_id: result.chunk.id.clone(),
                source: result.chunk.source.clone(),
                score: result.score,
            })
            .collect();

        Some((format_context(&results), citations))
    }

    /// Resolve the persona, fetch context when enabled and lay out the prompt.
    #[inline]
    pub async fn compose(
        &self,
        request: &PromptRequest<'_>,
        history: &[ConversationTurn],
    ) -> ComposedPrompt {
        let persona = self.personas.resolve(request.persona);

        let retrieved = if self.config.enabled && request.use_rag {
            self.retrieve_context(request.message).await
        } else {
            None
        };
        let (context, citations) = retrieved.unzip();

        let prompt = self.builder.build(
            persona,
            request.system_override,
            history,
            context.as_deref(),
            request.message,
        );

        ComposedPrompt {
            prompt,
            persona: persona.name.clone(),
            model: request
                .model_override
                .filter(|model| !model.trim().is_empty())
                .unwrap_or(persona.model.as_str())
                .to_string(),
            temperature: request.temperature_override.unwrap_or(persona.temperature),
            citations: citations.unwrap_or_default(),
        }
    }
}

/// `Source: ..` / `Content: ..` blocks separated by blank lines.
#[inline]
pub fn format_context(results: &[SimilarityResult]) -> String {
    results
        .iter()
        .map(|result| {
            format!(
                "Source: {}\nContent: {}",
                result.chunk.source, result.chunk.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
