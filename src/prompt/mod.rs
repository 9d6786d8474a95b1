// Prompt construction
// Persona table and the section layout sent to the generation model


use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

use crate::config::ConfigError;

pub const DEFAULT_PERSONA: &str = "assistant";
pub const DEFAULT_HISTORY_TURNS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    pub name: String,
    pub model: String,
    pub temperature: f32,
    pub system_instruction: String,
}

/// Built-in personas used when the configuration file does not define any.
#[inline]
pub fn default_personas() -> Vec<PersonaConfig> {
    let persona = |name: &str, temperature: f32, system_instruction: &str| PersonaConfig {
        name: name.to_string(),
        model: "llama2".to_string(),
        temperature,
        system_instruction: system_instruction.to_string(),
    };

    vec![
        persona(
            DEFAULT_PERSONA,
            0.7,
            "You are a helpful assistant. Answer clearly and concisely.",
        ),
        persona(
            "creative",
            1.0,
            "You are an imaginative writer. Offer original ideas and vivid language.",
        ),
        persona(
            "technical",
            0.3,
            "You are a precise technical expert. Give accurate, detailed answers and say when you are unsure.",
        ),
        persona(
            "tutor",
            0.5,
            "You are a patient tutor. Explain concepts step by step and check understanding.",
        ),
    ]
}

/// Read-only persona lookup with a guaranteed default.
#[derive(Debug, Clone)]
pub struct PersonaTable {
    personas: Vec<PersonaConfig>,
    default: PersonaConfig,
}

impl PersonaTable {
    #[inline]
    pub fn new(personas: Vec<PersonaConfig>, default_name: &str) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();

        for persona in &personas {
            if persona.name.trim().is_empty() {
                return Err(ConfigError::EmptyPersonaName);
            }
            if persona.model.trim().is_empty() {
                return Err(ConfigError::InvalidModel(persona.model.clone()));
            }
            if !(0.0..=2.0).contains(&persona.temperature) {
                return Err(ConfigError::InvalidTemperature(persona.temperature));
            }
            if !seen.insert(persona.name.as_str()) {
                return Err(ConfigError::DuplicatePersona(persona.name.clone()));
            }
        }

        let default = personas
            .iter()
            .find(|persona| persona.name == default_name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownDefaultPersona(default_name.to_string()))?;

        Ok(Self { personas, default })
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&PersonaConfig> {
        self.personas.iter().find(|persona| persona.name == name)
    }

    #[inline]
    pub fn default_persona(&self) -> &PersonaConfig {
        &self.default
    }

    /// Look up a persona, falling back to the default for unknown or missing names.
    #[inline]
    pub fn resolve(&self, name: Option<&str>) -> &PersonaConfig {
        match name {
            Some(name) => self.get(name).unwrap_or_else(|| {
                debug!("Unknown persona '{}', using the default", name);
                self.default_persona()
            }),
            None => self.default_persona(),
        }
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &PersonaConfig> {
        self.personas.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    #[inline]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Lays out a prompt as blank-line separated sections:
/// system instruction, recent turns, retrieved context, the user message and an open
/// `Assistant:` cue.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder {
    history_turns: usize,
}

impl Default for PromptBuilder {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_TURNS)
    }
}

impl PromptBuilder {
    #[inline]
    pub fn new(history_turns: usize) -> Self {
        Self { history_turns }
    }

    #[inline]
    pub fn build(
        &self,
        persona: &PersonaConfig,
        system_override: Option<&str>,
        history: &[ConversationTurn],
        context: Option<&str>,
        message: &str,
    ) -> String {
        let instruction = system_override
            .filter(|instruction| !instruction.trim().is_empty())
            .unwrap_or(persona.system_instruction.as_str());

        let mut sections = Vec::with_capacity(self.history_turns + 4);
        sections.push(format!("System: {instruction}"));

        let recent = history.len().saturating_sub(self.history_turns);
        sections.extend(
            history
                .iter()
                .skip(recent)
                .map(|turn| format!("{}: {}", turn.role.label(), turn.content)),
        );

        if let Some(context) = context.filter(|context| !context.trim().is_empty()) {
            sections.push(format!("Relevant Information: {context}"));
        }

        sections.push(format!("User: {message}"));
        sections.push("Assistant:".to_string());

        sections.join("\n\n")
    }
}
