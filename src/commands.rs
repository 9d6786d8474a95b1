use anyhow::{Context, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::ollama::{GenerateRequest, GenerationOptions, OllamaClient};
use crate::rag::PromptRequest;
use crate::server::{self, AppState};
use crate::stream::{CancellationToken, MAX_ATTEMPTS_LIMIT, StreamEvent};

/// Start the HTTP server and run until Ctrl-C.
#[inline]
pub async fn serve(config: &Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(config).context("Failed to build server state")?);

    let client = &state.client;
    if client.health_check().await {
        info!("Upstream reachable at {}", client.base_url());
    } else {
        warn!(
            "Upstream at {} is not reachable yet; requests will fail until it is",
            client.base_url()
        );
    }

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;

    server::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutdown requested");
    })
    .await
}

/// Write the default configuration unless a file already exists.
#[inline]
pub fn init_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir)?;
    let path = config.config_file_path();

    if path.exists() {
        println!("Configuration already exists at {}", path.display());
        return Ok(());
    }

    config.save()?;
    println!("✓ Wrote default configuration to {}", path.display());
    Ok(())
}

/// Check the upstream and report what it serves.
#[inline]
pub async fn check_health(config: &Config) -> Result<()> {
    let client = OllamaClient::from_config(config)?;

    if !client.health_check().await {
        println!("❌ Ollama: not reachable at {}", client.base_url());
        anyhow::bail!("Upstream health check failed");
    }

    println!("✅ Ollama: reachable at {}", client.base_url());
    let models = client.list_models().await?;
    let configured = &config.ollama.model;
    if models.iter().any(|model| model.name.starts_with(configured.as_str())) {
        println!("   📋 Model {configured} is available");
    } else {
        println!("   ⚠️  Model {configured} is not pulled (ollama pull {configured})");
    }

    Ok(())
}

/// Print the models the upstream has available.
#[inline]
pub async fn list_models(config: &Config) -> Result<()> {
    let client = OllamaClient::from_config(config)?;
    let models = client.list_models().await?;

    if models.is_empty() {
        println!("No models available. Pull one with 'ollama pull <model>'.");
        return Ok(());
    }

    println!("Models ({} total):", models.len());
    for model in &models {
        match model.size {
            Some(bytes) => {
                let gigabytes = bytes as f64 / 1_000_000_000.0;
                println!("  {} ({:.1} GB)", model.name, gigabytes);
            }
            None => println!("  {}", model.name),
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub persona: Option<String>,
    pub model: Option<String>,
    pub max_attempts: Option<u32>,
}

/// Relay a single message and print tokens as they arrive.
#[inline]
pub async fn chat(config: &Config, message: &str, options: &ChatOptions) -> Result<()> {
    if let Some(attempts) = options.max_attempts {
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&attempts) {
            anyhow::bail!("--attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {attempts}");
        }
    }

    let state = AppState::from_config(config).context("Failed to build relay")?;

    let composed = state
        .rag
        .compose(
            &PromptRequest {
                message,
                persona: options.persona.as_deref(),
                model_override: options.model.as_deref(),
                ..PromptRequest::default()
            },
            &[],
        )
        .await;

    let request = GenerateRequest::new(
        composed.model,
        composed.prompt,
        GenerationOptions {
            temperature: composed.temperature,
            ..state.generation
        },
    )
    .with_keep_alive(state.keep_alive.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let max_attempts = options.max_attempts.unwrap_or(state.max_attempts);
    let mut events = state.relay.relay_with_cancel(request, max_attempts, cancel);
    let mut stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Token { text, .. } => {
                write!(stdout, "{text}")?;
                stdout.flush()?;
            }
            StreamEvent::Retrying {
                attempt,
                max_attempts,
                reason,
            } => {
                eprintln!("\n[retrying {attempt}/{max_attempts}: {reason}]");
            }
            StreamEvent::Restarted { attempt } => {
                eprintln!("\n[attempt {attempt} generated different text; restarting]");
            }
            StreamEvent::Complete {
                token_count, usage, ..
            } => {
                writeln!(stdout)?;
                info!(
                    "Completed with {} tokens ({} evaluated upstream)",
                    token_count, usage.eval_count
                );
                return Ok(());
            }
            StreamEvent::Failed { reason, detail } => {
                writeln!(stdout)?;
                anyhow::bail!("Relay failed ({reason}): {detail}");
            }
        }
    }

    Ok(())
}
