// Configuration management module
// TOML configuration loading, validation and display

pub mod settings;

#[cfg(test)]
mod tests;

pub use settings::{Config, ConfigError, OllamaConfig};

use console::style;

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Print the effective configuration in a human-readable form.
#[inline]
pub fn show_config(config: &Config) {
    println!("{}", style("Current Configuration").bold().underlined());
    println!();
    println!("{}", style("Ollama").bold());
    match config.ollama_url() {
        Ok(url) => println!("  URL:              {url}"),
        Err(e) => println!("  URL:              {}", style(e).red()),
    }
    println!("  Model:            {}", config.ollama.model);
    println!("  Embedding model:  {}", config.ollama.embedding_model);
    println!("  Batch size:       {}", config.ollama.batch_size);
    println!("  Keep alive:       {}", config.ollama.keep_alive);
    println!();
    println!("{}", style("Relay").bold());
    println!("  Max attempts:     {}", config.relay.max_attempts);
    println!(
        "  Timeouts:         connect {}s, read {}s, idle {}s, total {}s",
        config.relay.connect_timeout_seconds,
        config.relay.read_timeout_seconds,
        config.relay.idle_timeout_seconds,
        config.relay.total_timeout_seconds
    );
    println!("  Retry backoff:    {}s", config.relay.retry_backoff_seconds);
    println!();
    println!("{}", style("Retrieval").bold());
    println!(
        "  Chunking:         window {} chars, overlap {}",
        config.chunking.window_size, config.chunking.overlap
    );
    println!(
        "  Context:          {} (top {}, threshold {})",
        if config.rag.enabled {
            "enabled"
        } else {
            "disabled"
        },
        config.rag.context_limit,
        config.rag.similarity_threshold
    );
    println!();
    println!("{}", style("Server").bold());
    println!(
        "  Listen:           {}:{}",
        config.server.host, config.server.port
    );
    println!(
        "  Conversations:    up to {} kept, {} messages each",
        config.conversations.capacity, config.conversations.max_messages
    );
    println!();
    println!("{}", style("Personas").bold());
    for persona in &config.personas {
        let marker = if persona.name == config.default_persona {
            " (default)"
        } else {
            ""
        };
        println!(
            "  {}{}: {} @ {}",
            style(&persona.name).cyan(),
            marker,
            persona.model,
            persona.temperature
        );
    }
    println!();
    println!(
        "  Config file:      {}",
        config.config_file_path().display()
    );
}
