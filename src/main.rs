use clap::{Parser, Subcommand};
use llm_relay::Result;
use llm_relay::commands::{ChatOptions, chat, check_health, init_config, list_models, serve};
use llm_relay::config::{Config, get_config_dir, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "llm-relay")]
#[command(about = "Streaming relay for Ollama with retrieval-augmented prompting")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to ~/.llm-relay)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve,
    /// Show or initialise the configuration
    Config {
        /// Show the effective configuration
        #[arg(long, conflicts_with = "init")]
        show: bool,
        /// Write the default configuration file
        #[arg(long)]
        init: bool,
    },
    /// Check that the upstream inference server is reachable
    Health,
    /// List models available upstream
    Models,
    /// Relay one message and print the reply as it streams
    Chat {
        message: String,
        /// Persona to answer as
        #[arg(long)]
        persona: Option<String>,
        /// Override the persona's model
        #[arg(long)]
        model: Option<String>,
        /// Maximum upstream attempts
        #[arg(long)]
        attempts: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Serve => {
            serve(&Config::load(&config_dir)?).await?;
        }
        Commands::Config { show, init } => {
            if init {
                init_config(&config_dir)?;
            } else {
                show_config(&Config::load(&config_dir)?);
                if !show {
                    println!();
                    println!("Use 'llm-relay config --init' to write these defaults to disk.");
                }
            }
        }
        Commands::Health => {
            check_health(&Config::load(&config_dir)?).await?;
        }
        Commands::Models => {
            list_models(&Config::load(&config_dir)?).await?;
        }
        Commands::Chat {
            message,
            persona,
            model,
            attempts,
        } => {
            let options = ChatOptions {
                persona,
                model,
                max_attempts: attempts,
            };
            chat(&Config::load(&config_dir)?, &message, &options).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn serve_command() {
        let cli = Cli::try_parse_from(["llm-relay", "serve"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Serve));
            assert!(parsed.config_dir.is_none());
        }
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["llm-relay", "health", "--config-dir", "/tmp/relay"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert_eq!(parsed.config_dir, Some(PathBuf::from("/tmp/relay")));
        }
    }

    #[test]
    fn chat_command_with_options() {
        let cli = Cli::try_parse_from([
            "llm-relay",
            "chat",
            "Say hello",
            "--persona",
            "tutor",
            "--attempts",
            "5",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Chat {
                message,
                persona,
                model,
                attempts,
            } = parsed.command
            {
                assert_eq!(message, "Say hello");
                assert_eq!(persona, Some("tutor".to_string()));
                assert_eq!(model, None);
                assert_eq!(attempts, Some(5));
            }
        }
    }

    #[test]
    fn config_flags_conflict() {
        let cli = Cli::try_parse_from(["llm-relay", "config", "--show", "--init"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["llm-relay", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["llm-relay", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
