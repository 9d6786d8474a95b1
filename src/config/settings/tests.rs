use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.model, "llama2");
    assert_eq!(config.ollama.keep_alive, "10m");
    assert_eq!(config.relay.max_attempts, 3);
    assert_eq!(config.relay.idle_timeout_seconds, 60);
    assert_eq!(config.relay.retry_backoff_seconds, 2);
    assert_eq!(config.chunking.window_size, 1000);
    assert_eq!(config.chunking.overlap, 200);
    assert_eq!(config.default_persona, "assistant");
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidProtocol(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));

    let mut invalid_config = config;
    invalid_config.ollama.batch_size = 1001;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidBatchSize(1001))
    ));
}

#[test]
fn relay_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.relay.max_attempts = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidMaxAttempts(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.relay.idle_timeout_seconds = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTimeout { name: "idle", .. })
    ));

    let mut invalid_config = config;
    invalid_config.relay.max_line_bytes = 10;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidMaxLineBytes(10))
    ));
}

#[test]
fn chunking_and_rag_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.chunking.overlap = invalid_config.chunking.window_size;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::OverlapTooLarge(..))
    ));

    let mut invalid_config = config.clone();
    invalid_config.rag.similarity_threshold = 1.5;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidSimilarityThreshold(_))
    ));

    let mut invalid_config = config;
    invalid_config.rag.context_limit = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidResultLimit(0))
    ));
}

#[test]
fn persona_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.default_persona = "pirate".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::UnknownDefaultPersona(name)) if name == "pirate"
    ));

    let mut invalid_config = config.clone();
    let duplicate = invalid_config
        .personas
        .first()
        .cloned()
        .expect("defaults should include personas");
    invalid_config.personas.push(duplicate);
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::DuplicatePersona(_))
    ));

    let mut invalid_config = config;
    if let Some(persona) = invalid_config.personas.first_mut() {
        persona.temperature = 3.0;
    }
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTemperature(_))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let mut parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    parsed_config.base_dir = config.base_dir.clone();
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_file_keeps_defaults() {
    let parsed: Config = toml::from_str(
        r#"
        [ollama]
        host = "gpu-box"

        [relay]
        max_attempts = 5
        "#,
    )
    .expect("should parse partial config");

    assert_eq!(parsed.ollama.host, "gpu-box");
    assert_eq!(parsed.ollama.port, 11434);
    assert_eq!(parsed.relay.max_attempts, 5);
    assert_eq!(parsed.relay.connect_timeout_seconds, 30);
    assert_eq!(parsed.personas, default_personas());
}

#[test]
fn missing_file_loads_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_dir = temp_dir.path().join(".llm-relay");

    let mut config = Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    };
    config.ollama.host = "inference.local".to_string();
    config.relay.max_attempts = 4;
    config.save().expect("should save config");

    assert!(config_dir.join("config.toml").exists());

    let loaded = Config::load(&config_dir).expect("should load saved config");
    assert_eq!(loaded, config);
}

#[test]
fn invalid_file_is_rejected_on_load() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    std::fs::write(
        temp_dir.path().join("config.toml"),
        "[relay]\nmax_attempts = 0\n",
    )
    .expect("should write config file");

    assert!(Config::load(temp_dir.path()).is_err());
}
