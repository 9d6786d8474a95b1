use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn config_directory_creation() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_dir = temp_dir.path().join(".llm-relay");

    assert!(!config_dir.exists());

    let config = Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    };
    config.save().expect("should save config");

    assert!(config_dir.is_dir());
    let content =
        fs::read_to_string(config_dir.join("config.toml")).expect("should read saved config");
    assert!(content.contains("[ollama]"));
    assert!(content.contains("[[personas]]"));
}

#[test]
fn hand_written_file_round_trip() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        r#"
default_persona = "tutor"

[ollama]
host = "10.0.0.5"
model = "mistral"

[[personas]]
name = "tutor"
model = "mistral"
temperature = 0.4
system_instruction = "Explain step by step."
"#,
    )
    .expect("should write config file");

    let config = Config::load(temp_dir.path()).expect("should load config");
    let personas = config.persona_table().expect("personas should be valid");

    assert_eq!(config.ollama.host, "10.0.0.5");
    assert_eq!(personas.default_persona().name, "tutor");
    assert_eq!(personas.resolve(Some("missing")).model, "mistral");
}

#[test]
fn config_dir_is_under_home() {
    if let Ok(dir) = get_config_dir() {
        assert!(dir.ends_with(".llm-relay"));
    }
}
