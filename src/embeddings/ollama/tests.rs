use super::*;
use crate::config::OllamaConfig;

#[test]
fn embedder_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        embedding_model: "test-embed".to_string(),
        batch_size: 128,
        ..OllamaConfig::default()
    };
    let url = config.ollama_url().expect("should build url");
    let embedder =
        OllamaEmbedder::new(url, config.embedding_model, config.batch_size).expect("should build");

    assert_eq!(embedder.model(), "test-embed");
    assert_eq!(embedder.batch_size, 128);
    assert_eq!(embedder.base_url.host_str(), Some("test-host"));
    assert_eq!(embedder.base_url.port(), Some(1234));
}

#[test]
fn zero_batch_size_is_clamped() {
    let url = Url::parse("http://localhost:11434").expect("should parse url");
    let embedder = OllamaEmbedder::new(url, "model", 0).expect("should build");
    assert_eq!(embedder.batch_size, 1);
}

#[test]
fn request_uses_input_field() {
    let inputs = vec!["one".to_string(), "two".to_string()];
    let request = EmbedRequest {
        model: "nomic-embed-text",
        inputs: &inputs,
    };

    let json = serde_json::to_value(&request).expect("should serialize");
    assert_eq!(
        json,
        serde_json::json!({"model": "nomic-embed-text", "input": ["one", "two"]})
    );
}

#[tokio::test]
async fn empty_batch_makes_no_request() {
    // Nothing listens on this port; an attempted request would fail.
    let url = Url::parse("http://127.0.0.1:9").expect("should parse url");
    let embedder = OllamaEmbedder::new(url, "model", 4).expect("should build");

    let embeddings = embedder
        .embed_batch(&[])
        .await
        .expect("empty batch should succeed");
    assert!(embeddings.is_empty());
}
