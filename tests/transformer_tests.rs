//! # Transformer tests
//!
//! The built-in JSON file transformer and the external command transformer.

use previewcast::error::GenerationError;
use previewcast::transformer::{CommandTransformer, DocumentTransformer, JsonFileTransformer};
use serde_json::json;

#[tokio::test]
async fn test_json_file_transformer_reads_document() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp_dir.path().join("api.json");
    std::fs::write(&source, r#"{"title":"Test","baseUri":"http://api.example.com"}"#)
        .expect("write");

    let document = JsonFileTransformer
        .transform(&source)
        .await
        .expect("valid JSON source");
    assert_eq!(document["title"], json!("Test"));
}

#[tokio::test]
async fn test_json_file_transformer_reports_missing_file() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp_dir.path().join("missing.json");

    match JsonFileTransformer.transform(&source).await {
        Err(GenerationError::Read { path, .. }) => assert_eq!(path, source),
        other => panic!("expected a read error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_json_file_transformer_reports_parse_error() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp_dir.path().join("api.json");
    std::fs::write(&source, "#%RAML 1.0\ntitle: Test\n").expect("write");

    assert!(matches!(
        JsonFileTransformer.transform(&source).await,
        Err(GenerationError::Parse(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_transformer_parses_stdout() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp_dir.path().join("api.json");
    std::fs::write(&source, r#"{"title":"From command"}"#).expect("write");

    let transformer = CommandTransformer::new("cat", vec![]);
    let document = transformer.transform(&source).await.expect("cat output is JSON");
    assert_eq!(document, json!({ "title": "From command" }));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_transformer_reports_failed_exit() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let source = temp_dir.path().join("missing.raml");

    let transformer = CommandTransformer::new("cat", vec![]);
    match transformer.transform(&source).await {
        Err(GenerationError::Command { program, status, stderr }) => {
            assert_eq!(program, "cat");
            assert!(!status.success());
            assert!(stderr.contains("missing.raml"), "stderr: {}", stderr);
        }
        other => panic!("expected a command error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_command_transformer_reports_missing_program() {
    let transformer = CommandTransformer::new("previewcast-no-such-transformer", vec![]);
    assert_eq!(transformer.program(), "previewcast-no-such-transformer");

    assert!(matches!(
        transformer.transform(std::path::Path::new("api.raml")).await,
        Err(GenerationError::Spawn { .. })
    ));
}
