// src/transformer.rs

//! Document transformers: turn the API entry point into a JSON document.

use crate::error::GenerationError;
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Converts a source location into a JSON document.
///
/// Implementations are called once per generation pass. A failure is turned
/// into an error notice for clients and never stops the server.
pub trait DocumentTransformer: Send + Sync {
    fn transform<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, Result<Value, GenerationError>>;
}

/// Reads the entry point as a JSON file.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileTransformer;

impl DocumentTransformer for JsonFileTransformer {
    fn transform<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, Result<Value, GenerationError>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(source)
                .await
                .map_err(|source_err| GenerationError::Read {
                    path: source.to_path_buf(),
                    source: source_err,
                })?;
            Ok(serde_json::from_slice(&bytes)?)
        })
    }
}

/// Runs an external program and parses its stdout as JSON.
///
/// The program is invoked as `program [args...] <source>`.
#[derive(Debug, Clone)]
pub struct CommandTransformer {
    program: String,
    args: Vec<String>,
}

impl CommandTransformer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        CommandTransformer {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl DocumentTransformer for CommandTransformer {
    fn transform<'a>(&'a self, source: &'a Path) -> BoxFuture<'a, Result<Value, GenerationError>> {
        Box::pin(async move {
            debug!(
                "Running transformer: {} {:?} {}",
                self.program,
                self.args,
                source.display()
            );
            let output = Command::new(&self.program)
                .args(&self.args)
                .arg(source)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| GenerationError::Spawn {
                    program: self.program.clone(),
                    source: e,
                })?;

            if !output.status.success() {
                return Err(GenerationError::Command {
                    program: self.program.clone(),
                    status: output.status,
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(serde_json::from_slice(&output.stdout)?)
        })
    }
}

