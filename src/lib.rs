// src/lib.rs

#![doc = r#"
# previewcast

previewcast is a local live-preview broadcaster. It watches an API project
folder, regenerates a JSON document from the API entry point whenever a file
changes, and pushes the result to every connected WebSocket client. Clients
that connect late receive the last broadcast right away.

## Modules

- [`config`]: Options loading (file, environment, CLI) and validation.
- [`error`]: Error types.
- [`message`]: Wire messages sent to clients.
- [`server`]: WebSocket broadcast server with port scanning and replay.
- [`watcher`]: Recursive file system watcher.
- [`transformer`]: Turning the entry point into a JSON document.
- [`orchestrator`]: Wiring of all of the above.

```no_run
use std::sync::Arc;
use previewcast::config::ProviderOptions;
use previewcast::orchestrator::SyncOrchestrator;
use previewcast::transformer::JsonFileTransformer;

# async fn run() -> Result<(), previewcast::error::Error> {
let options = ProviderOptions::from_value(serde_json::json!({
    "projectRoot": "./api",
    "api": "api.json",
}))?;
let mut provider = SyncOrchestrator::new(options, Arc::new(JsonFileTransformer));
let port = provider.start().await?;
println!("ws://127.0.0.1:{}", port);
provider.stop().await;
# Ok(())
# }
```
"#]

pub mod config;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod server;
pub mod transformer;
pub mod watcher;

pub use config::ProviderOptions;
pub use error::{ConfigError, Error, GenerationError, ValidationError};
pub use message::Message;
pub use orchestrator::SyncOrchestrator;
pub use server::BroadcastServer;
pub use transformer::{CommandTransformer, DocumentTransformer, JsonFileTransformer};
pub use watcher::{ChangeEvent, ChangeKind, ChangeWatcher};
