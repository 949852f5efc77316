// src/orchestrator.rs

//! # Sync orchestrator
//!
//! Ties the pieces together: binds the [`BroadcastServer`], arms the
//! [`ChangeWatcher`] on the project root and regenerates the document after
//! every change.
//!
//! Regeneration passes run one at a time on a single worker task. Change
//! events only bump a pending request counter held in a `watch` channel, so
//! any number of events arriving during a pass collapse into one follow-up
//! pass. A finished pass whose request was superseded meanwhile is dropped
//! instead of broadcast, which keeps a stale document from overwriting a
//! newer one.
//!
//! Dropping applies to passes that already ran to completion, not only to
//! queued ones. While changes keep arriving faster than a pass completes,
//! clients see nothing after `generating-json` until the changes settle.

use crate::config::ProviderOptions;
use crate::error::{Error, GenerationError};
use crate::message::Message;
use crate::server::BroadcastServer;
use crate::transformer::DocumentTransformer;
use crate::watcher::ChangeWatcher;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Generation plus publication of its outcome.
#[derive(Clone)]
struct Pipeline {
    source: Option<PathBuf>,
    transformer: Arc<dyn DocumentTransformer>,
    server: Arc<BroadcastServer>,
}

impl Pipeline {
    async fn generate(&self) -> Result<Option<Value>, GenerationError> {
        let Some(source) = self.source.as_deref() else {
            info!("No source entry point. Skipping document generation.");
            return Ok(None);
        };
        info!("Generating document from {}...", source.display());
        let document = self.transformer.transform(source).await?;
        info!("Document ready.");
        Ok(Some(document))
    }

    fn publish(&self, outcome: Result<Option<Value>, GenerationError>) {
        let message = match outcome {
            Ok(data) => Message::Document { data },
            Err(e) => {
                error!("Document generation failed: {}", e);
                Message::critical(format!("Parser error: {}", e))
            }
        };
        if let Err(e) = self.server.broadcast(&message) {
            warn!("Could not broadcast {} payload: {}", message.payload(), e);
        }
    }
}

/// Entry point for change events, shared with the watcher thread.
#[derive(Clone)]
struct ChangeIntake {
    server: Arc<BroadcastServer>,
    pending: Arc<watch::Sender<u64>>,
}

impl ChangeIntake {
    fn notify(&self, path: &Path) {
        debug!("Change detected: {}", path.display());
        if let Err(e) = self.server.broadcast(&Message::Generating) {
            warn!("Could not broadcast generating notice: {}", e);
        }
        self.pending.send_modify(|request| *request += 1);
    }
}

struct Worker {
    intake: ChangeIntake,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Runs queued regeneration passes until shutdown.
async fn run_worker(
    pipeline: Pipeline,
    mut pending: watch::Receiver<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = pending.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }

        let request = *pending.borrow_and_update();
        debug!("Regenerating document for change #{}", request);
        let outcome = tokio::select! {
            outcome = pipeline.generate() => outcome,
            _ = shutdown.changed() => break,
        };

        if pending.has_changed().unwrap_or(false) {
            debug!(
                "Discarding result of change #{}, a newer change is pending.",
                request
            );
            continue;
        }
        pipeline.publish(outcome);
    }
    debug!("Regeneration worker stopped.");
}

/// Top-level coordinator of server, watcher and transformer.
pub struct SyncOrchestrator {
    options: ProviderOptions,
    pipeline: Pipeline,
    watcher: ChangeWatcher,
    worker: Option<Worker>,
}

impl SyncOrchestrator {
    pub fn new(options: ProviderOptions, transformer: Arc<dyn DocumentTransformer>) -> Self {
        let server = Arc::new(BroadcastServer::from_options(&options));
        SyncOrchestrator {
            pipeline: Pipeline {
                source: options.source_path(),
                transformer,
                server,
            },
            options,
            watcher: ChangeWatcher::default(),
            worker: None,
        }
    }

    /// Replaces the watcher debounce interval. Takes effect on the next `start`.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.watcher = ChangeWatcher::new(debounce);
        self
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn server(&self) -> &Arc<BroadcastServer> {
        &self.pipeline.server
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Starts the server, watches the project root and publishes the first
    /// document.
    ///
    /// A failed first generation does not fail `start`: clients receive an
    /// error notice and the server keeps listening and watching.
    ///
    /// # Returns
    /// The port the WebSocket server is bound to.
    ///
    /// # Errors
    /// Server start failures ([`Error::PortExhausted`], [`Error::Resolve`],
    /// [`Error::AlreadyRunning`]) and [`Error::Watch`] when the project root
    /// cannot be watched. The server is stopped again in the latter case.
    pub async fn start(&mut self) -> Result<u16, Error> {
        let port = self.pipeline.server.start().await?;

        let (pending_tx, pending_rx) = watch::channel(0u64);
        let intake = ChangeIntake {
            server: Arc::clone(&self.pipeline.server),
            pending: Arc::new(pending_tx),
        };
        let watcher_intake = intake.clone();
        if let Err(e) = self
            .watcher
            .arm(&self.options.project_root, move |event| {
                watcher_intake.notify(&event.path)
            })
        {
            error!("Cannot watch project root: {}", e);
            self.pipeline.server.stop().await;
            return Err(e);
        }

        // The worker is spawned after the first pass, so the two never overlap;
        // changes seen meanwhile are already pending for it.
        let outcome = self.pipeline.generate().await;
        self.pipeline.publish(outcome);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_worker(
            self.pipeline.clone(),
            pending_rx,
            shutdown_rx,
        ));
        self.worker = Some(Worker {
            intake,
            shutdown_tx,
            handle,
        });

        info!(
            "Serving {} on port {}",
            self.options.project_root.display(),
            port
        );
        Ok(port)
    }

    /// Stops watching, cancels any running pass, then stops the server.
    pub async fn stop(&mut self) {
        self.watcher.disarm();
        if let Some(worker) = self.worker.take() {
            if worker.shutdown_tx.send(true).is_err() {
                debug!("Regeneration worker already gone.");
            }
            if let Err(e) = worker.handle.await {
                error!("Regeneration worker failed: {}", e);
            }
        }
        self.pipeline.server.stop().await;
    }

    /// Reacts to a change of `path` as if the watcher had reported it.
    ///
    /// Clients get a generating notice right away; the document follows once
    /// the queued pass completes. Ignored while stopped.
    pub fn handle_change(&self, path: &Path) {
        match &self.worker {
            Some(worker) => worker.intake.notify(path),
            None => debug!(
                "Ignoring change of {} while stopped.",
                path.display()
            ),
        }
    }

    /// Runs one generation pass without broadcasting it.
    pub async fn generate(&self) -> Result<Option<Value>, GenerationError> {
        self.pipeline.generate().await
    }
}
