// src/watcher.rs
use crate::error::Error;
use notify::Watcher as NotifyWatcherTrait; // To use .watch()
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, DebouncedEvent, Debouncer, FileIdMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info};

/// Debounce interval used by [`ChangeWatcher::default`].
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Kind of change observed on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Write,
    Remove,
    Rename,
}

/// A normalized file system change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// The path of the file or directory affected by the event.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

struct Armed {
    root: PathBuf,
    /// Held for every callback invocation. Cleared on disarm, which waits for
    /// a running callback to return first.
    active: Arc<Mutex<bool>>,
    debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
    delivery: JoinHandle<()>,
}

/// Recursive directory watcher feeding a single callback.
///
/// Events are debounced and delivered from a dedicated thread. Only one
/// registration exists at a time: arming again detaches the previous one.
pub struct ChangeWatcher {
    debounce: Duration,
    armed: Option<Armed>,
}

impl Default for ChangeWatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl ChangeWatcher {
    pub fn new(debounce: Duration) -> Self {
        ChangeWatcher {
            debounce,
            armed: None,
        }
    }

    /// Starts observing `root` recursively, calling `on_change` for each event.
    ///
    /// Any previous registration is fully detached first.
    ///
    /// # Errors
    /// Returns [`Error::Watch`] if `root` is not a directory or the OS watcher
    /// cannot be set up. The watcher is left disarmed in that case.
    pub fn arm<F>(&mut self, root: &Path, on_change: F) -> Result<(), Error>
    where
        F: Fn(&ChangeEvent) + Send + 'static,
    {
        self.disarm();

        if !root.is_dir() {
            return Err(Error::Watch {
                path: root.to_path_buf(),
                reason: "not an existing directory".to_string(),
            });
        }

        // The debouncer sends its batches here; the receiving thread exits
        // once the debouncer (and with it the sender) is dropped.
        let (debouncer_internal_tx, debouncer_internal_rx) =
            std::sync::mpsc::channel::<DebounceEventResult>();

        let mut debouncer = new_debouncer(self.debounce, None, debouncer_internal_tx)?;
        debouncer
            .watcher()
            .watch(root, RecursiveMode::Recursive)?;
        debouncer.cache().add_root(root, RecursiveMode::Recursive);

        let active = Arc::new(Mutex::new(true));
        let thread_active = Arc::clone(&active);
        let delivery = std::thread::Builder::new()
            .name("previewcast-watcher".to_string())
            .spawn(move || {
                while let Ok(debouncer_result) = debouncer_internal_rx.recv() {
                    match debouncer_result {
                        Ok(events) => {
                            for debounced_event in events {
                                let Some(event) = normalize_event(&debounced_event) else {
                                    continue;
                                };
                                let active = thread_active
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner);
                                if !*active {
                                    break;
                                }
                                debug!("[WatcherThread] Produced event: {:?}", event);
                                on_change(&event);
                            }
                        }
                        Err(errors) => {
                            for error in errors {
                                error!("[WatcherThread] Debouncer reported error: {:?}", error);
                            }
                        }
                    }
                }
                debug!("[WatcherThread] Debouncer dropped, watcher thread exiting.");
            })
            .map_err(|e| Error::Watch {
                path: root.to_path_buf(),
                reason: format!("cannot spawn watcher thread: {}", e),
            })?;

        info!("Watching folder: {}", root.display());
        self.armed = Some(Armed {
            root: root.to_path_buf(),
            active,
            debouncer,
            delivery,
        });
        Ok(())
    }

    /// Detaches the current callback. No-op when not armed.
    ///
    /// Waits for a callback that is running right now, so once this returns
    /// the callback is never invoked again. Must not be called from inside
    /// the callback.
    pub fn disarm(&mut self) {
        let Some(armed) = self.armed.take() else {
            return;
        };
        *armed.active.lock().unwrap_or_else(PoisonError::into_inner) = false;

        // Joins the debouncer thread; its event sender is dropped with it,
        // which ends the delivery thread.
        armed.debouncer.stop();
        if armed.delivery.join().is_err() {
            error!("Watcher thread panicked.");
        }
        info!("Stopped watching folder: {}", armed.root.display());
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Folder currently observed, if armed.
    pub fn root(&self) -> Option<&Path> {
        self.armed.as_ref().map(|armed| armed.root.as_path())
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Converts a debounced notify event into a [`ChangeEvent`].
///
/// Access events and events without a path are ignored.
fn normalize_event(debounced_event: &DebouncedEvent) -> Option<ChangeEvent> {
    use notify::event::{EventKind, ModifyKind, RenameMode};

    // notify events can carry several paths (e.g. rename); the last one is
    // where the content lives now.
    let Some(path) = debounced_event.paths.last() else {
        debug!(
            "Received debounced event with no paths: {:?}",
            debounced_event
        );
        return None;
    };

    let kind = match debounced_event.kind {
        EventKind::Create(_) => ChangeKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Create,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Remove,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Rename,
        EventKind::Modify(_) => ChangeKind::Write,
        EventKind::Remove(_) => ChangeKind::Remove,
        _ => {
            debug!(
                "[WatcherThread] Ignored event kind {:?} for path {}",
                debounced_event.kind,
                path.display()
            );
            return None;
        }
    };

    Some(ChangeEvent {
        path: path.clone(),
        kind,
    })
}
