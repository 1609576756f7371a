//! Vault connection lifecycle and the serialized ingestion queue.
//!
//! A [`VaultManager`] moves through `Disconnected -> Scanning -> Watching`.
//! While connected, every index mutation (full rescans and per-file watcher
//! events) passes through one bounded channel drained by a single worker
//! task, so events for the same path are applied in arrival order.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use rayon::prelude::*;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    document::{self, VaultFile},
    error::{Error, Result},
    indexer::{IndexFailure, IndexHandle, IndexReport, VaultIndexer},
    walker,
    watcher::{NoteFilter, VaultEvent, VaultWatcher},
};

/// Maximum number of pending messages in the ingestion queue.
pub const QUEUE_CAPACITY: usize = 1024;

/// Where the connected vault root is remembered between sessions.
pub trait VaultPathStore: Send + Sync {
    fn vault_path(&self) -> Result<Option<PathBuf>>;
    fn set_vault_path(&self, path: Option<&Path>) -> Result<()>;
}

/// A [`VaultPathStore`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPathStore {
    path: Mutex<Option<PathBuf>>,
}

impl VaultPathStore for MemoryPathStore {
    fn vault_path(&self) -> Result<Option<PathBuf>> {
        self.path
            .lock()
            .map(|p| p.clone())
            .map_err(|e| Error::Config(e.to_string()))
    }

    fn set_vault_path(&self, path: Option<&Path>) -> Result<()> {
        let mut slot = self.path.lock().map_err(|e| Error::Config(e.to_string()))?;
        *slot = path.map(Path::to_path_buf);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultState {
    Disconnected,
    Scanning,
    Watching,
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Scanning => "scanning",
            Self::Watching => "watching",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VaultStatus {
    pub state: VaultState,
    pub root: Option<PathBuf>,
    pub documents: usize,
}

/// Result of reading a note through the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Found(String),
    /// The file vanished from disk. When `rescan_triggered` is set, the
    /// index has been rebuilt and the caller may retry.
    Missing { rescan_triggered: bool },
}

/// Parsed notes from one walk of the vault.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub files: Vec<VaultFile>,
    pub failures: Vec<IndexFailure>,
}

/// Discover and parse every note under `root`.
///
/// Files are read and parsed in parallel. A file that cannot be read or
/// parsed is recorded in `failures`; it never stops the scan.
pub fn scan_vault(root: &Path) -> Result<ScanReport> {
    Ok(parse_all(walker::discover_files(root)?))
}

/// Like [`scan_vault`], for the notes under one directory of the vault.
pub fn scan_below(root: &Path, dir: &Path) -> Result<ScanReport> {
    Ok(parse_all(walker::discover_below(root, dir)?))
}

fn parse_all(discovered: Vec<walker::DiscoveredFile>) -> ScanReport {
    let parsed: Vec<_> = discovered
        .par_iter()
        .map(|file| {
            document::load_note(&file.absolute_path)
                .map_err(|e| (file.absolute_path.clone(), e))
        })
        .collect();

    let mut report = ScanReport::default();
    for result in parsed {
        match result {
            Ok(file) => report.files.push(file),
            Err((path, e)) => {
                warn!(path = %path.display(), error = %e, "skipping unparseable note");
                report.failures.push(IndexFailure {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }
    report
}

enum Message {
    Event(VaultEvent),
    Rescan(oneshot::Sender<Result<IndexReport>>),
    Barrier(oneshot::Sender<()>),
    Shutdown,
}

struct Session {
    root: PathBuf,
    tx: mpsc::Sender<Message>,
    worker: JoinHandle<()>,
    watcher: VaultWatcher,
}

/// Owns the index for one vault and keeps it in sync with the disk.
pub struct VaultManager {
    handle: IndexHandle,
    paths: Arc<dyn VaultPathStore>,
    state: VaultState,
    session: Option<Session>,
    rescanning: AtomicBool,
}

impl VaultManager {
    pub fn new(paths: Arc<dyn VaultPathStore>) -> Result<Self> {
        Ok(Self {
            handle: IndexHandle::new(VaultIndexer::new()?),
            paths,
            state: VaultState::Disconnected,
            session: None,
            rescanning: AtomicBool::new(false),
        })
    }

    /// Read-only access to the index, for retrieval.
    pub fn handle(&self) -> IndexHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    pub fn root(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.root.as_path())
    }

    pub fn status(&self) -> Result<VaultStatus> {
        Ok(VaultStatus {
            state: self.state,
            root: self.root().map(Path::to_path_buf),
            documents: self.handle.len()?,
        })
    }

    /// Connect to the vault at `root`: scan it, index it and start watching.
    ///
    /// The path is validated before anything changes; an invalid root leaves
    /// the current connection and index exactly as they were. Connecting
    /// while already connected replaces the previous vault.
    pub async fn connect(&mut self, root: &Path) -> Result<IndexReport> {
        let root = validate_root(root).await?;

        self.shutdown_session().await;
        self.state = VaultState::Scanning;
        info!(root = %root.display(), "connecting vault");

        match self.start_session(&root).await {
            Ok(report) => {
                if let Err(e) = self.persist_root(Some(root.clone())).await {
                    warn!(error = %e, "failed to persist vault path");
                }
                self.state = VaultState::Watching;
                info!(
                    root = %root.display(),
                    indexed = report.indexed,
                    failed = report.failures.len(),
                    "vault connected"
                );
                Ok(report)
            }
            Err(e) => {
                self.shutdown_session().await;
                if let Err(clear_err) = self.handle.write().and_then(|mut i| i.clear()) {
                    warn!(error = %clear_err, "failed to clear index");
                }
                self.state = VaultState::Disconnected;
                Err(e)
            }
        }
    }

    /// Reconnect to the vault remembered by the path store, if any.
    pub async fn restore(&mut self) -> Result<Option<IndexReport>> {
        let paths = self.paths.clone();
        let stored = tokio::task::spawn_blocking(move || paths.vault_path())
            .await
            .map_err(|_| Error::WorkerStopped)??;
        match stored {
            Some(root) => self.connect(&root).await.map(Some),
            None => Ok(None),
        }
    }

    async fn start_session(&mut self, root: &Path) -> Result<IndexReport> {
        let filter = NoteFilter::new(root)?;
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(root.to_path_buf(), self.handle.clone(), rx));

        let watch_tx = tx.clone();
        let watcher = match VaultWatcher::start(filter, move |event| {
            if watch_tx.blocking_send(Message::Event(event)).is_err() {
                debug!("vault queue closed; dropping event");
            }
        }) {
            Ok(w) => w,
            Err(e) => {
                let _ = tx.send(Message::Shutdown).await;
                let _ = worker.await;
                return Err(e);
            }
        };

        self.session = Some(Session {
            root: root.to_path_buf(),
            tx,
            worker,
            watcher,
        });

        self.rescan().await
    }

    /// Stop watching, clear the index and forget the persisted vault path.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.shutdown_session().await;
        self.handle.write()?.clear()?;
        self.persist_root(None).await?;
        self.state = VaultState::Disconnected;
        info!("vault disconnected");
        Ok(())
    }

    async fn persist_root(&self, root: Option<PathBuf>) -> Result<()> {
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || paths.set_vault_path(root.as_deref()))
            .await
            .map_err(|_| Error::WorkerStopped)?
    }

    async fn shutdown_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        // The watcher goes first so no new events arrive.
        drop(session.watcher);
        if session.tx.send(Message::Shutdown).await.is_err() {
            debug!("vault worker already stopped");
        }
        if let Err(e) = session.worker.await {
            error!(error = %e, "vault worker panicked");
        }
    }

    fn sender(&self) -> Result<&mpsc::Sender<Message>> {
        self.session
            .as_ref()
            .map(|s| &s.tx)
            .ok_or(Error::NotConnected)
    }

    /// Queue a single file event behind everything already queued.
    pub async fn enqueue(&self, event: VaultEvent) -> Result<()> {
        self.sender()?
            .send(Message::Event(event))
            .await
            .map_err(|_| Error::WorkerStopped)
    }

    /// Rebuild the index from disk through the queue and wait for it.
    pub async fn rescan(&self) -> Result<IndexReport> {
        let (reply, rx) = oneshot::channel();
        self.sender()?
            .send(Message::Rescan(reply))
            .await
            .map_err(|_| Error::WorkerStopped)?;
        rx.await.map_err(|_| Error::WorkerStopped)?
    }

    /// Wait until every message queued before this call has been applied.
    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender()?
            .send(Message::Barrier(reply))
            .await
            .map_err(|_| Error::WorkerStopped)?;
        rx.await.map_err(|_| Error::WorkerStopped)
    }

    /// Read a note's raw text. `path` may be absolute or relative to the
    /// vault root and must stay inside it.
    ///
    /// A file missing from disk triggers one rescan of the vault; a second
    /// miss while that rescan is running does not start another.
    pub async fn read_file(&self, path: &Path) -> Result<ReadOutcome> {
        let root = self.root().ok_or(Error::NotConnected)?;
        let resolved = walker::resolve_in_root(root, path)?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(text) => Ok(ReadOutcome::Found(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let Some(_guard) = RescanGuard::acquire(&self.rescanning) else {
                    debug!(path = %resolved.display(), "rescan already running");
                    return Ok(ReadOutcome::Missing {
                        rescan_triggered: false,
                    });
                };
                info!(path = %resolved.display(), "file missing; rescanning vault");
                if let Err(e) = self.rescan().await {
                    warn!(error = %e, "recovery rescan failed");
                }
                Ok(ReadOutcome::Missing {
                    rescan_triggered: true,
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for VaultManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManager")
            .field("state", &self.state)
            .field("root", &self.root())
            .finish_non_exhaustive()
    }
}

struct RescanGuard<'a>(&'a AtomicBool);

impl<'a> RescanGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RescanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

async fn validate_root(root: &Path) -> Result<PathBuf> {
    let invalid = |reason: &str| Error::InvalidVault {
        path: root.to_path_buf(),
        reason: reason.to_string(),
    };

    let meta = tokio::fs::metadata(root)
        .await
        .map_err(|_| invalid("path does not exist"))?;
    if !meta.is_dir() {
        return Err(invalid("not a directory"));
    }
    tokio::fs::canonicalize(root)
        .await
        .map_err(|e| invalid(&format!("cannot resolve path: {e}")))
}

async fn run_worker(root: PathBuf, handle: IndexHandle, mut rx: mpsc::Receiver<Message>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Event(event) => {
                let (root, handle) = (root.clone(), handle.clone());
                let path = event.path().to_path_buf();
                let result =
                    tokio::task::spawn_blocking(move || apply_event(&root, &handle, event))
                        .await;
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(path = %path.display(), error = %e, "failed to apply vault event");
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "vault event task panicked");
                    }
                }
            }
            Message::Rescan(reply) => {
                let (root, handle) = (root.clone(), handle.clone());
                let result = tokio::task::spawn_blocking(move || rebuild(&root, &handle))
                    .await
                    .unwrap_or_else(|e| {
                        error!(error = %e, "rescan task panicked");
                        Err(Error::WorkerStopped)
                    });
                let _ = reply.send(result);
            }
            Message::Barrier(reply) => {
                let _ = reply.send(());
            }
            Message::Shutdown => break,
        }
    }
    debug!(root = %root.display(), "vault worker stopped");
}

fn rebuild(root: &Path, handle: &IndexHandle) -> Result<IndexReport> {
    let scan = scan_vault(root)?;
    let mut report = handle.write()?.index_all(scan.files)?;
    report.failures.extend(scan.failures);
    Ok(report)
}

fn apply_event(root: &Path, handle: &IndexHandle, event: VaultEvent) -> Result<()> {
    match event {
        VaultEvent::DeleteTree(dir) => {
            let dir = walker::normalize(&dir);
            if !dir.starts_with(root) {
                return Err(Error::PathEscape(dir));
            }
            let removed = handle.write()?.remove_missing_under(&dir)?;
            if removed > 0 {
                debug!(dir = %dir.display(), removed, "removed directory from index");
            }
            Ok(())
        }
        VaultEvent::AddTree(dir) => {
            let scan = match scan_below(root, &dir) {
                Ok(scan) => scan,
                // Moved away again before we got to it.
                Err(Error::Io(io)) if io.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(());
                }
                Err(e) => return Err(e),
            };
            let mut indexer = handle.write()?;
            let report = indexer.index_batch(scan.files)?;
            for failure in &scan.failures {
                indexer.remove(&failure.path)?;
            }
            debug!(
                dir = %dir.display(),
                indexed = report.indexed,
                failed = scan.failures.len(),
                "indexed directory"
            );
            Ok(())
        }
        VaultEvent::Delete(path) => {
            let path = walker::normalize(&path);
            if handle.write()?.remove(&path)? {
                debug!(path = %path.display(), "removed from index");
            }
            Ok(())
        }
        VaultEvent::Add(path) | VaultEvent::Change(path) => {
            let path = walker::resolve_in_root(root, &path)?;
            if walker::has_hidden_component(root, &path) || !walker::is_markdown(&path) {
                return Ok(());
            }

            // Parse outside the lock; only the store swap is exclusive.
            match document::load_note(&path) {
                Ok(file) => {
                    handle.write()?.index_one(file)?;
                    debug!(path = %path.display(), "indexed");
                    Ok(())
                }
                Err(e) => {
                    // Gone or unparseable: a stale entry must not outlive it.
                    handle.write()?.remove(&path)?;
                    match e {
                        Error::Io(io) if io.kind() == std::io::ErrorKind::NotFound => Ok(()),
                        other => Err(other),
                    }
                }
            }
        }
    }
}
