//! Filesystem watching for a connected vault.
//!
//! Raw `notify` events are reduced to [`VaultEvent`]s for markdown files
//! under the vault root. The watcher does no indexing itself; it hands each
//! event to a callback, which the vault manager uses to feed its queue.

use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::{
    Event,
    EventKind,
    RecommendedWatcher,
    RecursiveMode,
    Watcher,
    event::{ModifyKind, RenameMode},
};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    walker::{self, MARKDOWN_EXTENSIONS},
};

/// A change to one markdown file, or to a directory of them, in the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    Add(PathBuf),
    Change(PathBuf),
    Delete(PathBuf),
    /// A directory appeared (created or moved in); index every note in it.
    AddTree(PathBuf),
    /// A directory went away; drop every indexed note under it.
    DeleteTree(PathBuf),
}

impl VaultEvent {
    pub fn path(&self) -> &Path {
        match self {
            Self::Add(p)
            | Self::Change(p)
            | Self::Delete(p)
            | Self::AddTree(p)
            | Self::DeleteTree(p) => p,
        }
    }
}

/// Decides which paths under the root are vault notes.
#[derive(Debug, Clone)]
pub struct NoteFilter {
    root: PathBuf,
    globs: GlobSet,
}

impl NoteFilter {
    /// Build a filter for `root`, which should already be canonical.
    pub fn new(root: &Path) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for ext in MARKDOWN_EXTENSIONS {
            let glob = GlobBuilder::new(&format!("**/*.{ext}"))
                .case_insensitive(true)
                .literal_separator(true)
                .build()
                .map_err(|e| Error::Config(e.to_string()))?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| Error::Config(e.to_string()))?;

        Ok(Self {
            root: root.to_path_buf(),
            globs,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` is a visible markdown file under the root.
    pub fn matches(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        !walker::has_hidden_component(&self.root, path) && self.globs.is_match(relative)
    }

    /// Whether `path` is a visible path under the root, file or directory.
    fn within(&self, path: &Path) -> bool {
        path.starts_with(&self.root) && !walker::has_hidden_component(&self.root, path)
    }

    /// Reduce a raw filesystem event to vault events, in order.
    ///
    /// Renames become a delete of the old path and an add of the new one.
    /// Directories that appear or vanish become tree events so the notes
    /// inside them follow the move. Paths outside the filter are dropped.
    pub fn translate(&self, event: &Event) -> Vec<VaultEvent> {
        let mut out = Vec::new();
        match &event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                out.extend(event.paths.iter().filter_map(|p| self.appeared(p)));
            }
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                out.extend(event.paths.iter().filter_map(|p| self.vanished(p)));
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to, ..] = event.paths.as_slice() {
                    out.extend(self.vanished(from));
                    out.extend(self.appeared(to));
                }
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                // Unpaired rename: whichever side still exists is the new one.
                for path in &event.paths {
                    if path.exists() {
                        out.extend(self.appeared(path));
                    } else {
                        out.extend(self.vanished(path));
                    }
                }
            }
            EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
                for path in &event.paths {
                    if path.is_file() {
                        if self.matches(path) {
                            out.push(VaultEvent::Change(path.clone()));
                        }
                    } else if !path.exists() {
                        out.extend(self.vanished(path));
                    }
                }
            }
            EventKind::Access(_) => {}
        }
        out
    }

    fn appeared(&self, path: &Path) -> Option<VaultEvent> {
        if path.is_dir() {
            self.within(path)
                .then(|| VaultEvent::AddTree(path.to_path_buf()))
        } else {
            self.matches(path).then(|| VaultEvent::Add(path.to_path_buf()))
        }
    }

    // A vanished path can no longer be stat'ed, so anything that is not a
    // note name is treated as a possible directory.
    fn vanished(&self, path: &Path) -> Option<VaultEvent> {
        if self.matches(path) {
            Some(VaultEvent::Delete(path.to_path_buf()))
        } else if self.within(path) {
            Some(VaultEvent::DeleteTree(path.to_path_buf()))
        } else {
            None
        }
    }
}

/// A running recursive watch on a vault root. Dropping it stops the watch.
pub struct VaultWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl VaultWatcher {
    /// Start watching `filter.root()`, calling `on_event` for every vault
    /// event. The callback runs on the watcher's own thread.
    pub fn start<F>(filter: NoteFilter, mut on_event: F) -> Result<Self>
    where
        F: FnMut(VaultEvent) + Send + 'static,
    {
        let root = filter.root().to_path_buf();
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    for vault_event in filter.translate(&event) {
                        debug!(event = ?vault_event, "vault change");
                        on_event(vault_event);
                    }
                }
                Err(e) => warn!(error = %e, "file watcher error"),
            })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        Ok(Self {
            _watcher: watcher,
            root,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl std::fmt::Debug for VaultWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultWatcher")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
