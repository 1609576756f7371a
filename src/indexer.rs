//! Document store and full-text indexer.
//!
//! [`VaultIndexer`] pairs the in-memory document store with the Tantivy
//! index so the two never drift apart: every mutation updates both under the
//! same `&mut` borrow. The ingestion pipeline owns the only writable handle;
//! readers get an [`IndexHandle`].

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    document::VaultFile,
    enhancer,
    error::{Error, Result},
    tantivy_index::{IndexedDocument, SearchIndex},
};

/// A file that could not be indexed, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a bulk indexing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub indexed: usize,
    pub failures: Vec<IndexFailure>,
}

/// A search hit with its stored document.
#[derive(Debug, Clone)]
pub struct ScoredFile {
    pub file: VaultFile,
    /// Full-text weight from the index. Only meaningful relative to other
    /// hits of the same query.
    pub score: f32,
}

/// The document store plus the inverted index over it.
#[derive(Debug)]
pub struct VaultIndexer {
    store: HashMap<PathBuf, VaultFile>,
    index: SearchIndex,
}

impl VaultIndexer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            store: HashMap::new(),
            index: SearchIndex::open_in_ram()?,
        })
    }

    /// Replace the whole index with `files`.
    ///
    /// Each file is enhanced and staged individually; a file that fails to
    /// stage is reported and skipped. The new contents become visible in a
    /// single commit. If the commit itself fails, the previous contents are
    /// kept and the error is returned.
    pub fn index_all(&mut self, files: Vec<VaultFile>) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let mut store = HashMap::with_capacity(files.len());

        self.index.delete_all()?;
        for file in files {
            let file = enhancer::enhance(file);
            match self.index.add_document(&IndexedDocument::from(&file)) {
                Ok(()) => {
                    store.insert(file.path.clone(), file);
                }
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "failed to index file");
                    report.failures.push(IndexFailure {
                        path: file.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.index.commit() {
            self.index.rollback()?;
            return Err(e);
        }

        report.indexed = store.len();
        self.store = store;
        debug!(
            indexed = report.indexed,
            failed = report.failures.len(),
            "index rebuilt"
        );
        Ok(report)
    }

    /// Insert or replace a single file.
    pub fn index_one(&mut self, file: VaultFile) -> Result<()> {
        let file = enhancer::enhance(file);
        // The old document's delete is already staged; it must not outlive a
        // failed add.
        let staged = self
            .index
            .add_document(&IndexedDocument::from(&file))
            .and_then(|()| self.index.commit());
        if let Err(e) = staged {
            self.index.rollback()?;
            return Err(e);
        }
        self.store.insert(file.path.clone(), file);
        Ok(())
    }

    /// Insert or replace several files in one commit.
    ///
    /// A file that fails to stage is reported, and any previous version of
    /// it is dropped from both the store and the index.
    pub fn index_batch(&mut self, files: Vec<VaultFile>) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        let mut staged = Vec::with_capacity(files.len());

        for file in files {
            let file = enhancer::enhance(file);
            match self.index.add_document(&IndexedDocument::from(&file)) {
                Ok(()) => staged.push(file),
                Err(e) => {
                    warn!(path = %file.path.display(), error = %e, "failed to index file");
                    self.index.delete_document(&file.path.to_string_lossy());
                    report.failures.push(IndexFailure {
                        path: file.path,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.index.commit() {
            self.index.rollback()?;
            return Err(e);
        }

        for failure in &report.failures {
            self.store.remove(&failure.path);
        }
        report.indexed = staged.len();
        for file in staged {
            self.store.insert(file.path.clone(), file);
        }
        Ok(report)
    }

    /// Remove a file. Returns whether it was present.
    pub fn remove(&mut self, path: &Path) -> Result<bool> {
        if !self.store.contains_key(path) {
            return Ok(false);
        }
        self.index.delete_document(&path.to_string_lossy());
        if let Err(e) = self.index.commit() {
            self.index.rollback()?;
            return Err(e);
        }
        self.store.remove(path);
        Ok(true)
    }

    /// Remove every file under `dir` that is no longer on disk, in one
    /// commit. Returns how many were removed.
    pub fn remove_missing_under(&mut self, dir: &Path) -> Result<usize> {
        let gone: Vec<PathBuf> = self
            .store
            .keys()
            .filter(|path| path.starts_with(dir) && !path.is_file())
            .cloned()
            .collect();
        if gone.is_empty() {
            return Ok(0);
        }

        for path in &gone {
            self.index.delete_document(&path.to_string_lossy());
        }
        if let Err(e) = self.index.commit() {
            self.index.rollback()?;
            return Err(e);
        }
        for path in &gone {
            self.store.remove(path);
        }
        Ok(gone.len())
    }

    pub fn clear(&mut self) -> Result<()> {
        self.index.delete_all()?;
        self.index.commit()?;
        self.store.clear();
        Ok(())
    }

    /// Ranked full-text search across title, content, tags and frontmatter.
    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<ScoredFile>> {
        let hits = self.index.search(query, max_results)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                let file = self.store.get(Path::new(&hit.path))?;
                Some(ScoredFile {
                    file: file.clone(),
                    score: hit.score,
                })
            })
            .collect())
    }

    pub fn is_indexed(&self) -> bool {
        !self.store.is_empty()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&VaultFile> {
        self.store.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.store.contains_key(path)
    }

    /// Indexed paths in sorted order.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.store.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// Shared handle to a [`VaultIndexer`].
///
/// Searches take a shared lock and may run concurrently with each other;
/// mutations take the exclusive lock. Only the crate can mutate through a
/// handle.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    inner: Arc<RwLock<VaultIndexer>>,
}

impl IndexHandle {
    pub fn new(indexer: VaultIndexer) -> Self {
        Self {
            inner: Arc::new(RwLock::new(indexer)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, VaultIndexer>> {
        self.inner
            .read()
            .map_err(|e| Error::IndexLocked(e.to_string()))
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, VaultIndexer>> {
        self.inner
            .write()
            .map_err(|e| Error::IndexLocked(e.to_string()))
    }

    pub fn search(&self, query: &str, max_results: usize) -> Result<Vec<ScoredFile>> {
        self.read()?.search(query, max_results)
    }

    pub fn is_indexed(&self) -> Result<bool> {
        Ok(self.read()?.is_indexed())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn get(&self, path: &Path) -> Result<Option<VaultFile>> {
        Ok(self.read()?.get(path).cloned())
    }

    pub fn contains(&self, path: &Path) -> Result<bool> {
        Ok(self.read()?.contains(path))
    }

    pub fn paths(&self) -> Result<Vec<PathBuf>> {
        Ok(self.read()?.paths())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::{FileTimes, parse_note};

    fn note(path: &str, raw: &str) -> VaultFile {
        let now = Utc::now();
        parse_note(Path::new(path), raw, FileTimes {
            created: now,
            modified: now,
            size: raw.len() as u64,
        })
        .unwrap()
    }

    #[test]
    fn index_all_and_search() {
        let mut indexer = VaultIndexer::new().unwrap();
        let report = indexer
            .index_all(vec![
                note("/v/acme.md", "---\ntags: [acme]\n---\nKickoff notes"),
                note("/v/other.md", "Unrelated text"),
            ])
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert!(report.failures.is_empty());
        assert!(indexer.is_indexed());

        let hits = indexer.search("kickoff", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file.path, Path::new("/v/acme.md"));
    }

    #[test]
    fn index_all_replaces_previous_contents() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer.index_all(vec![note("/v/old.md", "stale")]).unwrap();
        indexer.index_all(vec![note("/v/new.md", "fresh")]).unwrap();

        assert_eq!(indexer.paths(), vec![PathBuf::from("/v/new.md")]);
        assert!(indexer.search("stale", 10).unwrap().is_empty());
    }

    #[test]
    fn reindexing_same_path_does_not_duplicate() {
        let mut indexer = VaultIndexer::new().unwrap();
        let file = note("/v/a.md", "same body");
        indexer.index_one(file.clone()).unwrap();
        indexer.index_one(file).unwrap();

        assert_eq!(indexer.len(), 1);
        assert_eq!(indexer.search("body", 10).unwrap().len(), 1);
    }

    #[test]
    fn index_one_applies_enhancer() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer
            .index_one(note("/v/a.md", "talk to [[Jane]] about #roadmap"))
            .unwrap();

        let stored = indexer.get(Path::new("/v/a.md")).unwrap();
        assert_eq!(stored.tags, vec!["roadmap"]);
        assert_eq!(stored.links, vec!["Jane"]);
    }

    #[test]
    fn remove_drops_from_store_and_index() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer.index_one(note("/v/a.md", "ephemeral")).unwrap();

        assert!(indexer.remove(Path::new("/v/a.md")).unwrap());
        assert!(!indexer.remove(Path::new("/v/a.md")).unwrap());
        assert!(!indexer.is_indexed());
        assert!(indexer.search("ephemeral", 10).unwrap().is_empty());
    }

    #[test]
    fn index_batch_upserts_without_touching_others() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer.index_one(note("/v/keep.md", "untouched")).unwrap();
        indexer.index_one(note("/v/dir/a.md", "first draft")).unwrap();

        let report = indexer
            .index_batch(vec![
                note("/v/dir/a.md", "second draft"),
                note("/v/dir/b.md", "brand new"),
            ])
            .unwrap();

        assert_eq!(report.indexed, 2);
        assert_eq!(indexer.len(), 3);
        assert!(indexer.search("first", 10).unwrap().is_empty());
        assert_eq!(indexer.search("second", 10).unwrap().len(), 1);
        assert_eq!(indexer.search("untouched", 10).unwrap().len(), 1);
    }

    #[test]
    fn remove_missing_under_only_drops_vanished_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().canonicalize().unwrap();
        let dir = root.join("projects");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("alive.md"), "alive").unwrap();

        let alive = dir.join("alive.md");
        let gone = dir.join("gone.md");
        let outside = root.join("gone-too.md");
        let mut indexer = VaultIndexer::new().unwrap();
        for path in [&alive, &gone, &outside] {
            indexer
                .index_one(note(&path.to_string_lossy(), "apollo"))
                .unwrap();
        }

        assert_eq!(indexer.remove_missing_under(&dir).unwrap(), 1);
        assert!(indexer.contains(&alive));
        assert!(!indexer.contains(&gone));
        // Outside the directory, so left for its own event.
        assert!(indexer.contains(&outside));
        assert_eq!(indexer.search("apollo", 10).unwrap().len(), 2);
        assert_eq!(indexer.remove_missing_under(&dir).unwrap(), 0);
    }

    #[test]
    fn clear_empties_everything() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer
            .index_all(vec![note("/v/a.md", "one"), note("/v/b.md", "two")])
            .unwrap();
        indexer.clear().unwrap();

        assert_eq!(indexer.len(), 0);
        assert!(indexer.search("one", 10).unwrap().is_empty());
    }

    #[test]
    fn handle_reads_share_state() {
        let mut indexer = VaultIndexer::new().unwrap();
        indexer.index_one(note("/v/a.md", "shared")).unwrap();
        let handle = IndexHandle::new(indexer);
        let reader = handle.clone();

        assert!(reader.is_indexed().unwrap());
        handle.write().unwrap().clear().unwrap();
        assert!(!reader.is_indexed().unwrap());
    }
}
