//! vaultbrief - meeting context retrieval over a markdown vault.
//!
//! vaultbrief keeps an in-memory full-text index of a directory of markdown
//! notes (a "vault") in sync with the disk, and ranks the notes most relevant
//! to a meeting by combining [Tantivy](https://github.com/quickwit-oss/tantivy)
//! search with a composite relevance score (text similarity, recency and
//! attendee mentions).
//!
//! # Quick start
//!
//! ```no_run
//! use std::{path::Path, sync::Arc};
//!
//! use vaultbrief::{
//!     ContextRetriever, Meeting, MemoryPathStore, RetrievalConfig, VaultManager,
//! };
//!
//! # async fn run() -> vaultbrief::Result<()> {
//! let mut vault = VaultManager::new(Arc::new(MemoryPathStore::default()))?;
//! let report = vault.connect(Path::new("/home/me/notes")).await?;
//! println!("indexed {} notes", report.indexed);
//!
//! let retriever = ContextRetriever::new(vault.handle(), RetrievalConfig::default());
//! let meeting = Meeting {
//!     title: "Acme Kickoff".to_string(),
//!     attendees: vec!["Jane Doe <jane@acme.com>".to_string()],
//!     ..Meeting::default()
//! };
//!
//! for m in retriever.find_relevant_context(&meeting).matches {
//!     println!("{:.2} {}", m.relevance_score, m.path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config_db;
pub mod context;
pub mod data_dir;
pub mod document;
pub mod enhancer;
pub mod error;
pub mod frontmatter;
pub mod indexer;
pub mod query;
pub mod scoring;
pub mod tantivy_index;
pub mod text_util;
pub mod vault;
pub mod walker;
pub mod watcher;

pub use config_db::ConfigDb;
pub use context::{
    ContextMatch,
    ContextRetrievalResult,
    ContextRetriever,
    Meeting,
    RetrievalConfig,
};
pub use data_dir::DataDir;
pub use document::VaultFile;
pub use error::{Error, Result};
pub use indexer::{IndexHandle, IndexReport, VaultIndexer};
pub use scoring::{MatchedField, RelevanceWeights};
pub use tantivy_index::SearchIndex;
pub use vault::{
    MemoryPathStore,
    ReadOutcome,
    VaultManager,
    VaultPathStore,
    VaultState,
    VaultStatus,
};
pub use watcher::VaultEvent;
