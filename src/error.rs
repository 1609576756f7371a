use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("invalid vault root {path}: {reason}")]
    InvalidVault { path: PathBuf, reason: String },

    #[error("path escapes the vault root: {0}")]
    PathEscape(PathBuf),

    #[error("malformed frontmatter in {path}: {reason}")]
    Frontmatter { path: PathBuf, reason: String },

    #[error("index lock poisoned: {0}")]
    IndexLocked(String),

    #[error("no vault is connected")]
    NotConnected,

    #[error("vault worker stopped")]
    WorkerStopped,

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}
