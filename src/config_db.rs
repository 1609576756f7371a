use std::path::{Path, PathBuf};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::{
    context::RetrievalConfig,
    error::{Error, Result},
    scoring::RelevanceWeights,
    vault::VaultPathStore,
};

const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Setting keys understood by vaultbrief.
pub mod keys {
    pub const VAULT_PATH: &str = "vault_path";
    pub const MAX_RESULTS: &str = "max_results";
    pub const MIN_RELEVANCE_SCORE: &str = "min_relevance_score";
    pub const SNIPPET_LENGTH: &str = "snippet_length";
    /// JSON object with any subset of the relevance weight fields.
    pub const WEIGHTS: &str = "weights";
}

/// Persistent settings, stored in a redb database.
pub struct ConfigDb {
    db: Database,
}

impl ConfigDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    pub fn remove_setting(&self, key: &str) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(SETTINGS)?;
            table.remove(key)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }

    /// Retrieval settings, with defaults for anything not stored.
    pub fn retrieval_config(&self) -> Result<RetrievalConfig> {
        let defaults = RetrievalConfig::default();
        let weights = match self.get_setting(keys::WEIGHTS)? {
            Some(raw) => serde_json::from_str::<RelevanceWeights>(&raw)
                .map_err(|e| Error::Config(format!("{}: {e}", keys::WEIGHTS)))?,
            None => defaults.weights,
        };

        Ok(RetrievalConfig {
            max_results: self.parsed_setting(keys::MAX_RESULTS, defaults.max_results)?,
            min_relevance_score: self
                .parsed_setting(keys::MIN_RELEVANCE_SCORE, defaults.min_relevance_score)?,
            snippet_length: self
                .parsed_setting(keys::SNIPPET_LENGTH, defaults.snippet_length)?,
            weights,
        })
    }

    fn parsed_setting<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_setting(key)? {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key} '{raw}': {e}"))),
            None => Ok(default),
        }
    }
}

impl VaultPathStore for ConfigDb {
    fn vault_path(&self) -> Result<Option<PathBuf>> {
        Ok(self.get_setting(keys::VAULT_PATH)?.map(PathBuf::from))
    }

    fn set_vault_path(&self, path: Option<&Path>) -> Result<()> {
        match path {
            Some(p) => self.set_setting(keys::VAULT_PATH, &p.to_string_lossy()),
            None => self.remove_setting(keys::VAULT_PATH).map(|_| ()),
        }
    }
}

impl std::fmt::Debug for ConfigDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigDb").finish_non_exhaustive()
    }
}
