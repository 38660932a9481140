use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted set of already-processed message ids, stored as a JSON array
/// of strings. Single-process assumption: the file is always read, modified
/// and rewritten by the one active scheduler, never locked.
pub struct ProcessedLedger {
    path: PathBuf,
}

impl ProcessedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ProcessedLedger { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the processed ids. A malformed file is not fatal: the store is
    /// reset to an empty list and the corruption logged.
    pub fn load(&self) -> Result<HashSet<String>> {
        let ids = self.read_or_reset()?;
        debug!("Loaded {} processed id(s) from {:?}", ids.len(), self.path);
        Ok(ids.into_iter().collect())
    }

    /// Records one processed message id: re-reads the current state, appends
    /// the id if absent and rewrites the whole file.
    pub fn save(&self, id: &str) -> Result<()> {
        let mut ids = self.read_or_reset()?;

        if ids.iter().any(|known| known == id) {
            debug!("Message {} already recorded in the ledger", id);
            return Ok(());
        }

        ids.push(id.to_string());
        self.write_ids(&ids)?;
        info!("💾 Message {} recorded as processed ({} total)", id, ids.len());
        Ok(())
    }

    fn read_or_reset(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Unable to read ledger file {:?}", self.path))?;

        // The store is a JSON array; entries are string-normalized so a list
        // of numbers written by an earlier run still counts.
        match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
            Ok(values) => Ok(values
                .into_iter()
                .map(|value| match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect()),
            Err(e) => {
                warn!(
                    "⚠️ Ledger file {:?} is corrupt ({}), resetting to an empty list",
                    self.path, e
                );
                self.write_ids(&[])?;
                Ok(Vec::new())
            }
        }
    }

    fn write_ids(&self, ids: &[String]) -> Result<()> {
        let json = serde_json::to_string(ids).context("Unable to serialize the ledger")?;
        fs::write(&self.path, json)
            .with_context(|| format!("Unable to write ledger file {:?}", self.path))?;
        Ok(())
    }
}
