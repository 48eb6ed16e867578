//! Save-record persistence for game snapshots.
//!
//! Records are JSON files `{timestamp, date, game_state, version}` in a
//! configurable save directory, one file per save name. The only contract
//! with the engine is that a [`GameSnapshot`] round-trips intact; the
//! high-score-max rule on import is applied by the registry's restore.

pub mod error;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};

use game_core::GameSnapshot;

pub use error::PersistenceError;

/// Record format version, carried in every file.
pub const SAVE_FORMAT_VERSION: &str = "2.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveRecord {
    /// RFC 3339 creation instant.
    pub timestamp: String,
    /// Human-readable creation time ("%Y-%m-%d %H:%M:%S").
    pub date: String,
    pub game_state: GameSnapshot,
    pub version: String,
}

/// Listing entry for a stored save.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SaveInfo {
    pub name: String,
    pub date: String,
    pub version: String,
}

/// File-backed store of save records.
pub struct SaveStore {
    save_dir: PathBuf,
}

impl SaveStore {
    /// Open a store rooted at `save_dir`, creating the directory if needed.
    pub fn new(save_dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let save_dir = save_dir.into();
        fs::create_dir_all(&save_dir)?;
        Ok(SaveStore { save_dir })
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    fn save_path(&self, name: &str) -> PathBuf {
        self.save_dir.join(format!("{}.json", name))
    }

    /// Write `snapshot` under `name`, overwriting any previous record.
    pub fn save(&self, name: &str, snapshot: &GameSnapshot) -> Result<(), PersistenceError> {
        let now = Local::now();
        let record = SaveRecord {
            timestamp: now.to_rfc3339(),
            date: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            game_state: snapshot.clone(),
            version: SAVE_FORMAT_VERSION.to_string(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(self.save_path(name), json)?;
        tracing::debug!(name, "game saved");
        Ok(())
    }

    /// Load the snapshot stored under `name`, or None if no such save.
    pub fn load(&self, name: &str) -> Result<Option<GameSnapshot>, PersistenceError> {
        let path = self.save_path(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        let record: SaveRecord = serde_json::from_str(&content)
            .map_err(|e| PersistenceError::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(record.game_state))
    }

    /// All stored saves, newest first. Unreadable files are skipped with a
    /// warning rather than failing the whole listing.
    pub fn list(&self) -> Result<Vec<SaveInfo>, PersistenceError> {
        let mut saves = Vec::new();
        for dir_entry in fs::read_dir(&self.save_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match fs::read_to_string(&path)
                .map_err(PersistenceError::from)
                .and_then(|c| serde_json::from_str::<SaveRecord>(&c).map_err(Into::into))
            {
                Ok(record) => saves.push(SaveInfo {
                    name: name.to_string(),
                    date: record.date,
                    version: record.version,
                }),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "skipping unreadable save: {}", e);
                }
            }
        }
        saves.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(saves)
    }

    /// Delete the save under `name`. Idempotent.
    pub fn delete(&self, name: &str) -> Result<(), PersistenceError> {
        match fs::remove_file(self.save_path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
