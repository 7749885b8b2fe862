use crate::cover::CoverImage;
use crate::ledger::CreditLedger;
use crate::outline::Outline;
use crate::project::Project;
use crate::workflow::{WorkflowSession, WorkflowStage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("failed to read library file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write library file `{path}`: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse library file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize the library: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("no book with id `{0}` in the library")]
    NotFound(String),
}

/// Persisted snapshot of one book. The credit balance is deliberately not
/// stored here; it is account-wide and lives in the config file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub project: Project,
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub chapter_texts: Vec<Option<String>>,
    #[serde(default)]
    pub cover: Option<CoverImage>,
    pub stage: WorkflowStage,
}

impl LibraryEntry {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Snapshots a live session under the given id.
    pub fn from_session(id: impl Into<String>, session: &WorkflowSession) -> Self {
        Self {
            id: id.into(),
            updated_at: Utc::now(),
            project: session.project.clone(),
            outline: session.outline().cloned(),
            chapter_texts: session.chapter_texts().to_vec(),
            cover: session.cover().cloned(),
            stage: session.stage(),
        }
    }

    /// Rebuilds a session from this snapshot. Stages that cannot survive a
    /// restart are normalized by the session itself.
    pub fn into_session(self, ledger: CreditLedger) -> WorkflowSession {
        WorkflowSession::restore(
            self.project,
            ledger,
            self.outline,
            self.chapter_texts,
            self.cover,
            self.stage,
        )
    }

    pub fn title(&self) -> &str {
        self.outline
            .as_ref()
            .map(|outline| outline.title.as_str())
            .filter(|title| !title.is_empty())
            .unwrap_or("(untitled)")
    }
}

/// Whole-file JSON store for the book library. Every mutation rewrites the
/// file; books are small enough that this stays comfortably cheap.
#[derive(Debug)]
pub struct LibraryStore {
    path: PathBuf,
    entries: Vec<LibraryEntry>,
}

impl LibraryStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|source| LibraryError::Read {
                path: path.clone(),
                source,
            })?;
            serde_json::from_str(&contents).map_err(|source| LibraryError::Parse {
                path: path.clone(),
                source,
            })?
        } else {
            Vec::new()
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries sorted most recently touched first.
    pub fn list(&self) -> Vec<&LibraryEntry> {
        let mut entries: Vec<&LibraryEntry> = self.entries.iter().collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    pub fn get(&self, id: &str) -> Option<&LibraryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Inserts or replaces the entry with the same id, then saves.
    pub fn upsert(&mut self, entry: LibraryEntry) -> Result<(), LibraryError> {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
        self.save()
    }

    pub fn remove(&mut self, id: &str) -> Result<LibraryEntry, LibraryError> {
        let position = self
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| LibraryError::NotFound(id.to_string()))?;
        let removed = self.entries.remove(position);
        self.save()?;
        Ok(removed)
    }

    fn save(&self) -> Result<(), LibraryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| LibraryError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(LibraryError::Serialize)?;
        fs::write(&self.path, json).map_err(|source| LibraryError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Pricing;
    use tempfile::tempdir;

    fn sample_entry(id: &str) -> LibraryEntry {
        let session = WorkflowSession::new(
            Project::new("compilers"),
            CreditLedger::new(1_000, Pricing::default()),
        );
        LibraryEntry::from_session(id, &session)
    }

    #[test]
    fn upsert_and_reload_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");

        let mut store = LibraryStore::open(&path).unwrap();
        store.upsert(sample_entry("a")).unwrap();
        store.upsert(sample_entry("b")).unwrap();

        let reloaded = LibraryStore::open(&path).unwrap();
        assert_eq!(reloaded.list().len(), 2);
        assert!(reloaded.get("a").is_some());
    }

    #[test]
    fn upsert_replaces_by_id() {
        let dir = tempdir().unwrap();
        let mut store = LibraryStore::open(dir.path().join("library.json")).unwrap();
        store.upsert(sample_entry("a")).unwrap();

        let mut changed = sample_entry("a");
        changed.project.description = "interpreters".to_string();
        store.upsert(changed).unwrap();

        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get("a").unwrap().project.description, "interpreters");
    }

    #[test]
    fn remove_missing_id_is_reported() {
        let dir = tempdir().unwrap();
        let mut store = LibraryStore::open(dir.path().join("library.json")).unwrap();
        assert!(matches!(
            store.remove("ghost"),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn entry_title_falls_back_when_no_outline() {
        assert_eq!(sample_entry("a").title(), "(untitled)");
    }
}
