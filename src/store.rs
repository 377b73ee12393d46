// src/store.rs
//! Persistent monitor state: sources and the entries produced for them.
//!
//! The whole state is one JSON document. Every mutation rewrites it through a
//! temp file followed by a rename, so a crash mid-write leaves the previous
//! document intact. The in-memory copy only changes once the write has
//! landed, so a failed save leaves nothing half-recorded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{Entry, Source};
use crate::tracker::StateQuery;

pub const STATE_FILE: &str = "monitor_state.json";

#[async_trait]
pub trait StateStore: StateQuery {
    async fn get_source(&self, name: &str) -> Result<Option<Source>>;
    async fn save_source(&self, source: &Source) -> Result<()>;
    /// Entries are immutable: saving an id that already exists is a no-op.
    async fn save_entry(&self, entry: &Entry) -> Result<()>;
    async fn entry_count(&self, source_name: &str) -> Result<usize>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateDoc {
    #[serde(default)]
    sources: BTreeMap<String, Source>,
    #[serde(default)]
    entries: BTreeMap<String, Entry>,
}

impl StateDoc {
    fn for_source<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.values().filter(move |e| e.source_name == name)
    }

    fn latest(&self, name: &str) -> Option<DateTime<Utc>> {
        self.for_source(name).filter_map(|e| e.published_at).max()
    }

    /// Returns false when the id was already stored.
    fn insert_entry(&mut self, entry: &Entry) -> bool {
        if self.entries.contains_key(&entry.id) {
            return false;
        }
        self.entries.insert(entry.id.clone(), entry.clone());
        true
    }
}

// ------------------------------------------------------------
// JSON file store
// ------------------------------------------------------------

pub struct JsonFileStore {
    path: PathBuf,
    doc: Mutex<StateDoc>,
}

impl JsonFileStore {
    /// Open (or start) the state document inside `state_dir`.
    pub async fn open(state_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = state_dir.as_ref();
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating state dir {}", dir.display()))?;
        let path = dir.join(STATE_FILE);

        let doc = match fs::read_to_string(&path).await {
            Ok(s) => serde_json::from_str(&s)
                .with_context(|| format!("parsing state file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateDoc::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading state file {}", path.display()))
            }
        };
        tracing::info!(
            path = %path.display(),
            sources = doc.sources.len(),
            entries = doc.entries.len(),
            "state loaded"
        );
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, doc: &StateDoc) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc).context("serializing state")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl StateQuery for JsonFileStore {
    async fn entry_exists(&self, entry_id: &str) -> Result<bool> {
        Ok(self.doc.lock().await.entries.contains_key(entry_id))
    }

    async fn latest_timestamp_for_source(&self, source_name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.doc.lock().await.latest(source_name))
    }

    async fn is_source_bootstrap(&self, source_name: &str) -> Result<bool> {
        Ok(self.doc.lock().await.for_source(source_name).next().is_none())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get_source(&self, name: &str) -> Result<Option<Source>> {
        Ok(self.doc.lock().await.sources.get(name).cloned())
    }

    async fn save_source(&self, source: &Source) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.sources.insert(source.name.clone(), source.clone());
        self.persist(&next).await?;
        *doc = next;
        Ok(())
    }

    async fn save_entry(&self, entry: &Entry) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        if !next.insert_entry(entry) {
            tracing::debug!(entry_id = %entry.id, "entry already stored");
            return Ok(());
        }
        self.persist(&next).await?;
        *doc = next;
        Ok(())
    }

    async fn entry_count(&self, source_name: &str) -> Result<usize> {
        Ok(self.doc.lock().await.for_source(source_name).count())
    }
}

// ------------------------------------------------------------
// In-memory store
// ------------------------------------------------------------

/// Non-persistent store for dry runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<StateDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries_for(&self, source_name: &str) -> Vec<Entry> {
        self.doc.lock().await.for_source(source_name).cloned().collect()
    }
}

#[async_trait]
impl StateQuery for MemoryStore {
    async fn entry_exists(&self, entry_id: &str) -> Result<bool> {
        Ok(self.doc.lock().await.entries.contains_key(entry_id))
    }

    async fn latest_timestamp_for_source(&self, source_name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.doc.lock().await.latest(source_name))
    }

    async fn is_source_bootstrap(&self, source_name: &str) -> Result<bool> {
        Ok(self.doc.lock().await.for_source(source_name).next().is_none())
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get_source(&self, name: &str) -> Result<Option<Source>> {
        Ok(self.doc.lock().await.sources.get(name).cloned())
    }

    async fn save_source(&self, source: &Source) -> Result<()> {
        self.doc
            .lock()
            .await
            .sources
            .insert(source.name.clone(), source.clone());
        Ok(())
    }

    async fn save_entry(&self, entry: &Entry) -> Result<()> {
        self.doc.lock().await.insert_entry(entry);
        Ok(())
    }

    async fn entry_count(&self, source_name: &str) -> Result<usize> {
        Ok(self.doc.lock().await.for_source(source_name).count())
    }
}
