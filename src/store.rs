//! # Meme Store
//! Persistence boundary for ingested memes. The scheduler core only needs
//! `exists` (dedup lookup) and `insert`; everything else about the store is
//! someone else's problem. A store-level duplicate is reported as
//! [`StoreError::Duplicate`] so callers can treat it as "already exists"
//! rather than a failure.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted record. Never mutated by the ingestion core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestedMeme {
    pub id: Uuid,
    pub title: String,
    pub media_url: String,
    /// External identity; unique across all records when non-empty.
    pub source_url: String,
    pub category: String,
    pub sub_source: String,
    /// Creation time on the source side.
    pub created_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
}

/// Insert payload; the store assigns `id` and `ingested_at`.
#[derive(Debug, Clone)]
pub struct NewMeme {
    pub title: String,
    pub media_url: String,
    pub source_url: String,
    pub category: String,
    pub sub_source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate source url: {0}")]
    Duplicate(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[async_trait::async_trait]
pub trait MemeStore: Send + Sync {
    /// Exact-match lookup on the external identity. Empty ids never match.
    async fn exists(&self, source_url: &str) -> Result<bool>;
    async fn insert(&self, meme: NewMeme) -> Result<IngestedMeme, StoreError>;
}

fn build_record(meme: NewMeme) -> IngestedMeme {
    IngestedMeme {
        id: Uuid::new_v4(),
        title: meme.title,
        media_url: meme.media_url,
        source_url: meme.source_url,
        category: meme.category,
        sub_source: meme.sub_source,
        created_at: meme.created_at,
        ingested_at: Utc::now(),
    }
}

/// In-memory store, used by tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    memes: Mutex<Vec<IngestedMeme>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.memes.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<IngestedMeme> {
        self.memes.lock().expect("store lock poisoned").clone()
    }
}

#[async_trait::async_trait]
impl MemeStore for MemoryStore {
    async fn exists(&self, source_url: &str) -> Result<bool> {
        if source_url.is_empty() {
            return Ok(false);
        }
        let memes = self.memes.lock().expect("store lock poisoned");
        Ok(memes.iter().any(|m| m.source_url == source_url))
    }

    async fn insert(&self, meme: NewMeme) -> Result<IngestedMeme, StoreError> {
        let mut memes = self.memes.lock().expect("store lock poisoned");
        if !meme.source_url.is_empty() && memes.iter().any(|m| m.source_url == meme.source_url) {
            return Err(StoreError::Duplicate(meme.source_url));
        }
        let record = build_record(meme);
        memes.push(record.clone());
        Ok(record)
    }
}

/// JSON-file-backed store: the whole collection is rewritten on each insert.
/// Fine for the volumes a nightly fetch produces; a database-backed
/// implementation would slot in behind the same trait.
pub struct FileStore {
    path: PathBuf,
    memes: tokio::sync::Mutex<Vec<IngestedMeme>>,
}

impl FileStore {
    /// Load existing state from `path`, or start empty if the file is
    /// missing or unreadable.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let memes = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Self {
            path,
            memes: tokio::sync::Mutex::new(memes),
        }
    }

    async fn persist(&self, memes: &[IngestedMeme]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let body = serde_json::to_vec_pretty(memes).context("serializing meme state")?;
        tokio::fs::write(&self.path, body)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl MemeStore for FileStore {
    async fn exists(&self, source_url: &str) -> Result<bool> {
        if source_url.is_empty() {
            return Ok(false);
        }
        let memes = self.memes.lock().await;
        Ok(memes.iter().any(|m| m.source_url == source_url))
    }

    async fn insert(&self, meme: NewMeme) -> Result<IngestedMeme, StoreError> {
        let mut memes = self.memes.lock().await;
        if !meme.source_url.is_empty() && memes.iter().any(|m| m.source_url == meme.source_url) {
            return Err(StoreError::Duplicate(meme.source_url));
        }
        let record = build_record(meme);
        memes.push(record.clone());
        self.persist(&memes).await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(source_url: &str) -> NewMeme {
        NewMeme {
            title: "title".into(),
            media_url: "https://cdn.example/x.jpg".into(),
            source_url: source_url.into(),
            category: "general".into(),
            sub_source: "memes".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_rejects_duplicate_source_url() {
        let store = MemoryStore::new();
        store.insert(sample("https://reddit.com/r/memes/1")).await.unwrap();
        let err = store
            .insert(sample("https://reddit.com/r/memes/1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn empty_source_url_is_never_a_duplicate() {
        let store = MemoryStore::new();
        store.insert(sample("")).await.unwrap();
        store.insert(sample("")).await.unwrap();
        assert_eq!(store.len(), 2);
        assert!(!store.exists("").await.unwrap());
    }
}
