// src/ingest/types.rs
use chrono::{DateTime, Utc};

/// A named unit polled within a source: one subreddit or one Instagram
/// account, tagged with the category its items are filed under.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubSource {
    pub name: String,
    pub category: String,
}

impl SubSource {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
        }
    }
}

/// One item produced by a source poll. Transient: lives until it is either
/// persisted or discarded as a duplicate.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateMeme {
    /// Stable external identity (post permalink URL). Empty for items
    /// without one; those are never deduplicated.
    pub source_url: String,
    pub title: String,
    /// Direct URL of the media on the source side, before mirroring.
    pub media_url: String,
    pub sub_source: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

/// Poll failure, split so the caller can decide between banning the
/// sub-source (permanent) and retrying on a later sweep (transient).
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("sub-source '{0}' not found")]
    NotFound(String),
    #[error("sub-source '{0}' redirected (removed or renamed)")]
    Redirected(String),
    #[error(transparent)]
    Transient(#[from] anyhow::Error),
}

impl FetchError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::Redirected(_))
    }
}

#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Poll one sub-source for up to `limit` inspectable items. Must be safe
    /// to call repeatedly with different sub-sources; the adapter holds no
    /// per-sub-source state (banning is the caller's job).
    async fn poll(&self, sub: &SubSource, limit: usize) -> Result<Vec<CandidateMeme>, FetchError>;
    fn name(&self) -> &'static str;
}
