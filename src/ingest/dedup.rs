// src/ingest/dedup.rs
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::store::MemeStore;

/// Read-only ingest-or-skip decision against the store. Runs before the
/// media copy so duplicates cost one lookup, not an upload.
pub struct DedupGuard {
    store: Arc<dyn MemeStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn MemeStore>) -> Self {
        Self { store }
    }

    /// `true` when the candidate should be ingested. Items without a stable
    /// external identity are never considered duplicates of each other. A
    /// failed lookup is an error: the caller must skip the item rather than
    /// risk an undetected duplicate.
    pub async fn should_ingest(&self, source_url: &str) -> Result<bool> {
        if source_url.is_empty() {
            return Ok(true);
        }
        let exists = self
            .store
            .exists(source_url)
            .await
            .context("dedup lookup failed")?;
        Ok(!exists)
    }
}
