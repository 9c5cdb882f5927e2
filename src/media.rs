// src/media.rs
use anyhow::Result;

/// Copies remote media into our own storage and returns the stored URL.
/// Transient-failure-prone by nature; a failed copy skips exactly one item.
#[async_trait::async_trait]
pub trait MediaMirror: Send + Sync {
    async fn copy_to_storage(&self, remote_url: &str) -> Result<String>;
}

/// Keeps the source-side URL as-is. Used when no mirror backend is
/// configured; a CDN-backed implementation slots in behind the same trait.
pub struct PassthroughMirror;

#[async_trait::async_trait]
impl MediaMirror for PassthroughMirror {
    async fn copy_to_storage(&self, remote_url: &str) -> Result<String> {
        Ok(remote_url.to_string())
    }
}
