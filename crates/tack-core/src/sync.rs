pub mod file;
pub mod http;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use tack_shared::{ItemRecord, PersistMoveArgs};
use thiserror::Error;
use tracing::info;

use crate::config::Config;

pub use file::FileSyncAdapter;
pub use http::HttpSyncAdapter;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("temporarily unavailable: {0}")]
    Transient(String),
    #[error("rejected: {0}")]
    Permanent(String),
}

impl SyncError {
    /// Whether repeating the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

/// The backend holding the authoritative copy of every item.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<ItemRecord>, SyncError>;

    async fn persist_move(&self, args: &PersistMoveArgs) -> Result<(), SyncError>;
}

#[tracing::instrument(skip(cfg, data_dir))]
pub fn open_adapter(cfg: &Config, data_dir: &Path) -> anyhow::Result<Box<dyn SyncAdapter>> {
    let backend = cfg.get("sync.backend").unwrap_or_else(|| "file".to_string());
    match backend.trim().to_ascii_lowercase().as_str() {
        "file" => {
            let adapter = FileSyncAdapter::open(data_dir).with_context(|| {
                format!("failed to open item feed in {}", data_dir.display())
            })?;
            info!(feed = %adapter.feed_path().display(), "using file sync backend");
            Ok(Box::new(adapter))
        }
        "http" => {
            let endpoint = cfg
                .get("sync.endpoint")
                .ok_or_else(|| anyhow!("sync.backend=http requires sync.endpoint"))?;
            let timeout_ms = cfg.get_u64("sync.timeout_ms")?.unwrap_or(10_000);
            let adapter = HttpSyncAdapter::new(&endpoint, Duration::from_millis(timeout_ms))
                .context("failed to build HTTP sync client")?;
            info!(endpoint = %endpoint, timeout_ms, "using http sync backend");
            Ok(Box::new(adapter))
        }
        other => Err(anyhow!("invalid sync.backend setting: {other}")),
    }
}
