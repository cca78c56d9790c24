use crate::models::ShortenedUrl;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read URL file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("URL file {} is not a JSON object of slugs to URLs", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Get a shortened URL by slug
    async fn get(&self, short_code: &str) -> Result<Option<ShortenedUrl>>;

    /// Number of known slugs
    async fn count(&self) -> Result<usize>;
}
