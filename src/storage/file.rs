use crate::models::ShortenedUrl;
use crate::storage::{Storage, StorageError};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;

/// Read-only slug store loaded once from a JSON file
///
/// The file holds a single object whose keys are slugs and whose values are
/// destination URLs. The map is never modified after loading, so lookups
/// need no locking.
#[derive(Debug, Default, Clone)]
pub struct FileStorage {
    urls: HashMap<String, String>,
}

impl FileStorage {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let urls = serde_json::from_slice(&data).map_err(|source| StorageError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(Self { urls })
    }

    pub fn from_map(urls: HashMap<String, String>) -> Self {
        Self { urls }
    }

    /// All slugs with their destinations, in no particular order
    pub fn entries(&self) -> impl Iterator<Item = ShortenedUrl> + '_ {
        self.urls.iter().map(|(code, url)| ShortenedUrl {
            short_code: code.clone(),
            original_url: url.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, short_code: &str) -> Result<Option<ShortenedUrl>> {
        Ok(self.urls.get(short_code).map(|url| ShortenedUrl {
            short_code: short_code.to_string(),
            original_url: url.clone(),
        }))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.len())
    }
}
