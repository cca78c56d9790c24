use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenedUrl {
    pub short_code: String,
    pub original_url: String,
}

impl ShortenedUrl {
    /// Only plain web URLs may be redirected to; this keeps `javascript:`
    /// and `data:` targets out of the `Location` header.
    pub fn has_safe_scheme(&self) -> bool {
        self.original_url.starts_with("http://") || self.original_url.starts_with("https://")
    }
}
