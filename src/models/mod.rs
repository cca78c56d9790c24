pub mod url;

pub use url::ShortenedUrl;
