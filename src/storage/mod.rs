pub mod file;
pub mod trait_def;

pub use file::FileStorage;
pub use trait_def::{Storage, StorageError};
