//! Object storage for job inputs.

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

pub mod s3;

pub use s3::{S3Config, S3Store};

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("get object {key} failed: {message}")]
    GetObject { key: String, message: String },

    /// Streaming the object into the local file failed, on either side
    #[error("copying object {key} to {path} failed: {message}")]
    CopyToFile {
        key: String,
        path: String,
        message: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read side of an object store, as far as the pipeline needs it
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stream the object at `key` into a file at `dest`, creating parent
    /// directories. A failed transfer may leave a partial file behind.
    async fn download_to(&self, key: &str, dest: &Path) -> StorageResult<u64>;
}
