use std::path::Path;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use tokio::fs::{self, File};
use tokio::io::{self, AsyncWriteExt};
use tracing::{debug, info};

use super::{ObjectStore, StorageError, StorageResult};

/// S3 connection settings
#[derive(Debug, Clone)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    /// Custom endpoint for S3-compatible stores; forces path-style addressing
    pub endpoint_url: Option<String>,
}

/// S3 bucket reader
#[derive(Clone, Debug)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Build a client from the default AWS credential chain
    pub async fn connect(config: S3Config) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn download_to(&self, key: &str, dest: &Path) -> StorageResult<u64> {
        debug!("Downloading s3://{}/{} to {}", self.bucket, key, dest.display());

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::GetObject {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = File::create(dest).await?;
        let mut body = Box::pin(object.body.into_async_read());
        let written = io::copy(&mut body, &mut file)
            .await
            .map_err(|e| StorageError::CopyToFile {
                key: key.to_string(),
                path: dest.display().to_string(),
                message: e.to_string(),
            })?;
        file.flush().await?;

        info!("Downloaded {} bytes from s3://{}/{}", written, self.bucket, key);
        Ok(written)
    }
}
