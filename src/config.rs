use std::env;
use std::path::PathBuf;

use clap::ValueEnum;
use tokio::time::Duration;
use url::Url;

use crate::storage::S3Config;

/// How the pipeline stages are carried out
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum PipelineMode {
    /// Every stage is a fixed sleep
    Fake,
    /// Download the job input from S3, then mark the job done
    S3,
}

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Address the HTTP listener binds to
    /// Default: 0.0.0.0:8081
    pub bind_addr: String,

    /// Base URL of the job-tracking API
    /// Default: http://localhost:3000
    pub job_api_base_url: Url,

    pub mode: PipelineMode,

    /// Required in S3 mode
    pub aws_region: Option<String>,
    /// Required in S3 mode
    pub s3_bucket: Option<String>,
    pub s3_endpoint_url: Option<String>,

    /// Where downloaded inputs are written
    pub download_dir: PathBuf,

    /// Pause between the DISPATCH patch and reading the job back
    pub dispatch_delay: Duration,

    /// Length of each simulated stage in fake mode
    pub fake_stage_delay: Duration,

    /// Directory for rotated log files
    pub log_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Optional environment variables:
    /// - BIND_ADDR (default: 0.0.0.0:8081)
    /// - JOB_API_BASE_URL (default: http://localhost:3000)
    /// - PIPELINE_MODE: `fake` or `s3` (default: s3)
    /// - AWS_REGION, S3_BUCKET_NAME: required when running in S3 mode
    /// - S3_ENDPOINT_URL: custom endpoint for S3-compatible stores
    /// - DOWNLOAD_DIR (default: tmp)
    /// - DISPATCH_DELAY_MS (default: 300)
    /// - FAKE_STAGE_DELAY_MS (default: 1000)
    /// - LOG_DIR (default: logs)
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists
        dotenv::dotenv().ok();

        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let non_empty = |key: &str| var(key).filter(|value| !value.trim().is_empty());
        let millis = |key: &str, default: u64| -> Result<Duration, String> {
            match non_empty(key) {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(|_| format!("{} must be a number of milliseconds, got '{}'", key, raw)),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let raw_base_url =
            non_empty("JOB_API_BASE_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let job_api_base_url = Url::parse(&raw_base_url)
            .map_err(|e| format!("JOB_API_BASE_URL '{}' is not a valid URL: {}", raw_base_url, e))?;
        if job_api_base_url.cannot_be_a_base() {
            return Err(format!("JOB_API_BASE_URL '{}' cannot be used as a base URL", raw_base_url));
        }

        let mode = match non_empty("PIPELINE_MODE") {
            Some(raw) => PipelineMode::from_str(raw.trim(), true)
                .map_err(|_| format!("PIPELINE_MODE must be 'fake' or 's3', got '{}'", raw))?,
            None => PipelineMode::S3,
        };

        Ok(Config {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8081".to_string()),
            job_api_base_url,
            mode,
            aws_region: non_empty("AWS_REGION"),
            s3_bucket: non_empty("S3_BUCKET_NAME"),
            s3_endpoint_url: non_empty("S3_ENDPOINT_URL"),
            download_dir: non_empty("DOWNLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("tmp")),
            dispatch_delay: millis("DISPATCH_DELAY_MS", 300)?,
            fake_stage_delay: millis("FAKE_STAGE_DELAY_MS", 1000)?,
            log_dir: non_empty("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        })
    }

    /// S3 settings; fails when the region or bucket is missing
    pub fn s3_config(&self) -> Result<S3Config, String> {
        match (&self.aws_region, &self.s3_bucket) {
            (Some(region), Some(bucket)) => Ok(S3Config {
                region: region.clone(),
                bucket: bucket.clone(),
                endpoint_url: self.s3_endpoint_url.clone(),
            }),
            _ => Err("Missing AWS_REGION or S3_BUCKET_NAME env vars".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.job_api_base_url.as_str(), "http://localhost:3000/");
        assert_eq!(config.mode, PipelineMode::S3);
        assert_eq!(config.download_dir, PathBuf::from("tmp"));
        assert_eq!(config.dispatch_delay, Duration::from_millis(300));
        assert_eq!(config.fake_stage_delay, Duration::from_millis(1000));
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn s3_mode_requires_region_and_bucket() {
        let config = load(&[("AWS_REGION", "us-east-1")]).unwrap();
        assert!(config.s3_config().is_err());

        let config = load(&[("AWS_REGION", "us-east-1"), ("S3_BUCKET_NAME", "")]).unwrap();
        assert!(config.s3_config().is_err());

        let config = load(&[
            ("AWS_REGION", "us-east-1"),
            ("S3_BUCKET_NAME", "captions"),
            ("S3_ENDPOINT_URL", "http://localhost:4566"),
        ])
        .unwrap();
        let s3 = config.s3_config().unwrap();
        assert_eq!(s3.region, "us-east-1");
        assert_eq!(s3.bucket, "captions");
        assert_eq!(s3.endpoint_url.as_deref(), Some("http://localhost:4566"));
    }

    #[test]
    fn parses_mode_case_insensitively() {
        assert_eq!(load(&[("PIPELINE_MODE", "FAKE")]).unwrap().mode, PipelineMode::Fake);
        assert!(load(&[("PIPELINE_MODE", "ffmpeg")]).is_err());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(load(&[("JOB_API_BASE_URL", "not a url")]).is_err());
        assert!(load(&[("JOB_API_BASE_URL", "mailto:jobs@example.com")]).is_err());
        assert!(load(&[("DISPATCH_DELAY_MS", "soon")]).is_err());
    }
}
