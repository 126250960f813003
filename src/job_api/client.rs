use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::models::{CaptionJob, PatchJobRequest};

pub type JobApiResult<T> = Result<T, JobApiError>;

/// Errors returned by the job API client
#[derive(Debug, Error)]
pub enum JobApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("get job failed: {0}")]
    GetFailed(StatusCode),

    #[error("patch failed: {0}")]
    PatchFailed(StatusCode),

    #[error("base url cannot carry a path: {0}")]
    InvalidBaseUrl(Url),

    #[error("job id '{0}' cannot be used as a path segment")]
    InvalidJobId(String),
}

/// `.` and `..` are resolved away by URL normalization, even percent-encoded
pub fn is_dot_segment(job_id: &str) -> bool {
    matches!(job_id, "." | "..")
}

/// HTTP client for the external job-tracking API
///
/// Reads jobs with `GET /api/jobs/{id}` and reports progress with
/// `PATCH /api/jobs/{id}`. Cheap to clone; clones share one connection pool.
#[derive(Clone, Debug)]
pub struct JobApiClient {
    http: Client,
    base_url: Url,
}

impl JobApiClient {
    pub fn new(base_url: Url) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn job_url(&self, job_id: &str) -> JobApiResult<Url> {
        if is_dot_segment(job_id) {
            return Err(JobApiError::InvalidJobId(job_id.to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| JobApiError::InvalidBaseUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "jobs", job_id]);
        Ok(url)
    }

    /// Fetch a job record. Anything other than `200 OK` is an error.
    pub async fn get_job(&self, job_id: &str) -> JobApiResult<CaptionJob> {
        let url = self.job_url(job_id)?;
        debug!("GET {}", url);

        let response = self.http.get(url).send().await?;
        if response.status() != StatusCode::OK {
            return Err(JobApiError::GetFailed(response.status()));
        }

        Ok(response.json::<CaptionJob>().await?)
    }

    /// Apply a sparse update to a job. Any non-2xx response is an error.
    pub async fn patch_job(&self, job_id: &str, patch: &PatchJobRequest) -> JobApiResult<()> {
        let url = self.job_url(job_id)?;
        debug!("PATCH {} {:?}", url, patch);

        let response = self.http.patch(url).json(patch).send().await?;
        if !response.status().is_success() {
            return Err(JobApiError::PatchFailed(response.status()));
        }

        Ok(())
    }
}
