use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Job status as tracked by the job API
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Pipeline stage a job is currently in
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Upload,
    Dispatch,
    ExtractAudio,
    Transcribe,
    Embed,
    Done,
}

/// Captioning job record owned by the job API
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CaptionJob {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: JobStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl CaptionJob {
    /// Input object key, if the upload has completed
    pub fn input_key(&self) -> Option<&str> {
        self.input_key.as_deref().filter(|key| !key.is_empty())
    }
}

/// Sparse update sent as the body of a PATCH call
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatchJobRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<JobStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PatchJobRequest {
    pub fn progress(stage: JobStage) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            stage: Some(stage),
            ..Default::default()
        }
    }

    pub fn failed(stage: JobStage, error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            stage: Some(stage),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn completed(output_key: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            stage: Some(JobStage::Done),
            output_key,
            ..Default::default()
        }
    }
}
