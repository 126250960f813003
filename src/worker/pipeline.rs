use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::job_api::{JobApiClient, JobApiError, JobStage, PatchJobRequest};
use crate::storage::{ObjectStore, StorageError};

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Reasons a pipeline run stops early
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    JobLookup(#[from] JobApiError),

    #[error("missing inputKey on job (upload not completed)")]
    MissingInputKey,

    #[error(transparent)]
    Download(#[from] StorageError),
}

impl PipelineError {
    /// Stage the job is reported as failing in
    pub fn stage(&self) -> JobStage {
        match self {
            PipelineError::JobLookup(_) | PipelineError::MissingInputKey => JobStage::Dispatch,
            PipelineError::Download(_) => JobStage::ExtractAudio,
        }
    }
}

/// What the stages of a run actually do
pub enum StageBackend {
    /// Every stage is a fixed sleep
    Simulated { stage_delay: Duration },
    /// Download the job input; the remaining stages are not implemented yet
    Download {
        store: Arc<dyn ObjectStore>,
        download_dir: PathBuf,
        dispatch_delay: Duration,
    },
}

/// Runs the captioning stages for a job and reports progress to the job API.
///
/// Runs are fire-and-forget: nothing joins, cancels or times them out, and
/// two runs for the same job id may overlap. The only shared state is the
/// in-flight counter.
pub struct PipelineRunner {
    jobs: JobApiClient,
    backend: StageBackend,
    in_flight: AtomicUsize,
}

/// Keeps the in-flight counter accurate on every exit path
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl PipelineRunner {
    pub fn new(jobs: JobApiClient, backend: StageBackend) -> Self {
        Self {
            jobs,
            backend,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn simulated(jobs: JobApiClient, stage_delay: Duration) -> Self {
        Self::new(jobs, StageBackend::Simulated { stage_delay })
    }

    pub fn download(
        jobs: JobApiClient,
        store: Arc<dyn ObjectStore>,
        download_dir: impl Into<PathBuf>,
        dispatch_delay: Duration,
    ) -> Self {
        Self::new(
            jobs,
            StageBackend::Download {
                store,
                download_dir: download_dir.into(),
                dispatch_delay,
            },
        )
    }

    /// Number of runs that have started and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run the pipeline for `job_id` to completion or first failure.
    ///
    /// Failures end with a `FAILED` patch carrying the error text. Errors from
    /// the progress patches themselves are logged and otherwise ignored.
    pub async fn run(&self, job_id: &str) {
        let _guard = InFlightGuard::enter(&self.in_flight);
        info!("Pipeline started for job {}", job_id);

        let result = match &self.backend {
            StageBackend::Simulated { stage_delay } => self.run_simulated(job_id, *stage_delay).await,
            StageBackend::Download {
                store,
                download_dir,
                dispatch_delay,
            } => {
                self.run_download(job_id, store.as_ref(), download_dir, *dispatch_delay)
                    .await
            }
        };

        match result {
            Ok(()) => info!("Pipeline completed for job {}", job_id),
            Err(e) => {
                let stage = e.stage();
                error!("Job {} failed at {:?}: {}", job_id, stage, e);
                self.report(job_id, PatchJobRequest::failed(stage, e.to_string()))
                    .await;
            }
        }
    }

    async fn run_simulated(&self, job_id: &str, stage_delay: Duration) -> PipelineResult<()> {
        for stage in [
            JobStage::Dispatch,
            JobStage::ExtractAudio,
            JobStage::Transcribe,
            JobStage::Embed,
        ] {
            self.report(job_id, PatchJobRequest::progress(stage)).await;
            info!("Job {} simulating {:?} for {:?}", job_id, stage, stage_delay);
            sleep(stage_delay).await;
        }

        self.report(job_id, PatchJobRequest::completed(None)).await;
        Ok(())
    }

    async fn run_download(
        &self,
        job_id: &str,
        store: &dyn ObjectStore,
        download_dir: &Path,
        dispatch_delay: Duration,
    ) -> PipelineResult<()> {
        self.report(job_id, PatchJobRequest::progress(JobStage::Dispatch))
            .await;
        sleep(dispatch_delay).await;

        let job = self.jobs.get_job(job_id).await?;
        let input_key = job.input_key().ok_or(PipelineError::MissingInputKey)?;

        self.report(job_id, PatchJobRequest::progress(JobStage::ExtractAudio))
            .await;

        let file_name = format!("{}.mp4", file_stem(job_id));
        let dest = download_dir.join(&file_name);
        store.download_to(input_key, &dest).await?;
        info!("Job {} downloaded input to {}", job_id, dest.display());

        let output_key = local_output_key(download_dir, &file_name);
        self.report(job_id, PatchJobRequest::completed(Some(output_key)))
            .await;
        Ok(())
    }

    async fn report(&self, job_id: &str, patch: PatchJobRequest) {
        if let Err(e) = self.jobs.patch_job(job_id, &patch).await {
            warn!("Failed to patch job {} with {:?}: {}", job_id, patch, e);
        }
    }
}

/// Job ids are opaque; keep only characters that are safe in a file name.
/// Ids that needed rewriting get a hash of the raw id appended so that
/// `a/b` and `a_b` do not share a download path.
fn file_stem(job_id: &str) -> String {
    let stem: String = job_id
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if stem == job_id {
        return stem;
    }

    let mut hasher = DefaultHasher::new();
    job_id.hash(&mut hasher);
    format!("{}-{:016x}", stem, hasher.finish())
}

fn local_output_key(download_dir: &Path, file_name: &str) -> String {
    let dir = download_dir.to_string_lossy().replace('\\', "/");
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        format!("local/{}", file_name)
    } else {
        format!("local/{}/{}", dir, file_name)
    }
}
