pub mod client;
pub mod models;

// Re-export commonly used types
pub use client::{is_dot_segment, JobApiClient, JobApiError};
pub use models::{JobStage, PatchJobRequest};
