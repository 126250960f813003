pub mod pipeline;

pub use pipeline::PipelineRunner;
