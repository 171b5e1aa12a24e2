//! Business logic services.

mod pipeline;

pub use pipeline::{PipelineConfig, PipelineService};
