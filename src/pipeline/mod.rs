// Linear cleaning pipeline: connectivity check, extract, impute, transform, dedupe

pub mod orchestrator;
pub mod steps;

pub use orchestrator::{Pipeline, RunReport, StepReport};
pub use steps::{PipelineStep, StepResult};
