use crate::error::Result;
use crate::storage::TableStore;
use async_trait::async_trait;
use serde::Serialize;

/// Common trait for all pipeline steps
#[async_trait]
pub trait PipelineStep: Send + Sync {
    /// Execute this step against the shared table store
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult>;

    /// Get the name of this pipeline step
    fn step_name(&self) -> &'static str;

    /// Get the step that must complete before this one runs
    fn dependencies(&self) -> Vec<&'static str>;
}

/// Result of executing a pipeline step
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub rows_in: usize,
    pub rows_out: usize,
    pub message: String,
}

impl StepResult {
    pub fn new(rows_in: usize, rows_out: usize, message: String) -> Self {
        Self {
            rows_in,
            rows_out,
            message,
        }
    }

    pub fn empty(message: String) -> Self {
        Self::new(0, 0, message)
    }
}

pub mod connectivity;
pub mod dedupe;
pub mod extract;
pub mod impute;
pub mod transform;

pub use connectivity::ConnectivityStep;
pub use dedupe::DedupeStep;
pub use extract::ExtractStep;
pub use impute::ImputeStep;
pub use transform::TransformStep;
