use super::{PipelineStep, StepResult};
use crate::constants::STEP_DB_CONNECTION;
use crate::error::Result;
use crate::storage::TableStore;
use async_trait::async_trait;
use tracing::info;

/// Readiness probe against the store; persists nothing
pub struct ConnectivityStep;

#[async_trait]
impl PipelineStep for ConnectivityStep {
    async fn execute(&self, store: &dyn TableStore) -> Result<StepResult> {
        info!("🔌 Checking storage backend connectivity");
        store.ping().await?;
        Ok(StepResult::empty("Storage backend reachable".to_string()))
    }

    fn step_name(&self) -> &'static str {
        STEP_DB_CONNECTION
    }

    fn dependencies(&self) -> Vec<&'static str> {
        vec![]
    }
}
