use super::steps::{
    ConnectivityStep, DedupeStep, ExtractStep, ImputeStep, PipelineStep, StepResult, TransformStep,
};
use crate::config::Config;
use crate::db::SqliteStore;
use crate::error::{EtlError, Result};
use crate::sources::{SourceFetcher, SourceSpec};
use crate::storage::TableStore;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Outcome of one step inside a run
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub step: String,
    pub duration_secs: f64,
    #[serde(flatten)]
    pub result: StepResult,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    fn new(workflow: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            workflow: workflow.to_string(),
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.step == name)
    }

    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

/// Ordered list of steps, each run only after its predecessor succeeded
pub struct Pipeline {
    name: String,
    steps: Vec<Box<dyn PipelineStep>>,
}

impl Pipeline {
    /// Build a pipeline from explicit steps. Every step must depend only on the step before it.
    pub fn new(name: impl Into<String>, steps: Vec<Box<dyn PipelineStep>>) -> Result<Self> {
        let mut previous: Option<&'static str> = None;
        for step in &steps {
            let deps = step.dependencies();
            let expected: Vec<&'static str> = previous.into_iter().collect();
            if deps != expected {
                return Err(EtlError::Config(format!(
                    "step '{}' depends on {:?} but follows {:?}",
                    step.step_name(),
                    deps,
                    previous
                )));
            }
            previous = Some(step.step_name());
        }
        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    /// The five-step cleaning workflow described by `config`
    pub fn from_config(config: &Config, fetcher: Arc<dyn SourceFetcher>) -> Result<Self> {
        let steps: Vec<Box<dyn PipelineStep>> = vec![
            Box::new(ConnectivityStep),
            Box::new(ExtractStep::new(
                fetcher,
                SourceSpec::title_basics(config.sources.basics_url.clone()),
                SourceSpec::title_ratings(config.sources.ratings_url.clone()),
            )),
            Box::new(ImputeStep),
            Box::new(TransformStep),
            Box::new(DedupeStep::new(config.output.path.clone())),
        ];
        Self::new(config.workflow.name.clone(), steps)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.step_name()).collect()
    }

    /// Run every step in order against `store`. The first failing step aborts the run.
    pub async fn run(&self, store: &dyn TableStore) -> Result<RunReport> {
        let mut report = RunReport::new(&self.name);
        let span = info_span!("pipeline_run", workflow = %self.name, run_id = %report.run_id);

        async {
            info!("🚀 Starting pipeline '{}'", self.name);
            counter!("imdb_etl_runs_total").increment(1);

            for (index, step) in self.steps.iter().enumerate() {
                info!("🔄 Executing step {}/{}: {}", index + 1, self.steps.len(), step.step_name());
                match Self::execute_step(step.as_ref(), store).await {
                    Ok(step_report) => report.steps.push(step_report),
                    Err(e) => {
                        error!("❌ Step '{}' failed, aborting run: {}", step.step_name(), e);
                        counter!("imdb_etl_run_failures_total", "step" => step.step_name()).increment(1);
                        return Err(e);
                    }
                }
            }

            report.completed_at = Some(Utc::now());
            let secs = report
                .duration()
                .map(|d| d.num_milliseconds() as f64 / 1000.0)
                .unwrap_or_default();
            info!("🎉 Pipeline '{}' completed in {:.2}s", self.name, secs);
            Ok(())
        }
        .instrument(span)
        .await?;

        Ok(report)
    }

    /// Run a single named step, reading whatever upstream table is already in `store`
    pub async fn run_step(&self, name: &str, store: &dyn TableStore) -> Result<StepReport> {
        let step = self
            .steps
            .iter()
            .find(|s| s.step_name() == name)
            .ok_or_else(|| {
                EtlError::Config(format!("unknown step '{}', expected one of {:?}", name, self.step_names()))
            })?;
        info!("🔄 Running single step '{}'", name);
        Self::execute_step(step.as_ref(), store).await
    }

    async fn execute_step(step: &dyn PipelineStep, store: &dyn TableStore) -> Result<StepReport> {
        let name = step.step_name();
        counter!("imdb_etl_stage_runs_total", "step" => name).increment(1);
        let started = std::time::Instant::now();

        let result = step.execute(store).await?;

        let duration_secs = started.elapsed().as_secs_f64();
        histogram!("imdb_etl_stage_duration_seconds", "step" => name).record(duration_secs);
        histogram!("imdb_etl_stage_rows", "step" => name).record(result.rows_out as f64);
        info!("✅ Step '{}' completed in {:.2}s: {}", name, duration_secs, result.message);

        Ok(StepReport {
            step: name.to_string(),
            duration_secs,
            result,
        })
    }
}

/// Open the configured store for the length of one run and execute the full pipeline.
/// The connection is released when the run ends, whatever the outcome.
pub async fn run_once(config: &Config, fetcher: Arc<dyn SourceFetcher>) -> Result<RunReport> {
    let pipeline = Pipeline::from_config(config, fetcher)?;
    let store = SqliteStore::connect(&config.storage.url)?;
    pipeline.run(&store).await
}
