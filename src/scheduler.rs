use crate::config::WorkflowConfig;
use crate::error::Result;
use crate::pipeline::RunReport;
use chrono::{NaiveDate, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{error, info, warn};

/// Summary of a scheduling session
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScheduleSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs a pipeline on a fixed interval, never more than one run at a time.
///
/// Each run is awaited before the next tick is taken, and ticks missed while a run
/// was active are delayed rather than stacked, so overlapping runs cannot happen.
/// A failed run is logged; the next tick retries the whole pipeline.
pub struct Scheduler {
    name: String,
    start_date: NaiveDate,
    every: Duration,
}

impl Scheduler {
    pub fn new(name: impl Into<String>, start_date: NaiveDate, every: Duration) -> Self {
        Self {
            name: name.into(),
            start_date,
            every,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(config.name.clone(), config.start_date, config.interval())
    }

    /// Time left until the start date (midnight UTC), zero once it has passed
    pub fn wait_before_start(&self) -> Duration {
        let start = self.start_date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        match start {
            Some(start) => (start - Utc::now()).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    /// Drive `run` on every tick. Stops after `max_runs` runs when given, otherwise runs forever.
    pub async fn run<F, Fut>(&self, mut run: F, max_runs: Option<usize>) -> ScheduleSummary
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<RunReport>>,
    {
        let wait = self.wait_before_start();
        if !wait.is_zero() {
            info!("⏳ Workflow '{}' starts on {}, waiting {:?}", self.name, self.start_date, wait);
            sleep(wait).await;
        }

        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut summary = ScheduleSummary::default();

        loop {
            if max_runs.is_some_and(|max| summary.succeeded + summary.failed >= max) {
                break;
            }
            ticker.tick().await;

            match run().await {
                Ok(report) => {
                    summary.succeeded += 1;
                    info!("Run {} of '{}' succeeded", report.run_id, self.name);
                }
                Err(e) => {
                    summary.failed += 1;
                    error!("Run of '{}' failed: {}", self.name, e);
                    warn!("Downstream tables stay stale until the next successful run in {:?}", self.every);
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EtlError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_past_start_date_does_not_wait() {
        let scheduler = Scheduler::new("imdb_etl", NaiveDate::from_ymd_opt(2023, 7, 13).unwrap(), Duration::from_secs(600));
        assert_eq!(scheduler.wait_before_start(), Duration::ZERO);
    }

    #[test]
    fn test_future_start_date_waits() {
        let tomorrow = Utc::now().date_naive().succ_opt().unwrap();
        let scheduler = Scheduler::new("imdb_etl", tomorrow, Duration::from_secs(600));
        assert!(scheduler.wait_before_start() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_runs_are_sequential_and_failures_retry() {
        let scheduler = Scheduler::new("imdb_etl", NaiveDate::from_ymd_opt(2023, 7, 13).unwrap(), Duration::from_millis(5));
        let active = Arc::new(AtomicUsize::new(0));
        let calls = Arc::new(AtomicUsize::new(0));

        let summary = scheduler
            .run(
                || {
                    let active = active.clone();
                    let calls = calls.clone();
                    async move {
                        assert_eq!(active.fetch_add(1, Ordering::SeqCst), 0);
                        tokio::time::sleep(Duration::from_millis(15)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        let outcome: Result<RunReport> = if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(EtlError::Connection { message: "down".to_string() })
                        } else {
                            Err(EtlError::Config("still failing".to_string()))
                        };
                        outcome
                    }
                },
                Some(3),
            )
            .await;

        assert_eq!(summary, ScheduleSummary { succeeded: 0, failed: 3 });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
