//! Batch Orchestrator (C10): runs multiple job runners in parallel under
//! its own bounded concurrency, on top of each job's own device-level
//! fan-out (§4.10).

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use vcollector_model::{JobDefinition, JobResult};

use crate::pool::ProgressCallback;
use crate::runner::JobRunner;

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub jobs_total: usize,
    pub jobs_succeeded: usize,
    pub jobs_failed: usize,
    pub devices_total: usize,
    pub devices_success: usize,
    pub devices_failed: usize,
    pub devices_skipped: usize,
    pub captures_written: usize,
    pub elapsed: Duration,
}

pub type JobProgressCallback = Arc<dyn Fn(usize, usize, &JobResult) + Send + Sync>;

pub struct BatchOrchestrator {
    runner: Arc<JobRunner>,
    max_concurrent_jobs: usize,
}

impl BatchOrchestrator {
    pub fn new(runner: Arc<JobRunner>, max_concurrent_jobs: usize) -> Self {
        BatchOrchestrator {
            runner,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    /// Run every job, preserving input order in the returned vector. Each
    /// job's own device-level progress callback is independent of the
    /// batch-level job-completion callback.
    pub async fn run(
        &self,
        jobs: Vec<JobDefinition>,
        device_progress: Option<ProgressCallback>,
        job_progress: Option<JobProgressCallback>,
    ) -> (Vec<JobResult>, BatchSummary) {
        let total = jobs.len();
        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_jobs));
        let mut slots: Vec<Option<JobResult>> = (0..total).map(|_| None).collect();
        let mut tasks = FuturesUnordered::new();

        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();
            let device_progress = device_progress.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                let result = runner.run(&job, device_progress).await;
                (index, result)
            }));
        }

        let mut completed = 0usize;
        let mut jobs_succeeded = 0usize;
        let mut devices_total = 0usize;
        let mut devices_success = 0usize;
        let mut devices_failed = 0usize;
        let mut devices_skipped = 0usize;
        let mut captures_written = 0usize;

        while let Some(joined) = tasks.next().await {
            let Ok((index, result)) = joined else {
                continue;
            };
            completed += 1;

            if result.job_error.is_none() && result.failed_count == 0 {
                jobs_succeeded += 1;
            }
            devices_total += result.total_devices();
            devices_success += result.success_count;
            devices_failed += result.failed_count;
            devices_skipped += result.validation_skipped_count + result.skipped_before_dispatch;
            captures_written += result.saved_files.len();

            if let Some(job_progress) = &job_progress {
                job_progress(completed, total, &result);
            }
            slots[index] = Some(result);
        }

        let results: Vec<JobResult> = slots
            .into_iter()
            .map(|slot| slot.expect("every dispatched slot resolves before the stream drains"))
            .collect();

        let summary = BatchSummary {
            jobs_total: total,
            jobs_succeeded,
            jobs_failed: total - jobs_succeeded,
            devices_total,
            devices_success,
            devices_failed,
            devices_skipped,
            captures_written,
            elapsed: started.elapsed(),
        };

        (results, summary)
    }
}
