//! Job scheduler infrastructure for background tasks.
//!
//! Each registered job ticks on its own cadence until the shutdown signal
//! flips, at which point all job loops exit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How often a job ticks.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)] // Minutes is available for future jobs
pub enum JobFrequency {
    Seconds(u64),
    Minutes(u64),
}

impl JobFrequency {
    /// Interval between executions.
    pub fn duration(&self) -> Duration {
        match self {
            JobFrequency::Seconds(secs) => Duration::from_secs(*secs),
            JobFrequency::Minutes(mins) => Duration::from_secs(*mins * 60),
        }
    }
}

/// Trait for implementing background jobs.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// Stable name, used as a log field.
    fn name(&self) -> &'static str;

    /// How often the job runs.
    fn frequency(&self) -> JobFrequency;

    /// Run one iteration. An Err is logged and the schedule continues.
    async fn execute(&self) -> Result<(), String>;
}

/// Background job scheduler.
///
/// Jobs are registered up front and started together; `shutdown` flips a
/// watch channel every job loop is selecting on.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Add a job. Call before `start`.
    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    /// Spawn one loop per registered job.
    pub fn start(&mut self) {
        info!(jobs = self.jobs.len(), "Starting job scheduler");

        for job in &self.jobs {
            let handle = spawn_job_loop(Arc::clone(job), self.shutdown_rx.clone());
            self.handles.push(handle);
        }
    }

    /// Signal all job loops to stop. Returns immediately.
    pub fn shutdown(&self) {
        info!("Stopping job scheduler");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all job loops to finish, up to `timeout`.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!(?timeout, "Draining job loops");

        let drain = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Job task did not join cleanly");
                }
            }
        };

        match tokio::time::timeout(timeout, drain).await {
            Ok(()) => info!("All job loops exited"),
            Err(_) => warn!(?timeout, "Gave up waiting for job loops"),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_job_loop(job: Arc<dyn Job>, mut shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = job.name();
        let frequency = job.frequency();
        let mut interval = tokio::time::interval(frequency.duration());

        // The first tick fires immediately; consume it so the job waits a
        // full period before its first run.
        interval.tick().await;

        info!(job = name, frequency = ?frequency, "Job scheduled");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let start = std::time::Instant::now();

                    match job.execute().await {
                        Ok(()) => {
                            info!(
                                job = name,
                                elapsed_ms = start.elapsed().as_millis(),
                                "Job completed"
                            );
                        }
                        Err(e) => {
                            error!(
                                job = name,
                                elapsed_ms = start.elapsed().as_millis(),
                                error = %e,
                                "Job failed"
                            );
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(job = name, "Job shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestJob {
        run_count: Arc<AtomicUsize>,
        should_fail: bool,
    }

    #[async_trait::async_trait]
    impl Job for TestJob {
        fn name(&self) -> &'static str {
            "test_job"
        }

        fn frequency(&self) -> JobFrequency {
            JobFrequency::Seconds(1)
        }

        async fn execute(&self) -> Result<(), String> {
            self.run_count.fetch_add(1, Ordering::SeqCst);
            if self.should_fail {
                Err("Test failure".to_string())
            } else {
                Ok(())
            }
        }
    }

    fn counting_job(run_count: &Arc<AtomicUsize>, should_fail: bool) -> TestJob {
        TestJob {
            run_count: Arc::clone(run_count),
            should_fail,
        }
    }

    #[test]
    fn test_job_frequency_duration() {
        assert_eq!(
            JobFrequency::Seconds(30).duration(),
            Duration::from_secs(30)
        );
        assert_eq!(JobFrequency::Minutes(5).duration(), Duration::from_secs(300));
    }

    #[test]
    fn test_register_collects_jobs() {
        let mut scheduler = JobScheduler::new();
        assert!(scheduler.jobs.is_empty());

        scheduler.register(counting_job(&Arc::new(AtomicUsize::new(0)), false));
        assert_eq!(scheduler.jobs.len(), 1);
        assert!(scheduler.handles.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_on_its_cadence() {
        let mut scheduler = JobScheduler::new();
        let run_count = Arc::new(AtomicUsize::new(0));
        scheduler.register(counting_job(&run_count, false));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(3)).await;

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(1)).await;

        // First tick is skipped, so three virtual seconds give at least two
        // executions.
        assert!(run_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_job_keeps_its_schedule() {
        let mut scheduler = JobScheduler::new();
        let run_count = Arc::new(AtomicUsize::new(0));
        scheduler.register(counting_job(&run_count, true));
        scheduler.start();

        tokio::time::sleep(Duration::from_secs(3)).await;

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(1)).await;

        // Failures are logged, never fatal to the loop.
        assert!(run_count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_first_tick_runs_nothing() {
        let mut scheduler = JobScheduler::new();
        let run_count = Arc::new(AtomicUsize::new(0));
        scheduler.register(counting_job(&run_count, false));
        scheduler.start();

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(1)).await;

        assert_eq!(run_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_scheduler_default() {
        let scheduler = JobScheduler::default();
        assert!(scheduler.jobs.is_empty());
    }
}
