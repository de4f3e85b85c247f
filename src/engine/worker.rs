/// Worker pool pulling reset jobs from the durable queue
///
/// Workers run concurrently across jobs. Two workers touching the same
/// streak key is still safe because every write is a compare-and-set on the
/// streak version; the loser gets a transient error and is retried.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::watch;

use crate::engine::{JobHandler, ProcessError, ProcessOutcome};
use crate::queue::{FailureDisposition, JobId, JobQueue};
use crate::EngineError;

/// What happened to a single delivered job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobReport {
    Completed { id: JobId, outcome: ProcessOutcome },
    Failed { id: JobId, disposition: FailureDisposition },
    Parked { id: JobId },
}

/// Totals for a drain run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub broken: usize,
    pub unchanged: usize,
    pub superseded: usize,
    pub retried: usize,
    pub parked: usize,
}

impl DrainSummary {
    fn record(&mut self, report: &JobReport) {
        match report {
            JobReport::Completed { outcome: ProcessOutcome::Broken, .. } => self.broken += 1,
            JobReport::Completed { outcome: ProcessOutcome::Unchanged, .. } => self.unchanged += 1,
            JobReport::Completed { outcome: ProcessOutcome::Superseded, .. } => self.superseded += 1,
            JobReport::Failed { disposition: FailureDisposition::Retrying { .. }, .. } => self.retried += 1,
            JobReport::Failed { .. } | JobReport::Parked { .. } => self.parked += 1,
        }
    }
}

#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    workers: usize,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            workers: workers.max(1),
            poll_interval,
        }
    }

    /// Claim and handle one runnable job, `None` if nothing is runnable at `now`
    pub async fn process_next(&self, now: DateTime<Utc>) -> Result<Option<JobReport>, EngineError> {
        let Some(queued) = self.queue.claim(now)? else {
            return Ok(None);
        };
        let id = queued.id;

        let report = match self.handler.handle(&queued.job, now).await {
            Ok(outcome) => {
                self.queue.complete(id)?;
                JobReport::Completed { id, outcome }
            }
            Err(ProcessError::Terminal(reason)) => {
                self.queue.park(id, &reason)?;
                JobReport::Parked { id }
            }
            Err(ProcessError::Transient(reason)) => {
                let disposition = self.queue.fail(id, &reason, now)?;
                JobReport::Failed { id, disposition }
            }
        };
        Ok(Some(report))
    }

    /// Process jobs until nothing is pending, waiting out backoff delays
    ///
    /// Jobs held `active` by another process are not waited for.
    pub async fn drain(&self) -> Result<DrainSummary, EngineError> {
        let mut summary = DrainSummary::default();
        loop {
            match self.process_next(Utc::now()).await? {
                Some(report) => summary.record(&report),
                None => {
                    if self.queue.stats()?.pending == 0 {
                        return Ok(summary);
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Run all workers until `shutdown` flips to true
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        tracing::info!(workers = self.workers, "Starting reset job workers");
        let handles: Vec<_> = (0..self.workers)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.worker_loop(worker_id, shutdown).await })
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!("Reset job worker panicked: {}", e);
            }
        }
        tracing::info!("Reset job workers stopped");
    }

    async fn worker_loop(&self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.process_next(Utc::now()).await {
                Ok(Some(report)) => {
                    tracing::debug!(worker_id, ?report, "Handled reset job");
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(worker_id, "Reset job worker error: {}", e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}
