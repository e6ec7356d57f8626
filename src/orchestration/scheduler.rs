//! Bounded, priority-ordered work scheduler.
//!
//! The scheduler task owns the queue. Work items arrive over an mpsc channel;
//! each tick absorbs them and starts as many of the highest-priority items as
//! there are free permits. Started items run in parallel in a `JoinSet`.

use super::executor::{WorkExecutor, WorkOutcome};
use super::queue::WorkQueue;
use super::WorkItem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub max_concurrent: usize,
    /// How long shutdown waits for in-flight items before aborting them.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            max_concurrent: 2,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerStats {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// In-flight items aborted at shutdown or panicked.
    pub aborted: u64,
    /// Queued items dropped at shutdown without starting.
    pub dropped: u64,
}

pub struct Scheduler {
    config: SchedulerConfig,
    executor: Arc<dyn WorkExecutor>,
    intake: mpsc::UnboundedReceiver<WorkItem>,
    queue: WorkQueue,
    permits: Arc<Semaphore>,
    running: JoinSet<WorkOutcome>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        executor: Arc<dyn WorkExecutor>,
        intake: mpsc::UnboundedReceiver<WorkItem>,
    ) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            executor,
            intake,
            queue: WorkQueue::new(),
            running: JoinSet::new(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.running.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Absorbs new items and starts what the free permits allow. Returns the
    /// number of items started.
    pub fn tick(&mut self) -> usize {
        self.absorb();
        while let Some(result) = self.running.try_join_next() {
            record(&mut self.stats, result);
        }

        let mut started = 0;
        while !self.queue.is_empty() {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(item) = self.queue.pop() else {
                break;
            };
            tracing::debug!(
                work_item_id = %item.id,
                priority = item.priority,
                "Starting work item"
            );
            let executor = self.executor.clone();
            self.running.spawn(async move {
                let _permit = permit;
                executor.execute(item).await
            });
            started += 1;
        }

        self.stats.started += started as u64;
        if started > 0 || !self.queue.is_empty() {
            tracing::debug!(
                started,
                queued = self.queue.len(),
                in_flight = self.running.len(),
                "Scheduler tick"
            );
        }
        started
    }

    /// Ticks until shutdown is signalled, then drains.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SchedulerStats {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                }
                Some(result) = self.running.join_next(), if !self.running.is_empty() => {
                    record(&mut self.stats, result);
                }
                _ = shutdown.changed() => break,
            }
        }

        self.shutdown().await
    }

    async fn shutdown(mut self) -> SchedulerStats {
        self.absorb();
        let dropped = self.queue.drain();
        if !dropped.is_empty() {
            tracing::warn!(
                count = dropped.len(),
                "Dropping queued work items that never started"
            );
            self.stats.dropped += dropped.len() as u64;
        }

        if !self.running.is_empty() {
            tracing::info!(
                in_flight = self.running.len(),
                "Waiting up to {:?} for in-flight work items",
                self.config.shutdown_timeout
            );
            let running = &mut self.running;
            let stats = &mut self.stats;
            let drained = tokio::time::timeout(self.config.shutdown_timeout, async {
                while let Some(result) = running.join_next().await {
                    record(stats, result);
                }
            })
            .await;

            if drained.is_err() {
                tracing::warn!(
                    in_flight = self.running.len(),
                    "Shutdown timeout elapsed, aborting in-flight work items"
                );
                self.running.abort_all();
                while let Some(result) = self.running.join_next().await {
                    record(&mut self.stats, result);
                }
            }
        }

        tracing::info!(stats = ?self.stats, "Scheduler stopped");
        self.stats
    }

    fn absorb(&mut self) {
        while let Ok(item) = self.intake.try_recv() {
            self.queue.push(item);
        }
    }
}

fn record(stats: &mut SchedulerStats, result: Result<WorkOutcome, JoinError>) {
    match result {
        Ok(outcome) if outcome.success => stats.succeeded += 1,
        Ok(_) => stats.failed += 1,
        Err(e) => {
            if e.is_panic() {
                tracing::error!(error = %e, "Work item task panicked");
            }
            stats.aborted += 1;
        }
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
