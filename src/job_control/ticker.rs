use chrono::{DateTime, Utc};
use opcua::sync::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;

use super::controller::JobOrderController;
use super::job::JobSnapshot;
use super::store::{InMemoryJobStore, JobStore};
use super::types::JobState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickerConfig {
    /// Time between two passes over the job list
    pub interval: Duration,
    /// How long a job runs before it is stopped automatically
    pub auto_stop_after: Duration,
}

impl Default for TickerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            auto_stop_after: Duration::from_secs(10),
        }
    }
}

struct PendingStop {
    started: Option<DateTime<Utc>>,
    handle: AbortHandle,
}

/// Demo auto-progression of job orders.
///
/// Each tick promotes jobs in `AllowedToStart` to `Running` and arms one
/// delayed stop per running job. All transitions go through the controller.
pub struct JobTicker<S: JobStore = InMemoryJobStore> {
    controller: Arc<JobOrderController<S>>,
    config: TickerConfig,
    pending_stops: Arc<Mutex<HashMap<String, PendingStop>>>,
}

impl<S: JobStore + 'static> JobTicker<S> {
    pub fn new(controller: Arc<JobOrderController<S>>, config: TickerConfig) -> Self {
        Self {
            controller,
            config,
            pending_stops: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn run(&self) {
        tracing::info!(
            "Job ticker started (interval {:?}, auto-stop after {:?})",
            self.config.interval,
            self.config.auto_stop_after
        );

        let mut interval = tokio::time::interval(self.config.interval);
        loop {
            interval.tick().await;
            self.tick();
        }
    }

    /// One pass over a snapshot of the job list. Must be called inside a tokio runtime.
    pub fn tick(&self) {
        let jobs = self.controller.jobs();
        self.prune(&jobs);

        for job in &jobs {
            match job.state {
                JobState::AllowedToStart => {
                    let code = self.controller.start(job.job_order_id(), &[]);
                    tracing::debug!("Auto-start of job order {}: {:?}", job.job_order_id(), code);
                }
                JobState::Running => self.schedule_stop(job),
                _ => {}
            }
        }
    }

    /// Disarms the delayed stop of a job. Returns whether one was pending.
    pub fn cancel_pending_stop(&self, id: &str) -> bool {
        match self.pending_stops.lock().remove(id) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn pending_stops(&self) -> usize {
        self.pending_stops.lock().len()
    }

    fn schedule_stop(&self, job: &JobSnapshot) {
        let mut pending_stops = self.pending_stops.lock();
        if let Some(pending) = pending_stops.get(job.job_order_id()) {
            if pending.started == job.start_time {
                return;
            }
            pending.handle.abort();
        }

        let id = job.job_order_id().to_string();
        let started = job.start_time;
        let dwell = self.config.auto_stop_after;
        let controller = Arc::clone(&self.controller);
        let pending = Arc::clone(&self.pending_stops);

        let task = tokio::spawn({
            let id = id.clone();
            async move {
                tokio::time::sleep(dwell).await;
                pending.lock().remove(&id);

                // The ID may have been cleared and reused since the stop was armed
                match controller.stop_started_at(&id, started) {
                    Some(code) => tracing::debug!("Auto-stop of job order {}: {:?}", id, code),
                    None => tracing::debug!("Auto-stop of job order {} skipped", id),
                }
            }
        });

        pending_stops.insert(
            id,
            PendingStop {
                started,
                handle: task.abort_handle(),
            },
        );
    }

    /// Drops timers whose job is gone, finished, or was replaced.
    fn prune(&self, jobs: &[JobSnapshot]) {
        let mut pending_stops = self.pending_stops.lock();
        pending_stops.retain(|id, pending| {
            let live = jobs.iter().any(|job| {
                job.job_order_id() == id
                    && !job.state.is_terminal()
                    && job.start_time == pending.started
            });
            if !live {
                pending.handle.abort();
            }
            live
        });
    }
}

impl<S: JobStore> Drop for JobTicker<S> {
    fn drop(&mut self) {
        for (_, pending) in self.pending_stops.lock().drain() {
            pending.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_control::job::ChangeReceiver;
    use crate::job_control::types::{JobOrder, ReturnCode};

    const DWELL: Duration = Duration::from_secs(10);

    fn ticker() -> (JobTicker, Arc<JobOrderController>, ChangeReceiver) {
        let (controller, rx) = JobOrderController::in_memory();
        let controller = Arc::new(controller);
        let config = TickerConfig {
            interval: Duration::from_secs(1),
            auto_stop_after: DWELL,
        };
        (JobTicker::new(controller.clone(), config), controller, rx)
    }

    fn state(controller: &JobOrderController, id: &str) -> Option<JobState> {
        controller.job(id).map(|job| job.state)
    }

    async fn pass(duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_promotes_allowed_jobs_only() {
        let (ticker, controller, _rx) = ticker();
        controller.store(JobOrder::new("waiting"), &[]);
        controller.store_and_start(JobOrder::new("allowed"), &[]);

        ticker.tick();

        assert_eq!(state(&controller, "waiting"), Some(JobState::NotAllowedToStart));
        assert_eq!(state(&controller, "allowed"), Some(JobState::Running));
        assert!(controller.job("allowed").unwrap().start_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_job_stops_after_dwell() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);

        ticker.tick();
        ticker.tick();
        assert_eq!(ticker.pending_stops(), 1);

        pass(DWELL - Duration::from_millis(1)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Running));

        pass(Duration::from_millis(2)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Ended));
        assert!(controller.job("J1").unwrap().end_time.is_some());
        assert_eq!(ticker.pending_stops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_stop_per_job() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);
        controller.store_and_start(JobOrder::new("J2"), &[]);

        for _ in 0..5 {
            ticker.tick();
        }
        assert_eq!(ticker.pending_stops(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_job_is_still_stopped() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);
        ticker.tick();
        ticker.tick();

        assert_eq!(controller.pause("J1", &[]), ReturnCode::NoError);
        ticker.tick();
        assert_eq!(ticker.pending_stops(), 1);

        pass(DWELL + Duration::from_millis(1)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Ended));
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_job_disarms_stop() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);
        ticker.tick();
        ticker.tick();

        controller.abort("J1", &[]);
        ticker.tick();
        assert_eq!(ticker.pending_stops(), 0);

        pass(DWELL + Duration::from_millis(1)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Aborted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_skips_replaced_job() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);
        ticker.tick();
        ticker.tick();

        controller.clear("J1", &[]);
        controller.store_and_start(JobOrder::new("J1"), &[]);
        controller.start("J1", &[]);

        pass(DWELL + Duration::from_millis(1)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_stop() {
        let (ticker, controller, _rx) = ticker();
        controller.store_and_start(JobOrder::new("J1"), &[]);
        ticker.tick();
        ticker.tick();

        assert!(ticker.cancel_pending_stop("J1"));
        assert!(!ticker.cancel_pending_stop("J1"));

        pass(DWELL + Duration::from_millis(1)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Running));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_drives_full_lifecycle() {
        let (ticker, controller, _rx) = ticker();
        let ticker = Arc::new(ticker);
        let handle = tokio::spawn({
            let ticker = ticker.clone();
            async move { ticker.run().await }
        });

        controller.store_and_start(JobOrder::new("J1"), &[]);
        pass(Duration::from_millis(1500)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Running));

        pass(DWELL + Duration::from_secs(2)).await;
        assert_eq!(state(&controller, "J1"), Some(JobState::Ended));

        handle.abort();
    }
}
