use chrono::{DateTime, Utc};
use opcua::sync::Mutex;
use tokio::sync::{mpsc, watch};

use super::job::{ChangeReceiver, ChangeSender, Job, JobSnapshot};
use super::store::{InMemoryJobStore, JobStore};
use super::types::{JobOrder, JobOrderAndState, JobResponse, JobState, LocalizedText, ReturnCode};

/// Currently stored job orders, shared with whoever exposes the job list.
pub type JobList = Vec<JobOrderAndState>;

/// Operation surface of the ISA-95 job order control.
///
/// Every method returns a [`ReturnCode`]; a rejected call leaves the store and
/// every job exactly as they were. Accepted mutations refresh the published job
/// list before returning and report the job on the change channel.
///
/// Mutations are committed one at a time: the store change, its change report
/// and the job list it publishes happen under `commit`, so the published list
/// never lags behind a later mutation.
pub struct JobOrderController<S: JobStore = InMemoryJobStore> {
    store: S,
    changes: ChangeSender,
    job_list: watch::Sender<JobList>,
    commit: Mutex<()>,
}

impl JobOrderController<InMemoryJobStore> {
    /// Controller over an empty in-memory store, plus the receiving end of its change channel.
    pub fn in_memory() -> (Self, ChangeReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(InMemoryJobStore::new(), tx), rx)
    }
}

impl<S: JobStore> JobOrderController<S> {
    pub fn new(store: S, changes: ChangeSender) -> Self {
        let (job_list, _) = watch::channel(Vec::new());
        let controller = Self {
            store,
            changes,
            job_list,
            commit: Mutex::new(()),
        };
        controller.refresh_job_list();
        controller
    }

    /// Receiver that always holds the latest published job list.
    pub fn subscribe_job_list(&self) -> watch::Receiver<JobList> {
        self.job_list.subscribe()
    }

    pub fn store(&self, job_order: JobOrder, comment: &[LocalizedText]) -> ReturnCode {
        let id = job_order.job_order_id.clone();
        log_comment("Store", &id, comment);

        let _commit = self.commit.lock();
        let job = Job::new(job_order, self.changes.clone());
        match self.store.insert_with(job, |job| job.changed()) {
            Ok(()) => {
                tracing::info!("Stored job order {}", id);
                self.refresh_job_list();
                ReturnCode::NoError
            }
            Err(_) => {
                tracing::debug!("Job order {} already exists", id);
                ReturnCode::UnableToAcceptJobOrder
            }
        }
    }

    pub fn store_and_start(&self, job_order: JobOrder, comment: &[LocalizedText]) -> ReturnCode {
        let id = job_order.job_order_id.clone();
        match self.store(job_order, comment) {
            ReturnCode::NoError => self.start(&id, comment),
            code => code,
        }
    }

    pub fn update(&self, job_order: JobOrder, comment: &[LocalizedText]) -> ReturnCode {
        let id = job_order.job_order_id.clone();
        log_comment("Update", &id, comment);
        self.apply(&id, "Update", move |job| job.update(job_order))
    }

    pub fn start(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Start", id, comment);
        self.apply(id, "Start", Job::start)
    }

    pub fn revoke_start(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("RevokeStart", id, comment);
        self.apply(id, "RevokeStart", Job::revoke_start)
    }

    pub fn pause(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Pause", id, comment);
        self.apply(id, "Pause", Job::pause)
    }

    pub fn resume(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Resume", id, comment);
        self.apply(id, "Resume", Job::resume)
    }

    pub fn stop(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Stop", id, comment);
        self.apply(id, "Stop", Job::stop)
    }

    pub fn abort(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Abort", id, comment);
        self.apply(id, "Abort", Job::abort)
    }

    /// Resets the job and removes it from the store.
    pub fn cancel(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Cancel", id, comment);
        let _commit = self.commit.lock();
        if self.store.modify(id, Job::cancel).is_none() {
            return ReturnCode::UnknownJobOrderId;
        }
        self.store.remove(id);
        tracing::info!("Cancelled job order {}", id);
        self.refresh_job_list();
        ReturnCode::NoError
    }

    /// Removes the job regardless of its state.
    pub fn clear(&self, id: &str, comment: &[LocalizedText]) -> ReturnCode {
        log_comment("Clear", id, comment);
        let _commit = self.commit.lock();
        match self.store.remove(id) {
            Some(job) => {
                tracing::info!("Cleared job order {} in state {}", id, job.state());
                self.refresh_job_list();
                job.changed();
                ReturnCode::NoError
            }
            None => ReturnCode::UnknownJobOrderId,
        }
    }

    /// Stops the job only if it is still the run that started at `started`.
    ///
    /// Returns `None` when the job is gone or was stored again since.
    pub fn stop_started_at(
        &self,
        id: &str,
        started: Option<DateTime<Utc>>,
    ) -> Option<ReturnCode> {
        let _commit = self.commit.lock();
        let accepted = self
            .store
            .modify(id, |job| (job.start_time() == started).then(|| job.stop()))
            .flatten()?;
        if accepted {
            tracing::info!("Stop accepted for job order {}", id);
            self.refresh_job_list();
        }
        Some(ReturnCode::from_transition(accepted))
    }

    pub fn list_job_orders(&self) -> JobList {
        self.store.list().iter().map(JobSnapshot::order_and_state).collect()
    }

    pub fn request_job_response_by_job_order_id(
        &self,
        id: &str,
    ) -> (Option<JobResponse>, ReturnCode) {
        match self.store.snapshot(id) {
            Some(snapshot) => (Some(snapshot.response()), ReturnCode::NoError),
            None => (None, ReturnCode::UnknownJobOrderId),
        }
    }

    /// Responses for every job whose state has the given number.
    pub fn request_job_response_by_job_order_state(
        &self,
        state_number: u32,
    ) -> (Vec<JobResponse>, ReturnCode) {
        let Some(state) = JobState::from_number(state_number) else {
            return (Vec::new(), ReturnCode::InvalidJobOrderStatus);
        };
        let responses: Vec<JobResponse> = self
            .store
            .list()
            .iter()
            .filter(|snapshot| snapshot.state == state)
            .map(JobSnapshot::response)
            .collect();
        (responses, ReturnCode::NoError)
    }

    pub fn job(&self, id: &str) -> Option<JobSnapshot> {
        self.store.snapshot(id)
    }

    pub fn jobs(&self) -> Vec<JobSnapshot> {
        self.store.list()
    }

    fn apply(&self, id: &str, operation: &str, transition: impl FnOnce(&mut Job) -> bool) -> ReturnCode {
        let _commit = self.commit.lock();
        let Some(accepted) = self.store.modify(id, transition) else {
            tracing::debug!("{} rejected: unknown job order {}", operation, id);
            return ReturnCode::UnknownJobOrderId;
        };
        if accepted {
            tracing::info!("{} accepted for job order {}", operation, id);
            self.refresh_job_list();
        } else {
            tracing::debug!("{} rejected for job order {}: invalid in current state", operation, id);
        }
        ReturnCode::from_transition(accepted)
    }

    /// Must run while `commit` is held.
    fn refresh_job_list(&self) {
        self.job_list.send_replace(self.list_job_orders());
    }
}

fn log_comment(operation: &str, id: &str, comment: &[LocalizedText]) {
    if !comment.is_empty() {
        let texts: Vec<&str> = comment.iter().map(|c| c.text.as_str()).collect();
        tracing::debug!("{} {} comment: {}", operation, id, texts.join(" | "));
    }
}
