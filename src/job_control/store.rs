use opcua::sync::RwLock;
use std::collections::HashMap;

use super::job::{Job, JobSnapshot};

/// Keyed storage of the active jobs.
///
/// Implementations must serialize access per job: `modify` runs its closure
/// while no other caller can observe or change that job.
pub trait JobStore: Send + Sync {
    /// Adds a job and runs `f` on it before any other caller can see it.
    /// Returns the job back if its ID is already taken.
    fn insert_with<R>(&self, job: Job, f: impl FnOnce(&mut Job) -> R) -> Result<R, Job>;

    fn insert(&self, job: Job) -> Result<(), Job> {
        self.insert_with(job, |_| ())
    }

    /// Runs `f` against the job with the given ID, if present.
    fn modify<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R>;

    fn remove(&self, id: &str) -> Option<Job>;

    fn snapshot(&self, id: &str) -> Option<JobSnapshot>;

    fn list(&self) -> Vec<JobSnapshot>;

    fn contains(&self, id: &str) -> bool {
        self.snapshot(id).is_some()
    }

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for InMemoryJobStore {
    fn insert_with<R>(&self, job: Job, f: impl FnOnce(&mut Job) -> R) -> Result<R, Job> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(job.id()) {
            return Err(job);
        }
        let job = jobs.entry(job.id().to_string()).or_insert(job);
        Ok(f(job))
    }

    fn modify<R>(&self, id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut jobs = self.jobs.write();
        jobs.get_mut(id).map(f)
    }

    fn remove(&self, id: &str) -> Option<Job> {
        self.jobs.write().remove(id)
    }

    fn snapshot(&self, id: &str) -> Option<JobSnapshot> {
        self.jobs.read().get(id).map(Job::snapshot)
    }

    fn list(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<JobSnapshot> = self.jobs.read().values().map(Job::snapshot).collect();
        jobs.sort_by(|a, b| a.job_order_id().cmp(b.job_order_id()));
        jobs
    }

    fn contains(&self, id: &str) -> bool {
        self.jobs.read().contains_key(id)
    }

    fn len(&self) -> usize {
        self.jobs.read().len()
    }
}
