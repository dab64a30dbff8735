use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use super::types::{JobOrder, JobOrderAndState, JobResponse, JobResult, JobState, StateRecord};

/// Channel a job reports its changes on. Each message is the job as it looks after the change.
pub type ChangeSender = mpsc::UnboundedSender<JobSnapshot>;
pub type ChangeReceiver = mpsc::UnboundedReceiver<JobSnapshot>;

/// Point-in-time copy of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub job_order: JobOrder,
    pub state: JobState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn job_order_id(&self) -> &str {
        &self.job_order.job_order_id
    }

    pub fn state_number(&self) -> u32 {
        self.state.number()
    }

    pub fn state_records(&self) -> Vec<StateRecord> {
        vec![StateRecord::from(self.state)]
    }

    pub fn order_and_state(&self) -> JobOrderAndState {
        JobOrderAndState {
            job_order: self.job_order.clone(),
            state: self.state_records(),
        }
    }

    /// Job response with a fresh correlation ID.
    pub fn response(&self) -> JobResponse {
        JobResponse {
            id: uuid::Uuid::new_v4().to_string(),
            job_order_id: self.job_order.job_order_id.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            job_state: self.state_records(),
            job_result: JobResult::from(self.state),
            job_response_data: Vec::new(),
        }
    }
}

/// A job order and its position in the ISA-95 job lifecycle.
///
/// All transitions are guarded: an operation called from a state it is not
/// defined for returns `false` and leaves the job untouched. Every accepted
/// transition publishes a snapshot on the change channel.
#[derive(Debug)]
pub struct Job {
    job_order: JobOrder,
    state: JobState,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    changes: ChangeSender,
}

impl Job {
    /// New job in `NotAllowedToStart`. Creation itself is not reported; the owner
    /// calls [`Job::changed`] once the job is actually accepted.
    pub fn new(job_order: JobOrder, changes: ChangeSender) -> Self {
        Self {
            job_order,
            state: JobState::NotAllowedToStart,
            start_time: None,
            end_time: None,
            changes,
        }
    }

    pub fn id(&self) -> &str {
        &self.job_order.job_order_id
    }

    pub fn job_order(&self) -> &JobOrder {
        &self.job_order
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn state_number(&self) -> u32 {
        self.state.number()
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            job_order: self.job_order.clone(),
            state: self.state,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    /// Reports the current job on the change channel.
    pub fn changed(&self) {
        if self.changes.send(self.snapshot()).is_err() {
            tracing::debug!("No listener for changes of job order {}", self.id());
        }
    }

    fn transition(&mut self, state: JobState) -> bool {
        self.state = state;
        match state {
            JobState::Running => {
                self.start_time.get_or_insert_with(Utc::now);
            }
            JobState::Ended => {
                self.end_time.get_or_insert_with(Utc::now);
            }
            _ => {}
        }
        self.changed();
        true
    }

    pub fn update(&mut self, job_order: JobOrder) -> bool {
        match self.state {
            JobState::AllowedToStart | JobState::NotAllowedToStart => {
                self.job_order = job_order;
                self.changed();
                true
            }
            _ => false,
        }
    }

    pub fn start(&mut self) -> bool {
        match self.state {
            JobState::AllowedToStart => self.transition(JobState::Running),
            JobState::NotAllowedToStart => self.transition(JobState::AllowedToStart),
            _ => false,
        }
    }

    pub fn revoke_start(&mut self) -> bool {
        match self.state {
            JobState::AllowedToStart => self.transition(JobState::NotAllowedToStart),
            _ => false,
        }
    }

    pub fn pause(&mut self) -> bool {
        match self.state {
            JobState::Running => self.transition(JobState::Interrupted),
            _ => false,
        }
    }

    pub fn resume(&mut self) -> bool {
        match self.state {
            JobState::Interrupted => self.transition(JobState::Running),
            _ => false,
        }
    }

    pub fn stop(&mut self) -> bool {
        match self.state {
            JobState::Running | JobState::Interrupted => self.transition(JobState::Ended),
            _ => false,
        }
    }

    pub fn abort(&mut self) -> bool {
        match self.state {
            JobState::AllowedToStart
            | JobState::NotAllowedToStart
            | JobState::Running
            | JobState::Interrupted => self.transition(JobState::Aborted),
            JobState::Ended | JobState::Aborted => false,
        }
    }

    /// Resets the job ahead of its removal. Never fails.
    pub fn cancel(&mut self) {
        self.transition(JobState::NotAllowedToStart);
    }
}
