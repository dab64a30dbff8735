//! ISA-95 job order control: job lifecycle, storage, the method surface,
//! status notification and demo auto-progression.

pub mod controller;
pub mod job;
pub mod notifier;
pub mod store;
pub mod ticker;
pub mod types;

pub use controller::{JobList, JobOrderController};
pub use job::{ChangeReceiver, ChangeSender, Job, JobSnapshot};
pub use notifier::{BroadcastSink, EventSink, LogSink, Notifier, NotifyError};
pub use store::{InMemoryJobStore, JobStore};
pub use ticker::{JobTicker, TickerConfig};
pub use types::{
    JobOrder, JobOrderAndState, JobResponse, JobResult, JobState, JobStatusEvent, LocalizedText,
    Parameter, ParameterValue, ReturnCode, StateRecord, WorkMaster,
};
