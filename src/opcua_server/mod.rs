pub mod job_manager;
pub mod methods;
pub mod server;

pub use job_manager::{add_job_manager, NAMESPACE_URI};
pub use methods::{invoke, ControlError, JobOrderMethod, JobOrderMethodHandler};
pub use server::start_job_server;
