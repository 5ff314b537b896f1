//! Job lifecycle management
//!
//! Jobs move `Queued → Processing → Completed | Failed`. Each job owns one
//! pipeline run and one progress ticker; both are torn down on the terminal
//! transition or on removal.

pub mod events;
pub mod job;
pub mod manager;
mod ticker;

pub use events::JobEvent;
pub use job::{JobId, JobSnapshot, JobStatus, Submission};
pub use manager::JobManager;
