//! Download jobs: the record, the registry that owns it and the janitor that
//! evicts it.

mod janitor;
mod model;
mod registry;

pub use janitor::JobJanitor;
pub use model::{DownloadMode, Job, JobId, JobPatch, JobStatus};
pub use registry::JobRegistry;
