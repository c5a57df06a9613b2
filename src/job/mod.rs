//! Batch jobs on computation hosts.
//!
//! A job is prepared from a package catalog and a resource table, rendered
//! into a submission script, and then driven through the scheduler of its
//! server host. Its state lives in a JSON record next to the script.

pub mod lifecycle;
pub mod package;
pub mod record;
pub mod registry;
pub mod resources;
pub mod script;

pub use lifecycle::{count_queued_jobs, HostEnvironment, Job, JobRequest, PollSettings};
pub use package::{PackageCatalog, PackageSelection};
pub use record::{JobRecord, JobStore, RunState, RECORD_FORMAT_VERSION};
pub use registry::{JobEntry, JobRegistry};
pub use resources::{ResourceProfile, ResourceTable};
pub use script::ScriptSettings;
