//! Orchestration core for instruction-selection fuzzing campaigns.
//!
//! `Campaign::run` drives the whole flow: the target matrix is expanded into
//! [`JobDescriptor`]s, the output root is checked against the on-exist
//! policy, and every job is configured and launched on a bounded worker pool
//! through one of the three [`Backend`]s.

pub mod backend;
mod campaign;
pub mod dispatch;
pub mod guard;
pub mod job;
pub mod matrix;
mod policy;
pub mod records;

pub use backend::{Backend, BackendKind, BackendOptions, Completion, LaunchBackend, LaunchError};
pub use campaign::{Campaign, CampaignOutcome};
pub use dispatch::{dispatch, DispatchReport};
pub use guard::{apply_exists_policy, GuardDecision};
pub use job::{configure, JobConfig};
pub use matrix::{build_matrix, JobDescriptor, Selection};
pub use policy::{absolutize, default_jobs, ExistsAction, RunPolicy};
pub use records::{CampaignManifest, PlannedJob, RunnableCommand};
