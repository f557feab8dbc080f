use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::JobConfig;
use crate::JobDescriptor;

/// One llc invocation in the shape the test-classification reports group
/// by: arch, isel flag, triple, cpu and the sorted attribute list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnableCommand {
    pub arch: String,
    pub gisel: bool,
    pub triple: String,
    pub cpu: Option<String>,
    pub attrs: String,
}

impl From<&JobDescriptor> for RunnableCommand {
    fn from(job: &JobDescriptor) -> Self {
        let mut attrs = job.target.attrs.clone();
        attrs.sort();
        Self {
            arch: job.arch.clone(),
            gisel: job.isel.global_isel_flag() == 1,
            triple: job.target.triple.clone(),
            cpu: job.target.cpu.clone(),
            attrs: attrs.join(","),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct PlannedJob {
    pub verbose_name: String,
    pub repeat_index: u32,
    pub output_dir: PathBuf,
    pub matcher_table_size: u64,
    pub command: RunnableCommand,
}

impl PlannedJob {
    pub fn new(job: &JobDescriptor, config: &JobConfig) -> Self {
        Self {
            verbose_name: config.verbose_name.clone(),
            repeat_index: job.repeat_index,
            output_dir: config.output_dir.clone(),
            matcher_table_size: job.matcher_table_size,
            command: RunnableCommand::from(job),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CampaignManifest {
    pub schema_version: &'static str,
    pub created_at: String,
    pub fuzzer: String,
    pub isel: String,
    pub backend: String,
    pub on_exist: String,
    pub campaign_secs: u64,
    pub concurrency: usize,
    pub jobs: Vec<PlannedJob>,
}
