use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::backend::BackendKind;
use crate::{JobDescriptor, RunPolicy};

/// Everything a backend needs to start one job. Built per job by the worker
/// that runs it and dropped when the job finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobConfig {
    pub verbose_name: String,
    pub target_label: String,
    pub output_dir: PathBuf,
    /// Passed to the child process as-is; the orchestrator's own environment
    /// is never modified.
    pub env: BTreeMap<String, String>,
    /// afl-fuzz argv, program first.
    pub fuzz_command: Vec<String>,
}

pub fn configure(job: &JobDescriptor, policy: &RunPolicy, kind: BackendKind) -> JobConfig {
    let isel = job.isel.as_str();
    let fuzzer = policy.fuzzer.as_str();
    let target_label = job.target.label();
    let verbose_name = format!(
        "{}-{}-{}-{}",
        fuzzer, isel, target_label, job.repeat_index
    );
    let output_dir = policy
        .output
        .join(fuzzer)
        .join(isel)
        .join(&target_label)
        .join(job.repeat_index.to_string());

    let afl_output = match kind {
        BackendKind::Container => policy.container_scratch(),
        BackendKind::DetachedSession | BackendKind::ForegroundStream => output_dir.clone(),
    };

    let mut env = BTreeMap::new();
    env.insert("CPU".to_string(), job.target.cpu_str().to_string());
    env.insert("ATTR".to_string(), job.target.attr_string());
    env.insert("TRIPLE".to_string(), job.target.triple.clone());
    env.insert(
        "GLOBAL_ISEL".to_string(),
        job.isel.global_isel_flag().to_string(),
    );
    env.insert(
        "MATCHER_TABLE_SIZE".to_string(),
        job.matcher_table_size.to_string(),
    );
    env.insert(
        "AFL_CUSTOM_MUTATOR_ONLY".to_string(),
        u8::from(policy.fuzzer.mutator_only()).to_string(),
    );
    env.insert(
        "AFL_CUSTOM_MUTATOR_LIBRARY".to_string(),
        policy
            .fuzzer
            .mutator_library(&policy.fuzzing_home)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default(),
    );
    env.insert(
        "OUTPUT".to_string(),
        afl_output.to_string_lossy().to_string(),
    );
    if kind == BackendKind::ForegroundStream {
        env.insert("AFL_NO_UI".to_string(), "1".to_string());
    }

    let mut fuzz_command = vec![
        policy.afl_fuzz().to_string_lossy().to_string(),
        "-V".to_string(),
        policy.duration.as_secs().to_string(),
        "-i".to_string(),
        policy.input.to_string_lossy().to_string(),
        "-o".to_string(),
        afl_output.to_string_lossy().to_string(),
    ];
    fuzz_command.extend(
        policy
            .fuzzer
            .extra_afl_args()
            .iter()
            .map(|a| a.to_string()),
    );
    fuzz_command.push(policy.harness().to_string_lossy().to_string());

    JobConfig {
        verbose_name,
        target_label,
        output_dir,
        env,
        fuzz_command,
    }
}
