use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use isel_core::{Fuzzer, IselMode};
use serde::Serialize;

/// What to do when the output root already exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistsAction {
    Abort,
    Force,
    Ignore,
}

impl ExistsAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ExistsAction::Abort => "abort",
            ExistsAction::Force => "force",
            ExistsAction::Ignore => "ignore",
        }
    }
}

/// Campaign-wide settings, fixed at startup and shared read-only by every job.
#[derive(Clone, Debug)]
pub struct RunPolicy {
    pub exists_action: ExistsAction,
    pub jobs: usize,
    pub duration: Duration,
    pub input: PathBuf,
    pub output: PathBuf,
    pub fuzzer: Fuzzer,
    pub isel: IselMode,
    pub fuzzing_home: PathBuf,
    pub afl_dir: String,
}

impl RunPolicy {
    pub fn afl_fuzz(&self) -> PathBuf {
        self.fuzzing_home.join(&self.afl_dir).join("afl-fuzz")
    }

    pub fn harness(&self) -> PathBuf {
        self.fuzzing_home
            .join("llvm-isel-afl")
            .join("build")
            .join("isel-fuzzing")
    }

    /// afl-fuzz output inside a container; lives on a tmpfs mount.
    pub fn container_scratch(&self) -> PathBuf {
        self.fuzzing_home.join("fuzzing")
    }
}

pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}
