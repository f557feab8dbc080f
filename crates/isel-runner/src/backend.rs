//! Launch backends: how a configured job becomes a running process and how
//! the orchestrator decides it has finished.
//!
//! - `DetachedSession` starts afl-fuzz inside a detached `screen` session and
//!   treats the job as done once the campaign length plus a grace period has
//!   elapsed. The session's real exit state is never inspected.
//! - `Container` runs afl-fuzz in a single-CPU `docker run --rm` container
//!   with a tmpfs scratch output, copies the results to the job directory
//!   before exiting, then polls until the named container is gone.
//! - `ForegroundStream` runs afl-fuzz directly with inherited stdio and waits
//!   for it to exit.

use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use isel_core::ensure_dir;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::job::JobConfig;
use crate::RunPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    DetachedSession,
    Container,
    ForegroundStream,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::DetachedSession => "screen",
            BackendKind::Container => "docker",
            BackendKind::ForegroundStream => "stdout",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("a container named {0} already exists; remove it before relaunching")]
    NameCollision(String),
}

#[derive(Clone, Debug)]
pub struct BackendOptions {
    /// Pause after every launch so afl-fuzz can bind its core before the next
    /// job starts looking for a free one.
    pub launch_stagger: Duration,
    pub detached_grace: Duration,
    pub container_poll_interval: Duration,
    pub container_cpus: String,
    pub scratch_size: String,
    pub screen_program: String,
    pub docker_program: String,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            launch_stagger: Duration::from_secs(1),
            detached_grace: Duration::from_secs(60),
            container_poll_interval: Duration::from_secs(1000),
            container_cpus: "1".to_string(),
            scratch_size: "1G".to_string(),
            screen_program: "screen".to_string(),
            docker_program: "docker".to_string(),
        }
    }
}

#[derive(Debug)]
pub struct JobHandle {
    child: Child,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The time budget ran out; whether the job actually exited is unknown.
    Elapsed,
    Exited(ExitStatus),
}

impl Completion {
    pub fn success(&self) -> bool {
        match self {
            Completion::Elapsed => true,
            Completion::Exited(status) => status.success(),
        }
    }
}

pub trait LaunchBackend: Send + Sync {
    fn kind(&self) -> BackendKind;
    fn launch(&self, job: &JobConfig) -> Result<JobHandle>;
    fn await_completion(&self, job: &JobConfig, handle: JobHandle) -> Result<Completion>;
}

fn spawn(mut cmd: Command, what: &str) -> Result<JobHandle> {
    let child = cmd
        .spawn()
        .with_context(|| format!("failed to start {}", what))?;
    Ok(JobHandle { child })
}

fn split_program(argv: &[String]) -> Result<(&String, &[String])> {
    argv.split_first()
        .ok_or_else(|| anyhow!("empty fuzz command"))
}

#[derive(Clone, Debug)]
pub struct DetachedSession {
    campaign: Duration,
    options: BackendOptions,
}

impl DetachedSession {
    pub fn new(campaign: Duration, options: BackendOptions) -> Self {
        Self { campaign, options }
    }

    /// How long a session is given before it counts as finished.
    pub fn session_budget(&self) -> Duration {
        self.campaign.saturating_add(self.options.detached_grace)
    }

    pub fn command(&self, job: &JobConfig) -> Command {
        let mut cmd = Command::new(&self.options.screen_program);
        cmd.args(["-S", job.verbose_name.as_str(), "-dm"]);
        cmd.args(&job.fuzz_command);
        cmd.envs(&job.env);
        cmd.stdin(Stdio::null());
        cmd
    }
}

impl LaunchBackend for DetachedSession {
    fn kind(&self) -> BackendKind {
        BackendKind::DetachedSession
    }

    fn launch(&self, job: &JobConfig) -> Result<JobHandle> {
        ensure_dir(&job.output_dir)?;
        spawn(self.command(job), &self.options.screen_program)
    }

    fn await_completion(&self, job: &JobConfig, mut handle: JobHandle) -> Result<Completion> {
        // `screen -dm` forks the session and returns right away.
        let status = handle.child.wait()?;
        if !status.success() {
            warn!(job = %job.verbose_name, %status, "screen exited abnormally");
        }
        thread::sleep(self.session_budget());
        Ok(Completion::Elapsed)
    }
}

#[derive(Clone, Debug)]
pub struct Container {
    image: String,
    scratch: PathBuf,
    options: BackendOptions,
}

impl Container {
    pub fn new(image: impl Into<String>, scratch: PathBuf, options: BackendOptions) -> Self {
        Self {
            image: image.into(),
            scratch,
            options,
        }
    }

    pub fn command(&self, job: &JobConfig) -> Command {
        let mut cmd = Command::new(&self.options.docker_program);
        cmd.arg("run");
        cmd.arg(format!("--cpus={}", self.options.container_cpus));
        cmd.arg(format!("--name={}", container_name(&job.verbose_name)));
        cmd.arg("--rm");
        cmd.arg("--mount").arg(format!(
            "type=tmpfs,tmpfs-size={},dst={}",
            self.options.scratch_size,
            self.scratch.display()
        ));
        for (key, value) in &job.env {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        cmd.arg("-v")
            .arg(format!("{}:/output", job.output_dir.display()));
        cmd.arg(&self.image);
        let script = format!(
            "{}; mv {} /output/default",
            shell_join(&job.fuzz_command),
            shell_quote(&self.scratch.join("default").to_string_lossy())
        );
        cmd.arg("bash").arg("-c").arg(script);
        cmd.stdin(Stdio::null());
        cmd
    }

    fn listed(&self, name: &str, all: bool) -> Result<bool> {
        let mut cmd = Command::new(&self.options.docker_program);
        cmd.arg("ps");
        if all {
            cmd.arg("-a");
        }
        let filter = format!("name=^/{}$", name.replace('.', "\\."));
        cmd.args(["--filter", filter.as_str()]);
        cmd.args(["--format", "{{.Names}}"]);
        let output = cmd
            .stderr(Stdio::inherit())
            .output()
            .with_context(|| format!("failed to run {} ps", self.options.docker_program))?;
        if !output.status.success() {
            return Err(anyhow!(
                "{} ps exited with {}",
                self.options.docker_program,
                output.status
            ));
        }
        Ok(names_listed(&String::from_utf8_lossy(&output.stdout), name))
    }
}

fn names_listed(ps_output: &str, name: &str) -> bool {
    ps_output.lines().any(|line| line.trim() == name)
}

/// Docker only accepts `[a-zA-Z0-9][a-zA-Z0-9_.-]*`; attribute lists such as
/// `+avx2,+bmi` are mapped onto that alphabet.
pub fn container_name(verbose_name: &str) -> String {
    verbose_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "_.-".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl LaunchBackend for Container {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    fn launch(&self, job: &JobConfig) -> Result<JobHandle> {
        let name = container_name(&job.verbose_name);
        if self.listed(&name, true)? {
            return Err(LaunchError::NameCollision(name).into());
        }
        ensure_dir(&job.output_dir)?;
        spawn(self.command(job), &self.options.docker_program)
    }

    fn await_completion(&self, job: &JobConfig, mut handle: JobHandle) -> Result<Completion> {
        let status = handle.child.wait()?;
        // The container removes itself; wait until docker agrees it is gone.
        while self.listed(&container_name(&job.verbose_name), false)? {
            debug!(job = %job.verbose_name, "container still running");
            thread::sleep(self.options.container_poll_interval);
        }
        Ok(Completion::Exited(status))
    }
}

#[derive(Clone, Debug, Default)]
pub struct ForegroundStream {
    options: BackendOptions,
}

impl ForegroundStream {
    pub fn new(options: BackendOptions) -> Self {
        Self { options }
    }

    pub fn command(&self, job: &JobConfig) -> Result<Command> {
        let (program, args) = split_program(&job.fuzz_command)?;
        let mut cmd = Command::new(program);
        cmd.args(args);
        cmd.envs(&job.env);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
        Ok(cmd)
    }
}

impl LaunchBackend for ForegroundStream {
    fn kind(&self) -> BackendKind {
        BackendKind::ForegroundStream
    }

    fn launch(&self, job: &JobConfig) -> Result<JobHandle> {
        ensure_dir(&job.output_dir)?;
        spawn(self.command(job)?, &job.fuzz_command[0])
    }

    fn await_completion(&self, _job: &JobConfig, mut handle: JobHandle) -> Result<Completion> {
        Ok(Completion::Exited(handle.child.wait()?))
    }
}

/// The backend chosen for a run. Picked once at startup and shared by every
/// worker.
#[derive(Clone, Debug)]
pub enum Backend {
    DetachedSession(DetachedSession),
    Container(Container),
    ForegroundStream(ForegroundStream),
}

impl Backend {
    pub fn new(kind: BackendKind, policy: &RunPolicy, options: BackendOptions) -> Self {
        info!(backend = kind.as_str(), "selected launch backend");
        match kind {
            BackendKind::DetachedSession => {
                Backend::DetachedSession(DetachedSession::new(policy.duration, options))
            }
            BackendKind::Container => Backend::Container(Container::new(
                policy.fuzzer.image(),
                policy.container_scratch(),
                options,
            )),
            BackendKind::ForegroundStream => {
                Backend::ForegroundStream(ForegroundStream::new(options))
            }
        }
    }

    pub fn options(&self) -> &BackendOptions {
        match self {
            Backend::DetachedSession(b) => &b.options,
            Backend::Container(b) => &b.options,
            Backend::ForegroundStream(b) => &b.options,
        }
    }

    fn inner(&self) -> &dyn LaunchBackend {
        match self {
            Backend::DetachedSession(b) => b,
            Backend::Container(b) => b,
            Backend::ForegroundStream(b) => b,
        }
    }
}

impl LaunchBackend for Backend {
    fn kind(&self) -> BackendKind {
        self.inner().kind()
    }

    fn launch(&self, job: &JobConfig) -> Result<JobHandle> {
        self.inner().launch(job)
    }

    fn await_completion(&self, job: &JobConfig, handle: JobHandle) -> Result<Completion> {
        self.inner().await_completion(job, handle)
    }
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:+,=".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}
