use std::path::PathBuf;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use isel_core::{atomic_write_json_pretty, CampaignTables, ConfigError};
use serde::Serialize;
use tracing::info;

use crate::backend::{Backend, BackendKind, LaunchBackend};
use crate::dispatch::{dispatch, DispatchReport};
use crate::guard::{apply_exists_policy, GuardDecision};
use crate::job::configure;
use crate::matrix::{build_matrix, JobDescriptor, Selection};
use crate::records::{CampaignManifest, PlannedJob};
use crate::RunPolicy;

pub struct Campaign {
    pub policy: RunPolicy,
    pub tables: CampaignTables,
    pub selection: Selection,
    pub repeat: u32,
    pub offset: u32,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CampaignOutcome {
    /// The output root existed and the policy was `abort`; nothing ran.
    Aborted { output: PathBuf },
    Completed {
        manifest: PathBuf,
        jobs: usize,
        report: DispatchReport,
    },
}

impl Campaign {
    pub fn plan(&self) -> Result<Vec<JobDescriptor>, ConfigError> {
        let targets = self.selection.resolve(&self.tables)?;
        build_matrix(
            &targets,
            &self.tables,
            self.policy.isel,
            self.repeat,
            self.offset,
        )
    }

    pub fn manifest(&self, kind: BackendKind, jobs: &[JobDescriptor]) -> CampaignManifest {
        CampaignManifest {
            schema_version: "campaign_manifest_v1",
            created_at: Utc::now().to_rfc3339(),
            fuzzer: self.policy.fuzzer.to_string(),
            isel: self.policy.isel.to_string(),
            backend: kind.as_str().to_string(),
            on_exist: self.policy.exists_action.as_str().to_string(),
            campaign_secs: self.policy.duration.as_secs(),
            concurrency: self.policy.jobs,
            jobs: jobs
                .iter()
                .map(|job| PlannedJob::new(job, &configure(job, &self.policy, kind)))
                .collect(),
        }
    }

    /// Resolves the matrix, applies the on-exist policy, records the plan and
    /// runs every job to completion. Configuration problems surface before the
    /// output directory is touched.
    pub fn run(&self, backend: &Backend) -> Result<CampaignOutcome> {
        let jobs = self.plan()?;
        let kind = backend.kind();

        if apply_exists_policy(&self.policy.output, self.policy.exists_action)?
            == GuardDecision::Abort
        {
            return Ok(CampaignOutcome::Aborted {
                output: self.policy.output.clone(),
            });
        }

        let manifest_path = self
            .policy
            .output
            .join(self.policy.fuzzer.as_str())
            .join(self.policy.isel.as_str())
            .join(format!(
                "campaign-{}.json",
                Utc::now().format("%Y%m%d_%H%M%S")
            ));
        atomic_write_json_pretty(&manifest_path, &self.manifest(kind, &jobs))
            .with_context(|| format!("writing {}", manifest_path.display()))?;
        info!(
            jobs = jobs.len(),
            concurrency = self.policy.jobs,
            manifest = %manifest_path.display(),
            "dispatching campaign"
        );

        let total = jobs.len();
        let launch_gate = LaunchGate::default();
        let stagger = backend.options().launch_stagger;
        let tickets: Vec<(usize, JobDescriptor)> = jobs.into_iter().enumerate().collect();
        let report = dispatch(tickets, self.policy.jobs, |(ticket, job)| {
            let turn = launch_gate.enter(ticket);
            let config = configure(&job, &self.policy, kind);
            info!(
                job = %config.verbose_name,
                cpu = job.target.cpu_str(),
                attr = %job.target.attr_string(),
                triple = %job.target.triple,
                arch = %job.arch,
                "fuzzing"
            );
            let handle = backend
                .launch(&config)
                .with_context(|| format!("launching {}", config.verbose_name))?;
            thread::sleep(stagger);
            drop(turn);
            let completion = backend
                .await_completion(&config, handle)
                .with_context(|| format!("waiting for {}", config.verbose_name))?;
            if !completion.success() {
                return Err(anyhow!(
                    "{} finished unsuccessfully: {:?}",
                    config.verbose_name,
                    completion
                ));
            }
            info!(job = %config.verbose_name, "job finished");
            Ok(())
        })?;
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "campaign finished"
        );

        Ok(CampaignOutcome::Completed {
            manifest: manifest_path,
            jobs: total,
            report,
        })
    }
}

/// Serializes launches and hands out turns in submission order. A turn is
/// released when dropped, including on a failed launch.
#[derive(Default)]
struct LaunchGate {
    next: Mutex<usize>,
    turn: Condvar,
}

struct LaunchTurn<'a> {
    gate: &'a LaunchGate,
    next: MutexGuard<'a, usize>,
}

impl LaunchGate {
    fn enter(&self, ticket: usize) -> LaunchTurn<'_> {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        while *next != ticket {
            next = self
                .turn
                .wait(next)
                .unwrap_or_else(PoisonError::into_inner);
        }
        LaunchTurn { gate: self, next }
    }
}

impl Drop for LaunchTurn<'_> {
    fn drop(&mut self) {
        *self.next += 1;
        self.gate.turn.notify_all();
    }
}
