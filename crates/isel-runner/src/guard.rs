use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use isel_core::ensure_dir;
use tracing::{info, warn};

use crate::ExistsAction;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Abort,
}

/// Applies the existence policy to the output root before anything is
/// launched.
///
/// `Ignore` writes into whatever is already there. Jobs whose directories
/// survive from an earlier run share them with the new run; nothing is merged
/// or cleaned.
pub fn apply_exists_policy(root: &Path, action: ExistsAction) -> Result<GuardDecision> {
    match action {
        ExistsAction::Abort if root.exists() => {
            info!(
                output = %root.display(),
                "output already exists and on-exist is abort, not fuzzing"
            );
            return Ok(GuardDecision::Abort);
        }
        ExistsAction::Force if root.exists() => {
            warn!(output = %root.display(), "output already exists, removing it");
            fs::remove_dir_all(root)
                .with_context(|| format!("removing existing output {}", root.display()))?;
        }
        _ => {}
    }
    ensure_dir(root).with_context(|| format!("creating output {}", root.display()))?;
    Ok(GuardDecision::Proceed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    fn scratch(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "isel_guard_{}_{}_{}",
            tag,
            std::process::id(),
            Utc::now().timestamp_micros()
        ))
    }

    fn seed_previous_run(root: &Path) -> PathBuf {
        let stale = root.join("aflplusplus").join("gisel").join("x86_64").join("0");
        ensure_dir(&stale).unwrap();
        fs::write(stale.join("fuzzer_stats"), b"execs_done: 1\n").unwrap();
        stale
    }

    #[test]
    fn abort_leaves_existing_output_untouched() {
        let root = scratch("abort");
        let stale = seed_previous_run(&root);
        let decision = apply_exists_policy(&root, ExistsAction::Abort).unwrap();
        assert_eq!(decision, GuardDecision::Abort);
        assert!(stale.join("fuzzer_stats").exists());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn abort_creates_missing_output() {
        let root = scratch("abort_fresh");
        assert_eq!(
            apply_exists_policy(&root, ExistsAction::Abort).unwrap(),
            GuardDecision::Proceed
        );
        assert!(root.is_dir());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn force_recreates_output_empty() {
        let root = scratch("force");
        seed_previous_run(&root);
        let decision = apply_exists_policy(&root, ExistsAction::Force).unwrap();
        assert_eq!(decision, GuardDecision::Proceed);
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn ignore_keeps_previous_contents() {
        let root = scratch("ignore");
        let stale = seed_previous_run(&root);
        let decision = apply_exists_policy(&root, ExistsAction::Ignore).unwrap();
        assert_eq!(decision, GuardDecision::Proceed);
        assert!(stale.join("fuzzer_stats").exists());
        let _ = fs::remove_dir_all(root);
    }
}
