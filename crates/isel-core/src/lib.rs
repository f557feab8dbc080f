use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

pub mod duration;
mod error;
pub mod tables;
pub mod target;

pub use duration::parse_duration;
pub use error::ConfigError;
pub use tables::CampaignTables;
pub use target::{Fuzzer, IselMode, TargetSpec};

/// `mkdir -p`; an existing directory is not an error.
pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn atomic_write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_bytes(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_creates_parents_and_leaves_no_temp_files() {
        let dir = std::env::temp_dir().join(format!(
            "isel_core_write_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        let path = dir.join("nested").join("plan.json");
        atomic_write_json_pretty(&path, &serde_json::json!({"jobs": 3})).expect("write");
        let back: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).expect("read")).expect("json");
        assert_eq!(back["jobs"], 3);
        let leftovers = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.file_name().to_string_lossy().starts_with('.'))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
        ensure_dir(&dir).expect("ensure_dir is idempotent");
        let _ = fs::remove_dir_all(dir);
    }
}
