use std::collections::{BTreeSet, HashMap};

use isel_core::{CampaignTables, ConfigError, IselMode, TargetSpec};
use serde::Serialize;
use tracing::info;

/// Which targets to fuzz: a predefined tier or an explicit list of
/// `"cpu attr triple"` entries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    Tier(u8),
    Set(Vec<String>),
}

impl Selection {
    /// An explicit set wins over a tier when both are given.
    pub fn from_args(tier: Option<u8>, set: Option<Vec<String>>) -> Result<Self, ConfigError> {
        match (set, tier) {
            (Some(set), _) if !set.is_empty() => Ok(Selection::Set(set)),
            (_, Some(tier)) => Ok(Selection::Tier(tier)),
            _ => Err(ConfigError::NoSelection),
        }
    }

    pub fn resolve(&self, tables: &CampaignTables) -> Result<Vec<TargetSpec>, ConfigError> {
        match self {
            Selection::Tier(tier) => tables.tier(*tier),
            Selection::Set(entries) => entries
                .iter()
                .map(|e| TargetSpec::parse_set_entry(e))
                .collect(),
        }
    }
}

/// One fuzzing run. Produced once by [`build_matrix`] and never mutated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct JobDescriptor {
    pub repeat_index: u32,
    pub target: TargetSpec,
    pub arch: String,
    pub isel: IselMode,
    pub matcher_table_size: u64,
}

/// Expands targets × repeats into job descriptors, repeat-major.
///
/// Targets whose arch has no matcher table for `isel` are dropped with an
/// info line. Each job gets `repeat + offset` as its index unless an earlier
/// job with the same target label already holds that index (duplicate set
/// entries), in which case it takes the next free one so names stay unique.
/// An index past `u32::MAX` is a configuration error.
pub fn build_matrix(
    targets: &[TargetSpec],
    tables: &CampaignTables,
    isel: IselMode,
    repeat: u32,
    offset: u32,
) -> Result<Vec<JobDescriptor>, ConfigError> {
    let eligible: Vec<(&TargetSpec, &str, u64)> = targets
        .iter()
        .filter_map(|target| {
            let Some(arch) = tables.arch_of(&target.triple) else {
                info!(triple = %target.triple, "unknown architecture for triple, not fuzzing");
                return None;
            };
            let Some(size) = tables.matcher_table_size(arch, isel) else {
                info!(
                    triple = %target.triple,
                    arch,
                    isel = %isel,
                    "can't find matcher table size, not fuzzing"
                );
                return None;
            };
            Some((target, arch, size))
        })
        .collect();

    let mut taken: HashMap<String, BTreeSet<u32>> = HashMap::new();
    let mut jobs = Vec::with_capacity(eligible.len() * repeat as usize);
    for r in 0..repeat {
        for (target, arch, size) in &eligible {
            let label = target.label();
            let overflow = || ConfigError::RepeatIndexOverflow(label.clone());
            let used = taken.entry(label.clone()).or_default();
            let mut index = r.checked_add(offset).ok_or_else(overflow)?;
            while used.contains(&index) {
                index = index.checked_add(1).ok_or_else(overflow)?;
            }
            used.insert(index);
            jobs.push(JobDescriptor {
                repeat_index: index,
                target: (*target).clone(),
                arch: arch.to_string(),
                isel,
                matcher_table_size: *size,
            });
        }
    }
    Ok(jobs)
}
