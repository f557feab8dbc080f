use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Instruction selection algorithm under test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IselMode {
    #[serde(rename = "gisel")]
    GlobalIsel,
    #[serde(rename = "dagisel")]
    DagIsel,
}

impl IselMode {
    pub fn as_str(self) -> &'static str {
        match self {
            IselMode::GlobalIsel => "gisel",
            IselMode::DagIsel => "dagisel",
        }
    }

    /// Value exported to the harness as `GLOBAL_ISEL`.
    pub fn global_isel_flag(self) -> u8 {
        match self {
            IselMode::GlobalIsel => 1,
            IselMode::DagIsel => 0,
        }
    }
}

impl fmt::Display for IselMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fuzzing engine driving afl-fuzz. Each engine selects its own custom
/// mutator library and container image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fuzzer {
    Aflplusplus,
    Libfuzzer,
    Irfuzzer,
}

impl Fuzzer {
    pub fn as_str(self) -> &'static str {
        match self {
            Fuzzer::Aflplusplus => "aflplusplus",
            Fuzzer::Libfuzzer => "libfuzzer",
            Fuzzer::Irfuzzer => "irfuzzer",
        }
    }

    pub fn image(self) -> &'static str {
        self.as_str()
    }

    pub fn mutator_only(self) -> bool {
        !matches!(self, Fuzzer::Aflplusplus)
    }

    /// Custom mutator library, or `None` when afl-fuzz runs with its built-in
    /// mutators only.
    pub fn mutator_library(self, fuzzing_home: &Path) -> Option<PathBuf> {
        let lib = match self {
            Fuzzer::Aflplusplus => return None,
            Fuzzer::Libfuzzer => "libAFLFuzzMutate.so",
            Fuzzer::Irfuzzer => "libAFLCustomIRMutator.so",
        };
        Some(fuzzing_home.join("mutator").join("build").join(lib))
    }

    /// Extra afl-fuzz flags the engine needs.
    pub fn extra_afl_args(self) -> &'static [&'static str] {
        match self {
            Fuzzer::Irfuzzer => &["-w"],
            _ => &[],
        }
    }
}

impl fmt::Display for Fuzzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (cpu, attrs, triple) combination to fuzz.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetSpec {
    pub triple: String,
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub attrs: Vec<String>,
}

impl TargetSpec {
    pub fn new(cpu: &str, attr: &str, triple: &str) -> Self {
        let cpu = (!cpu.is_empty()).then(|| cpu.to_string());
        let attrs = attr
            .split(',')
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            triple: triple.to_string(),
            cpu,
            attrs,
        }
    }

    /// Parses an explicit `"cpu attr triple"` entry. Fields are separated by
    /// single spaces so empty cpu/attr fields survive (`"  x86_64"`).
    pub fn parse_set_entry(entry: &str) -> Result<Self, ConfigError> {
        let fields: Vec<&str> = entry.split(' ').collect();
        match fields.as_slice() {
            [cpu, attr, triple] if !triple.is_empty() => Ok(Self::new(cpu, attr, triple)),
            _ => Err(ConfigError::MalformedSetEntry(entry.to_string())),
        }
    }

    pub fn cpu_str(&self) -> &str {
        self.cpu.as_deref().unwrap_or("")
    }

    /// Attributes joined in the order they were given, as passed to llc.
    pub fn attr_string(&self) -> String {
        self.attrs.join(",")
    }

    /// `triple[-cpu][-attr]`, the directory and session label for this target.
    pub fn label(&self) -> String {
        let mut label = self.triple.clone();
        if let Some(cpu) = &self.cpu {
            label.push('-');
            label.push_str(cpu);
        }
        if !self.attrs.is_empty() {
            label.push('-');
            label.push_str(&self.attr_string());
        }
        label
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_omits_empty_segments() {
        assert_eq!(TargetSpec::new("", "", "x86_64").label(), "x86_64");
        assert_eq!(
            TargetSpec::new("skylake", "", "x86_64").label(),
            "x86_64-skylake"
        );
        assert_eq!(
            TargetSpec::new("", "+avx2,+bmi", "x86_64").label(),
            "x86_64-+avx2,+bmi"
        );
        assert_eq!(
            TargetSpec::new("neon", "arm", "armv7-a").label(),
            "armv7-a-neon-arm"
        );
    }

    #[test]
    fn set_entry_needs_three_fields() {
        let spec = TargetSpec::parse_set_entry("neon arm armv7-a").unwrap();
        assert_eq!(spec.cpu.as_deref(), Some("neon"));
        assert_eq!(spec.attrs, vec!["arm".to_string()]);
        assert_eq!(spec.triple, "armv7-a");

        let bare = TargetSpec::parse_set_entry("  riscv64").unwrap();
        assert_eq!(bare.cpu, None);
        assert!(bare.attrs.is_empty());

        for bad in ["x86_64", "a b", "a b c d", "cpu attr "] {
            assert!(
                matches!(
                    TargetSpec::parse_set_entry(bad),
                    Err(ConfigError::MalformedSetEntry(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn engines_pick_their_mutators() {
        let home = Path::new("/opt/fuzz");
        assert_eq!(Fuzzer::Aflplusplus.mutator_library(home), None);
        assert!(!Fuzzer::Aflplusplus.mutator_only());
        assert_eq!(
            Fuzzer::Libfuzzer.mutator_library(home).unwrap(),
            PathBuf::from("/opt/fuzz/mutator/build/libAFLFuzzMutate.so")
        );
        assert_eq!(
            Fuzzer::Irfuzzer.mutator_library(home).unwrap(),
            PathBuf::from("/opt/fuzz/mutator/build/libAFLCustomIRMutator.so")
        );
        assert_eq!(Fuzzer::Irfuzzer.extra_afl_args(), &["-w"]);
        assert!(Fuzzer::Libfuzzer.extra_afl_args().is_empty());
    }

    #[test]
    fn isel_flag_matches_mode() {
        assert_eq!(IselMode::GlobalIsel.global_isel_flag(), 1);
        assert_eq!(IselMode::DagIsel.global_isel_flag(), 0);
        assert_eq!(IselMode::DagIsel.to_string(), "dagisel");
    }
}
