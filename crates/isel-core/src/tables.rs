//! Static campaign data: which backend each triple belongs to, how large each
//! backend's matcher table is per isel mode, and the tiered target lists.
//!
//! The built-in tables can be extended or overridden from a YAML file so new
//! backends or freshly measured table sizes do not require a rebuild. The
//! built-in sizes are not measured against any particular LLVM build; pass a
//! tables file with real sizes for serious campaigns.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{ConfigError, IselMode, TargetSpec};

const TRIPLE_ARCH: &[(&str, &str)] = &[
    ("aarch64", "AArch64"),
    ("aarch64_32", "AArch64"),
    ("aarch64_be", "AArch64"),
    ("amdgcn", "AMDGPU"),
    ("arc", "ARC"),
    ("arm", "ARM"),
    ("armeb", "ARM"),
    ("avr", "AVR"),
    ("bpf", "BPF"),
    ("bpfeb", "BPF"),
    ("bpfel", "BPF"),
    ("csky", "CSKY"),
    ("hexagon", "Hexagon"),
    ("lanai", "Lanai"),
    ("loongarch32", "LoongArch"),
    ("loongarch64", "LoongArch"),
    ("m68k", "M68k"),
    ("mips", "Mips"),
    ("mips64", "Mips"),
    ("mips64el", "Mips"),
    ("mipsel", "Mips"),
    ("msp430", "MSP430"),
    ("nvptx", "NVPTX"),
    ("nvptx64", "NVPTX"),
    ("ppc32", "PowerPC"),
    ("ppc32le", "PowerPC"),
    ("ppc64", "PowerPC"),
    ("ppc64le", "PowerPC"),
    ("r600", "AMDGPU"),
    ("riscv32", "RISCV"),
    ("riscv64", "RISCV"),
    ("sparc", "Sparc"),
    ("sparcel", "Sparc"),
    ("sparcv9", "Sparc"),
    ("systemz", "SystemZ"),
    ("thumb", "ARM"),
    ("thumbeb", "ARM"),
    ("ve", "VE"),
    ("wasm32", "WebAssembly"),
    ("wasm64", "WebAssembly"),
    ("x86", "X86"),
    ("x86_64", "X86"),
    ("xcore", "XCore"),
];

const MATCHER_TABLE_SIZE_DAGISEL: &[(&str, u64)] = &[
    ("AArch64", 483_338),
    ("AMDGPU", 497_637),
    ("ARC", 2_755),
    ("ARM", 199_127),
    ("AVR", 2_816),
    ("BPF", 2_990),
    ("CSKY", 26_410),
    ("Hexagon", 178_140),
    ("Lanai", 2_467),
    ("LoongArch", 32_720),
    ("M68k", 11_012),
    ("MSP430", 8_170),
    ("Mips", 53_960),
    ("NVPTX", 169_770),
    ("PowerPC", 176_020),
    ("RISCV", 1_763_062),
    ("Sparc", 5_060),
    ("SystemZ", 57_450),
    ("VE", 74_040),
    ("WebAssembly", 22_450),
    ("X86", 688_542),
    ("XCore", 3_460),
];

// Only backends with a GlobalISel pipeline have a table here.
const MATCHER_TABLE_SIZE_GISEL: &[(&str, u64)] = &[
    ("AArch64", 248_178),
    ("AMDGPU", 431_082),
    ("ARM", 87_542),
    ("M68k", 1_082),
    ("Mips", 63_802),
    ("PowerPC", 21_580),
    ("RISCV", 174_608),
    ("X86", 48_270),
];

const TIER_1: &[(&str, &str, &str)] = &[
    ("", "", "aarch64"),
    ("", "", "x86_64"),
    ("", "", "riscv64"),
    ("", "", "arm"),
    ("", "", "amdgcn"),
    ("", "", "nvptx64"),
    ("", "", "wasm32"),
    ("", "", "ppc64le"),
];

const TIER_2: &[(&str, &str, &str)] = &[
    ("apple-m1", "", "aarch64"),
    ("neoverse-v1", "", "aarch64"),
    ("", "+sve2", "aarch64"),
    ("skylake-avx512", "", "x86_64"),
    ("znver3", "", "x86_64"),
    ("", "+avx512f,+avx512bw", "x86_64"),
    ("", "+m,+a,+f,+d,+c", "riscv64"),
    ("", "+v", "riscv64"),
    ("cortex-a53", "", "arm"),
    ("gfx1100", "", "amdgcn"),
    ("gfx90a", "", "amdgcn"),
    ("sm_90", "", "nvptx64"),
    ("pwr9", "", "ppc64le"),
];

const TIER_3: &[(&str, &str, &str)] = &[
    ("", "", "mips64el"),
    ("", "", "systemz"),
    ("", "", "hexagon"),
    ("", "", "loongarch64"),
    ("", "", "sparcv9"),
    ("", "", "bpfel"),
    ("", "", "avr"),
    ("", "", "m68k"),
    ("", "", "msp430"),
    ("", "", "ve"),
    ("", "", "xcore"),
    ("", "", "csky"),
    ("", "", "lanai"),
    ("", "", "arc"),
];

#[derive(Clone, Debug)]
pub struct CampaignTables {
    triple_arch: BTreeMap<String, String>,
    dagisel_sizes: BTreeMap<String, u64>,
    gisel_sizes: BTreeMap<String, u64>,
    tiers: BTreeMap<u8, Vec<TargetSpec>>,
}

#[derive(Debug, Deserialize)]
struct TablesFile {
    #[serde(default)]
    triple_arch: BTreeMap<String, String>,
    #[serde(default)]
    matcher_table_size: MatcherTableSizes,
    #[serde(default)]
    tiers: BTreeMap<u8, Vec<TierEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct MatcherTableSizes {
    #[serde(default)]
    gisel: BTreeMap<String, u64>,
    #[serde(default)]
    dagisel: BTreeMap<String, u64>,
}

#[derive(Debug, Deserialize)]
struct TierEntry {
    #[serde(default)]
    cpu: String,
    #[serde(default)]
    attr: String,
    triple: String,
}

fn owned_map<V: Copy>(entries: &[(&str, V)]) -> BTreeMap<String, V> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn tier_specs(entries: &[(&str, &str, &str)]) -> Vec<TargetSpec> {
    entries
        .iter()
        .map(|(cpu, attr, triple)| TargetSpec::new(cpu, attr, triple))
        .collect()
}

impl Default for CampaignTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl CampaignTables {
    pub fn builtin() -> Self {
        let triple_arch = TRIPLE_ARCH
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut tiers = BTreeMap::new();
        tiers.insert(1, tier_specs(TIER_1));
        tiers.insert(2, tier_specs(TIER_2));
        tiers.insert(3, tier_specs(TIER_3));
        Self {
            triple_arch,
            dagisel_sizes: owned_map(MATCHER_TABLE_SIZE_DAGISEL),
            gisel_sizes: owned_map(MATCHER_TABLE_SIZE_GISEL),
            tiers,
        }
    }

    /// Built-in tables with the entries from `path` layered on top.
    pub fn builtin_with_overrides(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|e| ConfigError::TablesFile {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        let mut tables = Self::builtin();
        tables.apply_yaml(&raw).map_err(|e| match e {
            ConfigError::TablesFile { source, .. } => ConfigError::TablesFile {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        Ok(tables)
    }

    pub fn apply_yaml(&mut self, raw: &str) -> Result<(), ConfigError> {
        let file: TablesFile =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::TablesFile {
                path: "<inline>".into(),
                source: e.into(),
            })?;
        if let Some(tier) = file.tiers.keys().find(|t| !(1..=3).contains(*t)) {
            return Err(ConfigError::UnknownTier(*tier));
        }
        self.triple_arch.extend(file.triple_arch);
        self.gisel_sizes.extend(file.matcher_table_size.gisel);
        self.dagisel_sizes.extend(file.matcher_table_size.dagisel);
        for (tier, entries) in file.tiers {
            let specs = entries
                .iter()
                .map(|e| TargetSpec::new(&e.cpu, &e.attr, &e.triple))
                .collect();
            self.tiers.insert(tier, specs);
        }
        Ok(())
    }

    /// Backend name for a triple: the exact triple-arch key if there is one,
    /// otherwise the longest key the triple starts with (`armv7-a` -> `arm`).
    pub fn arch_of(&self, triple: &str) -> Option<&str> {
        if let Some(arch) = self.triple_arch.get(triple) {
            return Some(arch.as_str());
        }
        self.triple_arch
            .iter()
            .filter(|(key, _)| triple.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, arch)| arch.as_str())
    }

    pub fn matcher_table_size(&self, arch: &str, isel: IselMode) -> Option<u64> {
        let sizes = match isel {
            IselMode::GlobalIsel => &self.gisel_sizes,
            IselMode::DagIsel => &self.dagisel_sizes,
        };
        sizes.get(arch).copied()
    }

    /// Targets of a tier. Tier 0 is every known triple with no cpu or attrs.
    pub fn tier(&self, tier: u8) -> Result<Vec<TargetSpec>, ConfigError> {
        if tier == 0 {
            return Ok(self
                .triple_arch
                .keys()
                .map(|triple| TargetSpec::new("", "", triple))
                .collect());
        }
        self.tiers
            .get(&tier)
            .cloned()
            .ok_or(ConfigError::UnknownTier(tier))
    }

    pub fn triples(&self) -> impl Iterator<Item = &str> {
        self.triple_arch.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arch_lookup_prefers_exact_then_longest_prefix() {
        let tables = CampaignTables::builtin();
        assert_eq!(tables.arch_of("x86_64"), Some("X86"));
        assert_eq!(tables.arch_of("x86_64-unknown-linux-gnu"), Some("X86"));
        assert_eq!(tables.arch_of("armv7-a"), Some("ARM"));
        assert_eq!(tables.arch_of("thumbv8m.main-none-eabi"), Some("ARM"));
        assert_eq!(tables.arch_of("ppc64le"), Some("PowerPC"));
        assert_eq!(tables.arch_of("mips64el-linux"), Some("Mips"));
        assert_eq!(tables.arch_of("z80"), None);
    }

    #[test]
    fn gisel_table_is_a_subset_of_dagisel() {
        let tables = CampaignTables::builtin();
        for arch in tables.gisel_sizes.keys() {
            assert!(tables.matcher_table_size(arch, IselMode::DagIsel).is_some());
        }
        assert!(tables
            .matcher_table_size("Hexagon", IselMode::GlobalIsel)
            .is_none());
        assert_eq!(
            tables.matcher_table_size("X86", IselMode::DagIsel),
            Some(688_542)
        );
    }

    #[test]
    fn every_tier_triple_has_an_arch() {
        let tables = CampaignTables::builtin();
        for tier in 0..=3 {
            for spec in tables.tier(tier).unwrap() {
                assert!(
                    tables.arch_of(&spec.triple).is_some(),
                    "tier {tier} triple {} has no arch",
                    spec.triple
                );
            }
        }
        assert!(matches!(tables.tier(4), Err(ConfigError::UnknownTier(4))));
    }

    #[test]
    fn tier_zero_covers_every_triple_in_sorted_order() {
        let tables = CampaignTables::builtin();
        let tier0: Vec<String> = tables.tier(0).unwrap().into_iter().map(|s| s.triple).collect();
        let triples: Vec<String> = tables.triples().map(str::to_string).collect();
        assert_eq!(tier0, triples);
        let mut sorted = tier0.clone();
        sorted.sort();
        assert_eq!(tier0, sorted);
    }

    #[test]
    fn yaml_overrides_extend_builtins() {
        let mut tables = CampaignTables::builtin();
        tables
            .apply_yaml(
                r#"
triple_arch:
  z80: Z80
matcher_table_size:
  gisel:
    Hexagon: 4096
  dagisel:
    Z80: 128
tiers:
  1:
    - { cpu: "", attr: "", triple: z80 }
    - { triple: hexagon, attr: "+hvx" }
"#,
            )
            .unwrap();
        assert_eq!(tables.arch_of("z80"), Some("Z80"));
        assert_eq!(
            tables.matcher_table_size("Hexagon", IselMode::GlobalIsel),
            Some(4096)
        );
        assert_eq!(tables.matcher_table_size("Z80", IselMode::DagIsel), Some(128));
        let tier1 = tables.tier(1).unwrap();
        assert_eq!(tier1.len(), 2);
        assert_eq!(tier1[1].attrs, vec!["+hvx".to_string()]);
        // untouched tiers keep their built-in contents
        assert_eq!(tables.tier(2).unwrap().len(), TIER_2.len());
    }

    #[test]
    fn yaml_rejects_tier_zero_and_garbage() {
        let mut tables = CampaignTables::builtin();
        let err = tables
            .apply_yaml("tiers:\n  0:\n    - { triple: x86_64 }\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTier(0)));
        assert!(matches!(
            tables.apply_yaml("matcher_table_size: 5"),
            Err(ConfigError::TablesFile { .. })
        ));
    }
}
