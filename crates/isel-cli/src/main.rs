use anyhow::Result;
use clap::builder::TypedValueParser;
use clap::{Parser, ValueEnum};
use isel_core::{parse_duration, CampaignTables, Fuzzer, IselMode};
use isel_runner::{
    absolutize, default_jobs, Backend, BackendKind, BackendOptions, Campaign, CampaignOutcome,
    ExistsAction, RunPolicy, Selection,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "iselfuzz",
    version,
    about = "Run instruction-selection fuzzers across a matrix of targets"
)]
struct Cli {
    /// Directory containing the input seeds.
    #[arg(short, long, default_value = "./seeds/")]
    input: PathBuf,
    /// Root directory for all fuzzing output.
    #[arg(short, long, default_value = "./fuzzing")]
    output: PathBuf,
    /// What to do if the output directory already exists.
    #[arg(long = "on-exist", alias = "on_exist", value_enum, default_value_t = OnExistArg::Abort)]
    on_exist: OnExistArg,
    #[arg(long, value_enum)]
    fuzzer: FuzzerArg,
    /// Max number of jobs in parallel, defaults to all cores.
    #[arg(short, long, default_value_t = default_jobs(), value_parser = clap::value_parser!(u64).range(1..).map(|n| n as usize))]
    jobs: usize,
    /// How many times to repeat each target.
    #[arg(short, long, default_value_t = 3)]
    repeat: u32,
    #[arg(long, value_enum)]
    isel: IselArg,
    /// Total time each fuzzer runs, e.g. 30s, 5m, 1h, 2d, 1w.
    #[arg(short, long, default_value = "5m", value_parser = parse_duration)]
    time: Duration,
    /// Predefined target set; 0 is every known triple. Overridden by --set.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    tier: Option<u8>,
    /// First repeat index, for continuing an earlier campaign.
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Explicit "cpu attr triple" entries to fuzz.
    #[arg(long, num_args = 1..)]
    set: Option<Vec<String>>,
    /// How to start each fuzzer.
    #[arg(long = "type", value_enum)]
    backend: BackendArg,
    #[arg(long, env = "FUZZING_HOME")]
    fuzzing_home: PathBuf,
    /// AFL checkout directory under the fuzzing home.
    #[arg(long, env = "AFL", default_value = "AFLplusplus")]
    afl: String,
    /// YAML file extending the built-in triple and matcher table data.
    #[arg(long)]
    tables: Option<PathBuf>,
    /// Print the job plan and exit without touching the output directory.
    #[arg(long)]
    dry_run: bool,
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnExistArg {
    Abort,
    Force,
    Ignore,
}

impl From<OnExistArg> for ExistsAction {
    fn from(value: OnExistArg) -> Self {
        match value {
            OnExistArg::Abort => ExistsAction::Abort,
            OnExistArg::Force => ExistsAction::Force,
            OnExistArg::Ignore => ExistsAction::Ignore,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FuzzerArg {
    Aflplusplus,
    Libfuzzer,
    Irfuzzer,
}

impl From<FuzzerArg> for Fuzzer {
    fn from(value: FuzzerArg) -> Self {
        match value {
            FuzzerArg::Aflplusplus => Fuzzer::Aflplusplus,
            FuzzerArg::Libfuzzer => Fuzzer::Libfuzzer,
            FuzzerArg::Irfuzzer => Fuzzer::Irfuzzer,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IselArg {
    Gisel,
    Dagisel,
}

impl From<IselArg> for IselMode {
    fn from(value: IselArg) -> Self {
        match value {
            IselArg::Gisel => IselMode::GlobalIsel,
            IselArg::Dagisel => IselMode::DagIsel,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    #[value(name = "screen")]
    Screen,
    #[value(name = "docker")]
    Docker,
    #[value(name = "stdout")]
    Stdout,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Screen => BackendKind::DetachedSession,
            BackendArg::Docker => BackendKind::Container,
            BackendArg::Stdout => BackendKind::ForegroundStream,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let json_mode = cli.json;
    match run(cli) {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            tracing::error!("{:#}", err);
            if json_mode {
                emit_json(&json!({
                    "ok": false,
                    "error": { "message": format!("{:#}", err) }
                }));
            }
            std::process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<Option<Value>> {
    let tables = match &cli.tables {
        Some(path) => CampaignTables::builtin_with_overrides(path)?,
        None => CampaignTables::builtin(),
    };
    let selection = Selection::from_args(cli.tier, cli.set)?;
    let kind = BackendKind::from(cli.backend);
    let policy = RunPolicy {
        exists_action: cli.on_exist.into(),
        jobs: cli.jobs,
        duration: cli.time,
        input: absolutize(&cli.input)?,
        output: absolutize(&cli.output)?,
        fuzzer: cli.fuzzer.into(),
        isel: cli.isel.into(),
        fuzzing_home: absolutize(&cli.fuzzing_home)?,
        afl_dir: cli.afl,
    };
    let campaign = Campaign {
        policy,
        tables,
        selection,
        repeat: cli.repeat,
        offset: cli.offset,
    };

    if cli.dry_run {
        let jobs = campaign.plan()?;
        let manifest = campaign.manifest(kind, &jobs);
        if cli.json {
            return Ok(Some(json!({
                "ok": true,
                "command": "dry-run",
                "plan": serde_json::to_value(&manifest)?,
            })));
        }
        for job in &manifest.jobs {
            println!("{} -> {}", job.verbose_name, job.output_dir.display());
        }
        println!("jobs: {}", manifest.jobs.len());
        return Ok(None);
    }

    let backend = Backend::new(kind, &campaign.policy, BackendOptions::default());
    let outcome = campaign.run(&backend)?;
    if cli.json {
        return Ok(Some(json!({
            "ok": true,
            "command": "run",
            "outcome": serde_json::to_value(&outcome)?,
        })));
    }
    match outcome {
        CampaignOutcome::Aborted { output } => {
            println!("aborted: {} already exists", output.display());
        }
        CampaignOutcome::Completed {
            manifest,
            jobs,
            report,
        } => {
            println!("manifest: {}", manifest.display());
            println!("jobs: {}", jobs);
            println!("succeeded: {}", report.succeeded);
            println!("failed: {}", report.failed);
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"message\":\"failed to serialize JSON payload\"}}}}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use isel_core::ConfigError;

    fn scratch(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("iselfuzz_cli_{}_{}", tag, std::process::id()))
    }

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["iselfuzz", "--fuzzing-home", "/opt/fuzz"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_documented_values() {
        let cli = parse(&["--fuzzer", "aflplusplus", "--isel", "dagisel", "--type", "stdout", "--tier", "0"]);
        assert_eq!(cli.input, PathBuf::from("./seeds/"));
        assert_eq!(cli.output, PathBuf::from("./fuzzing"));
        assert!(matches!(cli.on_exist, OnExistArg::Abort));
        assert_eq!(cli.repeat, 3);
        assert_eq!(cli.offset, 0);
        assert_eq!(cli.time, Duration::from_secs(300));
        assert_eq!(cli.afl, "AFLplusplus");
        assert!(cli.jobs >= 1);
    }

    #[test]
    fn set_takes_multiple_entries_and_time_units() {
        let cli = parse(&[
            "--fuzzer", "irfuzzer", "--isel", "gisel", "--type", "docker",
            "-t", "2d", "--on_exist", "force",
            "--set", "neon arm armv7-a", "neon arm armv7-a",
        ]);
        assert_eq!(cli.time.as_secs(), 172_800);
        assert!(matches!(cli.on_exist, OnExistArg::Force));
        assert_eq!(cli.set.as_ref().map(Vec::len), Some(2));
        assert!(matches!(BackendKind::from(cli.backend), BackendKind::Container));
    }

    #[test]
    fn rejects_bad_values() {
        let base = ["iselfuzz", "--fuzzing-home", "/opt/fuzz", "--fuzzer", "libfuzzer", "--isel", "gisel", "--type", "screen"];
        for extra in [
            &["--tier", "4"][..],
            &["--time", "10"][..],
            &["--jobs", "0"][..],
            &["--type", "tmux"][..],
        ] {
            let mut argv = base.to_vec();
            argv.extend_from_slice(extra);
            assert!(Cli::try_parse_from(argv).is_err(), "{extra:?} should be rejected");
        }
    }

    #[test]
    fn dry_run_plans_without_touching_output() {
        let output = scratch("dry_run").join("fuzzing");
        let cli = parse(&[
            "--fuzzer", "aflplusplus", "--isel", "dagisel", "--type", "docker",
            "--tier", "1", "-r", "2", "--dry-run", "--json",
            "--output", output.to_str().unwrap(),
        ]);
        let payload = run(cli).expect("dry run").expect("json payload");
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["command"], "dry-run");
        let jobs = payload["plan"]["jobs"].as_array().unwrap();
        assert!(!jobs.is_empty());
        assert_eq!(jobs.len() % 2, 0);
        assert_eq!(payload["plan"]["backend"], "docker");
        assert!(!output.exists());
    }

    #[test]
    fn malformed_set_fails_before_output_is_created() {
        let output = scratch("bad_set").join("fuzzing");
        let cli = parse(&[
            "--fuzzer", "aflplusplus", "--isel", "gisel", "--type", "stdout",
            "--on-exist", "force", "--set", "x86_64",
            "--output", output.to_str().unwrap(),
        ]);
        let err = run(cli).expect_err("malformed set");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::MalformedSetEntry(entry)) if entry == "x86_64"
        ));
        assert!(!output.exists());
    }

    #[test]
    fn missing_selection_is_rejected() {
        let cli = parse(&["--fuzzer", "libfuzzer", "--isel", "gisel", "--type", "screen"]);
        let err = run(cli).expect_err("no tier or set");
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::NoSelection)
        ));
    }
}
