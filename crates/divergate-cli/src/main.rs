use anyhow::Context;
use clap::Parser;
use divergate_adapters::SystemProcessRunner;
use divergate_app::{
    preflight, report, ArtifactSet, Clock, ResolvedPaths, RunCoordinator, RunSettings, SystemClock,
};
use divergate_domain::OutputFilter;
use divergate_types::{ConfigFile, ToolInfo};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(
    name = "divergate",
    version,
    about = "Run programs under instrumentation variants and gate on divergence"
)]
struct Cli {
    /// Test declaration file
    #[arg(long, default_value = "tests/config.json")]
    config: PathBuf,

    /// Artifact set to exercise; jars resolve as "<base>-<tag>.jar"
    #[arg(long, default_value = "0.0.1-SNAPSHOT")]
    version_tag: String,

    /// Rebuild the instrumentation artifacts and fixture jars before testing
    #[arg(long, default_value_t = false)]
    build_first: bool,

    /// Instrumentation behavior flavor built by --build-first
    #[arg(long, value_enum, default_value_t = Flavor::Bool)]
    flavor: Flavor,

    /// Serialize the whole suite: one case at a time, variants in order
    #[arg(long, default_value_t = false)]
    safe: bool,

    /// Print every test's variant results, not just unexpected failures
    #[arg(long, default_value_t = false)]
    verbose: bool,

    /// Default per-variant timeout (e.g. "2m"); per-test timeouts override it
    #[arg(long)]
    timeout: Option<String>,

    /// Write a JSON run receipt to this path
    #[arg(long)]
    report_out: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum Flavor {
    Bool,
    Range,
}

impl Flavor {
    fn build_task(self) -> &'static str {
        match self {
            Flavor::Bool => "boolJar",
            Flavor::Range => "rangeJar",
        }
    }
}

fn main() -> ExitCode {
    match real_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn real_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let default_timeout = cli.timeout.as_deref().map(parse_duration).transpose()?;

    let config = read_config(&cli.config)?;
    config.validate().context("invalid test declarations")?;
    let filter =
        OutputFilter::from_config(&config.output_filters).context("invalid output filters")?;

    let config_dir = cli
        .config
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let paths = ResolvedPaths::resolve(&config_dir, &config.paths);

    let runner = SystemProcessRunner;
    if cli.build_first {
        preflight::build_artifacts(&runner, &paths.project, cli.flavor.build_task())?;
        preflight::build_fixture_jars(&runner, &paths.jars)?;
    }

    let artifacts = ArtifactSet::resolve(&paths, &config.tools, &cli.version_tag);
    artifacts.check()?;

    let tests = config.test_cases();
    preflight::check_fixtures(&tests, &paths)?;

    let clock = SystemClock;
    let started_at = clock.now_rfc3339();

    let settings = RunSettings {
        verbose: cli.verbose,
        safe: cli.safe,
        default_timeout,
    };
    let coordinator = RunCoordinator::new(
        runner,
        filter,
        settings,
        paths,
        artifacts,
        config.tools.clone(),
        config.variants.clone(),
    );

    // One cooperative scheduler drives every spawn and wait; only the child
    // processes are truly parallel.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build async runtime")?;
    let (summary, results) = runtime.block_on(coordinator.run_all(tests))?;

    println!("{summary}");

    if let Some(out) = &cli.report_out {
        let receipt = report::build_receipt(&clock, tool_info(), started_at, &results);
        write_json(out, &receipt)?;
    }

    Ok(ExitCode::from(summary.exit_code()))
}

fn tool_info() -> ToolInfo {
    ToolInfo {
        name: "divergate".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    }
}

fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    humantime::parse_duration(s).with_context(|| format!("invalid duration: {s}"))
}

fn read_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse json {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write(path, &bytes)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    use std::io::Write;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = parent.to_path_buf();
    tmp.push(format!(".{}.tmp", uuid::Uuid::new_v4()));

    {
        let mut f =
            fs::File::create(&tmp).with_context(|| format!("create temp {}", tmp.display()))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp {}", tmp.display()))?;
        f.sync_all().ok();
    }

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}
