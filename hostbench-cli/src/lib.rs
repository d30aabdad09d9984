#![warn(missing_docs)]
//! Hostbench CLI Library
//!
//! Orchestrates a full suite run on the local host:
//! - Layered settings: `hostbench.toml` defaults, then command-line flags
//! - Console and debug-file logging
//! - Host probing, optional system tuning, run-number bookkeeping
//! - Prerequisite builds, then every benchmark with failure isolation
//! - JSON and text reports in the run directory
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     hostbench_cli::run()
//! }
//! ```

mod config;
mod executor;
mod planner;
mod rundir;
mod tuning;

pub use config::*;
pub use executor::{
    CacheSizes, CpuInfo, ExecutionConfig, Executor, ProbeSources, build_report, parse_cache_size,
    parse_cpuinfo, parse_meminfo, probe_facts, read_caches,
};
pub use planner::{ExecutionPlan, PlannedBenchmark, build_plan};
pub use rundir::{LOCK_FILE, RunDir, next_run_number};
pub use tuning::{
    NOFILE_LIMIT, TuningReport, apply as apply_tuning, disable_hugepages, disable_swap,
    performance_governor, raise_limits,
};

use chrono::Utc;
use clap::{Parser, Subcommand};
use hostbench_core::{
    Environment, HostContext, HttpFetcher, NoQuiesce, Quiesce, ShellRunner, SystemQuiesce,
};
use hostbench_report::{OutputFormat, ReportConfig, format_human_output, generate_json_report};
use hostbench_suite::{DaemonTiming, SuiteOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Hostbench CLI arguments
#[derive(Parser, Debug)]
#[command(name = "hostbench")]
#[command(author, version, about = "Hostbench - repeatable host performance evaluation")]
pub struct Cli {
    /// Optional subcommand (Run, List, Facts, Init); defaults to Run
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Benchmark ids to skip (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',', value_name = "ID")]
    pub exclude: Vec<String>,

    /// Enable AVX-512 code paths in LINPACK and OpenBLAS
    #[arg(long)]
    pub avx512: bool,

    /// Repetitions per benchmark
    #[arg(long)]
    pub repetitions: Option<u32>,

    /// Pause after dropping caches (e.g., "10s", "500ms")
    #[arg(long)]
    pub settle: Option<String>,

    /// Working root holding src/
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Results directory
    #[arg(long)]
    pub results: Option<PathBuf>,

    /// Output format: human, json
    #[arg(long, default_value = "human")]
    pub format: String,

    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Configuration file (discovered from the current directory if not specified)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Do not drop caches or settle before samples
    #[arg(long)]
    pub no_quiesce: bool,

    /// Apply system tuning before the run (requires root)
    #[arg(long)]
    pub tune_system: bool,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the suite (default)
    Run,
    /// List benchmarks and whether they would run
    List,
    /// Print the probed system facts
    Facts,
    /// Print a default hostbench.toml
    Init,
}

/// Effective settings after layering configuration and flags
#[derive(Debug, Clone)]
pub struct Settings {
    /// Repetitions per benchmark
    pub repetitions: u32,
    /// Pause after each quiesce
    pub settle: Duration,
    /// Instances for the concurrent-load benchmark
    pub concurrency: u32,
    /// Quiesce before every sample
    pub quiesce: bool,
    /// Apply system tuning
    pub tune_system: bool,
    /// Results directory
    pub results: PathBuf,
    /// Compiler flags as configured
    pub cflags: String,
    /// AVX-512 code paths enabled
    pub avx512: bool,
    /// Excluded benchmark ids, lowercased and deduplicated
    pub exclude: Vec<String>,
    /// Suite construction options
    pub suite: SuiteOptions,
}

impl Settings {
    /// Layer `hostbench.toml` values, then command-line flags
    pub fn resolve(cli: &Cli, config: &HostbenchConfig) -> anyhow::Result<Self> {
        let runner = &config.runner;
        let settle = match &cli.settle {
            Some(s) => HostbenchConfig::parse_duration(s)?,
            None => HostbenchConfig::parse_duration(&runner.settle)?,
        };
        let repetitions = cli.repetitions.unwrap_or(runner.repetitions);
        if repetitions == 0 {
            anyhow::bail!("repetitions must be at least 1");
        }

        let root = match cli.root.clone().or_else(|| config.paths.root.clone()) {
            Some(root) => root,
            None => std::env::current_dir()?,
        };
        let root = std::path::absolute(root)?;
        let results = match cli.results.clone().or_else(|| config.paths.results.clone()) {
            Some(results) => std::path::absolute(results)?,
            None => std::env::var_os("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| root.clone())
                .join("hostbench_results"),
        };

        let mut exclude: Vec<String> = config
            .suite
            .exclude
            .iter()
            .chain(&cli.exclude)
            .map(|id| id.trim().to_lowercase())
            .filter(|id| !id.is_empty())
            .collect();
        exclude.sort();
        exclude.dedup();

        let daemons = DaemonTiming {
            warmup: HostbenchConfig::parse_duration(&runner.daemon_startup)?,
            grace: HostbenchConfig::parse_duration(&runner.daemon_grace)?,
            ..DaemonTiming::default()
        };
        let mut suite = SuiteOptions::new(root);
        suite.versions = config.versions.clone();
        suite.mlc_url = config.suite.mlc_url.clone();
        if let Some(url) = &config.suite.mkl_url {
            suite.mkl_url = Some(url.clone());
        }
        suite.blis_url = config.suite.blis_url.clone();
        suite.daemons = daemons;

        Ok(Self {
            repetitions,
            settle,
            concurrency: runner.concurrency.max(1),
            quiesce: runner.quiesce && !cli.no_quiesce,
            tune_system: runner.tune_system || cli.tune_system,
            results,
            cflags: config.toolchain.cflags.clone(),
            avx512: config.toolchain.avx512 || cli.avx512,
            exclude,
            suite,
        })
    }
}

/// Run the Hostbench CLI with the process arguments.
///
/// # Returns
/// Returns `Ok(())` on success, or an error if the run could not be set up.
/// Individual benchmark failures are reported, not returned.
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run_with_cli(cli)
}

/// Run the Hostbench CLI with pre-parsed arguments.
pub fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    // Explicit --config wins over discovery
    let config = match &cli.config {
        Some(path) => HostbenchConfig::load(path)?,
        None => HostbenchConfig::discover().unwrap_or_default(),
    };

    match cli.command {
        Some(Commands::Init) => write_output(&cli, &HostbenchConfig::default_toml()),
        Some(Commands::Facts) => {
            init_logging(&cli, None)?;
            let settings = Settings::resolve(&cli, &config)?;
            let facts = probe_facts(&ProbeSources::default(), Some(&settings.cflags));
            write_output(&cli, &format!("{facts}\n"))
        }
        Some(Commands::List) => {
            init_logging(&cli, None)?;
            let settings = Settings::resolve(&cli, &config)?;
            list_benchmarks(&settings);
            Ok(())
        }
        Some(Commands::Run) | None => {
            let settings = Settings::resolve(&cli, &config)?;
            run_suite(&cli, &settings)
        }
    }
}

/// Initialise console logging, plus a debug-level log file when given
fn init_logging(cli: &Cli, debug_log: Option<&Path>) -> anyhow::Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,hostbench={level}")));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter);

    let file = match debug_log {
        Some(path) => {
            let file = std::fs::File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_filter(EnvFilter::new("info,hostbench=debug")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()?;
    Ok(())
}

fn write_output(cli: &Cli, output: &str) -> anyhow::Result<()> {
    if let Some(ref path) = cli.output {
        let mut file = std::fs::File::create(path)?;
        file.write_all(output.as_bytes())?;
        println!("Report written to: {}", path.display());
    } else {
        print!("{}", output);
    }
    Ok(())
}

fn list_benchmarks(settings: &Settings) {
    println!("Hostbench Plan:");

    let plan = build_plan(hostbench_suite::benchmarks(&settings.suite), &settings.exclude);
    let facts = probe_facts(&ProbeSources::default(), Some(&settings.cflags));
    for planned in &plan.benchmarks {
        let mark = if planned.skip { " [excluded]" } else { "" };
        println!(
            "├── {:<12} {}{}",
            planned.benchmark.id(),
            planned.benchmark.name(),
            mark
        );
    }

    let prerequisites =
        hostbench_suite::prerequisites(&settings.suite, &plan.selected_ids(), facts.vendor);
    if !prerequisites.is_empty() {
        let ids: Vec<&str> = prerequisites.iter().map(|p| p.id()).collect();
        println!("Prerequisites: {}", ids.join(", "));
    }
    for unknown in &plan.unknown {
        eprintln!("Warning: excluded id '{}' matches no benchmark", unknown);
    }

    println!("{} of {} benchmarks selected.", plan.selected_count(), plan.benchmarks.len());
}

fn run_suite(cli: &Cli, settings: &Settings) -> anyhow::Result<()> {
    let format: OutputFormat = cli.format.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {e}; using human output");
        OutputFormat::Human
    });
    let started = Utc::now();

    let facts = probe_facts(&ProbeSources::default(), Some(&settings.cflags));
    let run_dir = RunDir::create(&settings.results, &facts.cpu_slug())?;
    init_logging(cli, Some(&run_dir.debug_log()))?;

    tracing::debug!(?settings, "settings");
    tracing::debug!(?facts, "system facts");
    tracing::info!(run = run_dir.number, dir = %run_dir.path.display(), "run directory");

    let env = Environment::inherit();
    let runner = Arc::new(ShellRunner);
    if settings.tune_system {
        apply_tuning(runner.as_ref(), &env);
    }

    let host = HostContext {
        facts: &facts,
        env: &env,
        avx512: settings.avx512,
    };
    let plan = build_plan(hostbench_suite::benchmarks(&settings.suite), &settings.exclude);
    for unknown in &plan.unknown {
        tracing::warn!("excluded id '{unknown}' matches no benchmark");
    }
    let prerequisites =
        hostbench_suite::prerequisites(&settings.suite, &plan.selected_ids(), facts.vendor);

    let quiesce: Box<dyn Quiesce> = if settings.quiesce {
        Box::new(SystemQuiesce::new(settings.settle))
    } else {
        Box::new(NoQuiesce)
    };
    let exec_config = ExecutionConfig {
        repetitions: settings.repetitions,
        concurrency: settings.concurrency,
        overrides: Vec::new(),
        raw_dir: Some(run_dir.raw_dir()),
    };
    let unpacker = Arc::new(hostbench_core::TarUnpacker);
    let executor = Executor::new(
        exec_config,
        Arc::new(HttpFetcher::new()?),
        unpacker,
        runner,
        quiesce,
    );

    println!(
        "Running {} benchmarks ({} repetitions), run {:03}...\n",
        plan.selected_count(),
        settings.repetitions,
        run_dir.number
    );

    let failed = executor.prepare_prerequisites(&host, prerequisites);
    if !failed.is_empty() {
        tracing::warn!("prerequisites failed: {}", failed.join(", "));
    }
    let entries = executor.execute(&host, plan);

    let report_config = ReportConfig {
        repetitions: settings.repetitions,
        concurrency: settings.concurrency,
        settle_ms: settings.settle.as_millis() as u64,
        quiesce: settings.quiesce,
        cflags: host.cflags(),
        avx512: settings.avx512,
        excluded: settings.exclude.clone(),
    };
    let report = build_report(entries, facts.clone(), report_config, started, Some(run_dir.number));

    let json = generate_json_report(&report)?;
    let text = format_human_output(&report);
    std::fs::write(run_dir.results_json(), &json)?;
    std::fs::write(run_dir.results_txt(), &text)?;

    let output = match format {
        OutputFormat::Json => json,
        OutputFormat::Human => text,
    };
    write_output(cli, &output)?;

    println!("\nResults: {}", run_dir.path.display());
    if report.summary.error > 0 {
        eprintln!(
            "{} benchmark(s) failed; see {}",
            report.summary.error,
            run_dir.debug_log().display()
        );
    }
    Ok(())
}
