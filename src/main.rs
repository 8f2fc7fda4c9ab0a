//! volley CLI - parallel editor-test orchestrator.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use volley::collector::{CollectOptions, PlanItem, collect};
use volley::config::{self, Config};
use volley::report::{ConsoleReporter, JUnitReporter, MultiReporter};
use volley::session::{Session, SessionOptions};

#[derive(Parser)]
#[command(name = "volley")]
#[command(about = "Parallel test orchestrator for scripted editor tests", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "volley.toml")]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured suites
    Run {
        /// Demote parallel groups to serial execution
        #[arg(long)]
        no_test_parallel: bool,

        /// Demote batched groups to unbatched execution
        #[arg(long)]
        no_test_batch: bool,

        /// Override the parallel editor count
        #[arg(long, value_name = "N")]
        editors_parallel: Option<usize>,

        /// Only run tests whose name contains this substring
        #[arg(short = 'k', long)]
        filter: Option<String>,

        /// JUnit XML output path
        #[arg(long)]
        junit: Option<PathBuf>,

        /// Extra editor arguments, split shell-style
        #[arg(long, value_name = "ARGS")]
        extra_args: Option<String>,
    },

    /// Show the session plan without launching editors
    Collect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Only include tests whose name contains this substring
        #[arg(short = 'k', long)]
        filter: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Write a starter configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run {
            no_test_parallel,
            no_test_batch,
            editors_parallel,
            filter,
            junit,
            extra_args,
        } => {
            run_tests(
                &cli.config,
                no_test_parallel,
                no_test_batch,
                editors_parallel,
                filter,
                junit,
                extra_args,
                cli.verbose,
            )
            .await
        }
        Commands::Collect { format, filter } => collect_tests(&cli.config, &format, filter),
        Commands::Validate => validate_config(&cli.config),
        Commands::Init => init_config(&cli.config),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_tests(
    config_path: &Path,
    no_test_parallel: bool,
    no_test_batch: bool,
    editors_parallel: Option<usize>,
    filter: Option<String>,
    junit: Option<PathBuf>,
    extra_args: Option<String>,
    verbose: bool,
) -> Result<()> {
    let config = load_and_validate(config_path)?;

    let extra_cmdline_args = match extra_args.as_deref() {
        Some(raw) => shell_words::split(raw).context("Failed to parse --extra-args")?,
        None => Vec::new(),
    };

    let options = SessionOptions {
        collect: CollectOptions {
            no_parallel: no_test_parallel,
            no_batch: no_test_batch,
            filter,
        },
        editors_parallel,
        extra_cmdline_args,
    };

    let mut reporter = MultiReporter::new().with_reporter(ConsoleReporter::new(verbose));
    let junit_path = junit.or_else(|| config.report.junit.clone());
    if let Some(path) = junit_path {
        reporter = reporter.with_reporter(JUnitReporter::new(path));
    }

    let session = Session::new(config, options, reporter);
    let result = session.run().await?;

    std::process::exit(result.exit_code());
}

fn collect_tests(config_path: &Path, format: &str, filter: Option<String>) -> Result<()> {
    let config = load_and_validate(config_path)?;
    let options = CollectOptions {
        filter,
        ..Default::default()
    };

    let mut plans = Vec::new();
    for suite in config.build_suites() {
        let plan = collect(&suite, &options)
            .with_context(|| format!("collecting suite '{}'", suite.name))?;
        plans.push(plan);
    }

    match format {
        "json" => {
            let listing: Vec<_> = plans
                .iter()
                .map(|plan| {
                    serde_json::json!({
                        "suite": plan.suite_name,
                        "tests": plan.selected_test_names(),
                        "runners": plan.runners.iter().map(|r| {
                            serde_json::json!({
                                "name": r.name,
                                "mode": r.mode.as_str(),
                                "tests": r.tests.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                            })
                        }).collect::<Vec<_>>(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        _ => {
            for plan in &plans {
                println!(
                    "suite '{}' ({} tests):",
                    plan.suite_name,
                    plan.selected_test_count()
                );
                for item in &plan.items {
                    match item {
                        PlanItem::RunSingle { test } => println!("  {} [single]", test.name),
                        PlanItem::RunShared { runner } => {
                            let group = &plan.runners[*runner];
                            println!("  ({}: {} tests)", group.name, group.tests.len());
                        }
                        PlanItem::Report { test, .. } => println!("  {test}"),
                    }
                }
            }
        }
    }
    Ok(())
}

fn validate_config(config_path: &Path) -> Result<()> {
    let config = load_and_validate(config_path)?;
    let test_count: usize = config.suites.iter().map(|s| s.tests.len()).sum();
    println!(
        "Configuration OK: {} suite(s), {} test(s)",
        config.suites.len(),
        test_count
    );
    Ok(())
}

fn load_and_validate(config_path: &Path) -> Result<Config> {
    let config = config::load_config(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;
    info!("Loaded configuration from {}", config_path.display());
    Ok(config)
}

fn init_config(config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!("{} already exists", config_path.display());
    }

    let template = r#"# volley configuration

[harness]
# 0 = auto (half the CPU count)
parallel_editors = 0
shared_test_timeout_secs = 300
single_test_timeout_secs = 180
# 15 is the host's reserved "test failed" exit code (0x0F)
test_fail_ret_code = 15
crash_dump_timeout_secs = 20

[editor]
executable = "/path/to/engine/bin/Editor"
project_log_root = "/path/to/project/user/log"
log_name = "editor_test.log"
regset = ["/Automation/EnableScriptRunner=true"]

[asset_processor]
enabled = false
# executable = "/path/to/engine/bin/AssetProcessor"
process_name = "AssetProcessor"
engine_process_names = ["Editor", "AssetBuilder"]

[report]
output_dir = "test-results"
# junit = "test-results/junit.xml"

[[suites]]
name = "smoke"

[[suites.tests]]
name = "MeshLoad"
module = "tests/mesh_load.py"
# kind = "shared" (default) with batchable/parallelizable both true

[[suites.tests]]
name = "LightCreation"
module = "tests/light_creation.py"
kind = "single"
timeout_secs = 120
"#;

    std::fs::write(config_path, template)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!("Wrote starter configuration to {}", config_path.display());
    Ok(())
}
