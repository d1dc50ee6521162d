// crates/topgun-cli/src/main.rs
// ============================================================================
// Module: TOPGUN CLI Entry Point
// Description: Operator commands for harness lanes.
// Purpose: Deploy, inspect, and reap lanes outside of a test run.
// Dependencies: clap, thiserror, tokio, topgun-harness, tracing
// ============================================================================

//! ## Overview
//! `topgun` drives the same [`DeploymentController`] the scenario suites use.
//! It is mostly useful for reaping lanes a crashed run left behind, and for
//! inspecting a lane while debugging a scenario.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgMatches;
use clap::Args;
use clap::CommandFactory;
use clap::FromArgMatches;
use clap::Parser;
use clap::Subcommand;
use thiserror::Error;
use topgun_harness::DeployArg;
use topgun_harness::DeploymentController;
use topgun_harness::FlyCli;
use topgun_harness::HarnessConfig;
use topgun_harness::HarnessError;
use topgun_harness::InstanceRegistry;
use topgun_harness::Lane;
use topgun_harness::SessionManager;
use topgun_harness::StepStatus;
use topgun_harness::TeardownCoordinator;
use topgun_harness::TeardownReport;
use topgun_harness::Worker;
use topgun_harness::logging::init_cli_logging;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "topgun", disable_help_subcommand = true)]
struct Cli {
    /// Log at debug level (overridden by `TOPGUN_LOG`).
    #[arg(long, global = true)]
    verbose: bool,
    /// Selected subcommand.
    #[command(subcommand)]
    command: Commands,
}

/// Supported subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Deploy a manifest into a lane.
    Deploy(DeployCommand),
    /// Print the instance registry of a lane.
    Instances(LaneArgs),
    /// Print the live worker listing of a lane.
    Workers(LaneArgs),
    /// Tear down a lane and print the per-step report.
    Reap(LaneArgs),
}

/// Lane selection shared by every subcommand.
#[derive(Args, Debug, Clone, Copy)]
struct LaneArgs {
    /// Lane index; defaults to `TOPGUN_LANE`.
    #[arg(long)]
    lane: Option<u32>,
}

/// Arguments for `deploy`.
#[derive(Args, Debug)]
struct DeployCommand {
    /// Manifest to deploy.
    manifest: PathBuf,
    /// Ops files applied in order.
    #[arg(short = 'o', long = "ops-file", value_name = "FILE")]
    ops_files: Vec<PathBuf>,
    /// Variables as `KEY=VALUE`.
    #[arg(short = 'v', long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,
    /// Lane selection.
    #[command(flatten)]
    lane: LaneArgs,
    /// Command-line order of the `-o` and `-v` occurrences.
    #[arg(skip)]
    order: Vec<DeployFlag>,
}

/// Which repeated deploy flag occupied a command-line slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeployFlag {
    /// `-o`
    OpsFile,
    /// `-v`
    Var,
}

impl DeployCommand {
    /// Records how `-o` and `-v` were interleaved on the command line.
    fn record_order(&mut self, matches: &ArgMatches) {
        let slots = |id: &str, flag: DeployFlag| {
            matches.indices_of(id).into_iter().flatten().map(move |index| (index, flag))
        };
        let mut order: Vec<(usize, DeployFlag)> = slots("ops_files", DeployFlag::OpsFile)
            .chain(slots("vars", DeployFlag::Var))
            .collect();
        order.sort_unstable_by_key(|(index, _)| *index);
        self.order = order.into_iter().map(|(_, flag)| flag).collect();
    }

    /// Renders ops files and variables in command-line order.
    fn deploy_args(&self) -> Vec<DeployArg> {
        let mut ops = self.ops_files.iter().cloned().map(DeployArg::OpsFile);
        let mut vars = self.vars.iter().map(|(key, value)| DeployArg::var(key, value));
        let mut args: Vec<DeployArg> = self
            .order
            .iter()
            .filter_map(|flag| match flag {
                DeployFlag::OpsFile => ops.next(),
                DeployFlag::Var => vars.next(),
            })
            .collect();
        args.extend(ops);
        args.extend(vars);
        args
    }
}

impl Cli {
    /// Parses `args`, keeping the interleaving of repeated deploy flags.
    fn parse_ordered<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        if let (Commands::Deploy(command), Some(("deploy", deploy))) =
            (&mut cli.command, matches.subcommand())
        {
            command.record_order(deploy);
        }
        Ok(cli)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
enum CliError {
    /// Harness operation failed.
    #[error(transparent)]
    Harness(#[from] HarnessError),
    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    /// Teardown completed with failed steps.
    #[error("{0}")]
    Teardown(TeardownReport),
}

/// CLI result alias.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_ordered(std::env::args_os()).unwrap_or_else(|err| err.exit());
    init_cli_logging(cli.verbose);
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "topgun failed");
            let _ = writeln!(std::io::stderr(), "{err}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatches a parsed subcommand.
async fn run(command: Commands) -> CliResult<()> {
    let config = HarnessConfig::load()?;
    match command {
        Commands::Deploy(command) => command_deploy(config, &command).await,
        Commands::Instances(lane) => command_instances(config, lane).await,
        Commands::Workers(lane) => command_workers(config, lane).await,
        Commands::Reap(lane) => command_reap(config, lane).await,
    }
}

/// Builds a controller for the selected lane.
fn controller(config: HarnessConfig, lane: LaneArgs) -> CliResult<DeploymentController> {
    let lane = Lane::new(lane.lane.unwrap_or(config.lane_base));
    let sessions = SessionManager::new();
    let fly = FlyCli::new(&config.fly_binary, lane.fly_target(), sessions.clone());
    Ok(DeploymentController::new(lane, config, sessions)?.with_fly(fly))
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `deploy`.
async fn command_deploy(config: HarnessConfig, command: &DeployCommand) -> CliResult<()> {
    let mut controller = controller(config, command.lane)?;
    let result = controller.deploy(&command.manifest, &command.deploy_args()).await;
    controller.stop_log_tail().await;
    controller.close_datastore().await;
    result?;
    let mut stdout = std::io::stdout().lock();
    write!(stdout, "{}", render_registry(controller.registry()))?;
    if let Some(endpoint) = controller.endpoint() {
        writeln!(stdout, "endpoint: {endpoint}")?;
    }
    Ok(())
}

/// Executes `instances`.
async fn command_instances(config: HarnessConfig, lane: LaneArgs) -> CliResult<()> {
    let mut controller = controller(config, lane)?;
    controller.refresh_registry().await?;
    write!(std::io::stdout().lock(), "{}", render_registry(controller.registry()))?;
    Ok(())
}

/// Executes `workers`.
async fn command_workers(config: HarnessConfig, lane: LaneArgs) -> CliResult<()> {
    let mut controller = controller(config, lane)?;
    controller.attach().await?;
    let workers = controller.client().await?.list_workers().await?;
    write!(std::io::stdout().lock(), "{}", render_workers(&workers))?;
    Ok(())
}

/// Executes `reap`.
async fn command_reap(config: HarnessConfig, lane: LaneArgs) -> CliResult<()> {
    let mut controller = controller(config, lane)?;
    if let Err(err) = controller.attach().await {
        tracing::warn!(error = %err, "lane not reachable; reaping without live API");
    }
    let report = TeardownCoordinator::new().run(&mut controller, &[], None).await;
    write!(std::io::stdout().lock(), "{}", render_report(&report))?;
    if report.is_clean() { Ok(()) } else { Err(CliError::Teardown(report)) }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders one `job  instance  address` line per job placement.
fn render_registry(registry: &InstanceRegistry) -> String {
    let mut out = String::new();
    for job in registry.job_names() {
        for instance in registry.job_instances(job) {
            out.push_str(&format!("{job:<16} {:<48} {}\n", instance.name(), instance.address()));
        }
    }
    out
}

/// Renders one line per worker.
fn render_workers(workers: &[Worker]) -> String {
    workers
        .iter()
        .map(|worker| {
            format!(
                "{:<32} {:<10} {:>4} {}\n",
                worker.name, worker.state, worker.active_containers, worker.garden_addr
            )
        })
        .collect()
}

/// Renders one line per teardown step.
fn render_report(report: &TeardownReport) -> String {
    report
        .steps()
        .iter()
        .map(|step| match &step.status {
            StepStatus::Completed => format!("{:<12} ok\n", step.name),
            StepStatus::Skipped(reason) => format!("{:<12} skipped ({reason})\n", step.name),
            StepStatus::Failed(message) => format!("{:<12} FAILED: {message}\n", step.name),
        })
        .collect()
}

/// Parses a `KEY=VALUE` pair.
fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}
