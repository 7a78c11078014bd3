//! NPS Detractor Attribution - command line entry point
//!
//! Subcommands:
//! - `run`: load a dataset, run inference and write the result files
//! - `check`: resolve and validate priors and inference settings
//! - `priors`: print the built-in priors as JSON

use clap::{Args, Parser, Subcommand};
use npsa_common::{format_error_human, OutputFormat, StructuredError, SCHEMA_VERSION};
use npsa_config::validate::validate_settings;
use npsa_core::config::{load_config, ConfigOptions, Priors, ResolvedConfig};
use npsa_core::exit_codes::ExitCode;
use npsa_core::inference::InferenceEngine;
use npsa_core::io::{load_dataset, DatasetPaths, ResultWriter, RunSummary};
use npsa_core::log_event;
use npsa_core::logging::{
    event_names, generate_run_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use npsa_core::model::ModelBuilder;
use std::io::IsTerminal;
use std::path::PathBuf;

/// NPS detractor attribution: infer which network sites explain detractor responses
#[derive(Parser)]
#[command(name = "npsa")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Stdout format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Override config directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference on a dataset and write the result files
    Run(RunArgs),

    /// Validate configuration files
    Check(CheckArgs),

    /// Print the built-in priors as JSON
    Priors,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Customer-site interactions, one line per customer
    interactions: PathBuf,

    /// Survey responses, one line per customer
    responses: PathBuf,

    /// KPI vectors, one line per site slot
    kpis: PathBuf,

    /// Number of days covered by the KPI file
    num_days: usize,

    /// Number of unique sites per day
    num_unique_sites: usize,

    /// Site labels, one line per site slot
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Output directory for the result files
    #[arg(long, short = 'o', default_value = ".")]
    out: PathBuf,

    /// Sweep budget (overrides inference.json)
    #[arg(long)]
    iterations: Option<u32>,

    /// Stop at the first sweep whose max belief change is below tolerance
    #[arg(long)]
    until_converged: bool,

    /// Convergence tolerance (overrides inference.json)
    #[arg(long)]
    tolerance: Option<f64>,

    /// Message damping in [0, 1) (overrides inference.json)
    #[arg(long)]
    damping: Option<f64>,

    /// Path to priors.json
    #[arg(long)]
    priors: Option<PathBuf>,

    /// Path to inference.json
    #[arg(long)]
    inference: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Path to priors.json
    #[arg(long)]
    priors: Option<PathBuf>,

    /// Path to inference.json
    #[arg(long)]
    inference: Option<PathBuf>,
}

// ============================================================================
// Main entry point
// ============================================================================

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // --help and --version also arrive here, on stdout.
            let code = if err.use_stderr() {
                ExitCode::ArgsError.as_i32()
            } else {
                0
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let result = match &cli.command {
        Commands::Run(args) => run(&cli.global, args),
        Commands::Check(args) => run_check(&cli.global, args),
        Commands::Priors => print_priors(),
    };

    let exit_code = match result {
        Ok(code) => code,
        Err(err) => report_error(&cli.global, &err),
    };
    std::process::exit(exit_code.as_i32());
}

fn report_error(global: &GlobalOpts, err: &npsa_common::Error) -> ExitCode {
    let code = ExitCode::for_error(err);
    match global.format {
        OutputFormat::Json => {
            let structured =
                StructuredError::from(err).with_context("exit_code", code.code_name());
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "error": structured,
            });
            println!("{}", response);
        }
        OutputFormat::Summary | OutputFormat::Exitcode => {}
    }
    eprintln!("{}", format_error_human(err, std::io::stderr().is_terminal()));
    code
}

fn config_options(
    global: &GlobalOpts,
    priors: Option<&PathBuf>,
    inference: Option<&PathBuf>,
) -> ConfigOptions {
    ConfigOptions {
        config_dir: global.config_dir.clone(),
        priors_path: priors.cloned(),
        inference_path: inference.cloned(),
    }
}

/// Apply command-line overrides on top of inference.json and revalidate.
fn apply_overrides(config: &mut ResolvedConfig, args: &RunArgs) -> npsa_common::Result<()> {
    let settings = &mut config.settings;
    if let Some(iterations) = args.iterations {
        settings.iterations = iterations;
    }
    if let Some(tolerance) = args.tolerance {
        settings.tolerance = tolerance;
    }
    if let Some(damping) = args.damping {
        settings.damping = damping;
    }
    if args.until_converged {
        settings.stop_on_convergence = true;
    }
    validate_settings(settings).map_err(|e| npsa_common::Error::InvalidSettings(e.to_string()))?;

    let summary = &mut config.snapshot.summary;
    summary.iterations = settings.iterations;
    summary.tolerance = settings.tolerance;
    summary.damping = settings.damping;
    summary.stop_on_convergence = settings.stop_on_convergence;
    Ok(())
}

// ============================================================================
// Command implementations
// ============================================================================

fn run(global: &GlobalOpts, args: &RunArgs) -> npsa_common::Result<ExitCode> {
    let ctx = LogContext::new(generate_run_id());
    log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "run started");

    let options = config_options(global, args.priors.as_ref(), args.inference.as_ref());
    let mut config = load_config(&options)?;
    apply_overrides(&mut config, args)?;
    let priors_source = config.priors_source().to_string();
    let inference_source = config.inference_source().to_string();
    log_event!(
        ctx,
        INFO,
        event_names::CONFIG_LOADED,
        Stage::Init,
        "configuration loaded",
        priors_source = priors_source.as_str(),
        inference_source = inference_source.as_str(),
        iterations = config.settings.iterations,
        damping = config.settings.damping
    );

    let paths = DatasetPaths {
        interactions: args.interactions.clone(),
        responses: args.responses.clone(),
        kpis: args.kpis.clone(),
        labels: args.labels.clone(),
    };
    let dataset = load_dataset(&paths, args.num_days, args.num_unique_sites)?;
    log_event!(
        ctx,
        INFO,
        event_names::LOAD_FINISHED,
        Stage::Load,
        "inputs loaded",
        num_customers = dataset.num_customers(),
        num_sites = dataset.num_sites(),
        num_labeled = dataset.num_labeled(),
        num_missing = dataset.num_missing()
    );

    let graph = ModelBuilder::new(config.priors.clone()).build(&dataset)?;
    log_event!(
        ctx,
        INFO,
        event_names::MODEL_BUILT,
        Stage::Build,
        "model built",
        num_edges = graph.touches.num_edges(),
        kpi_dimension = graph.kpi_dimension
    );

    let result = InferenceEngine::new(&graph, &config.settings)
        .with_log_context(ctx.clone())
        .run()?;

    let summary = RunSummary::new(
        &ctx.run_id,
        args.num_days,
        args.num_unique_sites,
        &result,
        &config.snapshot,
    );
    let written = ResultWriter::new(&args.out).write(&summary, &result)?;
    let out_dir = args.out.display().to_string();
    log_event!(
        ctx,
        INFO,
        event_names::WRITE_FINISHED,
        Stage::Write,
        "results written",
        files = written.len(),
        out_dir = out_dir.as_str()
    );

    let code = if result.converged {
        ExitCode::Clean
    } else {
        ExitCode::NotConverged
    };
    match global.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Summary => {
            println!(
                "[{}] {}: {} sweeps, max change {:.3e}, weights mean {:.4}",
                ctx.run_id,
                code.code_name(),
                result.iterations,
                result.max_change,
                result.weights.mean()
            );
        }
        OutputFormat::Exitcode => {}
    }
    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Write,
        "run finished",
        exit_code = code.as_i32()
    );
    Ok(code)
}

fn run_check(global: &GlobalOpts, args: &CheckArgs) -> npsa_common::Result<ExitCode> {
    let options = config_options(global, args.priors.as_ref(), args.inference.as_ref());
    let config = load_config(&options)?;

    let path_str = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "ok",
        "checks": [
            {
                "check": "priors",
                "status": "ok",
                "source": config.priors_source().to_string(),
                "path": path_str(&config.paths.priors),
                "kpi_dimension": config.priors.kpi_dimension(),
            },
            {
                "check": "inference",
                "status": "ok",
                "source": config.inference_source().to_string(),
                "path": path_str(&config.paths.inference),
                "iterations": config.settings.iterations,
            },
        ],
        "combined_hash": config.snapshot.combined_hash,
    });

    match global.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Summary => println!(
            "[check] OK: priors from {}, inference from {}",
            config.priors_source(),
            config.inference_source()
        ),
        OutputFormat::Exitcode => {}
    }
    Ok(ExitCode::Clean)
}

fn print_priors() -> npsa_common::Result<ExitCode> {
    let json = Priors::default()
        .to_json_pretty()
        .map_err(|e| npsa_common::Error::InvalidPriors(e.to_string()))?;
    println!("{}", json);
    Ok(ExitCode::Clean)
}
