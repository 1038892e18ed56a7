//! wmc entrypoint: load a `.wir` module, explore it under the configured
//! memory model, and report the verdicts.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use core_config::{BoundType, Config, Model, SchedulePolicy};
use core_driver::{Driver, Report};
use core_ir::{annotate_module, parse_module, Module};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Exit status when at least one verification error was found.
const VERIFICATION_ERROR_EXIT: u8 = 42;

/// CLI arguments. Every flag overrides the corresponding `wmc.toml` key.
#[derive(Parser, Debug)]
#[command(name = "wmc", version, about = "Stateless model checker for weak memory models")]
struct Args {
    /// Input module (.wir textual IR).
    pub input: PathBuf,
    /// Configuration file path (overrides discovery of `wmc.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Memory model: sc | tso | ra | rc11 | imm | lkmm.
    #[arg(long)]
    pub model: Option<Model>,
    /// Scheduling policy: ltr | arbitrary | wf | wfr.
    #[arg(long = "schedule")]
    pub schedule_policy: Option<SchedulePolicy>,
    /// Seed for the seeded scheduling policies.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Exploration bound (requires a bound type unless context is wanted).
    #[arg(long)]
    pub bound: Option<u32>,
    /// Bound flavour: none | context | round.
    #[arg(long = "bound-type")]
    pub bound_type: Option<BoundTypeArg>,
    /// Print the execution graph of each erroneous execution.
    #[arg(long = "dump-graphs")]
    pub dump_graphs: bool,
    /// Stop at the first erroneous execution.
    #[arg(long = "stop-on-first-error")]
    pub stop_on_first_error: bool,
    /// Deduplicate executions of symmetric sibling threads.
    #[arg(long = "symmetry-reduction")]
    pub symmetry_reduction: bool,
    /// Disable in-place revisiting of parked reads.
    #[arg(long = "no-ipr")]
    pub no_ipr: bool,
    /// Disable barrier-aware pruning of parked barrier rotations.
    #[arg(long = "disable-bam")]
    pub disable_bam: bool,
    /// Wall-clock budget in seconds; exceeded budgets yield partial results.
    #[arg(long = "timeout")]
    pub timeout_secs: Option<u64>,
    /// Log to this file instead of stderr.
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// clap-friendly spelling of the bound flavour.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BoundTypeArg {
    None,
    Context,
    Round,
}

impl From<BoundTypeArg> for BoundType {
    fn from(v: BoundTypeArg) -> Self {
        match v {
            BoundTypeArg::None => BoundType::None,
            BoundTypeArg::Context => BoundType::Context,
            BoundTypeArg::Round => BoundType::Round,
        }
    }
}

fn configure_logging(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn build_config(args: &Args) -> Result<Config> {
    let mut file = core_config::load_from(args.config.clone())?;
    if let Some(m) = args.model {
        file.model = Some(m);
    }
    if let Some(p) = args.schedule_policy {
        file.schedule_policy = Some(p);
    }
    if let Some(s) = args.seed {
        file.seed = Some(s);
    }
    if let Some(b) = args.bound {
        file.bound = Some(b);
    }
    if let Some(bt) = args.bound_type {
        file.bound_type = Some(bt.into());
    }
    if args.dump_graphs {
        file.dump_graphs = Some(true);
    }
    if args.stop_on_first_error {
        file.stop_on_first_error = Some(true);
    }
    if args.symmetry_reduction {
        file.symmetry_reduction = Some(true);
    }
    if args.no_ipr {
        file.ipr = Some(false);
    }
    if args.disable_bam {
        file.disable_bam = Some(true);
    }
    if let Some(t) = args.timeout_secs {
        file.timeout_secs = Some(t);
    }
    file.validate()
}

fn load_module(path: &PathBuf) -> Result<Module> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    let mut module = parse_module(&text)?;
    annotate_module(&mut module);
    if let Some(hint) = &module.info.model_hint {
        info!(target: "runtime", hint = %hint, "module_model_hint");
    }
    Ok(module)
}

fn run(args: &Args) -> Result<Report> {
    let config = build_config(args)?;
    let module = load_module(&args.input)?;
    info!(
        target: "runtime",
        input = %args.input.display(),
        model = ?config.model,
        "verification_start"
    );
    Ok(Driver::new(&module, config).explore())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = match configure_logging(args.log_file.as_ref()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("wmc: {e:#}");
            return ExitCode::from(1);
        }
    };
    match run(&args) {
        Ok(report) => {
            println!("{report}");
            if report.errors_found() {
                ExitCode::from(VERIFICATION_ERROR_EXIT)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!(target: "runtime", error = %e, "verification_aborted");
            eprintln!("wmc: {e:#}");
            ExitCode::from(1)
        }
    }
}
