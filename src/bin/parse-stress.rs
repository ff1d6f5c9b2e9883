//! parse-stress: hammer a JSON parser from many threads and count failures.
//!
//! With no arguments this runs 100 parse tasks on 10 worker threads, all
//! sharing one staged-buffer parser, and prints how many failed and why.
//! Flags switch the parser, the sharing strategy and the workload.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parse_stress::{
    format_probe, probe, ConsoleReporter, HarnessConfig, JsonReporter, MonitoredParser,
    ParserSource, Reporter, SerdeParser, SharedBufferParser, StressHarness, DEFAULT_CHUNK_CHARS,
    DEFAULT_INPUTS,
};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "parse-stress",
    about = "Surface race conditions in a shared JSON parser",
    long_about = "
parse-stress schedules parse tasks onto a thread pool, all calling into a
parser obtained from the selected sharing strategy, and reports how many
succeeded and which errors were captured. The monitored parser logs every
parse start and finish with its thread name; RUST_LOG or --quiet silence it.

Example:
    parse-stress                                  # 100 tasks, 10 workers, shared parser
    parse-stress --sharing per-task               # same workload, no sharing
    parse-stress --tasks 1000 --workers 32 -v     # bigger run with per-task lines
    parse-stress --input '[1,2]' --input '{}'     # custom inputs
    parse-stress probe                            # two-thread interference probe
"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Commands>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Race a nested parse against a delayed simple parse on one parser
    Probe(ProbeArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ParserKind {
    /// Stateless serde_json parser
    Serde,
    /// Parser that stages input in an instance buffer
    SharedBuffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SharingArg {
    /// One instance for every task
    Shared,
    /// A new instance per task
    PerTask,
    /// A fixed pool of instances
    Pooled,
}

#[derive(Debug, Args)]
struct ParserArgs {
    /// Parser implementation under test
    #[arg(long, value_enum, default_value_t = ParserKind::SharedBuffer)]
    parser: ParserKind,

    /// Characters fed per step by the shared-buffer parser
    #[arg(long, default_value_t = DEFAULT_CHUNK_CHARS)]
    chunk_chars: usize,

    /// Don't wrap the parser in the logging monitor
    #[arg(long)]
    no_monitor: bool,
}

#[derive(Debug, Args)]
struct RunArgs {
    // ========================================================================
    // Workload
    // ========================================================================
    /// Number of parse tasks (default: 100, or STRESS_TASKS)
    #[arg(long)]
    tasks: Option<usize>,

    /// Number of worker threads (default: 10, or STRESS_WORKERS)
    #[arg(long)]
    workers: Option<usize>,

    /// Upper bound of the random delay before each parse, in milliseconds
    #[arg(long)]
    max_delay_ms: Option<u64>,

    /// Seed for the delay schedule
    #[arg(long)]
    seed: Option<u64>,

    /// Input document; repeat for several. Defaults to the built-in set.
    #[arg(long = "input")]
    inputs: Vec<String>,

    // ========================================================================
    // Parser Selection
    // ========================================================================
    #[command(flatten)]
    parser: ParserArgs,

    /// How tasks obtain a parser
    #[arg(long, value_enum, default_value_t = SharingArg::Shared)]
    sharing: SharingArg,

    /// Instances in the pool when --sharing pooled
    #[arg(long, default_value_t = 4)]
    pool_size: usize,

    // ========================================================================
    // Output Control
    // ========================================================================
    /// Verbose output (one line per finished task)
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (no console report, no per-parse logging)
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Output directory for JSON reports
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Exit with status 1 if any parse failed
    #[arg(long)]
    fail_on_error: bool,
}

#[derive(Debug, Args)]
struct ProbeArgs {
    #[command(flatten)]
    parser: ParserArgs,

    /// Delay before the second thread starts, in milliseconds
    #[arg(long, default_value_t = 5)]
    delay_ms: u64,
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Some(Commands::Probe(args)) => run_probe(args),
        None => run_stress(cli.run),
    }
}

/// Monitor lines log at `info`, so they show unless `--quiet` is given.
fn log_filter(quiet: bool) -> &'static str {
    if quiet {
        "warn"
    } else {
        "info"
    }
}

fn init_logging(quiet: bool) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(quiet)))
        .init();
}

fn build_parser(args: &ParserArgs) -> Box<dyn parse_stress::Parser> {
    let kind = args.parser;
    let chunk_chars = args.chunk_chars;
    let monitor = !args.no_monitor;
    parser_factory(kind, chunk_chars, monitor)()
}

fn parser_factory(
    kind: ParserKind,
    chunk_chars: usize,
    monitor: bool,
) -> impl Fn() -> Box<dyn parse_stress::Parser> + Send + Sync + 'static {
    move || -> Box<dyn parse_stress::Parser> {
        match (kind, monitor) {
            (ParserKind::Serde, false) => Box::new(SerdeParser::new()),
            (ParserKind::Serde, true) => Box::new(MonitoredParser::new(SerdeParser::new())),
            (ParserKind::SharedBuffer, false) => {
                Box::new(SharedBufferParser::with_chunk_chars(chunk_chars))
            }
            (ParserKind::SharedBuffer, true) => Box::new(MonitoredParser::new(
                SharedBufferParser::with_chunk_chars(chunk_chars),
            )),
        }
    }
}

fn run_stress(args: RunArgs) -> Result<()> {
    if args.verbose && args.quiet {
        bail!("--verbose and --quiet are mutually exclusive");
    }
    init_logging(args.quiet);

    let mut config = HarnessConfig::from_env();
    if let Some(n) = args.tasks {
        config.tasks = n;
    }
    if let Some(n) = args.workers {
        config.workers = n;
    }
    if let Some(ms) = args.max_delay_ms {
        config.max_delay = Duration::from_millis(ms);
    }
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(dir) = args.output_dir.clone() {
        config.output_dir = Some(dir);
    }
    if args.quiet {
        config.verbose = false;
    }

    let inputs: Vec<String> = if args.inputs.is_empty() {
        DEFAULT_INPUTS.iter().map(|s| s.to_string()).collect()
    } else {
        args.inputs.clone()
    };

    let factory = parser_factory(
        args.parser.parser,
        args.parser.chunk_chars,
        !args.parser.no_monitor,
    );
    let source = match args.sharing {
        SharingArg::Shared => ParserSource::shared(factory()),
        SharingArg::PerTask => ParserSource::per_task(factory),
        SharingArg::Pooled => ParserSource::pooled(args.pool_size, factory),
    };

    let output_dir = config.output_dir.clone();
    let mut harness = StressHarness::with_config(config);
    if args.verbose {
        let mut reporters: Vec<Box<dyn Reporter>> =
            vec![Box::new(ConsoleReporter::new().show_tasks(true))];
        if let Some(dir) = output_dir {
            reporters.push(Box::new(JsonReporter::new(dir)));
        }
        harness.reporters(reporters);
    }

    let report = harness
        .run(&inputs, &source)
        .context("stress run aborted")?;

    if args.fail_on_error && !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

fn run_probe(args: ProbeArgs) -> Result<()> {
    init_logging(false);

    let parser = build_parser(&args.parser);
    let report = probe(&parser, Duration::from_millis(args.delay_ms))
        .context("probe aborted")?;

    print!("{}", format_probe(&report));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parse_stress::Parser as _;

    #[test]
    fn should_log_monitor_lines_by_default() {
        assert_eq!(log_filter(false), "info");
    }

    #[test]
    fn should_silence_monitor_lines_when_quiet() {
        assert_eq!(log_filter(true), "warn");
    }

    #[test]
    fn should_monitor_shared_buffer_parser_by_default() {
        let cli = Cli::try_parse_from(["parse-stress"]).unwrap();
        assert!(cli.cmd.is_none());
        assert!(!cli.run.quiet);

        let parser = build_parser(&cli.run.parser);
        assert_eq!(parser.name(), "monitored(shared-buffer)");
    }
}
