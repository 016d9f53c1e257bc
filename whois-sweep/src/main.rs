//! whois-sweep CLI Application
//!
//! Reads a list of domain names, checks every one against its registry over
//! WHOIS or RDAP and writes free, occupied and errored names to separate
//! result files.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{CommandFactory, Parser};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whois_sweep_lib::{
    error_domains, load_env_config, parse_timeout_string, read_domains, read_domains_file,
    AutoRetry, CheckEngine, CheckResult, CheckStatus, ConfigManager, EngineConfig, EnvConfig,
    FailureKind, FileConfig, LookupProtocol, RegistryBackend, SweepError, MAX_WORKERS,
};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_FREE_FILE: &str = "free_domains.txt";
const DEFAULT_OCCUPIED_FILE: &str = "occupied_domains.txt";
const DEFAULT_ERRORS_FILE: &str = "errors.txt";
const DEFAULT_ALL_FILE: &str = "all_domains.txt";

/// Exit status after Ctrl-C (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;

/// CLI arguments for whois-sweep
#[derive(Parser, Debug)]
#[command(name = "whois-sweep")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check domain availability in bulk over WHOIS or RDAP")]
#[command(
    long_about = "Check domain availability in bulk over WHOIS or RDAP.\n\nReads one domain per line from a file or stdin, retries flaky registry connections with exponential backoff and writes free, occupied and errored domains to separate files."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// File with domains to check, one per line; blank lines and # comments are skipped (default: stdin)
    #[arg(short = 'i', long = "input", value_name = "FILE", help_heading = "Input")]
    pub input: Option<String>,

    /// File for free domains [default: free_domains.txt]
    #[arg(short = 'o', long = "output-free", value_name = "FILE", help_heading = "Output Files")]
    pub output_free: Option<String>,

    /// File for occupied domains [default: occupied_domains.txt]
    #[arg(short = 'b', long = "output-occupied", value_name = "FILE", help_heading = "Output Files")]
    pub output_occupied: Option<String>,

    /// File for errored and cancelled domains [default: errors.txt]
    #[arg(short = 'e', long = "output-errors", value_name = "FILE", help_heading = "Output Files")]
    pub output_errors: Option<String>,

    /// File for every domain with its status [default: all_domains.txt]
    #[arg(short = 'a', long = "output-all", value_name = "FILE", help_heading = "Output Files")]
    pub output_all: Option<String>,

    /// Concurrent lookups [default: 10, max: 500]
    #[arg(short = 't', long = "threads", value_name = "N", help_heading = "Performance")]
    pub threads: Option<usize>,

    /// Attempts per domain on network errors [default: 5]
    #[arg(short = 'r', long = "retries", value_name = "N", help_heading = "Performance")]
    pub retries: Option<u32>,

    /// Base of the exponential backoff in seconds [default: 2]
    #[arg(long = "backoff", value_name = "SECS", help_heading = "Performance")]
    pub backoff: Option<f64>,

    /// Disable random jitter on backoff delays
    #[arg(long = "no-jitter", help_heading = "Performance")]
    pub no_jitter: bool,

    /// Per-attempt timeout, e.g. 500ms, 5s, 2m [default: 10s]
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Lookup protocol: whois or rdap [default: whois]
    #[arg(long = "protocol", value_name = "PROTOCOL", help_heading = "Protocol")]
    pub protocol: Option<LookupProtocol>,

    /// Query this WHOIS server for every domain (host or host:port)
    #[arg(long = "whois-server", value_name = "HOST", help_heading = "Protocol")]
    pub whois_server: Option<String>,

    /// Query this RDAP base URL for every domain
    #[arg(long = "rdap-url", value_name = "URL", help_heading = "Protocol")]
    pub rdap_url: Option<String>,

    /// Seconds to wait before re-checking errors, 0 disables [default: 60]
    #[arg(long = "auto-retry-delay", value_name = "SECS", help_heading = "Auto Retry")]
    pub auto_retry_delay: Option<u64>,

    /// Re-check rounds for errored domains [default: 1]
    #[arg(long = "auto-retry-rounds", value_name = "N", help_heading = "Auto Retry")]
    pub auto_retry_rounds: Option<u32>,

    /// Print final results as JSON to stdout
    #[arg(short = 'j', long = "json", help_heading = "Output Format")]
    pub json: bool,

    /// Collect all results before displaying, with a spinner
    #[arg(long = "batch", help_heading = "Output Format")]
    pub batch: bool,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Print every result and informational logs
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,

    /// Show per-attempt debug logs
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,
}

/// Everything a run needs, after merging CLI, environment and config files.
#[derive(Debug, Clone, PartialEq)]
struct RunSettings {
    engine: EngineConfig,
    timeout: Duration,
    protocol: LookupProtocol,
    whois_server: Option<String>,
    rdap_url: Option<String>,
    auto_retry: AutoRetry,
    outputs: OutputFiles,
    input: Option<String>,
}

/// Result file locations.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutputFiles {
    free: PathBuf,
    occupied: PathBuf,
    errors: PathBuf,
    all: PathBuf,
}

/// Final counts, printed and included in JSON output.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct RunSummary {
    pub(crate) total: usize,
    pub(crate) free: usize,
    pub(crate) occupied: usize,
    pub(crate) errors: usize,
    pub(crate) cancelled: usize,
}

impl RunSummary {
    fn from_results(results: &[CheckResult]) -> Self {
        let mut summary = RunSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match result.status {
                CheckStatus::Free => summary.free += 1,
                CheckStatus::Occupied => summary.occupied += 1,
                CheckStatus::Error(_) => summary.errors += 1,
                CheckStatus::Cancelled | CheckStatus::Pending => summary.cancelled += 1,
            }
        }
        summary
    }
}

/// Errored domains grouped by failure kind, in first-seen order.
#[derive(Debug, Default)]
pub(crate) struct ErrorStats {
    pub(crate) by_kind: Vec<(FailureKind, Vec<String>)>,
}

impl ErrorStats {
    fn from_results(results: &[CheckResult]) -> Self {
        let mut stats = ErrorStats::default();
        for result in results {
            if let Some(failure) = result.status.failure() {
                stats.add_error(&result.domain, failure.kind);
            }
        }
        stats
    }

    fn add_error(&mut self, domain: &str, kind: FailureKind) {
        match self.by_kind.iter_mut().find(|(k, _)| *k == kind) {
            Some((_, domains)) => domains.push(domain.to_string()),
            None => self.by_kind.push((kind, vec![domain.to_string()])),
        }
    }

    fn has_errors(&self) -> bool {
        !self.by_kind.is_empty()
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    summary: &'a RunSummary,
    duration_secs: f64,
    results: &'a [CheckResult],
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_tracing(&args);

    match run_sweep(args).await {
        Ok(0) => {}
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(threads) = args.threads {
        if threads == 0 || threads > MAX_WORKERS {
            return Err(format!("Threads must be between 1 and {}", MAX_WORKERS));
        }
    }

    if args.retries == Some(0) {
        return Err("Retries must be at least 1".to_string());
    }

    if let Some(backoff) = args.backoff {
        if !backoff.is_finite() || backoff < 0.0 {
            return Err("Backoff must be a non-negative number of seconds".to_string());
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use a format like 500ms, 5s or 2m",
                timeout
            ));
        }
    }

    if let Some(url) = &args.rdap_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err("--rdap-url must start with http:// or https://".to_string());
        }
    }

    match args.protocol {
        Some(LookupProtocol::Rdap) if args.whois_server.is_some() => {
            Err("--whois-server cannot be used with --protocol rdap".to_string())
        }
        Some(LookupProtocol::Whois) if args.rdap_url.is_some() => {
            Err("--rdap-url cannot be used with --protocol whois".to_string())
        }
        _ => Ok(()),
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the flags.
fn init_tracing(args: &Args) {
    let level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,whois_sweep={0},whois_sweep_lib={0}",
            level
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main sweep logic. Returns the process exit status.
async fn run_sweep(args: Args) -> Result<i32, Box<dyn std::error::Error>> {
    let env_config = load_env_config();
    let file_config = load_file_config(&args, &env_config, &ConfigManager::new())?;
    let settings = resolve_settings(&args, &env_config, file_config)?;

    let Some(domains) = read_input(settings.input.as_deref())? else {
        Args::command().print_help()?;
        println!("\n\nNote: without --input, domains are read from stdin. Use a pipe or redirect.");
        return Ok(0);
    };
    if domains.is_empty() {
        return Err("No domains provided".into());
    }

    let backend = RegistryBackend::from_settings(
        settings.protocol,
        settings.timeout,
        settings.whois_server.as_deref(),
        settings.rdap_url.as_deref(),
    )?;
    let engine = CheckEngine::new(settings.engine.clone(), backend)?;

    info!(
        domains = domains.len(),
        protocol = %settings.protocol,
        workers = settings.engine.max_workers,
        retries = settings.engine.max_retries,
        "starting sweep"
    );

    let interrupt = spawn_interrupt_listener();
    let start_time = Instant::now();

    let mut results = run_pass(&engine, domains, &args, interrupt.clone()).await;
    let mut interrupted = *interrupt.borrow();

    if !interrupted && settings.auto_retry.is_enabled() {
        let errors = error_domains(&results).len();
        if errors > 0 {
            notice(
                &args,
                &format!(
                    "Found {} errors. Retrying after {} seconds...",
                    errors,
                    settings.auto_retry.delay.as_secs()
                ),
            );

            let engine_ref = &engine;
            let args_ref = &args;
            let retry_interrupt = interrupt.clone();
            let mut stop = interrupt.clone();

            tokio::select! {
                rounds = settings.auto_retry.run(&mut results, move |round, domains| {
                    info!(round, domains = domains.len(), "re-checking errored domains");
                    run_pass(engine_ref, domains, args_ref, retry_interrupt.clone())
                }) => {
                    info!(rounds, "auto-retry finished");
                }
                Ok(_) = stop.wait_for(|stopped| *stopped) => {
                    warn!("interrupted during auto-retry, keeping earlier results");
                }
            }
            interrupted = *interrupt.borrow();
        }
    }

    let duration = start_time.elapsed();
    let summary = RunSummary::from_results(&results);

    write_result_files(&results, &settings.outputs)?;

    if args.json {
        let report = JsonReport {
            summary: &summary,
            duration_secs: duration.as_secs_f64(),
            results: &results,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!();
        ui::print_summary(&summary, duration);

        let error_stats = ErrorStats::from_results(&results);
        if error_stats.has_errors() {
            println!();
            ui::print_error_summary(&error_stats);
        }

        println!(
            "Results saved to {}, {}, {} and {}",
            settings.outputs.free.display(),
            settings.outputs.occupied.display(),
            settings.outputs.errors.display(),
            settings.outputs.all.display()
        );
    }

    Ok(if interrupted { EXIT_INTERRUPTED } else { 0 })
}

/// Load the explicit config file (`--config`, then `WS_CONFIG`), or merge
/// whatever discovery finds.
fn load_file_config(
    args: &Args,
    env_config: &EnvConfig,
    config_manager: &ConfigManager,
) -> Result<FileConfig, Box<dyn std::error::Error>> {
    if let Some(path) = args.config.as_ref().or(env_config.config.as_ref()) {
        info!(path = %path, "using explicit config file");
        let file_config = config_manager
            .load_file(path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?;
        return Ok(file_config);
    }

    Ok(config_manager.discover_and_load())
}

/// Build the run settings.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments
/// 2. Environment variables (WS_*)
/// 3. Config file (explicit, or the merged discovered files)
/// 4. Built-in defaults
fn resolve_settings(
    args: &Args,
    env_config: &EnvConfig,
    file_config: FileConfig,
) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let defaults = file_config.defaults.unwrap_or_default();
    let output = file_config.output.unwrap_or_default();
    let base = EngineConfig::default();
    let retry_base = AutoRetry::default();

    let workers = args
        .threads
        .or(env_config.workers)
        .or(defaults.workers)
        .unwrap_or(base.max_workers);
    let retries = args
        .retries
        .or(env_config.retries)
        .or(defaults.retries)
        .unwrap_or(base.max_retries);
    let backoff = args
        .backoff
        .or(env_config.backoff)
        .or(defaults.backoff)
        .unwrap_or(base.base_backoff_seconds);
    // --no-jitter can only switch jitter off
    let jitter = !args.no_jitter
        && env_config
            .jitter
            .or(defaults.jitter)
            .unwrap_or(base.jitter_enabled);

    let engine = EngineConfig::default()
        .with_workers(workers)
        .with_retries(retries)
        .with_backoff(backoff)
        .with_jitter(jitter);
    engine.validate()?;

    let timeout = match args
        .timeout
        .clone()
        .or_else(|| env_config.timeout.clone())
        .or(defaults.timeout)
    {
        Some(raw) => parse_timeout_string(&raw)
            .ok_or_else(|| SweepError::invalid_config("timeout", format!("'{}'", raw)))?,
        None => DEFAULT_TIMEOUT,
    };

    let auto_retry = AutoRetry::new(
        args.auto_retry_delay
            .or(env_config.auto_retry_delay)
            .or(defaults.auto_retry_delay)
            .map(Duration::from_secs)
            .unwrap_or(retry_base.delay),
        args.auto_retry_rounds
            .or(env_config.auto_retry_rounds)
            .or(defaults.auto_retry_rounds)
            .unwrap_or(retry_base.max_rounds),
    );

    Ok(RunSettings {
        engine,
        timeout,
        protocol: args
            .protocol
            .or(env_config.protocol)
            .or(defaults.protocol)
            .unwrap_or_default(),
        whois_server: args
            .whois_server
            .clone()
            .or_else(|| env_config.whois_server.clone())
            .or(defaults.whois_server),
        rdap_url: args
            .rdap_url
            .clone()
            .or_else(|| env_config.rdap_url.clone())
            .or(defaults.rdap_url),
        auto_retry,
        outputs: OutputFiles {
            free: output_path(&args.output_free, output.free, DEFAULT_FREE_FILE),
            occupied: output_path(&args.output_occupied, output.occupied, DEFAULT_OCCUPIED_FILE),
            errors: output_path(&args.output_errors, output.errors, DEFAULT_ERRORS_FILE),
            all: output_path(&args.output_all, output.all, DEFAULT_ALL_FILE),
        },
        input: args.input.clone().or_else(|| env_config.input.clone()),
    })
}

fn output_path(cli: &Option<String>, file: Option<String>, default: &str) -> PathBuf {
    PathBuf::from(
        cli.clone()
            .or(file)
            .unwrap_or_else(|| default.to_string()),
    )
}

/// Read the domain list from `input`, or from stdin when it is piped.
///
/// Returns `None` when there is no input file and stdin is a terminal.
fn read_input(input: Option<&str>) -> Result<Option<Vec<String>>, SweepError> {
    if let Some(path) = input {
        return read_domains_file(path).map(Some);
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    eprintln!("Reading domains from stdin...");
    read_domains(stdin.lock()).map(Some)
}

/// Flip the returned receiver to `true` on the first Ctrl-C; a second
/// Ctrl-C exits immediately.
fn spawn_interrupt_listener() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupt received, cancelling remaining domains (Ctrl-C again to quit)");
        let _ = tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            process::exit(EXIT_INTERRUPTED);
        }
    });
    rx
}

/// Check one list of domains in the mode selected on the command line.
async fn run_pass(
    engine: &CheckEngine<RegistryBackend>,
    domains: Vec<String>,
    args: &Args,
    interrupt: watch::Receiver<bool>,
) -> Vec<CheckResult> {
    if args.batch {
        run_batch_check(engine, &domains, args, interrupt).await
    } else {
        run_streaming_check(engine, domains, args, interrupt).await
    }
}

/// Run in streaming mode, printing each result with a `[n/total]` counter
/// as it settles.
async fn run_streaming_check(
    engine: &CheckEngine<RegistryBackend>,
    domains: Vec<String>,
    args: &Args,
    mut interrupt: watch::Receiver<bool>,
) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(domains.len());
    let mut scan = engine.start(domains);
    let control = scan.control();

    let mut cancelled = *interrupt.borrow();
    if cancelled {
        control.cancel();
    }

    loop {
        tokio::select! {
            event = scan.next_event() => match event {
                Some(event) => {
                    if !args.json {
                        ui::print_result(&event.result, Some(event.progress));
                    }
                    results.push(event.result);
                }
                None => break,
            },
            Ok(_) = interrupt.wait_for(|stopped| *stopped), if !cancelled => {
                control.cancel();
                cancelled = true;
            }
        }
    }

    results
}

/// Run in batch mode: collect everything behind a spinner.
///
/// On Ctrl-C the domains that had not settled are reported as cancelled.
async fn run_batch_check(
    engine: &CheckEngine<RegistryBackend>,
    domains: &[String],
    args: &Args,
    mut interrupt: watch::Receiver<bool>,
) -> Vec<CheckResult> {
    // Spinner::start returns None if stderr isn't a TTY
    let spinner = if args.json || args.verbose {
        None
    } else {
        ui::Spinner::start(format!("Checking {} domains...", domains.len()), domains.len())
    };

    let mut settled = Vec::with_capacity(domains.len());
    let finished = {
        let check = engine.check_domains_with(domains, |result| {
            if let Some(spinner) = &spinner {
                spinner.tick();
            }
            if args.verbose && !args.json {
                ui::print_result(result, None);
            }
            settled.push(result.clone());
        });

        tokio::select! {
            results = check => Some(results),
            Ok(_) = interrupt.wait_for(|stopped| *stopped) => None,
        }
    };

    if let Some(spinner) = spinner {
        spinner.stop().await;
    }

    match finished {
        Some(results) => results,
        None => fill_cancelled(domains, settled),
    }
}

/// Append a `Cancelled` result for every submitted domain that has not
/// settled, counting duplicates.
fn fill_cancelled(domains: &[String], mut settled: Vec<CheckResult>) -> Vec<CheckResult> {
    let mut outstanding: HashMap<&str, usize> = HashMap::new();
    for domain in domains {
        *outstanding.entry(domain.as_str()).or_default() += 1;
    }
    for result in &settled {
        if let Some(count) = outstanding.get_mut(result.domain.as_str()) {
            *count = count.saturating_sub(1);
        }
    }

    for domain in domains {
        if let Some(count) = outstanding.get_mut(domain.as_str()) {
            if *count > 0 {
                *count -= 1;
                settled.push(CheckResult::new(domain.clone(), CheckStatus::Cancelled));
            }
        }
    }

    settled
}

/// Status messages go to stdout, or stderr when stdout carries JSON.
fn notice(args: &Args, message: &str) {
    if args.json {
        eprintln!("{}", message);
    } else {
        println!("{}", message);
    }
}

/// Write (overwrite) the four result files in result order.
///
/// Free and occupied files list bare domains. The errors file gets
/// `domain\tstatus` for errored and cancelled domains; the all file gets
/// `domain\tstatus` for every domain.
fn write_result_files(results: &[CheckResult], outputs: &OutputFiles) -> Result<(), SweepError> {
    let mut free = ResultFile::create(&outputs.free)?;
    let mut occupied = ResultFile::create(&outputs.occupied)?;
    let mut errors = ResultFile::create(&outputs.errors)?;
    let mut all = ResultFile::create(&outputs.all)?;

    for result in results {
        all.write_line(format_args!("{}\t{}", result.domain, result.status))?;
        match &result.status {
            CheckStatus::Free => free.write_line(format_args!("{}", result.domain))?,
            CheckStatus::Occupied => occupied.write_line(format_args!("{}", result.domain))?,
            status => errors.write_line(format_args!("{}\t{}", result.domain, status))?,
        }
    }

    free.finish()?;
    occupied.finish()?;
    errors.finish()?;
    all.finish()
}

/// A buffered result file that reports its path on failure.
struct ResultFile {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ResultFile {
    fn create(path: &Path) -> Result<Self, SweepError> {
        let file = File::create(path).map_err(|e| write_error(path, e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    fn write_line(&mut self, line: std::fmt::Arguments<'_>) -> Result<(), SweepError> {
        writeln!(self.writer, "{}", line).map_err(|e| write_error(&self.path, e))
    }

    fn finish(mut self) -> Result<(), SweepError> {
        self.writer.flush().map_err(|e| write_error(&self.path, e))
    }
}

fn write_error(path: &Path, err: std::io::Error) -> SweepError {
    SweepError::file_error(path.to_string_lossy(), format!("Cannot write results: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use whois_sweep_lib::{DefaultsConfig, LookupFailure, OutputConfig};

    // Helper function with all required fields
    fn create_test_args() -> Args {
        Args {
            input: None,
            output_free: None,
            output_occupied: None,
            output_errors: None,
            output_all: None,
            threads: None,
            retries: None,
            backoff: None,
            no_jitter: false,
            timeout: None,
            protocol: None,
            whois_server: None,
            rdap_url: None,
            auto_retry_delay: None,
            auto_retry_rounds: None,
            json: false,
            batch: false,
            config: None,
            verbose: false,
            debug: false,
        }
    }

    fn error(kind: FailureKind) -> CheckStatus {
        CheckStatus::Error(LookupFailure::new(kind, "stub"))
    }

    #[test]
    fn test_parse_short_flags() {
        let args = Args::try_parse_from([
            "whois-sweep",
            "-i",
            "domains.txt",
            "-o",
            "f.txt",
            "-b",
            "o.txt",
            "-e",
            "e.txt",
            "-a",
            "all.txt",
            "-t",
            "25",
            "-r",
            "3",
            "--protocol",
            "rdap",
        ])
        .unwrap();

        assert_eq!(args.input.as_deref(), Some("domains.txt"));
        assert_eq!(args.output_free.as_deref(), Some("f.txt"));
        assert_eq!(args.output_occupied.as_deref(), Some("o.txt"));
        assert_eq!(args.output_errors.as_deref(), Some("e.txt"));
        assert_eq!(args.output_all.as_deref(), Some("all.txt"));
        assert_eq!(args.threads, Some(25));
        assert_eq!(args.retries, Some(3));
        assert_eq!(args.protocol, Some(LookupProtocol::Rdap));
    }

    #[test]
    fn test_unknown_protocol_is_rejected_by_parser() {
        assert!(Args::try_parse_from(["whois-sweep", "--protocol", "gopher"]).is_err());
    }

    #[test]
    fn test_validate_args_defaults() {
        assert!(validate_args(&create_test_args()).is_ok());
    }

    #[test]
    fn test_validate_args_thread_bounds() {
        let mut args = create_test_args();
        args.threads = Some(0);
        assert!(validate_args(&args).is_err());

        args.threads = Some(MAX_WORKERS + 1);
        assert!(validate_args(&args).is_err());

        args.threads = Some(MAX_WORKERS);
        assert!(validate_args(&args).is_ok());
    }

    #[test]
    fn test_validate_args_rejects_bad_values() {
        let mut args = create_test_args();
        args.retries = Some(0);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.backoff = Some(-2.0);
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.timeout = Some("soon".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.rdap_url = Some("ftp://rdap.test".to_string());
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_validate_args_protocol_conflicts() {
        let mut args = create_test_args();
        args.protocol = Some(LookupProtocol::Rdap);
        args.whois_server = Some("whois.test".to_string());
        assert!(validate_args(&args).is_err());

        let mut args = create_test_args();
        args.protocol = Some(LookupProtocol::Whois);
        args.rdap_url = Some("https://rdap.test/".to_string());
        assert!(validate_args(&args).is_err());
    }

    #[test]
    fn test_resolve_settings_defaults() {
        let settings =
            resolve_settings(&create_test_args(), &EnvConfig::default(), FileConfig::default())
                .unwrap();

        assert_eq!(settings.engine, EngineConfig::default());
        assert_eq!(settings.timeout, DEFAULT_TIMEOUT);
        assert_eq!(settings.protocol, LookupProtocol::Whois);
        assert_eq!(settings.auto_retry, AutoRetry::default());
        assert_eq!(settings.outputs.free, PathBuf::from("free_domains.txt"));
        assert_eq!(settings.outputs.occupied, PathBuf::from("occupied_domains.txt"));
        assert_eq!(settings.outputs.errors, PathBuf::from("errors.txt"));
        assert_eq!(settings.outputs.all, PathBuf::from("all_domains.txt"));
        assert_eq!(settings.input, None);
    }

    #[test]
    fn test_resolve_settings_precedence() {
        let file_config = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(30),
                retries: Some(7),
                backoff: Some(3.0),
                timeout: Some("20s".to_string()),
                auto_retry_rounds: Some(4),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                free: Some("file-free.txt".to_string()),
                errors: Some("file-errors.txt".to_string()),
                ..Default::default()
            }),
        };
        let env_config = EnvConfig {
            workers: Some(40),
            retries: Some(6),
            timeout: Some("15s".to_string()),
            ..Default::default()
        };
        let mut args = create_test_args();
        args.threads = Some(50);
        args.output_free = Some("cli-free.txt".to_string());

        let settings = resolve_settings(&args, &env_config, file_config).unwrap();

        // CLI beats env, env beats file, file beats defaults
        assert_eq!(settings.engine.max_workers, 50);
        assert_eq!(settings.engine.max_retries, 6);
        assert_eq!(settings.engine.base_backoff_seconds, 3.0);
        assert_eq!(settings.timeout, Duration::from_secs(15));
        assert_eq!(settings.auto_retry.max_rounds, 4);
        assert_eq!(settings.auto_retry.delay, Duration::from_secs(60));
        assert_eq!(settings.outputs.free, PathBuf::from("cli-free.txt"));
        assert_eq!(settings.outputs.errors, PathBuf::from("file-errors.txt"));
        assert_eq!(settings.outputs.all, PathBuf::from("all_domains.txt"));
    }

    #[test]
    fn test_no_jitter_flag_only_disables() {
        let env_config = EnvConfig {
            jitter: Some(true),
            ..Default::default()
        };
        let mut args = create_test_args();
        args.no_jitter = true;
        let settings = resolve_settings(&args, &env_config, FileConfig::default()).unwrap();
        assert!(!settings.engine.jitter_enabled);

        let file_config = FileConfig {
            defaults: Some(DefaultsConfig {
                jitter: Some(false),
                ..Default::default()
            }),
            output: None,
        };
        let settings =
            resolve_settings(&create_test_args(), &EnvConfig::default(), file_config).unwrap();
        assert!(!settings.engine.jitter_enabled);
    }

    #[test]
    fn test_input_falls_back_to_env() {
        let env_config = EnvConfig {
            input: Some("env-domains.txt".to_string()),
            protocol: Some(LookupProtocol::Rdap),
            ..Default::default()
        };
        let settings =
            resolve_settings(&create_test_args(), &env_config, FileConfig::default()).unwrap();
        assert_eq!(settings.input.as_deref(), Some("env-domains.txt"));
        assert_eq!(settings.protocol, LookupProtocol::Rdap);
    }

    #[test]
    fn test_zero_auto_retry_delay_disables() {
        let mut args = create_test_args();
        args.auto_retry_delay = Some(0);
        let settings = resolve_settings(&args, &EnvConfig::default(), FileConfig::default()).unwrap();
        assert!(!settings.auto_retry.is_enabled());
    }

    #[test]
    fn test_explicit_config_file_errors_are_fatal() {
        let mut args = create_test_args();
        args.config = Some("/no/such/whois-sweep.toml".to_string());
        let manager = ConfigManager::with_dirs(PathBuf::from("."), None, None);
        assert!(load_file_config(&args, &EnvConfig::default(), &manager).is_err());
    }

    #[test]
    fn test_explicit_config_file_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        fs::write(&path, "[defaults]\nworkers = 12\n").unwrap();

        let env_config = EnvConfig {
            config: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        };
        let manager = ConfigManager::with_dirs(dir.path().to_path_buf(), None, None);
        let file_config = load_file_config(&create_test_args(), &env_config, &manager).unwrap();
        assert_eq!(file_config.defaults.unwrap().workers, Some(12));
    }

    #[test]
    fn test_run_summary_counts() {
        let results = vec![
            CheckResult::new("a.test", CheckStatus::Free),
            CheckResult::new("b.test", CheckStatus::Occupied),
            CheckResult::new("c.test", error(FailureKind::Timeout)),
            CheckResult::new("d.test", CheckStatus::Cancelled),
            CheckResult::new("e.test", CheckStatus::Free),
        ];
        assert_eq!(
            RunSummary::from_results(&results),
            RunSummary {
                total: 5,
                free: 2,
                occupied: 1,
                errors: 1,
                cancelled: 1,
            }
        );
    }

    #[test]
    fn test_error_stats_grouping() {
        let results = vec![
            CheckResult::new("a.test", error(FailureKind::RetriesExhausted)),
            CheckResult::new("b.test", CheckStatus::Free),
            CheckResult::new("c.test", error(FailureKind::Protocol)),
            CheckResult::new("d.test", error(FailureKind::RetriesExhausted)),
        ];
        let stats = ErrorStats::from_results(&results);

        assert!(stats.has_errors());
        assert_eq!(stats.by_kind.len(), 2);
        assert_eq!(stats.by_kind[0].0, FailureKind::RetriesExhausted);
        assert_eq!(stats.by_kind[0].1, vec!["a.test", "d.test"]);
        assert_eq!(stats.by_kind[1].1, vec!["c.test"]);
        assert!(!ErrorStats::default().has_errors());
    }

    #[test]
    fn test_fill_cancelled_counts_duplicates() {
        let domains: Vec<String> = ["a.test", "b.test", "a.test", "c.test"]
            .iter()
            .map(|d| d.to_string())
            .collect();
        let settled = vec![CheckResult::new("a.test", CheckStatus::Free)];

        let results = fill_cancelled(&domains, settled);

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].status, CheckStatus::Free);
        let cancelled: Vec<&str> = results[1..].iter().map(|r| r.domain.as_str()).collect();
        assert_eq!(cancelled, vec!["b.test", "a.test", "c.test"]);
        assert!(results[1..]
            .iter()
            .all(|r| r.status == CheckStatus::Cancelled));
    }

    #[test]
    fn test_write_result_files() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputFiles {
            free: dir.path().join("free.txt"),
            occupied: dir.path().join("occupied.txt"),
            errors: dir.path().join("errors.txt"),
            all: dir.path().join("all.txt"),
        };
        fs::write(&outputs.free, "stale.test\n").unwrap();

        let results = vec![
            CheckResult::new("taken1.test", CheckStatus::Occupied),
            CheckResult::new("free1.test", CheckStatus::Free),
            CheckResult::new(
                "flaky1.test",
                CheckStatus::Error(LookupFailure::new(FailureKind::Protocol, "garbled")),
            ),
            CheckResult::new("late.test", CheckStatus::Cancelled),
        ];
        write_result_files(&results, &outputs).unwrap();

        assert_eq!(fs::read_to_string(&outputs.free).unwrap(), "free1.test\n");
        assert_eq!(
            fs::read_to_string(&outputs.occupied).unwrap(),
            "taken1.test\n"
        );
        assert_eq!(
            fs::read_to_string(&outputs.errors).unwrap(),
            "flaky1.test\terror: protocol error: garbled\nlate.test\tcancelled\n"
        );
        assert_eq!(
            fs::read_to_string(&outputs.all).unwrap(),
            "taken1.test\toccupied\nfree1.test\tfree\nflaky1.test\terror: protocol error: garbled\nlate.test\tcancelled\n"
        );
    }

    #[test]
    fn test_write_result_files_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = OutputFiles {
            free: dir.path().join("missing").join("free.txt"),
            occupied: dir.path().join("occupied.txt"),
            errors: dir.path().join("errors.txt"),
            all: dir.path().join("all.txt"),
        };
        let err = write_result_files(&[], &outputs).unwrap_err();
        assert!(err.to_string().contains("free.txt"));
    }
}
