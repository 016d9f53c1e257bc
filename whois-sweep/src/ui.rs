//! Console output for the whois-sweep CLI.
//!
//! Result lines, the batch-mode spinner and the end-of-run summaries. Uses
//! only the `console` crate; colors switch off automatically when stdout is
//! not a terminal, so piped output stays tab-separated plain text.

use console::{style, Term};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use whois_sweep_lib::{CheckResult, CheckStatus, FailureKind, Progress};

use crate::{ErrorStats, RunSummary};

// ── Spinner ──────────────────────────────────────────────────────────────────

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// An async braille-dot spinner that writes to stderr so stdout stays clean.
pub struct Spinner {
    running: Arc<AtomicBool>,
    completed: Arc<AtomicUsize>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl Spinner {
    /// Start a spinner counting towards `total` settled domains.
    ///
    /// Returns `None` when stderr is not a terminal.
    pub fn start(message: String, total: usize) -> Option<Self> {
        if !Term::stderr().is_term() {
            return None;
        }

        let running = Arc::new(AtomicBool::new(true));
        let completed = Arc::new(AtomicUsize::new(0));
        let running_clone = running.clone();
        let completed_clone = completed.clone();

        let handle = tokio::spawn(async move {
            let term = Term::stderr();
            let mut idx = 0usize;
            while running_clone.load(Ordering::Relaxed) {
                let frame = SPINNER_FRAMES[idx % SPINNER_FRAMES.len()];
                let done = completed_clone.load(Ordering::Relaxed);
                let _ = term.clear_line();
                let _ = term.write_str(&format!(
                    "{} {} {}",
                    style(frame).cyan(),
                    message,
                    style(format!("{}/{}", done, total)).dim()
                ));
                idx += 1;
                tokio::time::sleep(Duration::from_millis(80)).await;
            }
            let _ = term.clear_line();
        });

        Some(Self {
            running,
            completed,
            handle: Some(handle),
        })
    }

    /// Record one more settled domain.
    pub fn tick(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Stop the spinner and clear the line.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.await;
        }
    }
}

// ── Result lines ─────────────────────────────────────────────────────────────

/// Plain tab-separated line for one result.
///
/// `FREE\tdomain`, `OCCUPIED\tdomain`, `ERROR\tdomain\treason`.
pub fn result_line(result: &CheckResult) -> String {
    match &result.status {
        CheckStatus::Error(failure) => format!("ERROR\t{}\t{}", result.domain, failure),
        status => format!("{}\t{}", status.label(), result.domain),
    }
}

/// Print one result, optionally prefixed with a `[n/total]` counter.
pub fn print_result(result: &CheckResult, counter: Option<Progress>) {
    let prefix = match counter {
        Some(progress) => format!("{} ", style(format!("[{}]", progress)).dim()),
        None => String::new(),
    };

    let label = result.status.label();
    let label = match result.status {
        CheckStatus::Free => style(label).green().bold(),
        CheckStatus::Occupied => style(label).red().bold(),
        CheckStatus::Error(_) => style(label).yellow(),
        CheckStatus::Cancelled | CheckStatus::Pending => style(label).dim(),
    };

    match &result.status {
        CheckStatus::Error(failure) => println!(
            "{}{}\t{}\t{}",
            prefix,
            label,
            result.domain,
            style(failure).dim()
        ),
        _ => println!("{}{}\t{}", prefix, label, result.domain),
    }
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final summary bar with colored counts.
pub fn print_summary(summary: &RunSummary, duration: Duration) {
    println!(
        "{}",
        style("────────────────────────────────────────────────────").dim()
    );
    let mut line = format!(
        "{} domain{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(summary.total).bold(),
        if summary.total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} free", summary.free)).green(),
        style("|").dim(),
        style(format!("{} occupied", summary.occupied)).red(),
        style("|").dim(),
        style(format!("{} errors", summary.errors)).yellow(),
    );
    if summary.cancelled > 0 {
        line.push_str(&format!(
            "  {}  {}",
            style("|").dim(),
            style(format!("{} cancelled", summary.cancelled)).dim()
        ));
    }
    println!("{}", line);
}

/// Print errors grouped by failure kind.
pub fn print_error_summary(error_stats: &ErrorStats) {
    if !error_stats.has_errors() {
        return;
    }

    println!("{}", style("Some domains could not be checked:").yellow());
    for (kind, domains) in &error_stats.by_kind {
        println!(
            "  {} {} {}: {}",
            style("•").dim(),
            domains.len(),
            kind_label(*kind),
            format_domain_list(domains, 5),
        );
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Join up to `max_show` domains, then "... and N more".
pub fn format_domain_list(domains: &[String], max_show: usize) -> String {
    if domains.len() <= max_show {
        domains.join(", ")
    } else {
        let shown = &domains[..max_show];
        let remaining = domains.len() - max_show;
        format!("{}, ... and {} more", shown.join(", "), remaining)
    }
}

fn kind_label(kind: FailureKind) -> &'static str {
    match kind {
        FailureKind::PeerReset => "peer resets (error 54)",
        FailureKind::ConnectionReset => "connection resets",
        FailureKind::Timeout => "timeouts",
        FailureKind::Socket => "network errors",
        FailureKind::RateLimited => "rate limited",
        FailureKind::Protocol => "protocol errors",
        FailureKind::RetriesExhausted => "retries exhausted",
        FailureKind::Internal => "internal errors",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
