//! The concurrent checking engine.
//!
//! [`CheckEngine`] drives a [`LookupClassifier`] for every submitted domain
//! on a fixed pool of tokio tasks, retrying transient failures with
//! exponential backoff. Results can be collected in one go
//! ([`check_domains`](CheckEngine::check_domains)) or consumed as they settle
//! ([`start`](CheckEngine::start)).

use crate::classifier::LookupClassifier;
use crate::concurrent::{ScanControl, ScanHandle};
use crate::error::SweepError;
use crate::protocols::RegistryLookup;
use crate::types::{CheckResult, CheckStatus, EngineConfig, LookupFailure};
use futures::FutureExt;
use rand::Rng;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bulk domain checker with bounded parallelism and retry.
///
/// The configuration is fixed at construction. An engine can run any number
/// of consecutive batches or streaming runs.
///
/// # Example
///
/// ```rust,no_run
/// use whois_sweep_lib::{CheckEngine, EngineConfig, WhoisLookup};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = CheckEngine::new(EngineConfig::default(), WhoisLookup::new())?;
///     let domains = vec!["example.com".to_string(), "surely-free-1234.com".to_string()];
///
///     for result in engine.check_domains(&domains).await {
///         println!("{}\t{}", result.domain, result.status);
///     }
///     Ok(())
/// }
/// ```
pub struct CheckEngine<L> {
    /// Settings for this engine instance
    config: EngineConfig,
    /// Shared with every worker task
    classifier: Arc<LookupClassifier<L>>,
}

impl<L> Clone for CheckEngine<L> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<L: RegistryLookup> CheckEngine<L> {
    /// Create an engine around a lookup backend.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::InvalidConfig` if the worker count or retry count
    /// is zero, or the backoff base is negative or not finite.
    pub fn new(config: EngineConfig, lookup: L) -> Result<Self, SweepError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Arc::new(LookupClassifier::new(lookup)),
        })
    }

    /// Engine with different settings sharing this engine's backend.
    pub fn with_config(&self, config: EngineConfig) -> Result<Self, SweepError> {
        config.validate()?;
        Ok(Self {
            config,
            classifier: Arc::clone(&self.classifier),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn classifier(&self) -> &LookupClassifier<L> {
        &self.classifier
    }

    /// Check one domain, retrying transient failures.
    ///
    /// Runs on the calling task; no worker pool is involved.
    pub async fn check_domain(&self, domain: &str) -> CheckStatus {
        run_attempts(&self.classifier, &self.config, domain, None).await
    }

    /// Check a batch and wait for every result.
    ///
    /// # Arguments
    ///
    /// * `domains` - Domain names, duplicates allowed
    ///
    /// # Returns
    ///
    /// One result per submitted domain, in completion order.
    pub async fn check_domains(&self, domains: &[String]) -> Vec<CheckResult> {
        self.check_domains_with(domains, |_| {}).await
    }

    /// Check a batch, calling `on_result` as each domain settles.
    ///
    /// The callback runs on the calling task, one result at a time. A
    /// panicking callback is logged and does not affect the run.
    pub async fn check_domains_with<F>(&self, domains: &[String], mut on_result: F) -> Vec<CheckResult>
    where
        F: FnMut(&CheckResult),
    {
        let mut handle = self.start(domains.to_vec());
        let mut results = Vec::with_capacity(domains.len());

        while let Some(event) = handle.next_event().await {
            let callback = std::panic::catch_unwind(AssertUnwindSafe(|| on_result(&event.result)));
            if let Err(panic) = callback {
                warn!(
                    domain = %event.result.domain,
                    panic = %panic_message(panic.as_ref()),
                    "result callback panicked"
                );
            }
            results.push(event.result);
        }

        results
    }

    /// Start a streaming run and return immediately.
    ///
    /// Spawns `min(max_workers, domains.len())` worker tasks on the current
    /// tokio runtime. Must be called from within a runtime.
    pub fn start(&self, domains: Vec<String>) -> ScanHandle {
        let (control, events) = ScanControl::new(&domains);
        let workers = self.config.max_workers.min(domains.len());

        info!(
            domains = domains.len(),
            workers,
            max_retries = self.config.max_retries,
            "starting scan"
        );

        for worker_id in 0..workers {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.classifier),
                self.config.clone(),
                control.clone(),
            ));
        }

        ScanHandle::new(control, events)
    }
}

/// One pool task: take domains until the queue is empty or the run is
/// cancelled.
async fn worker_loop<L: RegistryLookup>(
    worker_id: usize,
    classifier: Arc<LookupClassifier<L>>,
    config: EngineConfig,
    control: ScanControl,
) {
    loop {
        if !control.checkpoint().await {
            break;
        }
        let Some((index, domain)) = control.next_job() else {
            break;
        };

        let attempt = run_attempts(&classifier, &config, &domain, Some(&control));
        let status = match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(status) => status,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(worker_id, domain = %domain, panic = %message, "lookup panicked");
                CheckStatus::Error(LookupFailure::internal(message))
            }
        };

        control.record(index, status);
    }

    debug!(worker_id, "worker finished");
}

/// Full attempt loop for one domain.
///
/// Makes at most `max_retries` attempts. Non-retryable outcomes return
/// immediately; there is no sleep after the final attempt. With a control
/// handle the loop honors pause at every attempt boundary and returns
/// `Cancelled` as soon as the run is cancelled.
pub(crate) async fn run_attempts<L: RegistryLookup>(
    classifier: &LookupClassifier<L>,
    config: &EngineConfig,
    domain: &str,
    control: Option<&ScanControl>,
) -> CheckStatus {
    let mut last_failure: Option<LookupFailure> = None;

    for attempt in 0..config.max_retries {
        if let Some(control) = control {
            if !control.checkpoint().await {
                return CheckStatus::Cancelled;
            }
        }

        debug!(domain, attempt = attempt + 1, of = config.max_retries, "lookup attempt");
        let failure = match classifier.classify(domain).await {
            CheckStatus::Error(failure) if failure.is_retryable() => failure,
            settled => return settled,
        };

        if attempt + 1 >= config.max_retries {
            last_failure = Some(failure);
            break;
        }

        let delay = {
            let mut rng = rand::thread_rng();
            backoff_delay(config, attempt, &mut rng)
        };
        info!(
            domain,
            attempt = attempt + 1,
            error = %failure,
            delay = ?delay,
            "retryable failure, backing off"
        );
        last_failure = Some(failure);

        match control {
            Some(control) => {
                if !control.checkpoint().await || !control.sleep(delay).await {
                    return CheckStatus::Cancelled;
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }

    let exhausted = LookupFailure::retries_exhausted(last_failure.as_ref());
    warn!(domain, reason = %exhausted, "giving up");
    CheckStatus::Error(exhausted)
}

/// Delay before the retry that follows attempt number `attempt` (from 0).
///
/// `base ^ attempt` seconds, plus a uniform extra in `[0, delay)` when
/// jitter is enabled. Saturates at `Duration::MAX`.
pub fn backoff_delay<R: Rng + ?Sized>(config: &EngineConfig, attempt: u32, rng: &mut R) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let mut seconds = config.base_backoff_seconds.powi(exponent);

    if config.jitter_enabled && seconds > 0.0 && seconds.is_finite() {
        seconds += rng.gen_range(0.0..seconds);
    }

    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
