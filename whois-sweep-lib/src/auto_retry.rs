//! Re-checking domains that ended in an error.
//!
//! Registries that reset connections under load often answer fine a minute
//! later. [`AutoRetry`] waits, resubmits the `Error` subset of a finished
//! pass and folds the new statuses back into the original result list.

use crate::types::{CheckResult, CheckStatus};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::time::Duration;

/// Delay-then-recheck policy for errored domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoRetry {
    /// Wait before every round
    pub delay: Duration,
    /// Upper bound on rounds
    pub max_rounds: u32,
}

impl AutoRetry {
    pub fn new(delay: Duration, max_rounds: u32) -> Self {
        Self { delay, max_rounds }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    /// A zero delay or zero rounds turns the policy off.
    pub fn is_enabled(&self) -> bool {
        !self.delay.is_zero() && self.max_rounds > 0
    }

    /// Run re-check rounds until no errors remain or the round budget is
    /// spent.
    ///
    /// # Arguments
    ///
    /// * `results` - Results of the finished pass, updated in place
    /// * `recheck` - Called with the round number (from 1) and the errored
    ///   domains; returns their new results
    ///
    /// # Returns
    ///
    /// The number of rounds that ran. A round whose results contain
    /// `Cancelled` ends the loop.
    pub async fn run<F, Fut>(&self, results: &mut [CheckResult], mut recheck: F) -> u32
    where
        F: FnMut(u32, Vec<String>) -> Fut,
        Fut: Future<Output = Vec<CheckResult>>,
    {
        if !self.is_enabled() {
            return 0;
        }

        let mut rounds = 0;
        while rounds < self.max_rounds {
            let domains = error_domains(results);
            if domains.is_empty() {
                break;
            }

            rounds += 1;
            tracing::info!(
                round = rounds,
                errors = domains.len(),
                delay = ?self.delay,
                "waiting before re-checking errors"
            );
            tokio::time::sleep(self.delay).await;

            let retried = recheck(rounds, domains).await;
            let cancelled = retried
                .iter()
                .any(|result| result.status == CheckStatus::Cancelled);
            let updated = merge_retried(results, retried);
            tracing::info!(round = rounds, updated, "re-check round finished");

            if cancelled {
                break;
            }
        }

        rounds
    }
}

impl Default for AutoRetry {
    /// One round after 60 seconds.
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 1)
    }
}

/// Domains whose status is `Error`, in result order.
pub fn error_domains(results: &[CheckResult]) -> Vec<String> {
    results
        .iter()
        .filter(|result| result.status.is_error())
        .map(|result| result.domain.clone())
        .collect()
}

/// Fold re-check results into `results`.
///
/// Each retried result replaces the next still-errored entry for the same
/// domain, so duplicates are matched in order. `Cancelled` and `Pending`
/// never overwrite an error. Returns how many entries changed.
pub fn merge_retried(results: &mut [CheckResult], retried: Vec<CheckResult>) -> usize {
    let mut slots: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (index, result) in results.iter().enumerate() {
        if result.status.is_error() {
            slots.entry(result.domain.clone()).or_default().push_back(index);
        }
    }

    let mut updated = 0;
    for result in retried {
        if matches!(result.status, CheckStatus::Cancelled | CheckStatus::Pending) {
            continue;
        }
        let Some(index) = slots
            .get_mut(&result.domain)
            .and_then(|positions| positions.pop_front())
        else {
            continue;
        };

        results[index].status = result.status;
        updated += 1;
    }

    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FailureKind, LookupFailure};

    fn error() -> CheckStatus {
        CheckStatus::Error(LookupFailure::new(FailureKind::Timeout, "stub"))
    }

    fn result(domain: &str, status: CheckStatus) -> CheckResult {
        CheckResult::new(domain, status)
    }

    #[test]
    fn test_disabled_policies() {
        assert!(!AutoRetry::disabled().is_enabled());
        assert!(!AutoRetry::new(Duration::ZERO, 3).is_enabled());
        assert!(!AutoRetry::new(Duration::from_secs(60), 0).is_enabled());
        assert!(AutoRetry::default().is_enabled());
    }

    #[test]
    fn test_error_domains_keeps_duplicates() {
        let results = vec![
            result("a.test", error()),
            result("b.test", CheckStatus::Free),
            result("a.test", error()),
        ];
        assert_eq!(error_domains(&results), vec!["a.test", "a.test"]);
    }

    #[test]
    fn test_merge_matches_duplicates_in_order() {
        let mut results = vec![
            result("a.test", error()),
            result("a.test", CheckStatus::Occupied),
            result("a.test", error()),
            result("b.test", error()),
        ];
        let retried = vec![
            result("a.test", CheckStatus::Free),
            result("b.test", CheckStatus::Cancelled),
            result("a.test", CheckStatus::Occupied),
            result("zzz.test", CheckStatus::Free),
        ];

        assert_eq!(merge_retried(&mut results, retried), 2);
        assert_eq!(results[0].status, CheckStatus::Free);
        assert_eq!(results[1].status, CheckStatus::Occupied);
        assert_eq!(results[2].status, CheckStatus::Occupied);
        assert!(results[3].status.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_when_errors_clear() {
        let mut results = vec![result("a.test", error()), result("b.test", CheckStatus::Free)];
        let mut calls = Vec::new();

        let rounds = AutoRetry::new(Duration::from_secs(60), 5)
            .run(&mut results, |round, domains| {
                calls.push((round, domains.clone()));
                async move {
                    domains
                        .into_iter()
                        .map(|d| CheckResult::new(d, CheckStatus::Free))
                        .collect::<Vec<_>>()
                }
            })
            .await;

        assert_eq!(rounds, 1);
        assert_eq!(calls, vec![(1, vec!["a.test".to_string()])]);
        assert_eq!(results[0].status, CheckStatus::Free);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_respects_round_budget_and_delay() {
        let mut results = vec![result("flaky.test", error())];
        let started = tokio::time::Instant::now();

        let rounds = AutoRetry::new(Duration::from_secs(30), 3)
            .run(&mut results, |_, domains| async move {
                domains
                    .into_iter()
                    .map(|d| CheckResult::new(d, error()))
                    .collect::<Vec<_>>()
            })
            .await;

        assert_eq!(rounds, 3);
        assert!(started.elapsed() >= Duration::from_secs(90));
        assert!(results[0].status.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_round_ends_loop() {
        let mut results = vec![result("a.test", error())];

        let rounds = AutoRetry::new(Duration::from_secs(1), 4)
            .run(&mut results, |_, domains| async move {
                domains
                    .into_iter()
                    .map(|d| CheckResult::new(d, CheckStatus::Cancelled))
                    .collect::<Vec<_>>()
            })
            .await;

        assert_eq!(rounds, 1);
        assert!(results[0].status.is_error());
    }
}
