//! Core data types for bulk domain checking.
//!
//! This module defines the statuses a domain can settle into, the structured
//! failure carried by an error status, the engine configuration and the
//! registration record returned by lookup backends.

use crate::error::SweepError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a lookup could not be completed.
///
/// The kind alone decides whether the engine retries: see
/// [`FailureKind::is_retryable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connection reset by peer, reported with OS error code 54 (BSD/macOS ECONNRESET)
    PeerReset,

    /// Any other connection reset, abort or broken pipe
    ConnectionReset,

    /// The attempt ran past the backend timeout
    Timeout,

    /// Generic socket-level failure (refused, DNS, unexpected EOF, ...)
    Socket,

    /// The registry asked us to slow down
    RateLimited,

    /// Malformed or unexpected response from the registry
    Protocol,

    /// Retryable failures persisted past the retry budget
    RetriesExhausted,

    /// The worker processing this domain faulted
    Internal,
}

impl FailureKind {
    /// Whether this failure class is a transient network condition.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::PeerReset
                | Self::ConnectionReset
                | Self::Timeout
                | Self::Socket
                | Self::RateLimited
                | Self::RetriesExhausted
        )
    }
}

/// A failed lookup: what kind of failure and the free-text detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl LookupFailure {
    pub fn new<D: Into<String>>(kind: FailureKind, detail: D) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    /// Failure recorded when retries run out.
    ///
    /// The last retryable failure's reason is kept as the detail.
    pub fn retries_exhausted(last: Option<&LookupFailure>) -> Self {
        Self {
            kind: FailureKind::RetriesExhausted,
            detail: last.map(|f| f.reason()).unwrap_or_default(),
        }
    }

    /// Failure recorded when a worker faults while checking a domain.
    pub fn internal<D: Into<String>>(detail: D) -> Self {
        Self::new(FailureKind::Internal, detail)
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Human-readable cause, as written to the errors file.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LookupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::PeerReset => {
                write!(f, "error 54: connection reset by peer - {}", self.detail)
            }
            FailureKind::ConnectionReset => write!(f, "connection reset: {}", self.detail),
            FailureKind::Timeout => write!(f, "timed out: {}", self.detail),
            FailureKind::Socket => write!(f, "socket error: {}", self.detail),
            FailureKind::RateLimited => write!(f, "rate limited: {}", self.detail),
            FailureKind::Protocol => write!(f, "protocol error: {}", self.detail),
            FailureKind::RetriesExhausted if self.detail.is_empty() => {
                write!(f, "max retries exceeded")
            }
            FailureKind::RetriesExhausted => {
                write!(f, "max retries exceeded (last error: {})", self.detail)
            }
            FailureKind::Internal => write!(f, "internal error: {}", self.detail),
        }
    }
}

/// Status of a single domain.
///
/// `Pending` and `Cancelled` only appear in streaming runs: batch results are
/// always `Free`, `Occupied` or `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckStatus {
    /// No registration record found
    Free,

    /// A registration record was found
    Occupied,

    /// The lookup could not be completed
    Error(LookupFailure),

    /// Aborted by the caller before completion
    Cancelled,

    /// Queued but not yet settled
    Pending,
}

impl CheckStatus {
    /// Everything except `Pending` is final.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn failure(&self) -> Option<&LookupFailure> {
        match self {
            Self::Error(failure) => Some(failure),
            _ => None,
        }
    }

    /// Short uppercase label used in console output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Occupied => "OCCUPIED",
            Self::Error(_) => "ERROR",
            Self::Cancelled => "CANCELLED",
            Self::Pending => "PENDING",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Occupied => write!(f, "occupied"),
            Self::Error(failure) => write!(f, "error: {}", failure),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Pending => write!(f, "pending"),
        }
    }
}

/// A domain paired with the status it settled into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// The domain name exactly as submitted
    pub domain: String,

    #[serde(flatten)]
    pub status: CheckStatus,
}

impl CheckResult {
    pub fn new<D: Into<String>>(domain: D, status: CheckStatus) -> Self {
        Self {
            domain: domain.into(),
            status,
        }
    }

    pub(crate) fn pending<D: Into<String>>(domain: D) -> Self {
        Self::new(domain, CheckStatus::Pending)
    }
}

/// Completed/total counters for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.completed, self.total)
    }
}

/// Registration data returned by a successful lookup.
///
/// Backends fill in whatever fields the registry response carries; only
/// `domain_name` and `registry_domain_id` count as identifying.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// Domain name as echoed back by the registry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain_name: Option<String>,

    /// Registry object handle (RDAP `handle`, WHOIS `Registry Domain ID`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_domain_id: Option<String>,

    /// The registrar that manages this domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,

    /// When the domain was first registered
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,

    /// When the domain registration expires
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,

    /// Last update date of the domain record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date: Option<String>,

    /// Nameservers associated with the domain
    #[serde(default)]
    pub name_servers: Vec<String>,

    /// Domain status codes (e.g., "clientTransferProhibited")
    #[serde(default)]
    pub status: Vec<String>,
}

impl RegistrationRecord {
    /// Whether the record names the registered object.
    ///
    /// A successful response without an identifying field is what registries
    /// answer for unregistered names, so callers treat it as free.
    pub fn has_identifying_field(&self) -> bool {
        let present = |field: &Option<String>| {
            field
                .as_deref()
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false)
        };
        present(&self.domain_name) || present(&self.registry_domain_id)
    }
}

/// Settings for a [`CheckEngine`](crate::CheckEngine).
///
/// Fixed for the lifetime of an engine. Use the `with_*` builders and let
/// [`CheckEngine::new`](crate::CheckEngine::new) validate the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Width of the worker pool
    /// Default: 10
    pub max_workers: usize,

    /// Attempts per domain, including the first one
    /// Default: 5
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds (delay = base ^ attempt)
    /// Default: 2.0
    pub base_backoff_seconds: f64,

    /// Add a uniform random extra in `[0, delay)` to every backoff
    /// Default: true
    pub jitter_enabled: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            max_retries: 5,
            base_backoff_seconds: 2.0,
            jitter_enabled: true,
        }
    }
}

impl EngineConfig {
    /// Set the worker pool width.
    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the attempt budget per domain.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff base in seconds.
    pub fn with_backoff(mut self, base_backoff_seconds: f64) -> Self {
        self.base_backoff_seconds = base_backoff_seconds;
        self
    }

    /// Enable or disable backoff jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.jitter_enabled = enabled;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.max_workers == 0 {
            return Err(SweepError::invalid_config(
                "max_workers",
                "must be greater than 0",
            ));
        }

        if self.max_retries == 0 {
            return Err(SweepError::invalid_config(
                "max_retries",
                "must be at least 1",
            ));
        }

        if !self.base_backoff_seconds.is_finite() || self.base_backoff_seconds < 0.0 {
            return Err(SweepError::invalid_config(
                "base_backoff_seconds",
                format!(
                    "must be a non-negative number, got {}",
                    self.base_backoff_seconds
                ),
            ));
        }

        Ok(())
    }
}
