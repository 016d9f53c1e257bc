//! Single-attempt classification of registry lookups.
//!
//! [`LookupClassifier`] makes exactly one backend call and maps its outcome
//! onto a [`CheckStatus`]. It never retries and never sleeps; the retry loop
//! lives in the engine.

use crate::protocols::{
    LookupError, LookupResponse, RegistryLookup, TransportKind, PEER_RESET_OS_CODE,
};
use crate::types::{CheckStatus, FailureKind, LookupFailure};

/// Turns one lookup call into a status.
#[derive(Debug, Clone)]
pub struct LookupClassifier<L> {
    lookup: L,
}

impl<L: RegistryLookup> LookupClassifier<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// The wrapped backend.
    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Perform a single lookup attempt.
    ///
    /// # Arguments
    ///
    /// * `domain` - The domain name, passed to the backend unchanged
    ///
    /// # Returns
    ///
    /// `Free`, `Occupied` or `Error`. Never `Pending` or `Cancelled`.
    pub async fn classify(&self, domain: &str) -> CheckStatus {
        match self.lookup.lookup(domain).await {
            Ok(response) => classify_response(response),
            Err(err) => CheckStatus::Error(failure_from_error(err)),
        }
    }
}

/// Map a successful lookup onto `Free` or `Occupied`.
pub fn classify_response(response: LookupResponse) -> CheckStatus {
    match response {
        LookupResponse::NotFound => CheckStatus::Free,
        LookupResponse::Found(record) if record.has_identifying_field() => CheckStatus::Occupied,
        LookupResponse::Found(_) => CheckStatus::Free,
    }
}

/// Map a failed lookup onto a structured failure.
pub fn failure_from_error(err: LookupError) -> LookupFailure {
    match err {
        LookupError::Transport {
            kind: TransportKind::ConnectionReset,
            message,
            os_code: Some(PEER_RESET_OS_CODE),
        } => LookupFailure::new(FailureKind::PeerReset, message),
        LookupError::Transport { kind, message, .. } => {
            let kind = match kind {
                TransportKind::ConnectionReset => FailureKind::ConnectionReset,
                TransportKind::Timeout => FailureKind::Timeout,
                TransportKind::Socket => FailureKind::Socket,
                TransportKind::RateLimited => FailureKind::RateLimited,
            };
            LookupFailure::new(kind, message)
        }
        LookupError::Protocol { message } => LookupFailure::new(FailureKind::Protocol, message),
    }
}
