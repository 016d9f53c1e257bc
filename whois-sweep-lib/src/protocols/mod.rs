//! Registry lookup backends.
//!
//! The engine only depends on [`RegistryLookup`]: one call per attempt that
//! either returns a record, signals "no such object", or fails with a
//! transport or protocol error. WHOIS (port 43) and RDAP (HTTPS) backends
//! live in the submodules.

use crate::config::LookupProtocol;
use crate::error::SweepError;
use crate::types::RegistrationRecord;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// RDAP (Registration Data Access Protocol) backend
pub mod rdap;

/// Port-43 WHOIS backend
pub mod whois;

/// TLD to server mappings and IANA referral discovery
pub mod registry;

pub use rdap::RdapLookup;
pub use registry::extract_tld;
pub use whois::{WhoisLookup, WhoisServer};

/// BSD/macOS errno for "connection reset by peer".
pub const PEER_RESET_OS_CODE: i32 = 54;

/// What the registry said about a domain.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResponse {
    /// The registry returned registration data
    Found(RegistrationRecord),

    /// The registry has no object for this name
    NotFound,
}

/// Transport-level failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    ConnectionReset,
    Timeout,
    Socket,
    RateLimited,
}

/// A lookup that did not produce an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    /// Network or rate-limit failure; worth another attempt
    Transport {
        kind: TransportKind,
        message: String,
        os_code: Option<i32>,
    },

    /// The response could not be interpreted
    Protocol { message: String },
}

impl LookupError {
    pub fn transport<M: Into<String>>(kind: TransportKind, message: M) -> Self {
        Self::Transport {
            kind,
            message: message.into(),
            os_code: None,
        }
    }

    pub fn protocol<M: Into<String>>(message: M) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Per-attempt timeout expiry.
    pub fn timeout<O: fmt::Display>(operation: O, duration: Duration) -> Self {
        Self::transport(
            TransportKind::Timeout,
            format!("{} after {:?}", operation, duration),
        )
    }

    /// Map a socket error onto a transport kind, keeping the OS code.
    pub fn from_io(context: &str, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportKind::ConnectionReset,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportKind::Timeout,
            _ => TransportKind::Socket,
        };

        Self::Transport {
            kind,
            message: format!("{}: {}", context, err),
            os_code: err.raw_os_error(),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport { kind, message, .. } => {
                write!(f, "transport error ({:?}): {}", kind, message)
            }
            Self::Protocol { message } => write!(f, "protocol error: {}", message),
        }
    }
}

impl std::error::Error for LookupError {}

/// A single registry query.
///
/// Implementations perform exactly one outbound request per call and keep no
/// per-call shared state; retries belong to the engine.
pub trait RegistryLookup: Send + Sync + 'static {
    fn lookup(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<LookupResponse, LookupError>> + Send;
}

impl<L: RegistryLookup> RegistryLookup for Arc<L> {
    fn lookup(
        &self,
        domain: &str,
    ) -> impl Future<Output = Result<LookupResponse, LookupError>> + Send {
        (**self).lookup(domain)
    }
}

/// Backend selected at runtime.
#[derive(Clone)]
pub enum RegistryBackend {
    Whois(WhoisLookup),
    Rdap(RdapLookup),
}

impl RegistryBackend {
    /// Build the backend for `protocol`.
    ///
    /// # Arguments
    ///
    /// * `protocol` - WHOIS or RDAP
    /// * `timeout` - Per-attempt timeout
    /// * `whois_server` - Fixed WHOIS server (`host[:port]`), WHOIS only
    /// * `rdap_url` - Fixed RDAP collection URL, RDAP only
    ///
    /// # Errors
    ///
    /// Returns `SweepError::BackendError` for a malformed server address or
    /// when the HTTP client cannot be built.
    pub fn from_settings(
        protocol: LookupProtocol,
        timeout: Duration,
        whois_server: Option<&str>,
        rdap_url: Option<&str>,
    ) -> Result<Self, SweepError> {
        match protocol {
            LookupProtocol::Whois => {
                let mut lookup = WhoisLookup::with_timeout(timeout);
                if let Some(address) = whois_server {
                    let server = WhoisServer::parse(address).ok_or_else(|| {
                        SweepError::backend("WHOIS", format!("invalid server address '{}'", address))
                    })?;
                    lookup = lookup.with_server(server);
                }
                Ok(Self::Whois(lookup))
            }
            LookupProtocol::Rdap => {
                let mut lookup = RdapLookup::with_timeout(timeout)?;
                if let Some(url) = rdap_url {
                    lookup = lookup.with_base_url(url);
                }
                Ok(Self::Rdap(lookup))
            }
        }
    }

    pub fn protocol(&self) -> LookupProtocol {
        match self {
            Self::Whois(_) => LookupProtocol::Whois,
            Self::Rdap(_) => LookupProtocol::Rdap,
        }
    }
}

impl RegistryLookup for RegistryBackend {
    async fn lookup(&self, domain: &str) -> Result<LookupResponse, LookupError> {
        match self {
            Self::Whois(lookup) => lookup.lookup(domain).await,
            Self::Rdap(lookup) => lookup.lookup(domain).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selection() {
        let whois = RegistryBackend::from_settings(
            LookupProtocol::Whois,
            Duration::from_secs(5),
            Some("127.0.0.1:4343"),
            None,
        )
        .unwrap();
        assert_eq!(whois.protocol(), LookupProtocol::Whois);

        let rdap = RegistryBackend::from_settings(
            LookupProtocol::Rdap,
            Duration::from_secs(5),
            None,
            Some("https://rdap.example.test/domain/"),
        )
        .unwrap();
        assert_eq!(rdap.protocol(), LookupProtocol::Rdap);

        let bad = RegistryBackend::from_settings(
            LookupProtocol::Whois,
            Duration::from_secs(5),
            Some("host:notaport"),
            None,
        );
        assert!(matches!(bad, Err(SweepError::BackendError { .. })));
    }

    #[test]
    fn test_io_error_mapping() {
        let reset = io::Error::from_raw_os_error(PEER_RESET_OS_CODE);
        match LookupError::from_io("whois.example.test:43", &reset) {
            LookupError::Transport { os_code, .. } => {
                assert_eq!(os_code, Some(PEER_RESET_OS_CODE));
            }
            other => panic!("unexpected {:?}", other),
        }

        let timed_out = io::Error::new(io::ErrorKind::TimedOut, "slow");
        assert!(matches!(
            LookupError::from_io("read", &timed_out),
            LookupError::Transport {
                kind: TransportKind::Timeout,
                ..
            }
        ));

        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(
            LookupError::from_io("connect", &refused),
            LookupError::Transport {
                kind: TransportKind::Socket,
                ..
            }
        ));

        let aborted = io::Error::new(io::ErrorKind::ConnectionAborted, "aborted");
        assert!(matches!(
            LookupError::from_io("read", &aborted),
            LookupError::Transport {
                kind: TransportKind::ConnectionReset,
                ..
            }
        ));
    }

    #[test]
    fn test_timeout_message() {
        let err = LookupError::timeout("WHOIS query", Duration::from_secs(10));
        assert!(err.is_transport());
        assert!(err.to_string().contains("WHOIS query after 10s"));
    }
}
