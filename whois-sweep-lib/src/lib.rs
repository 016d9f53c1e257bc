//! # whois-sweep library
//!
//! Bulk domain availability checking against flaky, rate-sensitive registry
//! services.
//!
//! The core is [`CheckEngine`]: a fixed pool of tokio tasks that runs one
//! registry lookup per attempt, classifies the outcome as free, occupied or
//! error, and retries transient network failures with exponential backoff
//! and jitter. Results come back either as one list or as a stream of
//! events that can be paused, resumed and cancelled.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use whois_sweep_lib::{CheckEngine, EngineConfig, WhoisLookup};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default().with_workers(20).with_retries(3);
//!     let engine = CheckEngine::new(config, WhoisLookup::new())?;
//!
//!     let mut scan = engine.start(vec!["example.com".to_string()]);
//!     while let Some(event) = scan.next_event().await {
//!         println!("[{}] {}: {}", event.progress, event.result.domain, event.result.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded parallelism**: `max_workers` lookups in flight at most
//! - **Retry with backoff**: `base ^ attempt` seconds plus optional jitter
//! - **Streaming control**: pause, resume, cancel and snapshot a running scan
//! - **Auto-retry**: re-check errored domains after a delay
//! - **Two backends**: port-43 WHOIS and RDAP over HTTPS

// Re-export main public API types and functions
pub use auto_retry::{error_domains, merge_retried, AutoRetry};
pub use checker::{backoff_delay, CheckEngine};
pub use classifier::LookupClassifier;
pub use concurrent::{ScanControl, ScanEvent, ScanHandle};
pub use config::{
    load_env_config, parse_timeout_string, ConfigManager, DefaultsConfig, EnvConfig, FileConfig,
    LookupProtocol, OutputConfig, MAX_WORKERS,
};
pub use error::SweepError;
pub use protocols::{
    extract_tld, LookupError, LookupResponse, RdapLookup, RegistryBackend, RegistryLookup,
    TransportKind, WhoisLookup, WhoisServer, PEER_RESET_OS_CODE,
};
pub use types::{
    CheckResult, CheckStatus, EngineConfig, FailureKind, LookupFailure, Progress,
    RegistrationRecord,
};
pub use utils::{parse_domain_lines, read_domains, read_domains_file};

// Internal modules - these are not part of the public API
mod auto_retry;
mod checker;
mod classifier;
mod concurrent;
mod config;
mod error;
mod protocols;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SweepError>;

// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
