//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `WS_*`
//! environment variables, and merging configurations with proper
//! precedence rules. Command-line arguments sit on top of both and are
//! applied by the CLI.

use crate::error::SweepError;
use crate::protocols::WhoisServer;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Largest accepted worker pool.
pub const MAX_WORKERS: usize = 500;

/// Which registry protocol the lookup backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupProtocol {
    /// Port-43 WHOIS
    #[default]
    Whois,
    /// RDAP over HTTPS
    Rdap,
}

impl FromStr for LookupProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "whois" => Ok(Self::Whois),
            "rdap" => Ok(Self::Rdap),
            other => Err(format!("unknown protocol '{}', use whois or rdap", other)),
        }
    }
}

impl fmt::Display for LookupProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whois => write!(f, "whois"),
            Self::Rdap => write!(f, "rdap"),
        }
    }
}

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// workers = 20
/// retries = 3
/// timeout = "8s"
///
/// [output]
/// free = "free.txt"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Default values for CLI options
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defaults: Option<DefaultsConfig>,

    /// Result file locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultsConfig {
    /// Worker pool width
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Attempts per domain
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    /// Backoff base in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<f64>,

    /// Random extra delay on every backoff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter: Option<bool>,

    /// Per-attempt timeout (as string, e.g., "5s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<LookupProtocol>,

    /// Fixed WHOIS server, `host` or `host:port`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whois_server: Option<String>,

    /// Fixed RDAP `domain/` collection URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rdap_url: Option<String>,

    /// Seconds to wait before re-checking errors (0 disables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_retry_delay: Option<u64>,

    /// How many re-check rounds to run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_retry_rounds: Option<u32>,
}

impl DefaultsConfig {
    /// Values set in `higher` win.
    pub fn merge(self, higher: DefaultsConfig) -> DefaultsConfig {
        DefaultsConfig {
            workers: higher.workers.or(self.workers),
            retries: higher.retries.or(self.retries),
            backoff: higher.backoff.or(self.backoff),
            jitter: higher.jitter.or(self.jitter),
            timeout: higher.timeout.or(self.timeout),
            protocol: higher.protocol.or(self.protocol),
            whois_server: higher.whois_server.or(self.whois_server),
            rdap_url: higher.rdap_url.or(self.rdap_url),
            auto_retry_delay: higher.auto_retry_delay.or(self.auto_retry_delay),
            auto_retry_rounds: higher.auto_retry_rounds.or(self.auto_retry_rounds),
        }
    }
}

/// Result file locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub occupied: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub all: Option<String>,
}

impl OutputConfig {
    /// Values set in `higher` win.
    pub fn merge(self, higher: OutputConfig) -> OutputConfig {
        OutputConfig {
            free: higher.free.or(self.free),
            occupied: higher.occupied.or(self.occupied),
            errors: higher.errors.or(self.errors),
            all: higher.all.or(self.all),
        }
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    current_dir: PathBuf,
    home_dir: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a configuration manager for the process environment.
    pub fn new() -> Self {
        let home_dir = env::var_os("HOME").map(PathBuf::from);
        let xdg_config_home = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home_dir.as_ref().map(|home| home.join(".config")));

        Self {
            current_dir: PathBuf::from("."),
            home_dir,
            xdg_config_home,
        }
    }

    /// Create a configuration manager that searches the given directories.
    pub fn with_dirs(
        current_dir: PathBuf,
        home_dir: Option<PathBuf>,
        xdg_config_home: Option<PathBuf>,
    ) -> Self {
        Self {
            current_dir,
            home_dir,
            xdg_config_home,
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// The parsed configuration or an error if reading, parsing or
    /// validation fails.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, SweepError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SweepError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            SweepError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            SweepError::config(format!(
                "Failed to parse TOML configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Lowest to highest: `$XDG_CONFIG_HOME/whois-sweep/config.toml`,
    /// `~/.whois-sweep.toml`, then `./whois-sweep.toml` or
    /// `./.whois-sweep.toml`. Files that fail to load are skipped with a
    /// warning.
    pub fn discover_and_load(&self) -> FileConfig {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    tracing::debug!(path = %path.display(), "loaded configuration file");
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => tracing::warn!("ignoring configuration file: {}", e),
            }
        }

        if loaded_files.len() > 1 {
            tracing::info!(
                files = ?loaded_files,
                "multiple configuration files found, later files take precedence"
            );
        }

        merged_config
    }

    /// Get the local configuration file path.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["whois-sweep.toml", ".whois-sweep.toml"]
            .iter()
            .map(|candidate| self.current_dir.join(candidate))
            .find(|path| path.exists())
    }

    /// Get the global configuration file path.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let path = self.home_dir.as_ref()?.join(".whois-sweep.toml");
        path.exists().then_some(path)
    }

    /// Get the XDG configuration file path.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let path = self
            .xdg_config_home
            .as_ref()?
            .join("whois-sweep")
            .join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations with proper precedence.
    ///
    /// Values from `higher` take precedence over values from `lower`.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower_defaults), Some(higher_defaults)) => {
                    Some(lower_defaults.merge(higher_defaults))
                }
                (lower_defaults, higher_defaults) => higher_defaults.or(lower_defaults),
            },
            output: match (lower.output, higher.output) {
                (Some(lower_output), Some(higher_output)) => {
                    Some(lower_output.merge(higher_output))
                }
                (lower_output, higher_output) => higher_output.or(lower_output),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), SweepError> {
        let Some(defaults) = &config.defaults else {
            return Ok(());
        };

        if let Some(workers) = defaults.workers {
            validate_workers(workers).map_err(SweepError::config)?;
        }

        if defaults.retries == Some(0) {
            return Err(SweepError::config("Retries must be at least 1"));
        }

        if let Some(backoff) = defaults.backoff {
            validate_backoff(backoff).map_err(SweepError::config)?;
        }

        if let Some(timeout_str) = &defaults.timeout {
            if parse_timeout_string(timeout_str).is_none() {
                return Err(SweepError::config(format!(
                    "Invalid timeout format '{}'. Use format like '5s', '30s', '2m'",
                    timeout_str
                )));
            }
        }

        if let Some(server) = &defaults.whois_server {
            if WhoisServer::parse(server).is_none() {
                return Err(SweepError::config(format!(
                    "Invalid WHOIS server '{}'. Use host or host:port",
                    server
                )));
            }
        }

        if let Some(url) = &defaults.rdap_url {
            if !is_http_url(url) {
                return Err(SweepError::config(format!(
                    "Invalid RDAP URL '{}'. Must start with http:// or https://",
                    url
                )));
            }
        }

        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via `WS_*`
/// environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub workers: Option<usize>,
    pub retries: Option<u32>,
    pub backoff: Option<f64>,
    pub jitter: Option<bool>,
    pub timeout: Option<String>,
    pub protocol: Option<LookupProtocol>,
    pub whois_server: Option<String>,
    pub rdap_url: Option<String>,
    pub auto_retry_delay: Option<u64>,
    pub auto_retry_rounds: Option<u32>,
    pub input: Option<String>,
    pub config: Option<String>,
}

/// Load configuration from the process environment.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config() -> EnvConfig {
    EnvConfig::from_lookup(|key| env::var(key).ok())
}

impl EnvConfig {
    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> EnvConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        EnvConfig {
            workers: parse_var(&var, "WS_THREADS", |v| {
                v.parse::<usize>()
                    .map_err(|e| e.to_string())
                    .and_then(|n| validate_workers(n).map(|_| n))
            }),
            retries: parse_var(&var, "WS_RETRIES", |v| match v.parse::<u32>() {
                Ok(0) => Err("must be at least 1".to_string()),
                Ok(n) => Ok(n),
                Err(e) => Err(e.to_string()),
            }),
            backoff: parse_var(&var, "WS_BACKOFF", |v| {
                v.parse::<f64>()
                    .map_err(|e| e.to_string())
                    .and_then(|b| validate_backoff(b).map(|_| b))
            }),
            jitter: parse_var(&var, "WS_JITTER", parse_bool),
            timeout: parse_var(&var, "WS_TIMEOUT", |v| {
                parse_timeout_string(v)
                    .map(|_| v.to_string())
                    .ok_or_else(|| "use format like '5s', '30s', '2m'".to_string())
            }),
            protocol: parse_var(&var, "WS_PROTOCOL", LookupProtocol::from_str),
            whois_server: parse_var(&var, "WS_WHOIS_SERVER", |v| {
                WhoisServer::parse(v)
                    .map(|_| v.to_string())
                    .ok_or_else(|| "use host or host:port".to_string())
            }),
            rdap_url: parse_var(&var, "WS_RDAP_URL", |v| {
                if is_http_url(v) {
                    Ok(v.to_string())
                } else {
                    Err("must start with http:// or https://".to_string())
                }
            }),
            auto_retry_delay: parse_var(&var, "WS_AUTO_RETRY_DELAY", |v| {
                v.parse::<u64>().map_err(|e| e.to_string())
            }),
            auto_retry_rounds: parse_var(&var, "WS_AUTO_RETRY_ROUNDS", |v| {
                v.parse::<u32>().map_err(|e| e.to_string())
            }),
            input: parse_var(&var, "WS_INPUT", |v| Ok(v.to_string())),
            config: parse_var(&var, "WS_CONFIG", |v| Ok(v.to_string())),
        }
    }
}

fn parse_var<T, V, P>(var: &V, key: &str, parse: P) -> Option<T>
where
    V: Fn(&str) -> Option<String>,
    P: FnOnce(&str) -> Result<T, String>,
{
    let raw = var(key)?;
    match parse(&raw) {
        Ok(value) => {
            tracing::info!("Using {}={}", key, raw);
            Some(value)
        }
        Err(reason) => {
            tracing::warn!("Invalid {}='{}' ignored: {}", key, raw, reason);
            None
        }
    }
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err("use true/false".to_string()),
    }
}

fn validate_workers(workers: usize) -> Result<(), String> {
    if workers == 0 || workers > MAX_WORKERS {
        Err(format!("Workers must be between 1 and {}", MAX_WORKERS))
    } else {
        Ok(())
    }
}

fn validate_backoff(backoff: f64) -> Result<(), String> {
    if backoff.is_finite() && backoff >= 0.0 {
        Ok(())
    } else {
        Err(format!("Backoff must be a non-negative number, got {}", backoff))
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Parse a timeout string like "500ms", "5s", "2m" into a duration.
///
/// Bare numbers are seconds. Zero is rejected.
pub fn parse_timeout_string(timeout_str: &str) -> Option<Duration> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let duration = if let Some(ms) = timeout_str.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = timeout_str.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = timeout_str.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        timeout_str.parse::<u64>().ok().map(Duration::from_secs)
    }?;

    (!duration.is_zero()).then_some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_timeout_string() {
        assert_eq!(parse_timeout_string("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout_string("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_timeout_string("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_timeout_string("5"), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_timeout_string("250ms"),
            Some(Duration::from_millis(250))
        );
        assert_eq!(parse_timeout_string("0s"), None);
        assert_eq!(parse_timeout_string("invalid"), None);
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[defaults]
workers = 25
retries = 3
backoff = 1.5
jitter = false
timeout = "8s"
protocol = "rdap"
auto_retry_delay = 30

[output]
free = "free.txt"
all = "everything.txt"
"#,
        );

        let config = ConfigManager::new().load_file(temp_file.path()).unwrap();

        let defaults = config.defaults.unwrap();
        assert_eq!(defaults.workers, Some(25));
        assert_eq!(defaults.retries, Some(3));
        assert_eq!(defaults.backoff, Some(1.5));
        assert_eq!(defaults.jitter, Some(false));
        assert_eq!(defaults.protocol, Some(LookupProtocol::Rdap));
        assert_eq!(defaults.auto_retry_delay, Some(30));

        let output = config.output.unwrap();
        assert_eq!(output.free.as_deref(), Some("free.txt"));
        assert_eq!(output.errors, None);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let manager = ConfigManager::new();
        for content in [
            "[defaults]\nworkers = 0\n",
            "[defaults]\nworkers = 501\n",
            "[defaults]\nretries = 0\n",
            "[defaults]\nbackoff = -1.0\n",
            "[defaults]\ntimeout = \"soon\"\n",
            "[defaults]\nrdap_url = \"ftp://rdap.example\"\n",
            "[defaults]\nwhois_server = \"host:port\"\n",
            "[defaults]\nprotocol = \"gopher\"\n",
            "[defaults]\nconcurrency = 5\n",
        ] {
            let temp_file = write_config(content);
            let result = manager.load_file(temp_file.path());
            assert!(result.is_err(), "accepted: {}", content);
            assert!(result.unwrap_err().is_config_error());
        }
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigManager::new().load_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(SweepError::FileError { .. })));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new();

        let lower = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(10),
                retries: Some(4),
                jitter: Some(false),
                ..Default::default()
            }),
            output: Some(OutputConfig {
                free: Some("lower-free.txt".to_string()),
                ..Default::default()
            }),
        };

        let higher = FileConfig {
            defaults: Some(DefaultsConfig {
                workers: Some(25),
                jitter: Some(true),
                ..Default::default()
            }),
            output: None,
        };

        let merged = manager.merge_configs(lower, higher);
        let defaults = merged.defaults.unwrap();

        assert_eq!(defaults.workers, Some(25)); // Higher wins
        assert_eq!(defaults.retries, Some(4)); // Lower preserved
        assert_eq!(defaults.jitter, Some(true));
        assert_eq!(
            merged.output.unwrap().free.as_deref(),
            Some("lower-free.txt")
        );
    }

    #[test]
    fn test_discovery_precedence() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        let xdg = TempDir::new().unwrap();

        fs::create_dir_all(xdg.path().join("whois-sweep")).unwrap();
        fs::write(
            xdg.path().join("whois-sweep").join("config.toml"),
            "[defaults]\nworkers = 5\nretries = 2\nbackoff = 3.0\n",
        )
        .unwrap();
        fs::write(
            home.path().join(".whois-sweep.toml"),
            "[defaults]\nworkers = 7\nretries = 9\n",
        )
        .unwrap();
        fs::write(cwd.path().join("whois-sweep.toml"), "[defaults]\nworkers = 11\n").unwrap();

        let manager = ConfigManager::with_dirs(
            cwd.path().to_path_buf(),
            Some(home.path().to_path_buf()),
            Some(xdg.path().to_path_buf()),
        );
        let defaults = manager.discover_and_load().defaults.unwrap();

        assert_eq!(defaults.workers, Some(11));
        assert_eq!(defaults.retries, Some(9));
        assert_eq!(defaults.backoff, Some(3.0));
    }

    #[test]
    fn test_discovery_skips_broken_files() {
        let cwd = TempDir::new().unwrap();
        let home = TempDir::new().unwrap();
        fs::write(home.path().join(".whois-sweep.toml"), "[defaults]\nretries = 2\n").unwrap();
        fs::write(cwd.path().join(".whois-sweep.toml"), "this is = = not toml").unwrap();

        let manager = ConfigManager::with_dirs(
            cwd.path().to_path_buf(),
            Some(home.path().to_path_buf()),
            None,
        );
        let defaults = manager.discover_and_load().defaults.unwrap();
        assert_eq!(defaults.retries, Some(2));
    }

    #[test]
    fn test_env_config_parsing() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WS_THREADS", "40"),
            ("WS_RETRIES", "0"),
            ("WS_BACKOFF", "1.5"),
            ("WS_JITTER", "off"),
            ("WS_TIMEOUT", "3s"),
            ("WS_PROTOCOL", "RDAP"),
            ("WS_WHOIS_SERVER", "127.0.0.1:4343"),
            ("WS_RDAP_URL", "not-a-url"),
            ("WS_AUTO_RETRY_DELAY", "0"),
            ("WS_CONFIG", "  "),
        ]);

        let env = EnvConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(env.workers, Some(40));
        assert_eq!(env.retries, None);
        assert_eq!(env.backoff, Some(1.5));
        assert_eq!(env.jitter, Some(false));
        assert_eq!(env.timeout.as_deref(), Some("3s"));
        assert_eq!(env.protocol, Some(LookupProtocol::Rdap));
        assert_eq!(env.whois_server.as_deref(), Some("127.0.0.1:4343"));
        assert_eq!(env.rdap_url, None);
        assert_eq!(env.auto_retry_delay, Some(0));
        assert_eq!(env.config, None);
        assert_eq!(env.input, None);
    }

    #[test]
    fn test_protocol_parsing() {
        assert_eq!("whois".parse::<LookupProtocol>(), Ok(LookupProtocol::Whois));
        assert_eq!(" Rdap ".parse::<LookupProtocol>(), Ok(LookupProtocol::Rdap));
        assert!("ftp".parse::<LookupProtocol>().is_err());
        assert_eq!(LookupProtocol::default().to_string(), "whois");
    }
}
