//! WHOIS protocol backend.
//!
//! Speaks RFC 3912 directly: connect to port 43, send the query terminated
//! by CRLF, read until the server closes. Responses are free text, so the
//! parser recognises rate-limit, unknown-TLD and not-found phrases and pulls
//! registration fields out of `key: value` lines.

use crate::protocols::registry::{extract_tld, get_whois_server};
use crate::protocols::{LookupError, LookupResponse, RegistryLookup, TransportKind};
use crate::types::RegistrationRecord;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Well-known WHOIS port.
pub const WHOIS_PORT: u16 = 43;

/// Responses above this size are cut off; no registry answer gets close.
const MAX_RESPONSE_BYTES: u64 = 256 * 1024;

/// Address of a WHOIS server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhoisServer {
    pub host: String,
    pub port: u16,
}

impl WhoisServer {
    /// Server on the standard port.
    pub fn new<H: Into<String>>(host: H) -> Self {
        Self {
            host: host.into(),
            port: WHOIS_PORT,
        }
    }

    /// Parse `host` or `host:port`.
    pub fn parse(address: &str) -> Option<Self> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }

        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().ok()?;
                Some(Self {
                    host: host.to_string(),
                    port,
                })
            }
            Some(_) => None,
            None => Some(Self::new(address)),
        }
    }
}

impl fmt::Display for WhoisServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// WHOIS lookup backend.
///
/// Each lookup opens a fresh TCP connection. The timeout covers connect,
/// write and read of a single attempt.
#[derive(Debug, Clone)]
pub struct WhoisLookup {
    /// Timeout for one WHOIS query
    timeout: Duration,
    /// Query this server for every domain instead of resolving per TLD
    server_override: Option<WhoisServer>,
}

impl WhoisLookup {
    /// Create a WHOIS backend with a 10 second per-query timeout.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            server_override: None,
        }
    }

    /// Create a WHOIS backend with a custom per-query timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            server_override: None,
        }
    }

    /// Send every query to `server`.
    pub fn with_server(mut self, server: WhoisServer) -> Self {
        self.server_override = Some(server);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn resolve_server(&self, domain: &str) -> Result<WhoisServer, LookupError> {
        if let Some(server) = &self.server_override {
            return Ok(server.clone());
        }

        let tld = extract_tld(domain).ok_or_else(|| {
            LookupError::protocol(format!("cannot determine TLD of '{}'", domain))
        })?;
        let host = get_whois_server(&tld, self.timeout).await?;
        Ok(WhoisServer::new(host))
    }
}

impl Default for WhoisLookup {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryLookup for WhoisLookup {
    async fn lookup(&self, domain: &str) -> Result<LookupResponse, LookupError> {
        let server = self.resolve_server(domain).await?;
        tracing::trace!(domain, server = %server, "querying WHOIS");

        let response = query_server(&server, domain, self.timeout).await?;
        parse_whois_response(&response)
    }
}

/// Send one query to a WHOIS server and return the raw response text.
pub async fn query_server(
    server: &WhoisServer,
    query: &str,
    timeout: Duration,
) -> Result<String, LookupError> {
    let exchange = async {
        let address = (server.host.as_str(), server.port);
        let mut stream = TcpStream::connect(address)
            .await
            .map_err(|e| LookupError::from_io(&format!("connect to {}", server), &e))?;

        stream
            .write_all(format!("{}\r\n", query.trim()).as_bytes())
            .await
            .map_err(|e| LookupError::from_io(&format!("send to {}", server), &e))?;

        let mut buffer = Vec::new();
        (&mut stream)
            .take(MAX_RESPONSE_BYTES)
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| LookupError::from_io(&format!("read from {}", server), &e))?;

        Ok::<_, LookupError>(buffer)
    };

    let buffer = tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| LookupError::timeout(format!("WHOIS query to {}", server), timeout))??;

    if buffer.is_empty() {
        return Err(LookupError::transport(
            TransportKind::Socket,
            format!("{} closed the connection without a response", server),
        ));
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Status codes some registries (DENIC, EURid, .it) return for an
/// unregistered name, alongside an echoed `Domain:` line.
const AVAILABLE_STATUSES: &[&str] = &["free", "available"];

/// Interpret a WHOIS response.
///
/// A record whose status is one of [`AVAILABLE_STATUSES`] is not found.
/// Otherwise a response naming the domain is a record even if it also
/// contains one of the phrases below (registries append long legal notices).
pub fn parse_whois_response(response: &str) -> Result<LookupResponse, LookupError> {
    let record = parse_record(response);
    if is_available_status(&record) {
        return Ok(LookupResponse::NotFound);
    }
    if record.has_identifying_field() {
        return Ok(LookupResponse::Found(record));
    }

    let lower = response.to_lowercase();

    if is_rate_limited(&lower) {
        return Err(LookupError::transport(
            TransportKind::RateLimited,
            first_meaningful_line(response),
        ));
    }

    let invalid_tld_patterns = [
        "no whois server is known",
        "no whois server",
        "invalid tld",
        "unknown tld",
        "tld not found",
        "no such tld",
        "bad tld",
        "invalid domain extension",
    ];
    if invalid_tld_patterns.iter().any(|p| lower.contains(p)) {
        return Err(LookupError::protocol(format!(
            "registry rejected the query: {}",
            first_meaningful_line(response)
        )));
    }

    let not_found_patterns = [
        "no match",
        "not found",
        "no data found",
        "no entries found",
        "domain not found",
        "domain available",
        "status: available",
        "status: free",
        "no information available",
        "not registered",
        "no matching record",
        "domain status: no object found",
        "the queried object does not exist",
        "object does not exist",
        "no matching entry",
        "domain name not found",
        "this domain name has not been registered",
        "no found",
    ];
    if not_found_patterns.iter().any(|p| lower.contains(p)) {
        return Ok(LookupResponse::NotFound);
    }

    // Successful answer without identifying fields; the classifier decides.
    Ok(LookupResponse::Found(record))
}

fn is_available_status(record: &RegistrationRecord) -> bool {
    record.status.iter().any(|status| {
        AVAILABLE_STATUSES
            .iter()
            .any(|available| status.eq_ignore_ascii_case(available))
    })
}

/// Check if the WHOIS output indicates rate limiting.
fn is_rate_limited(output_lower: &str) -> bool {
    let rate_limit_patterns = [
        "rate limit exceeded",
        "too many requests",
        "try again later",
        "quota exceeded",
        "limit exceeded",
        "throttled",
        "rate-limited",
        "too many requests from your ip",
    ];

    rate_limit_patterns
        .iter()
        .any(|pattern| output_lower.contains(pattern))
}

/// Pull registration fields out of `key: value` lines.
fn parse_record(response: &str) -> RegistrationRecord {
    let mut record = RegistrationRecord::default();

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') || line.starts_with('#') || line.starts_with(">>>") {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "domain name" | "domain" => set_once(&mut record.domain_name, value),
            "registry domain id" | "roid" => set_once(&mut record.registry_domain_id, value),
            "registrar" | "sponsoring registrar" | "registrar name" => {
                set_once(&mut record.registrar, value)
            }
            "creation date" | "created" | "registered on" | "registration time" => {
                set_once(&mut record.creation_date, value)
            }
            "registry expiry date"
            | "registrar registration expiration date"
            | "expiry date"
            | "expiration date"
            | "expires"
            | "paid-till" => set_once(&mut record.expiration_date, value),
            "updated date" | "last updated" | "last-update" | "changed" => {
                set_once(&mut record.updated_date, value)
            }
            "name server" | "nserver" | "nameserver" => {
                let server = value.to_lowercase();
                if !record.name_servers.contains(&server) {
                    record.name_servers.push(server);
                }
            }
            "domain status" | "status" => {
                if let Some(code) = value.split_whitespace().next() {
                    record.status.push(code.to_string());
                }
            }
            _ => {}
        }
    }

    record
}

fn set_once(field: &mut Option<String>, value: &str) {
    if field.is_none() {
        *field = Some(value.to_string());
    }
}

fn first_meaningful_line(response: &str) -> String {
    response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('%') && !line.starts_with('#'))
        .unwrap_or("")
        .chars()
        .take(160)
        .collect()
}

/// Parse an IANA WHOIS response for the authoritative WHOIS server.
///
/// The IANA WHOIS response may use either `refer:` or `whois:` to indicate
/// the authoritative WHOIS server for a TLD. `refer:` wins when present.
///
/// ```text
/// whois:        whois.verisign-grs.com
/// refer:        whois.verisign-grs.com
/// ```
pub fn parse_iana_refer_response(response: &str) -> Option<String> {
    let mut whois_server = None;

    for line in response.lines() {
        let line_trimmed = line.trim();
        if let Some(server) = line_trimmed.strip_prefix("refer:") {
            let server = server.trim();
            if !server.is_empty() {
                return Some(server.to_string());
            }
        } else if let Some(server) = line_trimmed.strip_prefix("whois:") {
            let server = server.trim();
            if !server.is_empty() {
                whois_server = Some(server.to_string());
            }
        }
    }

    whois_server
}
