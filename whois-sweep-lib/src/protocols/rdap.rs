//! RDAP (Registration Data Access Protocol) backend.
//!
//! One HTTPS GET per attempt against the registry's `domain/` collection.
//! HTTP 404 means the name is not registered, 200 carries a JSON object
//! with registration details. Everything else is mapped onto a
//! [`LookupError`] so the engine can decide whether to retry.

use crate::error::SweepError;
use crate::protocols::registry::{extract_tld, get_rdap_endpoint};
use crate::protocols::{LookupError, LookupResponse, RegistryLookup, TransportKind};
use crate::types::RegistrationRecord;
use reqwest::StatusCode;
use std::error::Error as _;
use std::io;
use std::time::Duration;

/// RDAP lookup backend.
#[derive(Clone)]
pub struct RdapLookup {
    /// HTTP client for making RDAP requests
    http_client: reqwest::Client,
    /// Timeout for one RDAP request
    timeout: Duration,
    /// Query this collection URL for every domain instead of the built-in map
    base_url: Option<String>,
}

impl RdapLookup {
    /// Create an RDAP backend with a 10 second per-request timeout.
    pub fn new() -> Result<Self, SweepError> {
        Self::with_timeout(Duration::from_secs(10))
    }

    /// Create an RDAP backend with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::BackendError` if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self, SweepError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("whois-sweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SweepError::backend("RDAP", format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http_client,
            timeout,
            base_url: None,
        })
    }

    /// Send every query to the given `domain/` collection URL.
    pub fn with_base_url<U: Into<String>>(mut self, base_url: U) -> Self {
        let mut url = base_url.into();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.base_url = Some(url);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn endpoint_for(&self, domain: &str) -> Result<String, LookupError> {
        if let Some(base) = &self.base_url {
            return Ok(base.clone());
        }

        let tld = extract_tld(domain).ok_or_else(|| {
            LookupError::protocol(format!("cannot determine TLD of '{}'", domain))
        })?;
        get_rdap_endpoint(&tld)
            .map(str::to_string)
            .ok_or_else(|| LookupError::protocol(format!("no RDAP endpoint known for .{}", tld)))
    }

    fn map_request_error(&self, url: &str, err: reqwest::Error) -> LookupError {
        if err.is_timeout() {
            return LookupError::timeout(format!("RDAP request to {}", url), self.timeout);
        }

        if let Some(io_err) = find_io_error(&err) {
            return LookupError::from_io(url, io_err);
        }

        if err.is_decode() || err.is_body() {
            return LookupError::protocol(format!("unreadable RDAP response from {}: {}", url, err));
        }

        LookupError::transport(
            TransportKind::Socket,
            format!("RDAP request to {} failed: {}", url, err),
        )
    }
}

impl RegistryLookup for RdapLookup {
    async fn lookup(&self, domain: &str) -> Result<LookupResponse, LookupError> {
        let url = format!("{}{}", self.endpoint_for(domain)?, domain);
        tracing::trace!(domain, url = %url, "querying RDAP");

        let response = self
            .http_client
            .get(&url)
            .header("Accept", "application/rdap+json, application/json")
            .send()
            .await
            .map_err(|e| self.map_request_error(&url, e))?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let json = response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| match self.map_request_error(&url, e) {
                        transport @ LookupError::Transport { .. } => transport,
                        LookupError::Protocol { .. } => {
                            LookupError::protocol(format!("invalid RDAP JSON from {}", url))
                        }
                    })?;

                // Some servers answer 200 with an embedded error object.
                if json.get("errorCode").and_then(|c| c.as_u64()) == Some(404) {
                    return Ok(LookupResponse::NotFound);
                }

                Ok(LookupResponse::Found(extract_record(&json)))
            }
            StatusCode::NOT_FOUND => Ok(LookupResponse::NotFound),
            StatusCode::TOO_MANY_REQUESTS => Err(LookupError::transport(
                TransportKind::RateLimited,
                format!("{} answered HTTP 429", url),
            )),
            code if code.is_server_error() => Err(LookupError::transport(
                TransportKind::Socket,
                format!("{} answered HTTP {}", url, code.as_u16()),
            )),
            code => Err(LookupError::protocol(format!(
                "unexpected HTTP {} from {}",
                code.as_u16(),
                url
            ))),
        }
    }
}

fn find_io_error(err: &reqwest::Error) -> Option<&io::Error> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return Some(io_err);
        }
        source = cause.source();
    }
    None
}

/// Extract registration details from an RDAP domain object.
///
/// # Arguments
///
/// * `json` - The RDAP JSON response
///
/// # Returns
///
/// A `RegistrationRecord`; fields the response does not carry stay empty.
pub fn extract_record(json: &serde_json::Value) -> RegistrationRecord {
    let mut record = RegistrationRecord {
        domain_name: json
            .get("ldhName")
            .or_else(|| json.get("unicodeName"))
            .and_then(|n| n.as_str())
            .map(String::from),
        registry_domain_id: json.get("handle").and_then(|h| h.as_str()).map(String::from),
        ..Default::default()
    };

    // Extract registrar information from entities
    if let Some(entities) = json.get("entities").and_then(|e| e.as_array()) {
        for entity in entities {
            let is_registrar = entity
                .get("roles")
                .and_then(|r| r.as_array())
                .map(|roles| roles.iter().any(|role| role.as_str() == Some("registrar")))
                .unwrap_or(false);

            if is_registrar {
                if let Some(name) =
                    extract_vcard_name(entity).or_else(|| extract_entity_identifier(entity))
                {
                    record.registrar = Some(name);
                    break;
                }
            }
        }
    }

    if let Some(events) = json.get("events").and_then(|e| e.as_array()) {
        for event in events {
            if let (Some(action), Some(date)) = (
                event.get("eventAction").and_then(|a| a.as_str()),
                event.get("eventDate").and_then(|d| d.as_str()),
            ) {
                match action {
                    "registration" => record.creation_date = Some(date.to_string()),
                    "expiration" => record.expiration_date = Some(date.to_string()),
                    "last changed" => record.updated_date = Some(date.to_string()),
                    _ => {}
                }
            }
        }
    }

    if let Some(statuses) = json.get("status").and_then(|s| s.as_array()) {
        record
            .status
            .extend(statuses.iter().filter_map(|s| s.as_str()).map(String::from));
    }

    if let Some(nameservers) = json.get("nameservers").and_then(|ns| ns.as_array()) {
        record.name_servers.extend(
            nameservers
                .iter()
                .filter_map(|ns| ns.get("ldhName").and_then(|n| n.as_str()))
                .map(str::to_lowercase),
        );
    }

    record
}

/// Organization name from the `fn` property of an entity's vCard.
fn extract_vcard_name(entity: &serde_json::Value) -> Option<String> {
    let items = entity
        .get("vcardArray")
        .and_then(|v| v.as_array())
        .and_then(|a| a.get(1))
        .and_then(|a| a.as_array())?;

    items.iter().find_map(|item| {
        let item = item.as_array()?;
        if item.len() >= 4 && item.first().and_then(|f| f.as_str()) == Some("fn") {
            item.get(3).and_then(|n| n.as_str()).map(String::from)
        } else {
            None
        }
    })
}

/// Entity identifier from publicIds, handle or name.
fn extract_entity_identifier(entity: &serde_json::Value) -> Option<String> {
    entity
        .get("publicIds")
        .and_then(|p| p.as_array())
        .and_then(|ids| ids.first())
        .and_then(|id| id.get("identifier"))
        .or_else(|| entity.get("handle"))
        .or_else(|| entity.get("name"))
        .and_then(|v| v.as_str())
        .map(String::from)
}
