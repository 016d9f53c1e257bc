//! Registry server mappings and IANA referral discovery.
//!
//! Built-in maps cover the common TLDs for both backends. WHOIS servers for
//! anything else are discovered through `whois.iana.org` and cached for the
//! lifetime of the process.

use crate::protocols::whois::{parse_iana_refer_response, query_server, WhoisServer};
use crate::protocols::LookupError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// IANA root WHOIS server, authoritative for TLD referrals.
pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";

/// Discovered WHOIS servers, plus TLDs IANA had no referral for.
#[derive(Default)]
struct ReferralCache {
    whois_servers: HashMap<String, String>,
    no_referral: HashSet<String>,
}

fn referral_cache() -> &'static Mutex<ReferralCache> {
    static CACHE: OnceLock<Mutex<ReferralCache>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(ReferralCache::default()))
}

/// Built-in WHOIS servers for popular TLDs.
pub fn get_whois_server_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        // Popular gTLDs
        ("com", "whois.verisign-grs.com"),
        ("net", "whois.verisign-grs.com"),
        ("org", "whois.publicinterestregistry.org"),
        ("info", "whois.nic.info"),
        ("biz", "whois.nic.biz"),
        ("xyz", "whois.nic.xyz"),
        ("online", "whois.nic.online"),
        ("site", "whois.nic.site"),
        ("tech", "whois.nic.tech"),
        ("app", "whois.nic.google"),
        ("dev", "whois.nic.google"),
        ("shop", "whois.nic.shop"),
        // Identity Digital managed ccTLDs
        ("io", "whois.nic.io"),
        ("ai", "whois.nic.ai"),
        ("me", "whois.nic.me"),
        // Country Code TLDs
        ("co", "whois.nic.co"),
        ("us", "whois.nic.us"),
        ("uk", "whois.nic.uk"),
        ("de", "whois.denic.de"),
        ("fr", "whois.nic.fr"),
        ("nl", "whois.domain-registry.nl"),
        ("eu", "whois.eu"),
        ("ru", "whois.tcinet.ru"),
        ("ca", "whois.cira.ca"),
        ("tv", "whois.nic.tv"),
        ("cc", "ccwhois.verisign-grs.com"),
    ])
}

/// Built-in RDAP base URLs (each ends with `domain/`).
pub fn get_rdap_registry_map() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("com", "https://rdap.verisign.com/com/v1/domain/"),
        ("net", "https://rdap.verisign.com/net/v1/domain/"),
        ("org", "https://rdap.publicinterestregistry.org/rdap/domain/"),
        ("info", "https://rdap.identitydigital.services/rdap/domain/"),
        ("biz", "https://rdap.nic.biz/domain/"),
        ("app", "https://pubapi.registry.google/rdap/domain/"),
        ("dev", "https://pubapi.registry.google/rdap/domain/"),
        ("xyz", "https://rdap.centralnic.com/xyz/domain/"),
        ("tech", "https://rdap.centralnic.com/tech/domain/"),
        ("online", "https://rdap.centralnic.com/online/domain/"),
        ("site", "https://rdap.centralnic.com/site/domain/"),
        ("shop", "https://rdap.gmoregistry.net/rdap/domain/"),
        ("ai", "https://rdap.identitydigital.services/rdap/domain/"),
        ("io", "https://rdap.identitydigital.services/rdap/domain/"),
        ("me", "https://rdap.identitydigital.services/rdap/domain/"),
        ("us", "https://rdap.nic.us/domain/"),
        ("uk", "https://rdap.nominet.uk/domain/"),
        ("de", "https://rdap.denic.de/domain/"),
        ("fr", "https://rdap.nic.fr/domain/"),
        ("nl", "https://rdap.sidn.nl/domain/"),
        ("ca", "https://rdap.ca.fury.ca/rdap/domain/"),
        ("tv", "https://rdap.nic.tv/domain/"),
        ("cc", "https://tld-rdap.verisign.com/cc/v1/domain/"),
    ])
}

/// Extract the TLD (last label) from a domain name.
///
/// Returns `None` for names without a dot.
pub fn extract_tld(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_end_matches('.');
    let (_, tld) = trimmed.rsplit_once('.')?;
    if tld.is_empty() {
        return None;
    }
    Some(tld.to_lowercase())
}

/// Built-in RDAP endpoint for a TLD.
pub fn get_rdap_endpoint(tld: &str) -> Option<&'static str> {
    get_rdap_registry_map().get(tld.to_lowercase().as_str()).copied()
}

/// Resolve the WHOIS server for a TLD.
///
/// Order: built-in map, referral cache, IANA referral query. A failed IANA
/// query is a transport error so the attempt can be retried; a TLD IANA
/// does not know is a protocol error.
pub async fn get_whois_server(tld: &str, timeout: Duration) -> Result<String, LookupError> {
    let tld = tld.to_lowercase();

    if let Some(server) = get_whois_server_map().get(tld.as_str()) {
        return Ok(server.to_string());
    }

    if let Some(cached) = get_cached_whois_server(&tld) {
        return Ok(cached);
    }

    if is_referral_negatively_cached(&tld) {
        return Err(LookupError::protocol(format!(
            "no WHOIS server is known for .{}",
            tld
        )));
    }

    let iana = WhoisServer::new(IANA_WHOIS_SERVER);
    let response = query_server(&iana, &tld, timeout).await?;

    match parse_iana_refer_response(&response) {
        Some(server) => {
            tracing::debug!(tld = %tld, server = %server, "discovered WHOIS server via IANA");
            cache_whois_server(&tld, &server);
            Ok(server)
        }
        None => {
            if let Ok(mut cache) = referral_cache().lock() {
                cache.no_referral.insert(tld.clone());
            }
            Err(LookupError::protocol(format!(
                "no WHOIS server is known for .{}",
                tld
            )))
        }
    }
}

/// Store a discovered WHOIS server for a TLD.
pub fn cache_whois_server(tld: &str, server: &str) {
    if let Ok(mut cache) = referral_cache().lock() {
        cache.no_referral.remove(tld);
        cache
            .whois_servers
            .insert(tld.to_lowercase(), server.to_string());
    }
}

/// Look up a previously discovered WHOIS server.
pub fn get_cached_whois_server(tld: &str) -> Option<String> {
    referral_cache()
        .lock()
        .ok()
        .and_then(|cache| cache.whois_servers.get(&tld.to_lowercase()).cloned())
}

fn is_referral_negatively_cached(tld: &str) -> bool {
    referral_cache()
        .lock()
        .map(|cache| cache.no_referral.contains(tld))
        .unwrap_or(false)
}
