// whois-sweep/tests/common/mod.rs

#![allow(dead_code)]

use assert_cmd::Command;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;

const SWEEP_ENV_VARS: &[&str] = &[
    "WS_THREADS",
    "WS_RETRIES",
    "WS_BACKOFF",
    "WS_JITTER",
    "WS_TIMEOUT",
    "WS_PROTOCOL",
    "WS_WHOIS_SERVER",
    "WS_RDAP_URL",
    "WS_AUTO_RETRY_DELAY",
    "WS_AUTO_RETRY_ROUNDS",
    "WS_INPUT",
    "WS_CONFIG",
    "RUST_LOG",
];

/// Start a WHOIS server on a random local port and return `host:port`.
///
/// Replies are chosen by the queried name:
/// - `taken*`   a registration record
/// - `badtld*`  an unknown-TLD notice (terminal protocol error)
/// - `down*`    connection closed without a reply (retryable)
/// - `flaky*`   closed without a reply on the first query, then not found
/// - anything else: not found
pub fn spawn_whois_stub() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind stub");
    let port = listener.local_addr().expect("No local address").port();

    thread::spawn(move || {
        let mut queries: HashMap<String, usize> = HashMap::new();
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };

            let mut line = String::new();
            if BufReader::new(&stream).read_line(&mut line).is_err() {
                continue;
            }
            let domain = line.trim().to_lowercase();
            let count = queries.entry(domain.clone()).or_default();
            *count += 1;

            if let Some(reply) = stub_reply(&domain, *count) {
                let _ = stream.write_all(reply.as_bytes());
            }
        }
    });

    format!("127.0.0.1:{}", port)
}

fn stub_reply(domain: &str, query_count: usize) -> Option<String> {
    if domain.starts_with("taken") {
        Some(format!(
            "Domain Name: {}\r\nRegistry Domain ID: 1_STUB\r\nRegistrar: Stub Registrar\r\n",
            domain.to_uppercase()
        ))
    } else if domain.starts_with("badtld") {
        Some("Invalid TLD\r\n".to_string())
    } else if domain.starts_with("down") || (domain.starts_with("flaky") && query_count == 1) {
        None
    } else {
        Some(format!("No match for \"{}\".\r\n", domain.to_uppercase()))
    }
}

/// A whois-sweep command isolated from the caller's environment: runs in
/// `dir`, sees no config files and no `WS_*` variables.
pub fn sweep_cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("whois-sweep").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"));
    for var in SWEEP_ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

/// Write a domains file into `dir`.
pub fn write_domains(dir: &Path, domains: &[&str]) -> PathBuf {
    let path = dir.join("domains.txt");
    fs::write(&path, domains.join("\n")).expect("Failed to write domains file");
    path
}

/// Sorted non-empty lines of a result file.
pub fn read_lines(path: &Path) -> Vec<String> {
    let mut lines: Vec<String> = fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e))
        .lines()
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    lines.sort();
    lines
}
