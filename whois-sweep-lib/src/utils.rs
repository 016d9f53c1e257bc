//! Helpers for reading domain lists.
//!
//! Domain names are opaque: nothing here validates syntax. Registries answer
//! malformed names with a protocol error, which is reported per domain.

use crate::error::SweepError;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Split a domain list into names.
///
/// Each line is trimmed; empty lines and lines starting with `#` are
/// skipped. Duplicates are kept.
///
/// # Arguments
///
/// * `text` - One domain per line
///
/// # Returns
///
/// The domain names in input order.
pub fn parse_domain_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Read a domain list from a file.
///
/// # Errors
///
/// Returns `SweepError::FileError` if the file cannot be read.
pub fn read_domains_file<P: AsRef<Path>>(path: P) -> Result<Vec<String>, SweepError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        SweepError::file_error(path.to_string_lossy(), format!("Cannot read file: {}", e))
    })?;
    Ok(parse_domain_lines(&content))
}

/// Read a domain list from any reader, e.g. stdin.
pub fn read_domains<R: Read>(mut reader: R) -> Result<Vec<String>, SweepError> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(|e| SweepError::file_error("<stdin>", format!("Cannot read input: {}", e)))?;
    Ok(parse_domain_lines(&content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_domain_lines() {
        let text = "free1.test\n\n  taken1.test  \n# comment\nflaky1.test\r\nfree1.test\n";
        assert_eq!(
            parse_domain_lines(text),
            vec!["free1.test", "taken1.test", "flaky1.test", "free1.test"]
        );
    }

    #[test]
    fn test_no_syntax_validation() {
        assert_eq!(
            parse_domain_lines("not a domain!\n-x-\n"),
            vec!["not a domain!", "-x-"]
        );
    }

    #[test]
    fn test_read_domains_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "a.test\n#skip\nb.test").unwrap();
        temp_file.flush().unwrap();

        assert_eq!(
            read_domains_file(temp_file.path()).unwrap(),
            vec!["a.test", "b.test"]
        );
        assert!(matches!(
            read_domains_file("/no/such/domains.txt"),
            Err(SweepError::FileError { .. })
        ));
    }

    #[test]
    fn test_read_domains_from_reader() {
        let input = b"one.test\ntwo.test\n" as &[u8];
        assert_eq!(read_domains(input).unwrap(), vec!["one.test", "two.test"]);
    }
}
