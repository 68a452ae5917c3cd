//! Malware scanner adapter: a plain line-protocol client against an
//! external scanner process, grounded on `documents/tasks.py::scan_pdf_task`
//! (a clamd `INSTREAM`/`CONTSCAN`-shaped contract). The wire format is an
//! implementation detail behind [`MalwareScanner`]; the scanner process
//! itself is a contract-only collaborator this crate never runs.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scanner connection failed: {0}")]
    Connect(#[from] std::io::Error),
    #[error("scanner response timed out")]
    Timeout,
    /// Resolution for the open question on a missing/garbled response line:
    /// classify it explicitly rather than folding it into a generic I/O
    /// error, since operators need to tell "scanner is down" apart from
    /// "scanner said something we don't understand".
    #[error("scanner returned an unparseable response")]
    InvalidResponse,
}

pub const SCAN_ERROR_CODE_INVALID_RESPONSE: &str = "CLAMAV_INVALID_RESPONSE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected { signature: String },
    /// The scanner ran and reported its own error status for the file
    /// (a clamd `... ERROR` line), as opposed to a transport failure or an
    /// unparseable response.
    Error { message: String },
}

#[async_trait]
pub trait MalwareScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, ScanError>;
}

pub struct TcpLineScanner {
    addr: String,
    timeout: Duration,
}

impl TcpLineScanner {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }
}

#[async_trait]
impl MalwareScanner for TcpLineScanner {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict, ScanError> {
        let fut = async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            let command = format!("SCAN {}\n", path.display());
            stream.write_all(command.as_bytes()).await?;

            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            parse_response(&line).ok_or(ScanError::InvalidResponse)
        };

        match timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::Timeout),
        }
    }
}

/// `None` means the line is missing or doesn't match any known clamd
/// status suffix; the caller must treat that as an invalid response rather
/// than defaulting to a verdict.
fn parse_response(line: &str) -> Option<ScanVerdict> {
    let line = line.trim().trim_end_matches('\0');
    if line.is_empty() {
        return None;
    }
    if line.ends_with("OK") {
        Some(ScanVerdict::Clean)
    } else if let Some(rest) = line.strip_suffix("FOUND") {
        let signature = rest
            .rsplit(':')
            .next()
            .unwrap_or("unknown")
            .trim()
            .to_string();
        Some(ScanVerdict::Infected { signature })
    } else if let Some(rest) = line.strip_suffix("ERROR") {
        let message = rest.rsplit(':').next().unwrap_or("unknown").trim().to_string();
        Some(ScanVerdict::Error { message })
    } else {
        None
    }
}

/// Deterministic scanner for tests: never touches the network.
pub struct FakeScanner {
    pub verdict: Result<ScanVerdict, ()>,
}

impl FakeScanner {
    pub fn clean() -> Self {
        Self { verdict: Ok(ScanVerdict::Clean) }
    }

    pub fn infected(signature: impl Into<String>) -> Self {
        Self {
            verdict: Ok(ScanVerdict::Infected { signature: signature.into() }),
        }
    }

    pub fn scanner_error(message: impl Into<String>) -> Self {
        Self {
            verdict: Ok(ScanVerdict::Error { message: message.into() }),
        }
    }

    pub fn invalid_response() -> Self {
        Self { verdict: Err(()) }
    }
}

#[async_trait]
impl MalwareScanner for FakeScanner {
    async fn scan(&self, _path: &Path) -> Result<ScanVerdict, ScanError> {
        self.verdict.clone().map_err(|_| ScanError::InvalidResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_response() {
        assert_eq!(parse_response("/tmp/a.pdf: OK\0"), Some(ScanVerdict::Clean));
    }

    #[test]
    fn parses_infected_response() {
        let verdict = parse_response("/tmp/a.pdf: Eicar-Test-Signature FOUND\0");
        assert_eq!(
            verdict,
            Some(ScanVerdict::Infected { signature: "Eicar-Test-Signature".to_string() })
        );
    }

    #[test]
    fn parses_error_response() {
        let verdict = parse_response("/tmp/a.pdf: Can't access file ERROR\0");
        assert_eq!(
            verdict,
            Some(ScanVerdict::Error { message: "Can't access file".to_string() })
        );
    }

    #[test]
    fn unrecognized_response_is_not_parsed() {
        assert_eq!(parse_response("garbage\0"), None);
        assert_eq!(parse_response(""), None);
    }

    #[tokio::test]
    async fn fake_scanner_reports_the_configured_verdict() {
        let scanner = FakeScanner::infected("Eicar-Test-Signature");
        let verdict = scanner.scan(Path::new("/tmp/x")).await.unwrap();
        assert_eq!(verdict, ScanVerdict::Infected { signature: "Eicar-Test-Signature".into() });
    }
}
