use crossbeam_channel as cb;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{FetchError, LoadError};

#[cfg(feature = "http")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Where a flag document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLocation {
    File(PathBuf),
    Url(String),
}

impl FromStr for DocumentLocation {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if has_scheme(s, "http://") || has_scheme(s, "https://") {
            return Ok(Self::Url(s.to_string()));
        }
        let path = s.strip_prefix("file://").unwrap_or(s);
        Ok(Self::File(PathBuf::from(path)))
    }
}

fn has_scheme(s: &str, scheme: &str) -> bool {
    s.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

impl fmt::Display for DocumentLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Url(url) => f.write_str(url),
        }
    }
}

/// Retrieves raw document bytes. Called from a worker thread.
pub trait DocumentFetcher: Send + Sync {
    fn fetch(&self, location: &DocumentLocation) -> Result<Vec<u8>, FetchError>;
}

/// Reads local files and, with the `http` feature, fetches URLs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFetcher;

impl DocumentFetcher for DefaultFetcher {
    fn fetch(&self, location: &DocumentLocation) -> Result<Vec<u8>, FetchError> {
        match location {
            DocumentLocation::File(path) => std::fs::read(path).map_err(|source| FetchError::Io {
                path: path.clone(),
                source,
            }),
            DocumentLocation::Url(url) => fetch_url(url),
        }
    }
}

#[cfg(feature = "http")]
fn fetch_url(url: &str) -> Result<Vec<u8>, FetchError> {
    let http_err = |source| FetchError::Http {
        url: url.to_string(),
        source,
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(http_err)?;
    let resp = client.get(url).send().map_err(http_err)?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    let bytes = resp.bytes().map_err(http_err)?;
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "http"))]
fn fetch_url(url: &str) -> Result<Vec<u8>, FetchError> {
    Err(FetchError::Unsupported(url.to_string()))
}

/// Outcome of an applied load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub ticket: u64,
    pub features: usize,
}

/// Pending result of an asynchronous configuration load.
#[derive(Debug)]
pub struct LoadHandle {
    ticket: u64,
    rx: cb::Receiver<Result<LoadSummary, LoadError>>,
}

impl LoadHandle {
    pub(crate) fn new(ticket: u64, rx: cb::Receiver<Result<LoadSummary, LoadError>>) -> Self {
        Self { ticket, rx }
    }

    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    /// Blocks until the load finishes.
    pub fn wait(self) -> Result<LoadSummary, LoadError> {
        self.rx.recv().unwrap_or(Err(LoadError::WorkerGone))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<LoadSummary, LoadError>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(cb::RecvTimeoutError::Timeout) => None,
            Err(cb::RecvTimeoutError::Disconnected) => Some(Err(LoadError::WorkerGone)),
        }
    }

    /// Non-blocking poll; `None` while the load is still running.
    pub fn try_result(&self) -> Option<Result<LoadSummary, LoadError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(cb::TryRecvError::Empty) => None,
            Err(cb::TryRecvError::Disconnected) => Some(Err(LoadError::WorkerGone)),
        }
    }
}
