use std::fmt;

#[derive(Debug)]
pub enum Error {
    Http(reqwest::Error),
    Api { status: u16, reason: String },
    Conflict { pod: String, property: String, reason: String },
    UnknownDevice(String),
    DuplicateDevice(String),
    MissingData(String),
    Protocol(String),
    InvalidThresholds(String),
    Io(std::io::Error),
}

impl Error {
    /// Failures of the remote round trip itself, including rejected writes.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Api { .. } | Error::Conflict { .. }
        )
    }

    /// Failures to find a requested device or an expected field in a payload.
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Error::UnknownDevice(_)
                | Error::DuplicateDevice(_)
                | Error::MissingData(_)
                | Error::Protocol(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Http(e) => write!(f, "HTTP error: {e}"),
            Error::Api { status, reason } => write!(f, "API error (HTTP {status}): {reason}"),
            Error::Conflict { pod, property, reason } => {
                write!(f, "conflicting AC state for pod {pod} while changing {property}: {reason}")
            }
            Error::UnknownDevice(name) => write!(f, "unknown device: {name}"),
            Error::DuplicateDevice(name) => write!(f, "duplicate device name: {name}"),
            Error::MissingData(what) => write!(f, "missing data: {what}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::InvalidThresholds(msg) => write!(f, "invalid thresholds: {msg}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Http(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// The request URL carries the API key as a query parameter.
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Http(e.without_url())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
