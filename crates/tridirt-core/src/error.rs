use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{0}' is a data pack and cannot be launched")]
    NotLaunchable(String),

    #[error("installation of {0} was declined")]
    InstallDeclined(String),

    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("incomplete download: expected {expected} bytes, received {received}")]
    IncompleteDownload { expected: u64, received: u64 },

    #[error("failed to extract archive: {0}")]
    Extraction(String),

    #[error("malformed Last-Modified header '{value}'")]
    MetadataParse { value: String },

    #[error("failed to persist sync state at {}: {source}", path.display())]
    StateWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("installing {tool} through {via} failed: {reason}")]
    DelegateFailed {
        tool: String,
        via: String,
        reason: String,
    },

    #[error("{tool} was installed but {} is missing", path.display())]
    MissingPayload { tool: String, path: PathBuf },

    #[error("failed to install {tool}: {source}")]
    InstallFailed {
        tool: String,
        #[source]
        source: Box<UpdateError>,
    },

    #[error("invalid registry override {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },

    #[error("cannot determine a per-user install directory; set {0}")]
    NoInstallDir(&'static str),

    #[error("interrupted")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl UpdateError {
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            UpdateError::Timeout(timeout)
        } else {
            UpdateError::NetworkUnavailable(err.to_string())
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            UpdateError::Cancelled => true,
            UpdateError::InstallFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_cancelled() {
            EXIT_INTERRUPTED
        } else {
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(UpdateError::Cancelled.exit_code(), EXIT_INTERRUPTED);
        assert_eq!(
            UpdateError::InstallDeclined("trid".into()).exit_code(),
            EXIT_FAILURE
        );
        let wrapped = UpdateError::InstallFailed {
            tool: "trid".into(),
            source: Box::new(UpdateError::Cancelled),
        };
        assert!(wrapped.is_cancelled());
        assert_eq!(wrapped.exit_code(), EXIT_INTERRUPTED);
    }

    #[test]
    fn test_messages_name_the_problem() {
        let err = UpdateError::IncompleteDownload {
            expected: 1000,
            received: 900,
        };
        assert_eq!(
            err.to_string(),
            "incomplete download: expected 1000 bytes, received 900"
        );
        assert_eq!(
            UpdateError::Timeout(Duration::from_secs(10)).to_string(),
            "request timed out after 10s"
        );
        let err = UpdateError::InstallFailed {
            tool: "trid".into(),
            source: Box::new(UpdateError::NetworkUnavailable("dns".into())),
        };
        assert_eq!(
            err.to_string(),
            "failed to install trid: network unavailable: dns"
        );
    }
}
