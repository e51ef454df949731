//! Error types for the PoP console

use std::fmt;
use thiserror::Error;

/// Result type alias using the console Error
pub type Result<T> = std::result::Result<T, Error>;

/// Why a wizard request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthorizedReason {
    /// No token file on disk, so no wizard session is running
    NoSession,
    /// A session exists but the supplied token does not match
    InvalidToken,
}

impl fmt::Display for UnauthorizedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => f.write_str("No active wizard session"),
            Self::InvalidToken => f.write_str("Invalid token"),
        }
    }
}

/// Console error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(UnauthorizedReason),

    #[error("Invalid step name: {0}")]
    InvalidStep(String),

    #[error("Wizard status not found")]
    NotFound,

    #[error("Wizard status is corrupt: {0}")]
    CorruptState(String),

    #[error("Command exited with {}: {stderr}", exit_label(.code))]
    CommandFailed {
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Installation failed: {0}")]
    InstallationFailed(String),
}

fn exit_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

impl Error {
    /// Captured stderr of a failed command, or the error text for anything else.
    ///
    /// This is what HTTP handlers surface in the `error` field of failure bodies.
    pub fn detail(&self) -> String {
        match self {
            Error::CommandFailed { stderr, .. } => stderr.clone(),
            Error::InstallationFailed(detail) => detail.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_messages() {
        assert_eq!(
            Error::Unauthorized(UnauthorizedReason::NoSession).to_string(),
            "Unauthorized: No active wizard session"
        );
        assert_eq!(
            Error::Unauthorized(UnauthorizedReason::InvalidToken).to_string(),
            "Unauthorized: Invalid token"
        );
    }

    #[test]
    fn test_detail_prefers_stderr() {
        let err = Error::CommandFailed {
            code: Some(2),
            stdout: "partial".into(),
            stderr: "node binary missing".into(),
        };
        assert_eq!(err.detail(), "node binary missing");
        assert_eq!(err.to_string(), "Command exited with 2: node binary missing");
    }
}
