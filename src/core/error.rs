//! Error taxonomy shared by the queue, the pipeline, and the collaborators.
//!
//! Every error maps to an [`ErrorKind`]. Whether an operation is retried in
//! place or a job is dead-lettered depends only on that kind.

use thiserror::Error;

use crate::domain::{CaptionError, ValidationError};

/// Broad classes of failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or broker hiccup; retried with backoff where it happens
    Transport,

    /// A collaborator failed or answered with something unusable
    Collaborator,

    /// Bad input; rejected at ingestion, never retried
    Validation,

    /// Anything else
    Fatal,
}

/// What to do with a failure of a given kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Retry the operation in place with bounded backoff
    Retry,

    /// Abort the job and route its message to the dead-letter queue
    DeadLetter,
}

impl ErrorKind {
    pub fn disposition(self) -> Disposition {
        match self {
            Self::Transport => Disposition::Retry,
            Self::Collaborator | Self::Validation | Self::Fatal => Disposition::DeadLetter,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.disposition() == Disposition::Retry
    }
}

/// Errors that can be classified
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

/// Errors raised by pipeline stages and the collaborators they call
#[derive(Debug, Error)]
pub enum StageError {
    #[error("{operation} failed: {message}")]
    Transport { operation: String, message: String },

    #[error("{collaborator} error: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} returned a malformed response: {message}")]
    MalformedResponse {
        collaborator: &'static str,
        message: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Caption document error: {0}")]
    Caption(#[from] CaptionError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Fatal(String),
}

impl StageError {
    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn collaborator(collaborator: &'static str, message: impl ToString) -> Self {
        Self::Collaborator {
            collaborator,
            message: message.to_string(),
        }
    }

    pub fn malformed(collaborator: &'static str, message: impl ToString) -> Self {
        Self::MalformedResponse {
            collaborator,
            message: message.to_string(),
        }
    }

    /// Classify a `reqwest` failure: connection problems and timeouts are
    /// transport errors, anything else belongs to the collaborator.
    pub fn from_http(collaborator: &'static str, operation: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            Self::transport(format!("{} {}", collaborator, operation), err)
        } else if err.is_decode() {
            Self::malformed(collaborator, err)
        } else {
            Self::collaborator(collaborator, err)
        }
    }

    /// Classify a non-2xx status: 5xx and 429 are worth retrying
    pub fn from_status(
        collaborator: &'static str,
        operation: &str,
        status: reqwest::StatusCode,
        body: &str,
    ) -> Self {
        let message = format!("HTTP {}: {}", status, body.trim());
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            Self::transport(format!("{} {}", collaborator, operation), message)
        } else {
            Self::collaborator(collaborator, message)
        }
    }
}

impl Classify for StageError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Collaborator { .. } | Self::MalformedResponse { .. } => ErrorKind::Collaborator,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Caption(_) | Self::Io(_) | Self::Serialization(_) | Self::Fatal(_) => {
                ErrorKind::Fatal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_is_retried() {
        assert_eq!(ErrorKind::Transport.disposition(), Disposition::Retry);
        assert_eq!(ErrorKind::Collaborator.disposition(), Disposition::DeadLetter);
        assert_eq!(ErrorKind::Validation.disposition(), Disposition::DeadLetter);
        assert_eq!(ErrorKind::Fatal.disposition(), Disposition::DeadLetter);
    }

    #[test]
    fn test_status_classification() {
        let err = StageError::from_status(
            "openai",
            "chat completion",
            reqwest::StatusCode::BAD_GATEWAY,
            "upstream",
        );
        assert_eq!(err.kind(), ErrorKind::Transport);

        let err = StageError::from_status(
            "openai",
            "chat completion",
            reqwest::StatusCode::UNAUTHORIZED,
            "bad key",
        );
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_stage_error_kinds() {
        assert_eq!(
            StageError::malformed("openai", "not json").kind(),
            ErrorKind::Collaborator
        );
        assert_eq!(
            StageError::from(ValidationError::EmptySource).kind(),
            ErrorKind::Validation
        );
        assert_eq!(StageError::Fatal("panic".into()).kind(), ErrorKind::Fatal);
    }
}
