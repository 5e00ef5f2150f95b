use serde::{Deserialize, Serialize};
use super::types::GuardError;

/// Coarse failure taxonomy used for retry, breaker and reporting decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Timeouts, refused connections, 5xx responses. Retried.
    Transient,
    /// Bad ids, auth failures, malformed responses. Never retried.
    Permanent,
    /// The breaker refused the call; the target was not contacted.
    CircuitOpen,
    /// An audit or history write failed.
    Persistence,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::CircuitOpen => "circuit_open",
            Self::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub kind: ErrorKind,
}

impl ErrorClassification {
    pub fn retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl GuardError {
    /// Classify this error to determine its kind and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            GuardError::Transient(_) => ErrorClassification {
                error_type: "TransientError",
                kind: ErrorKind::Transient,
            },
            GuardError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                kind: ErrorKind::Transient,
            },
            GuardError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                kind: ErrorKind::Transient,
            },
            GuardError::ServiceUnavailable(_) => ErrorClassification {
                error_type: "ServiceUnavailableError",
                kind: ErrorKind::Transient,
            },
            GuardError::Io(_) => ErrorClassification {
                error_type: "IoError",
                kind: ErrorKind::Transient,
            },

            // Non-retryable errors
            GuardError::Permanent(_) => ErrorClassification {
                error_type: "PermanentError",
                kind: ErrorKind::Permanent,
            },
            GuardError::NotFound(_) => ErrorClassification {
                error_type: "NotFoundError",
                kind: ErrorKind::Permanent,
            },
            GuardError::Authentication(_) => ErrorClassification {
                error_type: "AuthenticationError",
                kind: ErrorKind::Permanent,
            },
            GuardError::InvalidResponse(_) => ErrorClassification {
                error_type: "InvalidResponseError",
                kind: ErrorKind::Permanent,
            },
            GuardError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                kind: ErrorKind::Permanent,
            },
            GuardError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                kind: ErrorKind::Permanent,
            },
            GuardError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                kind: ErrorKind::Permanent,
            },
            GuardError::DuplicateAgent(_) => ErrorClassification {
                error_type: "DuplicateAgentError",
                kind: ErrorKind::Permanent,
            },
            GuardError::UnknownAgent(_) => ErrorClassification {
                error_type: "UnknownAgentError",
                kind: ErrorKind::Permanent,
            },
            GuardError::AgentBusy(_) => ErrorClassification {
                error_type: "AgentBusyError",
                kind: ErrorKind::Permanent,
            },
            GuardError::AgentDisabled(_) => ErrorClassification {
                error_type: "AgentDisabledError",
                kind: ErrorKind::Permanent,
            },
            GuardError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                kind: ErrorKind::Permanent,
            },

            // Rejections and audit failures
            GuardError::CircuitOpen(_) => ErrorClassification {
                error_type: "CircuitOpenError",
                kind: ErrorKind::CircuitOpen,
            },
            GuardError::Persistence(_) => ErrorClassification {
                error_type: "PersistenceError",
                kind: ErrorKind::Persistence,
            },
            GuardError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                kind: ErrorKind::Persistence,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.classify().kind
    }
}
