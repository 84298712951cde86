//! Domain errors for the repair orchestrator.

use thiserror::Error;

use super::ports::ActivityKind;

/// Errors surfaced by the orchestrator to its callers.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An activity exhausted its retry budget (or failed permanently).
    #[error("Activity {activity} failed after {attempts} attempt(s): {message}")]
    ActivityExecution {
        activity: ActivityKind,
        attempts: u32,
        message: String,
    },

    /// A collaborator returned a structurally invalid response. Never retried.
    #[error("Malformed {activity} response: {message}")]
    MalformedResponse {
        activity: ActivityKind,
        message: String,
    },

    #[error("No approval or rejection received within {waited_secs}s")]
    ApprovalTimeout { waited_secs: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A query asked for the result of a phase that has not completed yet.
    #[error("{0} is not available yet")]
    NotReady(String),

    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Workflow already running: {0}")]
    AlreadyRunning(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DomainError {
    /// Whether the error only aborts the current cycle of a proactive loop.
    ///
    /// Phase failures (activity, malformed response, approval timeout) are
    /// cycle-scoped; everything else terminates the process.
    pub fn is_cycle_scoped(&self) -> bool {
        matches!(
            self,
            Self::ActivityExecution { .. }
                | Self::MalformedResponse { .. }
                | Self::ApprovalTimeout { .. }
        )
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DomainError::ActivityExecution {
            activity: ActivityKind::Detect,
            attempts: 5,
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Activity detect failed after 5 attempt(s): connection refused"
        );

        let err = DomainError::NotReady("Planning result".to_string());
        assert_eq!(err.to_string(), "Planning result is not available yet");
    }

    #[test]
    fn test_cycle_scoped_errors() {
        assert!(DomainError::ApprovalTimeout { waited_secs: 10 }.is_cycle_scoped());
        assert!(DomainError::MalformedResponse {
            activity: ActivityKind::Plan,
            message: "missing tool_name".to_string(),
        }
        .is_cycle_scoped());
        assert!(!DomainError::NotFound("prompt".to_string()).is_cycle_scoped());
        assert!(!DomainError::Serialization("eof".to_string()).is_cycle_scoped());
    }
}
