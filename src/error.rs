//! Error types for the transfer orchestrator
//!
//! Collaborators (ledger, indexer, transfer engine) all report `ServiceError`.
//! The orchestrator wraps those with the step that failed and surfaces a single
//! `OrchestratorError` taxonomy to callers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::types::ContentRoot;

/// Workflow step an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Selection,
    SessionOpen,
    Push,
    Commit,
    Pull,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Selection => "selection",
            Step::SessionOpen => "session-open",
            Step::Push => "push",
            Step::Commit => "commit",
            Step::Pull => "pull",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collaborator the orchestrator connects to at construction time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Chain,
    Indexer,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Chain => f.write_str("chain"),
            Collaborator::Indexer => f.write_str("indexer"),
        }
    }
}

/// Error reported by a collaborator (ledger, indexer, storage node)
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Remote could not be reached or the connection dropped
    #[error("Network error: {0}")]
    Network(String),

    /// Remote answered with something we could not understand
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Requested content is not held by the remote
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bytes arrived but do not match the claimed content root
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    /// Remote refused the request (RPC error, reverted transaction)
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the orchestrator
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Construction-time failure reaching or authenticating a collaborator
    #[error("Failed to connect to {collaborator}: {message}")]
    Connection {
        collaborator: Collaborator,
        message: String,
    },

    /// Invalid local input (missing file, unwritable output, conflicting flags)
    #[error("Invalid input: {0}")]
    Input(String),

    /// Selection returned fewer usable endpoints than the policy requires
    #[error("Insufficient replicas: {required} required, {available} available")]
    InsufficientReplicas { required: usize, available: usize },

    /// Network or protocol failure during session-open, push or pull
    #[error("Transfer failed during {step}: {message}")]
    Transfer { step: Step, message: String },

    /// Fetched content failed verification against the content root
    #[error("Integrity check failed for {root}: {message}")]
    Integrity { root: ContentRoot, message: String },

    /// Ledger rejected the commitment; data is stored but unconfirmed
    #[error("Commitment for {root} failed (data stored, unconfirmed on-chain): {message}")]
    Commit { root: ContentRoot, message: String },

    /// Transfer context deadline expired
    #[error("Timed out during {step} after {after:?}")]
    Timeout { step: Step, after: Duration },

    /// Transfer context was cancelled by the caller
    #[error("Cancelled during {step}")]
    Cancelled { step: Step },
}

impl OrchestratorError {
    /// Wrap a collaborator error raised while executing `step`.
    ///
    /// Integrity failures keep their own variant so callers can tell
    /// "bytes never arrived" from "bytes arrived but do not match".
    pub(crate) fn from_service(step: Step, root: Option<&ContentRoot>, err: ServiceError) -> Self {
        match (step, err, root) {
            (_, ServiceError::Integrity(message), Some(root)) => OrchestratorError::Integrity {
                root: *root,
                message,
            },
            (Step::Commit, err, Some(root)) => OrchestratorError::Commit {
                root: *root,
                message: err.to_string(),
            },
            (step, err, _) => OrchestratorError::Transfer {
                step,
                message: err.to_string(),
            },
        }
    }

    /// Step this error is attributed to, if any
    pub fn step(&self) -> Option<Step> {
        match self {
            OrchestratorError::Transfer { step, .. }
            | OrchestratorError::Timeout { step, .. }
            | OrchestratorError::Cancelled { step } => Some(*step),
            OrchestratorError::InsufficientReplicas { .. } => Some(Step::Selection),
            OrchestratorError::Integrity { .. } => Some(Step::Pull),
            OrchestratorError::Commit { .. } => Some(Step::Commit),
            OrchestratorError::Connection { .. } | OrchestratorError::Input(_) => None,
        }
    }
}

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> ContentRoot {
        ContentRoot::from_bytes([7u8; 32])
    }

    #[test]
    fn test_integrity_keeps_its_own_variant() {
        let err = OrchestratorError::from_service(
            Step::Pull,
            Some(&root()),
            ServiceError::Integrity("proof mismatch at segment 0".into()),
        );
        assert!(matches!(err, OrchestratorError::Integrity { .. }));
        assert_eq!(err.step(), Some(Step::Pull));
    }

    #[test]
    fn test_commit_step_maps_to_commit_error() {
        let err = OrchestratorError::from_service(
            Step::Commit,
            Some(&root()),
            ServiceError::Rejected("transaction reverted".into()),
        );
        assert!(matches!(err, OrchestratorError::Commit { .. }));
        assert!(err.to_string().contains("unconfirmed"));
    }

    #[test]
    fn test_network_failure_is_tagged_with_step() {
        let err = OrchestratorError::from_service(
            Step::Push,
            None,
            ServiceError::Network("connection refused".into()),
        );
        match err {
            OrchestratorError::Transfer { step, message } => {
                assert_eq!(step, Step::Push);
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::InsufficientReplicas {
            required: 3,
            available: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient replicas: 3 required, 1 available"
        );

        let err = OrchestratorError::Connection {
            collaborator: Collaborator::Indexer,
            message: "handshake failed".into(),
        };
        assert_eq!(err.to_string(), "Failed to connect to indexer: handshake failed");
    }
}
