//! services/study/src/error.rs
//!
//! Defines the primary error type for the entire study client.

use crate::config::ConfigError;
use crate::workflow::WorkflowError;
use hivemind_core::ports::PortError;

/// The primary error type for the `study` client.
#[derive(Debug, thiserror::Error)]
pub enum StudyError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a workflow-level failure already shaped for display.
    #[error("{0}")]
    Workflow(#[from] WorkflowError),

    /// Represents a standard Input/Output error (e.g., reading from stdin).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
