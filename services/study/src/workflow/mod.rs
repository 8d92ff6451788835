//! services/study/src/workflow/mod.rs
//!
//! The study workflow controllers. The presentation layer invokes these
//! operations and re-renders from the snapshots they expose; it never
//! mutates workflow state directly.

pub mod consensus;
pub mod selection;
pub mod tutor;

pub use consensus::{ConsensusController, ConsensusSnapshot, Phase};
pub use selection::SelectionSet;
pub use tutor::{TutorController, TutorSnapshot};

use hivemind_core::ports::PortError;

/// A failure shaped for display by the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A required local precondition was not met. Raised before any request
    /// is sent; these never reach the network.
    #[error("{0}")]
    Validation(String),

    /// The knowledge service request failed. The message is already the
    /// normalized, human-readable form.
    #[error("{0}")]
    Service(String),
}

impl From<PortError> for WorkflowError {
    fn from(error: PortError) -> Self {
        WorkflowError::Service(error.to_string())
    }
}
