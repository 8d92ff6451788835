//! crates/hivemind_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the study workflows.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! workflow controllers to be independent of the HTTP transport that talks to
//! the knowledge service.

use crate::domain::{ConsensusReceipt, MasterNote, Note, Quiz, SessionToken, TutorMode};
use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
///
/// `Service` carries the already-normalized, human-readable message extracted
/// from the service's failure payload; raw payloads never cross this boundary.
/// `Transport` means the request could not complete at all.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("{0}")]
    Service(String),
    #[error("Could not reach the knowledge service: {0}")]
    Transport(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait NoteService: Send + Sync {
    /// Lists the candidate notes for a subject, optionally narrowed to one
    /// chapter. An empty list is a valid outcome, not an error.
    async fn list_notes(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
    ) -> PortResult<Vec<Note>>;
}

#[async_trait]
pub trait ConsensusService: Send + Sync {
    /// Fetches the master note for an exact (subject, chapter) scope.
    /// `Ok(None)` means no consensus exists yet for that scope.
    async fn master_note(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: u32,
    ) -> PortResult<Option<MasterNote>>;

    /// Fetches the caller's most recently updated master note regardless of
    /// scope. `Ok(None)` covers both the explicit no-content marker and
    /// "none found".
    async fn latest_master_note(&self, auth: &SessionToken) -> PortResult<Option<MasterNote>>;

    /// Submits a selection of notes for synthesis. The service may choose a
    /// chapter when none is supplied; the receipt reports the confirmed one.
    async fn synthesize(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
        note_ids: &[i64],
    ) -> PortResult<ConsensusReceipt>;

    /// Fetches the rendered PDF document for a master note as raw bytes.
    async fn master_note_pdf(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: u32,
    ) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait TutorService: Send + Sync {
    /// Submits one conversational turn. `Ok(None)` means the response carried
    /// no answer text, which the caller must tolerate.
    async fn tutor_turn(
        &self,
        auth: &SessionToken,
        question: &str,
        mode: TutorMode,
    ) -> PortResult<Option<String>>;

    /// Fetches the latest unanswered quiz for the session, if one exists.
    async fn latest_quiz(&self, auth: &SessionToken) -> PortResult<Option<Quiz>>;
}
