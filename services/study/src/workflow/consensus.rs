//! services/study/src/workflow/consensus.rs
//!
//! Orchestrates the consensus synthesis workflow: searching peer notes for a
//! scope, building a selection, requesting synthesis, and reconciling the
//! resulting master note back into local state.

use crate::workflow::{SelectionSet, WorkflowError};
use hivemind_core::domain::{Chapter, MasterNote, Note, Scope, SessionToken};
use hivemind_core::ports::{ConsensusService, NoteService};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Which user-triggered operation, if any, is currently in flight. The
/// presentation layer disables the matching control while non-idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Searching,
    Synthesizing,
}

#[derive(Debug, Default)]
struct ConsensusState {
    subject_id: Option<i64>,
    chapter: Chapter,
    candidates: Vec<Note>,
    selection: SelectionSet,
    current_master: Option<MasterNote>,
    /// The most recently seen master note, keyed by its own scope as
    /// reported at fetch time. Survives scope changes.
    last_known_master: Option<MasterNote>,
    phase: Phase,
}

impl ConsensusState {
    fn scope(&self) -> Option<Scope> {
        self.subject_id
            .map(|subject_id| Scope { subject_id, chapter: self.chapter })
    }

    /// The single composite step that swaps the candidate list. Clearing the
    /// selection here, and only here, makes the selection-subset invariant
    /// structural rather than a calling convention.
    fn replace_candidates(&mut self, notes: Vec<Note>) {
        self.candidates = notes;
        self.selection.clear();
    }
}

/// A cloned, render-ready view of the controller state.
#[derive(Debug, Clone)]
pub struct ConsensusSnapshot {
    pub subject_id: Option<i64>,
    pub chapter: Chapter,
    pub candidates: Vec<Note>,
    pub selection: SelectionSet,
    pub current_master: Option<MasterNote>,
    pub last_known_master: Option<MasterNote>,
    pub phase: Phase,
}

/// Drives the consensus synthesis workflow against the note and consensus
/// ports. All operations take `&self`; state lives behind one async mutex,
/// and the lock is never held across a remote call. Every response is
/// applied only if the scope it was requested under is still current, so a
/// slow reply from an abandoned scope can never overwrite newer state.
pub struct ConsensusController {
    notes: Arc<dyn NoteService>,
    consensus: Arc<dyn ConsensusService>,
    auth: SessionToken,
    state: Mutex<ConsensusState>,
}

impl ConsensusController {
    pub fn new(
        notes: Arc<dyn NoteService>,
        consensus: Arc<dyn ConsensusService>,
        auth: SessionToken,
    ) -> Self {
        Self {
            notes,
            consensus,
            auth,
            state: Mutex::new(ConsensusState::default()),
        }
    }

    /// Seeds the last-known-master cache from the service so the session can
    /// offer a "pick up where you left off" shortcut. Absence and failure
    /// are both fine; the cache just stays empty.
    pub async fn initialize(&self) {
        match self.consensus.latest_master_note(&self.auth).await {
            Ok(Some(master)) => {
                debug!(
                    "Seeded last known master note: subject {} chapter {}",
                    master.subject_id, master.chapter
                );
                self.state.lock().await.last_known_master = Some(master);
            }
            Ok(None) => {}
            Err(error) => debug!("Latest master note lookup failed: {}", error),
        }
    }

    /// Updates the scope and invalidates everything derived from it: the
    /// candidate list, the selection, and the displayed master note. The
    /// last-known-master cache is scope-independent and survives. Issues no
    /// request.
    pub async fn set_scope(&self, subject_id: Option<i64>, chapter: Chapter) {
        let mut state = self.state.lock().await;
        state.subject_id = subject_id;
        state.chapter = chapter;
        state.replace_candidates(Vec::new());
        state.current_master = None;
    }

    /// Flips one note in or out of the selection.
    pub async fn toggle_note(&self, note_id: i64) {
        self.state.lock().await.selection.toggle(note_id);
    }

    /// The select-all control: selects every candidate, or clears the
    /// selection when it already covers the whole list.
    pub async fn toggle_select_all(&self) {
        let mut state = self.state.lock().await;
        let candidate_ids: Vec<i64> = state.candidates.iter().map(|note| note.id).collect();
        if state.selection.is_fully_selected(&candidate_ids) {
            state.selection.clear();
        } else {
            state.selection.select_all(&candidate_ids);
        }
    }

    /// Fetches the candidate notes for the current scope. On success the
    /// candidate list is replaced (clearing the selection) and, when the
    /// chapter is concrete, the existing master note for that exact scope is
    /// loaded as a follow-up. A response that arrives after the scope has
    /// changed is discarded without touching anything.
    pub async fn search(&self) -> Result<(), WorkflowError> {
        let requested = {
            let mut state = self.state.lock().await;
            let scope = state.scope().ok_or_else(|| {
                WorkflowError::Validation("Select a subject before searching for notes.".to_string())
            })?;
            state.phase = Phase::Searching;
            scope
        };
        info!(
            "Searching notes for subject {} chapter {}",
            requested.subject_id, requested.chapter
        );

        let result = self
            .notes
            .list_notes(&self.auth, requested.subject_id, requested.chapter.number())
            .await;

        {
            let mut state = self.state.lock().await;
            state.phase = Phase::Idle;
            if state.scope() != Some(requested) {
                debug!("Discarding note search response for a superseded scope");
                return Ok(());
            }
            match result {
                Ok(notes) => {
                    info!("Search returned {} candidate notes", notes.len());
                    state.replace_candidates(notes);
                }
                Err(error) => return Err(error.into()),
            }
        }

        if let Chapter::Number(chapter) = requested.chapter {
            self.load_master(requested.subject_id, chapter).await;
        }
        Ok(())
    }

    /// Submits the selected notes for synthesis. The request and the
    /// follow-up fetch are two separate service round trips: synthesis
    /// confirms (or chooses) the chapter, and the new master note is then
    /// loaded under that confirmed, now-concrete scope.
    pub async fn create_consensus(&self) -> Result<(), WorkflowError> {
        let (requested, note_ids) = {
            let mut state = self.state.lock().await;
            let scope = state.scope().ok_or_else(|| {
                WorkflowError::Validation(
                    "Select a subject before creating a consensus.".to_string(),
                )
            })?;
            if state.selection.is_empty() {
                return Err(WorkflowError::Validation(
                    "Select at least one note to include in the consensus.".to_string(),
                ));
            }
            state.phase = Phase::Synthesizing;
            (scope, state.selection.ids())
        };
        info!(
            "Requesting consensus synthesis for {} notes in subject {} chapter {}",
            note_ids.len(),
            requested.subject_id,
            requested.chapter
        );

        let result = self
            .consensus
            .synthesize(
                &self.auth,
                requested.subject_id,
                requested.chapter.number(),
                &note_ids,
            )
            .await;

        let confirmed_chapter = {
            let mut state = self.state.lock().await;
            state.phase = Phase::Idle;
            if state.scope() != Some(requested) {
                debug!("Discarding consensus response for a superseded scope");
                return Ok(());
            }
            match result {
                Ok(receipt) => {
                    // Adopt the server-confirmed chapter before the follow-up
                    // fetch so the new master note is loaded under the scope
                    // the service actually wrote it to.
                    state.chapter = Chapter::Number(receipt.chapter);
                    receipt.chapter
                }
                Err(error) => return Err(error.into()),
            }
        };

        self.load_master(requested.subject_id, confirmed_chapter).await;
        Ok(())
    }

    /// Fetches the rendered PDF for the current master note and hands the
    /// raw bytes to the caller for saving. No state is mutated either way.
    pub async fn download_master_pdf(&self) -> Result<Vec<u8>, WorkflowError> {
        let (subject_id, chapter) = {
            let state = self.state.lock().await;
            let scope = state.scope().ok_or_else(|| {
                WorkflowError::Validation("Select a subject before downloading.".to_string())
            })?;
            let chapter = scope.chapter.number().ok_or_else(|| {
                WorkflowError::Validation(
                    "Select a concrete chapter before downloading.".to_string(),
                )
            })?;
            (scope.subject_id, chapter)
        };
        let bytes = self
            .consensus
            .master_note_pdf(&self.auth, subject_id, chapter)
            .await?;
        Ok(bytes)
    }

    /// An explicit user action: jumps back to the last known master note by
    /// adopting its scope and showing it as the current one.
    pub async fn recall_last_master(&self) {
        let mut state = self.state.lock().await;
        if let Some(master) = state.last_known_master.clone() {
            state.subject_id = Some(master.subject_id);
            state.chapter = Chapter::Number(master.chapter);
            state.current_master = Some(master);
        }
    }

    /// Drops the last-known-master shortcut for this session.
    pub async fn dismiss_last_master(&self) {
        self.state.lock().await.last_known_master = None;
    }

    pub async fn snapshot(&self) -> ConsensusSnapshot {
        let state = self.state.lock().await;
        ConsensusSnapshot {
            subject_id: state.subject_id,
            chapter: state.chapter,
            candidates: state.candidates.clone(),
            selection: state.selection.clone(),
            current_master: state.current_master.clone(),
            last_known_master: state.last_known_master.clone(),
            phase: state.phase,
        }
    }

    /// Fetches the master note for a concrete scope. Absence and failure
    /// both leave the view empty; "no consensus yet" is a normal terminal
    /// state, not an error. Applied only if the scope is still current.
    async fn load_master(&self, subject_id: i64, chapter: u32) {
        let requested = Scope { subject_id, chapter: Chapter::Number(chapter) };
        let result = self.consensus.master_note(&self.auth, subject_id, chapter).await;

        let mut state = self.state.lock().await;
        if state.scope() != Some(requested) {
            debug!("Discarding master note response for a superseded scope");
            return;
        }
        match result {
            Ok(Some(master)) => {
                state.current_master = Some(master.clone());
                state.last_known_master = Some(master);
            }
            Ok(None) => state.current_master = None,
            Err(error) => {
                warn!("Master note fetch failed: {}", error);
                state.current_master = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use hivemind_core::domain::ConsensusReceipt;
    use hivemind_core::ports::{PortError, PortResult};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    fn note(id: i64, subject_id: i64, chapter: u32) -> Note {
        Note {
            id,
            subject_id,
            chapter: Some(chapter),
            teacher: Some("Ms. Hart".to_string()),
            year: Some(2025),
            pseudo_name: Some(format!("peer-{}", id)),
            content: format!("note {}", id),
            created_at: Utc::now(),
        }
    }

    fn master(subject_id: i64, chapter: u32, version: u32) -> MasterNote {
        MasterNote {
            subject_id,
            chapter,
            topic: format!("Subject {} - Chapter {}", subject_id, chapter),
            version,
            content: "synthesized".to_string(),
            created_at: Utc::now(),
        }
    }

    /// A scriptable stand-in for the knowledge service. `synthesize` stores
    /// a master note under the confirmed chapter, the way the real service
    /// persists before the client's follow-up fetch.
    struct FakeKnowledge {
        notes: StdMutex<Result<Vec<Note>, String>>,
        masters: StdMutex<HashMap<(i64, u32), MasterNote>>,
        synthesis: StdMutex<Result<ConsensusReceipt, String>>,
        list_calls: AtomicUsize,
        synthesize_calls: AtomicUsize,
        master_requests: StdMutex<Vec<(i64, u32)>>,
        /// When set, `list_notes` blocks until notified, so tests can slide
        /// a scope change in under an in-flight search.
        list_gate: Option<Arc<Notify>>,
    }

    impl FakeKnowledge {
        fn with_notes(notes: Vec<Note>) -> Self {
            Self {
                notes: StdMutex::new(Ok(notes)),
                masters: StdMutex::default(),
                synthesis: StdMutex::new(Err("synthesis not scripted".to_string())),
                list_calls: AtomicUsize::new(0),
                synthesize_calls: AtomicUsize::new(0),
                master_requests: StdMutex::default(),
                list_gate: None,
            }
        }

        fn set_synthesis(&self, receipt: ConsensusReceipt, resulting: MasterNote) {
            let key = (resulting.subject_id, resulting.chapter);
            self.masters.lock().unwrap().insert(key, resulting);
            *self.synthesis.lock().unwrap() = Ok(receipt);
        }
    }

    #[async_trait]
    impl NoteService for FakeKnowledge {
        async fn list_notes(
            &self,
            _auth: &SessionToken,
            _subject_id: i64,
            _chapter: Option<u32>,
        ) -> PortResult<Vec<Note>> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.list_gate {
                gate.notified().await;
            }
            self.notes
                .lock()
                .unwrap()
                .clone()
                .map_err(PortError::Service)
        }
    }

    #[async_trait]
    impl ConsensusService for FakeKnowledge {
        async fn master_note(
            &self,
            _auth: &SessionToken,
            subject_id: i64,
            chapter: u32,
        ) -> PortResult<Option<MasterNote>> {
            self.master_requests.lock().unwrap().push((subject_id, chapter));
            Ok(self.masters.lock().unwrap().get(&(subject_id, chapter)).cloned())
        }

        async fn latest_master_note(
            &self,
            _auth: &SessionToken,
        ) -> PortResult<Option<MasterNote>> {
            Ok(None)
        }

        async fn synthesize(
            &self,
            _auth: &SessionToken,
            _subject_id: i64,
            _chapter: Option<u32>,
            _note_ids: &[i64],
        ) -> PortResult<ConsensusReceipt> {
            self.synthesize_calls.fetch_add(1, Ordering::SeqCst);
            self.synthesis
                .lock()
                .unwrap()
                .clone()
                .map_err(PortError::Service)
        }

        async fn master_note_pdf(
            &self,
            _auth: &SessionToken,
            _subject_id: i64,
            _chapter: u32,
        ) -> PortResult<Vec<u8>> {
            Ok(b"%PDF-1.4".to_vec())
        }
    }

    fn controller(service: Arc<FakeKnowledge>) -> ConsensusController {
        ConsensusController::new(
            service.clone(),
            service,
            SessionToken("test-token".to_string()),
        )
    }

    #[tokio::test]
    async fn search_requires_a_subject() {
        let service = Arc::new(FakeKnowledge::with_notes(Vec::new()));
        let controller = controller(service.clone());

        let error = controller.search().await.unwrap_err();
        assert!(matches!(error, WorkflowError::Validation(_)));
        assert_eq!(service.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_replaces_candidates_and_clears_selection() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3), note(11, 1, 3)]));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::All).await;
        controller.search().await.unwrap();
        controller.toggle_note(10).await;
        assert_eq!(controller.snapshot().await.selection.len(), 1);

        // A fresh search replaces the list and must clear the selection.
        controller.search().await.unwrap();
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.candidates.len(), 2);
        assert!(snapshot.selection.is_empty());
        assert_eq!(snapshot.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn search_failure_leaves_candidates_unchanged() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3)]));
        let controller = controller(service.clone());
        controller.set_scope(Some(1), Chapter::All).await;
        controller.search().await.unwrap();

        *service.notes.lock().unwrap() = Err("notes unavailable".to_string());
        let error = controller.search().await.unwrap_err();
        assert!(matches!(error, WorkflowError::Service(ref m) if m == "notes unavailable"));

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.candidates.len(), 1);
        assert_eq!(snapshot.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn stale_search_response_is_discarded() {
        let gate = Arc::new(Notify::new());
        let mut service = FakeKnowledge::with_notes(vec![note(10, 1, 3)]);
        service.list_gate = Some(gate.clone());
        let service = Arc::new(service);
        let controller = Arc::new(controller(service.clone()));

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        let in_flight = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.search().await })
        };

        // Let the search reach the service, then navigate away.
        while service.list_calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        controller.set_scope(Some(2), Chapter::All).await;
        gate.notify_one();

        in_flight.await.unwrap().unwrap();
        let snapshot = controller.snapshot().await;
        assert!(snapshot.candidates.is_empty());
        assert_eq!(snapshot.subject_id, Some(2));
        assert_eq!(snapshot.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn create_consensus_rejects_missing_subject_and_empty_selection() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3)]));
        let controller = controller(service.clone());

        let no_subject = controller.create_consensus().await.unwrap_err();
        assert!(matches!(no_subject, WorkflowError::Validation(ref m) if m.contains("subject")));

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        controller.search().await.unwrap();
        let no_selection = controller.create_consensus().await.unwrap_err();
        assert!(matches!(no_selection, WorkflowError::Validation(ref m) if m.contains("note")));

        // Validation failures never reach the service.
        assert_eq!(service.synthesize_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn consensus_flow_fetches_master_under_confirmed_scope() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3), note(11, 1, 3)]));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        controller.search().await.unwrap();
        controller.toggle_note(10).await;

        service.set_synthesis(
            ConsensusReceipt {
                message: "Consensus reached and Master Note updated".to_string(),
                notes_processed: 1,
                chapter: 3,
            },
            master(1, 3, 1),
        );
        controller.create_consensus().await.unwrap();

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.current_master.as_ref().unwrap().version, 1);
        assert_eq!(
            service.master_requests.lock().unwrap().last().copied(),
            Some((1, 3))
        );
    }

    #[tokio::test]
    async fn server_chosen_chapter_is_adopted_before_the_follow_up_fetch() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 7)]));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::All).await;
        controller.search().await.unwrap();
        controller.toggle_select_all().await;

        service.set_synthesis(
            ConsensusReceipt {
                message: "ok".to_string(),
                notes_processed: 1,
                chapter: 7,
            },
            master(1, 7, 1),
        );
        controller.create_consensus().await.unwrap();

        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.chapter, Chapter::Number(7));
        assert_eq!(
            service.master_requests.lock().unwrap().last().copied(),
            Some((1, 7))
        );
        assert!(snapshot.current_master.is_some());
    }

    #[tokio::test]
    async fn failed_synthesis_touches_no_artifact_state() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3)]));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        controller.search().await.unwrap();
        controller.toggle_note(10).await;

        *service.synthesis.lock().unwrap() = Err("AI Agent error: overloaded".to_string());
        let error = controller.create_consensus().await.unwrap_err();
        assert!(matches!(error, WorkflowError::Service(_)));

        let snapshot = controller.snapshot().await;
        assert!(snapshot.current_master.is_none());
        assert_eq!(snapshot.phase, Phase::Idle);
        assert_eq!(snapshot.selection.len(), 1);
    }

    #[tokio::test]
    async fn scope_change_keeps_the_last_known_master() {
        let service = Arc::new(FakeKnowledge::with_notes(vec![note(10, 1, 3)]));
        service
            .masters
            .lock()
            .unwrap()
            .insert((1, 3), master(1, 3, 2));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        controller.search().await.unwrap();
        assert!(controller.snapshot().await.current_master.is_some());

        controller.set_scope(Some(9), Chapter::All).await;
        let snapshot = controller.snapshot().await;
        assert!(snapshot.current_master.is_none());
        assert!(snapshot.candidates.is_empty());
        assert!(snapshot.selection.is_empty());
        assert_eq!(
            snapshot.last_known_master.as_ref().map(|m| m.version),
            Some(2)
        );

        // Recall adopts the cached scope and shows the note again.
        controller.recall_last_master().await;
        let snapshot = controller.snapshot().await;
        assert_eq!(snapshot.subject_id, Some(1));
        assert_eq!(snapshot.chapter, Chapter::Number(3));
        assert!(snapshot.current_master.is_some());
    }

    #[tokio::test]
    async fn download_requires_a_concrete_scope() {
        let service = Arc::new(FakeKnowledge::with_notes(Vec::new()));
        let controller = controller(service.clone());

        controller.set_scope(Some(1), Chapter::All).await;
        let error = controller.download_master_pdf().await.unwrap_err();
        assert!(matches!(error, WorkflowError::Validation(ref m) if m.contains("chapter")));

        controller.set_scope(Some(1), Chapter::Number(3)).await;
        let bytes = controller.download_master_pdf().await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
