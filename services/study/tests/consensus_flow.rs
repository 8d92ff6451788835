//! services/study/tests/consensus_flow.rs
//!
//! End-to-end exercise of the consensus workflow through its public API,
//! against an in-process stand-in for the knowledge service.

use async_trait::async_trait;
use chrono::Utc;
use hivemind_core::domain::{
    Chapter, ConsensusReceipt, MasterNote, Note, SessionToken,
};
use hivemind_core::ports::{ConsensusService, NoteService, PortResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use study_lib::workflow::{ConsensusController, Phase};

/// A minimal knowledge service: a fixed set of notes, and a synthesis step
/// that versions master notes per (subject, chapter) the way the real
/// service does.
struct InProcessKnowledge {
    notes: Vec<Note>,
    masters: Mutex<HashMap<(i64, u32), MasterNote>>,
}

impl InProcessKnowledge {
    fn new(notes: Vec<Note>) -> Self {
        Self { notes, masters: Mutex::new(HashMap::new()) }
    }
}

#[async_trait]
impl NoteService for InProcessKnowledge {
    async fn list_notes(
        &self,
        _auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
    ) -> PortResult<Vec<Note>> {
        Ok(self
            .notes
            .iter()
            .filter(|n| n.subject_id == subject_id)
            .filter(|n| chapter.is_none() || n.chapter == chapter)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ConsensusService for InProcessKnowledge {
    async fn master_note(
        &self,
        _auth: &SessionToken,
        subject_id: i64,
        chapter: u32,
    ) -> PortResult<Option<MasterNote>> {
        Ok(self.masters.lock().unwrap().get(&(subject_id, chapter)).cloned())
    }

    async fn latest_master_note(&self, _auth: &SessionToken) -> PortResult<Option<MasterNote>> {
        Ok(None)
    }

    async fn synthesize(
        &self,
        _auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
        note_ids: &[i64],
    ) -> PortResult<ConsensusReceipt> {
        // The service falls back to the first selected note's chapter when
        // the request leaves it unspecified.
        let confirmed = chapter
            .or_else(|| {
                self.notes
                    .iter()
                    .find(|n| note_ids.contains(&n.id))
                    .and_then(|n| n.chapter)
            })
            .unwrap_or(1);

        let mut masters = self.masters.lock().unwrap();
        let entry = masters.entry((subject_id, confirmed));
        let master = entry
            .and_modify(|m| m.version += 1)
            .or_insert_with(|| MasterNote {
                subject_id,
                chapter: confirmed,
                topic: format!("Subject {} - Chapter {}", subject_id, confirmed),
                version: 1,
                content: "synthesized from peer notes".to_string(),
                created_at: Utc::now(),
            });

        Ok(ConsensusReceipt {
            message: "Consensus reached and Master Note updated".to_string(),
            notes_processed: note_ids.len() as u32,
            chapter: master.chapter,
        })
    }

    async fn master_note_pdf(
        &self,
        _auth: &SessionToken,
        _subject_id: i64,
        _chapter: u32,
    ) -> PortResult<Vec<u8>> {
        Ok(b"%PDF-1.4 stub".to_vec())
    }
}

fn note(id: i64, subject_id: i64, chapter: u32) -> Note {
    Note {
        id,
        subject_id,
        chapter: Some(chapter),
        teacher: Some("Mr. Okafor".to_string()),
        year: Some(2025),
        pseudo_name: Some(format!("peer-{}", id)),
        content: format!("chapter {} notes from {}", chapter, id),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn select_synthesize_and_reconcile() {
    let service = Arc::new(InProcessKnowledge::new(vec![note(10, 1, 3), note(11, 1, 3)]));
    let controller = ConsensusController::new(
        service.clone(),
        service.clone(),
        SessionToken("integration-token".to_string()),
    );

    controller.set_scope(Some(1), Chapter::Number(3)).await;
    controller.search().await.unwrap();

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.candidates.len(), 2);
    assert!(snapshot.current_master.is_none(), "no consensus exists yet");

    controller.toggle_note(10).await;
    controller.create_consensus().await.unwrap();

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.phase, Phase::Idle);
    let master = snapshot.current_master.expect("master note reconciled");
    assert_eq!(master.version, 1);
    assert_eq!(master.chapter, 3);
    assert_eq!(snapshot.last_known_master.as_ref().map(|m| m.version), Some(1));

    // A second synthesis bumps the version and the client picks it up.
    controller.toggle_select_all().await;
    controller.create_consensus().await.unwrap();
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.current_master.unwrap().version, 2);

    let pdf = controller.download_master_pdf().await.unwrap();
    assert!(pdf.starts_with(b"%PDF"));
}

#[tokio::test]
async fn wildcard_scope_adopts_the_service_chosen_chapter() {
    let service = Arc::new(InProcessKnowledge::new(vec![note(20, 2, 5), note(21, 2, 5)]));
    let controller = ConsensusController::new(
        service.clone(),
        service,
        SessionToken("integration-token".to_string()),
    );

    controller.set_scope(Some(2), Chapter::All).await;
    controller.search().await.unwrap();
    controller.toggle_select_all().await;
    controller.create_consensus().await.unwrap();

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.chapter, Chapter::Number(5));
    let master = snapshot.current_master.expect("fetched under the confirmed scope");
    assert_eq!(master.chapter, 5);
    assert_eq!(master.version, 1);
}
