//! services/study/src/workflow/tutor.rs
//!
//! Orchestrates one tutoring session: the append-only conversation, chat/quiz
//! mode switching, context discovery, and the quiz lifecycle. Service
//! failures here are absorbed into the conversation as in-character
//! assistant replies so the dialogue never breaks character.

use hivemind_core::domain::{ChatMessage, Quiz, SessionToken, TutorMode};
use hivemind_core::ports::{ConsensusService, PortError, TutorService};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Shown when context discovery finds no applicable master note, and when it
/// fails outright; degradation to general knowledge is silent by design.
pub const NO_CONTEXT_NOTICE: &str =
    "No specific study guide selected. I'll use my general knowledge!";

/// The assistant reply when a turn succeeds but carries no answer text.
pub const FALLBACK_ANSWER: &str =
    "I'm sorry, I'm having a bit of a brain fog. Could you try asking that again?";

/// The assistant reply when a chat turn cannot reach the service at all.
pub const CONNECTIVITY_FALLBACK: &str =
    "Sorry, I am having trouble connecting to my central knowledge right now. Please check your connection.";

/// The assistant reply when an answer evaluation returns no verdict.
pub const EVALUATION_FALLBACK: &str = "I couldn't evaluate that right now.";

/// The assistant reply when an answer evaluation cannot reach the service.
pub const EVALUATION_ERROR: &str = "Error evaluating answer.";

#[derive(Debug, Default)]
struct TutorState {
    conversation: Vec<ChatMessage>,
    mode: TutorMode,
    context_notice: Option<String>,
    active_quiz: Option<Quiz>,
    pending: bool,
}

/// A cloned, render-ready view of the session state.
#[derive(Debug, Clone)]
pub struct TutorSnapshot {
    pub conversation: Vec<ChatMessage>,
    pub mode: TutorMode,
    pub context_notice: Option<String>,
    pub active_quiz: Option<Quiz>,
    pub pending: bool,
}

/// Drives one tutoring session against the tutor and consensus ports.
///
/// Unlike the consensus controller there is no staleness guard: a slow reply
/// resolving after a mode switch still appends to the conversation. That is
/// accepted behavior, because the conversation is mode-independent.
pub struct TutorController {
    consensus: Arc<dyn ConsensusService>,
    tutor: Arc<dyn TutorService>,
    auth: SessionToken,
    state: Mutex<TutorState>,
}

impl TutorController {
    pub fn new(
        consensus: Arc<dyn ConsensusService>,
        tutor: Arc<dyn TutorService>,
        auth: SessionToken,
    ) -> Self {
        Self {
            consensus,
            tutor,
            auth,
            state: Mutex::new(TutorState::default()),
        }
    }

    /// Context discovery, run once per session start. A found master note is
    /// named in the notice; absence and any lookup failure collapse to the
    /// same general-knowledge notice and are never surfaced as errors.
    pub async fn initialize(&self) {
        let notice = match self.consensus.latest_master_note(&self.auth).await {
            Ok(Some(master)) => format!("Using context from: {}", master.topic),
            Ok(None) => NO_CONTEXT_NOTICE.to_string(),
            Err(error) => {
                debug!("Context discovery failed: {}", error);
                NO_CONTEXT_NOTICE.to_string()
            }
        };
        self.state.lock().await.context_notice = Some(notice);
    }

    /// Switches the session mode. Entering quiz mode looks up an existing
    /// unanswered quiz (absence and failure both just mean no quiz); leaving
    /// quiz mode retires any pending quiz unconditionally. The conversation
    /// is never touched by a mode switch.
    pub async fn set_mode(&self, mode: TutorMode) {
        let entering_quiz = {
            let mut state = self.state.lock().await;
            if state.mode == mode {
                return;
            }
            state.mode = mode;
            if mode != TutorMode::Quiz {
                state.active_quiz = None;
            }
            mode == TutorMode::Quiz
        };

        if entering_quiz {
            let found = match self.tutor.latest_quiz(&self.auth).await {
                Ok(quiz) => quiz,
                Err(error) => {
                    debug!("Latest quiz lookup failed: {}", error);
                    None
                }
            };
            let mut state = self.state.lock().await;
            // The user may have already left quiz mode again; a late lookup
            // must not resurrect a quiz that was just retired.
            if state.mode == TutorMode::Quiz {
                state.active_quiz = found;
            }
        }
    }

    /// Submits one conversational turn. The user entry is appended before
    /// the request resolves; the assistant entry is the service's answer or
    /// one of the fixed fallback phrases. In quiz mode a successful exchange
    /// also refreshes the active quiz, since the tutor may have just issued
    /// one. Raw errors never reach the conversation.
    pub async fn send_message(&self, text: &str) {
        let question = text.trim().to_string();
        if question.is_empty() {
            return;
        }

        let mode = {
            let mut state = self.state.lock().await;
            state.conversation.push(ChatMessage::user(question.clone()));
            state.pending = true;
            state.mode
        };

        let result = self.tutor.tutor_turn(&self.auth, &question, mode).await;
        if let Err(error) = &result {
            warn!("Tutor turn failed: {}", error);
        }
        let reply = match &result {
            Ok(Some(answer)) => answer.clone(),
            Ok(None) | Err(PortError::Service(_)) => FALLBACK_ANSWER.to_string(),
            Err(PortError::Transport(_)) => CONNECTIVITY_FALLBACK.to_string(),
        };
        self.state
            .lock()
            .await
            .conversation
            .push(ChatMessage::assistant(reply));

        // The exchange may have produced a fresh quiz; pick it up when the
        // service was reachable. A failed or empty lookup changes nothing.
        if mode == TutorMode::Quiz && !matches!(result, Err(PortError::Transport(_))) {
            if let Ok(Some(quiz)) = self.tutor.latest_quiz(&self.auth).await {
                self.state.lock().await.active_quiz = Some(quiz);
            }
        }

        self.state.lock().await.pending = false;
    }

    /// Submits the chosen option label for evaluation. A quiz is single-use:
    /// whatever the outcome, it is retired afterwards and a new one must be
    /// requested explicitly.
    pub async fn answer_quiz(&self, option_label: &str) {
        {
            let mut state = self.state.lock().await;
            if state.active_quiz.is_none() {
                return;
            }
            state.conversation.push(ChatMessage::user(option_label));
            state.pending = true;
        }

        let result = self
            .tutor
            .tutor_turn(&self.auth, option_label, TutorMode::Quiz)
            .await;
        if let Err(error) = &result {
            warn!("Quiz evaluation failed: {}", error);
        }
        let reply = match result {
            Ok(Some(verdict)) => verdict,
            Ok(None) | Err(PortError::Service(_)) => EVALUATION_FALLBACK.to_string(),
            Err(PortError::Transport(_)) => EVALUATION_ERROR.to_string(),
        };

        let mut state = self.state.lock().await;
        state.conversation.push(ChatMessage::assistant(reply));
        state.active_quiz = None;
        state.pending = false;
    }

    pub async fn snapshot(&self) -> TutorSnapshot {
        let state = self.state.lock().await;
        TutorSnapshot {
            conversation: state.conversation.clone(),
            mode: state.mode,
            context_notice: state.context_notice.clone(),
            active_quiz: state.active_quiz.clone(),
            pending: state.pending,
        }
    }
}
