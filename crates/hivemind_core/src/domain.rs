//! crates/hivemind_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any wire format or HTTP client;
//! the adapter layer owns the mapping to and from the knowledge service.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

/// A peer-submitted study note, owned by the knowledge service and held
/// read-only by the client for the duration of a scope query.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub id: i64,
    pub subject_id: i64,
    pub chapter: Option<u32>,
    pub teacher: Option<String>,
    pub year: Option<i32>,
    pub pseudo_name: Option<String>,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// The synthesized consensus document for one (subject, chapter) scope.
/// The service versions these internally; the client only ever holds the
/// most recently fetched one.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterNote {
    pub subject_id: i64,
    pub chapter: u32,
    pub topic: String,
    pub version: u32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A chapter selector: either one concrete chapter or "all chapters".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Chapter {
    #[default]
    All,
    Number(u32),
}

impl Chapter {
    /// The concrete chapter number, if one is selected.
    pub fn number(&self) -> Option<u32> {
        match self {
            Chapter::All => None,
            Chapter::Number(n) => Some(*n),
        }
    }
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chapter::All => write!(f, "all"),
            Chapter::Number(n) => write!(f, "{}", n),
        }
    }
}

/// A (subject, chapter) pair identifying one partition of notes and
/// master notes. Compared by value when deciding whether an in-flight
/// response is still applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope {
    pub subject_id: i64,
    pub chapter: Chapter,
}

/// Who authored a conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the tutoring conversation. The conversation is
/// append-only and survives mode switches.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

/// The tutoring session mode: free-form chat or structured quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TutorMode {
    #[default]
    Chat,
    Quiz,
}

impl fmt::Display for TutorMode {
    /// Renders the wire strings expected by the tutoring service.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TutorMode::Chat => write!(f, "chat"),
            TutorMode::Quiz => write!(f, "quiz"),
        }
    }
}

/// An issued, unanswered multiple-choice question. Options map an
/// answer label ("A".."D") to its text.
#[derive(Debug, Clone, PartialEq)]
pub struct Quiz {
    pub question: String,
    pub options: BTreeMap<String, String>,
}

/// The acknowledgement returned by a synthesis request. `chapter` is the
/// server-confirmed chapter, which the service may have chosen itself
/// when the request left it unspecified.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusReceipt {
    pub message: String,
    pub notes_processed: u32,
    pub chapter: u32,
}

/// The bearer credential for the knowledge service. Passed explicitly
/// into controllers at construction rather than read from ambient
/// storage, so the workflow layer stays testable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
