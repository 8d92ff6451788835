//! services/study/src/adapters/http.rs
//!
//! The HTTP adapter for the knowledge service. It implements the
//! `NoteService`, `ConsensusService`, and `TutorService` ports from the
//! `core` crate against the service's JSON wire contract.

use crate::adapters::failure::normalize_failure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hivemind_core::domain::{
    ConsensusReceipt, MasterNote, Note, Quiz, SessionToken, TutorMode,
};
use hivemind_core::ports::{
    ConsensusService, NoteService, PortError, PortResult, TutorService,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that talks to the remote knowledge service over HTTP.
/// One instance serves all three ports; the service is a single backend.
#[derive(Clone)]
pub struct HttpKnowledgeService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpKnowledgeService {
    /// Creates a new `HttpKnowledgeService`. `base_url` must not include a
    /// trailing slash (`Config::from_env` already strips it).
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Converts a non-success response into a `PortError::Service` carrying
    /// the normalized failure message. Bodies that are not JSON at all
    /// normalize to the generic fallback.
    async fn failure(response: reqwest::Response) -> PortError {
        let status = response.status();
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        let message = normalize_failure(body);
        debug!("Knowledge service returned {}: {}", status, message);
        PortError::Service(message)
    }

    fn transport(error: reqwest::Error) -> PortError {
        PortError::Transport(error.to_string())
    }
}

//=========================================================================================
// Wire DTOs (private to the adapter; core stays serde-free)
//=========================================================================================

#[derive(Debug, Deserialize)]
struct NoteDto {
    id: i64,
    subject_id: i64,
    chapter: Option<u32>,
    teacher: Option<String>,
    year: Option<i32>,
    pseudo_name: Option<String>,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<NoteDto> for Note {
    fn from(dto: NoteDto) -> Self {
        Note {
            id: dto.id,
            subject_id: dto.subject_id,
            chapter: dto.chapter,
            teacher: dto.teacher,
            year: dto.year,
            pseudo_name: dto.pseudo_name,
            content: dto.content,
            created_at: dto.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MasterNoteDto {
    subject_id: i64,
    chapter: u32,
    topic: String,
    version: u32,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<MasterNoteDto> for MasterNote {
    fn from(dto: MasterNoteDto) -> Self {
        MasterNote {
            subject_id: dto.subject_id,
            chapter: dto.chapter,
            topic: dto.topic,
            version: dto.version,
            content: dto.content,
            created_at: dto.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    subject_id: i64,
    chapter: Option<u32>,
    note_ids: &'a [i64],
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(default)]
    message: String,
    #[serde(default)]
    notes_processed: u32,
    chapter: u32,
}

#[derive(Debug, Serialize)]
struct TutorTurnRequest<'a> {
    // The tutoring endpoint requires these fields but resolves its context
    // from the session's latest master note, so zero stands for "unscoped".
    subject_id: i64,
    chapter: u32,
    question: &'a str,
    mode: String,
}

#[derive(Debug, Deserialize)]
struct TutorTurnResponse {
    #[serde(default)]
    answer: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuizDto {
    question: String,
    options: BTreeMap<String, String>,
}

impl From<QuizDto> for Quiz {
    fn from(dto: QuizDto) -> Self {
        Quiz { question: dto.question, options: dto.options }
    }
}

//=========================================================================================
// Port Implementations
//=========================================================================================

#[async_trait]
impl NoteService for HttpKnowledgeService {
    async fn list_notes(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
    ) -> PortResult<Vec<Note>> {
        let mut query: Vec<(&str, String)> = vec![("subject_id", subject_id.to_string())];
        if let Some(chapter) = chapter {
            query.push(("chapter", chapter.to_string()));
        }

        let response = self
            .http
            .get(self.url("/notes/all"))
            .query(&query)
            .bearer_auth(auth.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let notes: Vec<NoteDto> = response.json().await.map_err(Self::transport)?;
        Ok(notes.into_iter().map(Note::from).collect())
    }
}

#[async_trait]
impl ConsensusService for HttpKnowledgeService {
    async fn master_note(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: u32,
    ) -> PortResult<Option<MasterNote>> {
        let response = self
            .http
            .get(self.url(&format!("/consensus/master/{}/{}", subject_id, chapter)))
            .bearer_auth(auth.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let dto: MasterNoteDto = response.json().await.map_err(Self::transport)?;
                Ok(Some(dto.into()))
            }
            _ => Err(Self::failure(response).await),
        }
    }

    async fn latest_master_note(&self, auth: &SessionToken) -> PortResult<Option<MasterNote>> {
        let response = self
            .http
            .get(self.url("/consensus/master/latest"))
            .bearer_auth(auth.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            // The service signals "no master note yet" either way depending
            // on its version; both are a normal, empty outcome.
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let dto: MasterNoteDto = response.json().await.map_err(Self::transport)?;
                Ok(Some(dto.into()))
            }
            _ => Err(Self::failure(response).await),
        }
    }

    async fn synthesize(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: Option<u32>,
        note_ids: &[i64],
    ) -> PortResult<ConsensusReceipt> {
        let response = self
            .http
            .post(self.url("/consensus/process"))
            .bearer_auth(auth.as_str())
            .json(&SynthesizeRequest { subject_id, chapter, note_ids })
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let dto: SynthesizeResponse = response.json().await.map_err(Self::transport)?;
        Ok(ConsensusReceipt {
            message: dto.message,
            notes_processed: dto.notes_processed,
            chapter: dto.chapter,
        })
    }

    async fn master_note_pdf(
        &self,
        auth: &SessionToken,
        subject_id: i64,
        chapter: u32,
    ) -> PortResult<Vec<u8>> {
        let response = self
            .http
            .get(self.url(&format!("/consensus/master/{}/{}/pdf", subject_id, chapter)))
            .bearer_auth(auth.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let bytes = response.bytes().await.map_err(Self::transport)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl TutorService for HttpKnowledgeService {
    async fn tutor_turn(
        &self,
        auth: &SessionToken,
        question: &str,
        mode: TutorMode,
    ) -> PortResult<Option<String>> {
        let response = self
            .http
            .post(self.url("/rag/tutor"))
            .bearer_auth(auth.as_str())
            .json(&TutorTurnRequest {
                subject_id: 0,
                chapter: 0,
                question,
                mode: mode.to_string(),
            })
            .send()
            .await
            .map_err(Self::transport)?;

        if !response.status().is_success() {
            return Err(Self::failure(response).await);
        }
        let dto: TutorTurnResponse = response.json().await.map_err(Self::transport)?;
        Ok(dto.answer.filter(|answer| !answer.trim().is_empty()))
    }

    async fn latest_quiz(&self, auth: &SessionToken) -> PortResult<Option<Quiz>> {
        let response = self
            .http
            .get(self.url("/rag/quiz/latest"))
            .bearer_auth(auth.as_str())
            .send()
            .await
            .map_err(Self::transport)?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let dto: QuizDto = response.json().await.map_err(Self::transport)?;
                Ok(Some(dto.into()))
            }
            _ => Err(Self::failure(response).await),
        }
    }
}
