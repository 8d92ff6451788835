//! services/study/src/bin/study.rs
//!
//! A line-oriented terminal front end for the study workflows. It only
//! invokes controller operations and renders their snapshots; all state
//! lives in the controllers.

use hivemind_core::domain::{Chapter, ChatRole, SessionToken, TutorMode};
use std::io::{BufRead, Write};
use std::sync::Arc;
use study_lib::{
    adapters::http::HttpKnowledgeService,
    config::Config,
    error::StudyError,
    workflow::{ConsensusController, TutorController},
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), StudyError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Knowledge service: {}", config.api_base_url);

    // --- 2. Build the Knowledge Service Adapter ---
    let token = config.session_token.clone().ok_or_else(|| {
        StudyError::Internal("HIVEMIND_TOKEN is required (log in and export your token)".to_string())
    })?;
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| StudyError::Internal(e.to_string()))?;
    let service = Arc::new(HttpKnowledgeService::new(http, config.api_base_url.clone()));
    let auth = SessionToken(token);

    // --- 3. Construct the Workflow Controllers ---
    let consensus = ConsensusController::new(service.clone(), service.clone(), auth.clone());
    let tutor = TutorController::new(service.clone(), service, auth);
    consensus.initialize().await;
    tutor.initialize().await;

    if let Some(notice) = tutor.snapshot().await.context_notice {
        println!("{}", notice);
    }
    if let Some(master) = consensus.snapshot().await.last_known_master {
        println!(
            "Last master note: {} (chapter {}, version {})",
            master.topic, master.chapter, master.version
        );
    }
    println!("Tutor: /chat, /quiz, /answer <A-D>. Anything else goes to the tutor.");
    println!("Notes: /scope <subject> [chapter], /search, /pick <id>, /all, /consensus, /pdf <file>, /recall, /exit.");

    // --- 4. Run the Session Loop ---
    let stdin = std::io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim().to_string();
        let (command, rest) = match input.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (input.as_str(), ""),
        };

        match command {
            "/exit" => break,
            "/chat" => tutor.set_mode(TutorMode::Chat).await,
            "/quiz" => {
                tutor.set_mode(TutorMode::Quiz).await;
                render(&tutor).await;
            }
            "/answer" if !rest.is_empty() => {
                tutor.answer_quiz(&rest.to_uppercase()).await;
                render(&tutor).await;
            }
            "/answer" => println!("Usage: /answer <A-D>"),
            "/pdf" if rest.is_empty() => println!("Usage: /pdf <file>"),
            "/scope" => {
                let mut parts = rest.split_whitespace();
                match parts.next().and_then(|s| s.parse::<i64>().ok()) {
                    Some(subject_id) => {
                        let chapter = parts
                            .next()
                            .and_then(|c| c.parse::<u32>().ok())
                            .map_or(Chapter::All, Chapter::Number);
                        consensus.set_scope(Some(subject_id), chapter).await;
                    }
                    None => println!("Usage: /scope <subject-id> [chapter]"),
                }
            }
            "/search" => {
                report(consensus.search().await);
                let snapshot = consensus.snapshot().await;
                println!("{} candidate notes", snapshot.candidates.len());
                for note in &snapshot.candidates {
                    println!(
                        "  [{}] ch {:?} {} — {}",
                        note.id,
                        note.chapter,
                        note.pseudo_name.as_deref().unwrap_or("anonymous"),
                        note.content.chars().take(60).collect::<String>()
                    );
                }
            }
            "/pick" => match rest.parse::<i64>() {
                Ok(note_id) => consensus.toggle_note(note_id).await,
                Err(_) => println!("Usage: /pick <note-id>"),
            },
            "/all" => consensus.toggle_select_all().await,
            "/consensus" => {
                report(consensus.create_consensus().await);
                if let Some(master) = consensus.snapshot().await.current_master {
                    println!("{} (version {})", master.topic, master.version);
                }
            }
            "/pdf" if !rest.is_empty() => match consensus.download_master_pdf().await {
                Ok(bytes) => {
                    std::fs::write(rest, bytes)?;
                    println!("Saved {}", rest);
                }
                Err(error) => println!("{}", error),
            },
            "/recall" => {
                consensus.recall_last_master().await;
                if let Some(master) = consensus.snapshot().await.current_master {
                    println!("{} (version {})", master.topic, master.version);
                }
            }
            _ if command.starts_with('/') => println!("Unknown command: {}", command),
            _ => {
                tutor.send_message(&input).await;
                render(&tutor).await;
            }
        }
    }

    Ok(())
}

/// Prints a workflow failure; successes stay quiet.
fn report(result: Result<(), study_lib::workflow::WorkflowError>) {
    if let Err(error) = result {
        println!("{}", error);
    }
}

/// Prints the newest assistant reply and the active quiz, if any.
async fn render(tutor: &TutorController) {
    let snapshot = tutor.snapshot().await;
    if let Some(message) = snapshot
        .conversation
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::Assistant)
    {
        println!("tutor: {}", message.content);
    }
    if let Some(quiz) = snapshot.active_quiz {
        println!("{}", quiz.question);
        for (label, text) in &quiz.options {
            println!("  {}) {}", label, text);
        }
        println!("(answer with /answer <label>)");
    }
}
