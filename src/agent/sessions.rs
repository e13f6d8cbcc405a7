//! Persistent chat sessions
//!
//! A session pins the four assistant threads, the uploaded patient file
//! and the turn history, so a conversation can be resumed after the
//! process exits.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assistant::{AssistantError, RunService};

/// Hosted thread ids, one per agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentThreads {
    pub orchestrator: String,
    pub regulation: String,
    pub consent: String,
    pub filtering: String,
}

impl AgentThreads {
    /// Create four fresh threads
    pub async fn create(runs: &dyn RunService) -> Result<Self, AssistantError> {
        Ok(Self {
            orchestrator: runs.create_thread().await?,
            regulation: runs.create_thread().await?,
            consent: runs.create_thread().await?,
            filtering: runs.create_thread().await?,
        })
    }
}

/// One user message and the orchestrator's reply
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub at: DateTime<Utc>,
    pub user: String,
    pub reply: String,
}

/// A saved conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub threads: AgentThreads,
    /// Patient data file the filtering agent reads
    pub input_file: Option<PathBuf>,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new(threads: AgentThreads, input_file: Option<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            created_at: now,
            updated_at: now,
            threads,
            input_file,
            turns: Vec::new(),
        }
    }

    /// Start a session backed by freshly created threads
    pub async fn start(
        runs: &dyn RunService,
        input_file: Option<PathBuf>,
    ) -> Result<Self, AssistantError> {
        let threads = AgentThreads::create(runs).await?;
        Ok(Self::new(threads, input_file))
    }

    pub fn record_turn(&mut self, user: impl Into<String>, reply: impl Into<String>) {
        let now = Utc::now();
        self.turns.push(Turn {
            at: now,
            user: user.into(),
            reply: reply.into(),
        });
        self.updated_at = now;
    }

    /// Attach (or replace) the patient data file
    pub fn attach_file(&mut self, path: PathBuf) {
        self.input_file = Some(path);
        self.updated_at = Utc::now();
    }
}

/// Session storage manager
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    /// Create a new session store
    pub fn new(base_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let base_dir = base_dir.into();
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    /// Save a session to disk
    pub fn save(&self, session: &Session) -> std::io::Result<()> {
        let path = self.session_path(&session.id);
        let json = serde_json::to_string_pretty(session)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load a session from disk
    pub fn load(&self, session_id: &str) -> std::io::Result<Session> {
        self.load_from_path(&self.session_path(session_id))
    }

    /// List all sessions, newest first
    pub fn list(&self) -> std::io::Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                if let Ok(session) = self.load_from_path(&path) {
                    sessions.push(SessionSummary::from(&session));
                }
            }
        }
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    /// Delete a session
    pub fn delete(&self, session_id: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.session_path(session_id))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", session_id))
    }

    fn load_from_path(&self, path: &Path) -> std::io::Result<Session> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

/// Summary of a session for listing
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub id: String,
    /// Opening user message, shortened
    pub opening: String,
    pub created_at: DateTime<Utc>,
    pub turns: usize,
    pub input_file: Option<PathBuf>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            opening: session
                .turns
                .first()
                .map(|t| truncate(&t.user, 50))
                .unwrap_or_default(),
            created_at: session.created_at,
            turns: session.turns.len(),
            input_file: session.input_file.clone(),
        }
    }
}

/// Truncate to `max_len` characters, adding an ellipsis if needed
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn threads() -> AgentThreads {
        AgentThreads {
            orchestrator: "thread_o".to_string(),
            regulation: "thread_r".to_string(),
            consent: "thread_c".to_string(),
            filtering: "thread_f".to_string(),
        }
    }

    #[test]
    fn test_session_creation() {
        let session = Session::new(threads(), Some(PathBuf::from("patient.txt")));
        assert!(!session.id.is_empty());
        assert_eq!(session.threads.consent, "thread_c");
        assert!(session.turns.is_empty());
        assert_eq!(session.created_at, session.updated_at);
    }

    #[test]
    fn test_record_turn() {
        let mut session = Session::new(threads(), None);
        session.record_turn("Share with 0xabc", "Which country is the receiver in?");
        assert_eq!(session.turns.len(), 1);
        assert_eq!(session.turns[0].reply, "Which country is the receiver in?");
        assert!(session.updated_at >= session.created_at);
    }

    #[test]
    fn test_store_round_trip_and_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut first = Session::new(threads(), None);
        first.record_turn("I want to share my patient's labs with a hospital in Canada", "ok");
        store.save(&first).unwrap();
        let mut second = Session::new(threads(), None);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        store.save(&second).unwrap();

        let loaded = store.load(&first.id).unwrap();
        assert_eq!(loaded.threads, first.threads);
        assert_eq!(loaded.turns.len(), 1);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[1].id, first.id);
        assert_eq!(listed[1].opening, "I want to share my patient's labs with a hospit...");

        store.delete(&second.id).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("éééééééééééé", 5), "éé...");
    }
}
