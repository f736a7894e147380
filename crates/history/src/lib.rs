//! File-based session history — one JSON document per session.
//!
//! Storage location: `~/.ferrocode/sessions/<id>.json` by default.
//! Writes go to a temporary file that is renamed into place, so a crash
//! mid-write never leaves a half-written session behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ferrocode_core::error::HistoryError;
use ferrocode_core::history::{HistoryStore, Session, SessionSummary};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// A directory of pretty-printed JSON session files.
pub struct JsonFileHistory {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileHistory {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn session_path(&self, id: &str) -> Result<PathBuf, HistoryError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HistoryError::Storage(format!("invalid session id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_session(path: &Path, id: &str) -> Result<Session, HistoryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HistoryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(HistoryError::Storage(format!("Failed to read session: {e}"))),
        };
        serde_json::from_str(&content).map_err(|e| HistoryError::Corrupted {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistory {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn save(&self, session: &Session) -> Result<(), HistoryError> {
        let path = self.session_path(&session.id)?;
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| HistoryError::Storage(format!("Failed to serialize session: {e}")))?;

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to create history directory: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content.as_bytes())
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to write session: {e}")))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to move session into place: {e}")))?;

        debug!(id = %session.id, messages = session.messages.len(), "Session saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Session, HistoryError> {
        let path = self.session_path(id)?;
        Self::read_session(&path, id).await
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, HistoryError> {
        let mut reader = match tokio::fs::read_dir(&self.dir).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(HistoryError::Storage(format!("Failed to list sessions: {e}"))),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to list sessions: {e}")))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            match Self::read_session(&path, &id).await {
                Ok(session) => summaries.push(SessionSummary::from(&session)),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable session"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let path = self.session_path(id)?;
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(HistoryError::Storage(format!("Failed to delete session: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrocode_core::message::{Message, ToolCall};

    fn session(prompt: &str) -> Session {
        let mut s = Session::new("ollama", "qwen2.5-coder:7b");
        s.push(Message::user(prompt));
        s.push(Message::assistant_call(ToolCall::new("read_file", r#"{"path":"a.rs"}"#)));
        s.push(Message::assistant("done"));
        s
    }

    #[tokio::test]
    async fn save_and_load_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path().join("sessions"));
        let original = session("Explain the parser");
        store.save(&original).await.unwrap();

        // Reload through a fresh store
        let store2 = JsonFileHistory::new(dir.path().join("sessions"));
        let loaded = store2.load(&original.id).await.unwrap();
        assert_eq!(loaded.title, "Explain the parser");
        assert_eq!(loaded.messages.len(), 3);
        assert_eq!(loaded.messages[1].tool_call.as_ref().unwrap().name, "read_file");
        assert!(!dir.path().join("sessions").join(format!("{}.json.tmp", original.id)).exists());
    }

    #[tokio::test]
    async fn list_is_newest_first_and_skips_corrupted() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path());

        let older = session("first");
        store.save(&older).await.unwrap();
        let mut newer = session("second");
        newer.updated_at = older.updated_at + chrono_offset();
        store.save(&newer).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].title, "first");
    }

    fn chrono_offset() -> chrono::TimeDelta {
        chrono::TimeDelta::seconds(10)
    }

    #[tokio::test]
    async fn missing_and_corrupted_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path());
        assert!(matches!(store.load("nope").await, Err(HistoryError::NotFound(_))));

        std::fs::write(dir.path().join("bad.json"), "[]").unwrap();
        assert!(matches!(store.load("bad").await, Err(HistoryError::Corrupted { .. })));
    }

    #[tokio::test]
    async fn list_of_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path().join("never-created"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path());
        let s = session("to be deleted");
        store.save(&s).await.unwrap();
        assert!(store.delete(&s.id).await.unwrap());
        assert!(!store.delete(&s.id).await.unwrap());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn path_like_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileHistory::new(dir.path());
        assert!(matches!(
            store.load("../../etc/passwd").await,
            Err(HistoryError::Storage(_))
        ));
    }
}
