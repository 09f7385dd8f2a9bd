use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use arta_core::{current_unix_timestamp_ms, write_text_atomic};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SESSION_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedSession {
    schema_version: u32,
    saved_unix_ms: u64,
    payload: Value,
}

/// Durable storage for the platform session blob.
///
/// One file at a fixed path, overwritten wholesale on each successful fresh
/// login and never partially updated. A file that fails to parse or carries
/// an unknown schema version is treated as absent and removed, so a corrupt
/// session is never retried as-is.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the persisted session payload, if a readable one exists.
    pub fn load(&self) -> Result<Option<Value>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read session file {}", self.path.display()))?;
        let parsed = match serde_json::from_str::<PersistedSession>(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %error,
                    "persisted session is unreadable, discarding"
                );
                let _ = self.delete()?;
                return Ok(None);
            }
        };
        if parsed.schema_version != SESSION_SCHEMA_VERSION {
            tracing::warn!(
                found = parsed.schema_version,
                expected = SESSION_SCHEMA_VERSION,
                "persisted session has unknown schema, discarding"
            );
            let _ = self.delete()?;
            return Ok(None);
        }
        Ok(Some(parsed.payload))
    }

    /// Atomically overwrites the persisted session with a fresh payload.
    pub fn save(&self, payload: &Value) -> Result<()> {
        let persisted = PersistedSession {
            schema_version: SESSION_SCHEMA_VERSION,
            saved_unix_ms: current_unix_timestamp_ms(),
            payload: payload.clone(),
        };
        let mut serialized =
            serde_json::to_string_pretty(&persisted).context("failed to serialize session")?;
        serialized.push('\n');
        write_text_atomic(&self.path, &serialized)
            .with_context(|| format!("failed to write session file {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "session persisted");
        Ok(())
    }

    /// Removes the persisted session; reports whether a file existed.
    pub fn delete(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)
            .with_context(|| format!("failed to delete session file {}", self.path.display()))?;
        tracing::info!(path = %self.path.display(), "persisted session deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::SessionStore;

    #[test]
    fn unit_save_then_load_round_trips_payload() {
        let tempdir = tempdir().expect("tempdir");
        let store = SessionStore::new(tempdir.path().join("session.json"));
        assert_eq!(store.load().expect("load"), None);

        let payload = json!({"token": "abc", "device_id": "dev-1"});
        store.save(&payload).expect("save");
        assert_eq!(store.load().expect("load"), Some(payload));
    }

    #[test]
    fn unit_save_overwrites_wholesale() {
        let tempdir = tempdir().expect("tempdir");
        let store = SessionStore::new(tempdir.path().join("session.json"));
        store.save(&json!({"token": "first"})).expect("save");
        store.save(&json!({"token": "second"})).expect("save");
        assert_eq!(
            store.load().expect("load"),
            Some(json!({"token": "second"}))
        );
    }

    #[test]
    fn regression_corrupt_session_is_discarded_not_returned() {
        let tempdir = tempdir().expect("tempdir");
        let path = tempdir.path().join("session.json");
        std::fs::write(&path, "not json at all").expect("write");

        let store = SessionStore::new(path.clone());
        assert_eq!(store.load().expect("load"), None);
        assert!(!path.exists());
    }

    #[test]
    fn regression_unknown_schema_version_is_discarded() {
        let tempdir = tempdir().expect("tempdir");
        let path = tempdir.path().join("session.json");
        std::fs::write(
            &path,
            "{\"schema_version\": 99, \"saved_unix_ms\": 0, \"payload\": {}}",
        )
        .expect("write");

        let store = SessionStore::new(path.clone());
        assert_eq!(store.load().expect("load"), None);
        assert!(!path.exists());
    }

    #[test]
    fn unit_delete_is_idempotent() {
        let tempdir = tempdir().expect("tempdir");
        let store = SessionStore::new(tempdir.path().join("session.json"));
        store.save(&json!({"token": "x"})).expect("save");
        assert!(store.delete().expect("delete"));
        assert!(!store.delete().expect("delete"));
    }
}
