// Session persistence
//
// The browser client keeps its session in local storage; the gateway keeps it
// in a single-row SQLite table so a restart can restore the signed-in session
// during bootstrap. The session is stored as one JSON value, replaced
// wholesale on every change.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::types::Session;

const SESSION_KEY: &str = "agency:auth:session";

/// Local store for the process-wide session
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn open(&self) -> Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path)
            .with_context(|| format!("Failed to open session store: {}", self.path.display()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS auth_kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )
        .context("Failed to initialize session store schema")?;

        Ok(conn)
    }

    /// Load the persisted session, if any
    pub fn load(&self) -> Result<Option<Session>> {
        let conn = self.open()?;

        let session_json: Option<String> = conn
            .query_row(
                "SELECT value FROM auth_kv WHERE key = ?",
                [SESSION_KEY],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("Failed to load session from store")?;

        match session_json {
            Some(json) => {
                let session: Session = serde_json::from_str(&json)
                    .context("Failed to parse persisted session")?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    /// Persist the current session, replacing any previous one
    pub fn save(&self, session: &Session) -> Result<()> {
        let conn = self.open()?;
        let json = serde_json::to_string(session).context("Failed to serialize session")?;

        conn.execute(
            "INSERT INTO auth_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![SESSION_KEY, json],
        )
        .context("Failed to persist session")?;

        Ok(())
    }

    /// Remove the persisted session
    pub fn clear(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM auth_kv WHERE key = ?", [SESSION_KEY])
            .context("Failed to clear session store")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::User;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;

    fn sample_session() -> Session {
        Session {
            access_token: "at-123".to_string(),
            refresh_token: "rt-456".to_string(),
            token_type: "bearer".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            user: User {
                id: "11111111-2222-3333-4444-555555555555".to_string(),
                email: "taylor@example.com".to_string(),
                user_metadata: HashMap::new(),
            },
        }
    }

    #[test]
    fn test_load_from_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.sqlite3"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.sqlite3"));

        let session = sample_session();
        store.save(&session).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn test_save_replaces_previous_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.sqlite3"));

        let mut session = sample_session();
        store.save(&session).unwrap();

        session.access_token = "at-999".to_string();
        store.save(&session).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.access_token, "at-999");
    }

    #[test]
    fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session.sqlite3"));

        store.save(&sample_session()).unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
