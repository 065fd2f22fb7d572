//! Client-held session
//!
//! The login response's `userDetails` object is stored verbatim (as JSON text)
//! under a single fixed key, the same way the web client kept it in browser
//! local storage. Storage is pluggable: [`MemoryStorage`] for tests and
//! short-lived processes, [`FileStorage`] for the CLI so a session survives
//! between invocations.
//!
//! [`SessionContext`] is the only code that reads or writes that key. It is
//! injected into the API client, which asks it for the bearer token on every
//! request.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core_types::Role;

/// Storage key of the session record.
pub const SESSION_KEY: &str = "user";

/// What a broken writer used to leave behind instead of a JSON object.
const UNDEFINED_LITERAL: &str = "undefined";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session storage is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Io(_) => "SESSION_IO",
            SessionError::Corrupt(_) => "SESSION_CORRUPT",
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// String key/value storage with local-storage semantics.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove_item(&self, key: &str) -> Result<(), SessionError>;
}

/// Process-local storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SessionError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), SessionError> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.remove(key);
        Ok(())
    }
}

/// JSON file holding a `{key: string}` map. Re-read on every access.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<HashMap<String, String>, SessionError> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(HashMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(map)?)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        match self.read_map() {
            Ok(mut map) => map.remove(key),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Unreadable session file");
                None
            }
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), SessionError> {
        // A corrupt file is replaced rather than blocking login.
        let mut map = self.read_map().unwrap_or_default();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map)
    }

    fn remove_item(&self, key: &str) -> Result<(), SessionError> {
        let mut map = self.read_map().unwrap_or_default();
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

// ============================================================================
// Session record
// ============================================================================

/// Bearer token plus role and whatever profile fields the server returned.
///
/// Only `token` is required; a missing or unknown role reads as `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    #[serde(default, deserialize_with = "lenient_role", skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(flatten)]
    pub profile: serde_json::Map<String, serde_json::Value>,
}

impl Session {
    pub fn new(token: impl Into<String>, role: Role) -> Self {
        Self {
            token: token.into(),
            role: Some(role),
            profile: serde_json::Map::new(),
        }
    }

    pub fn with_profile(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.profile.insert(key.to_string(), value.into());
        self
    }

    fn profile_str(&self, key: &str) -> Option<&str> {
        self.profile.get(key).and_then(|v| v.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.profile_str("username")
    }

    pub fn email(&self) -> Option<&str> {
        self.profile_str("email")
    }
}

fn lenient_role<'de, D>(deserializer: D) -> Result<Option<Role>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn role_label(session: &Session) -> &'static str {
    session.role.map_or("none", |r| r.as_str())
}

// ============================================================================
// SessionContext
// ============================================================================

/// Explicit `init / current / set / clear` lifecycle over a [`Storage`].
#[derive(Clone)]
pub struct SessionContext {
    storage: Arc<dyn Storage>,
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext").finish_non_exhaustive()
    }
}

impl SessionContext {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// In-memory context with no session.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    /// Load and sanity-check the stored record at startup.
    pub fn init(&self) -> Option<Session> {
        let session = self.current();
        match &session {
            Some(s) => info!(role = role_label(&s), "Restored session"),
            None => debug!("No stored session"),
        }
        session
    }

    /// The stored session, read fresh from storage.
    ///
    /// A missing, empty, `"undefined"` or unparseable record yields `None`;
    /// the latter two are purged from storage.
    pub fn current(&self) -> Option<Session> {
        let raw = self.storage.get_item(SESSION_KEY)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if raw == UNDEFINED_LITERAL {
            self.purge("literal undefined");
            return None;
        }
        match serde_json::from_str::<Session>(raw) {
            Ok(session) => Some(session),
            Err(e) => {
                self.purge(&e.to_string());
                None
            }
        }
    }

    pub fn token(&self) -> Option<String> {
        self.current().map(|s| s.token)
    }

    pub fn role(&self) -> Option<Role> {
        self.current().and_then(|s| s.role)
    }

    pub fn is_logged(&self) -> bool {
        self.current().is_some()
    }

    pub fn set(&self, session: &Session) -> Result<(), SessionError> {
        let raw = serde_json::to_string(session)?;
        self.storage.set_item(SESSION_KEY, &raw)?;
        info!(role = role_label(session), "Session stored");
        Ok(())
    }

    pub fn clear(&self) -> Result<(), SessionError> {
        self.storage.remove_item(SESSION_KEY)?;
        info!("Session cleared");
        Ok(())
    }

    fn purge(&self, reason: &str) {
        warn!(reason, "Discarding invalid session record");
        if let Err(e) = self.storage.remove_item(SESSION_KEY) {
            warn!(error = %e, "Failed to purge session record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_session() -> Session {
        Session::new("tok-123", Role::Client).with_profile("username", "anagarcia")
    }

    #[test]
    fn test_set_current_clear() {
        let ctx = SessionContext::in_memory();
        assert!(ctx.current().is_none());

        ctx.set(&client_session()).unwrap();
        let session = ctx.current().unwrap();
        assert_eq!(session.token, "tok-123");
        assert_eq!(session.role, Some(Role::Client));
        assert_eq!(session.username(), Some("anagarcia"));
        assert!(ctx.is_logged());

        ctx.clear().unwrap();
        assert!(ctx.current().is_none());
        assert!(!ctx.is_logged());
    }

    #[test]
    fn test_undefined_literal_is_purged() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(SESSION_KEY, "undefined").unwrap();
        let ctx = SessionContext::new(storage.clone());

        assert!(ctx.current().is_none());
        assert!(storage.get_item(SESSION_KEY).is_none());
    }

    #[test]
    fn test_garbage_is_purged() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(SESSION_KEY, "{not json").unwrap();
        let ctx = SessionContext::new(storage.clone());

        assert!(ctx.init().is_none());
        assert!(storage.get_item(SESSION_KEY).is_none());
    }

    #[test]
    fn test_token_only_record_keeps_bearer() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(SESSION_KEY, r#"{"token":"tok-9","username":"ana"}"#)
            .unwrap();
        let ctx = SessionContext::new(storage.clone());

        assert_eq!(ctx.token().as_deref(), Some("tok-9"));
        assert_eq!(ctx.role(), None);
        assert!(storage.get_item(SESSION_KEY).is_some());

        storage
            .set_item(SESSION_KEY, r#"{"token":"tok-9","role":"GUEST_ROLE"}"#)
            .unwrap();
        assert_eq!(ctx.token().as_deref(), Some("tok-9"));
        assert_eq!(ctx.role(), None);
    }

    #[test]
    fn test_profile_fields_survive_roundtrip() {
        let ctx = SessionContext::in_memory();
        let session = client_session().with_profile("email", "ana@banco.gt");
        ctx.set(&session).unwrap();
        assert_eq!(ctx.current().unwrap(), session);
    }

    #[test]
    fn test_file_storage_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let ctx = SessionContext::new(Arc::new(FileStorage::new(&path)));
        ctx.set(&client_session()).unwrap();

        let reopened = SessionContext::new(Arc::new(FileStorage::new(&path)));
        assert_eq!(reopened.token().as_deref(), Some("tok-123"));

        reopened.clear().unwrap();
        assert!(ctx.current().is_none());
    }

    #[test]
    fn test_file_storage_corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "[[[").unwrap();

        let storage = FileStorage::new(&path);
        assert!(storage.get_item(SESSION_KEY).is_none());
        storage.set_item(SESSION_KEY, "x").unwrap();
        assert_eq!(storage.get_item(SESSION_KEY).as_deref(), Some("x"));
    }
}
