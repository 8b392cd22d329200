pub mod store;
pub mod memory_store;
pub mod reaper;

#[cfg(feature = "file-backend")]
pub mod file_store;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use memory_store::MemoryStore;
pub use reaper::Reaper;
pub use store::Store;

#[cfg(feature = "file-backend")]
pub use file_store::FileStore;

/// A session record.
///
/// `origin` is fixed at creation and `tstamp` is only moved by the owning
/// store, so both are read through getters. `token` and `data` belong to the
/// caller and are edited inside [`Store::update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    origin: DateTime<Utc>,
    tstamp: DateTime<Utc>,
    pub token: String,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            origin: now,
            tstamp: now,
            token: String::new(),
            data: HashMap::new(),
        }
    }

    /// When the record was created.
    pub fn origin(&self) -> DateTime<Utc> {
        self.origin
    }

    /// When the record was last touched by an update.
    pub fn tstamp(&self) -> DateTime<Utc> {
        self.tstamp
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.data.remove(key)
    }

    /// Deadline after which the record counts as absent, `None` if it never expires.
    pub fn deadline(&self, ttl: Duration) -> Option<DateTime<Utc>> {
        deadline(self.tstamp, ttl)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.deadline(ttl).is_some_and(|d| d <= now)
    }

    pub(crate) fn touch(&mut self) {
        self.tstamp = Utc::now();
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// `from + ttl`. A zero TTL, or one too large to represent, never expires.
pub(crate) fn deadline(from: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    if ttl.is_zero() {
        return None;
    }
    let ttl = chrono::Duration::from_std(ttl).ok()?;
    from.checked_add_signed(ttl)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert_eq!(session.origin(), session.tstamp());
        assert!(session.token.is_empty());
        assert!(session.data.is_empty());
    }

    #[test]
    fn test_session_data_ops() {
        let mut session = Session::new();
        session.set("user", "alice");
        session.set("visits", 3);

        assert_eq!(session.get("user"), Some(&serde_json::json!("alice")));
        assert_eq!(session.get("visits"), Some(&serde_json::json!(3)));

        assert_eq!(session.remove("user"), Some(serde_json::json!("alice")));
        assert!(session.get("user").is_none());
        assert_eq!(session.data.len(), 1);
    }

    #[test]
    fn test_touch_keeps_origin() {
        let mut session = Session::new();
        let origin = session.origin();
        std::thread::sleep(Duration::from_millis(5));
        session.touch();
        assert_eq!(session.origin(), origin);
        assert!(session.tstamp() > origin);
    }

    #[test]
    fn test_deadline() {
        let session = Session::new();
        assert_eq!(session.deadline(Duration::ZERO), None);
        assert_eq!(session.deadline(Duration::MAX), None);

        let d = session.deadline(Duration::from_secs(60)).unwrap();
        assert_eq!(d - session.tstamp(), chrono::Duration::seconds(60));
    }

    #[test]
    fn test_is_expired() {
        let session = Session::new();
        let later = session.tstamp() + chrono::Duration::seconds(120);

        assert!(!session.is_expired(Duration::from_secs(60), session.tstamp()));
        assert!(session.is_expired(Duration::from_secs(60), later));
        assert!(!session.is_expired(Duration::ZERO, later));
    }

    #[test]
    fn test_session_serde_roundtrip() {
        let mut session = Session::new();
        session.token = "tok-123".to_string();
        session.set("name", "bob");
        session.set("age", 42);
        session.set("tags", serde_json::json!(["a", "b"]));
        session.set("prefs", serde_json::json!({"theme": "dark", "beta": true}));

        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, session);
    }
}
