//! Rotating dashboard sessions.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "ludocore_session";

/// How long sessions last.
pub const SESSION_DURATION_HOURS: i64 = 24;

/// Length of session IDs in bytes.
const SESSION_ID_LENGTH: usize = 32;

/// How often the background sweep evicts expired sessions.
pub const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An authenticated dashboard session.
#[derive(Debug, Clone)]
pub struct Session {
    /// The opaque session ID carried in the cookie.
    pub id: String,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// In-memory store of live sessions. Created on login, deleted on logout or
/// rotation, evicted lazily on expired lookup and by the hourly sweep.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new session and returns it.
    pub fn create_session(&self) -> Session {
        let session = Session {
            id: generate_session_id(),
            created_at: Utc::now(),
            expires_at: Utc::now() + chrono::Duration::hours(SESSION_DURATION_HOURS),
        };

        self.sessions
            .write()
            .unwrap()
            .insert(session.id.clone(), session.clone());
        session
    }

    /// Returns whether a session ID is currently valid. Expired sessions are
    /// evicted on the spot.
    pub fn validate_session(&self, id: &str) -> bool {
        let expired = {
            let sessions = self.sessions.read().unwrap();
            match sessions.get(id) {
                Some(session) => Utc::now() > session.expires_at,
                None => return false,
            }
        };

        if expired {
            self.delete_session(id);
            return false;
        }
        true
    }

    /// Removes a session.
    pub fn delete_session(&self, id: &str) {
        self.sessions.write().unwrap().remove(id);
    }

    /// Removes every session. Called on successful login so a leaked cookie
    /// does not outlive the next key use.
    pub fn invalidate_all(&self) {
        self.sessions.write().unwrap().clear();
    }

    /// Evicts all expired sessions. Periodically driven by the daemon.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().unwrap();
        let before = sessions.len();
        sessions.retain(|_, session| now <= session.expires_at);
        before - sessions.len()
    }

    /// Returns the number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Returns whether no sessions are live.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn generate_session_id() -> String {
    let mut bytes = [0u8; SESSION_ID_LENGTH];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_validate_session() {
        let store = SessionStore::new();
        let session = store.create_session();

        assert_eq!(session.id.len(), SESSION_ID_LENGTH * 2);
        assert!(store.validate_session(&session.id));
        assert!(!store.validate_session("not-a-session"));
    }

    #[test]
    fn test_delete_session() {
        let store = SessionStore::new();
        let session = store.create_session();
        store.delete_session(&session.id);
        assert!(!store.validate_session(&session.id));
    }

    #[test]
    fn test_expired_session_evicted_on_lookup() {
        let store = SessionStore::new();
        let session = store.create_session();

        store
            .sessions
            .write()
            .unwrap()
            .get_mut(&session.id)
            .unwrap()
            .expires_at = Utc::now() - chrono::Duration::seconds(1);

        assert!(!store.validate_session(&session.id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_all_rotates_out_old_sessions() {
        let store = SessionStore::new();
        let old = store.create_session();

        store.invalidate_all();
        let fresh = store.create_session();

        assert!(!store.validate_session(&old.id));
        assert!(store.validate_session(&fresh.id));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let store = SessionStore::new();
        let live = store.create_session();
        let dead = store.create_session();

        store
            .sessions
            .write()
            .unwrap()
            .get_mut(&dead.id)
            .unwrap()
            .expires_at = Utc::now() - chrono::Duration::hours(1);

        assert_eq!(store.sweep_expired(), 1);
        assert!(store.validate_session(&live.id));
        assert!(!store.validate_session(&dead.id));
    }
}
