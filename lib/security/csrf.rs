//! Single-use CSRF tokens for state-changing requests.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Length of CSRF tokens in bytes.
const CSRF_TOKEN_LENGTH: usize = 32;

/// How long an unused token survives before the sweep discards it.
const CSRF_TOKEN_MAX_AGE_HOURS: i64 = 24;

/// How often the background sweep runs.
pub const CSRF_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Mints and consumes single-use CSRF tokens. A token stays in the live set
/// until it is consumed by a state-changing request, aged out by the sweep,
/// or the process restarts.
#[derive(Debug, Default)]
pub struct CsrfManager {
    tokens: RwLock<HashMap<String, DateTime<Utc>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CsrfManager {
    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a new token and adds it to the live set.
    pub fn generate_token(&self) -> String {
        let mut bytes = [0u8; CSRF_TOKEN_LENGTH];
        OsRng.fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        self.tokens
            .write()
            .unwrap()
            .insert(token.clone(), Utc::now());
        token
    }

    /// Consumes a token: returns true and removes it if it was live. A second
    /// call with the same token returns false.
    pub fn consume_token(&self, token: &str) -> bool {
        self.tokens.write().unwrap().remove(token).is_some()
    }

    /// Discards tokens older than the maximum age. Periodically driven by the
    /// daemon so an abandoned dashboard cannot grow the set without bound.
    pub fn sweep_stale(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(CSRF_TOKEN_MAX_AGE_HOURS);
        let mut tokens = self.tokens.write().unwrap();
        let before = tokens.len();
        tokens.retain(|_, minted_at| *minted_at > cutoff);
        before - tokens.len()
    }

    /// Returns the number of outstanding tokens.
    pub fn len(&self) -> usize {
        self.tokens.read().unwrap().len()
    }

    /// Returns whether no tokens are outstanding.
    pub fn is_empty(&self) -> bool {
        self.tokens.read().unwrap().is_empty()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_single_use() {
        let manager = CsrfManager::new();
        let token = manager.generate_token();

        assert!(manager.consume_token(&token));
        assert!(!manager.consume_token(&token));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let manager = CsrfManager::new();
        manager.generate_token();
        assert!(!manager.consume_token("forged"));
    }

    #[test]
    fn test_tokens_are_distinct() {
        let manager = CsrfManager::new();
        let a = manager.generate_token();
        let b = manager.generate_token();
        assert_ne!(a, b);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_sweep_discards_only_stale() {
        let manager = CsrfManager::new();
        let stale = manager.generate_token();
        let fresh = manager.generate_token();

        *manager.tokens.write().unwrap().get_mut(&stale).unwrap() =
            Utc::now() - chrono::Duration::hours(CSRF_TOKEN_MAX_AGE_HOURS + 1);

        assert_eq!(manager.sweep_stale(), 1);
        assert!(!manager.consume_token(&stale));
        assert!(manager.consume_token(&fresh));
    }
}
