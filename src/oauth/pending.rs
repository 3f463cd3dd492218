//! In-flight authorization attempts keyed by their `state` token

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;

use crate::utils::crypto::generate_state_token;

/// What the callback needs to finish one authorization attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    pub code_verifier: String,
    pub redirect_uri: String,
    pub return_to: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Short-lived map from state token to PKCE verifier and callback context.
///
/// Each entry is handed out once. Entries older than the TTL are dropped on
/// every access; at capacity the oldest entry makes room.
#[derive(Debug)]
pub struct PendingAuthorizations {
    entries: Mutex<HashMap<String, PendingAuthorization>>,
    ttl: Duration,
    max_entries: usize,
}

impl PendingAuthorizations {
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingAuthorization>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &PendingAuthorization, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(entry.created_at)
            .to_std()
            .is_ok_and(|age| age > self.ttl)
    }

    fn evict_expired(&self, entries: &mut HashMap<String, PendingAuthorization>, now: DateTime<Utc>) {
        let before = entries.len();
        entries.retain(|_, entry| !self.is_expired(entry, now));
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("🧹 Evicted {evicted} expired authorization attempts");
        }
    }

    /// Register a new attempt and return its freshly generated state token
    pub fn insert(&self, pending: PendingAuthorization) -> String {
        let state = generate_state_token();
        let mut entries = self.lock();
        self.evict_expired(&mut entries, Utc::now());

        while entries.len() >= self.max_entries {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }

        entries.insert(state.clone(), pending);
        state
    }

    /// Remove and return the attempt for `state`; expired or unknown → `None`
    pub fn take(&self, state: &str) -> Option<PendingAuthorization> {
        let mut entries = self.lock();
        let now = Utc::now();
        self.evict_expired(&mut entries, now);
        entries.remove(state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(verifier: &str, created_at: DateTime<Utc>) -> PendingAuthorization {
        PendingAuthorization {
            code_verifier: verifier.to_string(),
            redirect_uri: "https://cht.test/medic/oidc/get_token".to_string(),
            return_to: None,
            created_at,
        }
    }

    #[test]
    fn test_take_consumes_entry_once() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 10);
        let state = pending.insert(attempt("v1", Utc::now()));

        assert_eq!(pending.take(&state).map(|p| p.code_verifier), Some("v1".to_string()));
        assert_eq!(pending.take(&state), None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_concurrent_attempts_keep_their_own_verifier() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 10);
        let alice = pending.insert(attempt("alice-verifier", Utc::now()));
        let bob = pending.insert(attempt("bob-verifier", Utc::now()));

        assert_ne!(alice, bob);
        assert_eq!(pending.take(&bob).unwrap().code_verifier, "bob-verifier");
        assert_eq!(pending.take(&alice).unwrap().code_verifier, "alice-verifier");
    }

    #[test]
    fn test_expired_entries_are_not_returned() {
        let pending = PendingAuthorizations::new(Duration::from_secs(60), 10);
        let stale = pending.insert(attempt("old", Utc::now() - chrono::Duration::seconds(120)));

        assert_eq!(pending.take(&stale), None);
    }

    #[test]
    fn test_oldest_entry_evicted_at_capacity() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 2);
        let now = Utc::now();
        let first = pending.insert(attempt("first", now - chrono::Duration::seconds(30)));
        let second = pending.insert(attempt("second", now - chrono::Duration::seconds(20)));
        let third = pending.insert(attempt("third", now));

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.take(&first), None);
        assert!(pending.take(&second).is_some());
        assert!(pending.take(&third).is_some());
    }

    #[test]
    fn test_unknown_state() {
        let pending = PendingAuthorizations::new(Duration::from_secs(600), 10);
        assert_eq!(pending.take("never-issued"), None);
    }
}
