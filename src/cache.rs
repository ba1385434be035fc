use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use crate::models::{GenerationPayload, PayloadOwner};

/// Stable identity for the requesting user or session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequesterIdentity {
    pub user_id: String,
    pub session_key: String,
}

impl RequesterIdentity {
    /// Resolve a user identifier in priority order: authenticated account id,
    /// then the catalog user id stored on the session, then "anonymous".
    pub fn resolve(
        account_id: Option<&str>,
        catalog_user_id: Option<&str>,
        session_key: &str,
    ) -> Self {
        let user_id = account_id
            .filter(|id| !id.is_empty())
            .or(catalog_user_id.filter(|id| !id.is_empty()))
            .unwrap_or("anonymous")
            .to_string();
        RequesterIdentity {
            user_id,
            session_key: session_key.to_string(),
        }
    }

    pub fn as_owner(&self) -> PayloadOwner {
        PayloadOwner {
            user_id: self.user_id.clone(),
            session_key: self.session_key.clone(),
        }
    }
}

/// Deterministic cache key for a user/prompt pair: the prompt hash scoped by
/// the user identifier so different users can never share an entry.
pub fn cache_key(user_identifier: &str, prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    format!("promptlist:{user_identifier}:{digest:x}")
}

/// Pure ownership check: a payload with absent owner metadata is never
/// considered owned (legacy or tampered entries recompute instead).
pub fn payload_owned_by(payload: &GenerationPayload, identity: &RequesterIdentity) -> bool {
    let owner = &payload.owner;
    if owner.user_id.is_empty() || owner.session_key.is_empty() {
        return false;
    }
    owner.user_id == identity.user_id && owner.session_key == identity.session_key
}

/// Generation payload cache: get by key, set with a TTL.
/// Last-writer-wins on concurrent same-key writes.
#[cfg_attr(test, mockall::automock)]
pub trait CacheStore {
    fn get(&self, key: &str) -> Option<GenerationPayload>;
    fn set(&self, key: &str, value: GenerationPayload, ttl: Duration);
}

struct CacheEntry {
    payload: GenerationPayload,
    expires_at: Instant,
}

/// Process-local TTL cache. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStore for InMemoryCache {
    fn get(&self, key: &str) -> Option<GenerationPayload> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.payload.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: GenerationPayload, ttl: Duration) {
        let entry = CacheEntry {
            payload: value,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .lock()
            .expect("cache lock poisoned")
            .insert(key.to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Attributes, PayloadOwner};
    use crate::playlist::stats::PlaylistStatistics;

    fn payload(owner: PayloadOwner) -> GenerationPayload {
        GenerationPayload {
            playlist: vec!["Song - Artist".to_string()],
            track_ids: vec!["t1".to_string()],
            track_details: Vec::new(),
            attributes: Attributes::default(),
            llm_suggestions: Vec::new(),
            resolved_seed_tracks: Vec::new(),
            seed_track_display: Vec::new(),
            similar_tracks_display: Vec::new(),
            stats: PlaylistStatistics::empty(),
            debug_steps: Vec::new(),
            errors: Vec::new(),
            prompt: "prompt".to_string(),
            suggested_name: "Prompt".to_string(),
            cache_key: "key".to_string(),
            owner,
        }
    }

    #[test]
    fn identity_resolution_order() {
        let id = RequesterIdentity::resolve(Some("42"), Some("cat-user"), "sess");
        assert_eq!(id.user_id, "42");
        let id = RequesterIdentity::resolve(None, Some("cat-user"), "sess");
        assert_eq!(id.user_id, "cat-user");
        let id = RequesterIdentity::resolve(None, None, "sess");
        assert_eq!(id.user_id, "anonymous");
        let id = RequesterIdentity::resolve(Some(""), Some(""), "sess");
        assert_eq!(id.user_id, "anonymous");
    }

    #[test]
    fn cache_key_is_user_scoped_and_deterministic() {
        let a = cache_key("user-a", "road trip songs");
        let b = cache_key("user-b", "road trip songs");
        assert_ne!(a, b);
        assert_eq!(a, cache_key("user-a", "road trip songs"));
        assert!(a.starts_with("promptlist:user-a:"));
    }

    #[test]
    fn ownership_requires_both_fields_to_match() {
        let identity = RequesterIdentity::resolve(Some("42"), None, "sess");
        assert!(payload_owned_by(&payload(identity.as_owner()), &identity));

        let other_user = PayloadOwner {
            user_id: "43".to_string(),
            session_key: "sess".to_string(),
        };
        assert!(!payload_owned_by(&payload(other_user), &identity));

        let other_session = PayloadOwner {
            user_id: "42".to_string(),
            session_key: "other".to_string(),
        };
        assert!(!payload_owned_by(&payload(other_session), &identity));

        // Legacy entries without ownership metadata are never owned.
        assert!(!payload_owned_by(&payload(PayloadOwner::default()), &identity));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        let identity = RequesterIdentity::resolve(Some("42"), None, "sess");
        cache.set("k", payload(identity.as_owner()), Duration::from_secs(60));
        assert!(cache.get("k").is_some());

        cache.set("k", payload(identity.as_owner()), Duration::ZERO);
        assert!(cache.get("k").is_none());
    }
}
