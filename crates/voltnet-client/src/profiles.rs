use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

use voltnet_types::models::Profile;

use crate::api::ServerApi;
use crate::error::SyncError;

/// Bounded read-through cache for display identities, shared across the
/// messaging and notification views. Populated lazily on first reference;
/// LRU eviction keeps it at a fixed capacity.
pub struct ProfileCache {
    inner: Mutex<LruCache<Uuid, Profile>>,
}

impl ProfileCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache hit or a single server fetch. Failed lookups are not cached, so
    /// a transient miss retries on the next reference.
    pub async fn resolve<A: ServerApi>(&self, api: &A, user_id: Uuid) -> Result<Profile, SyncError> {
        if let Some(hit) = self.peek(user_id) {
            return Ok(hit);
        }

        let profile = api.fetch_profile(user_id).await?;
        if let Ok(mut cache) = self.inner.lock() {
            cache.put(user_id, profile.clone());
        }
        Ok(profile)
    }

    pub fn peek(&self, user_id: Uuid) -> Option<Profile> {
        self.inner.lock().ok()?.get(&user_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
