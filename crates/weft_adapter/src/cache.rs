//! TTL cache for model listings.
//!
//! Entries expire lazily: on access and on size queries. There is no
//! background sweeper; an entry past its TTL is simply dropped the next time
//! anything looks at it.

use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use crate::models::ModelListing;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Whether a cache is shared process-wide or private to one owner.
///
/// The global scope deduplicates model fetches across bridges; the instance
/// scope keeps per-bridge isolation possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    Global,
    Instance,
}

#[derive(Debug)]
struct Entry {
    listing: ModelListing,
    expires_at: Instant,
}

/// A keyed model-listing cache with per-entry TTL.
#[derive(Debug)]
pub struct ModelCache {
    entries: Mutex<IndexMap<String, Entry>>,
    ttl: Duration,
}

impl ModelCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ttl,
        }
    }

    /// The process-wide cache, created on first use with [`DEFAULT_TTL`].
    pub fn global() -> &'static ModelCache {
        static GLOBAL: OnceLock<ModelCache> = OnceLock::new();
        GLOBAL.get_or_init(|| ModelCache::new(DEFAULT_TTL))
    }

    /// The cached listing for `name`, if present and fresh.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ModelListing> {
        let mut entries = self.entries.lock();
        let entry = entries.get(name)?;

        if entry.expires_at <= Instant::now() {
            trace!(name, "Evicting expired model cache entry.");
            entries.shift_remove(name);
            return None;
        }

        Some(entry.listing.clone())
    }

    pub fn insert(&self, name: impl Into<String>, listing: ModelListing) {
        self.entries.lock().insert(
            name.into(),
            Entry {
                listing,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, name: &str) {
        self.entries.lock().shift_remove(name);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Number of fresh entries; expired ones are evicted on the way.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);
        entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
