//! Rendered page cache with timed revalidation and tag invalidation.
//!
//! Entries are keyed by concrete path. Concurrent renders of one key collapse
//! onto a single shared future held in the in-flight registry until it
//! settles.

use std::{
    collections::{BTreeSet, HashMap},
    fmt, fs,
    path::Path,
    sync::Arc,
};

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use pagesmith_core::{CachePolicy, RevalidateMode, config::CacheConfig};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error shared between every waiter of one render.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Output of a render started by the cache.
pub type RenderFuture = BoxFuture<'static, std::result::Result<String, SharedError>>;

type Pending = Shared<RenderFuture>;

/// Cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Rendering a path failed and nothing was cached for it.
    #[error("render of {path} failed: {cause}")]
    Render { path: String, cause: SharedError },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Cache file could not be encoded or decoded.
    #[error("cache file error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Start at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at the Unix epoch.
    #[must_use]
    pub fn at_epoch() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }

    /// Move forward by whole seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock();
        *now += TimeDelta::seconds(secs);
    }

    /// Jump to an absolute time.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock() = time;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// A stored render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Concrete path.
    pub key: String,

    /// Rendered document.
    pub html: String,

    /// Policy the entry was stored under.
    pub policy: CachePolicy,

    /// When the render finished.
    pub created_at: DateTime<Utc>,

    /// Invalidation labels.
    pub tags: BTreeSet<String>,
}

/// Outcome of [`PageCache::get_or_render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// Freshly rendered.
    Rendered(String),
    /// Served from a fresh entry.
    Hit(String),
    /// Served from a stale entry while a refresh runs.
    Stale(String),
}

impl Lookup {
    /// The HTML, whatever its origin.
    #[must_use]
    pub fn html(&self) -> &str {
        match self {
            Self::Rendered(html) | Self::Hit(html) | Self::Stale(html) => html,
        }
    }

    /// Take the HTML.
    #[must_use]
    pub fn into_html(self) -> String {
        match self {
            Self::Rendered(html) | Self::Hit(html) | Self::Stale(html) => html,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    entries: Vec<CacheEntry>,
}

const SNAPSHOT_VERSION: u32 = 1;

struct Inner {
    entries: DashMap<String, CacheEntry>,
    inflight: Mutex<HashMap<String, Pending>>,
    clock: Arc<dyn Clock>,
    mode: RevalidateMode,
}

impl Inner {
    fn store(&self, key: &str, html: String, policy: &CachePolicy) {
        if !policy.is_cacheable() {
            return;
        }
        let entry = CacheEntry {
            key: key.to_string(),
            html,
            policy: policy.clone(),
            created_at: self.clock.now(),
            tags: policy.tags(),
        };
        self.entries.insert(key.to_string(), entry);
    }
}

/// Rendered HTML keyed by concrete path.
///
/// Cloning is cheap; clones share entries and in-flight renders.
#[derive(Clone)]
pub struct PageCache {
    inner: Arc<Inner>,
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PageCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCache")
            .field("entries", &self.inner.entries.len())
            .field("inflight", &self.inner.inflight.lock().len())
            .field("mode", &self.inner.mode)
            .finish()
    }
}

impl PageCache {
    /// Create a cache on the system clock with background revalidation.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_clock_and_mode(clock, RevalidateMode::default())
    }

    /// Create a cache with an explicit clock and revalidation mode.
    #[must_use]
    pub fn with_clock_and_mode(clock: Arc<dyn Clock>, mode: RevalidateMode) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                inflight: Mutex::new(HashMap::new()),
                clock,
                mode,
            }),
        }
    }

    /// Create a system-clock cache configured by `[cache]`.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_clock_and_mode(Arc::new(SystemClock), config.revalidate)
    }

    /// Revalidation mode.
    #[must_use]
    pub fn mode(&self) -> RevalidateMode {
        self.inner.mode
    }

    /// Look up an entry regardless of freshness.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.inner.entries.get(key).map(|entry| entry.clone())
    }

    /// Store rendered HTML; `NoCache` is ignored.
    pub fn put(&self, key: &str, html: impl Into<String>, policy: &CachePolicy) {
        self.inner.store(key, html.into(), policy);
    }

    /// Whether an entry needs re-rendering.
    #[must_use]
    pub fn is_stale(&self, entry: &CacheEntry) -> bool {
        match &entry.policy {
            CachePolicy::NoCache => true,
            CachePolicy::Static => false,
            CachePolicy::Timed {
                revalidate_after_secs,
                ..
            } => {
                let age = self.inner.clock.now() - entry.created_at;
                i64::try_from(*revalidate_after_secs)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .is_some_and(|window| age > window)
            }
        }
    }

    /// Remove every entry carrying `tag`, returning how many were removed.
    ///
    /// Renders already in flight still store their result when they finish.
    pub fn invalidate_by_tag(&self, tag: &str) -> usize {
        let mut removed = 0;
        self.inner.entries.retain(|_, entry| {
            let keep = !entry.tags.contains(tag);
            if !keep {
                removed += 1;
            }
            keep
        });
        info!(tag, removed, "invalidated cache entries");
        removed
    }

    /// Remove one entry.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        self.inner.entries.remove(key).map(|(_, entry)| entry)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.entries.clear();
    }

    /// Stored keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Serve `key` under `policy`, rendering with `render` when needed.
    ///
    /// `render` is called at most once, and not at all when a fresh entry
    /// exists or another render of `key` is already in flight.
    pub async fn get_or_render<F>(&self, key: &str, policy: &CachePolicy, render: F) -> Result<Lookup>
    where
        F: FnOnce() -> RenderFuture,
    {
        if !policy.is_cacheable() {
            let html = render().await.map_err(|cause| CacheError::Render {
                path: key.to_string(),
                cause,
            })?;
            return Ok(Lookup::Rendered(html));
        }

        if let Some(entry) = self.get(key) {
            if !self.is_stale(&entry) {
                debug!(path = key, "cache hit");
                return Ok(Lookup::Hit(entry.html));
            }

            debug!(path = key, "cache entry stale");
            let pending = self.pending(key, policy, render);
            return match (self.inner.mode, tokio::runtime::Handle::try_current()) {
                (RevalidateMode::Background, Ok(handle)) => {
                    let key = key.to_string();
                    handle.spawn(async move {
                        if let Err(err) = pending.await {
                            warn!(path = %key, error = %err, "stale refresh failed, keeping previous entry");
                        }
                    });
                    Ok(Lookup::Stale(entry.html))
                }
                _ => match pending.await {
                    Ok(html) => Ok(Lookup::Rendered(html)),
                    Err(err) => {
                        warn!(path = key, error = %err, "stale refresh failed, keeping previous entry");
                        Ok(Lookup::Stale(entry.html))
                    }
                },
            };
        }

        let html = self
            .pending(key, policy, render)
            .await
            .map_err(|cause| CacheError::Render {
                path: key.to_string(),
                cause,
            })?;
        Ok(Lookup::Rendered(html))
    }

    /// Join the in-flight render of `key`, or start one.
    fn pending<F>(&self, key: &str, policy: &CachePolicy, render: F) -> Pending
    where
        F: FnOnce() -> RenderFuture,
    {
        let mut inflight = self.inner.inflight.lock();
        if let Some(pending) = inflight.get(key) {
            debug!(path = key, "joining in-flight render");
            return pending.clone();
        }

        let inner = Arc::clone(&self.inner);
        let owned_key = key.to_string();
        let policy = policy.clone();
        let work = render();
        let pending = async move {
            let result = work.await;
            if let Ok(html) = &result {
                inner.store(&owned_key, html.clone(), &policy);
            }
            inner.inflight.lock().remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        inflight.insert(key.to_string(), pending.clone());
        pending
    }

    /// Whether a render of `key` is in flight.
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner.inflight.lock().contains_key(key)
    }

    /// Wait for the in-flight render of `key`, if any.
    pub async fn wait_for(&self, key: &str) -> Option<std::result::Result<String, SharedError>> {
        let pending = self.inner.inflight.lock().get(key).cloned();
        match pending {
            Some(pending) => Some(pending.await),
            None => None,
        }
    }

    /// Wait until no render is in flight.
    pub async fn drain(&self) {
        loop {
            let pending: Vec<Pending> = self.inner.inflight.lock().values().cloned().collect();
            if pending.is_empty() {
                return;
            }
            debug!(count = pending.len(), "draining in-flight renders");
            future::join_all(pending).await;
        }
    }

    /// Write every entry to a JSON file.
    pub fn export(&self, path: &Path) -> Result<usize> {
        let mut entries: Vec<CacheEntry> =
            self.inner.entries.iter().map(|e| e.value().clone()).collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let count = entries.len();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            entries,
        };
        fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;

        debug!(path = %path.display(), entries = count, "exported cache");
        Ok(count)
    }

    /// Load entries from a JSON file written by [`export`](Self::export).
    ///
    /// Loaded entries replace existing ones with the same key.
    pub fn import(&self, path: &Path) -> Result<usize> {
        let snapshot: Snapshot = serde_json::from_slice(&fs::read(path)?)?;
        let count = snapshot.entries.len();
        for entry in snapshot.entries {
            self.inner.entries.insert(entry.key.clone(), entry);
        }

        debug!(path = %path.display(), entries = count, "imported cache");
        Ok(count)
    }
}
