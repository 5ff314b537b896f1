//! Processing credit accounting
//!
//! One credit is consumed per completed job. The running count is held in
//! memory and written through to a [`CreditStore`] after every increment, so a
//! restart picks up where the previous process left off. Failed, cancelled and
//! removed jobs never consume a credit.

use crate::error::{BgRemovalError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Persistence for the consumed-credit counter
#[async_trait]
pub trait CreditStore: Send + Sync + std::fmt::Debug {
    /// Read the persisted count; an empty store reads as zero
    async fn read_credits_used(&self) -> Result<u64>;

    /// Overwrite the persisted count
    async fn write_credits_used(&self, used: u64) -> Result<()>;
}

/// In-memory store, mainly for tests and one-shot runs
///
/// Clones share the same counter, which lets a test keep a handle and observe
/// what the counter wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryCreditStore {
    value: Arc<AtomicU64>,
}

impl MemoryCreditStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a previous count
    #[must_use]
    pub fn with_value(used: u64) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(used)),
        }
    }

    /// Last value written
    #[must_use]
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CreditStore for MemoryCreditStore {
    async fn read_credits_used(&self) -> Result<u64> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    async fn write_credits_used(&self, used: u64) -> Result<()> {
        self.value.store(used, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CreditFile {
    credits_used: u64,
}

/// JSON file store: `{"credits_used": n}`
#[derive(Debug, Clone)]
pub struct JsonFileCreditStore {
    path: PathBuf,
}

impl JsonFileCreditStore {
    pub const FILE_NAME: &'static str = "credits.json";

    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<data_dir>/bgstrip/credits.json`
    ///
    /// # Errors
    /// - `Credits` if the platform has no data directory
    pub fn default_location() -> Result<Self> {
        Self::default_path().map(Self::new)
    }

    /// Default credit file path
    ///
    /// # Errors
    /// - `Credits` if the platform has no data directory
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join("bgstrip").join(Self::FILE_NAME))
            .ok_or_else(|| BgRemovalError::credits("Failed to determine data directory"))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CreditStore for JsonFileCreditStore {
    async fn read_credits_used(&self) -> Result<u64> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(BgRemovalError::file_io_error("read credit file", &self.path, &e))
            },
        };
        let file: CreditFile = serde_json::from_str(&content).map_err(|e| {
            BgRemovalError::credits(format!(
                "Credit file {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(file.credits_used)
    }

    async fn write_credits_used(&self, used: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BgRemovalError::file_io_error("create credit directory", parent, &e))?;
        }
        let json = serde_json::to_string(&CreditFile { credits_used: used })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| BgRemovalError::file_io_error("write credit file", &self.path, &e))
    }
}

/// Snapshot of the credit balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingCredits {
    pub total: u64,
    pub used: u64,
    /// `total - used`, floored at zero
    pub remaining: u64,
}

/// Monotonic counter of completed jobs
///
/// Increments are atomic; writes to the store are serialized and always carry
/// the newest count, so the store never goes backwards.
#[derive(Debug)]
pub struct CreditCounter {
    used: AtomicU64,
    total: u64,
    store: Arc<dyn CreditStore>,
    write_lock: Mutex<()>,
}

impl CreditCounter {
    /// Load the persisted count from `store`
    ///
    /// A store that cannot be read starts the counter at zero instead of
    /// refusing to start.
    pub async fn load(store: Arc<dyn CreditStore>, total: u64) -> Self {
        let used = match store.read_credits_used().await {
            Ok(used) => used,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load credit count, starting from 0");
                0
            },
        };
        tracing::debug!(used, total, "Credit counter loaded");
        Self {
            used: AtomicU64::new(used),
            total,
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Counter backed by a fresh in-memory store
    #[must_use]
    pub fn in_memory(total: u64) -> Self {
        Self {
            used: AtomicU64::new(0),
            total,
            store: Arc::new(MemoryCreditStore::new()),
            write_lock: Mutex::new(()),
        }
    }

    /// Consume one credit and persist the new count
    ///
    /// Persistence failures are logged; the in-memory count is authoritative
    /// and the job that earned the credit still completes.
    pub async fn increment(&self) -> u64 {
        let used = self.consume();
        self.persist().await;
        used
    }

    /// Consume one credit in memory only
    ///
    /// Callable while holding a synchronous lock; follow with [`persist`](Self::persist).
    pub fn consume(&self) -> u64 {
        self.used.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Write the current count through to the store
    ///
    /// Always writes the latest value rather than the caller's, so racing
    /// completions can finish persisting in any order.
    pub async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let used = self.used();
        if let Err(e) = self.store.write_credits_used(used).await {
            tracing::warn!(error = %e, used, "Failed to persist credit count");
        }
    }

    #[must_use]
    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn summary(&self) -> ProcessingCredits {
        let used = self.used();
        ProcessingCredits {
            total: self.total,
            used,
            remaining: self.total.saturating_sub(used),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl CreditStore for BrokenStore {
        async fn read_credits_used(&self) -> Result<u64> {
            Err(BgRemovalError::credits("unreadable"))
        }

        async fn write_credits_used(&self, _used: u64) -> Result<()> {
            Err(BgRemovalError::credits("read-only"))
        }
    }

    #[tokio::test]
    async fn test_counter_resumes_from_store() {
        let store = MemoryCreditStore::with_value(7);
        let counter = CreditCounter::load(Arc::new(store.clone()), 100).await;
        assert_eq!(counter.used(), 7);

        assert_eq!(counter.increment().await, 8);
        assert_eq!(store.value(), 8);
        assert_eq!(
            counter.summary(),
            ProcessingCredits {
                total: 100,
                used: 8,
                remaining: 92
            }
        );
    }

    #[tokio::test]
    async fn test_remaining_never_negative() {
        let counter = CreditCounter::load(Arc::new(MemoryCreditStore::with_value(3)), 2).await;
        assert_eq!(counter.summary().remaining, 0);
    }

    #[tokio::test]
    async fn test_broken_store_does_not_block_counting() {
        let counter = CreditCounter::load(Arc::new(BrokenStore), 100).await;
        assert_eq!(counter.used(), 0);
        assert_eq!(counter.increment().await, 1);
        assert_eq!(counter.increment().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryCreditStore::new();
        let counter = Arc::new(CreditCounter::load(Arc::new(store.clone()), 100).await);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let counter = counter.clone();
                tokio::spawn(async move { counter.increment().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.used(), 16);
        assert_eq!(store.value(), 16);
    }

    #[tokio::test]
    async fn test_consume_then_persist_writes_latest() {
        let store = MemoryCreditStore::new();
        let counter = CreditCounter::load(Arc::new(store.clone()), 100).await;

        assert_eq!(counter.consume(), 1);
        assert_eq!(counter.consume(), 2);
        assert_eq!(store.value(), 0);

        counter.persist().await;
        assert_eq!(store.value(), 2);
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/credits.json");
        let store = JsonFileCreditStore::new(&path);

        assert_eq!(store.read_credits_used().await.unwrap(), 0);
        store.write_credits_used(42).await.unwrap();
        assert_eq!(store.read_credits_used().await.unwrap(), 42);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"credits_used":42}"#);
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credits.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileCreditStore::new(&path)
            .read_credits_used()
            .await
            .unwrap_err();
        assert!(matches!(err, BgRemovalError::Credits(_)));
    }
}
