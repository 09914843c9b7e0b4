//! Per-job temporary asset tracking and release.
//!
//! Every file a job creates (materialized inputs, stage outputs) is registered
//! with the job's [`AssetLedger`] the moment its path is allocated, before any
//! byte is written. `release_all` deletes each registered path once; later
//! calls are no-ops.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use reel_models::{ContentKind, JobId};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Filesystem operations used by the asset lifecycle.
#[async_trait]
pub trait AssetFs: Send + Sync {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;
    async fn remove(&self, path: &Path) -> io::Result<()>;
    /// Size in bytes; `NotFound` when the file does not exist.
    async fn len(&self, path: &Path) -> io::Result<u64>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

#[async_trait]
impl AssetFs for TokioFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }

    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        tokio::fs::write(path, content).await
    }

    async fn remove(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn len(&self, path: &Path) -> io::Result<u64> {
        Ok(tokio::fs::metadata(path).await?.len())
    }
}

/// A temporary file owned by one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedAsset {
    pub path: PathBuf,
    pub job_id: JobId,
    pub kind: ContentKind,
}

/// Outcome of one `release_all` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Paths deleted by this pass
    pub removed: Vec<PathBuf>,
    /// Paths that were already gone
    pub missing: Vec<PathBuf>,
    /// Paths whose deletion failed (logged, never escalated)
    pub failed: Vec<PathBuf>,
}

impl ReleaseReport {
    /// Number of paths this pass attempted.
    pub fn attempted(&self) -> usize {
        self.removed.len() + self.missing.len() + self.failed.len()
    }
}

#[derive(Debug)]
struct Entry {
    path: PathBuf,
    released: bool,
}

/// Release set for one job.
pub struct AssetLedger {
    job_id: JobId,
    work_dir: PathBuf,
    fs: Arc<dyn AssetFs>,
    entries: Mutex<Vec<Entry>>,
}

impl AssetLedger {
    pub fn new(job_id: JobId, work_dir: impl Into<PathBuf>, fs: Arc<dyn AssetFs>) -> Self {
        Self {
            job_id,
            work_dir: work_dir.into(),
            fs,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn fs(&self) -> &Arc<dyn AssetFs> {
        &self.fs
    }

    /// Make sure the work directory exists.
    pub async fn prepare(&self) -> io::Result<()> {
        self.fs.create_dir_all(&self.work_dir).await
    }

    /// Reserve a fresh, globally unique path and register it.
    pub fn allocate(&self, kind: ContentKind, extension: &str) -> MaterializedAsset {
        let path = self
            .work_dir
            .join(format!("{}_{}.{}", Uuid::new_v4(), kind.as_str(), extension));
        self.register(&path);

        MaterializedAsset {
            path,
            job_id: self.job_id.clone(),
            kind,
        }
    }

    /// Track an externally created path. Returns `false` if it was already tracked.
    pub fn register(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let mut entries = self.lock();

        if entries.iter().any(|e| e.path == path) {
            return false;
        }

        debug!(job_id = %self.job_id, path = %path.display(), "Registered asset");
        entries.push(Entry {
            path: path.to_path_buf(),
            released: false,
        });
        true
    }

    /// Every path ever registered, in registration order.
    pub fn registered(&self) -> Vec<PathBuf> {
        self.lock().iter().map(|e| e.path.clone()).collect()
    }

    /// Whether any registered path has not been released yet.
    pub fn has_pending(&self) -> bool {
        self.lock().iter().any(|e| !e.released)
    }

    /// Delete every registered asset not yet released.
    ///
    /// Paths are marked released before deletion starts, so concurrent or
    /// repeated calls never attempt the same path twice. Failures are logged
    /// and the pass continues.
    pub async fn release_all(&self) -> ReleaseReport {
        let pending: Vec<PathBuf> = {
            let mut entries = self.lock();
            entries
                .iter_mut()
                .filter(|e| !e.released)
                .map(|e| {
                    e.released = true;
                    e.path.clone()
                })
                .collect()
        };

        let mut report = ReleaseReport::default();

        for path in pending {
            match self.fs.remove(&path).await {
                Ok(()) => report.removed.push(path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => report.missing.push(path),
                Err(e) => {
                    warn!(
                        job_id = %self.job_id,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete temporary asset"
                    );
                    report.failed.push(path);
                }
            }
        }

        if report.attempted() > 0 {
            info!(
                job_id = %self.job_id,
                removed = report.removed.len(),
                missing = report.missing.len(),
                failed = report.failed.len(),
                "Released job assets"
            );
        }

        report
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for AssetLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLedger")
            .field("job_id", &self.job_id)
            .field("work_dir", &self.work_dir)
            .field("entries", &*self.lock())
            .finish()
    }
}

/// Releases a ledger's pending assets when dropped.
///
/// Covers the paths where the job future never reaches its own cleanup,
/// such as a dropped request future after a client disconnect.
pub struct ReleaseGuard {
    ledger: Arc<AssetLedger>,
}

impl ReleaseGuard {
    pub fn new(ledger: Arc<AssetLedger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<AssetLedger> {
        &self.ledger
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.ledger.has_pending() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let ledger = Arc::clone(&self.ledger);
                handle.spawn(async move {
                    ledger.release_all().await;
                });
            }
            Err(_) => {
                warn!(
                    job_id = %self.ledger.job_id,
                    "ReleaseGuard dropped outside a runtime, assets left on disk"
                );
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeFs;
    use super::*;

    fn ledger_with(fs: Arc<FakeFs>) -> AssetLedger {
        AssetLedger::new(JobId::from_string("job-1"), "/work", fs)
    }

    #[test]
    fn test_allocate_generates_unique_registered_paths() {
        let ledger = ledger_with(Arc::new(FakeFs::default()));
        let a = ledger.allocate(ContentKind::Video, "mp4");
        let b = ledger.allocate(ContentKind::Video, "mp4");

        assert_ne!(a.path, b.path);
        assert!(a.path.starts_with("/work"));
        assert_eq!(a.path.extension().unwrap(), "mp4");
        assert_eq!(a.job_id.as_str(), "job-1");
        assert_eq!(ledger.registered(), vec![a.path, b.path]);
    }

    #[test]
    fn test_register_dedupes() {
        let ledger = ledger_with(Arc::new(FakeFs::default()));
        assert!(ledger.register("/work/x.mp4"));
        assert!(!ledger.register("/work/x.mp4"));
        assert_eq!(ledger.registered().len(), 1);
    }

    #[tokio::test]
    async fn test_release_all_removes_everything_once() {
        let fs = Arc::new(FakeFs::default());
        let ledger = ledger_with(fs.clone());
        let a = ledger.allocate(ContentKind::Video, "mp4");
        let b = ledger.allocate(ContentKind::Audio, "mp3");
        fs.put(&a.path, b"video");
        fs.put(&b.path, b"audio");

        let first = ledger.release_all().await;
        assert_eq!(first.removed.len(), 2);
        assert!(!fs.exists(&a.path));
        assert!(!fs.exists(&b.path));

        let second = ledger.release_all().await;
        assert_eq!(second.attempted(), 0);
        assert_eq!(fs.removal_count(&a.path), 1);
        assert_eq!(fs.removal_count(&b.path), 1);
        assert!(!ledger.has_pending());
    }

    #[tokio::test]
    async fn test_release_tolerates_missing_and_failing_paths() {
        let fs = Arc::new(FakeFs::default());
        let ledger = ledger_with(fs.clone());
        let never_written = ledger.allocate(ContentKind::Video, "mp4");
        let stuck = ledger.allocate(ContentKind::Video, "mp4");
        let normal = ledger.allocate(ContentKind::Audio, "mp3");
        fs.put(&stuck.path, b"x");
        fs.put(&normal.path, b"y");
        fs.fail_removal.lock().unwrap().insert(stuck.path.clone());

        let report = ledger.release_all().await;
        assert_eq!(report.missing, vec![never_written.path]);
        assert_eq!(report.failed, vec![stuck.path.clone()]);
        assert_eq!(report.removed, vec![normal.path.clone()]);
        assert!(!fs.exists(&normal.path));

        // Failed paths are not retried
        ledger.release_all().await;
        assert_eq!(fs.removal_count(&stuck.path), 1);
    }

    #[tokio::test]
    async fn test_release_guard_releases_on_drop() {
        let fs = Arc::new(FakeFs::default());
        let ledger = Arc::new(ledger_with(fs.clone()));
        let asset = ledger.allocate(ContentKind::Video, "mp4");
        fs.put(&asset.path, b"x");

        drop(ReleaseGuard::new(ledger.clone()));

        for _ in 0..50 {
            if !fs.exists(&asset.path) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!fs.exists(&asset.path));
        assert!(!ledger.has_pending());
    }

    #[tokio::test]
    async fn test_release_guard_is_quiet_after_release() {
        let fs = Arc::new(FakeFs::default());
        let ledger = Arc::new(ledger_with(fs.clone()));
        let asset = ledger.allocate(ContentKind::Video, "mp4");
        fs.put(&asset.path, b"x");

        let guard = ReleaseGuard::new(ledger.clone());
        guard.ledger().release_all().await;
        drop(guard);
        tokio::task::yield_now().await;

        assert_eq!(fs.removal_count(&asset.path), 1);
    }

    #[tokio::test]
    async fn test_tokio_fs_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = AssetLedger::new(JobId::new(), dir.path().join("job"), Arc::new(TokioFs));
        ledger.prepare().await.unwrap();

        let asset = ledger.allocate(ContentKind::Video, "mp4");
        ledger.fs().write(&asset.path, b"abc").await.unwrap();
        assert_eq!(ledger.fs().len(&asset.path).await.unwrap(), 3);

        let report = ledger.release_all().await;
        assert_eq!(report.removed, vec![asset.path.clone()]);
        assert!(!asset.path.exists());
    }
}
