//! Transactional write target: directory and zip/CBZ backends behind one
//! contract.
//!
//! A gallery's files are written inside a scoped session opened with
//! [`OutputDescriptor::create`]. Registration is synchronous and
//! fire-and-forget: [`Session::write_text`] and [`Session::write_stream`]
//! spawn tracked tasks and return immediately. The first failure cancels
//! the session's shared token so writes not yet started can bail, the
//! session always finalizes its backend (archives are sealed even on the
//! error path), and every collected failure surfaces as one aggregate.
//! The session either fully commits or reports everything that went
//! wrong; partial silent success is not an outcome.

mod dir;
mod zip;

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fetch::FetchError;

pub(crate) use self::dir::DirBackend;
pub(crate) use self::zip::ZipBackend;

/// Errors from output sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Filesystem error.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Archive-level error.
    #[error("archive error at {path}: {source}")]
    Zip {
        /// The archive path.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: ::zip::result::ZipError,
    },

    /// An asset download failed inside a write session.
    #[error("download failed for {name}: {source}")]
    Asset {
        /// Destination filename of the asset.
        name: String,
        /// The pipeline error.
        #[source]
        source: FetchError,
    },

    /// Reading an asset's body stream failed mid-transfer.
    #[error("stream interrupted for {name}: {source}")]
    Body {
        /// Destination filename of the asset.
        name: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// One or more tracked writes failed; carries every underlying cause.
    #[error("{} write(s) failed in session", errors.len())]
    Aggregate {
        /// Every collected failure, in completion order.
        errors: Vec<SinkError>,
    },
}

impl SinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(path: impl Into<PathBuf>, source: ::zip::result::ZipError) -> Self {
        Self::Zip {
            path: path.into(),
            source,
        }
    }

    /// Wraps an asset download failure for collection in a session.
    pub fn asset(name: impl Into<String>, source: FetchError) -> Self {
        Self::Asset {
            name: name.into(),
            source,
        }
    }
}

/// Backend discriminator, derived from the destination path's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain directory of files.
    Directory,
    /// Zip/CBZ archive.
    Archive,
}

/// True when the path names a zip or CBZ archive (case-insensitive).
#[must_use]
pub fn is_archive_path(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".zip") || lower.ends_with(".cbz")
}

/// Write-side of a session: each backend persists text and byte-stream
/// entries and seals itself in `finalize`.
#[async_trait]
pub(crate) trait SinkBackend: Debug + Send + Sync {
    /// Ensures the destination exists (directory tree, archive writer).
    async fn prepare(&self) -> Result<(), SinkError>;
    /// Writes a text entry.
    async fn write_text(&self, name: &str, contents: &str) -> Result<(), SinkError>;
    /// Streams a response body into an entry.
    async fn write_stream(&self, name: &str, response: reqwest::Response)
    -> Result<(), SinkError>;
    /// Flushes and seals the backend. Called exactly once, on every path.
    async fn finalize(&self) -> Result<(), SinkError>;
}

/// Handle to a write destination, owned by the orchestrator for the
/// duration of one gallery.
///
/// `exists` is computed once at open time so conflict policy is applied
/// against a stable snapshot.
#[derive(Debug)]
pub struct OutputDescriptor {
    path: PathBuf,
    kind: OutputKind,
    exists: bool,
}

impl OutputDescriptor {
    /// Opens a descriptor for the given destination, picking the backend
    /// from the path's extension.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = if is_archive_path(&path.to_string_lossy()) {
            OutputKind::Archive
        } else {
            OutputKind::Directory
        };
        let exists = path.exists();
        Self { path, kind, exists }
    }

    /// The destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The selected backend kind.
    #[must_use]
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Whether the destination existed when the descriptor was opened.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Removes the destination (recursively for directories).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] on filesystem failure.
    pub async fn remove(&self) -> Result<(), SinkError> {
        let result = match self.kind {
            OutputKind::Directory => tokio::fs::remove_dir_all(&self.path).await,
            OutputKind::Archive => tokio::fs::remove_file(&self.path).await,
        };
        result.map_err(|e| SinkError::io(&self.path, e))
    }

    /// Opens a write session: prepares the backend, runs the session
    /// callback once, awaits every tracked write, finalizes, and surfaces
    /// collected failures as a single aggregate.
    ///
    /// # Errors
    ///
    /// Preparation and finalization errors surface directly; tracked write
    /// failures surface together as [`SinkError::Aggregate`]. Finalization
    /// runs even when writes failed so resources never leak.
    pub async fn create<F, Fut>(&self, session: F) -> Result<(), SinkError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = ()>,
    {
        let backend: Arc<dyn SinkBackend> = match self.kind {
            OutputKind::Directory => Arc::new(DirBackend::new(self.path.clone())),
            OutputKind::Archive => Arc::new(ZipBackend::new(self.path.clone())),
        };
        backend.prepare().await?;

        let handle = Session {
            inner: Arc::new(SessionInner {
                backend: Arc::clone(&backend),
                tasks: Mutex::new(Vec::new()),
                errors: Mutex::new(Vec::new()),
                cancel: CancellationToken::new(),
            }),
        };

        session(handle.clone()).await;

        // Settle every tracked write; a pass can register nothing new, but
        // draining in rounds keeps the invariant obvious.
        loop {
            let pending: Vec<JoinHandle<()>> = {
                let mut tasks = lock(&handle.inner.tasks);
                std::mem::take(&mut *tasks)
            };
            if pending.is_empty() {
                break;
            }
            for task in pending {
                if let Err(e) = task.await {
                    warn!(error = %e, "tracked write task panicked");
                }
            }
        }

        let finalize_result = backend.finalize().await;

        let errors: Vec<SinkError> = {
            let mut errors = lock(&handle.inner.errors);
            std::mem::take(&mut *errors)
        };
        if !errors.is_empty() {
            debug!(failed = errors.len(), path = %self.path.display(), "write session failed");
            return Err(SinkError::Aggregate { errors });
        }
        finalize_result
    }
}

/// Session handle passed to the `create` callback.
///
/// Cloneable; writes registered from any clone are tracked by the same
/// session. Failure is observable through [`cancellation`](Session::cancellation):
/// the token fires on the first failed write, and writes registered after
/// that are skipped (already-running ones may still complete).
#[derive(Debug, Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    backend: Arc<dyn SinkBackend>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    errors: Mutex<Vec<SinkError>>,
    cancel: CancellationToken,
}

impl SessionInner {
    fn record(&self, error: SinkError) {
        lock(&self.errors).push(error);
        self.cancel.cancel();
    }
}

impl Session {
    /// Token fired on the first write failure in this session.
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Registers a tracked text write. Never fails at the call site;
    /// failures are collected and surfaced by `create`.
    pub fn write_text(&self, name: &str, contents: String) {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let task = tokio::spawn(async move {
            if inner.cancel.is_cancelled() {
                return;
            }
            if let Err(error) = inner.backend.write_text(&name, &contents).await {
                inner.record(error);
            }
        });
        lock(&self.inner.tasks).push(task);
    }

    /// Registers a tracked streaming write of a response body. Never fails
    /// at the call site; failures are collected and surfaced by `create`.
    pub fn write_stream(&self, name: &str, response: reqwest::Response) {
        let inner = Arc::clone(&self.inner);
        let name = name.to_string();
        let task = tokio::spawn(async move {
            if inner.cancel.is_cancelled() {
                return;
            }
            if let Err(error) = inner.backend.write_stream(&name, response).await {
                inner.record(error);
            }
        });
        lock(&self.inner.tasks).push(task);
    }

    /// Records a failure that occurred while producing a write's input
    /// (e.g. the asset download itself), poisoning the session the same
    /// way a failed write does.
    pub fn record_failure(&self, error: SinkError) {
        self.inner.record(error);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_is_archive_path() {
        assert!(is_archive_path("out/123.zip"));
        assert!(is_archive_path("out/123.CBZ"));
        assert!(!is_archive_path("out/123"));
        assert!(!is_archive_path("out/123.zip.d"));
    }

    #[test]
    fn test_open_selects_backend_by_extension() {
        assert_eq!(OutputDescriptor::open("x/y.cbz").kind(), OutputKind::Archive);
        assert_eq!(OutputDescriptor::open("x/y").kind(), OutputKind::Directory);
    }

    #[tokio::test]
    async fn test_exists_snapshot_taken_at_open() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gallery");
        let descriptor = OutputDescriptor::open(&target);
        assert!(!descriptor.exists());

        std::fs::create_dir(&target).unwrap();
        let reopened = OutputDescriptor::open(&target);
        assert!(reopened.exists());
        // The first snapshot is unchanged.
        assert!(!descriptor.exists());
    }

    #[tokio::test]
    async fn test_directory_session_commits_files() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gallery");
        let descriptor = OutputDescriptor::open(&target);

        descriptor
            .create(|session| async move {
                session.write_text("a.txt", "alpha".to_string());
                session.write_text("b.txt", "beta".to_string());
            })
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(target.join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(target.join("b.txt")).unwrap(), "beta");
    }

    #[tokio::test]
    async fn test_zip_session_commits_entries() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gallery.cbz");
        let descriptor = OutputDescriptor::open(&target);

        descriptor
            .create(|session| async move {
                session.write_text("ComicInfo.xml", "<ComicInfo/>".to_string());
            })
            .await
            .unwrap();

        let file = std::fs::File::open(&target).unwrap();
        let mut archive = ::zip::ZipArchive::new(file).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name("ComicInfo.xml").unwrap();
        let mut contents = String::new();
        std::io::Read::read_to_string(&mut entry, &mut contents).unwrap();
        assert_eq!(contents, "<ComicInfo/>");
    }

    #[tokio::test]
    async fn test_recorded_failure_surfaces_as_aggregate() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gallery");
        let descriptor = OutputDescriptor::open(&target);

        let result = descriptor
            .create(|session| async move {
                session.write_text("ok.txt", "fine".to_string());
                session.record_failure(SinkError::asset(
                    "003.webp",
                    FetchError::http_status("https://example.com/x.webp", 404),
                ));
            })
            .await;

        match result {
            Err(SinkError::Aggregate { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(errors[0], SinkError::Asset { .. }));
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
        // The successful write still settled before the session failed.
        assert!(target.join("ok.txt").exists());
    }

    #[tokio::test]
    async fn test_failure_cancels_session_token() {
        let temp = tempfile::tempdir().unwrap();
        let descriptor = OutputDescriptor::open(temp.path().join("g"));

        let observed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed_in_session = Arc::clone(&observed);
        let _ = descriptor
            .create(|session| {
                let observed = observed_in_session;
                async move {
                    session.record_failure(SinkError::asset(
                        "a",
                        FetchError::Cancelled,
                    ));
                    observed.store(
                        session.cancellation().is_cancelled(),
                        std::sync::atomic::Ordering::SeqCst,
                    );
                }
            })
            .await;

        assert!(observed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_writes_after_cancellation_are_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gallery");
        let descriptor = OutputDescriptor::open(&target);

        let _ = descriptor
            .create(|session| async move {
                session.record_failure(SinkError::asset("a", FetchError::Cancelled));
                // Give the cancellation a chance to be observed.
                tokio::task::yield_now().await;
                session.write_text("late.txt", "too late".to_string());
            })
            .await;

        assert!(!target.join("late.txt").exists());
    }

    #[tokio::test]
    async fn test_remove_directory() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gone");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("f"), "x").unwrap();

        let descriptor = OutputDescriptor::open(&target);
        assert!(descriptor.exists());
        descriptor.remove().await.unwrap();
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_remove_archive() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("gone.zip");
        std::fs::write(&target, "zzz").unwrap();

        let descriptor = OutputDescriptor::open(&target);
        descriptor.remove().await.unwrap();
        assert!(!target.exists());
    }
}
