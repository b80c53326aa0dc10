//! Main shipper implementation
//!
//! This module provides the core [`Shipper`] struct, which detects new blocks
//! under a local root directory and uploads them to a remote object store
//! exactly once. It coordinates between several subsystems:
//!
//! - **Scanner**: enumerates candidate block directories and their manifests
//! - **Bookkeeping**: remembers which blocks were already confirmed uploaded
//! - **Staging**: hard-links a block into a private directory so the upload
//!   reads a stable snapshot even if the compactor deletes the source
//! - **Remote Store**: the object store boundary (existence check + upload)
//!
//! ## One sync pass
//!
//! [`Shipper::sync_once`] loads the bookkeeping record (falling back to empty
//! on any read failure — the record is advisory, the remote existence check
//! is the correctness backstop), scans local blocks, uploads every block not
//! yet recorded, and rewrites the record from scratch with the IDs of blocks
//! that are both present locally and confirmed shipped or knowingly skipped.
//! A failure on one block never aborts the pass; the block is simply left
//! unrecorded and retried next pass.
//!
//! ## Ordering invariant
//!
//! Within one block the manifest is uploaded strictly after all data files,
//! so no reader of the remote store ever observes a manifest for a block
//! whose data is incomplete.
//!
//! ## Concurrency
//!
//! A `Shipper` owns its root's bookkeeping file and staging namespace
//! exclusively. `sync_once` takes `&mut self` and must not be invoked
//! concurrently for the same root from separate instances or processes;
//! callers driving it from a timer must not overlap ticks.
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockship::{CancelToken, MemoryStore, ShipperBuilder, BlockSource};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(MemoryStore::new());
//! let mut shipper = ShipperBuilder::new()
//!     .source(BlockSource::Ingester)
//!     .labels(|| None)
//!     .build(PathBuf::from("./data"), remote);
//!
//! let cancel = CancelToken::new();
//! let report = shipper.sync_once(&cancel)?;
//! println!("uploaded {} blocks", report.uploaded);
//! # Ok(())
//! # }
//! ```

use crate::block::{
    Block, BlockId, BlockManifest, BlockSource, LabelSet, ShippingInfo, INDEX_FILENAME,
    MANIFEST_FILENAME, SEGMENTS_DIRNAME,
};
use crate::bookkeeping::ShipperMeta;
use crate::error::{Result, ShipperError};
use crate::fsutil;
use crate::metrics::{self, MetricsSink, NullMetrics};
use crate::remote::RemoteStore;
use crate::scanner::scan_blocks;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// Reserved directory name under the block root used for staging uploads
///
/// Dot-prefixed, so it can never collide with a block directory: block
/// directory names are ULIDs.
pub const STAGING_DIRNAME: &str = ".blockship";

type LabelsFn = Arc<dyn Fn() -> Option<LabelSet> + Send + Sync>;

/// Cooperative cancellation flag for a running sync pass
///
/// Cloneable and cheap to share across threads. Cancellation aborts the
/// current block's upload (leaving it unconfirmed and retried next pass); it
/// never corrupts bookkeeping, which is only written once every block's
/// outcome is known.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; all clones observe it
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(ShipperError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Outcome summary of one sync pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Blocks actually uploaded during this pass
    pub uploaded: usize,
    /// Blocks whose upload failed; retried next pass
    pub failed: usize,
}

/// Per-block result of the upload procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadOutcome {
    /// All files transferred, manifest last
    Uploaded,
    /// Manifest already present remotely; nothing to do
    AlreadyPresent,
    /// Compaction level above the shipping threshold; recorded, not uploaded
    Compacted,
}

/// Builder for configuring a [`Shipper`]
///
/// ```rust
/// use blockship::{BlockSource, CounterMetrics, MemoryStore, ShipperBuilder};
/// use std::sync::Arc;
///
/// let shipper = ShipperBuilder::new()
///     .source(BlockSource::Ingester)
///     .metrics(Arc::new(CounterMetrics::new()))
///     .build("./data", Arc::new(MemoryStore::new()));
/// ```
pub struct ShipperBuilder {
    labels: LabelsFn,
    source: BlockSource,
    metrics: Arc<dyn MetricsSink>,
}

impl Default for ShipperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShipperBuilder {
    /// Create a builder with default settings: no labels, unknown source,
    /// metrics discarded
    pub fn new() -> Self {
        ShipperBuilder {
            labels: Arc::new(|| None),
            source: BlockSource::default(),
            metrics: Arc::new(NullMetrics),
        }
    }

    /// Set the external label supplier
    ///
    /// Invoked once per block upload, so the label set may change between
    /// blocks and passes. Returning `None` (or an empty set) attaches no
    /// labels.
    pub fn labels(mut self, f: impl Fn() -> Option<LabelSet> + Send + Sync + 'static) -> Self {
        self.labels = Arc::new(f);
        self
    }

    /// Set the source classification written into uploaded manifests
    pub fn source(mut self, source: BlockSource) -> Self {
        self.source = source;
        self
    }

    /// Set the metrics sink
    pub fn metrics(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics = sink;
        self
    }

    /// Build a shipper for the given block root and remote store
    pub fn build(self, root: impl Into<PathBuf>, remote: Arc<dyn RemoteStore>) -> Shipper {
        Shipper {
            root: root.into(),
            remote,
            labels: self.labels,
            source: self.source,
            metrics: self.metrics,
        }
    }
}

/// Detects new blocks under a root directory and uploads them to a remote
/// object store exactly once
///
/// See the [module documentation](self) for the overall model. Construct via
/// [`ShipperBuilder`] or [`Shipper::new`] for defaults.
pub struct Shipper {
    root: PathBuf,
    remote: Arc<dyn RemoteStore>,
    labels: LabelsFn,
    source: BlockSource,
    metrics: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Shipper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shipper")
            .field("root", &self.root)
            .field("source", &self.source)
            .finish()
    }
}

impl Shipper {
    /// Create a shipper with default configuration
    pub fn new(root: impl Into<PathBuf>, remote: Arc<dyn RemoteStore>) -> Self {
        ShipperBuilder::new().build(root, remote)
    }

    /// Root directory this shipper watches
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Perform exactly one synchronization pass
    ///
    /// Ensures every local first-generation block has been uploaded to the
    /// remote store once, then rewrites the bookkeeping record. Safe to call
    /// repeatedly (e.g. on a timer) but not concurrently with itself.
    ///
    /// Per-block failures are contained: they are logged, counted in
    /// [`SyncReport::failed`] and retried on the next pass.
    ///
    /// # Errors
    ///
    /// [`ShipperError::Io`] only when the root directory itself cannot be
    /// read; callers should log it and retry on the next scheduled pass.
    pub fn sync_once(&mut self, cancel: &CancelToken) -> Result<SyncReport> {
        self.metrics.increment_counter(metrics::SYNCS_TOTAL);

        // The bookkeeping record is advisory: any read failure means we
        // start from empty and rely on remote existence checks instead.
        let meta = match ShipperMeta::read_from(&self.root) {
            Ok(meta) => meta,
            Err(err) => {
                if !err.is_not_found() {
                    warn!(error = %err, "reading bookkeeping failed, starting from empty");
                }
                ShipperMeta::default()
            }
        };
        let recorded: HashSet<BlockId> = meta.uploaded.iter().copied().collect();

        // Rebuilt from scratch: only blocks that still exist locally make it
        // into the new record, so locally deleted blocks drop out.
        let mut uploaded: Vec<BlockId> = Vec::with_capacity(recorded.len());
        let mut report = SyncReport::default();

        let scan = match scan_blocks(&self.root) {
            Ok(scan) => scan,
            Err(err) => {
                self.metrics.increment_counter(metrics::SYNC_FAILURES_TOTAL);
                error!(root = %self.root.display(), error = %err, "scanning block root failed");
                return Err(err);
            }
        };
        for block in scan {
            let id = block.id();
            // Already-recorded blocks are trusted without re-checking the
            // remote store; only unrecorded ones get an existence check.
            if recorded.contains(&id) {
                uploaded.push(id);
                continue;
            }
            match self.upload_block(cancel, &block) {
                Ok(outcome) => {
                    if outcome == UploadOutcome::Uploaded {
                        report.uploaded += 1;
                    }
                    uploaded.push(id);
                }
                Err(err) => {
                    // Log only; other blocks must still be shipped. This one
                    // stays unrecorded and is retried on the next pass.
                    self.metrics
                        .increment_counter(metrics::UPLOAD_FAILURES_TOTAL);
                    error!(block = %id, error = %err, "shipping block failed");
                    report.failed += 1;
                }
            }
        }

        let meta = ShipperMeta {
            uploaded,
            ..ShipperMeta::default()
        };
        if let Err(err) = meta.write_to(&self.root) {
            warn!(error = %err, "updating bookkeeping failed");
        }
        Ok(report)
    }

    /// Derive the data availability watermarks
    ///
    /// Returns `(min_time, max_synced_time)`:
    ///
    /// - `min_time` is the minimum start timestamp across all current local
    ///   blocks, or `0` when no block exists yet
    /// - `max_synced_time` is the maximum end timestamp among blocks recorded
    ///   as uploaded in bookkeeping, or `None` when nothing is confirmed
    ///
    /// Recorded IDs are trusted as-is; an out-of-band remote deletion is not
    /// detected here.
    ///
    /// # Errors
    ///
    /// Propagates bookkeeping read failures and an unreadable root directory.
    pub fn timestamps(&self) -> Result<(i64, Option<i64>)> {
        let meta = ShipperMeta::read_from(&self.root)?;
        let recorded: HashSet<BlockId> = meta.uploaded.iter().copied().collect();

        let mut min_time: Option<i64> = None;
        let mut max_synced: Option<i64> = None;
        for block in scan_blocks(&self.root)? {
            let manifest = &block.manifest;
            min_time = Some(match min_time {
                Some(v) => v.min(manifest.min_time),
                None => manifest.min_time,
            });
            if recorded.contains(&block.id()) {
                max_synced = Some(match max_synced {
                    Some(v) => v.max(manifest.max_time),
                    None => manifest.max_time,
                });
            }
        }

        Ok((min_time.unwrap_or(0), max_synced))
    }

    /// Upload one block: filter, existence check, stage, augment, transfer
    fn upload_block(&self, cancel: &CancelToken, block: &Block) -> Result<UploadOutcome> {
        let id = block.id();

        // Only first-generation blocks are shipped; merged blocks are
        // covered by their sources' uploads or rebuilt remotely.
        if block.manifest.compaction.level > 1 {
            debug!(block = %id, level = block.manifest.compaction.level, "skipping compacted block");
            return Ok(UploadOutcome::Compacted);
        }

        cancel.check()?;
        let remote_manifest = format!("{}/{}", id, MANIFEST_FILENAME);
        if self.remote.exists(&remote_manifest)? {
            debug!(block = %id, "block already present remotely");
            return Ok(UploadOutcome::AlreadyPresent);
        }

        info!(block = %id, "uploading new block");
        self.metrics.increment_counter(metrics::UPLOADS_TOTAL);

        // A crashed prior attempt may have left a stale staging directory;
        // purge it before use.
        let staged = self.staging_dir(id);
        fsutil::remove_dir_all_if_exists(&staged)?;
        fs::create_dir_all(&staged)?;

        let result = self.stage_and_upload(cancel, block, &staged);
        if let Err(err) = fs::remove_dir_all(&staged) {
            error!(block = %id, error = %err, "cleaning staging directory failed");
        }
        result.map(|()| UploadOutcome::Uploaded)
    }

    /// Populate the staging directory, augment its manifest and transfer it
    fn stage_and_upload(&self, cancel: &CancelToken, block: &Block, staged: &Path) -> Result<()> {
        hard_link_block(&block.dir, staged)?;

        // Attach labels and the source classification to the staged copy
        // only; the source block stays untouched.
        let mut manifest = BlockManifest::read_from(staged)?;
        let mut shipping = ShippingInfo {
            labels: LabelSet::new(),
            source: self.source,
        };
        if let Some(labels) = (self.labels)() {
            shipping.labels = labels;
        }
        manifest.shipping = Some(shipping);
        manifest.write_to(staged)?;

        self.upload_staged(cancel, block.id(), staged)
    }

    /// Transfer every staged file to the remote store, manifest last
    ///
    /// The manifest doubles as the block's remote presence marker, so a
    /// reader polling for it never observes a partially uploaded block.
    fn upload_staged(&self, cancel: &CancelToken, id: BlockId, staged: &Path) -> Result<()> {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(staged).min_depth(1) {
            let entry = entry.map_err(|err| {
                ShipperError::internal(format!("walk staging directory: {err}"))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(staged)
                .map_err(|_| ShipperError::internal("staged file outside staging directory"))?
                .to_path_buf();
            if rel != Path::new(MANIFEST_FILENAME) {
                files.push(rel);
            }
        }
        files.sort();
        files.push(PathBuf::from(MANIFEST_FILENAME));

        for rel in &files {
            cancel.check()?;
            let content = fs::read(staged.join(rel))?;
            self.remote.upload(&remote_path(id, rel), &content)?;
        }
        Ok(())
    }

    fn staging_dir(&self, id: BlockId) -> PathBuf {
        self.root
            .join(STAGING_DIRNAME)
            .join("upload")
            .join(id.to_string())
    }
}

/// Hard-link a block's files into the staging directory
///
/// Links every file in the segments subdirectory plus the index and manifest.
/// No data is copied, and the links pin the inodes, so the upload reads a
/// stable snapshot even if the source block is compacted away mid-transfer.
/// Fails if the staging directory is on a different filesystem than the
/// block; same-filesystem co-location is an operational precondition.
fn hard_link_block(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst.join(SEGMENTS_DIRNAME))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(src.join(SEGMENTS_DIRNAME))? {
        let entry = entry?;
        files.push(Path::new(SEGMENTS_DIRNAME).join(entry.file_name()));
    }
    files.sort();
    files.push(PathBuf::from(INDEX_FILENAME));
    files.push(PathBuf::from(MANIFEST_FILENAME));

    for rel in files {
        fs::hard_link(src.join(&rel), dst.join(&rel))
            .map_err(|source| ShipperError::HardLink { file: rel, source })?;
    }
    Ok(())
}

/// Remote object path for a staged file: `<blockID>/<relative path>` with
/// forward slashes on every platform
fn remote_path(id: BlockId, rel: &Path) -> String {
    let mut path = id.to_string();
    for component in rel.components() {
        path.push('/');
        path.push_str(&component.as_os_str().to_string_lossy());
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(ShipperError::Cancelled)));
    }

    #[test]
    fn test_remote_path_uses_forward_slashes() {
        let id = BlockId::new();
        let rel = Path::new(SEGMENTS_DIRNAME).join("000001");
        assert_eq!(remote_path(id, &rel), format!("{}/segments/000001", id));
        assert_eq!(
            remote_path(id, Path::new(MANIFEST_FILENAME)),
            format!("{}/manifest.json", id)
        );
    }

    #[test]
    fn test_staging_dir_is_reserved_namespace() {
        let shipper = Shipper::new("/data", Arc::new(MemoryStore::new()));
        let id = BlockId::new();
        let staged = shipper.staging_dir(id);
        assert!(staged.starts_with("/data/.blockship/upload"));
        assert!(staged.ends_with(id.to_string()));
    }

    #[test]
    fn test_builder_defaults() {
        let shipper = ShipperBuilder::new().build("/data", Arc::new(MemoryStore::new()));
        assert_eq!(shipper.source, BlockSource::Unknown);
        assert_eq!((shipper.labels)(), None);
        assert_eq!(shipper.root(), Path::new("/data"));
    }
}
