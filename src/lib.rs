//! # Blockship - crash-safe block shipping to remote object storage
//!
//! Blockship detects immutable data blocks under a local root directory and
//! uploads them exactly once to a remote object store, tolerating process
//! crashes mid-upload, partial uploads, and concurrent external processes
//! that may delete or compact local blocks at any time.
//!
//! ## Overview
//!
//! A *block* is a self-contained, immutable directory produced by an external
//! ingestion or compaction process: a manifest, an index file, and a
//! `segments/` subdirectory of data files, all under a directory named by a
//! time-sortable unique ID. Blockship reconciles three untrusted sources of
//! truth — the local filesystem, a local bookkeeping file, and the remote
//! store itself — and guarantees:
//!
//! - **At-most-one upload** per block, deduplicated by a remote existence
//!   check before every upload, regardless of bookkeeping state
//! - **No partial visibility**: within one block the manifest is uploaded
//!   strictly after all data files, so a remote manifest implies a complete
//!   block
//! - **Crash safety**: staging directories left by a killed process are
//!   purged and rebuilt; the bookkeeping file is replaced atomically and
//!   durably
//! - **Failure isolation**: one failing block never aborts a sync pass; it
//!   is retried on the next one
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blockship::{BlockSource, CancelToken, MemoryStore, ShipperBuilder};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(MemoryStore::new());
//! let mut shipper = ShipperBuilder::new()
//!     .source(BlockSource::Ingester)
//!     .build(PathBuf::from("./data"), remote);
//!
//! // One pass; typically driven by a timer, never concurrently.
//! let cancel = CancelToken::new();
//! let report = shipper.sync_once(&cancel)?;
//! println!("uploaded {} blocks, {} failed", report.uploaded, report.failed);
//!
//! // Watermarks for retention / federation logic.
//! let (min_time, max_synced) = shipper.timestamps()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Bookkeeping is advisory
//!
//! The set of confirmed-uploaded block IDs is persisted in a single JSON file
//! at the root. Losing or corrupting it only costs redundant existence
//! checks on the next pass — the remote check is the correctness boundary.
//! Already-recorded IDs, however, are trusted without re-verification each
//! pass; a block deleted remotely out of band stays marked as shipped.
//!
//! ### Hard-link staging
//!
//! Uploads never read the source block directly. Files are hard-linked into
//! a reserved staging namespace (`.blockship/upload/<id>`) first, pinning
//! their inodes against concurrent compaction. This requires the root and
//! staging namespace to live on one filesystem.
//!
//! ### Compaction filter
//!
//! Only first-generation blocks (compaction level 0 or 1) are shipped.
//! Higher-level blocks are recorded as handled without uploading.
//!
//! ## Module Organization
//!
//! - [`shipper`]: the [`Shipper`] coordinator, staging and upload procedure
//! - [`block`]: block identifiers, manifests and on-disk layout
//! - [`scanner`]: tolerant enumeration of local blocks
//! - [`bookkeeping`]: the persisted uploaded-set record
//! - [`remote`]: the [`RemoteStore`] boundary and an in-memory implementation
//! - [`metrics`]: injectable counter sink
//! - [`error`]: error types and handling
//! - `fsutil`: atomic durable file writes (internal)

// Public API modules
pub mod block;
pub mod bookkeeping;
pub mod error;
pub mod metrics;
pub mod remote;
pub mod scanner;
pub mod shipper;

// Internal modules (not part of public API)
mod fsutil;

// Re-export main types for convenience
pub use block::{
    Block, BlockId, BlockManifest, BlockSource, CompactionInfo, LabelSet, ShippingInfo,
    INDEX_FILENAME, MANIFEST_FILENAME, SEGMENTS_DIRNAME,
};
pub use bookkeeping::{ShipperMeta, META_FILENAME};
pub use error::{Result, ShipperError};
pub use metrics::{CounterMetrics, MetricsSink, NullMetrics};
pub use remote::{MemoryStore, RemoteStore};
pub use scanner::{scan_blocks, BlockScan};
pub use shipper::{CancelToken, Shipper, ShipperBuilder, SyncReport, STAGING_DIRNAME};
