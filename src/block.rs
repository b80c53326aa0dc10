//! Block model, identifiers and manifest I/O
//!
//! A *block* is an immutable directory on local storage produced by an
//! external ingestion or compaction process. Its layout is fixed:
//!
//! ```text
//! <root>/<block_id>/
//! ├── manifest.json      # authoritative block metadata
//! ├── index              # lookup index over the segment data
//! └── segments/          # raw data segment files
//!     ├── 000001
//!     └── ...
//! ```
//!
//! Blocks are read-only to this crate. The only manifest this crate ever
//! rewrites is the staged *copy* prepared for upload, to which it appends a
//! [`ShippingInfo`] section (attached labels and a source classification).
//!
//! Block identifiers are ULIDs: lexicographically time-sortable and globally
//! unique, so a directory listing sorted by name is also sorted by creation
//! time.

use crate::error::{Result, ShipperError};
use crate::fsutil;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use ulid::Ulid;

/// File name of the block manifest inside a block directory
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// File name of the block index inside a block directory
pub const INDEX_FILENAME: &str = "index";

/// Name of the subdirectory holding segment data files
pub const SEGMENTS_DIRNAME: &str = "segments";

/// Manifest version this crate reads and writes
pub const MANIFEST_VERSION: u32 = 1;

/// Set of labels attached to an uploaded block
///
/// Ordered map so that serialized manifests are byte-stable and diffable.
pub type LabelSet = BTreeMap<String, String>;

/// Unique, time-sortable identifier of a block
///
/// Wraps a ULID; the canonical form is the 26-character Crockford base32
/// string, which is also the block's directory name and its remote path
/// prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Ulid);

impl BlockId {
    /// Generate a fresh identifier for the current time
    pub fn new() -> Self {
        BlockId(Ulid::new())
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for BlockId {
    type Err = ShipperError;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(BlockId)
            .map_err(|_| ShipperError::InvalidBlockId(s.to_string()))
    }
}

/// Check whether a directory name looks like a block identifier
///
/// Used by the scanner to skip unrelated entries (including the reserved
/// staging namespace, which is dot-prefixed and can never parse as a ULID).
pub fn is_block_dir(name: &str) -> Option<BlockId> {
    name.parse().ok()
}

/// Classification of how a block was produced
///
/// Recorded in the staged manifest so remote consumers can distinguish blocks
/// shipped from a live ingester from those rebuilt by a compactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSource {
    /// Origin unknown or unspecified
    #[default]
    Unknown,
    /// Produced by a live ingestion process
    Ingester,
    /// Produced by merging other blocks
    Compactor,
}

/// Compaction history of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionInfo {
    /// Compaction generation: 0 or 1 means a raw ingestion block, anything
    /// higher is the result of merging other blocks
    pub level: u32,
    /// Identifiers of the blocks merged to produce this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<BlockId>,
}

/// Shipping metadata appended to a staged manifest before upload
///
/// Never written into the source block's manifest, only into the hard-linked
/// staging copy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShippingInfo {
    /// External label set attached at upload time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: LabelSet,
    /// How the block was produced
    pub source: BlockSource,
}

/// Authoritative metadata of a single block
///
/// Loaded from the block directory's `manifest.json`. The `shipping` section
/// is absent on locally produced blocks and filled in by the shipper on the
/// staged copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockManifest {
    /// Manifest format version; must equal [`MANIFEST_VERSION`]
    pub version: u32,
    /// Block identifier; matches the directory name
    pub id: BlockId,
    /// Minimum timestamp of contained data, in milliseconds
    #[serde(rename = "minTime")]
    pub min_time: i64,
    /// Maximum timestamp of contained data, in milliseconds
    #[serde(rename = "maxTime")]
    pub max_time: i64,
    /// Compaction history
    pub compaction: CompactionInfo,
    /// Shipping metadata, present only on uploaded copies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<ShippingInfo>,
}

impl BlockManifest {
    /// Read and validate the manifest inside a block directory
    ///
    /// # Errors
    ///
    /// - [`ShipperError::Io`] if `manifest.json` is missing or unreadable
    /// - [`ShipperError::Json`] if it does not parse
    /// - [`ShipperError::ManifestVersion`] for unknown version numbers
    pub fn read_from(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILENAME);
        let bytes = fs::read(&path)?;
        let manifest: BlockManifest = serde_json::from_slice(&bytes)?;
        if manifest.version != MANIFEST_VERSION {
            return Err(ShipperError::ManifestVersion {
                found: manifest.version,
                path,
            });
        }
        Ok(manifest)
    }

    /// Atomically write the manifest into a block directory
    ///
    /// Only ever called on staged upload directories; source blocks are
    /// immutable.
    pub fn write_to(&self, dir: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        fsutil::atomic_write(&dir.join(MANIFEST_FILENAME), &bytes)
    }
}

/// A locally discovered block: its directory plus parsed manifest
#[derive(Debug, Clone)]
pub struct Block {
    /// Absolute path of the block directory
    pub dir: PathBuf,
    /// Parsed manifest
    pub manifest: BlockManifest,
}

impl Block {
    /// Block identifier, read from the manifest
    pub fn id(&self) -> BlockId {
        self.manifest.id
    }
}
