//! Persistence of the set of blocks confirmed uploaded
//!
//! The shipper records which block IDs it has already shipped in a single
//! JSON file at the root of the block directory. The file is an
//! *optimization*, not a correctness boundary: before any upload the remote
//! store is independently checked for the block's manifest, so a missing,
//! corrupt or stale bookkeeping file only costs redundant existence checks —
//! never duplicate data.
//!
//! The file is rewritten from scratch on every sync pass and is owned by
//! exactly one shipper instance at a time; there is no multi-writer story.

use crate::block::BlockId;
use crate::error::{Result, ShipperError};
use crate::fsutil;
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::fs;
use std::path::Path;

/// File name of the bookkeeping record, fixed at the block root
pub const META_FILENAME: &str = "blockship.json";

/// Bookkeeping format version this crate reads and writes
pub const META_VERSION: u32 = 1;

/// Versioned record of block IDs confirmed uploaded
///
/// Rebuilt in full on every sync pass: it contains exactly the IDs of blocks
/// that still exist locally and are known shipped (or knowingly skipped, for
/// compacted blocks). IDs of blocks deleted locally simply drop out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipperMeta {
    /// Record format version; must equal [`META_VERSION`]
    pub version: u32,
    /// Block IDs confirmed uploaded, in scan order
    pub uploaded: Vec<BlockId>,
}

impl Default for ShipperMeta {
    fn default() -> Self {
        ShipperMeta {
            version: META_VERSION,
            uploaded: Vec::new(),
        }
    }
}

impl ShipperMeta {
    /// Load the bookkeeping record from `<root>/blockship.json`
    ///
    /// # Errors
    ///
    /// - [`ShipperError::MetaNotFound`] if the file does not exist (expected
    ///   on first run)
    /// - [`ShipperError::MetaVersion`] for unknown version numbers; no
    ///   forward or backward compatibility is attempted
    /// - [`ShipperError::Json`] if the file does not parse
    pub fn read_from(root: &Path) -> Result<Self> {
        let path = root.join(META_FILENAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ShipperError::MetaNotFound(path));
            }
            Err(err) => return Err(err.into()),
        };
        let meta: ShipperMeta = serde_json::from_slice(&bytes)?;
        if meta.version != META_VERSION {
            return Err(ShipperError::MetaVersion {
                found: meta.version,
            });
        }
        Ok(meta)
    }

    /// Persist the record to `<root>/blockship.json` via the atomic writer
    ///
    /// Serialized with one-tab indentation and stable field order so that
    /// successive records diff cleanly.
    pub fn write_to(&self, root: &Path) -> Result<()> {
        let mut buf = Vec::with_capacity(256);
        let formatter = PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(self, &mut ser)?;
        buf.push(b'\n');
        fsutil::atomic_write(&root.join(META_FILENAME), &buf)
    }
}
