//! Enumeration of candidate blocks under a root directory
//!
//! [`scan_blocks`] lists the immediate children of the root and lazily yields
//! one [`Block`] per directory whose name parses as a block ID and whose
//! manifest loads. Everything else is tolerated and skipped:
//!
//! - names that are not block IDs (the bookkeeping file, the reserved
//!   `.blockship` staging namespace, stray editor droppings)
//! - entries that are not directories
//! - directories whose manifest is missing or corrupt — typically a block
//!   deleted by the compactor mid-scan, or one a producer is still writing
//!
//! Skips are logged at warn level and never abort the scan. Only an
//! unreadable root directory is an error, and it is surfaced eagerly from
//! [`scan_blocks`] itself so a caller cannot mistake it for "no blocks".

use crate::block::{is_block_dir, Block, BlockManifest};
use crate::error::Result;
use std::fs::{self, ReadDir};
use std::path::Path;
use tracing::warn;

/// Start a scan of the immediate subdirectories of `root`
///
/// Returns a lazy iterator over the blocks present right now. The iterator
/// reflects one pass over the directory snapshot and is not restartable.
///
/// # Errors
///
/// [`crate::ShipperError::Io`] if the root directory itself cannot be read.
pub fn scan_blocks(root: &Path) -> Result<BlockScan> {
    Ok(BlockScan {
        entries: fs::read_dir(root)?,
    })
}

/// Lazy iterator over the blocks under a root directory
///
/// Created by [`scan_blocks`]. Yields blocks in directory-listing order;
/// callers needing time order can rely on sorting block IDs, which are
/// time-sortable by construction.
pub struct BlockScan {
    entries: ReadDir,
}

impl Iterator for BlockScan {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if is_block_dir(name).is_none() {
                continue;
            }
            let dir = entry.path();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => {}
                Ok(_) => continue,
                Err(err) => {
                    warn!(dir = %dir.display(), error = %err, "stat of block candidate failed");
                    continue;
                }
            }
            match BlockManifest::read_from(&dir) {
                Ok(manifest) => return Some(Block { dir, manifest }),
                Err(err) => {
                    // The block may have been deleted between listing and
                    // read, or is still being written by its producer.
                    warn!(dir = %dir.display(), error = %err, "reading block manifest failed");
                    continue;
                }
            }
        }
    }
}
