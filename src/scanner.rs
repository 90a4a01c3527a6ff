//! Lazy filestore traversal
//!
//! Streams candidate files out of the store without ever materializing the
//! full listing: memory stays bounded by traversal depth, not file count.
//! Entries are visited in sorted order so that a resumed run re-discovers
//! batches in the same sequence as the interrupted one.

use crate::errors::ScanError;
use crate::record::{FileRecord, Window};
use chrono::{DateTime, Utc};
use colored::*;
use std::path::Path;
use walkdir::WalkDir;

/// Check that a file name looks like a 40-hex content digest.
///
/// Either case is accepted; Artifactory stores lowercase but operators have
/// been known to copy trees through case-mangling filesystems.
pub fn is_hash_name(name: &str) -> bool {
    name.len() == 40 && name.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Lazy iterator over candidate files under a filestore root.
///
/// Applies two filters in sequence: the file name must be a 40-hex digest,
/// and the modification time must fall inside the `[start, end)` window.
/// Symlinks and non-regular files are skipped, not followed. An unreadable
/// subtree is logged and skipped; it never aborts the traversal.
pub struct Scanner {
    walker: walkdir::IntoIter,
    window: Window,
}

impl Scanner {
    pub fn new(root: &Path, window: Window) -> Self {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        Self { walker, window }
    }
}

impl Iterator for Scanner {
    type Item = FileRecord;

    fn next(&mut self) -> Option<FileRecord> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    // One bad subtree must not kill a terabyte-scale scan
                    eprintln!("{} {}", "Warning:".yellow(), ScanError(err));
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if !is_hash_name(&name) {
                continue;
            }
            let expected_hash = name.to_ascii_lowercase();

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    eprintln!("{} {}", "Warning:".yellow(), ScanError(err));
                    continue;
                }
            };

            let modified_at = match metadata.modified() {
                Ok(mtime) => DateTime::<Utc>::from(mtime),
                Err(err) => {
                    eprintln!(
                        "{} no mtime for {}: {err}",
                        "Warning:".yellow(),
                        entry.path().display()
                    );
                    continue;
                }
            };

            if !self.window.contains(modified_at) {
                continue;
            }

            let size_bytes = metadata.len();
            return Some(FileRecord {
                path: entry.into_path(),
                expected_hash,
                modified_at,
                size_bytes,
            });
        }
    }
}
