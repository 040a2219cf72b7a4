//! Type definitions for backup extraction.

use crate::filter::EntryFilter;
use crate::manifest::BackupManifest;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default cap on the size of a single extracted file (500 GB).
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 500 * 1000 * 1000 * 1000;

/// Options for extracting backups, fixed for the whole run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Include/exclude patterns applied to the outer archive's entries
    pub filter: EntryFilter,

    /// Output root; `None` extracts next to each backup file
    pub output_dir: Option<PathBuf>,

    /// Put every backup under `<output_dir>/<backup name>`
    pub extract_to_subdir: bool,

    /// Do not create symbolic or hard links
    pub skip_create_links: bool,

    /// Maximum size of any single extracted file in bytes
    pub max_archive_size: u64,

    /// Report full error details
    pub verbose: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            filter: EntryFilter::default(),
            output_dir: None,
            extract_to_subdir: false,
            skip_create_links: false,
            max_archive_size: DEFAULT_MAX_ARCHIVE_SIZE,
            verbose: false,
        }
    }
}

/// Outcome of one archive walk.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    /// Paths materialized on disk, in stream order (hard links last)
    pub extracted: Vec<PathBuf>,

    /// Entries of unsupported type and hard links whose target never appeared
    pub skipped: Vec<PathBuf>,

    /// Hard links created after the walk, link path -> target path
    pub hard_links: BTreeMap<PathBuf, PathBuf>,
}

/// Summary of one successfully extracted backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    /// The `.tar` file that was extracted
    pub backup: PathBuf,

    /// Directory the outer archive was unpacked into
    pub destination: PathBuf,

    /// Parsed or synthesized manifest
    pub manifest: BackupManifest,

    /// Number of outer entries materialized
    pub extracted: usize,

    /// Number of outer entries skipped
    pub skipped: usize,

    /// Inner archives found
    pub members_total: usize,

    /// Inner archives decrypted and unpacked
    pub members_extracted: usize,
}
